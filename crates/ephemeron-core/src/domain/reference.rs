//! Artifact reference (`repository:tag`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ReferenceError;

/// ArtifactRef は追跡集合のキー
///
/// 文字列表現 `repository:tag` がそのまま store のキーになる。
/// repository には `/` が入りうるので、区切りは最後の `:` で判定する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactRef {
    repository: String,
    tag: String,
}

impl ArtifactRef {
    /// repository と tag から作成（どちらも空は不可）
    pub fn new(
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, ReferenceError> {
        let repository = repository.into();
        let tag = tag.into();
        if repository.is_empty() {
            return Err(ReferenceError::EmptyRepository(format!("{repository}:{tag}")));
        }
        if tag.is_empty() {
            return Err(ReferenceError::EmptyTag(format!("{repository}:{tag}")));
        }
        Ok(Self { repository, tag })
    }

    /// `repository:tag` を分解する。ネットワーク呼び出しの前に検証するため。
    pub fn parse(raw: &str) -> Result<Self, ReferenceError> {
        let (repository, tag) = raw
            .rsplit_once(':')
            .ok_or_else(|| ReferenceError::MissingSeparator(raw.to_string()))?;
        if repository.is_empty() {
            return Err(ReferenceError::EmptyRepository(raw.to_string()));
        }
        if tag.contains('/') {
            return Err(ReferenceError::MissingSeparator(raw.to_string()));
        }
        if tag.is_empty() {
            return Err(ReferenceError::EmptyTag(raw.to_string()));
        }
        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl FromStr for ArtifactRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactRef {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactRef> for String {
    fn from(value: ArtifactRef) -> Self {
        value.to_string()
    }
}
