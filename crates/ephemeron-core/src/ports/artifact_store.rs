//! ArtifactStore ports - OCI registry 側の協調者
//!
//! - **ArtifactDeleter**: tag → digest を解決して digest で削除（reap 用）
//! - **ArtifactCatalog**: repository と tag の列挙（reconcile 用）
//!
//! どちらも本番では `RegistryClient`、テストでは `InMemoryRegistry` が実装する。

use async_trait::async_trait;

use crate::domain::{ArtifactRef, RegistryError};

/// 削除の結果。どちらも「受理」として追跡を外してよい。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// registry 側に既に無かった（404）
    AlreadyGone,
}

#[async_trait]
pub trait ArtifactDeleter: Send + Sync {
    /// "already gone" は成功として `DeleteOutcome::AlreadyGone` を返すこと。
    async fn delete_artifact(
        &self,
        reference: &ArtifactRef,
    ) -> Result<DeleteOutcome, RegistryError>;
}

/// ページングは実装側で全て読み切ってから返す。
#[async_trait]
pub trait ArtifactCatalog: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError>;

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError>;
}
