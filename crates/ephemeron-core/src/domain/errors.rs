//! Errors - エラー型と分類
//!
//! # 分類
//! - 一時的な外部エラー（StoreError, RegistryError）: 次のサイクルで自然に再試行
//! - 個別アイテムのエラー（DeleteError）: ログに残してバッチは継続
//! - 構造的なエラー（ReferenceError）: 境界で即座に拒否
//! - サイクル全体のエラー（ReapError, ReconcileError）

use thiserror::Error;

/// Tracking store (Redis / in-memory) failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tracking store backend error: {0}")]
    Backend(String),

    #[error("corrupt value for {key}.{field}: {value:?}")]
    Corrupt {
        key: String,
        field: &'static str,
        value: String,
    },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Artifact store (OCI registry) failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("registry response for {url} has no Docker-Content-Digest header")]
    MissingDigest { url: String },

    #[error("invalid registry url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

/// `repository:tag` の形式違反
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("invalid image format {0:?}: expected repository:tag")]
    MissingSeparator(String),

    #[error("invalid image format {0:?}: empty repository")]
    EmptyRepository(String),

    #[error("invalid image format {0:?}: empty tag")]
    EmptyTag(String),
}

/// 1 件の artifact 削除に対するエラー（サイクルは止めない）
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Reap cycle-level failures. Per-artifact failures never end up here.
#[derive(Debug, Error)]
pub enum ReapError {
    #[error("acquiring reaper lock: {0}")]
    Lock(#[source] StoreError),

    #[error("listing tracked images: {0}")]
    Scan(#[source] StoreError),
}

/// Reconciliation failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("listing repositories: {0}")]
    Catalog(#[source] RegistryError),

    #[error("checking initialization state: {0}")]
    InitCheck(#[source] StoreError),

    #[error("setting initialized flag: {0}")]
    MarkInitialized(#[source] StoreError),
}
