//! TrackingStore port - 追跡状態を置く共有 KV（Redis または InMemory）
//!
//! TrackingStore は以下を管理します：
//! - 追跡中の `repository:tag` の集合
//! - 参照ごとのメタデータ（created / expires / size_bytes）
//! - reap サイクルの lease 付きロック
//! - 初期化済みフラグ
//!
//! # 設計原則
//! - 集合への追加とメタデータの書き込みは 1 操作（部分適用しない）
//! - ロックは advisory で lease 付き。合意プロトコルではない
//!   （回収処理は冪等なので、二重実行は無駄な仕事になるだけ）
//! - 初期化フラグはプロセス内状態ではなく store に永続化する

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::StoreError;

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// 疎通確認（起動時チェックと readiness probe 用）
    async fn ping(&self) -> Result<(), StoreError>;

    /// 冪等な upsert。created_at / expires_at / size_bytes を上書きし、集合に加える。
    async fn track_artifact(
        &self,
        reference: &str,
        expires_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> Result<(), StoreError>;

    /// 現在のメンバーのスナップショット（順序保証なし）
    async fn list_tracked(&self) -> Result<Vec<String>, StoreError>;

    /// 追跡されていない（または並行して削除された）場合は `None`
    async fn get_expiry(&self, reference: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// 不明なら 0
    async fn get_size(&self, reference: &str) -> Result<u64, StoreError>;

    /// 集合とメタデータをまとめて削除。存在しなくてもエラーにしない。
    async fn remove_artifact(&self, reference: &str) -> Result<(), StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// ロックが無いときだけ lease 付きで取得。取得できたら `true`。
    async fn acquire_lock(&self, lease: Duration) -> Result<bool, StoreError>;

    /// 無条件に解放。保持していなくても安全（lease はどのみち切れる）。
    async fn release_lock(&self) -> Result<(), StoreError>;

    async fn is_initialized(&self) -> Result<bool, StoreError>;

    async fn set_initialized(&self) -> Result<(), StoreError>;
}
