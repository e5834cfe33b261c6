//! Reports - サイクルごとの結果
//!
//! reap / reconcile の結果は同期的な呼び出し元には返らない（タイマーや
//! one-shot コマンドで動く）ので、ログとメトリクスのためにここへ集計する。

use serde::{Deserialize, Serialize};

/// ReapReport は 1 回の reap サイクルの集計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapReport {
    /// 他のレプリカがロックを持っていたので何もしなかった
    pub skipped: bool,
    /// 期限を確認した件数
    pub evaluated: usize,
    /// 期限切れだった件数
    pub expired: usize,
    /// registry から削除（または既に無い）と確認して追跡を外した件数
    pub deleted: usize,
    /// 削除に失敗して次のサイクルに持ち越した件数
    pub failed: usize,
    /// 回収したバイト数（best-effort）
    pub bytes_reclaimed: u64,
    /// shutdown 要求で途中終了した
    pub interrupted: bool,
}

impl ReapReport {
    pub fn skipped_cycle() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// ReconcileReport は 1 回の reconciliation の集計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub repositories: usize,
    pub repositories_skipped: usize,
    pub tracked: usize,
    pub failed: usize,
}
