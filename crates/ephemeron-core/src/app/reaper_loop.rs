//! ReaperLoop - 期限切れ artifact の回収
//!
//! # フロー（1 サイクル）
//! 1. `TrackingStore::acquire_lock(lease)`: 取れなければ他のレプリカに任せて skip
//! 2. `list_tracked()` でスナップショットを取る（失敗したらロックを解放して中断）
//! 3. 参照ごとに `get_expiry` → 期限切れなら registry から削除 → 追跡を外す
//! 4. ロックを無条件に解放
//!
//! # 設計原則
//! - 1 件の失敗でバッチを止めない（記録を残して次のサイクルで再試行）
//! - registry 側で既に無い（404）のは成功扱い
//! - shutdown は参照と参照の間でだけ見る。途中で抜けたときはロックを解放せず、
//!   lease の期限切れに任せる

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::record::is_expired;
use crate::domain::{ArtifactRef, DeleteError, ReapError, ReapReport};
use crate::metrics;
use crate::ports::{ArtifactDeleter, Clock, DeleteOutcome, TrackingStore};

/// Reaper は 1 回分の reap サイクルを実行する
pub struct Reaper {
    store: Arc<dyn TrackingStore>,
    deleter: Arc<dyn ArtifactDeleter>,
    clock: Arc<dyn Clock>,
    lock_lease: Duration,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        deleter: Arc<dyn ArtifactDeleter>,
        clock: Arc<dyn Clock>,
        lock_lease: Duration,
    ) -> Self {
        Self {
            store,
            deleter,
            clock,
            lock_lease,
        }
    }

    /// Run one full cycle (used by the `reap` command).
    pub async fn reap_once(&self) -> Result<ReapReport, ReapError> {
        self.run_cycle(None).await
    }

    /// Run one cycle, stopping early if `shutdown` flips to `true`.
    pub async fn reap_until_shutdown(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ReapReport, ReapError> {
        self.run_cycle(Some(shutdown)).await
    }

    async fn run_cycle(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<ReapReport, ReapError> {
        let result = self.cycle(shutdown).await;
        match &result {
            Ok(report) => metrics::record_reap_report(report),
            Err(_) => metrics::record_reap_cycle_error(),
        }
        result
    }

    async fn cycle(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<ReapReport, ReapError> {
        let acquired = self
            .store
            .acquire_lock(self.lock_lease)
            .await
            .map_err(ReapError::Lock)?;
        if !acquired {
            tracing::debug!("reaper lock held by another instance, skipping cycle");
            return Ok(ReapReport::skipped_cycle());
        }

        let references = match self.store.list_tracked().await {
            Ok(references) => references,
            Err(e) => {
                self.release_lock().await;
                return Err(ReapError::Scan(e));
            }
        };

        let mut report = ReapReport::default();
        for reference in &references {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!(
                    remaining = references.len() - report.evaluated,
                    "shutdown requested, stopping reap cycle"
                );
                report.interrupted = true;
                return Ok(report);
            }
            self.evaluate(reference, &mut report).await;
        }

        self.release_lock().await;

        if report.deleted > 0 || report.failed > 0 {
            tracing::info!(
                evaluated = report.evaluated,
                deleted = report.deleted,
                failed = report.failed,
                bytes_reclaimed = report.bytes_reclaimed,
                "reap cycle finished"
            );
        }
        Ok(report)
    }

    async fn evaluate(&self, reference: &str, report: &mut ReapReport) {
        report.evaluated += 1;

        let expires_at = match self.store.get_expiry(reference).await {
            Ok(Some(expires_at)) => expires_at,
            // removed between the scan and now
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(image = %reference, error = %e, "failed to read expiry");
                report.failed += 1;
                return;
            }
        };
        if !is_expired(expires_at, self.clock.now()) {
            return;
        }
        report.expired += 1;

        let size_bytes = match self.store.get_size(reference).await {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!(image = %reference, error = %e, "size unavailable, counting as 0");
                0
            }
        };

        let outcome = match self.delete(reference).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(image = %reference, error = %e, "failed to delete expired image");
                report.failed += 1;
                return;
            }
        };

        // the registry no longer has it; a failure here means the next cycle
        // sees AlreadyGone and retries the removal
        if let Err(e) = self.store.remove_artifact(reference).await {
            tracing::error!(image = %reference, error = %e, "failed to untrack deleted image");
            report.failed += 1;
            return;
        }

        report.deleted += 1;
        report.bytes_reclaimed += size_bytes;
        match outcome {
            DeleteOutcome::Deleted => {
                tracing::info!(image = %reference, size_bytes, "deleted expired image");
            }
            DeleteOutcome::AlreadyGone => {
                tracing::info!(image = %reference, "image already absent from registry, untracked");
            }
        }
    }

    async fn delete(&self, reference: &str) -> Result<DeleteOutcome, DeleteError> {
        let reference = ArtifactRef::parse(reference)?;
        Ok(self.deleter.delete_artifact(&reference).await?)
    }

    async fn release_lock(&self) {
        if let Err(e) = self.store.release_lock().await {
            tracing::warn!(error = %e, "failed to release reaper lock, lease will expire");
        }
    }

    async fn refresh_gauge(&self) {
        match self.store.count().await {
            Ok(count) => metrics::IMAGES_CURRENT.set(i64::try_from(count).unwrap_or(i64::MAX)),
            Err(e) => tracing::debug!(error = %e, "failed to count tracked images"),
        }
    }
}

/// Periodic loop: one cycle per `interval` until shutdown.
///
/// 最初のサイクルは起動直後に走る。サイクルが interval より長引いたら
/// 次の tick は遅らせる（詰めて連続実行しない）。
pub async fn run_reaper(
    reaper: Arc<Reaper>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: nobody can stop us any more, so stop now
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = reaper.reap_until_shutdown(&shutdown_rx).await {
            tracing::error!(error = %e, "reap cycle failed");
        }
        reaper.refresh_gauge().await;
    }

    tracing::info!("reaper loop stopped");
}

/// Reaper task handle.
/// - `request_shutdown()` は実行中の削除を中断しない（次の参照の前で止まる）
/// - `shutdown_and_join()` で終了を待てる
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn spawn(reaper: Arc<Reaper>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_reaper(reaper, interval, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "reaper task panicked");
        }
    }
}
