//! Reconciler - registry のカタログから追跡状態を再構築する
//!
//! 追跡状態（Redis）を失っても、registry 自体が ground truth として残っている。
//! タグから TTL を導き直して全件を追跡し直す。
//!
//! # 実装詳細
//! - 期限は「いま」を起点に計算し直す（元の push 時刻は registry から取れない）。
//!   なので再構築のたびに寿命は延びる
//! - repository 単位の tags 取得失敗はその repository だけ skip
//! - 1 件の track 失敗は数えて継続

use std::sync::Arc;

use crate::domain::{ReconcileError, ReconcileReport, TtlPolicy};
use crate::ports::{ArtifactCatalog, Clock, TrackingStore};

pub struct Reconciler {
    store: Arc<dyn TrackingStore>,
    catalog: Arc<dyn ArtifactCatalog>,
    clock: Arc<dyn Clock>,
    policy: TtlPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        catalog: Arc<dyn ArtifactCatalog>,
        clock: Arc<dyn Clock>,
        policy: TtlPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            policy,
        }
    }

    /// 未初期化のときだけ再構築して、初期化済みフラグを立てる。
    ///
    /// 既に初期化済みなら `Ok(None)`。
    pub async fn run_if_needed(&self) -> Result<Option<ReconcileReport>, ReconcileError> {
        let initialized = self
            .store
            .is_initialized()
            .await
            .map_err(ReconcileError::InitCheck)?;
        if initialized {
            tracing::debug!("tracking store already initialized, skipping recovery");
            return Ok(None);
        }

        tracing::info!("tracking store not initialized, starting recovery");
        let report = self.run_and_mark_initialized().await?;
        Ok(Some(report))
    }

    /// `run_unconditional` then `set_initialized` (the `recover` command).
    pub async fn run_and_mark_initialized(&self) -> Result<ReconcileReport, ReconcileError> {
        let report = self.run_unconditional().await?;
        self.store
            .set_initialized()
            .await
            .map_err(ReconcileError::MarkInitialized)?;
        Ok(report)
    }

    /// カタログを全走査して追跡し直す。冪等（メンバーシップは同じになる）。
    pub async fn run_unconditional(&self) -> Result<ReconcileReport, ReconcileError> {
        let repositories = self
            .catalog
            .list_repositories()
            .await
            .map_err(ReconcileError::Catalog)?;

        tracing::info!(repositories = repositories.len(), "starting recovery");

        let mut report = ReconcileReport {
            repositories: repositories.len(),
            ..ReconcileReport::default()
        };

        for repository in &repositories {
            let tags = match self.catalog.list_tags(repository).await {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!(repo = %repository, error = %e, "failed to list tags, skipping repo");
                    report.repositories_skipped += 1;
                    continue;
                }
            };

            for tag in &tags {
                let reference = format!("{repository}:{tag}");
                let expires_at = self.policy.expiry_for_tag(tag, self.clock.now());

                if let Err(e) = self.store.track_artifact(&reference, expires_at, 0).await {
                    tracing::error!(image = %reference, error = %e, "failed to track image");
                    report.failed += 1;
                    continue;
                }

                tracing::debug!(image = %reference, expires_at = %expires_at, "recovered image");
                report.tracked += 1;
            }
        }

        tracing::info!(
            images_recovered = report.tracked,
            repositories_skipped = report.repositories_skipped,
            failed = report.failed,
            "recovery complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryRegistry, InMemoryTrackingStore};
    use crate::ports::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn policy() -> TtlPolicy {
        TtlPolicy::new(Duration::from_secs(3600), Duration::from_secs(24 * 3600))
    }

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryTrackingStore>,
        registry: Arc<InMemoryRegistry>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let store = Arc::new(InMemoryTrackingStore::with_clock(clock.clone()));
        let registry = Arc::new(InMemoryRegistry::new());
        let reconciler = Reconciler::new(store.clone(), registry.clone(), clock.clone(), policy());
        Fixture {
            clock,
            store,
            registry,
            reconciler,
        }
    }

    async fn sorted_members(store: &InMemoryTrackingStore) -> Vec<String> {
        let mut members = store.list_tracked().await.unwrap();
        members.sort();
        members
    }

    #[tokio::test]
    async fn tracks_every_tag_with_clamped_expiry() {
        let f = fixture();
        f.registry.push("myapp", "5m");
        f.registry.push("myapp", "latest");
        f.registry.push("team/service", "1w");

        let report = f.reconciler.run_unconditional().await.unwrap();

        assert_eq!(report.repositories, 2);
        assert_eq!(report.tracked, 3);
        assert_eq!(
            sorted_members(&f.store).await,
            vec!["myapp:5m", "myapp:latest", "team/service:1w"]
        );
        let expiry = |r: &'static str| {
            let store = f.store.clone();
            async move { store.get_expiry(r).await.unwrap().unwrap() }
        };
        assert_eq!(expiry("myapp:5m").await, fixed_now() + chrono::Duration::minutes(5));
        // unparseable → default
        assert_eq!(expiry("myapp:latest").await, fixed_now() + chrono::Duration::hours(1));
        // capped at max
        assert_eq!(expiry("team/service:1w").await, fixed_now() + chrono::Duration::hours(24));
        assert_eq!(f.store.get_size("myapp:5m").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_runs_keep_membership_and_reanchor_expiry() {
        let f = fixture();
        f.registry.push("myapp", "1h");
        f.registry.push("other", "2h");

        f.reconciler.run_unconditional().await.unwrap();
        let first = sorted_members(&f.store).await;
        f.clock.advance(chrono::Duration::minutes(30));
        f.reconciler.run_unconditional().await.unwrap();

        assert_eq!(sorted_members(&f.store).await, first);
        assert_eq!(
            f.store.get_expiry("myapp:1h").await.unwrap(),
            Some(fixed_now() + chrono::Duration::minutes(90))
        );
    }

    #[tokio::test]
    async fn catalog_failure_aborts() {
        let f = fixture();
        f.registry.push("myapp", "1h");
        f.registry.fail_catalog(true);

        let err = f.reconciler.run_unconditional().await.unwrap_err();

        assert!(matches!(err, ReconcileError::Catalog(_)));
        assert_eq!(f.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_repository_is_skipped() {
        let f = fixture();
        f.registry.push("broken", "1h");
        f.registry.push("myapp", "1h");
        f.registry.fail_tags_for("broken");

        let report = f.reconciler.run_unconditional().await.unwrap();

        assert_eq!(report.repositories_skipped, 1);
        assert_eq!(sorted_members(&f.store).await, vec!["myapp:1h"]);
    }

    #[tokio::test]
    async fn run_if_needed_is_noop_once_initialized() {
        let f = fixture();
        f.registry.push("myapp", "1h");
        f.store.set_initialized().await.unwrap();

        let report = f.reconciler.run_if_needed().await.unwrap();

        assert!(report.is_none());
        assert_eq!(f.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_if_needed_recovers_and_marks_initialized() {
        let f = fixture();
        f.registry.push("myapp", "1h");

        let report = f.reconciler.run_if_needed().await.unwrap().unwrap();

        assert_eq!(report.tracked, 1);
        assert!(f.store.is_initialized().await.unwrap());
        assert!(f.reconciler.run_if_needed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn init_check_error_is_surfaced_without_recovery() {
        let f = fixture();
        f.registry.push("myapp", "1h");
        f.store.set_unavailable(true);

        let err = f.reconciler.run_if_needed().await.unwrap_err();

        assert!(matches!(err, ReconcileError::InitCheck(_)));
        f.store.set_unavailable(false);
        assert_eq!(f.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_recovery_does_not_mark_initialized() {
        let f = fixture();
        f.registry.fail_catalog(true);

        assert!(f.reconciler.run_if_needed().await.is_err());
        assert!(!f.store.is_initialized().await.unwrap());
    }
}
