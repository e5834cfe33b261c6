//! Ingestor - push 通知を追跡レコードに変換する

use std::sync::Arc;

use crate::domain::{EventEnvelope, TtlPolicy};
use crate::metrics;
use crate::ports::{Clock, TrackingStore};

/// Counts for one webhook delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub tracked: usize,
    pub ignored: usize,
    pub failed: usize,
}

pub struct Ingestor {
    store: Arc<dyn TrackingStore>,
    clock: Arc<dyn Clock>,
    policy: TtlPolicy,
}

impl Ingestor {
    pub fn new(store: Arc<dyn TrackingStore>, clock: Arc<dyn Clock>, policy: TtlPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// push event ごとに `track_artifact`。失敗はログに残すだけで、呼び出し元には返さない。
    pub async fn ingest(&self, envelope: &EventEnvelope) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for event in &envelope.events {
            if !event.is_trackable_push() {
                summary.ignored += 1;
                continue;
            }

            let target = &event.target;
            let reference = format!("{}:{}", target.repository, target.tag);
            let ttl = self.policy.ttl_for_tag(&target.tag);
            let expires_at = self.policy.expiry_for_tag(&target.tag, self.clock.now());

            match self
                .store
                .track_artifact(&reference, expires_at, target.size)
                .await
            {
                Ok(()) => {
                    metrics::IMAGES_TRACKED.inc();
                    summary.tracked += 1;
                    tracing::info!(
                        image = %reference,
                        ttl_secs = ttl.as_secs(),
                        expires_at = %expires_at,
                        "tracking image"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(image = %reference, error = %e, "failed to track image");
                }
            }
        }

        summary
    }
}
