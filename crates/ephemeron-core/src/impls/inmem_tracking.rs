//! InMemoryTrackingStore - 開発・テスト用の追跡 store
//!
//! # 実装詳細
//! - 集合とメタデータを 1 つの HashMap で持つので、部分適用は起きない
//! - ロックの lease は Clock で判定する（FixedClock で期限切れを再現できる）
//! - tokio::sync::Mutex の中で await しない
//! - `set_unavailable(true)` で全操作が `StoreError::Backend` を返す（障害の再現用）

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::domain::{StoreError, TrackingRecord};
use crate::ports::{Clock, SystemClock, TrackingStore};

/// Lease held on the reaper lock.
#[derive(Debug, Clone)]
struct LockLease {
    holder: Ulid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    records: HashMap<String, TrackingRecord>,
    lock: Option<LockLease>,
    initialized: bool,
}

/// InMemoryTrackingStore は単一プロセス内で TrackingStore を満たす
///
/// # 使用例
/// ```ignore
/// let store = InMemoryTrackingStore::new();
/// store.track_artifact("myapp:1h", expires_at, 0).await?;
/// ```
pub struct InMemoryTrackingStore {
    state: Arc<Mutex<InMemoryState>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("in-memory store unavailable".to_string()));
        }
        Ok(())
    }

    /// Full record for a reference, for assertions in tests.
    pub async fn record(&self, reference: &str) -> Option<TrackingRecord> {
        self.state.lock().await.records.get(reference).copied()
    }
}

impl Default for InMemoryTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()?;
        Ok(())
    }

    async fn track_artifact(
        &self,
        reference: &str,
        expires_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let record = TrackingRecord::new(self.clock.now(), expires_at, size_bytes);
        self.state
            .lock()
            .await
            .records
            .insert(reference.to_string(), record);
        Ok(())
    }

    async fn list_tracked(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.records.keys().cloned().collect())
    }

    async fn get_expiry(&self, reference: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .records
            .get(reference)
            .map(|r| r.expires_at))
    }

    async fn get_size(&self, reference: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .records
            .get(reference)
            .map_or(0, |r| r.size_bytes))
    }

    async fn remove_artifact(&self, reference: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.state.lock().await.records.remove(reference);
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.records.len() as u64)
    }

    async fn acquire_lock(&self, lease: Duration) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(held) = &state.lock
            && now < held.expires_at
        {
            return Ok(false);
        }

        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| StoreError::Backend(format!("invalid lock lease: {e}")))?;
        state.lock = Some(LockLease {
            holder: Ulid::new(),
            expires_at: now + lease,
        });
        Ok(true)
    }

    async fn release_lock(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(released) = self.state.lock().await.lock.take() {
            tracing::trace!(holder = %released.holder, "reaper lock released");
        }
        Ok(())
    }

    async fn is_initialized(&self) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.initialized)
    }

    async fn set_initialized(&self) -> Result<(), StoreError> {
        self.check_available()?;
        self.state.lock().await.initialized = true;
        Ok(())
    }
}
