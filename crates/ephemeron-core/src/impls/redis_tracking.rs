//! RedisTrackingStore - 本番用の追跡 store
//!
//! upstream の ttl.sh と同じキー配置を使うので、既存の Redis をそのまま引き継げる。
//!
//! # キー配置
//! - `current.images`: 追跡中の `repository:tag` の SET
//! - `<repository:tag>`: HASH（`created`, `expires` は epoch ms、`size_bytes`、すべて文字列）
//! - `reaper.lock`: `SET NX PX` で取る lease 付きロック（値は holder の ULID）
//! - `ephemeron:initialized`: `"true"`
//!
//! 追加と削除はそれぞれ MULTI/EXEC のパイプライン 1 本で送る。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use ulid::Ulid;

use crate::domain::StoreError;
use crate::ports::TrackingStore;

pub const IMAGES_KEY: &str = "current.images";
pub const REAPER_LOCK_KEY: &str = "reaper.lock";
pub const INITIALIZED_KEY: &str = "ephemeron:initialized";

const FIELD_CREATED: &str = "created";
const FIELD_EXPIRES: &str = "expires";
const FIELD_SIZE: &str = "size_bytes";

/// Redis-backed tracking store.
///
/// `ConnectionManager` reconnects on its own, so a Redis restart only fails the
/// in-flight calls; the next cycle picks up again.
#[derive(Clone)]
pub struct RedisTrackingStore {
    conn: ConnectionManager,
}

impl RedisTrackingStore {
    /// Open a managed connection from a `redis://` URL.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("parsing redis URL: {e}")))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn parse_millis(key: &str, field: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            field,
            value: raw.to_string(),
        })
}

fn parse_size(key: &str, raw: &str) -> Result<u64, StoreError> {
    raw.trim().parse::<u64>().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        field: FIELD_SIZE,
        value: raw.to_string(),
    })
}

fn lease_millis(lease: Duration) -> u64 {
    u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl TrackingStore for RedisTrackingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn track_artifact(
        &self,
        reference: &str,
        expires_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let fields = [
            (FIELD_CREATED, Utc::now().timestamp_millis().to_string()),
            (FIELD_EXPIRES, expires_at.timestamp_millis().to_string()),
            (FIELD_SIZE, size_bytes.to_string()),
        ];
        let _: () = redis::pipe()
            .atomic()
            .sadd(IMAGES_KEY, reference)
            .ignore()
            .hset_multiple(reference, &fields)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_tracked(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(IMAGES_KEY).await?;
        Ok(members)
    }

    async fn get_expiry(&self, reference: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.hget(reference, FIELD_EXPIRES).await?;
        raw.map(|raw| parse_millis(reference, FIELD_EXPIRES, &raw))
            .transpose()
    }

    async fn get_size(&self, reference: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.hget(reference, FIELD_SIZE).await?;
        match raw {
            Some(raw) => parse_size(reference, &raw),
            None => Ok(0),
        }
    }

    async fn remove_artifact(&self, reference: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .srem(IMAGES_KEY, reference)
            .ignore()
            .del(reference)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let count: u64 = conn.scard(IMAGES_KEY).await?;
        Ok(count)
    }

    async fn acquire_lock(&self, lease: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(REAPER_LOCK_KEY)
            .arg(Ulid::new().to_string())
            .arg("NX")
            .arg("PX")
            .arg(lease_millis(lease))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.del(REAPER_LOCK_KEY).await?;
        Ok(())
    }

    async fn is_initialized(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(INITIALIZED_KEY).await?;
        Ok(exists)
    }

    async fn set_initialized(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.set(INITIALIZED_KEY, "true").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millis_round_trip_through_string_form() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let raw = at.timestamp_millis().to_string();
        assert_eq!(parse_millis("myapp:1h", FIELD_EXPIRES, &raw).unwrap(), at);
    }

    #[test]
    fn corrupt_expiry_is_reported_with_key() {
        let err = parse_millis("myapp:1h", FIELD_EXPIRES, "soon").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Corrupt { ref key, field: FIELD_EXPIRES, .. } if key == "myapp:1h"
        ));
    }

    #[test]
    fn size_must_be_unsigned() {
        assert_eq!(parse_size("myapp:1h", "2048").unwrap(), 2048);
        assert!(parse_size("myapp:1h", "-1").is_err());
    }

    #[test]
    fn lease_is_never_zero() {
        assert_eq!(lease_millis(Duration::ZERO), 1);
        assert_eq!(lease_millis(Duration::from_secs(300)), 300_000);
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result = RedisTrackingStore::connect("not a url").await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
