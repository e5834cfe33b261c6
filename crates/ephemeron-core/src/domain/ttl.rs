//! TTL - タグから有効期限を導出する
//!
//! タグ自体が寿命を表す: `myapp:1h30m` は 90 分後に回収対象になる。
//!
//! # 文法
//! `^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$`
//! - 各成分は省略可能だが順序は固定（w → d → h → m → s）
//! - タグ全体が一致しなければ解析失敗
//! - 成分が一つも無い場合（空文字列など）も解析失敗

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
        .expect("duration pattern must compile")
});

const SECS_PER_UNIT: [u64; 5] = [7 * 24 * 3600, 24 * 3600, 3600, 60, 1];

/// タグを duration として解析する。
///
/// 解析できないタグ（`latest`, `v1.0.0`, `sha-abc123`, 空文字列）は `None`。
/// 合計がオーバーフローする巨大な値も `None` として扱う。
pub fn parse_ttl(tag: &str) -> Option<Duration> {
    let captures = DURATION_PATTERN.captures(tag)?;

    let mut total_secs: u64 = 0;
    let mut matched_any = false;
    for (index, unit_secs) in SECS_PER_UNIT.iter().enumerate() {
        let Some(group) = captures.get(index + 1) else {
            continue;
        };
        matched_any = true;
        let magnitude: u64 = group.as_str().parse().ok()?;
        let secs = magnitude.checked_mul(*unit_secs)?;
        total_secs = total_secs.checked_add(secs)?;
    }

    matched_any.then(|| Duration::from_secs(total_secs))
}

/// default / max を適用して実効 TTL を決める。
///
/// - 解析失敗またはゼロ → `default_ttl`
/// - それ以外 → `min(parsed, max_ttl)`
///
/// `default_ttl <= max_ttl` は設定検証で保証される前提だが、
/// 破られていても `max_ttl` を超える TTL は返さない。
pub fn clamp_ttl(parsed: Option<Duration>, default_ttl: Duration, max_ttl: Duration) -> Duration {
    let ttl = match parsed {
        Some(d) if !d.is_zero() => d,
        _ => default_ttl,
    };
    ttl.min(max_ttl)
}

/// TtlPolicy は default / max の組
///
/// ingestion と reconciliation の両方がここを通るので、
/// どちらの経路でも同じタグは同じ TTL になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

impl TtlPolicy {
    pub fn new(default_ttl: Duration, max_ttl: Duration) -> Self {
        Self {
            default_ttl,
            max_ttl,
        }
    }

    /// タグに対する実効 TTL
    pub fn ttl_for_tag(&self, tag: &str) -> Duration {
        clamp_ttl(parse_ttl(tag), self.default_ttl, self.max_ttl)
    }

    /// `now` を起点にした期限
    pub fn expiry_for_tag(&self, tag: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = self.ttl_for_tag(tag);
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    const HOUR: u64 = 3600;
    const MINUTE: u64 = 60;

    fn policy() -> TtlPolicy {
        TtlPolicy::new(Duration::from_secs(HOUR), Duration::from_secs(7 * 24 * HOUR))
    }

    #[rstest]
    #[case::minutes("5m", 5 * MINUTE)]
    #[case::hour("1h", HOUR)]
    #[case::hour_minutes("1h30m", 90 * MINUTE)]
    #[case::days("2d", 48 * HOUR)]
    #[case::days_hours("2d12h", 60 * HOUR)]
    #[case::week("1w", 168 * HOUR)]
    #[case::week_days_hours("1w3d12h", 252 * HOUR)]
    #[case::seconds("45s", 45)]
    #[case::all_units("1w1d1h1m1s", 7 * 24 * HOUR + 24 * HOUR + HOUR + MINUTE + 1)]
    fn parses_composite_durations(#[case] tag: &str, #[case] secs: u64) {
        assert_eq!(parse_ttl(tag), Some(Duration::from_secs(secs)));
    }

    #[rstest]
    #[case::latest("latest")]
    #[case::empty("")]
    #[case::semver("v1.0.0")]
    #[case::digest_like("sha-abc123")]
    #[case::wrong_order("30m1h")]
    #[case::trailing_garbage("1hx")]
    #[case::unit_without_magnitude("h")]
    #[case::uppercase("1H")]
    #[case::overflow("99999999999999999999w")]
    fn rejects_non_duration_tags(#[case] tag: &str) {
        assert_eq!(parse_ttl(tag), None);
    }

    #[rstest]
    #[case::latest("latest")]
    #[case::empty("")]
    #[case::semver("v1.0.0")]
    #[case::digest_like("sha-abc123")]
    fn unparseable_tags_get_default_ttl(#[case] tag: &str) {
        assert_eq!(policy().ttl_for_tag(tag), Duration::from_secs(HOUR));
    }

    #[test]
    fn zero_duration_falls_back_to_default() {
        assert_eq!(parse_ttl("0h"), Some(Duration::ZERO));
        assert_eq!(policy().ttl_for_tag("0h"), Duration::from_secs(HOUR));
    }

    #[test]
    fn long_ttl_is_capped_at_max() {
        assert_eq!(
            policy().ttl_for_tag("52w"),
            Duration::from_secs(7 * 24 * HOUR)
        );
    }

    #[test]
    fn default_above_max_is_still_capped() {
        let default_ttl = Duration::from_secs(48 * HOUR);
        let max_ttl = Duration::from_secs(24 * HOUR);
        assert_eq!(clamp_ttl(None, default_ttl, max_ttl), max_ttl);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(Duration::ZERO))]
    #[case(Some(Duration::from_secs(5 * MINUTE)))]
    #[case(Some(Duration::from_secs(1000 * HOUR)))]
    fn clamp_is_idempotent(#[case] parsed: Option<Duration>) {
        let default_ttl = Duration::from_secs(HOUR);
        let max_ttl = Duration::from_secs(24 * HOUR);
        let once = clamp_ttl(parsed, default_ttl, max_ttl);
        let twice = clamp_ttl(Some(once), default_ttl, max_ttl);
        assert_eq!(once, twice);
    }

    #[test]
    fn expiry_is_anchored_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let expires_at = policy().expiry_for_tag("1h30m", now);
        assert_eq!(expires_at, now + chrono::Duration::minutes(90));
    }
}
