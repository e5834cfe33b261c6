//! Service configuration.
//!
//! 読み込み（figment: TOML ファイル → 環境変数）は CLI 側で行い、ここでは型と検証だけを持つ。
//! 期間はタグと同じ文法（`1h`, `30m`, `1d12h`）で書く。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TtlPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("HOOK_TOKEN is required")]
    MissingHookToken,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("DEFAULT_TTL ({default_ttl:?}) must not exceed MAX_TTL ({max_ttl:?})")]
    DefaultExceedsMax {
        default_ttl: Duration,
        max_ttl: Duration,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Field names match the environment variables lowercased (`PORT` → `port`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Public listener (webhook).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Internal listener (probes, metrics).
    #[serde(default = "default_internal_port")]
    pub internal_port: u16,

    #[serde(default)]
    pub redis_url: Option<String>,

    /// Heroku-style fallback when `REDIS_URL` is unset.
    #[serde(default)]
    pub rediscloud_url: Option<String>,

    #[serde(default)]
    pub hook_token: String,

    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    #[serde(default = "default_ttl", with = "duration_str")]
    pub default_ttl: Duration,

    #[serde(default = "default_max_ttl", with = "duration_str")]
    pub max_ttl: Duration,

    #[serde(default = "default_reap_interval", with = "duration_str")]
    pub reap_interval: Duration,

    #[serde(default = "default_reap_lock_lease", with = "duration_str")]
    pub reap_lock_lease: Duration,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_port() -> u16 {
    8000
}

fn default_internal_port() -> u16 {
    9090
}

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

fn default_registry_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_reap_lock_lease() -> Duration {
    Duration::from_secs(5 * 60)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            internal_port: default_internal_port(),
            redis_url: None,
            rediscloud_url: None,
            hook_token: String::new(),
            registry_url: default_registry_url(),
            default_ttl: default_ttl(),
            max_ttl: default_max_ttl(),
            reap_interval: default_reap_interval(),
            reap_lock_lease: default_reap_lock_lease(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// `REDIS_URL`, then `REDISCLOUD_URL`, then localhost.
    pub fn redis_url(&self) -> &str {
        [&self.redis_url, &self.rediscloud_url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|url| !url.is_empty())
            .unwrap_or(DEFAULT_REDIS_URL)
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(self.default_ttl, self.max_ttl)
    }

    /// Checks shared by every command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry_url.trim().is_empty() {
            return Err(ConfigError::Empty("REGISTRY_URL"));
        }
        for (name, value) in [
            ("DEFAULT_TTL", self.default_ttl),
            ("MAX_TTL", self.max_ttl),
            ("REAP_INTERVAL", self.reap_interval),
            ("REAP_LOCK_LEASE", self.reap_lock_lease),
        ] {
            if value.is_zero() {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.default_ttl > self.max_ttl {
            return Err(ConfigError::DefaultExceedsMax {
                default_ttl: self.default_ttl,
                max_ttl: self.max_ttl,
            });
        }
        Ok(())
    }

    /// `serve` also needs the webhook token.
    pub fn validate_for_serve(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.hook_token.is_empty() {
            return Err(ConfigError::MissingHookToken);
        }
        Ok(())
    }
}

/// Durations as tag-grammar strings (`"1h30m"`).
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::domain::parse_ttl;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}s", value.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_ttl(raw.trim()).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid duration {raw:?}: expected e.g. 30s, 5m, 1h30m, 2d"
            ))
        })
    }
}
