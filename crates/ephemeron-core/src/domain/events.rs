//! Registry notification payloads.
//!
//! Docker distribution が webhook で送る envelope のうち、追跡に必要な部分だけ。

use serde::{Deserialize, Serialize};

pub const PUSH_ACTION: &str = "push";

/// Top-level body sent by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub events: Vec<RegistryEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: EventTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTarget {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

impl RegistryEvent {
    /// push で、repository と tag の両方がある event だけが追跡対象
    pub fn is_trackable_push(&self) -> bool {
        self.action == PUSH_ACTION
            && !self.target.repository.is_empty()
            && !self.target.tag.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_distribution_notification() {
        let body = r#"{
            "events": [{
                "id": "abc",
                "action": "push",
                "target": {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": "sha256:abc123",
                    "size": 1234,
                    "repository": "myapp",
                    "tag": "1h"
                }
            }]
        }"#;
        let envelope: EventEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.events.len(), 1);
        let event = &envelope.events[0];
        assert!(event.is_trackable_push());
        assert_eq!(event.target.size, 1234);
        assert_eq!(event.target.digest.as_deref(), Some("sha256:abc123"));
    }

    #[test]
    fn pull_and_tagless_events_are_not_trackable() {
        let pull = RegistryEvent {
            action: "pull".to_string(),
            target: EventTarget {
                repository: "myapp".to_string(),
                tag: "1h".to_string(),
                ..EventTarget::default()
            },
        };
        let tagless = RegistryEvent {
            action: PUSH_ACTION.to_string(),
            target: EventTarget {
                repository: "myapp".to_string(),
                ..EventTarget::default()
            },
        };
        assert!(!pull.is_trackable_push());
        assert!(!tagless.is_trackable_push());
    }
}
