//! InMemoryRegistry - テスト用の artifact store
//!
//! ArtifactDeleter と ArtifactCatalog の両方を満たす。
//! 失敗注入（catalog / repository 単位の tags / 参照単位の delete）と
//! 削除呼び出しの記録を持つ。

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ArtifactRef, RegistryError};
use crate::ports::{ArtifactCatalog, ArtifactDeleter, DeleteOutcome};

#[derive(Debug, Default)]
struct RegistryState {
    repositories: BTreeMap<String, BTreeSet<String>>,
    fail_catalog: bool,
    fail_tags: HashSet<String>,
    fail_delete: HashSet<String>,
    delete_calls: Vec<String>,
}

/// 同期 Mutex で十分（ロック中に await しない）
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Push a tag (creates the repository if needed).
    pub fn push(&self, repository: &str, tag: &str) {
        self.with_state(|s| {
            s.repositories
                .entry(repository.to_string())
                .or_default()
                .insert(tag.to_string());
        });
    }

    pub fn contains(&self, reference: &str) -> bool {
        let Ok(reference) = ArtifactRef::parse(reference) else {
            return false;
        };
        self.with_state(|s| {
            s.repositories
                .get(reference.repository())
                .is_some_and(|tags| tags.contains(reference.tag()))
        })
    }

    pub fn fail_catalog(&self, fail: bool) {
        self.with_state(|s| s.fail_catalog = fail);
    }

    pub fn fail_tags_for(&self, repository: &str) {
        self.with_state(|s| {
            s.fail_tags.insert(repository.to_string());
        });
    }

    pub fn fail_delete_for(&self, reference: &str) {
        self.with_state(|s| {
            s.fail_delete.insert(reference.to_string());
        });
    }

    /// References passed to `delete_artifact`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.with_state(|s| s.delete_calls.clone())
    }
}

#[async_trait]
impl ArtifactDeleter for InMemoryRegistry {
    async fn delete_artifact(
        &self,
        reference: &ArtifactRef,
    ) -> Result<DeleteOutcome, RegistryError> {
        let key = reference.to_string();
        self.with_state(|s| {
            s.delete_calls.push(key.clone());
            if s.fail_delete.contains(&key) {
                return Err(RegistryError::Other(format!("injected delete failure for {key}")));
            }
            let removed = s
                .repositories
                .get_mut(reference.repository())
                .is_some_and(|tags| tags.remove(reference.tag()));
            Ok(if removed {
                DeleteOutcome::Deleted
            } else {
                DeleteOutcome::AlreadyGone
            })
        })
    }
}

#[async_trait]
impl ArtifactCatalog for InMemoryRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError> {
        self.with_state(|s| {
            if s.fail_catalog {
                return Err(RegistryError::Other("injected catalog failure".to_string()));
            }
            Ok(s.repositories.keys().cloned().collect())
        })
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        self.with_state(|s| {
            if s.fail_tags.contains(repository) {
                return Err(RegistryError::Other(format!(
                    "injected tags failure for {repository}"
                )));
            }
            Ok(s.repositories
                .get(repository)
                .map(|tags| tags.iter().cloned().collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_then_delete_again_is_already_gone() {
        let registry = InMemoryRegistry::new();
        registry.push("myapp", "1h");
        let reference = ArtifactRef::parse("myapp:1h").unwrap();

        assert_eq!(
            registry.delete_artifact(&reference).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            registry.delete_artifact(&reference).await.unwrap(),
            DeleteOutcome::AlreadyGone
        );
        assert_eq!(registry.delete_calls(), vec!["myapp:1h", "myapp:1h"]);
        assert!(!registry.contains("myapp:1h"));
    }

    #[tokio::test]
    async fn catalog_lists_repositories_and_tags() {
        let registry = InMemoryRegistry::new();
        registry.push("team/service", "2d");
        registry.push("myapp", "1h");
        registry.push("myapp", "latest");

        assert_eq!(
            registry.list_repositories().await.unwrap(),
            vec!["myapp", "team/service"]
        );
        assert_eq!(
            registry.list_tags("myapp").await.unwrap(),
            vec!["1h", "latest"]
        );
        assert!(registry.list_tags("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let registry = InMemoryRegistry::new();
        registry.push("myapp", "1h");
        registry.fail_catalog(true);
        registry.fail_tags_for("myapp");
        registry.fail_delete_for("myapp:1h");

        assert!(registry.list_repositories().await.is_err());
        assert!(registry.list_tags("myapp").await.is_err());
        let reference = ArtifactRef::parse("myapp:1h").unwrap();
        assert!(registry.delete_artifact(&reference).await.is_err());
        assert!(registry.contains("myapp:1h"));
    }
}
