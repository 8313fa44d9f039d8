//! The persistent skill repository (spec.md §4.9 step 5): an external
//! collaborator that tracks every version ever installed for a slug, so
//! the lifecycle manager can detect whether a re-install is actually new
//! content or a replay of something already seen. Out of scope per
//! spec.md §1; modeled as a trait with an in-memory default.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: String,
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub revoked: bool,
}

#[async_trait]
pub trait SkillRepository: Send + Sync {
    async fn versions(&self, slug: &str) -> Result<Vec<VersionRecord>>;
    async fn record_version(&self, slug: &str, version: VersionRecord) -> Result<()>;
    async fn revoke_version(&self, slug: &str, version: &str) -> Result<()>;

    /// The newest non-revoked version, if any.
    async fn latest(&self, slug: &str) -> Result<Option<VersionRecord>> {
        let versions = self.versions(slug).await?;
        Ok(versions.into_iter().rev().find(|v| !v.revoked))
    }
}

/// Replicated-state default (spec.md §9): holds every version in memory,
/// keyed by slug, in insertion order.
#[derive(Default)]
pub struct InMemorySkillRepository {
    state: Mutex<BTreeMap<String, Vec<VersionRecord>>>,
}

impl InMemorySkillRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SkillRepository for InMemorySkillRepository {
    async fn versions(&self, slug: &str) -> Result<Vec<VersionRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.get(slug).cloned().unwrap_or_default())
    }

    async fn record_version(&self, slug: &str, version: VersionRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(slug.to_string()).or_default();
        entry.retain(|v| v.version != version.version);
        entry.push(version);
        Ok(())
    }

    async fn revoke_version(&self, slug: &str, version: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.get_mut(slug) {
            for record in entry.iter_mut().filter(|v| v.version == version) {
                record.revoked = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str) -> VersionRecord {
        VersionRecord {
            version: v.to_string(),
            files: vec![FileRecord {
                path: "SKILL.md".to_string(),
                sha256: "abc".to_string(),
            }],
            revoked: false,
        }
    }

    #[tokio::test]
    async fn latest_skips_revoked_versions() {
        let repo = InMemorySkillRepository::new();
        repo.record_version("weather", version("1.0.0")).await.unwrap();
        repo.record_version("weather", version("2.0.0")).await.unwrap();
        repo.revoke_version("weather", "2.0.0").await.unwrap();

        let latest = repo.latest("weather").await.unwrap().unwrap();
        assert_eq!(latest.version, "1.0.0");
    }

    #[tokio::test]
    async fn record_version_replaces_same_version() {
        let repo = InMemorySkillRepository::new();
        repo.record_version("weather", version("1.0.0")).await.unwrap();
        let mut updated = version("1.0.0");
        updated.files[0].sha256 = "def".to_string();
        repo.record_version("weather", updated).await.unwrap();

        let versions = repo.versions("weather").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].files[0].sha256, "def");
    }

    #[tokio::test]
    async fn unknown_slug_returns_empty_history() {
        let repo = InMemorySkillRepository::new();
        assert!(repo.versions("missing").await.unwrap().is_empty());
        assert!(repo.latest("missing").await.unwrap().is_none());
    }
}
