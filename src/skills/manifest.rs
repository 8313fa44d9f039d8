//! Approved List (spec.md §3, §6): `approved-skills.json`, a JSON array of
//! entries naming every skill currently trusted to install or run
//! unattended. Demoted entries (hash mismatch) are removed from this list,
//! not flagged within it — membership is the trust signal.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::atomic_write;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovedEntry {
    pub name: String,
    pub approved_at: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ApprovedList {
    entries: Vec<ApprovedEntry>,
}

impl ApprovedList {
    pub fn new(entries: Vec<ApprovedEntry>) -> Self {
        Self { entries }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let entries: Vec<ApprovedEntry> = serde_json::from_slice(&bytes)?;
                Ok(Self { entries })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.entries)?;
        atomic_write(path, &data).await
    }

    pub fn entries(&self) -> &[ApprovedEntry] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ApprovedEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn insert(&mut self, entry: ApprovedEntry) {
        self.entries.retain(|e| e.name != entry.name);
        self.entries.push(entry);
    }

    /// Removes the entry for `name`, used on demotion (spec.md §7, Integrity
    /// violation: "remove from approved list, move to cache").
    pub fn remove(&mut self, name: &str) -> Option<ApprovedEntry> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx))
    }
}
