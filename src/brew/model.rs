//! Brew Manifest persisted shape (spec.md §3, §6): two maps tying Homebrew
//! formulas to the binaries relocated and shimmed on their behalf.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::atomic_write;

fn manifest_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaRecord {
    pub installed_by: Vec<String>,
    pub binaries: Vec<String>,
    pub installed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryRecord {
    pub formula: String,
    pub owning_skills: Vec<String>,
    pub original_path: PathBuf,
    pub wrapper_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrewManifest {
    #[serde(default = "manifest_version")]
    pub version: String,
    #[serde(default)]
    pub formulas: BTreeMap<String, FormulaRecord>,
    #[serde(default)]
    pub binaries: BTreeMap<String, BinaryRecord>,
}

impl Default for BrewManifest {
    fn default() -> Self {
        Self {
            version: manifest_version(),
            formulas: BTreeMap::new(),
            binaries: BTreeMap::new(),
        }
    }
}

impl BrewManifest {
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &data).await
    }
}
