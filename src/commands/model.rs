//! Command allowlist manifest shape (spec.md §4.4), as written to the
//! well-known path the broker and wrapper shims read.

use serde::{Deserialize, Serialize};

/// Manifest schema version, bumped when the on-disk shape changes.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub name: String,
    pub paths: Vec<String>,
    pub added_at: String,
    pub added_by: String,
    pub category: String,
}

impl CommandEntry {
    pub fn policy_managed(name: String, paths: Vec<String>, added_at: String) -> Self {
        Self {
            name,
            paths,
            added_at,
            added_by: "policy".to_string(),
            category: "policy-managed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandManifest {
    pub version: u32,
    pub commands: Vec<CommandEntry>,
}

impl CommandManifest {
    pub fn new(commands: Vec<CommandEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            commands,
        }
    }
}
