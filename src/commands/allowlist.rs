//! Command Allowlist Sync (C4): resolve policy-named commands to absolute
//! binary paths and write the manifest the broker and wrapper shims read.

use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::model::{CommandEntry, CommandManifest};
use crate::error::Result;
use crate::policy::model::{PolicyAction, PolicySet, TargetKind};
use crate::util::atomic_write;

/// Parse a `command` policy's pattern down to the bare command name: trim,
/// strip a trailing `:*`, take the first whitespace-delimited token.
fn parse_command_name(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim();
    let trimmed = trimmed.strip_suffix(":*").unwrap_or(trimmed);
    let name = trimmed.split_whitespace().next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Unique command base names drawn from enabled `allow`/`command` policies.
pub fn extract_command_names(policies: &PolicySet) -> BTreeSet<String> {
    policies
        .enabled()
        .filter(|p| p.target == TargetKind::Command && p.action == PolicyAction::Allow)
        .flat_map(|p| p.patterns.iter())
        .filter_map(|pattern| parse_command_name(pattern))
        .collect()
}

async fn is_executable_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.permissions().mode() & 0o111 != 0,
        _ => false,
    }
}

/// Scan `bin_dirs` in order for `name`; fall back to a `PATH` lookup.
pub async fn resolve_command_paths(name: &str, bin_dirs: &[PathBuf]) -> Vec<String> {
    let mut found = Vec::new();

    for dir in bin_dirs {
        let candidate = dir.join(name);
        if is_executable_file(&candidate).await {
            found.push(candidate.to_string_lossy().to_string());
        }
    }

    if found.is_empty() {
        if let Ok(path_var) = std::env::var("PATH") {
            for dir in std::env::split_paths(&path_var) {
                let candidate = dir.join(name);
                if is_executable_file(&candidate).await {
                    found.push(candidate.to_string_lossy().to_string());
                    break;
                }
            }
        }
    }

    found
}

/// Build the manifest for the given command names, resolving each one's
/// paths, and write it atomically to `manifest_path`.
pub async fn sync(
    policies: &PolicySet,
    bin_dirs: &[PathBuf],
    manifest_path: &Path,
) -> Result<CommandManifest> {
    let names = extract_command_names(policies);
    let now = Utc::now().to_rfc3339();

    let mut entries = Vec::new();
    for name in names {
        let paths = resolve_command_paths(&name, bin_dirs).await;
        entries.push(CommandEntry::policy_managed(name, paths, now.clone()));
    }

    let manifest = CommandManifest::new(entries);
    let bytes = serde_json::to_vec_pretty(&manifest)?;
    atomic_write(manifest_path, &bytes).await?;
    Ok(manifest)
}
