//! Content hashing for deployed skill trees (spec.md §4.9 step 9, §4.10,
//! §8's integrity invariants). Shared by the lifecycle manager's baseline
//! computation, the watcher's tamper check, and the integrity-check
//! operation.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use super::repository::FileRecord;
use crate::error::Result;

/// Walk `root` recursively, returning one `FileRecord` per regular file
/// with its path relative to `root` (forward-slash separated) and the
/// SHA-256 of `path || content`, sorted by path. Sorting first makes the
/// result — and therefore `combine_hash` — independent of directory
/// iteration order.
pub async fn hash_file_entries(root: &Path) -> Result<Vec<FileRecord>> {
    let mut files = Vec::new();
    walk(root, root, &mut files).await?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    out: &'a mut Vec<FileRecord>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                walk(root, &path, out).await?;
            } else if file_type.is_file() {
                let content = tokio::fs::read(&path).await?;
                let relative = relative_slash_path(root, &path);
                let mut hasher = Sha256::new();
                hasher.update(relative.as_bytes());
                hasher.update(&content);
                let sha256 = hasher
                    .finalize()
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<String>();
                out.push(FileRecord { path: relative, sha256 });
            }
        }
        Ok(())
    })
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Same hashing rule as [`hash_file_entries`] but over in-memory content,
/// for bundles not yet written to disk (spec.md §4.9 step 5's pre-deploy
/// registration).
pub fn hash_entries_from_map(files: &std::collections::BTreeMap<String, String>) -> Vec<FileRecord> {
    files
        .iter()
        .map(|(path, content)| {
            let mut hasher = Sha256::new();
            hasher.update(path.as_bytes());
            hasher.update(content.as_bytes());
            let sha256 = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();
            FileRecord { path: path.clone(), sha256 }
        })
        .collect()
}

/// Combine per-file hashes (already sorted by path) into a single baseline
/// hash for the Approved List entry.
pub fn combine_hash(entries: &[FileRecord]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.path.as_bytes());
        hasher.update(entry.sha256.as_bytes());
    }
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the single baseline hash for a deployed tree.
pub async fn hash_tree(root: &Path) -> Result<String> {
    let entries = hash_file_entries(root).await?;
    Ok(combine_hash(&entries))
}

/// The most recent modification time among every file in the tree
/// (directories themselves are not considered), used by the watcher's
/// mtime cache to skip re-hashing unchanged trees.
pub async fn max_mtime(root: &Path) -> Result<SystemTime> {
    let entries = hash_file_entries_with_mtime(root).await?;
    Ok(entries.into_iter().max().unwrap_or(SystemTime::UNIX_EPOCH))
}

async fn hash_file_entries_with_mtime(root: &Path) -> Result<Vec<SystemTime>> {
    let mut mtimes = Vec::new();
    walk_mtimes(root, &mut mtimes).await?;
    Ok(mtimes)
}

fn walk_mtimes<'a>(
    dir: &'a Path,
    out: &'a mut Vec<SystemTime>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path: PathBuf = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                walk_mtimes(&path, out).await?;
            } else if file_type.is_file() {
                let meta = entry.metadata().await?;
                out.push(meta.modified()?);
            }
        }
        Ok(())
    })
}

/// Integrity check result (spec.md §4.9's "Integrity check" operation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub modified_files: Vec<String>,
    pub missing_files: Vec<String>,
    pub unexpected_files: Vec<String>,
}

impl IntegrityReport {
    pub fn intact(&self) -> bool {
        self.modified_files.is_empty() && self.missing_files.is_empty() && self.unexpected_files.is_empty()
    }
}

/// Compare a deployed tree's current content against the recorded
/// baseline file list.
pub async fn check_integrity(root: &Path, baseline: &[FileRecord]) -> Result<IntegrityReport> {
    let current = hash_file_entries(root).await?;
    let mut report = IntegrityReport::default();

    for expected in baseline {
        match current.iter().find(|f| f.path == expected.path) {
            None => report.missing_files.push(expected.path.clone()),
            Some(actual) if actual.sha256 != expected.sha256 => {
                report.modified_files.push(expected.path.clone())
            }
            Some(_) => {}
        }
    }
    for actual in &current {
        if !baseline.iter().any(|f| f.path == actual.path) {
            report.unexpected_files.push(actual.path.clone());
        }
    }

    Ok(report)
}
