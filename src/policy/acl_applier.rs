//! ACL Applier (C3): wipe-then-reapply user ACL entries on a path.
//!
//! The underlying OS evaluates ACLs top-to-bottom, so a wipe-then-reapply
//! guarantees canonical ordering regardless of what was there before
//! (spec.md §4.3). Errors on individual paths are logged and never halt
//! the overall reconciliation.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use super::acl_planner::AclPlan;
use crate::error::Result;

/// A single ACL entry on a path, as the host's ACL subsystem represents it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub user: String,
    pub deny: bool,
    pub perms: BTreeSet<String>,
}

/// Abstraction over the host's native ACL mechanism (macOS `chmod +a` /
/// `ls -le` NFSv4-style ACLs in the reference deployment). Subprocess
/// parsing of `ls -le` output is acknowledged as fragile (spec.md §9 open
/// questions) — a future revision should prefer native syscalls
/// (`acl_get_file`/`acl_set_file`) where the target platform exposes them.
#[async_trait]
pub trait AclSystem: Send + Sync {
    /// List ACL entries on `path`, highest index last.
    async fn list_entries(&self, path: &Path) -> Result<Vec<AclEntry>>;
    /// Remove the entry at `index` (as returned by `list_entries`'s
    /// position). Implementations must tolerate a missing path by
    /// returning an empty list / no-op, not an error.
    async fn remove_entry(&self, path: &Path, index: usize) -> Result<()>;
    /// Prepend a new entry at the top of the ACL.
    async fn add_entry(&self, path: &Path, entry: &AclEntry) -> Result<()>;
    /// Whether `path` exists on disk (non-existent paths are skipped with
    /// a warning rather than failing the reconcile).
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// macOS ACL system driven by `chmod +a` / `chmod -a#` and `ls -le`.
pub struct ChmodAclSystem;

#[async_trait]
impl AclSystem for ChmodAclSystem {
    async fn list_entries(&self, path: &Path) -> Result<Vec<AclEntry>> {
        let output = tokio::process::Command::new("ls")
            .arg("-le")
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            return Ok(Vec::new());
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ls_le(&text))
    }

    async fn remove_entry(&self, path: &Path, index: usize) -> Result<()> {
        let output = tokio::process::Command::new("chmod")
            .arg(format!("-a#{index}"))
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            warn!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "failed to remove ACL entry"
            );
        }
        Ok(())
    }

    async fn add_entry(&self, path: &Path, entry: &AclEntry) -> Result<()> {
        let verb = if entry.deny { "deny" } else { "allow" };
        let spec = format!(
            "{} {} {}",
            entry.user,
            verb,
            entry.perms.iter().cloned().collect::<Vec<_>>().join(",")
        );
        let output = tokio::process::Command::new("chmod")
            .arg("+a")
            .arg(&spec)
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            warn!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "failed to add ACL entry"
            );
        }
        Ok(())
    }
}

/// Parse `ls -le` output into `AclEntry` rows naming any user (the caller
/// filters to the agent user). Lines of interest look like:
/// ` 0: user:ash_default_agent allow read,write,search`
fn parse_ls_le(text: &str) -> Vec<AclEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        let Some(colon) = trimmed.find(':') else { continue };
        let rest = trimmed[colon + 1..].trim();
        // Expect `user:<name> (allow|deny) perm,perm,...`
        let Some(stripped) = rest.strip_prefix("user:") else { continue };
        let mut parts = stripped.splitn(3, ' ');
        let Some(user) = parts.next() else { continue };
        let Some(verb) = parts.next() else { continue };
        let Some(perms_str) = parts.next() else { continue };
        let deny = verb == "deny";
        if verb != "allow" && verb != "deny" {
            continue;
        }
        let perms = perms_str.split(',').map(|s| s.trim().to_string()).collect();
        entries.push(AclEntry {
            user: user.to_string(),
            deny,
            perms,
        });
    }
    entries
}

/// Apply an `AclPlan` to the host, for every path named in either map.
///
/// Per path: remove every existing entry naming `agent_user` (highest
/// index first so indices stay valid across removals), then add the deny
/// entry (if any), then the allow entry (if any).
pub async fn apply(system: &dyn AclSystem, plan: &AclPlan, agent_user: &str) {
    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(plan.allow.keys());
    paths.extend(plan.deny.keys());

    for path_str in paths {
        let path = Path::new(path_str);
        if !system.exists(path).await {
            warn!(path = %path_str, "ACL target does not exist, skipping");
            continue;
        }

        match apply_to_path(system, path, plan, agent_user).await {
            Ok(()) => {}
            Err(e) => warn!(path = %path_str, error = %e, "failed to apply ACL to path"),
        }
    }
}

async fn apply_to_path(
    system: &dyn AclSystem,
    path: &Path,
    plan: &AclPlan,
    agent_user: &str,
) -> Result<()> {
    let existing = system.list_entries(path).await?;

    // Remove highest-index-first so indices remain valid.
    for (index, entry) in existing.iter().enumerate().rev() {
        if entry.user == agent_user {
            system.remove_entry(path, index).await?;
        }
    }

    let path_str = path.to_string_lossy().to_string();

    if let Some(perms) = plan.deny.get(&path_str) {
        system
            .add_entry(
                path,
                &AclEntry {
                    user: agent_user.to_string(),
                    deny: true,
                    perms: perms.clone(),
                },
            )
            .await?;
    }

    if let Some(perms) = plan.allow.get(&path_str) {
        system
            .add_entry(
                path,
                &AclEntry {
                    user: agent_user.to_string(),
                    deny: false,
                    perms: perms.clone(),
                },
            )
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordedOp {
        removed: Vec<usize>,
        added: Vec<AclEntry>,
    }

    struct FakeAclSystem {
        initial: Vec<AclEntry>,
        ops: Mutex<RecordedOp>,
        existing_paths: BTreeSet<String>,
    }

    #[async_trait]
    impl AclSystem for FakeAclSystem {
        async fn list_entries(&self, _path: &Path) -> Result<Vec<AclEntry>> {
            Ok(self.initial.clone())
        }
        async fn remove_entry(&self, _path: &Path, index: usize) -> Result<()> {
            self.ops.lock().unwrap().removed.push(index);
            Ok(())
        }
        async fn add_entry(&self, _path: &Path, entry: &AclEntry) -> Result<()> {
            self.ops.lock().unwrap().added.push(entry.clone());
            Ok(())
        }
        async fn exists(&self, path: &Path) -> bool {
            self.existing_paths.contains(&path.to_string_lossy().to_string())
        }
    }

    fn perms(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn wipe_then_reapply_removes_highest_index_first() {
        let system = FakeAclSystem {
            initial: vec![
                AclEntry { user: "agent".into(), deny: false, perms: perms(&["read"]) },
                AclEntry { user: "other".into(), deny: false, perms: perms(&["read"]) },
                AclEntry { user: "agent".into(), deny: true, perms: perms(&["write"]) },
            ],
            ops: Mutex::new(RecordedOp::default()),
            existing_paths: BTreeSet::from(["/a".to_string()]),
        };

        let mut plan = AclPlan::default();
        plan.allow.insert("/a".to_string(), perms(&["read"]));

        apply_to_path(&system, Path::new("/a"), &plan, "agent").await.unwrap();

        let ops = system.ops.lock().unwrap();
        // Indices 2 and 0 belong to "agent"; must be removed in descending order.
        assert_eq!(ops.removed, vec![2, 0]);
        assert_eq!(ops.added.len(), 1);
        assert!(!ops.added[0].deny);
    }

    #[tokio::test]
    async fn deny_added_before_allow() {
        let system = FakeAclSystem {
            initial: vec![],
            ops: Mutex::new(RecordedOp::default()),
            existing_paths: BTreeSet::from(["/a".to_string()]),
        };

        let mut plan = AclPlan::default();
        plan.allow.insert("/a".to_string(), perms(&["search"]));
        plan.deny.insert("/a".to_string(), perms(&["read"]));

        apply_to_path(&system, Path::new("/a"), &plan, "agent").await.unwrap();

        let ops = system.ops.lock().unwrap();
        assert_eq!(ops.added.len(), 2);
        assert!(ops.added[0].deny, "deny must be added first");
        assert!(!ops.added[1].deny, "allow must be added second");
    }

    #[tokio::test]
    async fn nonexistent_path_is_skipped_without_error() {
        let system = FakeAclSystem {
            initial: vec![],
            ops: Mutex::new(RecordedOp::default()),
            existing_paths: BTreeSet::new(),
        };
        let mut plan = AclPlan::default();
        plan.allow.insert("/missing".to_string(), perms(&["read"]));
        apply(&system, &plan, "agent").await;
        assert!(system.ops.lock().unwrap().added.is_empty());
    }

    #[test]
    fn parse_ls_le_extracts_user_entries() {
        let text = " 0: user:ash_default_agent deny write,append\n 1: user:ash_default_agent allow read,search\n";
        let entries = parse_ls_le(text);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].deny);
        assert!(!entries[1].deny);
        assert!(entries[1].perms.contains("read"));
    }
}
