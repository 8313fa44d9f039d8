//! ACL Planner (C2): turn a policy set into `{allow, deny}` path → permission
//! maps, including traversal ancestors (spec.md §3 "ACL Map", §4.2).

use std::collections::{BTreeMap, BTreeSet};

use super::model::{FileOperation, Policy, PolicyAction, PolicySet};
use super::path_normalizer::{ancestors_needing_traversal, strip_glob_to_base_path};

/// Permission strings granted by `file_read`.
const READ_PERMS: &[&str] = &["read", "readattr", "readextattr", "list", "search", "execute"];
/// Permission strings granted by `file_write`.
const WRITE_PERMS: &[&str] = &["write", "append", "writeattr", "writeextattr"];

/// Path → ordered, deduplicated permission set, keyed by absolute path.
pub type PermMap = BTreeMap<String, BTreeSet<String>>;

/// The output of the ACL planner: allow and deny permission maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclPlan {
    pub allow: PermMap,
    pub deny: PermMap,
}

impl AclPlan {
    /// Render a path's permission set as the comma-separated string the ACL
    /// applier expects.
    pub fn perms_string(perms: &BTreeSet<String>) -> String {
        perms.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

fn perms_for_operations(operations: &[FileOperation]) -> BTreeSet<String> {
    let mut perms = BTreeSet::new();
    for op in operations {
        let additions: &[&str] = match op {
            FileOperation::FileRead => READ_PERMS,
            FileOperation::FileWrite => WRITE_PERMS,
            FileOperation::FileList => &["list", "search"],
        };
        perms.extend(additions.iter().map(|s| s.to_string()));
    }
    perms
}

fn merge_into(map: &mut PermMap, path: String, perms: BTreeSet<String>) {
    map.entry(path).or_default().extend(perms);
}

/// Compute the `{allow, deny}` ACL plan for a policy set.
///
/// Deterministic: the same policy set always produces the same maps,
/// regardless of input ordering, since both `PermMap` and its value sets
/// are ordered collections.
pub fn plan(policies: &PolicySet, home: &str) -> AclPlan {
    let mut out = AclPlan::default();

    let relevant: Vec<&Policy> = policies.enabled().filter(|p| p.is_fs_relevant()).collect();

    // Pass 1: allow policies — direct targets plus traversal ancestors.
    for policy in relevant.iter().filter(|p| p.action == PolicyAction::Allow) {
        let perms = perms_for_operations(&policy.operations);
        for pattern in &policy.patterns {
            let base = strip_glob_to_base_path(pattern, home);
            if base.is_empty() {
                continue;
            }
            merge_into(&mut out.allow, base.clone(), perms.clone());

            for ancestor in ancestors_needing_traversal(&base) {
                let mut search_only = BTreeSet::new();
                search_only.insert("search".to_string());
                merge_into(&mut out.allow, ancestor, search_only);
            }
        }
    }

    // Pass 2: deny policies — direct targets only, no ancestor walk.
    for policy in relevant.iter().filter(|p| p.action == PolicyAction::Deny) {
        let perms = perms_for_operations(&policy.operations);
        for pattern in &policy.patterns {
            let base = strip_glob_to_base_path(pattern, home);
            if base.is_empty() {
                continue;
            }
            merge_into(&mut out.deny, base, perms.clone());
        }
    }

    out
}

/// A path-level diff between two plans, used to check idempotence and to
/// drive the ACL applier's per-path mutation loop without recomputing full
/// maps on every reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

fn diff_side(old: &PermMap, new: &PermMap, diff: &mut PlanDiff) {
    for path in new.keys() {
        match old.get(path) {
            None => diff.added.push(path.clone()),
            Some(old_perms) if old_perms != &new[path] => diff.changed.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            diff.removed.push(path.clone());
        }
    }
}

/// Diff two ACL plans' allow+deny maps together (a path moving between
/// allow and deny counts as "changed").
pub fn diff_plans(old: &AclPlan, new: &AclPlan) -> PlanDiff {
    let mut diff = PlanDiff::default();
    diff_side(&old.allow, &new.allow, &mut diff);
    diff_side(&old.deny, &new.deny, &mut diff);
    diff.added.sort();
    diff.added.dedup();
    diff.removed.sort();
    diff.removed.dedup();
    diff.changed.sort();
    diff.changed.dedup();
    diff
}
