//! Policy data model (spec.md §3 "Policy").
//!
//! A `Policy` is the unit the operator edits via `config.update`; the
//! reconciler diffs old/new policy sets and fans the result out to the ACL
//! planner, command allowlist, wrapper manager, and secret sync.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Whether a policy permits or forbids the matched targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
}

/// What kind of resource a policy's patterns match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Filesystem,
    Command,
    Url,
    Skill,
}

/// A filesystem operation a `filesystem`-target policy may grant or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    FileRead,
    FileWrite,
    FileList,
}

/// A single policy entry.
///
/// `(id, action, target, patterns, operations, enabled)` uniquely determine
/// the reconciler's output for this policy — two policies with identical
/// tuples are interchangeable for every downstream component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub action: PolicyAction,
    pub target: TargetKind,
    pub patterns: Vec<String>,
    /// Only meaningful for `target == Filesystem`; empty for other targets.
    #[serde(default)]
    pub operations: Vec<FileOperation>,
    pub enabled: bool,
    /// Id of the preset that owns this policy, if any (e.g. "agenco", "openclaw").
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Policy {
    pub fn is_filesystem(&self) -> bool {
        self.target == TargetKind::Filesystem
    }

    /// True when this policy is relevant to filesystem ACL planning: either
    /// a direct `filesystem` policy, or a `command` policy whose operations
    /// include a filesystem-touching verb (spec.md §4.2).
    pub fn is_fs_relevant(&self) -> bool {
        match self.target {
            TargetKind::Filesystem => true,
            TargetKind::Command => self.operations.iter().any(|op| {
                matches!(
                    op,
                    FileOperation::FileRead | FileOperation::FileWrite | FileOperation::FileList
                )
            }),
            _ => false,
        }
    }

    pub fn is_skill_policy_for(&self, slug: &str) -> bool {
        self.target == TargetKind::Skill && self.id == skill_policy_id(slug)
    }
}

/// The policy id used for a skill's `allow` entry (spec.md §4.9 step 7).
pub fn skill_policy_id(slug: &str) -> String {
    format!("skill-{slug}")
}

/// A full policy set as stored and reconciled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    pub policies: Vec<Policy>,
}

impl PolicySet {
    pub fn enabled(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter().filter(|p| p.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.policies.iter().any(|p| p.id == id)
    }

    /// Ids belonging to the given preset.
    pub fn preset_ids(&self, preset: &str) -> HashSet<String> {
        self.policies
            .iter()
            .filter(|p| p.preset.as_deref() == Some(preset))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Upsert a policy by id (used by the skill lifecycle manager to add
    /// `skill-<slug>` entries, and by preset protection to restore
    /// preset-owned policies a PUT omitted).
    pub fn upsert(&mut self, policy: Policy) {
        if let Some(existing) = self.policies.iter_mut().find(|p| p.id == policy.id) {
            *existing = policy;
        } else {
            self.policies.push(policy);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Policy> {
        let idx = self.policies.iter().position(|p| p.id == id)?;
        Some(self.policies.remove(idx))
    }
}
