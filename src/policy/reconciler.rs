//! Policy Reconciler (C12): the top-level entry point that diffs an
//! old/new policy set and fans the result out to the ACL planner/applier
//! (C2+C3), command allowlist + wrapper manager (C4+C5), secret sync (C6),
//! and the policy-instructions markdown generator.
//!
//! `PolicyStore::reconcile` implements spec.md §9's "break the cyclic
//! coupling" note: each downstream component registers as a
//! `ReconcileSubscriber` rather than the reconciler knowing their internals.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::acl_applier::{self, AclSystem};
use super::acl_planner::plan as acl_plan;
use super::model::PolicySet;
use crate::commands::{self, WrapperManager};
use crate::error::Result;
use crate::privileged_fs::PrivilegedFs;
use crate::secrets::{self, SecretPusher, SecretStore};
use crate::util::atomic_write;

/// A component that reacts to a persisted policy change. Implementations
/// are expected to log and continue on internal failure (spec.md §5's
/// "mid-step crash... next successful reconcile restores consistency");
/// `PolicyStore::reconcile` never aborts because a subscriber failed.
#[async_trait]
pub trait ReconcileSubscriber: Send + Sync {
    fn name(&self) -> &'static str;
    async fn on_reconcile(&self, old: &PolicySet, new: &PolicySet);
}

/// If the new set dropped a policy owned by `preset`, restore it — presets
/// are protected from accidental removal by a partial `config.update`
/// (spec.md §4.12 step 1).
pub fn protect_preset(new: &mut PolicySet, preset: &PolicySet, preset_id: &str) {
    for id in preset.preset_ids(preset_id) {
        if !new.contains(&id)
            && let Some(policy) = preset.get(&id)
        {
            new.upsert(policy.clone());
        }
    }
}

/// Holds the authoritative policy set, persists it on every reconcile, and
/// notifies subscribers in registration order (spec.md §4.12 steps 3-6).
pub struct PolicyStore {
    current: Mutex<PolicySet>,
    persist_path: PathBuf,
    subscribers: Vec<Arc<dyn ReconcileSubscriber>>,
}

impl PolicyStore {
    pub fn new(
        initial: PolicySet,
        persist_path: PathBuf,
        subscribers: Vec<Arc<dyn ReconcileSubscriber>>,
    ) -> Self {
        Self {
            current: Mutex::new(initial),
            persist_path,
            subscribers,
        }
    }

    pub async fn current(&self) -> PolicySet {
        self.current.lock().await.clone()
    }

    /// Persist `new`, swap it in, and run every subscriber with `(old, new)`.
    /// Persisting is the only fatal step (spec.md §7's "cannot write
    /// approved-skills.json"-class failure); everything after it is
    /// best-effort per spec.md §4.12 steps 5-6.
    pub async fn reconcile(&self, mut new: PolicySet, preset: Option<(&PolicySet, &str)>) -> Result<PolicySet> {
        if let Some((preset_set, preset_id)) = preset {
            protect_preset(&mut new, preset_set, preset_id);
        }

        let data = serde_json::to_vec_pretty(&new)?;
        atomic_write(&self.persist_path, &data).await?;

        let old = {
            let mut guard = self.current.lock().await;
            let old = guard.clone();
            *guard = new.clone();
            old
        };

        for subscriber in &self.subscribers {
            subscriber.on_reconcile(&old, &new).await;
        }

        Ok(new)
    }

    /// Upsert a single policy and reconcile. Used by the skill lifecycle
    /// manager and watcher (spec.md §4.9 step 7, §4.10) rather than
    /// threading a full `PolicySet` through them.
    pub async fn upsert_policy(&self, policy: super::model::Policy) -> Result<()> {
        let mut new = self.current().await;
        new.upsert(policy);
        self.reconcile(new, None).await?;
        Ok(())
    }

    pub async fn remove_policy(&self, id: &str) -> Result<()> {
        let mut new = self.current().await;
        new.remove(id);
        self.reconcile(new, None).await?;
        Ok(())
    }
}

#[async_trait]
impl crate::skills::registrar::SkillPolicyRegistrar for PolicyStore {
    async fn add_skill_policy(&self, slug: &str) -> Result<()> {
        let policy = super::model::Policy {
            id: super::model::skill_policy_id(slug),
            action: super::model::PolicyAction::Allow,
            target: super::model::TargetKind::Skill,
            patterns: vec![slug.to_string()],
            operations: vec![],
            enabled: true,
            preset: None,
            name: None,
        };
        self.upsert_policy(policy).await
    }

    async fn remove_skill_policy(&self, slug: &str) -> Result<()> {
        self.remove_policy(&super::model::skill_policy_id(slug)).await
    }
}

/// C2+C3: recompute the ACL plan for `new` and apply it.
pub struct AclReconcileSubscriber {
    pub acl_system: Arc<dyn AclSystem>,
    pub agent_home: String,
    pub agent_user: String,
}

#[async_trait]
impl ReconcileSubscriber for AclReconcileSubscriber {
    fn name(&self) -> &'static str {
        "acl"
    }

    async fn on_reconcile(&self, _old: &PolicySet, new: &PolicySet) {
        let plan = acl_plan(new, &self.agent_home);
        acl_applier::apply(self.acl_system.as_ref(), &plan, &self.agent_user).await;
    }
}

/// C4+C5: rewrite the command allowlist manifest, then reconcile wrapper
/// shims against it.
pub struct CommandReconcileSubscriber {
    pub bin_dirs: Vec<PathBuf>,
    pub manifest_path: PathBuf,
    pub wrappers: WrapperManager,
}

#[async_trait]
impl ReconcileSubscriber for CommandReconcileSubscriber {
    fn name(&self) -> &'static str {
        "commands"
    }

    async fn on_reconcile(&self, _old: &PolicySet, new: &PolicySet) {
        let names = commands::extract_command_names(new);
        match commands::sync_allowlist(new, &self.bin_dirs, &self.manifest_path).await {
            Ok(_) => {
                if let Err(e) = self.wrappers.ensure_wrappers(&names).await {
                    warn!(error = %e, "wrapper ensure failed during reconcile");
                }
                if let Err(e) = self.wrappers.gc(&names).await {
                    warn!(error = %e, "wrapper gc failed during reconcile");
                }
            }
            Err(e) => warn!(error = %e, "command allowlist sync failed during reconcile"),
        }
    }
}

/// C6: push the synced-secrets payload, non-fatal on error (spec.md §4.12
/// step 5; `secrets::sync` already never propagates a broker failure past
/// an empty-payload fallback).
pub struct SecretReconcileSubscriber {
    pub store: Arc<dyn SecretStore>,
    pub pusher: Arc<dyn SecretPusher>,
}

#[async_trait]
impl ReconcileSubscriber for SecretReconcileSubscriber {
    fn name(&self) -> &'static str {
        "secrets"
    }

    async fn on_reconcile(&self, _old: &PolicySet, new: &PolicySet) {
        if let Err(e) = secrets::sync(self.store.as_ref(), new, self.pusher.as_ref()).await {
            warn!(error = %e, "secret sync failed during reconcile");
        }
    }
}

/// Regenerates the policy-instructions markdown document (spec.md §4.12
/// step 6, §6's "Policy instructions markdown").
pub struct MarkdownReconcileSubscriber {
    pub output_path: PathBuf,
    pub known_skills: Arc<dyn Fn() -> std::collections::BTreeSet<String> + Send + Sync>,
}

#[async_trait]
impl ReconcileSubscriber for MarkdownReconcileSubscriber {
    fn name(&self) -> &'static str {
        "markdown"
    }

    async fn on_reconcile(&self, _old: &PolicySet, new: &PolicySet) {
        let known_skills = (self.known_skills)();
        let doc = super::markdown::render(new, &known_skills);
        if let Err(e) = atomic_write(&self.output_path, doc.as_bytes()).await {
            warn!(error = %e, "policy instructions markdown write failed during reconcile");
        }
    }
}
