//! Secret Sync (C6): build a `SyncedSecrets` payload from the vault's flat
//! secret list and the current policy set, then push it to the broker.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::Result;
use crate::policy::model::{PolicyAction, PolicySet, TargetKind};

/// Where a secret applies: every policy binding (`global`), none
/// (`standalone`, used only by out-of-band tooling), or a named subset.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretScope {
    Standalone,
    Global,
    Scoped,
}

/// A secret as read from the vault-backed store.
#[derive(Debug, Clone)]
pub struct Secret {
    pub name: String,
    pub value: SecretString,
    pub scope: SecretScope,
    pub policy_ids: Vec<String>,
}

/// Read-only view over the vault's secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// The current secret list, or `None` if the vault is locked.
    async fn list(&self) -> Result<Option<Vec<Secret>>>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyBinding {
    pub policy_id: String,
    pub target: TargetKind,
    pub patterns: Vec<String>,
    pub secrets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncedSecrets {
    pub global_secrets: BTreeMap<String, String>,
    pub policy_bindings: Vec<PolicyBinding>,
}

/// Something that can accept a `SyncedSecrets` payload over the broker
/// transport (implemented by the broker client, C14).
#[async_trait]
pub trait SecretPusher: Send + Sync {
    async fn push_secrets(&self, payload: &SyncedSecrets) -> Result<()>;
}

/// Build the payload per spec.md §4.6: `standalone` secrets are dropped,
/// `global` (or empty `policyIds`) secrets go into `globalSecrets`,
/// otherwise each named policy id gets its own binding — skipping ids that
/// don't resolve to an enabled `url`/`command` policy.
pub fn build_payload(secrets: &[Secret], policies: &PolicySet) -> SyncedSecrets {
    let mut payload = SyncedSecrets::default();

    for secret in secrets {
        match secret.scope {
            SecretScope::Standalone => continue,
            SecretScope::Global => {
                payload
                    .global_secrets
                    .insert(secret.name.clone(), secret.value.expose_secret().to_string());
            }
            SecretScope::Scoped => {
                if secret.policy_ids.is_empty() {
                    payload
                        .global_secrets
                        .insert(secret.name.clone(), secret.value.expose_secret().to_string());
                    continue;
                }
                for policy_id in &secret.policy_ids {
                    let Some(policy) = policies.get(policy_id) else { continue };
                    if !policy.enabled {
                        continue;
                    }
                    if !matches!(policy.target, TargetKind::Url | TargetKind::Command) {
                        continue;
                    }

                    let binding = match payload
                        .policy_bindings
                        .iter_mut()
                        .find(|b| &b.policy_id == policy_id)
                    {
                        Some(b) => b,
                        None => {
                            payload.policy_bindings.push(PolicyBinding {
                                policy_id: policy_id.clone(),
                                target: policy.target,
                                patterns: policy.patterns.clone(),
                                secrets: BTreeMap::new(),
                            });
                            payload.policy_bindings.last_mut().unwrap()
                        }
                    };
                    binding
                        .secrets
                        .insert(secret.name.clone(), secret.value.expose_secret().to_string());
                }
            }
        }
    }

    payload
}

/// Fetch the current secret list and push it to the broker. If the vault
/// is locked, push an empty payload so the broker still reaches a clean
/// state (spec.md §4.6).
pub async fn sync(
    store: &dyn SecretStore,
    policies: &PolicySet,
    pusher: &dyn SecretPusher,
) -> Result<()> {
    let payload = match store.list().await? {
        Some(secrets) => build_payload(&secrets, policies),
        None => SyncedSecrets::default(),
    };
    pusher.push_secrets(&payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::Policy;
    use std::sync::Mutex;

    fn secret(name: &str, scope: SecretScope, policy_ids: &[&str]) -> Secret {
        Secret {
            name: name.to_string(),
            value: SecretString::from(format!("{name}-value")),
            scope,
            policy_ids: policy_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn command_policy(id: &str, enabled: bool) -> Policy {
        Policy {
            id: id.to_string(),
            action: PolicyAction::Allow,
            target: TargetKind::Command,
            patterns: vec!["git".to_string()],
            operations: vec![],
            enabled,
            preset: None,
            name: None,
        }
    }

    fn deny_command_policy(id: &str) -> Policy {
        Policy {
            id: id.to_string(),
            action: PolicyAction::Deny,
            target: TargetKind::Command,
            patterns: vec!["git".to_string()],
            operations: vec![],
            enabled: true,
            preset: None,
            name: None,
        }
    }

    #[test]
    fn standalone_secrets_never_appear() {
        let secrets = vec![secret("s1", SecretScope::Standalone, &[])];
        let payload = build_payload(&secrets, &PolicySet::default());
        assert!(payload.global_secrets.is_empty());
        assert!(payload.policy_bindings.is_empty());
    }

    #[test]
    fn global_scope_populates_global_secrets() {
        let secrets = vec![secret("s1", SecretScope::Global, &[])];
        let payload = build_payload(&secrets, &PolicySet::default());
        assert_eq!(payload.global_secrets.get("s1").unwrap(), "s1-value");
    }

    #[test]
    fn scoped_with_empty_policy_ids_is_global() {
        let secrets = vec![secret("s1", SecretScope::Scoped, &[])];
        let payload = build_payload(&secrets, &PolicySet::default());
        assert_eq!(payload.global_secrets.get("s1").unwrap(), "s1-value");
    }

    #[test]
    fn scoped_secret_binds_to_enabled_command_policy() {
        let mut policies = PolicySet::default();
        policies.upsert(command_policy("p1", true));
        let secrets = vec![secret("s1", SecretScope::Scoped, &["p1"])];

        let payload = build_payload(&secrets, &policies);
        assert_eq!(payload.policy_bindings.len(), 1);
        assert_eq!(payload.policy_bindings[0].secrets.get("s1").unwrap(), "s1-value");
    }

    #[test]
    fn scoped_secret_binds_to_enabled_deny_command_policy() {
        let mut policies = PolicySet::default();
        policies.upsert(deny_command_policy("p1"));
        let secrets = vec![secret("s1", SecretScope::Scoped, &["p1"])];

        let payload = build_payload(&secrets, &policies);
        assert_eq!(payload.policy_bindings.len(), 1);
        assert_eq!(payload.policy_bindings[0].secrets.get("s1").unwrap(), "s1-value");
    }

    #[test]
    fn scoped_secret_skips_disabled_or_missing_policy() {
        let mut policies = PolicySet::default();
        policies.upsert(command_policy("p1", false));
        let secrets = vec![secret("s1", SecretScope::Scoped, &["p1", "missing"])];

        let payload = build_payload(&secrets, &policies);
        assert!(payload.policy_bindings.is_empty());
    }

    #[tokio::test]
    async fn sync_pushes_empty_payload_when_vault_locked() {
        struct LockedStore;
        #[async_trait]
        impl SecretStore for LockedStore {
            async fn list(&self) -> Result<Option<Vec<Secret>>> {
                Ok(None)
            }
        }

        struct RecordingPusher(Mutex<Option<SyncedSecrets>>);
        #[async_trait]
        impl SecretPusher for RecordingPusher {
            async fn push_secrets(&self, payload: &SyncedSecrets) -> Result<()> {
                *self.0.lock().unwrap() = Some(payload.clone());
                Ok(())
            }
        }

        let pusher = RecordingPusher(Mutex::new(None));
        sync(&LockedStore, &PolicySet::default(), &pusher).await.unwrap();
        let pushed = pusher.0.lock().unwrap().clone().unwrap();
        assert!(pushed.global_secrets.is_empty());
    }
}
