//! Seam between the skill lifecycle manager / watcher and the policy
//! reconciler (spec.md §9 "break the cyclic coupling"): adding or
//! removing a skill's `allow` policy without either side depending on the
//! other's internals. Implemented by [`crate::policy::PolicyStore`].

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait SkillPolicyRegistrar: Send + Sync {
    async fn add_skill_policy(&self, slug: &str) -> Result<()>;
    async fn remove_skill_policy(&self, slug: &str) -> Result<()>;
}
