//! Policy data model and the ACL planner/applier pair (C1–C3).

pub mod acl_applier;
pub mod acl_planner;
pub mod markdown;
pub mod model;
pub mod path_normalizer;
pub mod reconciler;

pub use acl_applier::{apply, AclEntry, AclSystem, ChmodAclSystem};
pub use acl_planner::{diff_plans, plan, AclPlan, PermMap, PlanDiff};
pub use model::{skill_policy_id, FileOperation, Policy, PolicyAction, PolicySet, TargetKind};
pub use path_normalizer::{ancestors_needing_traversal, strip_glob_to_base_path};
pub use reconciler::{
    protect_preset, AclReconcileSubscriber, CommandReconcileSubscriber, MarkdownReconcileSubscriber,
    PolicyStore, ReconcileSubscriber, SecretReconcileSubscriber,
};
