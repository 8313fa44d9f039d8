//! Command allowlist sync (C4) and wrapper shim management (C5).

pub mod allowlist;
pub mod model;
pub mod wrapper;

pub use allowlist::{extract_command_names, resolve_command_paths, sync as sync_allowlist};
pub use model::{CommandEntry, CommandManifest};
pub use wrapper::{protected_commands, WrapperManager, CANONICAL_PROXIED_COMMANDS};
