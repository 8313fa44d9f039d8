//! Wrapper Manager (C5): install/remove command-shim files in the agent's
//! bin directories and garbage-collect stale ones.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::privileged_fs::PrivilegedFs;

/// Commands always shimmed regardless of policy, compiled in (spec.md §4.5).
pub const CANONICAL_PROXIED_COMMANDS: &[&str] = &[
    "curl", "wget", "git", "ssh", "scp", "rsync", "brew", "npm", "npx", "pip", "pip3",
    "open-url", "shieldctl", "agenco",
];

/// Interpreters a wrapper must never shadow.
const PROTECTED_INTERPRETERS: &[&str] = &["node", "python", "python3"];

/// Basic system commands the manager never writes or removes a shim for.
const BASIC_SYSTEM_COMMANDS: &[&str] = &[
    "ls", "cat", "echo", "pwd", "cd", "mkdir", "rm", "cp", "mv", "chmod", "chown", "ps",
    "kill", "grep", "sed", "awk", "which", "env", "true", "false", "test", "sh", "bash",
];

/// Marker embedded in a generated bash wrapper so garbage collection can
/// recognize our own files without tracking every path in a manifest.
pub const AUTO_GENERATED_MARKER: &str = "# agenshield-generated-wrapper";

pub fn protected_commands() -> BTreeSet<String> {
    CANONICAL_PROXIED_COMMANDS
        .iter()
        .chain(PROTECTED_INTERPRETERS.iter())
        .chain(BASIC_SYSTEM_COMMANDS.iter())
        .map(|s| s.to_string())
        .collect()
}

fn generated_wrapper_script(command: &str) -> String {
    format!(
        "#!/bin/bash\n{AUTO_GENERATED_MARKER}\n\
pwd >/dev/null 2>&1 || cd ~ || cd / || exit 1\n\
exec /opt/agenshield/bin/shield-client exec {command} \"$@\"\n"
    )
}

pub struct WrapperManager {
    pub bin_dirs: Vec<PathBuf>,
    pub shield_exec_path: Option<PathBuf>,
    pub fs: Arc<dyn PrivilegedFs>,
}

impl WrapperManager {
    /// Ensure a shim exists for every canonical proxied command plus every
    /// policy-managed command not already protected.
    pub async fn ensure_wrappers(&self, policy_commands: &BTreeSet<String>) -> Result<()> {
        let protected = protected_commands();
        let mut wanted: BTreeSet<String> =
            CANONICAL_PROXIED_COMMANDS.iter().map(|s| s.to_string()).collect();
        wanted.extend(policy_commands.iter().filter(|c| !protected.contains(*c)).cloned());

        for dir in &self.bin_dirs {
            self.fs.mkdir(dir).await?;
            for name in &wanted {
                if let Err(e) = self.ensure_shim(dir, name).await {
                    warn!(command = %name, dir = %dir.display(), error = %e, "failed to install wrapper");
                }
            }
        }
        Ok(())
    }

    async fn ensure_shim(&self, dir: &Path, name: &str) -> Result<()> {
        let path = dir.join(name);

        if let Some(shield_exec) = &self.shield_exec_path {
            let _ = self.fs.rm(&path).await;
            if tokio::fs::symlink(shield_exec, &path).await.is_ok() {
                return Ok(());
            }
        }

        let script = generated_wrapper_script(name);
        self.fs.write_file(&path, script.as_bytes(), 0o755).await
    }

    /// Remove shims that are neither protected nor named by the current
    /// policy command set, provided they carry our marker (or point at
    /// `shield_exec_path`). Never touches `.brew-originals/`.
    pub async fn gc(&self, policy_commands: &BTreeSet<String>) -> Result<()> {
        let protected = protected_commands();

        for dir in &self.bin_dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name == ".brew-originals" {
                    continue;
                }
                if protected.contains(&name) || policy_commands.contains(&name) {
                    continue;
                }

                let path = entry.path();
                if self.is_our_shim(&path).await {
                    if let Err(e) = self.fs.rm(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to remove stale wrapper");
                    }
                }
            }
        }
        Ok(())
    }

    async fn is_our_shim(&self, path: &Path) -> bool {
        if let Ok(target) = tokio::fs::read_link(path).await {
            if let Some(shield_exec) = &self.shield_exec_path {
                return &target == shield_exec;
            }
            return false;
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => content.contains(AUTO_GENERATED_MARKER),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privileged_fs::DirectFs;

    fn manager(dir: &Path) -> WrapperManager {
        WrapperManager {
            bin_dirs: vec![dir.to_path_buf()],
            shield_exec_path: None,
            fs: Arc::new(DirectFs),
        }
    }

    #[tokio::test]
    async fn ensure_wrappers_writes_bash_shim_when_no_shield_exec() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let mut commands = BTreeSet::new();
        commands.insert("mytool".to_string());

        mgr.ensure_wrappers(&commands).await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("mytool")).await.unwrap();
        assert!(content.contains(AUTO_GENERATED_MARKER));
        assert!(content.contains("pwd >/dev/null 2>&1 || cd ~ || cd / || exit 1"));
        assert!(content.contains("/opt/agenshield/bin/shield-client exec mytool"));

        let content = tokio::fs::read_to_string(dir.path().join("git")).await.unwrap();
        assert!(content.contains(AUTO_GENERATED_MARKER));
    }

    #[tokio::test]
    async fn gc_removes_marked_wrapper_not_in_policy_set() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        tokio::fs::write(dir.path().join("stale"), generated_wrapper_script("stale"))
            .await
            .unwrap();

        mgr.gc(&BTreeSet::new()).await.unwrap();

        assert!(!dir.path().join("stale").exists());
    }

    #[tokio::test]
    async fn gc_never_removes_protected_or_policy_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        tokio::fs::write(dir.path().join("git"), generated_wrapper_script("git"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("mytool"), generated_wrapper_script("mytool"))
            .await
            .unwrap();

        let mut commands = BTreeSet::new();
        commands.insert("mytool".to_string());
        mgr.gc(&commands).await.unwrap();

        assert!(dir.path().join("git").exists());
        assert!(dir.path().join("mytool").exists());
    }

    #[tokio::test]
    async fn gc_ignores_unmarked_files() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        tokio::fs::write(dir.path().join("random"), b"not ours").await.unwrap();

        mgr.gc(&BTreeSet::new()).await.unwrap();

        assert!(dir.path().join("random").exists());
    }

    #[tokio::test]
    async fn gc_never_touches_brew_originals_dir() {
        let dir = tempfile::tempdir().unwrap();
        let originals = dir.path().join(".brew-originals");
        tokio::fs::create_dir_all(&originals).await.unwrap();
        tokio::fs::write(originals.join("wget"), b"elf").await.unwrap();

        let mgr = manager(dir.path());
        mgr.gc(&BTreeSet::new()).await.unwrap();

        assert!(originals.join("wget").exists());
    }
}
