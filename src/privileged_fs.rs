//! `PrivilegedFs`: a capability abstraction over filesystem mutations that
//! may require elevated privileges the agent user doesn't have.
//!
//! Generalizes the direct → broker → sudo cascade spec.md describes at
//! every individual call site (C3's ACL writes, C5's wrapper installs, C9's
//! skill deploy, C11's brew relocation) into one seam with a single
//! "first available" composition, per the design note in spec.md §9.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AgenShieldError, Result};

/// A privileged filesystem operation surface. Implementations attempt the
/// operation and return `Err(AgenShieldError::Permission { .. })` when this
/// implementation specifically cannot perform it (so `FirstAvailable` can
/// fall through to the next one); any other error is treated as terminal.
#[async_trait]
pub trait PrivilegedFs: Send + Sync {
    async fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()>;
    async fn mkdir(&self, path: &Path) -> Result<()>;
    async fn rm(&self, path: &Path) -> Result<()>;
    async fn copy_file(&self, src: &Path, dst: &Path, mode: u32) -> Result<()>;
    /// Set `path`'s owner and group (e.g. `root`/`<socketGroup>` for a
    /// generated wrapper, spec.md §4.9 step 6b and §4.11).
    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<()>;
}

/// Unprivileged, direct syscalls. Works whenever the agent user already
/// owns the target path.
pub struct DirectFs;

#[async_trait]
impl PrivilegedFs for DirectFs {
    async fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| permission_or_io(path, e))?;
        set_mode(path, mode).await
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| permission_or_io(path, e))
    }

    async fn rm(&self, path: &Path) -> Result<()> {
        let meta = tokio::fs::metadata(path).await;
        match meta {
            Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| permission_or_io(path, e)),
            Ok(_) => tokio::fs::remove_file(path)
                .await
                .map_err(|e| permission_or_io(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(permission_or_io(path, e)),
        }
    }

    async fn copy_file(&self, src: &Path, dst: &Path, mode: u32) -> Result<()> {
        tokio::fs::copy(src, dst)
            .await
            .map_err(|e| permission_or_io(dst, e))?;
        set_mode(dst, mode).await
    }

    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<()> {
        let output = Command::new("chown")
            .arg(format!("{owner}:{group}"))
            .arg(path)
            .output()
            .await
            .map_err(AgenShieldError::Io)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AgenShieldError::permission(
                path,
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, perms)
        .await
        .map_err(|e| permission_or_io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn permission_or_io(path: &Path, e: std::io::Error) -> AgenShieldError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        AgenShieldError::permission(path, e.to_string())
    } else {
        AgenShieldError::Io(e)
    }
}

/// Elevated writes via `sudo` as the agent user, for when the calling
/// process itself lacks ownership of the target but a human operator has
/// configured passwordless sudo for the daemon's own maintenance paths.
pub struct SudoFs {
    pub agent_user: String,
}

impl SudoFs {
    async fn run(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("sudo")
            .arg("-u")
            .arg(&self.agent_user)
            .args(args)
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AgenShieldError::permission(
                args.last().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }
}

#[async_trait]
impl PrivilegedFs for SudoFs {
    async fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        let tmp = std::env::temp_dir().join(format!(
            "agenshield-{}.tmp",
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp, bytes).await?;
        let path_str = path.to_string_lossy().to_string();
        let tmp_str = tmp.to_string_lossy().to_string();
        self.run(&["cp", &tmp_str, &path_str]).await?;
        let _ = tokio::fs::remove_file(&tmp).await;
        self.run(&["chmod", &format!("{mode:o}"), &path_str]).await
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        self.run(&["mkdir", "-p", &path.to_string_lossy()]).await
    }

    async fn rm(&self, path: &Path) -> Result<()> {
        self.run(&["rm", "-rf", &path.to_string_lossy()]).await
    }

    async fn copy_file(&self, src: &Path, dst: &Path, mode: u32) -> Result<()> {
        self.run(&["cp", &src.to_string_lossy(), &dst.to_string_lossy()])
            .await?;
        self.run(&["chmod", &format!("{mode:o}"), &dst.to_string_lossy()])
            .await
    }

    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<()> {
        self.run(&["chown", &format!("{owner}:{group}"), &path.to_string_lossy()])
            .await
    }
}

/// Composes implementations in priority order, trying each until one
/// succeeds or isn't a permission failure.
pub struct FirstAvailable {
    layers: Vec<Box<dyn PrivilegedFs>>,
}

impl FirstAvailable {
    pub fn new(layers: Vec<Box<dyn PrivilegedFs>>) -> Self {
        Self { layers }
    }
}

macro_rules! cascade {
    ($self:expr, $method:ident, $($arg:expr),+) => {{
        let mut last_err = None;
        for layer in &$self.layers {
            match layer.$method($($arg),+).await {
                Ok(()) => return Ok(()),
                Err(AgenShieldError::Permission { path, message }) => {
                    last_err = Some(AgenShieldError::Permission { path, message });
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err.unwrap_or_else(|| AgenShieldError::Fatal("no PrivilegedFs layer available".into())))
    }};
}

#[async_trait]
impl PrivilegedFs for FirstAvailable {
    async fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        cascade!(self, write_file, path, bytes, mode)
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        cascade!(self, mkdir, path)
    }

    async fn rm(&self, path: &Path) -> Result<()> {
        cascade!(self, rm, path)
    }

    async fn copy_file(&self, src: &Path, dst: &Path, mode: u32) -> Result<()> {
        cascade!(self, copy_file, src, dst, mode)
    }

    async fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<()> {
        cascade!(self, chown, path, owner, group)
    }
}
