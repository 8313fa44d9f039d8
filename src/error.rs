//! Crate-wide error types.
//!
//! Component-boundary functions return [`AgenShieldError`]; orchestration
//! layers (the reconciler, the lifecycle manager) catch per-step errors and
//! fold them into structured outcome reports instead of propagating, per
//! the error-handling design in the policy reconciliation spec.

use std::path::PathBuf;

/// Errors surfaced by AgenShield core components.
#[derive(Debug, thiserror::Error)]
pub enum AgenShieldError {
    /// A network call to the marketplace, analyzer, or broker timed out or
    /// returned a server error. Never partially persisted.
    #[error("transient failure calling {endpoint}: {message}")]
    Transient { endpoint: String, message: String },

    /// A filesystem mutation failed with permission denied on every
    /// available path (direct, broker, sudo).
    #[error("permission denied on {path}: {message}")]
    Permission { path: PathBuf, message: String },

    /// The upstream analyzer rejected a skill (e.g. critical vulnerability).
    #[error("upstream rejected skill '{slug}': {reason}")]
    UpstreamRejected { slug: String, reason: String },

    /// A previously-approved skill's on-disk hash no longer matches its
    /// baseline.
    #[error("integrity violation for '{slug}': {detail}")]
    IntegrityViolation { slug: String, detail: String },

    /// Malformed input that should be logged and worked around rather than
    /// aborting the operation (e.g. an unresolvable command name).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// An error that must propagate and fail the calling operation, such as
    /// a failed write to `approved-skills.json`.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, AgenShieldError>;

impl AgenShieldError {
    pub fn permission(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Permission {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}
