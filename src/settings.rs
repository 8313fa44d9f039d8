//! Runtime configuration (SPEC_FULL.md §2.3).
//!
//! Precedence, highest to lowest: environment variables (per spec.md §6's
//! table) > `settings.json` > compiled default. `dotenvy` loads a `.env`
//! file from the working directory before the environment is read, if one
//! is present; its absence is never an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_AGENT_HOME: &str = "/Users/ash_default_agent";
const DEFAULT_AGENT_USER: &str = "ash_default_agent";
const DEFAULT_SOCKET_GROUP: &str = "ash_default";
const DEFAULT_MARKETPLACE_BASE_URL: &str = "https://clawhub.example.com";
const DEFAULT_ANALYZER_URL: &str = "https://skill-analyzer.example.com";
const DEFAULT_SKILLS_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Persisted at `~/.agenshield/settings.json`; reloaded at daemon startup
/// and whenever the control surface issues `config.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_agent_home")]
    pub agent_home: String,

    /// The dedicated OS account the agent runs as; `agent_home` is expected
    /// to be that account's home directory. Distinct from `socket_group`,
    /// which names the group ACL entries and `sudo -u` invocations use.
    #[serde(default = "default_agent_user")]
    pub agent_user: String,

    #[serde(default = "default_socket_group")]
    pub socket_group: String,

    #[serde(default)]
    pub brokers_socket_path: Option<String>,

    #[serde(default = "default_skills_poll_interval_secs")]
    pub skills_poll_interval_secs: u64,

    #[serde(default = "default_marketplace_base_url")]
    pub marketplace_base_url: String,

    #[serde(default = "default_analyzer_url")]
    pub analyzer_url: String,

    /// Comma-separated secret names to append to the exposed-secrets report.
    #[serde(default)]
    pub user_secrets: Option<String>,

    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,
}

fn default_agent_home() -> String {
    DEFAULT_AGENT_HOME.to_string()
}

fn default_agent_user() -> String {
    DEFAULT_AGENT_USER.to_string()
}

fn default_socket_group() -> String {
    DEFAULT_SOCKET_GROUP.to_string()
}

fn default_marketplace_base_url() -> String {
    DEFAULT_MARKETPLACE_BASE_URL.to_string()
}

fn default_analyzer_url() -> String {
    DEFAULT_ANALYZER_URL.to_string()
}

fn default_skills_poll_interval_secs() -> u64 {
    DEFAULT_SKILLS_POLL_INTERVAL_SECS
}

fn default_reconcile_timeout_secs() -> u64 {
    DEFAULT_RECONCILE_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_home: default_agent_home(),
            agent_user: default_agent_user(),
            socket_group: default_socket_group(),
            brokers_socket_path: None,
            skills_poll_interval_secs: default_skills_poll_interval_secs(),
            marketplace_base_url: default_marketplace_base_url(),
            analyzer_url: default_analyzer_url(),
            user_secrets: None,
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
        }
    }
}

impl Settings {
    /// `~/.agenshield/settings.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agenshield")
            .join("settings.json")
    }

    /// Load `.env`, then `settings.json`, then overlay environment
    /// variables. Never fails: a missing or unparsable settings file
    /// falls back to the compiled default.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let _ = dotenvy::dotenv();

        let mut settings = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Self::default(),
        };
        settings.apply_env();
        settings
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("AGENSHIELD_AGENT_HOME") {
            self.agent_home = v;
        }
        if let Ok(v) = std::env::var("AGENSHIELD_AGENT_USER") {
            self.agent_user = v;
        }
        if let Ok(v) = std::env::var("AGENSHIELD_SOCKET_GROUP") {
            self.socket_group = v;
        }
        if let Ok(v) = std::env::var("AGENSHIELD_USER_SECRETS") {
            self.user_secrets = Some(v);
        }
        if let Ok(v) = std::env::var("SKILL_ANALYZER_URL") {
            self.analyzer_url = v;
        }
        if let Ok(v) = std::env::var("CLAWHUB_DOWNLOAD_BASE") {
            self.marketplace_base_url = v;
        }
        if let Ok(v) = std::env::var("AGENSHIELD_BROKER_SOCKET") {
            self.brokers_socket_path = Some(v);
        }
    }

    /// Resolves to `<agent_home>/.agenshield-broker/daemon.sock` unless
    /// overridden.
    pub fn broker_socket_path(&self) -> PathBuf {
        match &self.brokers_socket_path {
            Some(p) => PathBuf::from(p),
            None => Path::new(&self.agent_home)
                .join(".agenshield-broker")
                .join("daemon.sock"),
        }
    }

    pub fn skills_poll_interval(&self) -> Duration {
        Duration::from_secs(self.skills_poll_interval_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Persist to `settings.json`, atomically.
    pub async fn save(&self, path: &Path) -> crate::error::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        crate::util::atomic_write(path, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_spec_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.agent_home, DEFAULT_AGENT_HOME);
        assert_eq!(settings.agent_user, DEFAULT_AGENT_USER);
        assert_eq!(settings.socket_group, DEFAULT_SOCKET_GROUP);
        assert_eq!(settings.skills_poll_interval_secs, 30);
    }

    #[test]
    fn load_from_missing_path_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("settings.json");
        let settings = Settings::load_from(&path);
        assert_eq!(settings.agent_home, DEFAULT_AGENT_HOME);
    }

    #[test]
    fn load_from_malformed_json_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.marketplace_base_url, DEFAULT_MARKETPLACE_BASE_URL);
    }

    #[test]
    fn load_from_partial_json_fills_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"agent_home": "/Users/custom_agent"}"#).unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.agent_home, "/Users/custom_agent");
        assert_eq!(settings.socket_group, DEFAULT_SOCKET_GROUP);
    }

    #[test]
    fn env_var_overrides_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"agent_home": "/Users/from_file"}"#).unwrap();

        // SAFETY: test runs single-threaded with respect to this env var.
        unsafe {
            std::env::set_var("AGENSHIELD_AGENT_HOME", "/Users/from_env");
        }
        let settings = Settings::load_from(&path);
        unsafe {
            std::env::remove_var("AGENSHIELD_AGENT_HOME");
        }

        assert_eq!(settings.agent_home, "/Users/from_env");
    }

    #[test]
    fn broker_socket_path_defaults_under_agent_home() {
        let mut settings = Settings::default();
        settings.agent_home = "/Users/ash_default_agent".to_string();
        settings.brokers_socket_path = None;
        assert_eq!(
            settings.broker_socket_path(),
            PathBuf::from("/Users/ash_default_agent/.agenshield-broker/daemon.sock")
        );
    }

    #[test]
    fn broker_socket_path_honors_explicit_override() {
        let mut settings = Settings::default();
        settings.brokers_socket_path = Some("/tmp/custom.sock".to_string());
        assert_eq!(settings.broker_socket_path(), PathBuf::from("/tmp/custom.sock"));
    }
}
