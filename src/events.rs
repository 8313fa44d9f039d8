//! Event Bus (C13): in-process typed publish/subscribe used by the
//! watcher, lifecycle manager, and reconciler to report progress and
//! security-relevant state changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::Result;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SkillsInstallStarted,
    SkillsInstallProgress,
    SkillsInstallFailed,
    SkillsInstalled,
    SkillsUninstalled,
    SkillsQuarantined,
    SkillsUntrustedDetected,
    SkillsApproved,
    SkillsAnalyzed,
    SkillsAnalysisFailed,
    ProcessBrokerStarted,
    ProcessBrokerStopped,
    ProcessBrokerRestarted,
    ProcessGatewayStarted,
    ProcessGatewayStopped,
    ProcessGatewayRestarted,
    ProcessDaemonStarted,
    ProcessDaemonStopped,
    ProcessDaemonRestarted,
    SecurityStatus,
    SecurityWarning,
    SecurityCritical,
    SecurityLocked,
    AlertsAcknowledged,
    Heartbeat,
}

impl EventKind {
    /// The Activity Log never records heartbeats.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, EventKind::Heartbeat)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A single in-process publisher. Subscribers receive their own broadcast
/// receiver; dropping it unsubscribes.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn emit(&self, kind: EventKind, profile_id: Option<String>, payload: serde_json::Value) {
        let event = Event {
            kind,
            timestamp: Utc::now(),
            profile_id,
            payload,
        };
        // No subscribers is a normal state (e.g. in tests); broadcast::send
        // only errors when the channel has zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

const ROTATION_CHECK_INTERVAL: u64 = 1000;
const MAX_LOG_BYTES: u64 = 100 * 1024 * 1024;
const MAX_LINE_AGE: chrono::Duration = chrono::Duration::hours(24);

/// Subscribes to the bus and appends every non-heartbeat event as a JSONL
/// line, rotating the file when it grows too large or holds stale entries.
pub struct ActivityLog {
    path: PathBuf,
    writes_since_check: u64,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes_since_check: 0,
        }
    }

    pub async fn record(&mut self, event: &Event) -> Result<()> {
        if event.kind.is_heartbeat() {
            return Ok(());
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        self.writes_since_check += 1;
        if self.writes_since_check >= ROTATION_CHECK_INTERVAL {
            self.writes_since_check = 0;
            if let Err(e) = rotate(&self.path).await {
                warn!(path = %self.path.display(), error = %e, "activity log rotation failed");
            }
        }

        Ok(())
    }

    /// Run the subscription loop until the bus is closed. Intended to be
    /// spawned as a background task.
    pub async fn run(mut self, mut receiver: broadcast::Receiver<Event>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.record(&event).await {
                        warn!(error = %e, "failed to append activity log entry");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "activity log subscriber lagged, entries dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// After every 1,000 writes: if the file exceeds 100 MB, keep only the
/// newest half of its lines; separately, prune any line whose embedded
/// timestamp is older than 24 hours.
async fn rotate(path: &Path) -> Result<()> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };

    let content = tokio::fs::read_to_string(path).await?;
    let mut lines: Vec<&str> = content.lines().collect();

    if meta.len() > MAX_LOG_BYTES {
        let keep_from = lines.len() / 2;
        lines = lines.split_off(keep_from);
    }

    let cutoff = Utc::now() - MAX_LINE_AGE;
    let kept: Vec<&str> = lines
        .into_iter()
        .filter(|line| match serde_json::from_str::<Event>(line) {
            Ok(event) => event.timestamp >= cutoff,
            Err(_) => true,
        })
        .collect();

    let mut rewritten = kept.join("\n");
    if !rewritten.is_empty() {
        rewritten.push('\n');
    }
    crate::util::atomic_write(path, rewritten.as_bytes()).await
}
