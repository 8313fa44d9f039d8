//! Dependency installation (spec.md §4.9 step 8): runs the analyzer's
//! declared dependency steps, batching noisy output on a 3-second window
//! while milestone lines pass straight through.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::analyzer::DependencyStep;
use crate::error::{AgenShieldError, Result};

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(3);
const MILESTONES: &[&str] = &["Installing", "Found", "Verifying"];

fn is_milestone(line: &str) -> bool {
    MILESTONES.iter().any(|m| line.contains(m))
}

/// Batches dependency-install log lines so a noisy `brew install` doesn't
/// flood the event bus, while still surfacing milestone lines immediately.
pub struct LogThrottle {
    window: Duration,
    buffer: Vec<String>,
    last_flush: Instant,
}

impl LogThrottle {
    pub fn new() -> Self {
        Self::with_window(DEBOUNCE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            buffer: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    /// Feed one output line. Returns the lines that should be emitted now:
    /// empty if the line was buffered and the window hasn't elapsed, or the
    /// buffered batch (plus this line, for a milestone) otherwise.
    pub fn feed(&mut self, line: &str) -> Vec<String> {
        if is_milestone(line) {
            let mut out = std::mem::take(&mut self.buffer);
            out.push(line.to_string());
            self.last_flush = Instant::now();
            return out;
        }

        self.buffer.push(line.to_string());
        if self.last_flush.elapsed() >= self.window {
            self.last_flush = Instant::now();
            return std::mem::take(&mut self.buffer);
        }
        Vec::new()
    }

    /// Drain whatever remains, used once the underlying process exits.
    pub fn flush(&mut self) -> Vec<String> {
        self.last_flush = Instant::now();
        std::mem::take(&mut self.buffer)
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Run `step`, calling `on_output` with each batch of lines as the
    /// throttle releases them.
    async fn install(&self, step: &DependencyStep, on_output: &(dyn Fn(Vec<String>) + Send + Sync)) -> Result<()>;
}

/// Runs dependency steps as real subprocesses, streaming stdout through a
/// [`LogThrottle`].
pub struct ShellDependencyInstaller;

#[async_trait]
impl DependencyInstaller for ShellDependencyInstaller {
    async fn install(&self, step: &DependencyStep, on_output: &(dyn Fn(Vec<String>) + Send + Sync)) -> Result<()> {
        let mut child = Command::new(&step.command)
            .args(&step.args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout piped");
        let mut lines = BufReader::new(stdout).lines();
        let mut throttle = LogThrottle::new();

        while let Some(line) = lines.next_line().await? {
            let batch = throttle.feed(&line);
            if !batch.is_empty() {
                on_output(batch);
            }
        }
        let remaining = throttle.flush();
        if !remaining.is_empty() {
            on_output(remaining);
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(AgenShieldError::transient(
                step.command.clone(),
                format!("exited with status {status}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_line_flushes_buffer_immediately() {
        let mut throttle = LogThrottle::with_window(Duration::from_secs(60));
        assert!(throttle.feed("downloading package").is_empty());
        assert!(throttle.feed("unpacking").is_empty());

        let out = throttle.feed("Verifying checksum");
        assert_eq!(out, vec!["downloading package", "unpacking", "Verifying checksum"]);
    }

    #[test]
    fn non_milestone_lines_buffer_until_window_elapses() {
        let mut throttle = LogThrottle::with_window(Duration::from_millis(10));
        assert!(throttle.feed("line one").is_empty());
        std::thread::sleep(Duration::from_millis(15));

        let out = throttle.feed("line two");
        assert_eq!(out, vec!["line one", "line two"]);
    }

    #[test]
    fn flush_drains_remaining_buffer() {
        let mut throttle = LogThrottle::with_window(Duration::from_secs(60));
        throttle.feed("trailing output");
        assert_eq!(throttle.flush(), vec!["trailing output".to_string()]);
        assert_eq!(throttle.flush(), Vec::<String>::new());
    }
}
