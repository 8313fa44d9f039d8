//! Skills Watcher (C10): periodic plus event-driven scan of the skills
//! directory. Auto-approves validly-tagged bundles it finds on disk;
//! quarantines anything else into the marketplace cache and re-checks
//! previously-approved trees for external tampering.
//!
//! Grounded on the same `notify` + debounce shape a filesystem watcher
//! commonly takes: a periodic fallback poll plus an event-driven path that
//! collapses bursts of per-directory events into one scan call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tracing::warn;

use super::analyzer::SkillAnalyzer;
use super::hash;
use super::installation_tag;
use super::manifest::{ApprovedEntry, ApprovedList};
use super::registrar::SkillPolicyRegistrar;
use crate::error::Result;
use crate::events::{EventBus, EventKind};
use crate::marketplace::cache as marketplace_cache;
use crate::marketplace::SkillSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct SkillsWatcher {
    skills_dir: PathBuf,
    approved_path: PathBuf,
    cache_root: PathBuf,
    current_tag: String,
    registrar: Arc<dyn SkillPolicyRegistrar>,
    analyzer: Option<Arc<dyn SkillAnalyzer>>,
    bus: EventBus,
    poll_interval: Duration,
    /// Suppressed while C9 is actively deploying a slug, so the watcher
    /// doesn't race its own lifecycle write (spec.md §4.9 step 6).
    suppressed: Mutex<std::collections::HashSet<String>>,
    mtime_cache: Mutex<HashMap<String, SystemTime>>,
}

impl SkillsWatcher {
    pub fn new(
        skills_dir: PathBuf,
        approved_path: PathBuf,
        cache_root: PathBuf,
        current_tag: String,
        registrar: Arc<dyn SkillPolicyRegistrar>,
        analyzer: Option<Arc<dyn SkillAnalyzer>>,
        bus: EventBus,
    ) -> Self {
        Self {
            skills_dir,
            approved_path,
            cache_root,
            current_tag,
            registrar,
            analyzer,
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
            suppressed: Mutex::new(std::collections::HashSet::new()),
            mtime_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop scanning `slug` until [`Self::unsuppress`] is called.
    pub async fn suppress(&self, slug: &str) {
        self.suppressed.lock().await.insert(slug.to_string());
    }

    pub async fn unsuppress(&self, slug: &str) {
        self.suppressed.lock().await.remove(slug);
    }

    /// Run the periodic poll loop until cancelled. This is the fallback
    /// signal; the primary signal is an event-driven call to
    /// [`Self::scan_once`] from a debounced filesystem-event handler.
    pub async fn run_poll_loop(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.scan_once().await {
                warn!(error = %e, "skills watcher scan failed");
            }
        }
    }

    pub async fn scan_once(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.skills_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let slug = entry.file_name().to_string_lossy().to_string();
            if self.suppressed.lock().await.contains(&slug) {
                continue;
            }
            if let Err(e) = self.scan_subdirectory(&slug, &entry.path()).await {
                warn!(slug = %slug, error = %e, "skills watcher failed to scan subdirectory");
            }
        }
        Ok(())
    }

    async fn scan_subdirectory(&self, slug: &str, dir: &Path) -> Result<()> {
        let mut approved = ApprovedList::load(&self.approved_path).await?;

        match approved.get(slug).cloned() {
            None => self.scan_unapproved(slug, dir, &mut approved).await,
            Some(entry) if entry.hash.is_some() => {
                self.scan_approved_with_hash(slug, dir, &entry, &mut approved).await
            }
            Some(_) => Ok(()),
        }
    }

    async fn scan_unapproved(&self, slug: &str, dir: &Path, approved: &mut ApprovedList) -> Result<()> {
        let skill_md = find_skill_md(dir).await?;
        let valid_tag = skill_md
            .as_deref()
            .is_some_and(|content| installation_tag::verify(content, &self.current_tag));

        if valid_tag {
            let file_hash = hash::hash_tree(dir).await?;
            approved.insert(ApprovedEntry {
                name: slug.to_string(),
                approved_at: chrono::Utc::now().to_rfc3339(),
                hash: Some(file_hash),
                publisher: None,
                slug: Some(slug.to_string()),
            });
            approved.save(&self.approved_path).await?;

            if let Err(e) = self.registrar.add_skill_policy(slug).await {
                warn!(slug, error = %e, "failed to add policy for auto-approved skill");
            }
            self.bus
                .emit(EventKind::SkillsApproved, None, serde_json::json!({ "slug": slug }));
        } else {
            self.quarantine(slug, dir).await?;
            self.bus.emit(
                EventKind::SkillsUntrustedDetected,
                None,
                serde_json::json!({ "slug": slug, "reason": "no valid installation tag" }),
            );
        }
        Ok(())
    }

    async fn scan_approved_with_hash(
        &self,
        slug: &str,
        dir: &Path,
        entry: &ApprovedEntry,
        approved: &mut ApprovedList,
    ) -> Result<()> {
        let current_mtime = hash::max_mtime(dir).await?;
        {
            let mut cache = self.mtime_cache.lock().await;
            if cache.get(slug) == Some(&current_mtime) {
                return Ok(());
            }
            cache.insert(slug.to_string(), current_mtime);
        }

        let current_hash = hash::hash_tree(dir).await?;
        if Some(&current_hash) == entry.hash.as_ref() {
            return Ok(());
        }

        approved.remove(slug);
        approved.save(&self.approved_path).await?;
        if let Err(e) = self.registrar.remove_skill_policy(slug).await {
            warn!(slug, error = %e, "failed to remove policy for demoted skill");
        }
        self.quarantine(slug, dir).await?;
        self.bus.emit(
            EventKind::SkillsUntrustedDetected,
            None,
            serde_json::json!({ "slug": slug, "reason": "Skill files modified externally" }),
        );
        Ok(())
    }

    /// Move `dir` into the marketplace cache tagged `source=watcher`,
    /// delete the original, and fire a background analysis (spec.md §4.10).
    async fn quarantine(&self, slug: &str, dir: &Path) -> Result<()> {
        let metadata = marketplace_cache::new_metadata(
            slug,
            slug,
            "unknown",
            "0.0.0",
            "",
            vec![],
            chrono::Utc::now().to_rfc3339(),
            SkillSource::Watcher,
        );
        marketplace_cache::store_from_dir(&self.cache_root, slug, dir, metadata).await?;
        tokio::fs::remove_dir_all(dir).await?;

        if let Some(analyzer) = self.analyzer.clone() {
            let slug = slug.to_string();
            let bus = self.bus.clone();
            tokio::spawn(async move {
                match analyzer.analyze(&slug, "watcher").await {
                    Ok(result) => bus.emit(
                        EventKind::SkillsAnalyzed,
                        None,
                        serde_json::json!({ "slug": slug, "analysis": result.raw }),
                    ),
                    Err(e) => {
                        warn!(slug = %slug, error = %e, "background quarantine analysis failed");
                        bus.emit(
                            EventKind::SkillsAnalysisFailed,
                            None,
                            serde_json::json!({ "slug": slug, "error": e.to_string() }),
                        );
                    }
                }
            });
        }

        Ok(())
    }
}

async fn find_skill_md(dir: &Path) -> Result<Option<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file()
            && entry.file_name().to_string_lossy().eq_ignore_ascii_case("SKILL.md")
        {
            return Ok(Some(tokio::fs::read_to_string(entry.path()).await?));
        }
    }
    Ok(None)
}
