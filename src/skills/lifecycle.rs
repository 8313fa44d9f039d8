//! Skill Lifecycle Manager (C9): install, uninstall, toggle, and integrity
//! check for a single skill slug. Ties together the analyzer (C?), the
//! marketplace cache (C7), the installation tag injector (C8), the skill
//! repository, the policy reconciler seam, the brew wrapper manager (C11),
//! and the privileged filesystem cascade.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use super::analyzer::{AnalysisResult, SkillAnalyzer};
use super::dependencies::DependencyInstaller;
use super::hash;
use super::installation_tag;
use super::manifest::{ApprovedEntry, ApprovedList};
use super::registrar::SkillPolicyRegistrar;
use super::repository::{SkillRepository, VersionRecord};
use super::watcher::SkillsWatcher;
use crate::brew::BrewWrapperManager;
use crate::broker::BrokerClient;
use crate::error::{AgenShieldError, Result};
use crate::events::{EventBus, EventKind};
use crate::marketplace::cache as marketplace_cache;
use crate::marketplace::{MarketplaceClient, SkillMetadata, SkillSource};
use crate::privileged_fs::PrivilegedFs;

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub slug: String,
    pub hash: String,
}

pub enum ToggleOutcome {
    Disabled,
    Enabled(InstallOutcome),
}

pub struct SkillLifecycleManager {
    pub skills_dir: PathBuf,
    pub agent_home: PathBuf,
    pub approved_path: PathBuf,
    pub cache_root: PathBuf,
    pub current_tag: String,

    pub analyzer: Arc<dyn SkillAnalyzer>,
    pub marketplace: Arc<dyn MarketplaceClient>,
    pub repository: Arc<dyn SkillRepository>,
    pub registrar: Arc<dyn SkillPolicyRegistrar>,
    pub dependency_installer: Arc<dyn DependencyInstaller>,
    pub brew: BrewWrapperManager,
    pub fs: Arc<dyn PrivilegedFs>,
    pub broker: Option<Arc<BrokerClient>>,
    pub watcher: Option<Arc<SkillsWatcher>>,
    pub bus: EventBus,

    in_progress: Mutex<HashSet<String>>,
}

impl SkillLifecycleManager {
    fn skill_dir(&self, slug: &str) -> PathBuf {
        self.skills_dir.join(slug)
    }

    fn skill_wrapper_path(&self, slug: &str) -> PathBuf {
        self.agent_home.join("bin").join(slug)
    }

    /// At most one concurrent install per slug (spec.md §4.9). A second
    /// concurrent call is rejected as a contract violation rather than
    /// queued.
    pub async fn install(&self, slug: &str, download_url: &str) -> Result<InstallOutcome> {
        {
            let mut in_progress = self.in_progress.lock().await;
            if !in_progress.insert(slug.to_string()) {
                return Err(AgenShieldError::ContractViolation(format!(
                    "install already in progress for '{slug}'"
                )));
            }
        }

        self.bus
            .emit(EventKind::SkillsInstallStarted, None, serde_json::json!({ "slug": slug }));

        let outcome = self.install_inner(slug, download_url).await;
        self.in_progress.lock().await.remove(slug);

        match &outcome {
            Ok(o) => self.bus.emit(
                EventKind::SkillsInstalled,
                None,
                serde_json::json!({ "slug": slug, "hash": o.hash }),
            ),
            Err(e) => self.bus.emit(
                EventKind::SkillsInstallFailed,
                None,
                serde_json::json!({ "slug": slug, "error": e.to_string() }),
            ),
        }

        outcome
    }

    async fn install_inner(&self, slug: &str, download_url: &str) -> Result<InstallOutcome> {
        let analysis = self.analyze_and_persist(slug).await?;

        if analysis.vulnerability.level.is_critical() {
            return Err(AgenShieldError::UpstreamRejected {
                slug: slug.to_string(),
                reason: analysis
                    .vulnerability
                    .summary
                    .clone()
                    .unwrap_or_else(|| "critical vulnerability".to_string()),
            });
        }

        let zip_bytes = self.marketplace.download_zip(download_url).await?;
        let bundle = marketplace_cache::prepare(&zip_bytes)?;
        if bundle.files.is_empty() {
            return Err(AgenShieldError::ContractViolation(format!(
                "downloaded bundle for '{slug}' contained no usable files"
            )));
        }

        let metadata = self.metadata_with_analysis(slug, &analysis)?;

        match self.deploy_and_register(slug, bundle.files, metadata).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Best-effort cleanup: quarantine whatever version we just
                // registered so a retry doesn't see stale trusted content.
                if let Ok(Some(latest)) = self.repository.latest(slug).await {
                    let _ = self.repository.revoke_version(slug, &latest.version).await;
                }
                Err(e)
            }
        }
    }

    /// Step 1: analyze, and persist the result into the marketplace cache
    /// immediately so a later critical-vulnerability rejection still shows
    /// its reason (spec.md §4.9's closing note).
    async fn analyze_and_persist(&self, slug: &str) -> Result<AnalysisResult> {
        let analysis = self.analyzer.analyze(slug, "clawhub").await?;
        let metadata = self.metadata_with_analysis(slug, &analysis)?;

        let empty_bundle = marketplace_cache::ExtractedBundle { files: BTreeMap::new() };
        if let Err(e) = marketplace_cache::store(&self.cache_root, slug, &empty_bundle, metadata).await {
            warn!(slug, error = %e, "failed to persist pre-download analysis to marketplace cache");
        }

        Ok(analysis)
    }

    fn metadata_with_analysis(&self, slug: &str, analysis: &AnalysisResult) -> Result<SkillMetadata> {
        let mut metadata = marketplace_cache::new_metadata(
            slug,
            slug,
            "unknown",
            "0.0.0",
            "",
            vec![],
            chrono::Utc::now().to_rfc3339(),
            SkillSource::Marketplace,
        );
        metadata.analysis = Some(serde_json::to_value(analysis)?);
        Ok(metadata)
    }

    /// Steps 4-10 of Install. Also the re-enable path of Toggle, which
    /// skips analyze/download and calls this directly with the cached
    /// bundle.
    async fn deploy_and_register(
        &self,
        slug: &str,
        files: BTreeMap<String, String>,
        mut metadata: SkillMetadata,
    ) -> Result<InstallOutcome> {
        let prepared = inject_tag_into_skill_md(files, &self.current_tag);

        let file_records = hash::hash_entries_from_map(&prepared);
        self.repository
            .record_version(
                slug,
                VersionRecord {
                    version: chrono::Utc::now().to_rfc3339(),
                    files: file_records,
                    revoked: false,
                },
            )
            .await?;

        if let Some(watcher) = &self.watcher {
            watcher.suppress(slug).await;
        }
        let deploy_result = self.deploy(slug, &prepared).await;
        if let Some(watcher) = &self.watcher {
            watcher.unsuppress(slug).await;
        }
        deploy_result?;

        if let Err(e) = self.registrar.add_skill_policy(slug).await {
            warn!(slug, error = %e, "failed to add policy during skill deploy");
        }

        self.install_dependencies(slug, &metadata).await;

        let deployed_dir = self.skill_dir(slug);
        let tree_hash = hash::hash_tree(&deployed_dir).await?;

        metadata.was_installed = Some(true);
        let bundle = marketplace_cache::ExtractedBundle { files: prepared };
        if let Err(e) = marketplace_cache::store(&self.cache_root, slug, &bundle, metadata).await {
            warn!(slug, error = %e, "failed to persist final marketplace cache metadata");
        }

        let mut approved = ApprovedList::load(&self.approved_path).await?;
        approved.insert(ApprovedEntry {
            name: slug.to_string(),
            approved_at: chrono::Utc::now().to_rfc3339(),
            hash: Some(tree_hash.clone()),
            publisher: None,
            slug: Some(slug.to_string()),
        });
        approved.save(&self.approved_path).await?;

        Ok(InstallOutcome {
            slug: slug.to_string(),
            hash: tree_hash,
        })
    }

    /// Step 8: run every dependency step from the analysis, streaming
    /// output through a log throttle as `skills:install_progress`. A
    /// `brew install` step also registers its binaries with C11.
    async fn install_dependencies(&self, slug: &str, metadata: &SkillMetadata) {
        let Some(analysis) = metadata
            .analysis
            .clone()
            .and_then(|v| serde_json::from_value::<AnalysisResult>(v).ok())
        else {
            return;
        };

        for step in &analysis.dependencies {
            let bus = self.bus.clone();
            let slug_owned = slug.to_string();
            let on_output = move |lines: Vec<String>| {
                bus.emit(
                    EventKind::SkillsInstallProgress,
                    None,
                    serde_json::json!({ "slug": slug_owned, "lines": lines }),
                );
            };

            if let Err(e) = self.dependency_installer.install(step, &on_output).await {
                warn!(slug, command = %step.command, error = %e, "dependency install step failed");
                continue;
            }

            if step.command == "brew"
                && let Some(formula) = step.args.first()
                && let Err(e) = self.brew.install(formula, slug, &[]).await
            {
                warn!(slug, formula, error = %e, "brew wrapper install failed");
            }
        }
    }

    /// Step 6: deploy through the broker when available, falling back to
    /// direct/sudo-cascaded writes plus a skill-invocation wrapper.
    async fn deploy(&self, slug: &str, files: &BTreeMap<String, String>) -> Result<()> {
        if let Some(broker) = &self.broker
            && broker.probe_available().await
        {
            let encoded: BTreeMap<String, Vec<u8>> =
                files.iter().map(|(path, content)| (path.clone(), content.clone().into_bytes())).collect();
            match broker.install_skill(slug, &encoded, true).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(slug, error = %e, "broker install_skill failed, falling back to direct deploy"),
            }
        }

        let dir = self.skill_dir(slug);
        self.fs.mkdir(&dir).await?;
        for (rel_path, content) in files {
            let dest = dir.join(rel_path);
            if let Some(parent) = dest.parent() {
                self.fs.mkdir(parent).await?;
            }
            self.fs.write_file(&dest, content.as_bytes(), 0o644).await?;
        }
        self.write_skill_wrapper(slug).await
    }

    async fn write_skill_wrapper(&self, slug: &str) -> Result<()> {
        let script = format!(
            "#!/bin/bash\n# agenshield-generated-skill-wrapper\n\
pwd >/dev/null 2>&1 || cd ~ || cd / || exit 1\n\
exec /opt/agenshield/bin/shield-client skill run \"{slug}\" \"$@\"\n"
        );
        let wrapper_path = self.skill_wrapper_path(slug);
        self.fs.write_file(&wrapper_path, script.as_bytes(), 0o755).await?;
        if let Err(e) = self.fs.chown(&wrapper_path, "root", &self.brew.socket_group).await {
            warn!(slug, error = %e, "failed to set skill wrapper ownership");
        }
        Ok(())
    }

    /// Remove the on-disk tree, wrapper, skill policy, and brew wrappers;
    /// preserve the marketplace cache with `wasInstalled=true` so the slug
    /// can be re-enabled without re-downloading.
    pub async fn uninstall(&self, slug: &str) -> Result<()> {
        let removed_via_broker = match &self.broker {
            Some(broker) if broker.probe_available().await => broker.uninstall_skill(slug).await.is_ok(),
            _ => false,
        };
        if !removed_via_broker {
            self.fs.rm(&self.skill_dir(slug)).await?;
        }
        let _ = self.fs.rm(&self.skill_wrapper_path(slug)).await;

        if let Err(e) = self.registrar.remove_skill_policy(slug).await {
            warn!(slug, error = %e, "failed to remove skill policy during uninstall");
        }
        if let Err(e) = self.brew.uninstall(slug).await {
            warn!(slug, error = %e, "failed to remove brew binary wrappers during uninstall");
        }
        if let Err(e) = marketplace_cache::set_was_installed(&self.cache_root, slug, true).await {
            warn!(slug, error = %e, "failed to mark marketplace cache entry as previously installed");
        }

        self.bus
            .emit(EventKind::SkillsUninstalled, None, serde_json::json!({ "slug": slug }));
        Ok(())
    }

    /// On-disk: disable (uninstall, keeping cache). Cached-only: re-enable
    /// by replaying steps 4 onward of Install against the cached bundle.
    pub async fn toggle(&self, slug: &str) -> Result<ToggleOutcome> {
        let on_disk = tokio::fs::try_exists(self.skill_dir(slug)).await.unwrap_or(false);
        if on_disk {
            self.uninstall(slug).await?;
            Ok(ToggleOutcome::Disabled)
        } else {
            let (metadata, files) = read_cache_bundle(&self.cache_root, slug).await?;
            let outcome = self.deploy_and_register(slug, files, metadata).await?;
            Ok(ToggleOutcome::Enabled(outcome))
        }
    }

    /// Recompute per-file hashes for a deployed installation and compare
    /// against its most recent repository version.
    pub async fn check_integrity(&self, slug: &str) -> Result<hash::IntegrityReport> {
        let latest = self
            .repository
            .latest(slug)
            .await?
            .ok_or_else(|| AgenShieldError::ContractViolation(format!("'{slug}' has no recorded version")))?;
        hash::check_integrity(&self.skill_dir(slug), &latest.files).await
    }
}

fn inject_tag_into_skill_md(files: BTreeMap<String, String>, tag: &str) -> BTreeMap<String, String> {
    files
        .into_iter()
        .map(|(path, content)| {
            let is_skill_md = Path::new(&path)
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.eq_ignore_ascii_case("SKILL.md"));
            if is_skill_md {
                (path, installation_tag::inject(&content, tag))
            } else {
                (path, content)
            }
        })
        .collect()
}

async fn read_cache_bundle(cache_root: &Path, slug: &str) -> Result<(SkillMetadata, BTreeMap<String, String>)> {
    let dir = cache_root.join(slug);
    let metadata_bytes = tokio::fs::read(dir.join("metadata.json")).await?;
    let metadata: SkillMetadata = serde_json::from_slice(&metadata_bytes)?;

    let files_dir = dir.join("files");
    let mut files = BTreeMap::new();
    collect_text_files(&files_dir, &files_dir, &mut files).await?;
    Ok((metadata, files))
}

fn collect_text_files<'a>(
    root: &'a Path,
    dir: &'a Path,
    out: &'a mut BTreeMap<String, String>,
) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_text_files(root, &path, out).await?;
            } else if file_type.is_file() {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
                let content = tokio::fs::read_to_string(&path).await?;
                out.insert(relative, content);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privileged_fs::DirectFs;
    use crate::skills::analyzer::{DependencyStep, Vulnerability, VulnerabilityLevel};
    use crate::skills::repository::InMemorySkillRepository;
    use async_trait::async_trait;

    struct FixedAnalyzer(AnalysisResult);

    #[async_trait]
    impl SkillAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _slug: &str, _source: &str) -> Result<AnalysisResult> {
            Ok(self.0.clone())
        }
    }

    fn safe_analysis() -> AnalysisResult {
        AnalysisResult {
            vulnerability: Vulnerability { level: VulnerabilityLevel::None, summary: None },
            dependencies: vec![],
            raw: serde_json::Value::Null,
        }
    }

    fn critical_analysis() -> AnalysisResult {
        AnalysisResult {
            vulnerability: Vulnerability {
                level: VulnerabilityLevel::Critical,
                summary: Some("known RCE".to_string()),
            },
            dependencies: vec![],
            raw: serde_json::Value::Null,
        }
    }

    struct FixedMarketplace(Vec<u8>);

    #[async_trait]
    impl MarketplaceClient for FixedMarketplace {
        async fn download_zip(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct NoopDependencyInstaller;
    #[async_trait]
    impl DependencyInstaller for NoopDependencyInstaller {
        async fn install(&self, _step: &DependencyStep, _on_output: &(dyn Fn(Vec<String>) + Send + Sync)) -> Result<()> {
            Ok(())
        }
    }

    struct NoopRegistrar;
    #[async_trait]
    impl SkillPolicyRegistrar for NoopRegistrar {
        async fn add_skill_policy(&self, _slug: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_skill_policy(&self, _slug: &str) -> Result<()> {
            Ok(())
        }
    }

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    fn manager(dir: &Path, analysis: AnalysisResult, zip_bytes: Vec<u8>) -> SkillLifecycleManager {
        let brew = BrewWrapperManager {
            agent_home: dir.join("home"),
            socket_group: "ash_default".to_string(),
            fs: Arc::new(DirectFs),
            manifest_path: dir.join("brew-manifest.json"),
        };

        SkillLifecycleManager {
            skills_dir: dir.join("skills"),
            agent_home: dir.join("home"),
            approved_path: dir.join("approved-skills.json"),
            cache_root: dir.join("cache"),
            current_tag: "tagged-123".to_string(),
            analyzer: Arc::new(FixedAnalyzer(analysis)),
            marketplace: Arc::new(FixedMarketplace(zip_bytes)),
            repository: Arc::new(InMemorySkillRepository::new()),
            registrar: Arc::new(NoopRegistrar),
            dependency_installer: Arc::new(NoopDependencyInstaller),
            brew,
            fs: Arc::new(DirectFs),
            broker: None,
            watcher: None,
            bus: EventBus::new(),
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    #[tokio::test]
    async fn install_deploys_tags_and_approves() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = zip_with(&[("SKILL.md", b"# weather\nInstructions.")]);
        let mgr = manager(dir.path(), safe_analysis(), zip_bytes);

        let outcome = mgr.install("weather", "https://example.com/weather.zip").await.unwrap();
        assert!(!outcome.hash.is_empty());

        let deployed = tokio::fs::read_to_string(dir.path().join("skills/weather/SKILL.md")).await.unwrap();
        assert!(installation_tag::verify(&deployed, "tagged-123"));

        let approved = ApprovedList::load(&dir.path().join("approved-skills.json")).await.unwrap();
        assert!(approved.contains("weather"));
    }

    #[tokio::test]
    async fn install_aborts_on_critical_vulnerability_without_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = zip_with(&[("SKILL.md", b"# weather")]);
        let mgr = manager(dir.path(), critical_analysis(), zip_bytes);

        let err = mgr.install("weather", "https://example.com/weather.zip").await.unwrap_err();
        assert!(matches!(err, AgenShieldError::UpstreamRejected { .. }));
        assert!(!dir.path().join("skills/weather").exists());

        let metadata_path = dir.path().join("cache/weather/metadata.json");
        assert!(metadata_path.exists());
    }

    #[tokio::test]
    async fn second_concurrent_install_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = zip_with(&[("SKILL.md", b"# weather")]);
        let mgr = manager(dir.path(), safe_analysis(), zip_bytes);

        mgr.in_progress.lock().await.insert("weather".to_string());
        let err = mgr.install("weather", "https://example.com/weather.zip").await.unwrap_err();
        assert!(matches!(err, AgenShieldError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn uninstall_preserves_cache_and_marks_was_installed() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = zip_with(&[("SKILL.md", b"# weather")]);
        let mgr = manager(dir.path(), safe_analysis(), zip_bytes);
        mgr.install("weather", "https://example.com/weather.zip").await.unwrap();

        mgr.uninstall("weather").await.unwrap();
        assert!(!dir.path().join("skills/weather").exists());
        assert!(dir.path().join("cache/weather/files/SKILL.md").exists());

        let metadata_bytes = tokio::fs::read(dir.path().join("cache/weather/metadata.json")).await.unwrap();
        let metadata: SkillMetadata = serde_json::from_slice(&metadata_bytes).unwrap();
        assert_eq!(metadata.was_installed, Some(true));
    }

    #[tokio::test]
    async fn toggle_reenables_cached_only_skill() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = zip_with(&[("SKILL.md", b"# weather")]);
        let mgr = manager(dir.path(), safe_analysis(), zip_bytes);
        mgr.install("weather", "https://example.com/weather.zip").await.unwrap();
        mgr.uninstall("weather").await.unwrap();

        let outcome = mgr.toggle("weather").await.unwrap();
        assert!(matches!(outcome, ToggleOutcome::Enabled(_)));
        assert!(dir.path().join("skills/weather/SKILL.md").exists());
    }

    #[tokio::test]
    async fn check_integrity_reports_intact_after_install() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = zip_with(&[("SKILL.md", b"# weather")]);
        let mgr = manager(dir.path(), safe_analysis(), zip_bytes);
        mgr.install("weather", "https://example.com/weather.zip").await.unwrap();

        let report = mgr.check_integrity("weather").await.unwrap();
        assert!(report.intact());
    }
}
