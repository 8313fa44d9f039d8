//! `agenshieldd`: the AgenShield daemon. Loads configuration, starts the
//! in-process event bus and activity log, assembles the policy store,
//! skill lifecycle manager, and skills watcher, then blocks until the
//! process receives a shutdown signal.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use agenshield::brew::BrewWrapperManager;
use agenshield::broker::BrokerClient;
use agenshield::commands::WrapperManager;
use agenshield::events::{ActivityLog, EventBus, EventKind};
use agenshield::policy::{
    AclReconcileSubscriber, ChmodAclSystem, CommandReconcileSubscriber, MarkdownReconcileSubscriber,
    PolicySet, PolicyStore, ReconcileSubscriber, SecretReconcileSubscriber,
};
use agenshield::privileged_fs::{DirectFs, FirstAvailable, SudoFs};
use agenshield::secrets::{Secret, SecretStore};
use agenshield::settings::Settings;
use agenshield::skills::analyzer::HttpSkillAnalyzer;
use agenshield::skills::dependencies::ShellDependencyInstaller;
use agenshield::skills::lifecycle::SkillLifecycleManager;
use agenshield::skills::repository::InMemorySkillRepository;
use agenshield::skills::watcher::SkillsWatcher;
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

/// No vault is wired up yet (out of scope, spec.md §1); reports an
/// unlocked, empty secret list so `SecretReconcileSubscriber` still pushes
/// a well-formed empty payload on every reconcile.
struct NoVaultSecretStore;

#[async_trait]
impl SecretStore for NoVaultSecretStore {
    async fn list(&self) -> agenshield::error::Result<Option<Vec<Secret>>> {
        Ok(Some(Vec::new()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agenshield=info")),
        )
        .json()
        .init();

    tracing::info!("agenshieldd starting");

    // ── Settings ───────────────────────────────────────────────────
    let settings = Settings::load();
    tracing::info!(
        agent_home = %settings.agent_home,
        agent_user = %settings.agent_user,
        socket_group = %settings.socket_group,
        broker_socket = %settings.broker_socket_path().display(),
        "configuration loaded"
    );
    let agent_home = PathBuf::from(&settings.agent_home);
    let state_dir = agent_home.join(".agenshield");

    // ── Event bus + activity log ───────────────────────────────────
    let bus = EventBus::new();
    let log_receiver = bus.subscribe();
    let log_task = tokio::spawn(ActivityLog::new(state_dir.join("activity.jsonl")).run(log_receiver));

    bus.emit(EventKind::ProcessDaemonStarted, None, serde_json::json!({}));

    // ── Privileged filesystem cascade ──────────────────────────────
    let broker = Arc::new(BrokerClient::new(settings.broker_socket_path()));
    let fs: Arc<dyn agenshield::privileged_fs::PrivilegedFs> = Arc::new(FirstAvailable::new(vec![
        Box::new(DirectFs),
        Box::new(SudoFs {
            agent_user: settings.agent_user.clone(),
        }),
    ]));

    // ── Policy store + reconciler subscribers ──────────────────────
    let bin_dirs = vec![agent_home.join("bin")];
    let wrapper_manager = WrapperManager {
        bin_dirs: bin_dirs.clone(),
        shield_exec_path: None,
        fs: fs.clone(),
    };
    let subscribers: Vec<Arc<dyn ReconcileSubscriber>> = vec![
        Arc::new(AclReconcileSubscriber {
            acl_system: Arc::new(ChmodAclSystem),
            agent_home: settings.agent_home.clone(),
            agent_user: settings.agent_user.clone(),
        }),
        Arc::new(CommandReconcileSubscriber {
            bin_dirs,
            manifest_path: state_dir.join("allowed-commands.json"),
            wrappers: wrapper_manager,
        }),
        Arc::new(SecretReconcileSubscriber {
            store: Arc::new(NoVaultSecretStore),
            pusher: broker.clone(),
        }),
        Arc::new(MarkdownReconcileSubscriber {
            output_path: state_dir.join("policy-instructions.md"),
            known_skills: Arc::new(|| BTreeSet::new()),
        }),
    ];
    let policy_store = Arc::new(PolicyStore::new(
        PolicySet::default(),
        state_dir.join("policies.json"),
        subscribers,
    ));

    // ── Skill lifecycle manager + watcher ──────────────────────────
    let current_tag = uuid::Uuid::new_v4().to_string();
    let cache_root = state_dir.join("marketplace-cache");
    let approved_path = state_dir.join("approved-skills.json");
    let skills_dir = agent_home.join("skills");

    let watcher = Arc::new(
        SkillsWatcher::new(
            skills_dir.clone(),
            approved_path.clone(),
            cache_root.clone(),
            current_tag.clone(),
            policy_store.clone(),
            Some(Arc::new(HttpSkillAnalyzer::new(settings.analyzer_url.clone()))),
            bus.clone(),
        )
        .with_poll_interval(settings.skills_poll_interval()),
    );
    let watcher_task = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.run_poll_loop().await })
    };

    let _lifecycle = SkillLifecycleManager {
        skills_dir,
        agent_home: agent_home.clone(),
        approved_path,
        cache_root,
        current_tag,
        analyzer: Arc::new(HttpSkillAnalyzer::new(settings.analyzer_url.clone())),
        marketplace: Arc::new(agenshield::marketplace::HttpMarketplaceClient::new()),
        repository: Arc::new(InMemorySkillRepository::new()),
        registrar: policy_store.clone(),
        dependency_installer: Arc::new(ShellDependencyInstaller),
        brew: BrewWrapperManager {
            agent_home: agent_home.clone(),
            socket_group: settings.socket_group.clone(),
            fs: fs.clone(),
            manifest_path: state_dir.join("brew-manifest.json"),
        },
        fs,
        broker: Some(broker),
        watcher: Some(watcher),
        bus: bus.clone(),
    };
    // The control surface (spec.md §6) drives install/uninstall/toggle
    // requests against `_lifecycle`; that IPC listener is out of scope
    // here and attaches once it lands.

    // ── Shutdown ───────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("agenshieldd shutting down");
    bus.emit(EventKind::ProcessDaemonStopped, None, serde_json::json!({}));
    watcher_task.abort();
    drop(bus);
    let _ = log_task.await;

    Ok(())
}
