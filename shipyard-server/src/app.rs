//! Process wiring
//!
//! Builds every component from the configuration, binds both listeners and
//! runs until the cancellation token fires.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{self, ApiState};
use crate::auth::Credentials;
use crate::config::Config;
use crate::git::backend::GitHttpBackend;
use crate::git::{DefaultGitCommand, GitCommand};
use crate::notifier::SlackNotifier;
use crate::proxy;
use crate::state::{StateManager, retention};
use crate::store::Store;
use crate::upstream::{DefaultUpstream, Upstream};
use crate::version::DefaultVersionCommand;
use crate::webhook::GitServer;
use crate::workflow::{self, CHANNEL_CAPACITY, Orchestrator};

/// Runs the orchestrator; the store is removed on the way out
pub async fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    let store = Store::create(&config.main.repository).context("Failed to create store")?;

    let result = serve(&config, &store, cancel).await;

    store.delete();
    result
}

async fn serve(config: &Config, store: &Store, cancel: CancellationToken) -> Result<()> {
    let git = DefaultGitCommand::new(
        store.repository().to_path_buf(),
        store.workspace().to_path_buf(),
    )
    .context("git is required")?;
    git.init_repository()
        .await
        .context("Failed to initialize repository")?;
    let git_bin = git.bin().to_path_buf();

    let manager = StateManager::new(retention::from_setting(config.state.keep_versions));
    let upstream: Arc<dyn Upstream> = Arc::new(DefaultUpstream::new());
    let (trigger_tx, trigger_rx) = mpsc::channel(CHANNEL_CAPACITY);

    // Admin listener: status API and git endpoints
    let credentials = config
        .main
        .api
        .credentials()
        .map(|(username, password)| Credentials::new(username, password));
    let protocol = Arc::new(GitHttpBackend::new(
        git_bin.clone(),
        store.repository().to_path_buf(),
    ));
    let admin = api::create_admin_router(
        ApiState {
            state: manager.store(),
            trigger: trigger_tx.clone(),
        },
        GitServer::new(config.main.repository.clone(), protocol, trigger_tx.clone()),
        credentials,
    );

    // Public listener
    let public = proxy::create_router(upstream.clone(), &config.main.proxy.origins)
        .context("Failed to build proxy")?;

    let admin_listener = TcpListener::bind(&config.main.api.addr)
        .await
        .with_context(|| format!("Failed to bind admin listener to {}", config.main.api.addr))?;
    let proxy_listener = TcpListener::bind(&config.main.proxy.addr)
        .await
        .with_context(|| format!("Failed to bind proxy listener to {}", config.main.proxy.addr))?;
    info!(
        "Push to http://{}/{}",
        config.main.api.addr, config.main.repository
    );
    info!("Serving releases on {}", config.main.proxy.addr);

    let notifier = SlackNotifier::connect(&config.notifier.slack).await;
    let orchestrator = Orchestrator {
        head: config.main.head.clone(),
        deploy: config.deploy.clone(),
        release: config.release.clone(),
        execs: store.execs().to_path_buf(),
        version: Arc::new(DefaultVersionCommand::new(
            git_bin,
            store.workspace().to_path_buf(),
            config.trigger.version.clone(),
        )),
        git: Arc::new(git),
        state: Arc::new(manager.client()),
        upstream,
        notifier,
    };

    let mut tasks = JoinSet::new();
    tasks.spawn(manager.run(cancel.clone()));
    tasks.spawn(listen(admin_listener, admin, cancel.clone()));
    tasks.spawn(listen(proxy_listener, public, cancel.clone()));
    tasks.spawn(orchestrator.run(trigger_rx, trigger_tx, cancel.clone()));

    workflow::supervise(tasks, &cancel).await
}

async fn listen(listener: TcpListener, router: axum::Router, cancel: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .with_context(|| format!("Listener on {addr} failed"))?;
    info!("Listener on {} stopped", addr);
    Ok(())
}
