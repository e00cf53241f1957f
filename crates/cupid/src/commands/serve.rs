//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use cupid::capability::{CapabilityRegistry, DatePlanCapability, SearchCapability};
use cupid::config::Config;
use cupid::document::{DocumentGateway, FileArtifactStore};
use cupid::knowledge::Instructions;
use cupid::llm::{LLMProvider, OpenAICompatibleProvider};
use cupid::server::{self, AppState};
use cupid::store::SessionStore;
use cupid::store::file::FileSessionStore;
use cupid::turn::{EngineSettings, TurnEngine};

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config '{config_path}'"))?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }
    config.paths.resolve_against(Path::new(config_path));

    let instructions = Arc::new(
        Instructions::load(config.paths.instructions.as_deref(), &config.paths.knowledge).await,
    );

    let sessions: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::with_lock_cleanup(&config.paths.sessions_dir));
    let documents = Arc::new(DocumentGateway::markdown(FileArtifactStore::new(
        &config.paths.artifacts_dir,
    )));

    let provider = build_provider(&config)?;

    let search = SearchCapability::from_env(&config.search.api_key_env, config.search.max_results)
        .context("failed to build search client")?;
    let capabilities = CapabilityRegistry::new()
        .register(Arc::new(search))
        .register(Arc::new(DatePlanCapability::new(documents.clone())));

    let settings = EngineSettings {
        model: config.model.name.clone(),
        temperature: config.model.temperature,
        max_tokens: config.model.max_tokens,
        turn: config.turn.clone(),
    };
    let engine = Arc::new(TurnEngine::new(
        sessions.clone(),
        provider,
        capabilities,
        instructions,
        settings,
    ));
    info!(
        model = %config.model.name,
        sessions_dir = %config.paths.sessions_dir.display(),
        artifacts_dir = %config.paths.artifacts_dir.display(),
        on_disconnect = ?config.turn.on_disconnect,
        "Engine ready"
    );

    let state = AppState {
        sessions,
        engine: engine.clone(),
        documents,
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        max_connections: config.server.max_connections,
    };
    let app = server::build_app(state, config.server.request_timeout_seconds);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let detached turns finish committing history before exiting
    engine.tasks().shutdown().await;

    info!("Server stopped");
    Ok(())
}

fn build_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let api_key = std::env::var(&config.model.api_key_env).ok();
    if api_key.is_none() {
        warn!(env = %config.model.api_key_env, "Model API key not set, requests will be unauthenticated");
    }

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build model client")?;

    Ok(Arc::new(OpenAICompatibleProvider::new(
        client,
        config.model.base_url.as_str(),
        api_key,
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = wait_or_park(
        signal::unix::signal(signal::unix::SignalKind::terminate()),
        "SIGTERM",
        |mut sig| async move {
            sig.recv().await;
        },
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Wait on an installed signal handler. A handler that failed to install
/// never resolves, so it cannot trigger a shutdown.
#[cfg_attr(not(unix), allow(dead_code))]
async fn wait_or_park<H, F, Fut>(handler: std::io::Result<H>, name: &str, wait: F)
where
    F: FnOnce(H) -> Fut,
    Fut: Future<Output = ()>,
{
    match handler {
        Ok(handler) => wait(handler).await,
        Err(e) => {
            warn!(error = %e, "Failed to install {name} handler");
            std::future::pending::<()>().await;
        }
    }
}
