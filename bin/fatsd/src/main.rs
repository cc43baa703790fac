//! fatsd is the single-node control-plane daemon for the fats
//! application-hosting platform: it builds uploaded source archives into
//! container images, keeps a desired set of containers running on a shared
//! network, and front-ends them with a path-routed reverse proxy.

mod cli;
mod http;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use fats_core::{
    AppConfig, BuilderConfig, ContainerManager, GenerationRegistry, NetworkManager, ProxyResolver,
    Reconciler, SchedulerBuilder, Store,
};

use cli::Cli;
use http::AppState;

/// Log-facing name of the one registered reconciliation schedule.
const RECONCILE_SCHEDULE_NAME: &str = "Create Desired Application Containers";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.verbosity).init();

    let config = AppConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    tracing::info!(data_dir = %config.data_dir.display(), "Starting fatsd");

    let store = Store::connect(&config.db_path()).await?;

    let generation = GenerationRegistry::new(store.clone())
        .current()
        .await
        .context("Failed to acquire process generation")?;
    tracing::info!(generation = generation.0, "Acquired process generation");

    let network = NetworkManager::new(config.container_engine.clone(), config.network_name.clone());
    network.ensure_network().await.context("Failed to ensure shared network")?;
    if let Err(err) = network.attach_self().await {
        tracing::warn!(error = %err, "Failed to attach self to shared network; continuing");
    }

    let container = ContainerManager::new(config.container_engine.clone(), config.network_name.clone());
    let reconciler = Arc::new(Reconciler::new(store.clone(), container));

    let scheduler = {
        let reconciler = reconciler.clone();
        SchedulerBuilder::new()
            .register(
                RECONCILE_SCHEDULE_NAME,
                Duration::from_secs(config.reconcile_interval_secs),
                move || {
                    let reconciler = reconciler.clone();
                    async move {
                        let report = reconciler.run_pass(generation.0).await?;
                        tracing::info!(
                            created = report.created,
                            homogenized = report.homogenized,
                            dropped = report.dropped,
                            failures = report.creation_failures.len(),
                            "Reconciliation pass complete"
                        );
                        Ok(())
                    }
                },
            )
            .build()
    };

    tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    let proxy = Arc::new(ProxyResolver::new(
        store.clone(),
        Duration::from_secs(config.proxy_cache_ttl_secs),
    ));

    let scratch_dir = config.data_dir.join("scratch");
    let builder_config = Arc::new(BuilderConfig {
        plan_generator_bin: config.plan_generator_bin.clone(),
        plan_generator_version: config.plan_generator_version.clone(),
        plan_frontend_image: format!("ghcr.io/railwayapp/{}-frontend", config.plan_generator_bin),
        scratch_dir: scratch_dir.clone(),
    });

    let listen_addr = config.listen_addr.clone();
    let state = AppState {
        store,
        scheduler,
        proxy,
        config: Arc::new(config),
        builder_config,
        http_client: reqwest::Client::new(),
        scratch_dir,
    };

    serve(&listen_addr, state).await
}

async fn serve(listen_addr: &str, state: AppState) -> Result<()> {
    let addr: SocketAddr = listen_addr.parse().context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {addr}"))?;

    tracing::info!(addr = %addr, "Listening");

    axum::serve(
        listener,
        http::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server exited")
}
