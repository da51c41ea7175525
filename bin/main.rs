//! `regicached`: loads configuration, opens the SQLite pool, runs migrations, and starts
//! the scheduler and HTTP server.

use std::sync::Arc;

use regicache::config::RegicacheConfig;
use regicache::deleter::TagDeleter;
use regicache::persistence::{init_pool, SqliteStore};
use regicache::reconciler::Reconciler;
use regicache::registry::{RegistryAuth, RegistryClient};
use regicache::scheduler::Scheduler;
use regicache::server::{create_router, ServerState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RegicacheConfig::load();

    let pool = init_pool(&config.db_path, &config.db_version).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let registry = RegistryClient::new(
        &config.registry_url,
        RegistryAuth {
            username: config.registry_username.clone(),
            password: config.registry_password.clone(),
        },
    )?;

    let reconciler = Reconciler::new(
        registry.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    );

    let scheduler = Arc::new(
        Scheduler::new(reconciler, store.clone(), config.default_sync_interval).await?,
    );
    let worker = scheduler.start();

    let deleter = Arc::new(TagDeleter::new(registry, store.clone()));

    let state = ServerState {
        scheduler: scheduler.clone(),
        deleter,
        repositories: store.clone(),
        images: store.clone(),
        tags: store.clone(),
    };

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!(addr = %config.bind_addr, "regicached listening");

    tokio::select! {
        result = axum::serve(listener, router) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    scheduler.stop();
    worker.abort();

    Ok(())
}
