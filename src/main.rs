use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use ticket_dispenser::api::{configure, track_request};
use ticket_dispenser::config::{
    load_config, StorageBackend, StorageConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};
use ticket_dispenser::telemetry::init_tracing;
use ticket_dispenser::{CounterStore, InMemoryCounterStore, RedisCounterStore, TicketEngine};

async fn build_store(config: &StorageConfig) -> Result<Arc<dyn CounterStore>> {
    let store: Arc<dyn CounterStore> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryCounterStore::new()),
        StorageBackend::Redis => Arc::new(
            RedisCounterStore::connect(&config.redis)
                .await
                .context("Failed to connect to Redis")?,
        ),
    };
    Ok(store)
}

#[actix_web::main]
async fn main() -> Result<()> {
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_tracing(&config.log).context("Failed to initialize logging")?;
    tracing::info!(config = ?config.sanitized(), "configuration loaded");

    let store = build_store(&config.storage).await?;
    let engine = TicketEngine::with_key_prefix(store, config.storage.key_prefix.clone());
    tracing::info!(backend = engine.backend(), "counter store ready");

    let engine_data = web::Data::new(engine);
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(engine_data.clone())
            .wrap(from_fn(track_request))
            .configure(configure)
    });
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    tracing::info!(host = %config.server.host, port = config.server.port, "starting HTTP server");
    server
        .bind((config.server.host, config.server.port))
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?
        .run()
        .await
        .context("HTTP server terminated with an error")
}
