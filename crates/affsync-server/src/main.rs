mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use affsync_core::{EventDedupStore, Environment};
use affsync_db::PgStore;
use affsync_shopify::ShopifyAdminClient;
use affsync_sync::{
    configured_connectors, spawn_eviction, InMemoryEventCache, IngestionPipeline, SyncSettings,
    SyncStateMachine, WebhookIngestor, WebhookSettings,
};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = affsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = affsync_db::PoolConfig::from_app_config(&config);
    let pool = affsync_db::connect_pool(&config.database_url, pool_config).await?;
    affsync_db::run_migrations(&pool).await?;
    let store = Arc::new(PgStore::new(pool.clone()));

    let catalog = Arc::new(ShopifyAdminClient::from_app_config(&config)?);
    let machine = SyncStateMachine::new(
        catalog,
        store.clone(),
        SyncSettings::from_app_config(&config),
    );
    let connectors = configured_connectors(&config)?;
    if connectors.is_empty() {
        tracing::warn!("no feed credentials configured; ingestion runs will be refused");
    }
    let pipeline = IngestionPipeline::new(
        store.clone(),
        store.clone(),
        store.clone(),
        machine,
        connectors,
        config.max_concurrent_products,
    );

    let dedup: Arc<dyn EventDedupStore> = Arc::new(InMemoryEventCache::new());
    let _eviction = spawn_eviction(
        Arc::clone(&dedup),
        Duration::from_secs(config.webhook_evict_interval_secs),
    );
    let webhooks = WebhookIngestor::new(
        WebhookSettings::from_app_config(&config),
        dedup,
        store.clone(),
    );

    let _scheduler = scheduler::build_scheduler(pipeline.clone(), &config.reconcile_cron).await?;

    let auth = AuthState::from_env(matches!(config.env, Environment::Development))?;
    let state = AppState {
        pipeline,
        brands: store.clone(),
        runs: store,
        webhooks: Arc::new(webhooks),
        pool: Some(pool),
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "affsync-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
