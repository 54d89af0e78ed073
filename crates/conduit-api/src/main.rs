//! Conduit API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use conduit_api::broker::LogRelayBroker;
use conduit_api::config::ApiConfig;
use conduit_api::error::AppError;
use conduit_api::state::AppState;
use conduit_dispatch::{DomainEventPublisher, TransactionalDispatcher};
use conduit_lock::DistributedLock;
use conduit_store_pg::{PgConnectionFactory, PgLockCache, PgStorage, PgTenantDirectory};
use conduit_tenancy::{PassthroughDecryptor, TenantConnectionRouter};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Conduit API server");

    let config = ApiConfig::from_env()?;

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(AppError::from)?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;

    // Wire the pipeline.
    let mut publisher = DomainEventPublisher::new();
    conduit_orders::application::register_event_handlers(&mut publisher);

    let mut dispatcher = TransactionalDispatcher::new(
        Arc::new(PgStorage::new(pool.clone())),
        Arc::new(publisher),
    )
    .with_config(config.dispatcher);
    match &config.outbox_version {
        Some(version) => {
            dispatcher = dispatcher.with_broker(Arc::new(LogRelayBroker::new(version.clone())));
        }
        None => tracing::warn!("OUTBOX_VERSION not set; integration events will not be stored"),
    }

    let mut app_state = AppState::new(Arc::new(dispatcher));
    if let Some(app_id) = &config.app_id {
        let lock = DistributedLock::from_kind(config.lock_backend, Arc::new(PgLockCache::new(pool.clone())));
        let tenants = TenantConnectionRouter::new(
            app_id.clone(),
            Arc::new(PgTenantDirectory::new(pool.clone())),
            Arc::new(PassthroughDecryptor),
            Arc::new(PgConnectionFactory::new(pool.clone())),
        )
        .with_registration_lock(Arc::new(lock), config.tenant_lock_ttl, config.lock_wait);
        app_state = app_state.with_tenants(Arc::new(tenants));
        tracing::info!(app_id, lock_backend = %config.lock_backend, "tenant routing enabled");
    }

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = conduit_api::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server.
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
