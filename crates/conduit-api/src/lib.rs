//! Conduit API — HTTP host for the transactional dispatch pipeline.
//!
//! Each request gets its own [`RequestScope`](conduit_core::scope::RequestScope)
//! built from the `x-tenant-id`, `x-app-id` and `x-trace-id` headers, and is
//! sent through the shared
//! [`TransactionalDispatcher`](conduit_dispatch::TransactionalDispatcher).

pub mod broker;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the application router without middleware layers.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/orders", routes::orders::router())
        .nest("/api/v1/stock", routes::stock::router())
        .with_state(app_state)
}
