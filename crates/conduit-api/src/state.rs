//! Shared application state.

use std::sync::Arc;

use conduit_dispatch::TransactionalDispatcher;
use conduit_tenancy::TenantConnectionRouter;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runs every request through the transactional pipeline.
    pub dispatcher: Arc<TransactionalDispatcher>,
    /// Routes tenant requests to their storage; `None` keeps every request
    /// on the default storage.
    pub tenants: Option<Arc<TenantConnectionRouter>>,
    /// Application id stamped on the request scope when the caller does not
    /// send one.
    pub app_id: Option<String>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(dispatcher: Arc<TransactionalDispatcher>) -> Self {
        Self {
            dispatcher,
            tenants: None,
            app_id: None,
        }
    }

    /// Enables tenant routing.
    #[must_use]
    pub fn with_tenants(mut self, tenants: Arc<TenantConnectionRouter>) -> Self {
        self.app_id = Some(tenants.app_id().to_owned());
        self.tenants = Some(tenants);
        self
    }
}
