//! Per-request scope extraction.
//!
//! Every handler receives a fresh [`RequestScope`] built from the caller's
//! headers. When tenant routing is enabled and the caller names a tenant,
//! the scope's storage target is switched to that tenant before the
//! handler runs.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use conduit_core::scope::RequestScope;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Names the tenant the request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Names the calling application.
pub const APP_HEADER: &str = "x-app-id";
/// Carries the root trace id of an upstream request chain.
pub const TRACE_HEADER: &str = "x-trace-id";

/// The request scope of the current HTTP request.
#[derive(Debug)]
pub struct Scope(pub RequestScope);

impl FromRequestParts<AppState> for Scope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut scope = RequestScope::new();

        if let Some(app_id) = header(&parts.headers, APP_HEADER).or(state.app_id.as_deref()) {
            scope = scope.with_app(app_id);
        }
        if let Some(trace_id) = header(&parts.headers, TRACE_HEADER) {
            scope = scope.with_root_trace(trace_id);
        }

        if let Some(tenant_id) = header(&parts.headers, TENANT_HEADER) {
            scope = scope.with_tenant(tenant_id);
            match &state.tenants {
                Some(router) => {
                    router.switch_to(&mut scope, tenant_id).await?;
                }
                None => debug!(tenant_id, "tenant routing disabled; using default storage"),
            }
        }

        Ok(Self(scope))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
