//! Ambient per-request state.
//!
//! A `RequestScope` is created when a request starts, passed down the call
//! chain by `&mut` and dropped when the request ends. It is never shared
//! between requests.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::accumulator::EventAccumulator;
use crate::storage::StorageEngine;

/// Storage target selected for the current request.
#[derive(Clone)]
pub struct ScopedTarget {
    /// Tenant the target belongs to.
    pub tenant_id: String,
    /// Storage engine every repository call of the request goes through.
    pub storage: Arc<dyn StorageEngine>,
}

impl fmt::Debug for ScopedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedTarget")
            .field("tenant_id", &self.tenant_id)
            .field("storage", &self.storage.describe())
            .finish()
    }
}

/// State visible to every collaborator within one logical request.
#[derive(Debug)]
pub struct RequestScope {
    request_id: Uuid,
    tenant_id: Option<String>,
    app_id: Option<String>,
    root_trace_id: Option<String>,
    target: Option<ScopedTarget>,
    events: EventAccumulator,
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestScope {
    /// Creates an empty scope with a fresh request id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant_id: None,
            app_id: None,
            root_trace_id: None,
            target: None,
            events: EventAccumulator::new(),
        }
    }

    /// Sets the tenant the request acts for.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the calling application.
    #[must_use]
    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the root trace id propagated from upstream.
    #[must_use]
    pub fn with_root_trace(mut self, root_trace_id: impl Into<String>) -> Self {
        self.root_trace_id = Some(root_trace_id.into());
        self
    }

    /// Identifier of this request scope.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Tenant the request acts for.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Calling application.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Root trace id, if one was propagated or generated.
    #[must_use]
    pub fn root_trace_id(&self) -> Option<&str> {
        self.root_trace_id.as_deref()
    }

    /// Returns the root trace id, generating and recording one if absent.
    pub fn root_trace_id_or_insert_with(&mut self, generate: impl FnOnce() -> String) -> &str {
        self.root_trace_id.get_or_insert_with(generate)
    }

    /// Storage target selected for this request, if any.
    #[must_use]
    pub fn target(&self) -> Option<&ScopedTarget> {
        self.target.as_ref()
    }

    /// Selects the storage target (and tenant) for the rest of the request.
    pub fn set_target(&mut self, target: ScopedTarget) {
        self.tenant_id = Some(target.tenant_id.clone());
        self.target = Some(target);
    }

    /// Event staging area of this request.
    #[must_use]
    pub fn events(&self) -> &EventAccumulator {
        &self.events
    }

    /// Event staging area of this request, mutably.
    pub fn events_mut(&mut self) -> &mut EventAccumulator {
        &mut self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_ambient_identifiers() {
        let scope = RequestScope::new()
            .with_tenant("acme")
            .with_app("billing")
            .with_root_trace("trace-1");

        assert_eq!(scope.tenant_id(), Some("acme"));
        assert_eq!(scope.app_id(), Some("billing"));
        assert_eq!(scope.root_trace_id(), Some("trace-1"));
        assert!(scope.target().is_none());
        assert!(scope.events().is_empty());
    }

    #[test]
    fn test_root_trace_is_generated_once() {
        let mut scope = RequestScope::new();

        let first = scope.root_trace_id_or_insert_with(|| "generated".into()).to_owned();
        let second = scope
            .root_trace_id_or_insert_with(|| "other".into())
            .to_owned();

        assert_eq!(first, "generated");
        assert_eq!(second, "generated");
    }

    #[test]
    fn test_scopes_have_distinct_request_ids() {
        assert_ne!(RequestScope::new().request_id(), RequestScope::new().request_id());
    }
}
