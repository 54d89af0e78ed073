//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use conduit_core::storage::StorageEngine;
use conduit_dispatch::{DomainEventPublisher, TransactionalDispatcher};
use conduit_tenancy::{
    ConnectionFactory, IsolationLevel, PassthroughDecryptor, TenancyError, TenantConnectionRouter,
    TenantDirectory, TenantInfo,
};
use conduit_test_support::{FixedClock, InMemoryStorage, RecordingBroker};
use http_body_util::BodyExt;
use tower::ServiceExt;

use conduit_api::state::AppState;

/// Application id used by the tenant router in tests.
pub const APP_ID: &str = "storefront";

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Storage and broker behind a test app.
pub struct TestBackend {
    /// Default storage.
    pub storage: InMemoryStorage,
    /// Broker receiving committed outbox rows.
    pub broker: Arc<RecordingBroker>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            storage: InMemoryStorage::named("default"),
            broker: Arc::new(RecordingBroker::new("v1")),
        }
    }

    fn dispatcher(&self) -> TransactionalDispatcher {
        let mut publisher = DomainEventPublisher::new();
        conduit_orders::application::register_event_handlers(&mut publisher);
        TransactionalDispatcher::new(Arc::new(self.storage.clone()), Arc::new(publisher))
            .with_broker(self.broker.clone())
            .with_clock(Arc::new(FixedClock(fixed_now())))
    }

    /// Build the app router over the default storage only. Uses the same
    /// route structure as `main.rs`.
    pub fn app(&self) -> Router {
        conduit_api::router(AppState::new(Arc::new(self.dispatcher())))
    }

    /// Build the app router with tenant routing over `tenants`.
    pub fn tenant_app(&self, tenants: &TestTenants) -> Router {
        let router = TenantConnectionRouter::new(
            APP_ID,
            Arc::new(tenants.clone()),
            Arc::new(PassthroughDecryptor),
            Arc::new(tenants.clone()),
        );
        conduit_api::router(
            AppState::new(Arc::new(self.dispatcher())).with_tenants(Arc::new(router)),
        )
    }
}

/// Tenant directory and connection factory backed by in-memory storages.
#[derive(Clone, Default)]
pub struct TestTenants {
    storages: HashMap<String, InMemoryStorage>,
}

impl TestTenants {
    /// Registers a shared tenant and returns the storage its requests use.
    pub fn shared(&mut self, tenant_id: &str) -> InMemoryStorage {
        let storage = InMemoryStorage::named(format!("shared/{tenant_id}"));
        self.storages.insert(tenant_id.to_owned(), storage.clone());
        storage
    }
}

#[async_trait]
impl TenantDirectory for TestTenants {
    async fn get_tenant_info(
        &self,
        tenant_code: &str,
        _app_id: &str,
    ) -> Result<Option<TenantInfo>, TenancyError> {
        Ok(self.storages.get(tenant_code).map(|_| TenantInfo {
            connection_string_encrypted: None,
            isolation_level: IsolationLevel::Shared,
        }))
    }
}

#[async_trait]
impl ConnectionFactory for TestTenants {
    async fn shared(&self, namespace: &str) -> Result<Arc<dyn StorageEngine>, TenancyError> {
        let storage = self
            .storages
            .get(namespace)
            .cloned()
            .ok_or_else(|| TenancyError::TenantNotFound(namespace.to_owned()))?;
        Ok(Arc::new(storage))
    }

    async fn dedicated(
        &self,
        tenant_id: &str,
        _connection_string: &str,
    ) -> Result<Arc<dyn StorageEngine>, TenancyError> {
        Err(TenancyError::TenantNotFound(tenant_id.to_owned()))
    }
}

/// Send a request and return the status and JSON body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and optional headers.
pub async fn post_json(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request with optional headers.
pub async fn get_json(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}
