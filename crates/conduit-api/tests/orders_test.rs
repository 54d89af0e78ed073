//! Integration tests for the order and stock routes.

mod common;

use axum::http::StatusCode;
use conduit_core::outbox::OutboxStatus;
use conduit_dispatch::OutboxEnvelope;
use uuid::Uuid;

async fn create_stock(app: axum::Router, headers: &[(&str, &str)], quantity: u32) -> Uuid {
    let (status, json) = common::post_json(
        app,
        "/api/v1/stock",
        headers,
        &serde_json::json!({ "sku": "WIDGET-1", "quantity": quantity }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    Uuid::parse_str(json["aggregate_id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_place_order_reserves_stock_and_confirms_order() {
    let backend = common::TestBackend::new();
    let stock_item_id = create_stock(backend.app(), &[], 10).await;

    // POST /api/v1/orders
    let (status, json) = common::post_json(
        backend.app(),
        "/api/v1/orders",
        &[("x-trace-id", "trace-42")],
        &serde_json::json!({ "stock_item_id": stock_item_id, "quantity": 4 }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["domain_events_published"], 3);
    assert_eq!(json["outbox_rows_appended"], 2);
    let order_id = json["aggregate_id"].as_str().unwrap().to_owned();

    // GET /api/v1/orders/{order_id}: verify persisted state
    let (status, json) =
        common::get_json(backend.app(), &format!("/api/v1/orders/{order_id}"), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Confirmed");
    assert_eq!(json["quantity"], 4);
    assert_eq!(json["version"], 2);

    let (status, json) =
        common::get_json(backend.app(), &format!("/api/v1/stock/{stock_item_id}"), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], 6);
    assert_eq!(json["reserved"], 4);

    let rows = backend.broker.enqueued();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let envelope = OutboxEnvelope::from_row(row).unwrap();
        assert_eq!(envelope.headers.trace_id.as_deref(), Some("trace-42"));
    }
}

#[tokio::test]
async fn test_order_beyond_stock_returns_400_and_persists_nothing() {
    let backend = common::TestBackend::new();
    let stock_item_id = create_stock(backend.app(), &[], 2).await;
    let aggregates_before = backend.storage.aggregate_count();

    let (status, json) = common::post_json(
        backend.app(),
        "/api/v1/orders",
        &[],
        &serde_json::json!({ "stock_item_id": stock_item_id, "quantity": 3 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert_eq!(backend.storage.aggregate_count(), aggregates_before);
    assert!(backend.storage.outbox_rows().is_empty());
    assert!(backend.broker.enqueued().is_empty());
}

#[tokio::test]
async fn test_delayed_notification_is_stored_as_delayed_row() {
    let backend = common::TestBackend::new();
    let stock_item_id = create_stock(backend.app(), &[], 5).await;
    let notify_at = common::fixed_now() + chrono::Duration::hours(2);

    let (status, _) = common::post_json(
        backend.app(),
        "/api/v1/orders",
        &[],
        &serde_json::json!({
            "stock_item_id": stock_item_id,
            "quantity": 1,
            "notify_at": notify_at,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let rows = backend.storage.outbox_rows();
    let placed = rows.iter().find(|row| row.name == "orders.placed").unwrap();
    assert_eq!(placed.status, OutboxStatus::Delayed);
    assert_eq!(placed.expires_at, Some(notify_at));
}

#[tokio::test]
async fn test_cancel_order_releases_stock() {
    let backend = common::TestBackend::new();
    let stock_item_id = create_stock(backend.app(), &[], 5).await;
    let (_, json) = common::post_json(
        backend.app(),
        "/api/v1/orders",
        &[],
        &serde_json::json!({ "stock_item_id": stock_item_id, "quantity": 5 }),
    )
    .await;
    let order_id = json["aggregate_id"].as_str().unwrap().to_owned();

    let (status, _) = common::post_json(
        backend.app(),
        &format!("/api/v1/orders/{order_id}/cancel"),
        &[],
        &serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let (_, json) =
        common::get_json(backend.app(), &format!("/api/v1/stock/{stock_item_id}"), &[]).await;
    assert_eq!(json["available"], 5);
    assert_eq!(json["reserved"], 0);

    // A second cancellation is a business-rule violation.
    let (status, json) = common::post_json(
        backend.app(),
        &format!("/api/v1/orders/{order_id}/cancel"),
        &[],
        &serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_get_nonexistent_order_returns_404() {
    let backend = common::TestBackend::new();

    let (status, json) = common::get_json(
        backend.app(),
        &format!("/api/v1/orders/{}", Uuid::new_v4()),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[tokio::test]
async fn test_tenant_requests_use_the_tenant_storage() {
    let backend = common::TestBackend::new();
    let mut tenants = common::TestTenants::default();
    let acme = tenants.shared("acme");
    let headers = [("x-tenant-id", "acme")];

    let stock_item_id = create_stock(backend.tenant_app(&tenants), &headers, 3).await;

    assert_eq!(acme.aggregate_count(), 1);
    assert_eq!(backend.storage.aggregate_count(), 0);

    let (status, _) = common::get_json(
        backend.tenant_app(&tenants),
        &format!("/api/v1/stock/{stock_item_id}"),
        &headers,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = common::get_json(
        backend.tenant_app(&tenants),
        &format!("/api/v1/stock/{stock_item_id}"),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[tokio::test]
async fn test_unknown_tenant_returns_404() {
    let backend = common::TestBackend::new();
    let tenants = common::TestTenants::default();

    let (status, json) = common::post_json(
        backend.tenant_app(&tenants),
        "/api/v1/stock",
        &[("x-tenant-id", "globex")],
        &serde_json::json!({ "sku": "WIDGET-1", "quantity": 1 }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "tenant_not_found");
}
