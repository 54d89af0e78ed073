//! Routes for orders.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use conduit_orders::application::command_handlers::{CancelOrderHandler, PlaceOrderHandler};
use conduit_orders::application::query_handlers::{GetOrder, GetOrderHandler, OrderView};
use conduit_orders::domain::commands;

use super::CommandResponse;
use crate::error::ApiError;
use crate::extract::Scope;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    /// The stock item to order.
    pub stock_item_id: Uuid,
    /// Units to order.
    pub quantity: u32,
    /// Hold the "order placed" notification back until this instant.
    #[serde(default)]
    pub notify_at: Option<DateTime<Utc>>,
}

/// POST /
#[instrument(skip(state, scope, request), fields(stock_item_id = %request.stock_item_id))]
async fn place_order(
    State(state): State<AppState>,
    Scope(mut scope): Scope,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::PlaceOrder {
        correlation_id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        stock_item_id: request.stock_item_id,
        quantity: request.quantity,
        notify_at: request.notify_at,
    };

    info!(correlation_id = %command.correlation_id, "handling place_order command");

    let dispatched = state
        .dispatcher
        .send(&command, &PlaceOrderHandler, &mut scope)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse::new(dispatched.response, &dispatched.report)),
    ))
}

/// POST /{order_id}/cancel
#[instrument(skip(state, scope))]
async fn cancel_order(
    State(state): State<AppState>,
    Scope(mut scope): Scope,
    Path(order_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CancelOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling cancel_order command");

    let dispatched = state
        .dispatcher
        .send(&command, &CancelOrderHandler, &mut scope)
        .await?;

    Ok(Json(CommandResponse::new(order_id, &dispatched.report)))
}

/// GET /{order_id}
#[instrument(skip(state, scope))]
async fn get_order(
    State(state): State<AppState>,
    Scope(mut scope): Scope,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let query = GetOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };
    let dispatched = state
        .dispatcher
        .send(&query, &GetOrderHandler, &mut scope)
        .await?;
    Ok(Json(dispatched.response))
}

/// Returns the router for orders.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order))
        .route("/{order_id}", get(get_order))
        .route("/{order_id}/cancel", post(cancel_order))
}
