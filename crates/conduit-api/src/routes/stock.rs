//! Routes for stock items.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use conduit_orders::application::command_handlers::CreateStockItemHandler;
use conduit_orders::application::query_handlers::{GetStockItem, GetStockItemHandler, StockItemView};
use conduit_orders::domain::commands;

use super::CommandResponse;
use crate::error::ApiError;
use crate::extract::Scope;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateStockItemRequest {
    /// Stock keeping unit.
    pub sku: String,
    /// Units on hand.
    pub quantity: u32,
}

/// POST /
#[instrument(skip(state, scope, request), fields(sku = %request.sku))]
async fn create_stock_item(
    State(state): State<AppState>,
    Scope(mut scope): Scope,
    Json(request): Json<CreateStockItemRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::CreateStockItem {
        correlation_id: Uuid::new_v4(),
        stock_item_id: Uuid::new_v4(),
        sku: request.sku,
        quantity: request.quantity,
    };

    info!(correlation_id = %command.correlation_id, "handling create_stock_item command");

    let dispatched = state
        .dispatcher
        .send(&command, &CreateStockItemHandler, &mut scope)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse::new(dispatched.response, &dispatched.report)),
    ))
}

/// GET /{stock_item_id}
#[instrument(skip(state, scope))]
async fn get_stock_item(
    State(state): State<AppState>,
    Scope(mut scope): Scope,
    Path(stock_item_id): Path<Uuid>,
) -> Result<Json<StockItemView>, ApiError> {
    let query = GetStockItem {
        correlation_id: Uuid::new_v4(),
        stock_item_id,
    };
    let dispatched = state
        .dispatcher
        .send(&query, &GetStockItemHandler, &mut scope)
        .await?;
    Ok(Json(dispatched.response))
}

/// Returns the router for stock items.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_stock_item))
        .route("/{stock_item_id}", get(get_stock_item))
}
