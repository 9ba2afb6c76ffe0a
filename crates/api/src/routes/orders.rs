//! Shopper-facing order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::Address;
use domain::{AddressId, ChangeStatus, Order, OrderStatus, UserId};
use event_store::EventStore;
use projections::OrderSummary;
use serde::Deserialize;

use super::{OrderResponse, parse_aggregate_id, parse_user_id};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CustomerActionRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct AddAddressRequest {
    pub id: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from_order(&order)?))
}

/// GET /users/{id}/orders: the user's orders from the read model, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    let user_id = parse_user_id(&id)?;
    state.catch_up().await?;
    Ok(Json(state.customer_orders.orders_for_user(user_id).await))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CustomerActionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = customer_transition(&state, &id, OrderStatus::Cancelled, req).await?;
    Ok(Json(OrderResponse::from_order(&order)?))
}

/// POST /orders/{id}/return: asks for a return of a delivered order.
///
/// Refunds are issued separately by an admin.
#[tracing::instrument(skip(state, req))]
pub async fn request_return<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CustomerActionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = customer_transition(&state, &id, OrderStatus::ReturnRequested, req).await?;
    Ok(Json(OrderResponse::from_order(&order)?))
}

/// POST /users/{id}/addresses
#[tracing::instrument(skip(state, req))]
pub async fn add_address<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AddAddressRequest>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let user_id = parse_user_id(&id)?;
    if req.id.trim().is_empty() {
        return Err(ApiError::BadRequest("address id must not be empty".to_string()));
    }

    let address = Address {
        id: AddressId::new(req.id),
        user_id,
        line1: req.line1,
        city: req.city,
        postal_code: req.postal_code,
        country: req.country,
    };
    state.addresses.add(address.clone()).await;
    Ok((StatusCode::CREATED, Json(address)))
}

/// Moves the shopper's own order to `target`. Orders of other users are
/// reported as missing.
async fn customer_transition<S: EventStore + Clone + 'static>(
    state: &AppState<S>,
    id: &str,
    target: OrderStatus,
    req: CustomerActionRequest,
) -> Result<Order, ApiError> {
    let order_id = parse_aggregate_id(id)?;
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .filter(|order| order.is_owned_by(req.user_id))
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    let mut cmd = ChangeStatus::new(order_id, target, format!("user:{}", req.user_id));
    if let Some(reason) = req.reason {
        cmd = cmd.with_reason(reason);
    }
    let updated = state.orders.change_status(cmd).await?;

    tracing::info!(from = %order.status(), to = %target, "customer changed order status");
    Ok(updated)
}
