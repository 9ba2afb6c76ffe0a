//! Admin endpoints: order status, refunds, cash collection, catalog and promo codes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{
    ChangeStatus, Money, OrderStatus, ProductId, PromoCodeUsage, PromoDefinition, normalize_code,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::{OrderResponse, parse_aggregate_id};
use crate::error::ApiError;
use crate::state::AppState;

const ADMIN_ACTOR: &str = "admin";

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub amount: Money,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub amount: Money,
    pub order: OrderResponse,
}

#[derive(Deserialize)]
pub struct CashCollectedRequest {
    pub collected_by: String,
}

#[derive(Deserialize)]
pub struct ProductRequest {
    pub price: Money,
    pub stock: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub product_id: ProductId,
    pub price: Money,
    pub stock: u32,
}

#[derive(Serialize)]
pub struct PromoUsagesResponse {
    pub code: String,
    pub count: usize,
    pub usages: Vec<PromoCodeUsage>,
}

/// PUT /admin/orders/{id}/status
#[tracing::instrument(skip(state, req), fields(target = %req.status))]
pub async fn change_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let mut cmd = ChangeStatus::new(order_id, req.status, ADMIN_ACTOR);
    if let Some(reason) = req.reason {
        cmd = cmd.with_reason(reason);
    }

    let order = state.orders.change_status(cmd).await?;
    Ok(Json(OrderResponse::from_order(&order)?))
}

/// POST /admin/orders/{id}/refund
#[tracing::instrument(skip(state, req), fields(amount = %req.amount))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let refund = state.refunds.refund(order_id, req.amount).await?;

    Ok(Json(RefundResponse {
        order: OrderResponse::from_order(&refund.order)?,
        refund_id: refund.refund_id,
        amount: refund.amount,
    }))
}

/// POST /admin/orders/{id}/cash-collected
#[tracing::instrument(skip(state, req))]
pub async fn cash_collected<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CashCollectedRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .orders
        .record_cash_collected(order_id, &req.collected_by)
        .await?;
    Ok(Json(OrderResponse::from_order(&order)?))
}

/// PUT /admin/products/{id}: sets price and stock of a catalog product.
#[tracing::instrument(skip(state, req))]
pub async fn upsert_product<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    if req.price.is_negative() {
        return Err(ApiError::BadRequest("price must not be negative".to_string()));
    }

    let product_id = ProductId::new(id);
    state
        .catalog
        .upsert(product_id.clone(), req.price, req.stock)
        .await;

    Ok(Json(ProductResponse {
        product_id,
        price: req.price,
        stock: req.stock,
    }))
}

/// POST /admin/promo-codes
#[tracing::instrument(skip(state, definition), fields(code = %definition.code))]
pub async fn create_promo<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(definition): Json<PromoDefinition>,
) -> Result<(StatusCode, Json<PromoDefinition>), ApiError> {
    let promo = state.promos.create_code(definition).await?;
    let definition = promo
        .definition()
        .cloned()
        .ok_or_else(|| ApiError::Internal("promo code created without a definition".to_string()))?;

    Ok((StatusCode::CREATED, Json(definition)))
}

/// GET /admin/promo-codes/{code}/usages
#[tracing::instrument(skip(state))]
pub async fn promo_usages<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(code): Path<String>,
) -> Result<Json<PromoUsagesResponse>, ApiError> {
    state.catch_up().await?;
    let usages = state
        .promo_usage
        .usages(&code)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Promo code {code} not found")))?;

    Ok(Json(PromoUsagesResponse {
        code: normalize_code(&code),
        count: usages.len(),
        usages,
    }))
}
