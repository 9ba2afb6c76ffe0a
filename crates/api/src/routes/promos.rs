//! Shopper-facing promo code check.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{Money, PromoQuote, UserId};
use event_store::EventStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ValidatePromoRequest {
    pub code: String,
    pub user_id: UserId,
    pub subtotal: Money,
}

/// POST /promo-codes/validate
///
/// Quotes the discount a code would give without consuming a use. Checkout
/// checks the code again when the order is placed.
#[tracing::instrument(skip(state, req), fields(code = %req.code, user_id = %req.user_id))]
pub async fn validate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ValidatePromoRequest>,
) -> Result<Json<PromoQuote>, ApiError> {
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("promo code must not be empty".to_string()));
    }
    if req.subtotal.is_negative() {
        return Err(ApiError::BadRequest("subtotal must not be negative".to_string()));
    }

    let quote = state
        .promos
        .validate(&req.code, req.user_id, req.subtotal)
        .await?;
    Ok(Json(quote))
}
