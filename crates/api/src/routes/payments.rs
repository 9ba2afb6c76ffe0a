//! Payment confirmation: the shopper's callback and gateway webhooks.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use common::AggregateId;
use domain::PaymentOutcome;
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::OrderResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the hex HMAC of a webhook body.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: AggregateId,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Serialize)]
pub struct VerifyPaymentResponse {
    pub order: OrderResponse,
    pub outcome: &'static str,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub outcome: &'static str,
}

/// POST /payments/verify
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn verify<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let (order, outcome) = state
        .payments
        .verify(
            req.order_id,
            &req.gateway_order_id,
            &req.gateway_payment_id,
            &req.signature,
        )
        .await?;

    let outcome = match outcome {
        PaymentOutcome::Captured => "captured",
        PaymentOutcome::AlreadyCaptured => "already_captured",
    };
    Ok(Json(VerifyPaymentResponse {
        order: OrderResponse::from_order(&order)?,
        outcome,
    }))
}

/// POST /payments/webhook
///
/// The signature covers the raw body, so the body is taken as bytes.
#[tracing::instrument(skip(state, headers, body))]
pub async fn webhook<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {SIGNATURE_HEADER} header")))?;

    let outcome = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookResponse {
        outcome: outcome.label(),
    }))
}
