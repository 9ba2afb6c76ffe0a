//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::{CartLine, CheckoutRequest};
use common::AggregateId;
use domain::{AddressId, Money, PaymentMethod, UserId};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::OrderResponse;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub user_id: UserId,
    pub items: Vec<CartLine>,
    pub address_id: AddressId,
    #[serde(default)]
    pub promo_code: Option<String>,
    pub payment_method: PaymentMethod,
    /// Retry key chosen by the client; reusing it returns the same order.
    #[serde(default)]
    pub checkout_id: Option<AggregateId>,
}

/// What the client needs to open the gateway's payment page.
#[derive(Serialize)]
pub struct PaymentInstructions {
    pub gateway_order_id: String,
    pub amount: Money,
    pub currency: String,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub payment: Option<PaymentInstructions>,
    pub discount: Money,
    pub replayed: bool,
}

/// POST /checkout
///
/// 201 for a new order, 200 when `checkout_id` replays an earlier one.
#[tracing::instrument(skip(state, body), fields(user_id = %body.user_id))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let mut request =
        CheckoutRequest::new(body.user_id, body.items, body.address_id, body.payment_method);
    if let Some(code) = body.promo_code {
        request = request.with_promo_code(code);
    }
    if let Some(checkout_id) = body.checkout_id {
        request = request.with_checkout_id(checkout_id);
    }

    let result = state.checkout.checkout(request).await?;

    let payment = result.gateway_order_id.map(|gateway_order_id| PaymentInstructions {
        gateway_order_id,
        amount: result.order.total(),
        currency: state.currency.clone(),
    });
    let status = if result.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(CheckoutResponse {
            order: OrderResponse::from_order(&result.order)?,
            payment,
            discount: result.order.pricing().discount,
            replayed: result.replayed,
        }),
    ))
}
