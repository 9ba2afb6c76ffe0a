//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, PaymentError, RefundError};
use common::AggregateId;
use domain::{DomainError, OrderError, PromoError};
use event_store::EventStoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Refund(#[from] RefundError),

    #[error("{0}")]
    Internal(String),
}

/// What a failed request turns into on the wire.
struct Failure {
    status: StatusCode,
    code: &'static str,
    message: String,
    order_id: Option<AggregateId>,
}

impl Failure {
    fn new(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        Self {
            status,
            code,
            message: message.to_string(),
            order_id: None,
        }
    }

    fn for_order(mut self, order_id: AggregateId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Internal details are logged, never returned.
    fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal server error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let failure = match self {
            ApiError::NotFound(msg) => Failure::new(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => Failure::new(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Domain(err) => domain_failure(err),
            ApiError::Checkout(err) => checkout_failure(err),
            ApiError::Payment(err) => payment_failure(err),
            ApiError::Refund(err) => refund_failure(err),
            ApiError::Internal(msg) => Failure::internal(msg),
        };

        metrics::counter!("api_errors_total", "code" => failure.code).increment(1);

        let mut body = serde_json::json!({
            "error": failure.message,
            "code": failure.code,
        });
        if let Some(order_id) = failure.order_id {
            body["order_id"] = serde_json::json!(order_id);
        }
        (failure.status, axum::Json(body)).into_response()
    }
}

fn domain_failure(err: DomainError) -> Failure {
    match &err {
        DomainError::Order(order_err) => order_failure(order_err, &err),
        DomainError::Promo(promo_err) => match promo_err {
            PromoError::NotFound { .. }
            | PromoError::Expired { .. }
            | PromoError::BelowMinimum { .. }
            | PromoError::ExhaustedUses { .. } => {
                Failure::new(StatusCode::UNPROCESSABLE_ENTITY, "promo_invalid", &err)
            }
            PromoError::AlreadyExists { .. } => {
                Failure::new(StatusCode::CONFLICT, "promo_exists", &err)
            }
            PromoError::InvalidDefinition(_) => {
                Failure::new(StatusCode::BAD_REQUEST, "invalid_promo", &err)
            }
        },
        DomainError::Pricing(_) => Failure::new(StatusCode::BAD_REQUEST, "invalid_cart", &err),
        DomainError::AggregateNotFound { .. } => {
            Failure::new(StatusCode::NOT_FOUND, "not_found", &err)
        }
        DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
            Failure::new(StatusCode::CONFLICT, "concurrency_conflict", &err)
        }
        _ => Failure::internal(&err),
    }
}

fn order_failure(order_err: &OrderError, err: &DomainError) -> Failure {
    match order_err {
        OrderError::IllegalTransition { from, to } => {
            tracing::warn!(%from, %to, "illegal status transition rejected");
            Failure::new(StatusCode::CONFLICT, "illegal_transition", err)
        }
        OrderError::AwaitingPayment { .. } => {
            Failure::new(StatusCode::CONFLICT, "awaiting_payment", err)
        }
        OrderError::PartialRefundUnsupported { .. } | OrderError::NoGatewayPayment => {
            Failure::new(StatusCode::CONFLICT, "not_refundable", err)
        }
        OrderError::NoItems | OrderError::InconsistentTotals => {
            Failure::new(StatusCode::BAD_REQUEST, "invalid_cart", err)
        }
        OrderError::AlreadyPlaced
        | OrderError::IllegalPaymentTransition { .. }
        | OrderError::WrongPaymentMethod(_)
        | OrderError::GatewayOrderAlreadyAttached { .. }
        | OrderError::NoGatewayOrder
        | OrderError::GatewayOrderMismatch { .. }
        | OrderError::PaymentConflict { .. } => Failure::new(StatusCode::CONFLICT, "conflict", err),
    }
}

fn checkout_failure(err: CheckoutError) -> Failure {
    match err {
        CheckoutError::EmptyCart => Failure::new(StatusCode::BAD_REQUEST, "empty_cart", err),
        CheckoutError::InvalidCart(_) => Failure::new(StatusCode::BAD_REQUEST, "invalid_cart", err),
        CheckoutError::AddressNotFound(_) => {
            Failure::new(StatusCode::NOT_FOUND, "address_not_found", err)
        }
        CheckoutError::ProductNotFound(_) => {
            Failure::new(StatusCode::NOT_FOUND, "product_not_found", err)
        }
        CheckoutError::InsufficientStock { .. } => {
            Failure::new(StatusCode::CONFLICT, "insufficient_stock", err)
        }
        CheckoutError::PromoInvalid(_) => {
            Failure::new(StatusCode::UNPROCESSABLE_ENTITY, "promo_invalid", err)
        }
        CheckoutError::GatewayUnavailable { order_id, .. } => {
            Failure::new(StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable", &err)
                .for_order(order_id)
        }
        CheckoutError::GatewayRejected { order_id, .. } => {
            Failure::new(StatusCode::BAD_GATEWAY, "gateway_rejected", &err).for_order(order_id)
        }
        CheckoutError::CheckoutIdConflict(_) => {
            Failure::new(StatusCode::CONFLICT, "checkout_id_conflict", err)
        }
        CheckoutError::Domain(err) => domain_failure(err),
    }
}

fn payment_failure(err: PaymentError) -> Failure {
    match err {
        PaymentError::VerificationFailed => Failure::new(
            StatusCode::PAYMENT_REQUIRED,
            "verification_failed",
            "Payment could not be verified. If you were charged, contact support with your order id.",
        ),
        PaymentError::InvalidWebhook(_) => {
            Failure::new(StatusCode::BAD_REQUEST, "invalid_webhook", err)
        }
        PaymentError::Domain(err) => domain_failure(err),
    }
}

fn refund_failure(err: RefundError) -> Failure {
    match err {
        RefundError::NotRefundable(_) => Failure::new(StatusCode::CONFLICT, "not_refundable", err),
        RefundError::Gateway(_) => Failure::new(StatusCode::BAD_GATEWAY, "refund_failed", err),
        RefundError::Domain(err) => domain_failure(err),
    }
}
