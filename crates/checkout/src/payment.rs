//! Payment confirmation from shopper callbacks and gateway webhooks.

use common::AggregateId;
use domain::{DomainError, Order, OrderError, OrderService, PaymentOutcome};
use event_store::EventStore;
use serde::Deserialize;

use crate::error::PaymentError;
use crate::signature::SignatureVerifier;

const EVENT_CAPTURED: &str = "payment.captured";
const EVENT_FAILED: &str = "payment.failed";

/// Webhook body sent by the gateway.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Our order id, echoed from the gateway order's receipt.
    pub order_id: AggregateId,
    pub gateway_order_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// What a webhook did to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Captured(PaymentOutcome),
    Failed,
    /// Unknown event type, or a stale event for an already settled order.
    Ignored,
}

/// Confirms payments once their signatures check out.
///
/// A failed signature check never touches the order.
pub struct PaymentVerifier<S: EventStore> {
    orders: OrderService<S>,
    signatures: SignatureVerifier,
}

impl<S: EventStore + Clone> Clone for PaymentVerifier<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            signatures: self.signatures.clone(),
        }
    }
}

impl<S: EventStore> PaymentVerifier<S> {
    pub fn new(orders: OrderService<S>, signatures: SignatureVerifier) -> Self {
        Self { orders, signatures }
    }

    /// Verifies the callback the shopper's browser posts after paying and
    /// records the capture.
    ///
    /// Verifying the same payment again returns
    /// [`PaymentOutcome::AlreadyCaptured`] without a second event.
    #[tracing::instrument(skip(self, signature))]
    pub async fn verify(
        &self,
        order_id: AggregateId,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<(Order, PaymentOutcome), PaymentError> {
        if !self
            .signatures
            .verify_payment(gateway_order_id, gateway_payment_id, signature)
            .is_verified()
        {
            metrics::counter!("payment_verifications_total", "outcome" => "failed").increment(1);
            tracing::warn!("payment signature mismatch");
            return Err(PaymentError::VerificationFailed);
        }

        let (order, outcome) = self
            .orders
            .confirm_payment(order_id, gateway_order_id, gateway_payment_id)
            .await?;

        let label = match outcome {
            PaymentOutcome::Captured => "captured",
            PaymentOutcome::AlreadyCaptured => "already_captured",
        };
        metrics::counter!("payment_verifications_total", "outcome" => label).increment(1);
        tracing::info!(outcome = label, "payment verified");
        Ok((order, outcome))
    }

    /// Applies a signed gateway webhook.
    #[tracing::instrument(skip(self, body, signature), fields(len = body.len()))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, PaymentError> {
        if !self.signatures.verify_webhook(body, signature).is_verified() {
            metrics::counter!("webhooks_total", "outcome" => "rejected").increment(1);
            tracing::warn!("webhook signature mismatch");
            return Err(PaymentError::VerificationFailed);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| PaymentError::InvalidWebhook(e.to_string()))?;
        let payload = envelope.payload;

        let outcome = match envelope.event.as_str() {
            EVENT_CAPTURED => {
                let payment_id = payload.payment_id.as_deref().ok_or_else(|| {
                    PaymentError::InvalidWebhook("payment.captured without payment_id".into())
                })?;
                let (_, outcome) = self
                    .orders
                    .confirm_payment(payload.order_id, &payload.gateway_order_id, payment_id)
                    .await?;
                WebhookOutcome::Captured(outcome)
            }
            EVENT_FAILED => {
                let reason = payload.reason.as_deref().unwrap_or("payment failed");
                match self
                    .orders
                    .mark_payment_failed(payload.order_id, payload.payment_id.clone(), reason)
                    .await
                {
                    Ok(_) => WebhookOutcome::Failed,
                    // A failure notice that arrives after the capture is stale.
                    Err(DomainError::Order(OrderError::IllegalPaymentTransition { .. })) => {
                        tracing::info!(order_id = %payload.order_id, "stale payment.failed ignored");
                        WebhookOutcome::Ignored
                    }
                    // Cash orders have no gateway payment to fail.
                    Err(DomainError::Order(OrderError::WrongPaymentMethod(_))) => {
                        tracing::info!(order_id = %payload.order_id, "payment.failed for a cash order ignored");
                        WebhookOutcome::Ignored
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            other => {
                tracing::debug!(event = other, "unhandled webhook event");
                WebhookOutcome::Ignored
            }
        };

        metrics::counter!("webhooks_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Captured(_) => "captured",
            WebhookOutcome::Failed => "failed",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}
