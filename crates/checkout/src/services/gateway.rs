//! Payment gateway trait and in-memory sandbox implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GatewayError;

/// An order created at the gateway for the shopper to pay against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    /// Our order id, echoed back in webhooks.
    #[serde(default)]
    pub receipt: String,
}

/// A refund accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRefund {
    pub id: String,
    #[serde(default)]
    pub payment_id: String,
    pub amount: Money,
}

/// Remote payment gateway operations.
///
/// Both calls carry an idempotency key; a gateway that sees a key twice must
/// return the original result instead of acting again.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        receipt: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<RemoteOrder, GatewayError>;

    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RemoteRefund, GatewayError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_order(
        &self,
        receipt: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<RemoteOrder, GatewayError> {
        (**self)
            .create_order(receipt, amount, currency, idempotency_key)
            .await
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RemoteRefund, GatewayError> {
        (**self).refund(payment_id, amount, idempotency_key).await
    }
}

#[derive(Debug, Default)]
struct SandboxState {
    orders: HashMap<String, RemoteOrder>,
    refunds: HashMap<String, RemoteRefund>,
    next_id: u32,
    create_calls: usize,
    unavailable: bool,
    reject_refunds: bool,
    latency: Option<Duration>,
}

/// In-memory gateway for development and testing.
///
/// Ids are sequential (`order_SBX0001`, `rfnd_SBX0002`, ...). Failure modes
/// and artificial latency can be switched on to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<SandboxState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`GatewayError::Unavailable`].
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Makes refund calls fail with [`GatewayError::Rejected`].
    pub async fn set_reject_refunds(&self, reject: bool) {
        self.state.write().await.reject_refunds = reject;
    }

    /// Delays every call, for timeout tests.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.latency = latency;
    }

    /// Number of create_order calls received, including replays.
    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }

    pub async fn refund_count(&self) -> usize {
        self.state.read().await.refunds.len()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_order(
        &self,
        receipt: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<RemoteOrder, GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;
        state.create_calls += 1;

        if state.unavailable {
            return Err(GatewayError::Unavailable("sandbox is down".into()));
        }
        if let Some(existing) = state.orders.get(idempotency_key) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let order = RemoteOrder {
            id: format!("order_SBX{:04}", state.next_id),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        };
        state
            .orders
            .insert(idempotency_key.to_string(), order.clone());
        Ok(order)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RemoteRefund, GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(GatewayError::Unavailable("sandbox is down".into()));
        }
        if state.reject_refunds {
            return Err(GatewayError::Rejected("refund declined".into()));
        }
        if let Some(existing) = state.refunds.get(idempotency_key) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let refund = RemoteRefund {
            id: format!("rfnd_SBX{:04}", state.next_id),
            payment_id: payment_id.to_string(),
            amount,
        };
        state
            .refunds
            .insert(idempotency_key.to_string(), refund.clone());
        Ok(refund)
    }
}
