//! Payment gateway adapter: idempotent order creation, bounded calls and
//! signature checks in front of a [`PaymentGateway`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::AggregateId;
use domain::Money;
use tokio::sync::{Mutex, OnceCell};

use crate::error::GatewayError;
use crate::services::{PaymentGateway, RemoteOrder, RemoteRefund};
use crate::signature::{SignatureVerifier, Verification};

/// Default bound on a single gateway call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type OrderCell = Arc<OnceCell<RemoteOrder>>;

/// Wraps a gateway client with the guarantees checkout relies on.
///
/// `create_remote_order` is single-flight per idempotency key: concurrent and
/// repeated calls with the same key share one remote call and return the same
/// gateway order id. A failed call leaves the key free for a retry. Once the
/// caller has recorded the gateway order, [`forget`](Self::forget) drops the
/// key; later calls with it rely on the gateway's own idempotency header.
#[derive(Clone)]
pub struct PaymentGatewayAdapter<G> {
    gateway: G,
    verifier: SignatureVerifier,
    currency: String,
    timeout: Duration,
    orders: Arc<Mutex<HashMap<String, OrderCell>>>,
}

impl<G: PaymentGateway> PaymentGatewayAdapter<G> {
    pub fn new(gateway: G, verifier: SignatureVerifier, currency: impl Into<String>) -> Self {
        Self {
            gateway,
            verifier,
            currency: currency.into(),
            timeout: DEFAULT_TIMEOUT,
            orders: Arc::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Creates (or recalls) the gateway order for `order_id`.
    ///
    /// Reusing a key with a different amount is rejected rather than
    /// returning an order for the wrong total.
    #[tracing::instrument(skip(self))]
    pub async fn create_remote_order(
        &self,
        order_id: AggregateId,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<String, GatewayError> {
        let cell = {
            let mut orders = self.orders.lock().await;
            orders.entry(idempotency_key.to_string()).or_default().clone()
        };

        let remote = cell
            .get_or_try_init(|| self.call_create(order_id, amount, idempotency_key))
            .await?;

        if remote.amount != amount {
            tracing::warn!(
                cached = %remote.amount,
                requested = %amount,
                "idempotency key reused with a different amount"
            );
            return Err(GatewayError::Rejected(format!(
                "idempotency key {idempotency_key} was used for amount {}",
                remote.amount
            )));
        }
        Ok(remote.id.clone())
    }

    /// Drops the cached gateway order for `idempotency_key`.
    pub async fn forget(&self, idempotency_key: &str) {
        self.orders.lock().await.remove(idempotency_key);
    }

    /// Number of idempotency keys currently cached.
    pub async fn cached_keys(&self) -> usize {
        self.orders.lock().await.len()
    }

    /// Refunds a captured payment.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        gateway_payment_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RemoteRefund, GatewayError> {
        self.bounded(
            "refund",
            self.gateway.refund(gateway_payment_id, amount, idempotency_key),
        )
        .await
    }

    /// Checks a payment callback signature. Never touches the gateway.
    pub fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Verification {
        self.verifier
            .verify_payment(gateway_order_id, gateway_payment_id, signature)
    }

    async fn call_create(
        &self,
        order_id: AggregateId,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RemoteOrder, GatewayError> {
        let receipt = order_id.to_string();
        let remote = self
            .bounded(
                "create_order",
                self.gateway
                    .create_order(&receipt, amount, &self.currency, idempotency_key),
            )
            .await?;
        tracing::info!(gateway_order_id = %remote.id, "gateway order created");
        Ok(remote)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Unavailable(format!(
                "{operation} timed out after {:?}",
                self.timeout
            ))),
        };
        metrics::histogram!("gateway_request_duration_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());
        result
    }
}
