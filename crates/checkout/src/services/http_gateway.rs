//! HTTP client for a Razorpay-style payment gateway.

use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::gateway::{PaymentGateway, RemoteOrder, RemoteRefund};
use crate::error::GatewayError;

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Connection settings for [`HttpPaymentGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub timeout: Duration,
}

/// Payment gateway reached over HTTPS with basic auth.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: Money,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Serialize)]
struct RefundRequest {
    amount: Money,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

impl HttpPaymentGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, T>(&self, path: &str, body: &B, idempotency_key: &str) -> Result<T, GatewayError>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, path, "payment gateway request failed");
                GatewayError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Rejected(format!("malformed gateway response: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| format!("{}: {}", e.error.code, e.error.description))
            .unwrap_or_else(|_| format!("HTTP {status}"));

        tracing::warn!(%status, %reason, path, "payment gateway returned an error");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(GatewayError::Unavailable(reason))
        } else {
            Err(GatewayError::Rejected(reason))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self))]
    async fn create_order(
        &self,
        receipt: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<RemoteOrder, GatewayError> {
        let body = CreateOrderRequest {
            amount,
            currency,
            receipt,
        };
        self.post("/v1/orders", &body, idempotency_key).await
    }

    #[tracing::instrument(skip(self))]
    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RemoteRefund, GatewayError> {
        self.post(
            &format!("/v1/payments/{payment_id}/refund"),
            &RefundRequest { amount },
            idempotency_key,
        )
        .await
    }
}
