//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::HttpGatewayConfig;
use domain::{Money, PricingPolicy, ShippingPolicy};
use thiserror::Error;

/// Signing secrets the in-process sandbox gateway runs with. Never used for
/// the HTTP gateway.
pub const SANDBOX_KEY_SECRET: &str = "sandbox_key_secret";
pub const SANDBOX_WEBHOOK_SECRET: &str = "sandbox_webhook_secret";

/// Configuration the server refuses to start with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set when GATEWAY_BASE_URL is set")]
    MissingSecret(&'static str),
}

/// Secrets used to check payment callback and webhook signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningSecrets {
    pub key_secret: String,
    pub webhook_secret: String,
}

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Payment gateway credentials and endpoint.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// HTTP gateway base URL. The in-process sandbox is used when unset.
    pub base_url: Option<String>,
    pub key_id: String,
    /// Required with `base_url`; the sandbox falls back to [`SANDBOX_KEY_SECRET`].
    pub key_secret: Option<String>,
    /// Required with `base_url`; the sandbox falls back to [`SANDBOX_WEBHOOK_SECRET`].
    pub webhook_secret: Option<String>,
    pub timeout: Duration,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for text
/// - `DATABASE_URL`: PostgreSQL event store; in-memory when unset
/// - `GATEWAY_BASE_URL`, `GATEWAY_KEY_ID`, `GATEWAY_KEY_SECRET`,
///   `GATEWAY_WEBHOOK_SECRET`, `GATEWAY_TIMEOUT_MS`
/// - `CURRENCY` (default `INR`)
/// - `FREE_SHIPPING_THRESHOLD`, `FLAT_SHIPPING_FEE`, `TAX_RATE_BPS` in minor
///   units and basis points
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub gateway: GatewaySettings,
    pub currency: String,
    pub pricing: PricingPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);
        let secret = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<i64>().ok());

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let pricing = PricingPolicy {
            shipping: ShippingPolicy {
                free_shipping_threshold: parsed("FREE_SHIPPING_THRESHOLD")
                    .map(Money::from_minor)
                    .unwrap_or(defaults.pricing.shipping.free_shipping_threshold),
                flat_shipping_fee: parsed("FLAT_SHIPPING_FEE")
                    .map(Money::from_minor)
                    .unwrap_or(defaults.pricing.shipping.flat_shipping_fee),
            },
            tax_rate_bps: parse_or(lookup("TAX_RATE_BPS"), defaults.pricing.tax_rate_bps),
        };

        Self {
            host: text("HOST", defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: text("RUST_LOG", defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            gateway: GatewaySettings {
                base_url: lookup("GATEWAY_BASE_URL").filter(|url| !url.is_empty()),
                key_id: text("GATEWAY_KEY_ID", defaults.gateway.key_id),
                key_secret: secret("GATEWAY_KEY_SECRET"),
                webhook_secret: secret("GATEWAY_WEBHOOK_SECRET"),
                timeout: lookup("GATEWAY_TIMEOUT_MS")
                    .and_then(|ms| ms.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.gateway.timeout),
            },
            currency: text("CURRENCY", defaults.currency),
            pricing,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Secrets for signature checks. The HTTP gateway needs both set
    /// explicitly; only the sandbox gets the built-in ones.
    pub fn signing_secrets(&self) -> Result<SigningSecrets, ConfigError> {
        let sandbox = self.gateway.base_url.is_none();
        Ok(SigningSecrets {
            key_secret: required_secret(
                &self.gateway.key_secret,
                "GATEWAY_KEY_SECRET",
                sandbox.then_some(SANDBOX_KEY_SECRET),
            )?,
            webhook_secret: required_secret(
                &self.gateway.webhook_secret,
                "GATEWAY_WEBHOOK_SECRET",
                sandbox.then_some(SANDBOX_WEBHOOK_SECRET),
            )?,
        })
    }

    /// Client settings for the HTTP gateway, if one is configured.
    pub fn http_gateway(&self) -> Result<Option<HttpGatewayConfig>, ConfigError> {
        let Some(base_url) = &self.gateway.base_url else {
            return Ok(None);
        };
        let secrets = self.signing_secrets()?;
        Ok(Some(HttpGatewayConfig {
            base_url: base_url.clone(),
            key_id: self.gateway.key_id.clone(),
            key_secret: secrets.key_secret,
            timeout: self.gateway.timeout,
        }))
    }
}

fn required_secret(
    value: &Option<String>,
    key: &'static str,
    fallback: Option<&str>,
) -> Result<String, ConfigError> {
    value
        .clone()
        .or_else(|| fallback.map(str::to_string))
        .ok_or(ConfigError::MissingSecret(key))
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            gateway: GatewaySettings {
                base_url: None,
                key_id: "sandbox_key".to_string(),
                key_secret: None,
                webhook_secret: None,
                timeout: Duration::from_millis(10_000),
            },
            currency: "INR".to_string(),
            pricing: PricingPolicy::default(),
        }
    }
}
