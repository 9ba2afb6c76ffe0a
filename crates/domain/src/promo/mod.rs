//! Promo codes: definitions, validation and usage counting.
//!
//! Each code is its own event stream, keyed by a name-derived id, so that the
//! usage cap is enforced by the stream's optimistic version check.

mod aggregate;
mod events;
mod service;

pub use aggregate::{PromoCode, PromoQuote};
pub use events::{PromoCodeCreatedData, PromoCodeUsage, PromoEvent};
pub use service::PromoService;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Canonical form of a promo code: trimmed and upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Stream id for the promo code `code`, after normalization.
pub fn promo_stream_id(code: &str) -> AggregateId {
    AggregateId::from_name(PromoCode::STREAM_KIND, &normalize_code(code))
}

/// How a promo code reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountRule {
    /// A fixed amount off.
    Flat { amount: Money },

    /// A whole-number percentage of the subtotal, rounded down.
    Percent { percent: u32 },
}

impl DiscountRule {
    /// Discount for `subtotal`, never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match *self {
            DiscountRule::Flat { amount } => amount,
            DiscountRule::Percent { percent } => subtotal.percent(percent),
        };
        raw.clamp_to(subtotal)
    }
}

/// Admin-supplied definition of a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoDefinition {
    pub code: String,
    pub rule: DiscountRule,
    #[serde(default)]
    pub min_subtotal: Money,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Total redemptions allowed across all users. None means unlimited.
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Redemptions allowed per user. None means unlimited.
    #[serde(default)]
    pub max_uses_per_user: Option<u32>,
}

impl PromoDefinition {
    pub fn new(
        code: impl Into<String>,
        rule: DiscountRule,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            rule,
            min_subtotal: Money::zero(),
            valid_from,
            valid_to,
            max_uses: None,
            max_uses_per_user: None,
        }
    }

    pub fn with_min_subtotal(mut self, min_subtotal: Money) -> Self {
        self.min_subtotal = min_subtotal;
        self
    }

    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn with_max_uses_per_user(mut self, max_uses_per_user: u32) -> Self {
        self.max_uses_per_user = Some(max_uses_per_user);
        self
    }

    fn validate(&self) -> Result<(), PromoError> {
        let invalid = |msg: &str| Err(PromoError::InvalidDefinition(msg.to_string()));

        if normalize_code(&self.code).is_empty() {
            return invalid("code must not be empty");
        }
        if self.valid_from > self.valid_to {
            return invalid("valid_from must not be after valid_to");
        }
        if self.min_subtotal.is_negative() {
            return invalid("min_subtotal must not be negative");
        }
        match self.rule {
            DiscountRule::Flat { amount } if amount.is_negative() => {
                invalid("flat discount must not be negative")
            }
            DiscountRule::Percent { percent } if percent > 100 => {
                invalid("percent discount must be at most 100")
            }
            _ => Ok(()),
        }
    }
}

/// Reasons a promo code is rejected. Each maps to its own user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoError {
    #[error("Promo code {code} not found")]
    NotFound { code: String },

    #[error("Promo code {code} has expired")]
    Expired { code: String },

    #[error("Order subtotal {subtotal} is below the promo minimum of {minimum}")]
    BelowMinimum { minimum: Money, subtotal: Money },

    #[error("Promo code {code} has no uses left")]
    ExhaustedUses { code: String },

    #[error("Promo code {code} already exists")]
    AlreadyExists { code: String },

    #[error("Invalid promo code: {0}")]
    InvalidDefinition(String),
}
