//! Promo code domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::order::UserId;

use super::PromoDefinition;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PromoEvent {
    /// An admin defined a new promo code.
    PromoCodeCreated(PromoCodeCreatedData),

    /// An order redeemed the code.
    PromoCodeRedeemed(PromoCodeUsage),
}

impl DomainEvent for PromoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PromoEvent::PromoCodeCreated(_) => "PromoCodeCreated",
            PromoEvent::PromoCodeRedeemed(_) => "PromoCodeRedeemed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCodeCreatedData {
    pub definition: PromoDefinition,
    pub created_at: DateTime<Utc>,
}

/// One redemption of a promo code by one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeUsage {
    pub code: String,
    pub user_id: UserId,
    pub order_id: AggregateId,
    pub used_at: DateTime<Utc>,
}
