//! Promo code aggregate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;
use crate::order::UserId;

use super::{
    PromoCodeCreatedData, PromoCodeUsage, PromoDefinition, PromoError, PromoEvent,
    normalize_code, promo_stream_id,
};

/// Result of validating a code against a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoQuote {
    pub code: String,
    pub discount: Money,
}

/// A promo code and its usage counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoCode {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    definition: Option<PromoDefinition>,
    uses_so_far: u32,
    uses_by_user: HashMap<UserId, u32>,
}

impl Aggregate for PromoCode {
    type Event = PromoEvent;
    type Error = PromoError;

    fn aggregate_type() -> &'static str {
        Self::STREAM_KIND
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PromoEvent::PromoCodeCreated(data) => {
                self.id = Some(promo_stream_id(&data.definition.code));
                self.definition = Some(data.definition);
            }
            PromoEvent::PromoCodeRedeemed(usage) => {
                self.uses_so_far += 1;
                *self.uses_by_user.entry(usage.user_id).or_default() += 1;
            }
        }
    }
}

impl SnapshotCapable for PromoCode {
    fn snapshot_interval() -> usize {
        50
    }
}

impl PromoCode {
    pub const STREAM_KIND: &'static str = "PromoCode";

    pub fn definition(&self) -> Option<&PromoDefinition> {
        self.definition.as_ref()
    }

    pub fn code(&self) -> Option<&str> {
        self.definition.as_ref().map(|d| d.code.as_str())
    }

    pub fn uses_so_far(&self) -> u32 {
        self.uses_so_far
    }

    pub fn uses_by(&self, user_id: UserId) -> u32 {
        self.uses_by_user.get(&user_id).copied().unwrap_or(0)
    }

    /// Defines the code. The code is stored normalized.
    pub fn create(&self, definition: PromoDefinition) -> Result<Vec<PromoEvent>, PromoError> {
        let code = normalize_code(&definition.code);
        if self.id.is_some() {
            return Err(PromoError::AlreadyExists { code });
        }
        definition.validate()?;

        Ok(vec![PromoEvent::PromoCodeCreated(PromoCodeCreatedData {
            definition: PromoDefinition {
                code,
                ..definition
            },
            created_at: Utc::now(),
        })])
    }

    /// Validates the code for a cart without consuming a use.
    ///
    /// Checks run in a fixed order so the shopper always sees the first
    /// failing reason: existence, validity window, minimum subtotal, usage caps.
    pub fn quote(
        &self,
        code: &str,
        user_id: UserId,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<PromoQuote, PromoError> {
        let Some(definition) = self.definition.as_ref() else {
            return Err(PromoError::NotFound {
                code: normalize_code(code),
            });
        };

        if now < definition.valid_from || now > definition.valid_to {
            return Err(PromoError::Expired {
                code: definition.code.clone(),
            });
        }

        if subtotal < definition.min_subtotal {
            return Err(PromoError::BelowMinimum {
                minimum: definition.min_subtotal,
                subtotal,
            });
        }

        let exhausted = definition.max_uses.is_some_and(|max| self.uses_so_far >= max)
            || definition
                .max_uses_per_user
                .is_some_and(|max| self.uses_by(user_id) >= max);
        if exhausted {
            return Err(PromoError::ExhaustedUses {
                code: definition.code.clone(),
            });
        }

        Ok(PromoQuote {
            code: definition.code.clone(),
            discount: definition.rule.discount_for(subtotal),
        })
    }

    /// Consumes one use of the code for `order_id`.
    pub fn redeem(
        &self,
        code: &str,
        user_id: UserId,
        order_id: AggregateId,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<(PromoQuote, Vec<PromoEvent>), PromoError> {
        let quote = self.quote(code, user_id, subtotal, now)?;
        let event = PromoEvent::PromoCodeRedeemed(PromoCodeUsage {
            code: quote.code.clone(),
            user_id,
            order_id,
            used_at: now,
        });
        Ok((quote, vec![event]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promo::DiscountRule;
    use chrono::Duration;

    fn code_with(definition: PromoDefinition) -> PromoCode {
        let mut promo = PromoCode::default();
        let events = promo.create(definition).unwrap();
        promo.apply_events(events);
        promo
    }

    fn flat_100() -> PromoDefinition {
        let now = Utc::now();
        PromoDefinition::new(
            "flat100",
            DiscountRule::Flat {
                amount: Money::from_minor(100),
            },
            now - Duration::days(1),
            now + Duration::days(1),
        )
    }

    fn redeem(promo: &mut PromoCode, user_id: UserId) {
        let (_, events) = promo
            .redeem("FLAT100", user_id, AggregateId::new(), Money::from_minor(1_000), Utc::now())
            .unwrap();
        promo.apply_events(events);
    }

    #[test]
    fn create_stores_normalized_code_under_name_derived_id() {
        let promo = code_with(flat_100());
        assert_eq!(promo.code(), Some("FLAT100"));
        assert_eq!(promo.id(), Some(promo_stream_id("flat100")));
    }

    #[test]
    fn create_twice_fails() {
        let promo = code_with(flat_100());
        assert!(matches!(
            promo.create(flat_100()),
            Err(PromoError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let promo = PromoCode::default();
        assert_eq!(
            promo.quote(" nope ", UserId::new(), Money::from_minor(1), Utc::now()),
            Err(PromoError::NotFound {
                code: "NOPE".into()
            })
        );
    }

    #[test]
    fn outside_window_is_expired() {
        let promo = code_with(flat_100());
        let later = Utc::now() + Duration::days(2);
        assert!(matches!(
            promo.quote("FLAT100", UserId::new(), Money::from_minor(1_000), later),
            Err(PromoError::Expired { .. })
        ));
    }

    #[test]
    fn expiry_is_reported_before_minimum() {
        let promo = code_with(flat_100().with_min_subtotal(Money::from_minor(5_000)));
        let later = Utc::now() + Duration::days(2);
        assert!(matches!(
            promo.quote("FLAT100", UserId::new(), Money::from_minor(10), later),
            Err(PromoError::Expired { .. })
        ));
    }

    #[test]
    fn below_minimum_reports_both_amounts() {
        let promo = code_with(flat_100().with_min_subtotal(Money::from_minor(5_000)));
        assert_eq!(
            promo.quote("FLAT100", UserId::new(), Money::from_minor(4_999), Utc::now()),
            Err(PromoError::BelowMinimum {
                minimum: Money::from_minor(5_000),
                subtotal: Money::from_minor(4_999),
            })
        );
    }

    #[test]
    fn global_cap_is_enforced() {
        let mut promo = code_with(flat_100().with_max_uses(2));
        redeem(&mut promo, UserId::new());
        redeem(&mut promo, UserId::new());
        assert_eq!(promo.uses_so_far(), 2);

        assert!(matches!(
            promo.quote("FLAT100", UserId::new(), Money::from_minor(1_000), Utc::now()),
            Err(PromoError::ExhaustedUses { .. })
        ));
    }

    #[test]
    fn per_user_cap_is_enforced_independently() {
        let mut promo = code_with(flat_100().with_max_uses_per_user(1));
        let alice = UserId::new();
        redeem(&mut promo, alice);

        assert!(matches!(
            promo.quote("FLAT100", alice, Money::from_minor(1_000), Utc::now()),
            Err(PromoError::ExhaustedUses { .. })
        ));
        assert!(promo
            .quote("FLAT100", UserId::new(), Money::from_minor(1_000), Utc::now())
            .is_ok());
        assert_eq!(promo.uses_by(alice), 1);
    }

    #[test]
    fn quote_does_not_consume_a_use() {
        let promo = code_with(flat_100().with_max_uses(1));
        for _ in 0..3 {
            let quote = promo
                .quote("FLAT100", UserId::new(), Money::from_minor(1_000), Utc::now())
                .unwrap();
            assert_eq!(quote.discount, Money::from_minor(100));
        }
        assert_eq!(promo.uses_so_far(), 0);
    }

    #[test]
    fn state_survives_snapshot_round_trip() {
        let mut promo = code_with(flat_100());
        let user = UserId::new();
        redeem(&mut promo, user);

        let json = serde_json::to_value(&promo).unwrap();
        let restored: PromoCode = serde_json::from_value(json).unwrap();
        assert_eq!(restored.uses_so_far(), 1);
        assert_eq!(restored.uses_by(user), 1);
        assert_eq!(restored.code(), Some("FLAT100"));
    }
}
