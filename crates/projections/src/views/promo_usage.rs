//! Promo usage ledger: every redemption of every promo code.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Aggregate, PromoCode, PromoCodeUsage, PromoEvent, UserId, normalize_code};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::Projection;

struct PromoUsageState {
    /// Normalized code to its redemptions in the order they happened.
    usages: HashMap<String, Vec<PromoCodeUsage>>,
}

/// Append-only audit view of promo code redemptions.
///
/// Defined codes appear with an empty ledger until their first use.
#[derive(Clone)]
pub struct PromoUsageView {
    state: Arc<RwLock<PromoUsageState>>,
}

impl PromoUsageView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PromoUsageState {
                usages: HashMap::new(),
            })),
        }
    }

    /// Redemptions of a code, oldest first. None if the code was never defined.
    pub async fn usages(&self, code: &str) -> Option<Vec<PromoCodeUsage>> {
        self.state
            .read()
            .await
            .usages
            .get(&normalize_code(code))
            .cloned()
    }

    pub async fn usage_count(&self, code: &str) -> usize {
        self.state
            .read()
            .await
            .usages
            .get(&normalize_code(code))
            .map_or(0, Vec::len)
    }

    /// Every redemption made by one user, across codes.
    pub async fn usages_by_user(&self, user_id: UserId) -> Vec<PromoCodeUsage> {
        let state = self.state.read().await;
        let mut usages: Vec<_> = state
            .usages
            .values()
            .flatten()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect();
        usages.sort_by(|a, b| a.used_at.cmp(&b.used_at));
        usages
    }
}

impl Default for PromoUsageView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for PromoUsageView {
    fn name(&self) -> &'static str {
        "PromoUsageView"
    }

    fn handles(&self, aggregate_type: &str) -> bool {
        aggregate_type == PromoCode::aggregate_type()
    }

    async fn apply(&self, event: &EventEnvelope) -> Result<()> {
        let promo_event: PromoEvent = serde_json::from_value(event.payload.clone())?;
        let mut state = self.state.write().await;
        match promo_event {
            PromoEvent::PromoCodeCreated(data) => {
                state.usages.entry(data.definition.code).or_default();
            }
            PromoEvent::PromoCodeRedeemed(usage) => {
                state.usages.entry(usage.code.clone()).or_default().push(usage);
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.usages.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::AggregateId;
    use domain::{DiscountRule, DomainEvent, Money, PromoDefinition, promo_stream_id};

    fn envelope(version: i64, code: &str, event: &PromoEvent) -> EventEnvelope {
        EventEnvelope::encode(
            promo_stream_id(code),
            "PromoCode",
            event_store::Version::new(version),
            event.event_type(),
            event,
        )
        .unwrap()
    }

    fn created(code: &str) -> PromoEvent {
        let now = Utc::now();
        PromoCode::default()
            .create(PromoDefinition::new(
                code,
                DiscountRule::Flat {
                    amount: Money::from_minor(100),
                },
                now - Duration::hours(1),
                now + Duration::hours(1),
            ))
            .unwrap()
            .remove(0)
    }

    fn redeemed(code: &str, user_id: UserId) -> PromoEvent {
        PromoEvent::PromoCodeRedeemed(PromoCodeUsage {
            code: code.to_string(),
            user_id,
            order_id: AggregateId::new(),
            used_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_defined_code_starts_with_empty_ledger() {
        let view = PromoUsageView::new();
        view.apply(&envelope(1, "SAVE10", &created("save10")))
            .await
            .unwrap();

        assert_eq!(view.usages("save10").await, Some(vec![]));
        assert!(view.usages("OTHER").await.is_none());
    }

    #[tokio::test]
    async fn test_redemptions_are_appended_in_order() {
        let view = PromoUsageView::new();
        let alice = UserId::new();
        let bob = UserId::new();

        view.apply(&envelope(1, "SAVE10", &created("SAVE10")))
            .await
            .unwrap();
        view.apply(&envelope(2, "SAVE10", &redeemed("SAVE10", alice)))
            .await
            .unwrap();
        view.apply(&envelope(3, "SAVE10", &redeemed("SAVE10", bob)))
            .await
            .unwrap();

        let usages = view.usages("SAVE10").await.unwrap();
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].user_id, alice);
        assert_eq!(usages[1].user_id, bob);
        assert_eq!(view.usages_by_user(bob).await.len(), 1);
    }

    #[test]
    fn test_only_promo_events_are_handled() {
        let view = PromoUsageView::new();
        assert!(view.handles("PromoCode"));
        assert!(!view.handles("Order"));
    }

    #[tokio::test]
    async fn test_reset() {
        let view = PromoUsageView::new();
        view.apply(&envelope(1, "SAVE10", &created("SAVE10")))
            .await
            .unwrap();
        view.reset().await.unwrap();
        assert_eq!(view.usage_count("SAVE10").await, 0);
        assert!(view.usages("SAVE10").await.is_none());
    }
}
