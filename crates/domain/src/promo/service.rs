//! Promo code administration and validation.

use chrono::Utc;
use event_store::EventStore;

use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::money::Money;
use crate::order::UserId;

use super::{PromoCode, PromoDefinition, PromoQuote, promo_stream_id};

/// Service for defining and checking promo codes.
///
/// Redemption is not exposed here: it only happens as part of placing an
/// order, through `OrderService::place_order`.
pub struct PromoService<S: EventStore> {
    handler: CommandHandler<S, PromoCode>,
}

impl<S: EventStore + Clone> Clone for PromoService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<S: EventStore> PromoService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Defines a new promo code.
    #[tracing::instrument(skip(self))]
    pub async fn create_code(&self, definition: PromoDefinition) -> Result<PromoCode, DomainError> {
        let id = promo_stream_id(&definition.code);
        let result = self
            .handler
            .execute(id, |promo| promo.create(definition))
            .await?;
        tracing::info!(code = result.aggregate.code(), "promo code created");
        Ok(result.aggregate)
    }

    /// Loads a promo code by its (unnormalized) code.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, code: &str) -> Result<Option<PromoCode>, DomainError> {
        self.handler.load_existing(promo_stream_id(code)).await
    }

    /// Checks a code against a subtotal without consuming a use.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: UserId,
        subtotal: Money,
    ) -> Result<PromoQuote, DomainError> {
        let promo = self.handler.load(promo_stream_id(code)).await?;
        Ok(promo.quote(code, user_id, subtotal, Utc::now())?)
    }
}
