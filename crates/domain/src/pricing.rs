//! Pricing engine.
//!
//! [`price`] is the only place order totals are computed. Everything that
//! stores or displays a total takes it from a [`PriceBreakdown`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::order::{OrderItem, ProductId};

/// Shipping charged on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    /// Orders with a subtotal strictly above this ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
}

/// Inputs to the pricing engine other than the cart itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub shipping: ShippingPolicy,
    /// Tax on the discounted subtotal, in basis points.
    pub tax_rate_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping: ShippingPolicy {
                free_shipping_threshold: Money::from_minor(50_000),
                flat_shipping_fee: Money::from_minor(4_000),
            },
            tax_rate_bps: 0,
        }
    }
}

/// Computed totals for a cart.
///
/// Always satisfies `total == subtotal + shipping + tax - discount` with
/// `0 <= discount <= subtotal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

impl PriceBreakdown {
    /// Re-checks the totals identity, used when loading foreign data.
    pub fn is_consistent(&self) -> bool {
        !self.discount.is_negative()
            && self.discount <= self.subtotal
            && !self.total.is_negative()
            && self.subtotal + self.shipping + self.tax - self.discount == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Invalid cart: quantity for {product_id} must be at least 1")]
    ZeroQuantity { product_id: ProductId },

    #[error("Invalid cart: price for {product_id} is negative ({price})")]
    NegativePrice { product_id: ProductId, price: Money },

    #[error("Invalid cart: amounts overflow")]
    Overflow,
}

/// Prices `items` under `policy`, applying a discount already computed by the
/// promo validator.
///
/// The discount is clamped to the subtotal so the total can never go
/// negative. Tax applies to the discounted subtotal; shipping is fixed before
/// the discount is taken.
pub fn price(
    items: &[OrderItem],
    policy: &PricingPolicy,
    discount: Money,
) -> Result<PriceBreakdown, PricingError> {
    let mut subtotal = Money::zero();
    for item in items {
        if item.quantity == 0 {
            return Err(PricingError::ZeroQuantity {
                product_id: item.product_id.clone(),
            });
        }
        if item.unit_price.is_negative() {
            return Err(PricingError::NegativePrice {
                product_id: item.product_id.clone(),
                price: item.unit_price,
            });
        }
        let line = item.line_total().ok_or(PricingError::Overflow)?;
        subtotal = subtotal.checked_add(line).ok_or(PricingError::Overflow)?;
    }

    let shipping = if subtotal > policy.shipping.free_shipping_threshold {
        Money::zero()
    } else {
        policy.shipping.flat_shipping_fee
    };

    let discount = discount.clamp_to(subtotal);
    let taxable = subtotal - discount;
    let tax = taxable.basis_points(policy.tax_rate_bps);

    let total = taxable
        .checked_add(shipping)
        .and_then(|t| t.checked_add(tax))
        .ok_or(PricingError::Overflow)?;

    Ok(PriceBreakdown {
        subtotal,
        shipping,
        tax,
        discount,
        total,
    })
}
