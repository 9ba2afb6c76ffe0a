//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, ProductId};
use tokio::sync::RwLock;

use crate::error::CheckoutError;

/// Prices and stock for the products a cart can contain.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Current unit price of a product.
    async fn current_price(&self, product_id: &ProductId) -> Result<Money, CheckoutError>;

    /// Takes `quantity` units out of stock.
    async fn reserve_stock(&self, product_id: &ProductId, quantity: u32)
    -> Result<(), CheckoutError>;

    /// Puts previously reserved units back.
    async fn release_stock(&self, product_id: &ProductId, quantity: u32)
    -> Result<(), CheckoutError>;
}

#[async_trait]
impl<T: Catalog + ?Sized> Catalog for Arc<T> {
    async fn current_price(&self, product_id: &ProductId) -> Result<Money, CheckoutError> {
        (**self).current_price(product_id).await
    }

    async fn reserve_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CheckoutError> {
        (**self).reserve_stock(product_id, quantity).await
    }

    async fn release_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CheckoutError> {
        (**self).release_stock(product_id, quantity).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Product {
    price: Money,
    stock: u32,
}

/// In-memory catalog for development and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn upsert(&self, product_id: impl Into<ProductId>, price: Money, stock: u32) {
        self.products
            .write()
            .await
            .insert(product_id.into(), Product { price, stock });
    }

    /// Changes the price of an existing product.
    pub async fn set_price(&self, product_id: &ProductId, price: Money) {
        if let Some(product) = self.products.write().await.get_mut(product_id) {
            product.price = price;
        }
    }

    /// Units currently in stock, or None for an unknown product.
    pub async fn stock(&self, product_id: &ProductId) -> Option<u32> {
        self.products.read().await.get(product_id).map(|p| p.stock)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn current_price(&self, product_id: &ProductId) -> Result<Money, CheckoutError> {
        self.products
            .read()
            .await
            .get(product_id)
            .map(|p| p.price)
            .ok_or_else(|| CheckoutError::ProductNotFound(product_id.clone()))
    }

    async fn reserve_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CheckoutError> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CheckoutError::ProductNotFound(product_id.clone()))?;

        if product.stock < quantity {
            return Err(CheckoutError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: product.stock,
            });
        }
        product.stock -= quantity;
        Ok(())
    }

    async fn release_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CheckoutError> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CheckoutError::ProductNotFound(product_id.clone()))?;
        product.stock = product.stock.saturating_add(quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_and_release() {
        let catalog = InMemoryCatalog::new();
        let sku = ProductId::new("TEE");
        catalog.upsert("TEE", Money::from_minor(500), 3).await;

        catalog.reserve_stock(&sku, 2).await.unwrap();
        assert_eq!(catalog.stock(&sku).await, Some(1));

        catalog.release_stock(&sku, 2).await.unwrap();
        assert_eq!(catalog.stock(&sku).await, Some(3));
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_stock_untouched() {
        let catalog = InMemoryCatalog::new();
        let sku = ProductId::new("TEE");
        catalog.upsert("TEE", Money::from_minor(500), 1).await;

        let result = catalog.reserve_stock(&sku, 2).await;
        assert!(matches!(
            result,
            Err(CheckoutError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            })
        ));
        assert_eq!(catalog.stock(&sku).await, Some(1));
    }

    #[tokio::test]
    async fn unknown_product() {
        let catalog = InMemoryCatalog::new();
        assert!(matches!(
            catalog.current_price(&ProductId::new("GHOST")).await,
            Err(CheckoutError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn price_changes_are_visible() {
        let catalog = InMemoryCatalog::new();
        let sku = ProductId::new("CAP");
        catalog.upsert("CAP", Money::from_minor(300), 10).await;
        catalog.set_price(&sku, Money::from_minor(350)).await;
        assert_eq!(catalog.current_price(&sku).await.unwrap(), Money::from_minor(350));
    }
}
