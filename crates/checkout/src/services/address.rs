//! Address book trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{AddressId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CheckoutError;

/// A shipping address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Lookup of saved shipping addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Returns the address only if it belongs to `user_id`.
    async fn get_address(
        &self,
        address_id: &AddressId,
        user_id: UserId,
    ) -> Result<Option<Address>, CheckoutError>;
}

#[async_trait]
impl<T: AddressBook + ?Sized> AddressBook for Arc<T> {
    async fn get_address(
        &self,
        address_id: &AddressId,
        user_id: UserId,
    ) -> Result<Option<Address>, CheckoutError> {
        (**self).get_address(address_id, user_id).await
    }
}

/// In-memory address book for development and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<RwLock<HashMap<AddressId, Address>>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, address: Address) {
        self.addresses
            .write()
            .await
            .insert(address.id.clone(), address);
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn get_address(
        &self,
        address_id: &AddressId,
        user_id: UserId,
    ) -> Result<Option<Address>, CheckoutError> {
        Ok(self
            .addresses
            .read()
            .await
            .get(address_id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }
}
