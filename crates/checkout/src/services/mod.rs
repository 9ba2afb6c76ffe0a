//! External collaborators of checkout: catalog, address book and payment gateway.

pub mod address;
pub mod catalog;
pub mod gateway;
pub mod http_gateway;

pub use address::{Address, AddressBook, InMemoryAddressBook};
pub use catalog::{Catalog, InMemoryCatalog};
pub use gateway::{InMemoryPaymentGateway, PaymentGateway, RemoteOrder, RemoteRefund};
pub use http_gateway::{HttpGatewayConfig, HttpPaymentGateway};
