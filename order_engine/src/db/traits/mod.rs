//! # Storage contracts for the order engine.
//!
//! This module defines the interfaces that order engine *backends* implement. The engine never issues
//! unconditioned writes against shared records: products, carts, orders and payments all carry a version counter, and
//! every mutation goes through [`VersionedRecordStore`].
//!
//! * [`VersionedRecordStore`] is the generic conditional-write primitive.
//! * [`CatalogManagement`] exposes product stock.
//! * [`CartManagement`] stores carts and their lines.
//! * [`OrderManagement`] stores orders, their item snapshots and the status audit trail.
//! * [`PaymentManagement`] stores payment attempts and settles them together with the order.
//! * [`KeyLockProvider`] is the distributed lock used to serialise checkout per user.
//! * [`OrderEngineDatabase`] ties the record stores together.
mod cart_management;
mod catalog_management;
mod data_objects;
mod errors;
mod key_lock;
mod order_management;
mod payment_management;
mod versioned_store;

pub use cart_management::CartManagement;
pub use catalog_management::CatalogManagement;
pub use data_objects::{LockToken, OrderChange, StockMovement, UpdateOutcome};
pub use errors::{ErrorKind, OrderEngineError};
pub use key_lock::KeyLockProvider;
pub use order_management::OrderManagement;
pub use payment_management::PaymentManagement;
pub use versioned_store::VersionedRecordStore;

/// The highest level of behaviour for backends supporting the order engine.
#[allow(async_fn_in_trait)]
pub trait OrderEngineDatabase: Clone + CatalogManagement + CartManagement + OrderManagement + PaymentManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderEngineError> {
        Ok(())
    }
}
