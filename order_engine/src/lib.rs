//! Order Engine
//!
//! The order engine is the transactional core of an online shop: it takes orders, keeps stock honest, moves orders
//! through their lifecycle and reconciles payment notifications, all while many requests race against the same rows.
//!
//! Correctness under concurrency rests on three mechanisms:
//! 1. Optimistic concurrency control. Products, carts, orders and payments carry a version counter, and every write
//!    is conditioned on the version the writer read ([`VersionedRecordStore`]). Lost races are retried by a bounded
//!    [`RetryPolicy`].
//! 2. A distributed key lock ([`KeyLockProvider`]) serialises order creation per user.
//! 3. An explicit order state machine ([`state_machine`]) with an append-only audit trail.
//!
//! The library is divided into:
//! 1. Storage ([`mod@db`]). The traits that backends implement, and the SQLite backend. The data types stored are in
//!    [`db_types`].
//! 2. The public API ([`mod@oe_api`]): [`StockLedger`], [`CartApi`], [`OrderFlowApi`] and [`PaymentReconciler`].
//!
//! The engine also emits events (order created, order status changed, stock changed) that collaborators can
//! subscribe to with [`events::EventHooks`]. Publishing never blocks the operation that triggered it.
pub mod db;

pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod locks;
pub mod oe_api;
pub mod retry;
pub mod state_machine;

#[cfg(feature = "sqlite")]
pub mod test_utils;

pub use config::EngineConfig;
#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteKeyLock};
pub use db::traits::{
    CartManagement,
    CatalogManagement,
    ErrorKind,
    KeyLockProvider,
    LockToken,
    OrderChange,
    OrderEngineDatabase,
    OrderEngineError,
    OrderManagement,
    PaymentManagement,
    StockMovement,
    UpdateOutcome,
    VersionedRecordStore,
};
pub use locks::MemoryKeyLock;
pub use oe_api::{
    cart_api::CartApi,
    order_flow_api::OrderFlowApi,
    order_objects,
    payment_objects,
    payment_reconciler::PaymentReconciler,
    stock_ledger::StockLedger,
};
pub use retry::RetryPolicy;
