//! # Order engine public API
//!
//! The `oe_api` module exposes the programmatic API of the order engine. Each API object covers one area, so that
//! clients can pick the functionality they need.
//!
//! * [`stock_ledger`] adjusts product stock outside of checkout.
//! * [`cart_api`] edits carts: adding, merging, re-selecting and removing lines.
//! * [`order_flow_api`] is the primary API for the order lifecycle: checkout, status transitions, payment initiation
//!   and the expiry of unpaid orders.
//! * [`payment_reconciler`] applies the payment gateway's asynchronous notifications.
//!
//! # API usage
//!
//! Every API object is created by supplying a database backend that implements the storage traits it needs, plus
//! whatever else it depends on (a retry policy, a lock provider, event producers). Nothing is global.
//!
//! ```rust,ignore
//! use order_engine::{EngineConfig, OrderFlowApi, SqliteDatabase};
//! let config = EngineConfig::from_env_or_default();
//! let db = SqliteDatabase::new_with_url(&config.database_url, config.db_max_connections).await?;
//! let api = OrderFlowApi::from_config(db.clone(), db.key_lock(), EventProducers::default(), &config);
//! let order = api.create_order("alice", &[cart_item_id], shipping).await?;
//! ```
pub mod cart_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_objects;
pub mod payment_reconciler;
pub mod stock_ledger;
