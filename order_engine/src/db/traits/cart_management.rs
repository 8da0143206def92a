use crate::{
    db::traits::{OrderEngineError, VersionedRecordStore},
    db_types::Cart,
};

/// Carts, with their lines. A versioned write of a [`Cart`] replaces its entire item set: lines that are missing
/// from the candidate are deleted, lines with id `0` are inserted, and changed lines are updated.
#[allow(async_fn_in_trait)]
pub trait CartManagement: VersionedRecordStore<Cart> {
    /// Returns the user's cart, creating an empty one on first use. Safe to call concurrently.
    async fn fetch_or_create_cart(&self, user_id: &str) -> Result<Cart, OrderEngineError>;

    async fn fetch_cart_for_user(&self, user_id: &str) -> Result<Option<Cart>, OrderEngineError>;
}
