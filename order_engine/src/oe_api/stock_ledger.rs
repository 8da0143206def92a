use std::fmt::Debug;

use log::*;

use crate::{
    db::traits::{CatalogManagement, OrderEngineError},
    db_types::Product,
    events::{EventProducers, StockChangedEvent},
    retry::RetryPolicy,
};

/// Stock movements on single products, each one a retried versioned update.
///
/// Checkout and cancellation do not go through here: they move stock inside the same storage transaction as the
/// order write. `StockLedger` is for everything else that adjusts stock, such as manual corrections and returns.
pub struct StockLedger<B> {
    db: B,
    retry: RetryPolicy,
    producers: EventProducers,
}

impl<B> Debug for StockLedger<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StockLedger ({:?})", self.retry)
    }
}

impl<B> StockLedger<B> {
    pub fn new(db: B, retry: RetryPolicy, producers: EventProducers) -> Self {
        Self { db, retry, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> StockLedger<B>
where B: CatalogManagement
{
    /// Sells `quantity` units of the product.
    ///
    /// Fails with `InsufficientStock` as soon as the freshest read shows too little stock. That check is a business
    /// decision and is never retried. Lost races are retried, and only surface as `ConcurrencyExhausted` once the
    /// retry budget is spent.
    pub async fn deduct(&self, product_id: i64, quantity: i64) -> Result<Product, OrderEngineError> {
        let product = self.retry.update_record(&self.db, product_id, |p: &Product| p.deducted(quantity)).await?;
        debug!("📦️ Deducted {quantity} from product #{product_id}. {} left", product.stock);
        self.producers.publish_stock_changed(StockChangedEvent::new(product_id, -quantity));
        Ok(product)
    }

    /// Returns `quantity` units to stock.
    pub async fn restore(&self, product_id: i64, quantity: i64) -> Result<Product, OrderEngineError> {
        let product = self.retry.update_record(&self.db, product_id, |p: &Product| p.restored(quantity)).await?;
        debug!("📦️ Restored {quantity} to product #{product_id}. {} in stock", product.stock);
        self.producers.publish_stock_changed(StockChangedEvent::new(product_id, quantity));
        Ok(product)
    }

    pub async fn product(&self, product_id: i64) -> Result<Product, OrderEngineError> {
        self.db.fetch_product(product_id).await?.ok_or_else(|| OrderEngineError::not_found::<Product>(product_id))
    }
}
