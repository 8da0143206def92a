use crate::{
    db::traits::{OrderEngineError, VersionedRecordStore},
    db_types::{NewProduct, Product},
};

/// Product rows as seen by the engine. Stock only changes through the versioned store.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement: VersionedRecordStore<Product> {
    /// Adds a product to the catalog. Catalog management proper lives elsewhere; this exists to seed data.
    async fn insert_product(&self, product: NewProduct) -> Result<Product, OrderEngineError>;

    async fn fetch_product(&self, id: i64) -> Result<Option<Product>, OrderEngineError> {
        self.fetch_record(id).await
    }
}
