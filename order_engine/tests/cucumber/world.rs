use std::collections::HashMap;

use cucumber::World;
use log::*;
use order_engine::{
    db_types::{Order, Payment, Product},
    payment_objects::CallbackAck,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    CartApi,
    OrderEngineError,
    OrderFlowApi,
    PaymentReconciler,
    RetryPolicy,
    SqliteDatabase,
    SqliteKeyLock,
    StockLedger,
};
use shop_common::Secret;
use tokio::time::sleep;

pub const GATEWAY_SECRET: &str = "cucumber-gateway-secret";

#[derive(Default, Debug, World)]
pub struct OrderWorld {
    pub system: Option<OrderEngineSystem>,
}

#[derive(Debug)]
pub struct OrderEngineSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub ledger: StockLedger<SqliteDatabase>,
    pub carts: CartApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase, SqliteKeyLock>,
    pub reconciler: PaymentReconciler<SqliteDatabase>,
    pub products: HashMap<String, Product>,
    pub last_order: Option<Order>,
    pub last_payment: Option<Payment>,
    pub last_ack: Option<CallbackAck>,
    pub last_error: Option<OrderEngineError>,
}

impl OrderWorld {
    pub fn system(&mut self) -> &mut OrderEngineSystem {
        self.system.as_mut().expect("Order engine not initialised. Start the scenario with 'Given a fresh install'")
    }
}

impl OrderEngineSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 4).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let retry = RetryPolicy::default().with_max_attempts(32);
        let producers = Default::default();
        Self {
            db_path: url,
            ledger: StockLedger::new(db.clone(), retry, Default::default()),
            carts: CartApi::new(db.clone(), retry),
            orders: OrderFlowApi::new(db.clone(), db.key_lock(), Default::default()).with_retry_policy(retry),
            reconciler: PaymentReconciler::new(db.clone(), retry, Secret::new(GATEWAY_SECRET.into()), producers),
            db,
            products: HashMap::new(),
            last_order: None,
            last_payment: None,
            last_ack: None,
            last_error: None,
        }
    }

    pub fn product(&self, name: &str) -> &Product {
        self.products.get(name).unwrap_or_else(|| panic!("No product called {name} in this scenario"))
    }

    pub fn last_order(&self) -> &Order {
        self.last_order.as_ref().expect("No order has been placed in this scenario")
    }

    pub fn last_payment(&self) -> &Payment {
        self.last_payment.as_ref().expect("No payment has been started in this scenario")
    }

    /// Records the outcome of a step that is allowed to fail, so a later step can check how it failed.
    pub fn record<T>(&mut self, result: Result<T, OrderEngineError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            },
            Err(e) => {
                info!("🥒️ Step failed as recorded: {e}");
                self.last_error = Some(e);
                None
            },
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await.expect("Error creating database");
    run_migrations(&path).await.expect("Error running migrations");
    path
}
