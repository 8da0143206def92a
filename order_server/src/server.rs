use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::FutureExt;
use log::*;
use order_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    CartApi,
    OrderFlowApi,
    PaymentReconciler,
    SqliteDatabase,
    SqliteKeyLock,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{
        health,
        AddCartItemRoute,
        CartRoute,
        ChangeOrderStatusRoute,
        CheckoutRoute,
        ClearCartRoute,
        OrderByNoRoute,
        OrderHistoryRoute,
        OrderPaymentsRoute,
        OrderTransitionsRoute,
        PaymentCallbackRoute,
        RemoveCartItemRoute,
        StartPaymentRoute,
        UpdateCartItemRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.engine.database_url, config.engine.db_max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(config.engine.event_buffer_size, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _expiry = start_expiry_worker(
        db.clone(),
        producers.clone(),
        config.engine.unpaid_order_timeout,
        config.expiry_interval,
    );
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let engine = config.engine.clone();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::from_config(db.clone(), db.key_lock(), producers.clone(), &engine);
        let carts_api = CartApi::new(db.clone(), engine.retry);
        let mut reconciler =
            PaymentReconciler::new(db.clone(), engine.retry, engine.gateway_secret.clone(), producers.clone());
        if !engine.gateway_signature_checks {
            reconciler = reconciler.without_signature_checks();
        }
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("order_server::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(carts_api))
            .app_data(web::Data::new(reconciler))
            .configure(register_routes)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route against the SQLite backend. The API objects must already be in the app data.
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(CheckoutRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(OrderByNoRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(OrderHistoryRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(OrderTransitionsRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(ChangeOrderStatusRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(StartPaymentRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(OrderPaymentsRoute::<SqliteDatabase, SqliteKeyLock>::new())
        .service(PaymentCallbackRoute::<SqliteDatabase>::new())
        .service(CartRoute::<SqliteDatabase>::new())
        .service(ClearCartRoute::<SqliteDatabase>::new())
        .service(AddCartItemRoute::<SqliteDatabase>::new())
        .service(UpdateCartItemRoute::<SqliteDatabase>::new())
        .service(RemoveCartItemRoute::<SqliteDatabase>::new());
}

/// Out of the box, the server's only subscriber to engine events is the log.
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_created(|ev| {
            info!("📬️ Order {} placed by {} for {}", ev.order.order_no, ev.order.user_id, ev.order.total_amount);
            async {}.boxed()
        })
        .on_status_changed(|ev| {
            info!("📬️ Order {} moved from {} to {} by {}", ev.order.order_no, ev.from, ev.to, ev.operator);
            async {}.boxed()
        })
        .on_stock_changed(|ev| {
            debug!("📬️ Stock for product #{} moved by {}", ev.product_id, ev.delta);
            async {}.boxed()
        });
    hooks
}
