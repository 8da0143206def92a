//! Request handler definitions
//!
//! Define each route and its handler here. Handlers stay thin: pull the request apart, call the engine, log, and
//! turn the result into a response. Anything more belongs in the engine.
//!
//! Every handler is async and every engine call awaits I/O, so a slow request never blocks the worker thread it runs
//! on. Never call blocking code from a handler.
//!
//! Callers are identified by the ids in the request. Authenticating them is the job of the gateway in front of this
//! server.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use order_engine::{
    db_types::{OrderNo, Operator},
    order_objects::CartSummary,
    payment_objects::CallbackAck,
    CartApi,
    KeyLockProvider,
    OrderEngineDatabase,
    OrderEngineError,
    OrderFlowApi,
    PaymentReconciler,
};

use crate::{
    data_objects::{
        AddCartItemRequest,
        CheckoutRequest,
        JsonResponse,
        OperatorQuery,
        PaymentRequest,
        StatusChangeRequest,
        TransitionsResponse,
        UpdateCartItemRequest,
    },
    errors::ServerError,
};

/// The header the payment gateway puts its HMAC signature in.
pub const GATEWAY_SIGNATURE_HEADER: &str = "X-Gateway-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl OrderEngineDatabase, KeyLockProvider);
/// Turns the selected cart lines into a pending order.
///
/// Stock for every line is deducted in the same transaction that creates the order. Fails with
/// * `409` if any line cannot be covered by the available stock. Nothing is deducted in that case.
/// * `429` if the same user already has a checkout in progress.
/// * `400` if the cart lines or shipping details are not valid.
pub async fn checkout<B: OrderEngineDatabase, L: KeyLockProvider>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let CheckoutRequest { user_id, cart_item_ids, shipping } = body.into_inner();
    debug!("💻️ Checkout request from {user_id} for cart lines {cart_item_ids:?}");
    let order = api.create_order(&user_id, &cart_item_ids, shipping).await.map_err(|e| {
        debug!("💻️ Could not create order for {user_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_no => Get "/orders/{order_no}" impl OrderEngineDatabase, KeyLockProvider);
pub async fn order_by_no<B: OrderEngineDatabase, L: KeyLockProvider>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    trace!("💻️ Fetching order {order_no}");
    let details = api.fetch_order(&order_no).await?;
    Ok(HttpResponse::Ok().json(details))
}

route!(order_history => Get "/orders/{order_no}/history" impl OrderEngineDatabase, KeyLockProvider);
/// The status changes the order has been through, oldest first.
pub async fn order_history<B: OrderEngineDatabase, L: KeyLockProvider>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    trace!("💻️ Fetching history for order {order_no}");
    let history = api.order_history(&order_no).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(order_transitions => Get "/orders/{order_no}/transitions" impl OrderEngineDatabase, KeyLockProvider);
/// The statuses the caller named in the query string could move the order to right now.
pub async fn order_transitions<B: OrderEngineDatabase, L: KeyLockProvider>(
    path: web::Path<String>,
    query: web::Query<OperatorQuery>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    let operator: Operator = query.into_inner().into();
    let details = api.fetch_order(&order_no).await?;
    let available = api.available_transitions(&order_no, &operator).await?;
    Ok(HttpResponse::Ok().json(TransitionsResponse {
        order_no: order_no.to_string(),
        status: details.order.status,
        available,
    }))
}

route!(change_order_status => Post "/orders/{order_no}/status" impl OrderEngineDatabase, KeyLockProvider);
/// Moves an order to a new status.
///
/// The move must be an edge of the order state machine, and the operator must be allowed to make it. Users may only
/// move their own orders. Cancelling or refunding an order returns its stock.
///
/// ## Returns
/// The updated order, or
/// * `409` if the order cannot move from its current status to the target.
/// * `403` if the operator may not make this move.
/// * `404` if there is no such order.
pub async fn change_order_status<B: OrderEngineDatabase, L: KeyLockProvider>(
    path: web::Path<String>,
    body: web::Json<StatusChangeRequest>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    let req = body.into_inner();
    let operator = req.operator();
    info!("💻️ {operator} asked to move order {order_no} to {}", req.target);
    let order = api.transition_order(&order_no, req.target, &operator, req.reason).await.map_err(|e| {
        debug!("💻️ Could not move order {order_no} to {}. {e}", req.target);
        e
    })?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(start_payment => Post "/orders/{order_no}/payments" impl OrderEngineDatabase, KeyLockProvider);
/// Starts paying for an order. Calling this again while a payment is in flight returns the same payment.
pub async fn start_payment<B: OrderEngineDatabase, L: KeyLockProvider>(
    path: web::Path<String>,
    body: web::Json<PaymentRequest>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    let PaymentRequest { user_id } = body.into_inner();
    debug!("💻️ {user_id} is paying for order {order_no}");
    let payment = api.initiate_payment(&order_no, &user_id).await.map_err(|e| {
        debug!("💻️ Could not start payment for order {order_no}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(order_payments => Get "/orders/{order_no}/payments" impl OrderEngineDatabase, KeyLockProvider);
pub async fn order_payments<B: OrderEngineDatabase, L: KeyLockProvider>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, L>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    let payments = api.payments_for_order(&order_no).await?;
    Ok(HttpResponse::Ok().json(payments))
}

route!(payment_callback => Post "/payments/callback" impl OrderEngineDatabase);
/// Asynchronous payment notifications from the gateway.
///
/// The body is handed to the reconciler byte for byte, since the signature in the `X-Gateway-Signature` header is
/// computed over the raw payload. The gateway keeps redelivering until it sees `success`, so anything the engine has
/// handled, including duplicates and trades it does not know about, is acknowledged that way. Untrusted callbacks get
/// a `400`. Storage trouble gets a `503` so that the gateway tries again later.
pub async fn payment_callback<B: OrderEngineDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentReconciler<B>>,
) -> Result<HttpResponse, ServerError> {
    let signature = req.headers().get(GATEWAY_SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    trace!("💻️ Payment callback received. {} bytes, signed: {}", body.len(), signature.is_some());
    match api.reconcile_callback(&body, signature).await {
        Ok(ack) => {
            info!("💻️ Payment callback acknowledged. {ack}");
            Ok(HttpResponse::Ok().content_type("text/plain").body(CallbackAck::BODY))
        },
        Err(e @ OrderEngineError::InvalidCallback(_)) => {
            warn!("💻️ Rejected payment callback from {:?}. {e}", req.peer_addr());
            Err(e.into())
        },
        Err(e) => {
            error!("💻️ Could not process payment callback. The gateway will retry. {e}");
            Err(e.into())
        },
    }
}

//----------------------------------------------   Carts  ----------------------------------------------------
route!(cart => Get "/carts/{user_id}" impl OrderEngineDatabase);
/// The user's cart with totals over the selected lines. An empty cart is created on first use.
pub async fn cart<B: OrderEngineDatabase>(
    path: web::Path<String>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let summary = api.cart_summary(&user_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(add_cart_item => Post "/carts/{user_id}/items" impl OrderEngineDatabase);
/// Adding a product that is already in the cart adds to that line's quantity.
pub async fn add_cart_item<B: OrderEngineDatabase>(
    path: web::Path<String>,
    body: web::Json<AddCartItemRequest>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let AddCartItemRequest { product_id, sku_id, quantity } = body.into_inner();
    debug!("💻️ {user_id} is adding {quantity} of product #{product_id} to their cart");
    let cart = api.add_item(&user_id, product_id, sku_id, quantity).await.map_err(|e| {
        debug!("💻️ Could not add product #{product_id} to the cart of {user_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(CartSummary::from(cart)))
}

route!(update_cart_item => Patch "/carts/{user_id}/items/{item_id}" impl OrderEngineDatabase);
pub async fn update_cart_item<B: OrderEngineDatabase>(
    path: web::Path<(String, i64)>,
    body: web::Json<UpdateCartItemRequest>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (user_id, item_id) = path.into_inner();
    let UpdateCartItemRequest { quantity, selected } = body.into_inner();
    if quantity.is_none() && selected.is_none() {
        return Err(ServerError::InvalidRequestBody("Nothing to update. Set quantity, selected, or both.".into()));
    }
    let mut cart = None;
    if let Some(quantity) = quantity {
        cart = Some(api.update_quantity(&user_id, item_id, quantity).await?);
    }
    if let Some(selected) = selected {
        cart = Some(api.set_selected(&user_id, item_id, selected).await?);
    }
    match cart {
        Some(cart) => Ok(HttpResponse::Ok().json(CartSummary::from(cart))),
        None => Err(ServerError::Unspecified("Cart update produced no cart".into())),
    }
}

route!(remove_cart_item => Delete "/carts/{user_id}/items/{item_id}" impl OrderEngineDatabase);
pub async fn remove_cart_item<B: OrderEngineDatabase>(
    path: web::Path<(String, i64)>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (user_id, item_id) = path.into_inner();
    debug!("💻️ {user_id} is removing line {item_id} from their cart");
    let cart = api.remove_item(&user_id, item_id).await?;
    Ok(HttpResponse::Ok().json(CartSummary::from(cart)))
}

route!(clear_cart => Delete "/carts/{user_id}" impl OrderEngineDatabase);
pub async fn clear_cart<B: OrderEngineDatabase>(
    path: web::Path<String>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    api.clear(&user_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Cart for {user_id} cleared"))))
}
