//! # Order server
//! The HTTP front end of the order engine. It is responsible for:
//! * Turning shopping carts into orders at checkout.
//! * Moving orders through their lifecycle on behalf of users and admins.
//! * Accepting asynchronous payment notifications from the payment gateway.
//! * Cancelling orders that go unpaid for too long (see [`expiry_worker`]).
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/checkout`: Places an order for some of the lines in a user's cart.
//! * `/orders/{order_no}`, with `/history`, `/transitions`, `/status` and `/payments` below it.
//! * `/payments/callback`: The payment gateway's notification endpoint.
//! * `/carts/{user_id}` and `/carts/{user_id}/items`.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
