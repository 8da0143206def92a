use thiserror::Error;

use crate::db_types::{OrderNo, OrderStatusType};

/// Broad classes of failure. Callers use these to decide whether to retry, and HTTP layers to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A business rule said no. Retrying will not help.
    Business,
    /// Concurrent writers kept winning the race, even after retrying.
    Contention,
    /// A dependency (lock service, database) is busy or unavailable. The caller may try again shortly.
    Unavailable,
    /// Input from outside the system could not be trusted or understood.
    MalformedInput,
    /// Something is wrong with the engine itself.
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum OrderEngineError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested {entity} (id {id}) does not exist")]
    RecordNotFound { entity: &'static str, id: i64 },
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("There is no payment with trade number {0}")]
    PaymentNotFound(String),
    #[error("Insufficient stock for product {product_id}. Requested {requested}, but only {available} available")]
    InsufficientStock { product_id: i64, requested: i64, available: i64 },
    #[error("Product {0} is not on sale")]
    ProductUnavailable(i64),
    #[error("Cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Forbidden. {0}")]
    Forbidden(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("Gave up on {operation} after {attempts} attempts because of concurrent updates")]
    ConcurrencyExhausted { operation: String, attempts: u32 },
    #[error("The lock for {0} is held by someone else")]
    LockBusy(String),
    #[error("The lock for {0} expired before the operation completed")]
    LockLost(String),
    #[error("Too many requests. {0}")]
    TooManyRequests(String),
    #[error("Rejected payment callback. {0}")]
    InvalidCallback(String),
    #[error("Order number {0} is already taken")]
    DuplicateOrderNo(OrderNo),
}

impl OrderEngineError {
    pub fn kind(&self) -> ErrorKind {
        use OrderEngineError::*;
        match self {
            RecordNotFound { .. }
            | OrderNotFound(_)
            | PaymentNotFound(_)
            | InsufficientStock { .. }
            | ProductUnavailable(_)
            | InvalidTransition { .. }
            | Forbidden(_)
            | ValidationError(_) => ErrorKind::Business,
            ConcurrencyExhausted { .. } => ErrorKind::Contention,
            DatabaseError(_) | LockBusy(_) | LockLost(_) | TooManyRequests(_) => ErrorKind::Unavailable,
            InvalidCallback(_) => ErrorKind::MalformedInput,
            DuplicateOrderNo(_) => ErrorKind::Internal,
        }
    }

    /// True if the same request may succeed when the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Contention | ErrorKind::Unavailable)
    }

    pub fn not_found<R: crate::db_types::Versioned>(id: i64) -> Self {
        OrderEngineError::RecordNotFound { entity: R::ENTITY, id }
    }
}

impl From<sqlx::Error> for OrderEngineError {
    fn from(e: sqlx::Error) -> Self {
        OrderEngineError::DatabaseError(e.to_string())
    }
}
