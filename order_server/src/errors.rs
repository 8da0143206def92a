use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use order_engine::{ErrorKind, OrderEngineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("{0}")]
    EngineError(#[from] OrderEngineError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::EngineError(e) => engine_status_code(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn engine_status_code(e: &OrderEngineError) -> StatusCode {
    use OrderEngineError::*;
    match e {
        RecordNotFound { .. } | OrderNotFound(_) | PaymentNotFound(_) => StatusCode::NOT_FOUND,
        InsufficientStock { .. } | InvalidTransition { .. } => StatusCode::CONFLICT,
        ProductUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Forbidden(_) => StatusCode::FORBIDDEN,
        ValidationError(_) => StatusCode::BAD_REQUEST,
        TooManyRequests(_) | LockBusy(_) => StatusCode::TOO_MANY_REQUESTS,
        InvalidCallback(_) => StatusCode::BAD_REQUEST,
        _ => match e.kind() {
            ErrorKind::Contention | ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Business | ErrorKind::MalformedInput => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

#[cfg(test)]
mod test {
    use order_engine::db_types::{OrderNo, OrderStatusType};

    use super::*;

    fn status(e: OrderEngineError) -> StatusCode {
        ServerError::from(e).status_code()
    }

    #[test]
    fn business_errors_are_client_errors() {
        assert_eq!(status(OrderEngineError::OrderNotFound(OrderNo::from("nope"))), StatusCode::NOT_FOUND);
        assert_eq!(
            status(OrderEngineError::InsufficientStock { product_id: 1, requested: 3, available: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(OrderEngineError::InvalidTransition { from: OrderStatusType::Paid, to: OrderStatusType::Pending }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(OrderEngineError::Forbidden("not yours".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(OrderEngineError::ValidationError("qty".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailability_is_retryable_by_the_client() {
        assert_eq!(status(OrderEngineError::TooManyRequests("checkout".into())), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status(OrderEngineError::LockLost("k".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(OrderEngineError::ConcurrencyExhausted { operation: "deduct".into(), attempts: 5 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(OrderEngineError::DatabaseError("gone".into())), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_errors() {
        assert_eq!(
            status(OrderEngineError::DuplicateOrderNo(OrderNo::from("x"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status(OrderEngineError::InvalidCallback("sig".into())), StatusCode::BAD_REQUEST);
    }
}
