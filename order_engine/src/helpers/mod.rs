mod order_no;
mod signature;

pub use order_no::{OrderNoGenerator, ORDER_NO_LENGTH};
pub use signature::{calculate_hmac, verify_signature};
