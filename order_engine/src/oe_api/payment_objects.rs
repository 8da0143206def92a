use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    db::traits::OrderEngineError,
    db_types::{Money, PaymentState},
};

/// The body of an asynchronous payment notification, as posted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// The merchant trade number the payment was initiated with.
    pub out_trade_no: String,
    /// The gateway's own transaction id.
    #[serde(default)]
    pub trade_no: Option<String>,
    pub trade_status: String,
    /// Decimal string, e.g. `"12.50"`.
    #[serde(default)]
    pub total_amount: Option<String>,
}

impl CallbackPayload {
    pub fn parse(raw: &[u8]) -> Result<Self, OrderEngineError> {
        serde_json::from_slice(raw)
            .map_err(|e| OrderEngineError::InvalidCallback(format!("Callback payload could not be read. {e}")))
    }

    pub fn status(&self) -> Result<GatewayTradeStatus, OrderEngineError> {
        self.trade_status.parse()
    }

    /// The amount the gateway says was paid, if it sent one.
    pub fn amount(&self) -> Result<Option<Money>, OrderEngineError> {
        self.total_amount
            .as_deref()
            .map(|s| s.parse::<Money>().map_err(|e| OrderEngineError::InvalidCallback(e.to_string())))
            .transpose()
    }
}

/// The gateway's trade status vocabulary, collapsed onto what the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayTradeStatus {
    Success,
    Cancelled,
    Failed,
    /// The trade is still open, e.g. waiting for the buyer. Nothing to do yet.
    Open,
}

impl FromStr for GatewayTradeStatus {
    type Err = OrderEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRADE_SUCCESS" | "TRADE_FINISHED" | "SUCCESS" => Ok(Self::Success),
            "TRADE_CLOSED" | "CLOSED" | "REVOKED" => Ok(Self::Cancelled),
            "PAYERROR" | "TRADE_FAILED" => Ok(Self::Failed),
            "WAIT_BUYER_PAY" | "USERPAYING" | "NOTPAY" => Ok(Self::Open),
            other => Err(OrderEngineError::InvalidCallback(format!("Unknown trade status '{other}'"))),
        }
    }
}

impl GatewayTradeStatus {
    /// The terminal payment state this status settles to, or `None` if the trade is still open.
    pub fn final_state(&self) -> Option<PaymentState> {
        match self {
            Self::Success => Some(PaymentState::Success),
            Self::Cancelled => Some(PaymentState::Cancelled),
            Self::Failed => Some(PaymentState::Failed),
            Self::Open => None,
        }
    }
}

/// What the reconciler did with a callback. Every variant is acknowledged to the gateway with [`CallbackAck::BODY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallbackAck {
    /// The payment moved to `state`.
    Applied { trade_no: String, state: PaymentState },
    /// The payment had already been settled. Nothing changed.
    Duplicate { trade_no: String },
    /// Nothing to do, e.g. the trade number is unknown or the trade is still open.
    Ignored { trade_no: String, reason: String },
}

impl CallbackAck {
    /// The response body the gateway expects for a handled notification.
    pub const BODY: &'static str = "success";

    pub fn trade_no(&self) -> &str {
        match self {
            Self::Applied { trade_no, .. } | Self::Duplicate { trade_no } | Self::Ignored { trade_no, .. } => trade_no,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl Display for CallbackAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied { trade_no, state } => write!(f, "{trade_no} settled as {state}"),
            Self::Duplicate { trade_no } => write!(f, "{trade_no} was already settled"),
            Self::Ignored { trade_no, reason } => write!(f, "{trade_no} ignored: {reason}"),
        }
    }
}
