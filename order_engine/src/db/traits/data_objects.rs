use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{NewStatusLog, Order};

/// The result of a conditional write.
///
/// `Conflict` means another writer got there first. It is the normal outcome under contention, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome<R> {
    Updated(R),
    Conflict,
}

impl<R> UpdateOutcome<R> {
    pub fn from_write(written: Option<R>) -> Self {
        match written {
            Some(r) => UpdateOutcome::Updated(r),
            None => UpdateOutcome::Conflict,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, UpdateOutcome::Conflict)
    }

    pub fn updated(self) -> Option<R> {
        match self {
            UpdateOutcome::Updated(r) => Some(r),
            UpdateOutcome::Conflict => None,
        }
    }

    pub fn map<T, F: FnOnce(R) -> T>(self, f: F) -> UpdateOutcome<T> {
        match self {
            UpdateOutcome::Updated(r) => UpdateOutcome::Updated(f(r)),
            UpdateOutcome::Conflict => UpdateOutcome::Conflict,
        }
    }
}

/// Stock to be returned to a product when an order is cancelled or refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: i64,
    pub quantity: i64,
}

/// A versioned write to an order, together with everything that must commit with it.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub candidate: Order,
    pub expected_version: i64,
    /// The audit row for a status transition. `None` for writes that do not change the status.
    pub log: Option<NewStatusLog>,
    pub restock: Vec<StockMovement>,
}

/// Opaque proof of lock ownership, handed out by `acquire` and presented on every later call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(pub String);

impl LockToken {
    pub fn random() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
