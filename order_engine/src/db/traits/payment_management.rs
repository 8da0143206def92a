use crate::{
    db::traits::{OrderChange, OrderEngineError, UpdateOutcome, VersionedRecordStore},
    db_types::{NewPayment, Payment},
};

#[allow(async_fn_in_trait)]
pub trait PaymentManagement: VersionedRecordStore<Payment> {
    /// Stores a new pending payment. If a payment with the same trade number exists already, that one is returned
    /// instead, so concurrent initiations converge on a single row.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, OrderEngineError>;

    async fn fetch_payment_by_trade_no(&self, trade_no: &str) -> Result<Option<Payment>, OrderEngineError>;

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, OrderEngineError>;

    /// Moves a payment to its final state and applies the resulting order change in the same storage transaction.
    ///
    /// The payment write is conditioned on `expected_version`, and so is the order write. If either loses a race,
    /// nothing is written and `Conflict` is returned.
    async fn settle_payment(
        &self,
        candidate: &Payment,
        expected_version: i64,
        order_change: Option<&OrderChange>,
    ) -> Result<UpdateOutcome<Payment>, OrderEngineError>;
}
