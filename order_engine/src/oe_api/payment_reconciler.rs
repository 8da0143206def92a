use std::fmt::Debug;

use chrono::Utc;
use log::*;
use shop_common::Secret;

use crate::{
    db::traits::{OrderChange, OrderEngineDatabase, OrderEngineError, UpdateOutcome},
    db_types::{Operator, Order, OrderStatusType, Payment, PaymentState, PaymentStatus},
    events::{EventProducers, OrderStatusChangedEvent, StockChangedEvent},
    helpers::verify_signature,
    oe_api::payment_objects::{CallbackAck, CallbackPayload},
    retry::RetryPolicy,
    state_machine::plan_transition,
};

/// Applies asynchronous payment notifications from the gateway.
///
/// Gateways deliver notifications at least once, so the same callback can arrive several times, possibly at the same
/// moment on different workers. The payment's version makes reconciliation idempotent: whichever delivery settles the
/// payment first wins, and every later delivery finds the payment terminal and is acknowledged without touching
/// anything.
pub struct PaymentReconciler<B> {
    db: B,
    retry: RetryPolicy,
    secret: Secret<String>,
    signature_checks: bool,
    producers: EventProducers,
}

impl<B> Debug for PaymentReconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentReconciler (signature checks: {})", self.signature_checks)
    }
}

/// What a settlement changed, for the benefit of event subscribers.
struct Settlement {
    ack: CallbackAck,
    transition: Option<(Order, OrderStatusType)>,
    restock: Vec<(i64, i64)>,
}

impl Settlement {
    fn ack_only(ack: CallbackAck) -> UpdateOutcome<Self> {
        UpdateOutcome::Updated(Self { ack, transition: None, restock: Vec::new() })
    }
}

impl<B> PaymentReconciler<B> {
    pub fn new(db: B, retry: RetryPolicy, secret: Secret<String>, producers: EventProducers) -> Self {
        Self { db, retry, secret, signature_checks: true, producers }
    }

    /// Turns signature verification off. Only for tests and local development.
    pub fn without_signature_checks(mut self) -> Self {
        warn!("🚨️ Payment callback signature checks are disabled");
        self.signature_checks = false;
        self
    }
}

impl<B> PaymentReconciler<B>
where B: OrderEngineDatabase
{
    /// Verifies and applies one gateway notification.
    ///
    /// Returns an acknowledgement for anything that can safely be treated as handled, including duplicates and
    /// notifications for unknown trades. Returns `InvalidCallback`, without touching any state, if the signature does
    /// not match, the payload cannot be read, the status is not recognised, or the amount disagrees with the payment.
    pub async fn reconcile_callback(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackAck, OrderEngineError> {
        if self.signature_checks {
            let valid = signature.is_some_and(|sig| verify_signature(self.secret.reveal(), raw_payload, sig));
            if !valid {
                warn!("💳️ Rejected a payment callback with a missing or invalid signature");
                return Err(OrderEngineError::InvalidCallback("Signature verification failed".into()));
            }
        }
        let payload = CallbackPayload::parse(raw_payload).map_err(|e| {
            warn!("💳️ {e}");
            e
        })?;
        let status = payload.status().map_err(|e| {
            warn!("💳️ Callback for {}. {e}", payload.out_trade_no);
            e
        })?;
        let claimed_amount = payload.amount()?;
        let trade_no = payload.out_trade_no.as_str();
        let operation = format!("reconciliation of {trade_no}");
        let payload = &payload;
        let settlement = self
            .retry
            .run(&operation, move || async move {
                let Some(payment) = self.db.fetch_payment_by_trade_no(trade_no).await? else {
                    info!("💳️ Callback for unknown trade {trade_no}. Acknowledging without changes.");
                    let reason = "unknown trade number".to_string();
                    return Ok(Settlement::ack_only(CallbackAck::Ignored { trade_no: trade_no.into(), reason }));
                };
                if payment.status.is_terminal() {
                    debug!("💳️ Payment {trade_no} is already {}. Duplicate callback.", payment.status);
                    return Ok(Settlement::ack_only(CallbackAck::Duplicate { trade_no: trade_no.into() }));
                }
                let Some(state) = status.final_state() else {
                    let reason = format!("trade is still open ({})", payload.trade_status);
                    return Ok(Settlement::ack_only(CallbackAck::Ignored { trade_no: trade_no.into(), reason }));
                };
                if let Some(amount) = claimed_amount {
                    if amount != payment.amount {
                        warn!("💳️ Callback for {trade_no} claims {amount}, but the payment is for {}", payment.amount);
                        return Err(OrderEngineError::InvalidCallback(format!(
                            "Amount {amount} does not match the payment amount"
                        )));
                    }
                }
                self.settle(payment, state, payload).await
            })
            .await?;
        self.notify(&settlement);
        info!("💳️ Callback handled: {}", settlement.ack);
        Ok(settlement.ack)
    }

    /// Moves the payment to `state` and works out the matching order change, then writes both in one transaction.
    async fn settle(
        &self,
        payment: Payment,
        state: PaymentState,
        payload: &CallbackPayload,
    ) -> Result<UpdateOutcome<Settlement>, OrderEngineError> {
        let order = self
            .db
            .fetch_order_by_id(payment.order_id)
            .await?
            .ok_or_else(|| OrderEngineError::not_found::<Order>(payment.order_id))?;
        let mut candidate = payment.clone();
        candidate.status = state;
        candidate.third_party_transaction_id = payload.trade_no.clone().or(candidate.third_party_transaction_id);
        let change = match state {
            PaymentState::Success => {
                candidate.paid_at = Some(Utc::now());
                if order.status == OrderStatusType::Pending {
                    let reason = Some(format!("payment {} confirmed", payment.trade_no));
                    Some(plan_transition(&order, &[], OrderStatusType::Paid, &Operator::system(), reason)?)
                } else if already_settled(&order) {
                    info!(
                        "💳️ Payment {} confirmed for order {}, which was already marked paid. Settling the payment only.",
                        payment.trade_no, order.order_no
                    );
                    None
                } else {
                    error!(
                        "💳️ Payment {} succeeded, but order {} is already {}. The payment must be refunded manually.",
                        payment.trade_no, order.order_no, order.status
                    );
                    None
                }
            },
            PaymentState::Cancelled if order.status == OrderStatusType::Pending => {
                let items = self.db.fetch_order_items(order.id).await?;
                let reason = Some(format!("payment {} closed by the gateway", payment.trade_no));
                let mut change = plan_transition(&order, &items, OrderStatusType::Cancelled, &Operator::system(), reason)?;
                change.candidate.payment_status = PaymentStatus::Cancelled;
                Some(change)
            },
            PaymentState::Failed if order.status == OrderStatusType::Pending => {
                let mut failed = order.clone();
                failed.payment_status = PaymentStatus::Failed;
                Some(OrderChange { candidate: failed, expected_version: order.version, log: None, restock: Vec::new() })
            },
            _ => None,
        };
        let outcome = self.db.settle_payment(&candidate, payment.version, change.as_ref()).await?;
        let UpdateOutcome::Updated(settled) = outcome else {
            return Ok(UpdateOutcome::Conflict);
        };
        let ack = CallbackAck::Applied { trade_no: settled.trade_no.clone(), state: settled.status };
        let (transition, restock) = match change {
            Some(change) if change.log.is_some() => {
                let updated = self.db.fetch_order_by_id(order.id).await?.unwrap_or(change.candidate);
                let restock = change.restock.iter().map(|m| (m.product_id, m.quantity)).collect();
                (Some((updated, order.status)), restock)
            },
            _ => (None, Vec::new()),
        };
        Ok(UpdateOutcome::Updated(Settlement { ack, transition, restock }))
    }

    fn notify(&self, settlement: &Settlement) {
        if let Some((order, from)) = &settlement.transition {
            info!("🧾️ Order {} moved from {from} to {} by payment reconciliation", order.order_no, order.status);
            let event = OrderStatusChangedEvent::new(order.clone(), *from, Operator::system());
            self.producers.publish_status_changed(event);
        }
        for (product_id, quantity) in &settlement.restock {
            self.producers.publish_stock_changed(StockChangedEvent::new(*product_id, *quantity));
        }
    }
}

/// An order that was moved to `paid` by hand, and has not been cancelled or refunded since, is waiting on exactly
/// this confirmation.
fn already_settled(order: &Order) -> bool {
    order.payment_status == PaymentStatus::Paid
        && matches!(
            order.status,
            OrderStatusType::Paid | OrderStatusType::Shipped | OrderStatusType::Delivered | OrderStatusType::Completed
        )
}
