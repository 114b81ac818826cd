use super::aggregator::OrderTotals;
use crate::domain::order::Order;
use crate::domain::ports::{Reservation, SharedLedgerStore};
use crate::domain::transaction::Transaction;
use crate::error::{ChargeError, Result};
use chrono::{Duration, Utc};

/// Hands out at most one live charge reservation per order.
///
/// The reservation is written before any outbound call so that a crash in
/// the middle of a charge leaves an `opened` transaction to reconcile.
pub struct IdempotencyGuard {
    ledger: SharedLedgerStore,
    stale_after: Duration,
}

impl IdempotencyGuard {
    pub fn new(ledger: SharedLedgerStore, stale_after: Duration) -> Self {
        Self {
            ledger,
            stale_after,
        }
    }

    /// Opens a transaction for `totals.total` against `order`.
    ///
    /// Fails with [`ChargeError::AlreadyCharged`] when the order already has a
    /// passed transaction or a fresh opened one. The returned transaction id is
    /// the idempotency key for the provider.
    pub async fn reserve(&self, order: &Order, totals: &OrderTotals) -> Result<Transaction> {
        let candidate = Transaction::open(
            order.id.clone(),
            order.version,
            totals.total,
            totals.currency.clone(),
        );

        match self
            .ledger
            .reserve(candidate, Utc::now(), self.stale_after)
            .await?
        {
            Reservation::Reserved {
                transaction,
                abandoned,
            } => {
                for stale in &abandoned {
                    tracing::warn!(
                        order = %order.id,
                        transaction = %stale.id,
                        "Abandoned stale reservation"
                    );
                }
                tracing::info!(
                    order = %order.id,
                    transaction = %transaction.id,
                    amount = transaction.amount.minor_units(),
                    "Reserved charge"
                );
                Ok(transaction)
            }
            Reservation::Existing(existing) => {
                tracing::info!(
                    order = %order.id,
                    transaction = %existing.id,
                    status = %existing.status,
                    "Order already has a live transaction"
                );
                Err(ChargeError::AlreadyCharged {
                    order: order.id.clone(),
                    transaction: existing.id,
                    status: existing.status,
                    remote_id: existing.remote_id,
                })
            }
        }
    }
}
