use crate::domain::money::{Currency, Money};
use crate::domain::ports::SharedLedgerStore;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{ChargeError, Result};
use uuid::Uuid;

/// The final word on a charge, from the provider response, a webhook or
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed {
        remote_id: String,
        amount: Money,
        currency: Currency,
    },
    Failed {
        reason: String,
        remote_id: Option<String>,
    },
}

impl Outcome {
    fn status(&self) -> TransactionStatus {
        match self {
            Outcome::Passed { .. } => TransactionStatus::Passed,
            Outcome::Failed { .. } => TransactionStatus::Failed,
        }
    }

    /// Whether `tx` already reflects this outcome, e.g. on webhook redelivery.
    fn already_applied(&self, tx: &Transaction) -> bool {
        match self {
            Outcome::Passed { remote_id, .. } => {
                tx.status == TransactionStatus::Passed
                    && tx.remote_id.as_deref() == Some(remote_id.as_str())
            }
            Outcome::Failed { .. } => tx.status == TransactionStatus::Failed,
        }
    }
}

/// Moves opened transactions to their terminal state.
pub struct TransactionRecorder {
    ledger: SharedLedgerStore,
}

impl TransactionRecorder {
    pub fn new(ledger: SharedLedgerStore) -> Self {
        Self { ledger }
    }

    /// Records `outcome` for the transaction.
    ///
    /// A passed outcome whose amount or currency differs from the reservation
    /// is recorded as failed and reported as [`ChargeError::AmountMismatch`].
    /// A passed outcome for a transaction that already failed for another
    /// reason is reported as [`ChargeError::LateConfirmation`].
    pub async fn finalize(&self, transaction_id: Uuid, outcome: Outcome) -> Result<Transaction> {
        let mut tx = self
            .ledger
            .transaction(transaction_id)
            .await?
            .ok_or(ChargeError::TransactionNotFound(transaction_id))?;

        if !tx.is_opened() {
            return self.accept_duplicate(tx, &outcome);
        }

        match &outcome {
            Outcome::Passed {
                remote_id,
                amount,
                currency,
            } if *amount != tx.amount || *currency != tx.currency => {
                tracing::error!(
                    transaction = %tx.id,
                    order = %tx.order_id,
                    expected = tx.amount.minor_units(),
                    expected_currency = %tx.currency,
                    actual = amount.minor_units(),
                    actual_currency = %currency,
                    "Provider confirmed a different amount"
                );
                let reason = format!(
                    "amount mismatch: confirmed {} {} but reserved {} {}",
                    amount, currency, tx.amount, tx.currency
                );
                tx.fail(&reason, Some(remote_id.as_str()))?;
                self.settle(tx.clone(), &outcome).await?;
                return Err(ChargeError::AmountMismatch {
                    transaction: tx.id,
                    expected: tx.amount,
                    expected_currency: tx.currency.clone(),
                    actual: *amount,
                    actual_currency: currency.clone(),
                });
            }
            Outcome::Passed { remote_id, .. } => tx.pass(remote_id)?,
            Outcome::Failed { reason, remote_id } => tx.fail(reason, remote_id.as_deref())?,
        }

        let tx = self.settle(tx, &outcome).await?;
        tracing::info!(
            transaction = %tx.id,
            order = %tx.order_id,
            status = %tx.status,
            remote_id = tx.remote_id.as_deref().unwrap_or(""),
            "Finalized transaction"
        );
        Ok(tx)
    }

    async fn settle(&self, tx: Transaction, outcome: &Outcome) -> Result<Transaction> {
        match self.ledger.settle(tx.clone()).await {
            Ok(()) => Ok(tx),
            // Another finalizer got there first
            Err(ChargeError::InvalidTransition { .. }) => {
                let current = self
                    .ledger
                    .transaction(tx.id)
                    .await?
                    .ok_or(ChargeError::TransactionNotFound(tx.id))?;
                self.accept_duplicate(current, outcome)
            }
            Err(err) => Err(err),
        }
    }

    fn accept_duplicate(&self, tx: Transaction, outcome: &Outcome) -> Result<Transaction> {
        if outcome.already_applied(&tx) {
            tracing::debug!(transaction = %tx.id, status = %tx.status, "Outcome already recorded");
            return Ok(tx);
        }
        match outcome {
            // The money moved after the attempt was given up on
            Outcome::Passed { remote_id, .. }
                if tx.status == TransactionStatus::Failed
                    && tx.remote_id.as_deref() != Some(remote_id.as_str()) =>
            {
                tracing::error!(
                    transaction = %tx.id,
                    order = %tx.order_id,
                    remote_id = %remote_id,
                    failure_reason = tx.failure_reason.as_deref().unwrap_or(""),
                    "Provider confirmed a charge already recorded as failed"
                );
                Err(ChargeError::LateConfirmation {
                    transaction: tx.id,
                    remote_id: remote_id.clone(),
                })
            }
            _ => Err(ChargeError::InvalidTransition {
                transaction: tx.id,
                from: tx.status,
                to: outcome.status(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderId, Product};
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    async fn reserved() -> (Arc<InMemoryLedgerStore>, Transaction) {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let mut order = Order::new(OrderId::new("o1"));
        order.add_product(Product::new("p1", Money(1925)), 1).unwrap();
        ledger.save_order(order.clone()).await.unwrap();

        let candidate = Transaction::open(order.id, order.version, Money(1925), Currency::default());
        let reservation = ledger
            .reserve(candidate.clone(), Utc::now(), Duration::seconds(60))
            .await
            .unwrap();
        assert!(matches!(reservation, crate::domain::ports::Reservation::Reserved { .. }));
        (ledger, candidate)
    }

    #[tokio::test]
    async fn test_passed_outcome_archives_order() {
        let (ledger, tx) = reserved().await;
        let recorder = TransactionRecorder::new(ledger.clone());

        let finalized = recorder
            .finalize(
                tx.id,
                Outcome::Passed {
                    remote_id: "remote-1".to_string(),
                    amount: Money(1925),
                    currency: Currency::default(),
                },
            )
            .await
            .unwrap();

        assert_eq!(finalized.status, TransactionStatus::Passed);
        let order = ledger.order(&tx.order_id).await.unwrap().unwrap();
        assert!(order.is_archived());
    }

    #[tokio::test]
    async fn test_amount_mismatch_fails_transaction() {
        let (ledger, tx) = reserved().await;
        let recorder = TransactionRecorder::new(ledger.clone());

        let result = recorder
            .finalize(
                tx.id,
                Outcome::Passed {
                    remote_id: "remote-1".to_string(),
                    amount: Money(2000),
                    currency: Currency::default(),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(ChargeError::AmountMismatch {
                expected: Money(1925),
                actual: Money(2000),
                ..
            })
        ));
        let stored = ledger.transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        let order = ledger.order(&tx.order_id).await.unwrap().unwrap();
        assert!(!order.is_archived());
    }

    #[tokio::test]
    async fn test_redelivered_outcome_is_idempotent() {
        let (ledger, tx) = reserved().await;
        let recorder = TransactionRecorder::new(ledger);
        let outcome = Outcome::Passed {
            remote_id: "remote-1".to_string(),
            amount: Money(1925),
            currency: Currency::default(),
        };

        recorder.finalize(tx.id, outcome.clone()).await.unwrap();
        let again = recorder.finalize(tx.id, outcome).await.unwrap();
        assert_eq!(again.status, TransactionStatus::Passed);

        let conflicting = recorder
            .finalize(
                tx.id,
                Outcome::Failed {
                    reason: "late decline".to_string(),
                    remote_id: None,
                },
            )
            .await;
        assert!(matches!(
            conflicting,
            Err(ChargeError::InvalidTransition {
                from: TransactionStatus::Passed,
                to: TransactionStatus::Failed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_currency_mismatch_fails_transaction() {
        let (ledger, tx) = reserved().await;
        let recorder = TransactionRecorder::new(ledger.clone());

        let result = recorder
            .finalize(
                tx.id,
                Outcome::Passed {
                    remote_id: "remote-1".to_string(),
                    amount: Money(1925),
                    currency: "JPY".parse().unwrap(),
                },
            )
            .await;

        match result {
            Err(ChargeError::AmountMismatch {
                expected_currency,
                actual_currency,
                ..
            }) => {
                assert_eq!(expected_currency, Currency::default());
                assert_eq!(actual_currency.code(), "JPY");
            }
            other => panic!("expected AmountMismatch, got {:?}", other),
        }
        let stored = ledger.transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert!(!ledger.order(&tx.order_id).await.unwrap().unwrap().is_archived());
    }

    #[tokio::test]
    async fn test_confirmation_after_local_failure_is_surfaced() {
        let (ledger, tx) = reserved().await;
        let recorder = TransactionRecorder::new(ledger.clone());
        recorder
            .finalize(
                tx.id,
                Outcome::Failed {
                    reason: "charge never reached provider".to_string(),
                    remote_id: None,
                },
            )
            .await
            .unwrap();

        let result = recorder
            .finalize(
                tx.id,
                Outcome::Passed {
                    remote_id: "remote-1".to_string(),
                    amount: Money(1925),
                    currency: Currency::default(),
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ChargeError::LateConfirmation { transaction, ref remote_id })
                if transaction == tx.id && remote_id == "remote-1"
        ));
        let stored = ledger.transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let recorder = TransactionRecorder::new(ledger);
        let result = recorder
            .finalize(
                Uuid::new_v4(),
                Outcome::Failed {
                    reason: "x".to_string(),
                    remote_id: None,
                },
            )
            .await;
        assert!(matches!(result, Err(ChargeError::TransactionNotFound(_))));
    }
}
