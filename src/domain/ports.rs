use super::customer::{Customer, CustomerId, UserId};
use super::money::{Currency, Money};
use super::order::{Order, OrderId};
use super::transaction::{Transaction, TransactionStatus};
use crate::error::{ChargeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The candidate was stored as the order's only opened transaction.
    /// `abandoned` lists stale opened transactions that were failed to make room.
    Reserved {
        transaction: Transaction,
        abandoned: Vec<Transaction>,
    },
    /// A passed or still-fresh opened transaction already exists.
    Existing(Transaction),
}

/// Persistence for orders and their transactions.
///
/// `reserve`, `settle` and `save_order` must each be atomic with respect to one
/// another for the same order. Implementations get the decision logic from
/// [`plan_reservation`], [`check_settlement`] and [`check_order_write`] and
/// only provide the locking.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn save_order(&self, order: Order) -> Result<()>;
    async fn order(&self, id: &OrderId) -> Result<Option<Order>>;
    async fn orders(&self) -> Result<Vec<Order>>;

    async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>>;
    /// Transactions for one order, oldest first.
    async fn transactions_for(&self, order: &OrderId) -> Result<Vec<Transaction>>;
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;

    async fn reserve(
        &self,
        candidate: Transaction,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Reservation>;

    /// Persists a finalized transaction if the stored copy is still opened.
    /// A passed transaction archives its order in the same write.
    async fn settle(&self, tx: Transaction) -> Result<()>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn store(&self, customer: Customer) -> Result<()>;
    async fn get(&self, id: &CustomerId) -> Result<Option<Customer>>;
    async fn for_user(&self, user: &UserId) -> Result<Vec<Customer>>;
}

pub type SharedLedgerStore = Arc<dyn LedgerStore>;
pub type SharedCustomerStore = Arc<dyn CustomerStore>;

/// What the reservation step should write, computed from the order's
/// existing transactions.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationPlan {
    Existing(Transaction),
    Insert { abandoned: Vec<Transaction> },
}

pub fn plan_reservation(
    order: Option<&Order>,
    existing: &[Transaction],
    candidate: &Transaction,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Result<ReservationPlan> {
    let Some(order) = order else {
        return Err(ChargeError::OrderNotFound(candidate.order_id.clone()));
    };

    if let Some(passed) = existing
        .iter()
        .find(|tx| tx.status == TransactionStatus::Passed)
    {
        return Ok(ReservationPlan::Existing(passed.clone()));
    }

    let mut abandoned = Vec::new();
    for tx in existing.iter().filter(|tx| tx.is_opened()) {
        if tx.is_stale(now, stale_after) {
            let mut tx = tx.clone();
            tx.fail("abandoned: reservation went stale", None)?;
            abandoned.push(tx);
        } else {
            return Ok(ReservationPlan::Existing(tx.clone()));
        }
    }

    if order.version != candidate.order_version || order.is_archived() {
        return Err(ChargeError::ConcurrentModification(order.id.clone()));
    }
    Ok(ReservationPlan::Insert { abandoned })
}

/// Checks that `stored` can be replaced by its finalized form `settled`.
pub fn check_settlement(stored: Option<&Transaction>, settled: &Transaction) -> Result<()> {
    match stored {
        None => Err(ChargeError::TransactionNotFound(settled.id)),
        Some(stored) if !stored.is_opened() => Err(ChargeError::InvalidTransition {
            transaction: stored.id,
            from: stored.status,
            to: settled.status,
        }),
        Some(_) => Ok(()),
    }
}

/// Validates writing `new` over `stored` given the order's transactions.
///
/// Charge-relevant edits bump the order version; they are refused while a
/// transaction is opened or passed. Edits made from an outdated copy are
/// refused outright.
pub fn check_order_write(
    stored: Option<&Order>,
    new: &Order,
    transactions: &[Transaction],
) -> Result<()> {
    let Some(stored) = stored else {
        return Ok(());
    };
    if new.version < stored.version {
        return Err(ChargeError::ConcurrentModification(new.id.clone()));
    }
    let locked = stored.is_archived()
        || transactions
            .iter()
            .any(|tx| tx.status != TransactionStatus::Failed);
    let unarchives = stored.is_archived() && !new.is_archived();
    if unarchives || (locked && new.version != stored.version) {
        return Err(ChargeError::OrderLocked(new.id.clone()));
    }
    Ok(())
}

/// A charge as sent to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount: Money,
    pub currency: Currency,
    pub source_token: String,
    pub idempotency_key: String,
    pub location_id: String,
    pub remote_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Completed,
    Pending,
    Failed(String),
}

/// The provider's view of a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCharge {
    pub remote_id: String,
    pub amount: Money,
    pub currency: Currency,
    pub status: RemoteStatus,
}

/// Failures reported by a provider client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayFailure {
    /// The request may not have reached the provider (connection refused, reset).
    Transport(String),
    /// The request may have reached the provider but no answer came back.
    Timeout,
    Rejected(crate::error::Rejection),
}

impl fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayFailure::Transport(reason) => write!(f, "transport failure: {}", reason),
            GatewayFailure::Timeout => f.write_str("timed out"),
            GatewayFailure::Rejected(rejection) => write!(f, "rejected: {}", rejection),
        }
    }
}

/// Client for the remote payment API. Wire protocol and auth live behind it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> std::result::Result<RemoteCharge, GatewayFailure>;

    /// Finds the charge created with `idempotency_key`, if the provider has one.
    async fn lookup(
        &self,
        idempotency_key: &str,
    ) -> std::result::Result<Option<RemoteCharge>, GatewayFailure>;
}

pub type SharedPaymentGateway = Arc<dyn PaymentGateway>;
