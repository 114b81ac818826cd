use crate::domain::money::{Currency, Money};
use crate::domain::order::OrderId;
use crate::domain::transaction::TransactionStatus;
use thiserror::Error;
use uuid::Uuid;

/// Why the payment provider refused a charge. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("payment source is invalid")]
    InvalidSource,
    #[error("payment source has expired")]
    ExpiredSource,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("declined: {0}")]
    Declined(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("charge rejected by provider: {0}")]
    Rejected(#[from] Rejection),
    #[error("provider unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

#[derive(Error, Debug)]
pub enum ChargeError {
    #[error("Order {0} has no line items to charge")]
    EmptyOrder(OrderId),
    #[error("Order {order} already has a {status} transaction {transaction}")]
    AlreadyCharged {
        order: OrderId,
        transaction: Uuid,
        status: TransactionStatus,
        remote_id: Option<String>,
    },
    #[error(
        "Transaction {transaction} confirmed {actual} {actual_currency} but {expected} {expected_currency} was reserved"
    )]
    AmountMismatch {
        transaction: Uuid,
        expected: Money,
        expected_currency: Currency,
        actual: Money,
        actual_currency: Currency,
    },
    /// The provider took the money for a transaction already recorded as failed.
    #[error("Provider confirmed charge {remote_id} for transaction {transaction}, which is already failed")]
    LateConfirmation { transaction: Uuid, remote_id: String },
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Outcome of charge {idempotency_key} is unknown, reconcile before retrying: {reason}")]
    AmbiguousOutcome {
        idempotency_key: String,
        reason: String,
    },
    #[error("Order {0} is locked by an open or passed transaction")]
    OrderLocked(OrderId),
    #[error("Order {0} changed while a charge was being reserved")]
    ConcurrentModification(OrderId),
    #[error("Transaction {transaction} cannot move from {from} to {to}")]
    InvalidTransition {
        transaction: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Transaction {0} not found")]
    TransactionNotFound(Uuid),
    #[error("Customer {0} not found")]
    CustomerNotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ChargeError {
    fn from(err: rocksdb::Error) -> Self {
        ChargeError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ChargeError>;
