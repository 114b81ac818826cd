use super::money::{Currency, Money};
use super::order::OrderId;
use crate::error::{ChargeError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Opened,
    Passed,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Opened => "opened",
            TransactionStatus::Passed => "passed",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One attempt to charge an order.
///
/// Created `opened` when the charge is reserved, before any call leaves the
/// process, and moved exactly once to `passed` or `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: OrderId,
    /// The amount computed for the order when the charge was reserved.
    pub amount: Money,
    pub currency: Currency,
    pub status: TransactionStatus,
    /// Version of the order the amount was computed from.
    pub order_version: u64,
    pub remote_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn open(order_id: OrderId, order_version: u64, amount: Money, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount,
            currency,
            status: TransactionStatus::Opened,
            order_version,
            remote_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The key the provider uses to deduplicate retried charge requests.
    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }

    pub fn is_opened(&self) -> bool {
        self.status == TransactionStatus::Opened
    }

    /// An opened transaction older than `window` is treated as abandoned.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.is_opened() && self.created_at + window <= now
    }

    pub fn pass(&mut self, remote_id: &str) -> Result<()> {
        self.transition(TransactionStatus::Passed)?;
        self.remote_id = Some(remote_id.to_string());
        Ok(())
    }

    pub fn fail(&mut self, reason: &str, remote_id: Option<&str>) -> Result<()> {
        self.transition(TransactionStatus::Failed)?;
        self.failure_reason = Some(reason.to_string());
        if let Some(remote_id) = remote_id {
            self.remote_id = Some(remote_id.to_string());
        }
        Ok(())
    }

    fn transition(&mut self, to: TransactionStatus) -> Result<()> {
        if !self.is_opened() {
            return Err(ChargeError::InvalidTransition {
                transaction: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
