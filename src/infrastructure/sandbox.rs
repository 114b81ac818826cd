use crate::domain::ports::{ChargeRequest, GatewayFailure, PaymentGateway, RemoteCharge, RemoteStatus};
use crate::error::Rejection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Charges successfully.
pub const NONCE_OK: &str = "cnon:card-nonce-ok";
/// Declined for insufficient funds.
pub const NONCE_DECLINED: &str = "cnon:card-nonce-declined";
/// Rejected as an expired card.
pub const NONCE_EXPIRED: &str = "cnon:card-nonce-expired";
/// Accepted but left pending until a webhook reports the result.
pub const NONCE_PENDING: &str = "cnon:card-nonce-pending";

/// An in-process stand-in for the provider's sandbox.
///
/// Deduplicates by idempotency key like the real API: repeating a request
/// returns the first response without charging again.
#[derive(Default, Clone)]
pub struct SandboxGateway {
    charges: Arc<Mutex<HashMap<String, RemoteCharge>>>,
    sequence: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of charge requests received, including deduplicated ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_remote_id(&self) -> String {
        format!("sandbox-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<RemoteCharge, GatewayFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut charges = self.charges.lock().await;

        if let Some(previous) = charges.get(&request.idempotency_key) {
            return match &previous.status {
                RemoteStatus::Failed(reason) => Err(GatewayFailure::Rejected(rejection_for(reason))),
                _ => Ok(previous.clone()),
            };
        }

        let status = match request.source_token.as_str() {
            NONCE_OK => RemoteStatus::Completed,
            NONCE_PENDING => RemoteStatus::Pending,
            NONCE_DECLINED => RemoteStatus::Failed("INSUFFICIENT_FUNDS".to_string()),
            NONCE_EXPIRED => RemoteStatus::Failed("CARD_EXPIRED".to_string()),
            _ => RemoteStatus::Failed("INVALID_CARD".to_string()),
        };

        let charge = RemoteCharge {
            remote_id: self.next_remote_id(),
            amount: request.amount,
            currency: request.currency.clone(),
            status,
        };
        charges.insert(request.idempotency_key.clone(), charge.clone());

        match &charge.status {
            RemoteStatus::Failed(reason) => Err(GatewayFailure::Rejected(rejection_for(reason))),
            _ => Ok(charge),
        }
    }

    async fn lookup(&self, idempotency_key: &str) -> Result<Option<RemoteCharge>, GatewayFailure> {
        let charges = self.charges.lock().await;
        Ok(charges.get(idempotency_key).cloned())
    }
}

fn rejection_for(code: &str) -> Rejection {
    match code {
        "INSUFFICIENT_FUNDS" => Rejection::InsufficientFunds,
        "CARD_EXPIRED" => Rejection::ExpiredSource,
        "INVALID_CARD" => Rejection::InvalidSource,
        other => Rejection::Declined(other.to_string()),
    }
}
