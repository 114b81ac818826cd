use crate::application::recorder::Outcome;
use crate::domain::money::{Currency, Money};
use crate::error::{ChargeError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PAYMENT_UPDATED: &str = "payment.updated";

/// A provider notification as delivered to the webhook endpoint.
///
/// Signature verification happens before this point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    pub data: WebhookData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookObject {
    pub payment: RemotePayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Completed,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountMoney {
    pub amount: Money,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePayment {
    /// The provider's payment id.
    pub id: String,
    pub status: PaymentStatus,
    pub amount_money: AmountMoney,
    /// The idempotency key the charge was created with.
    pub reference_id: String,
}

impl WebhookEvent {
    pub fn payment_updated(payment: RemotePayment) -> Self {
        Self {
            event_type: PAYMENT_UPDATED.to_string(),
            event_id: None,
            data: WebhookData {
                object: WebhookObject { payment },
            },
        }
    }

    /// The transaction this event settles and how, or `None` if the event
    /// carries no final outcome.
    pub fn into_outcome(self) -> Result<Option<(Uuid, Outcome)>> {
        if self.event_type != PAYMENT_UPDATED {
            tracing::debug!(event_type = %self.event_type, "Ignoring webhook event");
            return Ok(None);
        }

        let payment = self.data.object.payment;
        let transaction = Uuid::parse_str(&payment.reference_id).map_err(|e| {
            ChargeError::ValidationError(format!(
                "Webhook reference {} is not a transaction id: {}",
                payment.reference_id, e
            ))
        })?;

        let outcome = match payment.status {
            PaymentStatus::Completed => Outcome::Passed {
                remote_id: payment.id,
                amount: payment.amount_money.amount,
                currency: payment.amount_money.currency,
            },
            PaymentStatus::Canceled | PaymentStatus::Failed => Outcome::Failed {
                reason: format!("provider reported {:?}", payment.status).to_lowercase(),
                remote_id: Some(payment.id),
            },
            PaymentStatus::Approved | PaymentStatus::Pending => return Ok(None),
        };
        Ok(Some((transaction, outcome)))
    }
}
