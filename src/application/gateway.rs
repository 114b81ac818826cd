use super::retry::{IsTransient, RetryConfig, RetryResult, retry_on_transient};
use crate::config::{ChargeContext, GatewayConfig};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{ChargeRequest, GatewayFailure, RemoteCharge, SharedPaymentGateway};
use crate::error::{ChargeError, GatewayError, Result};
use std::time::Duration;

impl IsTransient for GatewayFailure {
    fn is_transient(&self) -> bool {
        // A timeout may have charged the card; only reconciliation can tell.
        matches!(self, GatewayFailure::Transport(_))
    }
}

/// Talks to the payment provider on behalf of the merchant in `context`.
///
/// Transport failures are retried with backoff. Rejections are final.
/// Timeouts are reported as [`ChargeError::AmbiguousOutcome`] and never as a
/// failed charge.
pub struct GatewayAdapter {
    gateway: SharedPaymentGateway,
    context: ChargeContext,
    retry: RetryConfig,
    timeout: Duration,
}

impl GatewayAdapter {
    pub fn new(gateway: SharedPaymentGateway, context: ChargeContext, config: &GatewayConfig) -> Self {
        Self {
            gateway,
            context,
            retry: RetryConfig::from(config),
            timeout: config.timeout(),
        }
    }

    pub fn context(&self) -> &ChargeContext {
        &self.context
    }

    pub async fn charge(
        &self,
        amount: Money,
        source_token: &str,
        currency: &Currency,
        idempotency_key: &str,
        remote_order_id: Option<&str>,
    ) -> Result<RemoteCharge> {
        if source_token.trim().is_empty() {
            return Err(ChargeError::ValidationError(
                "Payment source token must not be empty".to_string(),
            ));
        }
        if amount.is_zero() {
            return Err(ChargeError::ValidationError(
                "Charge amount must be positive".to_string(),
            ));
        }

        let request = ChargeRequest {
            amount,
            currency: currency.clone(),
            source_token: source_token.to_string(),
            idempotency_key: idempotency_key.to_string(),
            location_id: self.context.location_id.clone(),
            remote_order_id: remote_order_id.map(str::to_string),
        };

        tracing::info!(
            idempotency_key = %idempotency_key,
            amount = amount.minor_units(),
            currency = %currency,
            "Sending charge to provider"
        );

        let (gateway, request, timeout) = (&self.gateway, &request, self.timeout);
        let outcome = retry_on_transient(&self.retry, move |_| async move {
            match tokio::time::timeout(timeout, gateway.charge(request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayFailure::Timeout),
            }
        })
        .await;

        self.interpret(idempotency_key, outcome)
    }

    /// Asks the provider what happened to the charge made with `idempotency_key`.
    pub async fn lookup(&self, idempotency_key: &str) -> Result<Option<RemoteCharge>> {
        let (gateway, timeout) = (&self.gateway, self.timeout);
        let outcome = retry_on_transient(&self.retry, move |_| async move {
            match tokio::time::timeout(timeout, gateway.lookup(idempotency_key)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayFailure::Timeout),
            }
        })
        .await;

        self.interpret(idempotency_key, outcome)
    }

    fn interpret<T>(&self, idempotency_key: &str, outcome: RetryResult<T, GatewayFailure>) -> Result<T> {
        match outcome {
            RetryResult::Success(value) => Ok(value),
            RetryResult::PermanentFailure(GatewayFailure::Rejected(rejection)) => {
                tracing::warn!(idempotency_key = %idempotency_key, %rejection, "Provider rejected charge");
                Err(GatewayError::Rejected(rejection).into())
            }
            RetryResult::PermanentFailure(failure) => {
                tracing::warn!(idempotency_key = %idempotency_key, %failure, "Charge outcome unknown");
                Err(ChargeError::AmbiguousOutcome {
                    idempotency_key: idempotency_key.to_string(),
                    reason: failure.to_string(),
                })
            }
            RetryResult::Exhausted { attempts, error } => Err(GatewayError::Unavailable {
                attempts,
                last_error: error.to_string(),
            }
            .into()),
        }
    }
}
