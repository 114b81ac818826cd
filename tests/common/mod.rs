#![allow(dead_code)]

use async_trait::async_trait;
use chargeflow::application::engine::ChargeEngine;
use chargeflow::config::{ChargeConfig, GatewayConfig};
use chargeflow::domain::deductible::{AdjustmentKind, Tax};
use chargeflow::domain::money::{Currency, Money, Percentage};
use chargeflow::domain::order::{OrderId, Product};
use chargeflow::domain::ports::{
    ChargeRequest, GatewayFailure, PaymentGateway, RemoteCharge, RemoteStatus,
};
use chargeflow::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryLedgerStore};
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

/// What the scripted provider does on one charge call.
#[derive(Debug, Clone)]
pub enum Step {
    Fail(GatewayFailure),
    Answer(RemoteStatus),
    /// Records a completed charge, then stalls for the given time before answering.
    Stall(Duration),
    /// Takes the given time before the charge exists at all, then completes it.
    Slow(Duration),
}

/// A provider double that plays back `Step`s in order and completes every
/// charge once the script runs out.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Step>>,
    charges: Mutex<HashMap<String, RemoteCharge>>,
    confirmed_amount: Option<Money>,
    confirmed_currency: Option<Currency>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Confirms every charge for `amount` regardless of what was requested.
    pub fn confirming(amount: Money) -> Self {
        Self {
            confirmed_amount: Some(amount),
            ..Self::default()
        }
    }

    /// Confirms every charge in `currency` regardless of what was requested.
    pub fn confirming_in(currency: Currency) -> Self {
        Self {
            confirmed_currency: Some(currency),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, request: &ChargeRequest, status: RemoteStatus) -> RemoteCharge {
        let charge = RemoteCharge {
            remote_id: format!("remote-{}", request.idempotency_key),
            amount: self.confirmed_amount.unwrap_or(request.amount),
            currency: self
                .confirmed_currency
                .clone()
                .unwrap_or_else(|| request.currency.clone()),
            status,
        };
        self.charges
            .lock()
            .unwrap()
            .insert(request.idempotency_key.clone(), charge.clone());
        charge
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<RemoteCharge, GatewayFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(failure)) => Err(failure),
            Some(Step::Answer(status)) => Ok(self.record(request, status)),
            Some(Step::Stall(duration)) => {
                let charge = self.record(request, RemoteStatus::Completed);
                tokio::time::sleep(duration).await;
                Ok(charge)
            }
            Some(Step::Slow(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(self.record(request, RemoteStatus::Completed))
            }
            None => Ok(self.record(request, RemoteStatus::Completed)),
        }
    }

    async fn lookup(&self, idempotency_key: &str) -> Result<Option<RemoteCharge>, GatewayFailure> {
        Ok(self.charges.lock().unwrap().get(idempotency_key).cloned())
    }
}

/// Short timeouts and backoff so failure paths run quickly.
pub fn fast_config() -> ChargeConfig {
    ChargeConfig {
        gateway: GatewayConfig {
            timeout_ms: 200,
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
        ..ChargeConfig::default()
    }
}

pub fn engine_with(gateway: Arc<ScriptedGateway>) -> ChargeEngine {
    engine_with_config(gateway, fast_config())
}

pub fn engine_with_config(gateway: Arc<ScriptedGateway>, config: ChargeConfig) -> ChargeEngine {
    ChargeEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryCustomerStore::new()),
        gateway,
        &config,
    )
}

/// `fast_config` with every opened transaction already past its staleness window.
pub fn instantly_stale_config() -> ChargeConfig {
    ChargeConfig {
        staleness_window_secs: 0,
        ..fast_config()
    }
}

pub fn percent(value: rust_decimal::Decimal) -> AdjustmentKind {
    AdjustmentKind::Percentage(Percentage::new(value).unwrap())
}

/// Two units at 1000 with a 10% additive tax: totals 2200.
pub async fn order_of_2200(engine: &ChargeEngine, id: &str) -> OrderId {
    let id = OrderId::new(id);
    engine.create_order(id.clone(), None).await.unwrap();
    engine
        .add_product(&id, Product::new("p1", Money(1000)), 2)
        .await
        .unwrap();
    engine
        .apply_tax(&id, Tax::additive("vat", percent(dec!(10))))
        .await
        .unwrap();
    id
}

/// Writes a JSON Lines command script to a temporary file.
pub fn command_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}
