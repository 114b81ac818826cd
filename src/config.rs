//! Runtime options.
//!
//! Everything is defaulted so an empty JSON object is a valid config file.

use crate::domain::money::Currency;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MAX_STALENESS_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// The merchant a charge is made on behalf of.
///
/// Passed explicitly to the aggregator and the gateway adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeContext {
    pub location_id: String,
    pub currency: Currency,
}

impl Default for ChargeContext {
    fn default() -> Self {
        Self {
            location_id: "main".to_string(),
            currency: Currency::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound for a single provider call.
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeConfig {
    pub merchant: ChargeContext,
    /// How long an opened transaction blocks new attempts before it counts as abandoned.
    pub staleness_window_secs: u64,
    pub gateway: GatewayConfig,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            merchant: ChargeContext::default(),
            staleness_window_secs: 300,
            gateway: GatewayConfig::default(),
        }
    }
}

impl ChargeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_window_secs.min(MAX_STALENESS_SECS) as i64)
    }
}
