use crate::error::{ChargeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentState {
    #[default]
    Proposed,
    Reserved,
    Prepared,
    Completed,
    Failed,
    Canceled,
}

impl FulfillmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentState::Completed | FulfillmentState::Failed | FulfillmentState::Canceled
        )
    }

    /// Forward progress is one step at a time; any open state may fail or be canceled.
    pub fn can_become(&self, next: FulfillmentState) -> bool {
        use FulfillmentState::*;
        match (*self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed | Canceled) => true,
            (Proposed, Reserved) | (Reserved, Prepared) | (Prepared, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FulfillmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FulfillmentState::Proposed => "proposed",
            FulfillmentState::Reserved => "reserved",
            FulfillmentState::Prepared => "prepared",
            FulfillmentState::Completed => "completed",
            FulfillmentState::Failed => "failed",
            FulfillmentState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentType {
    Pickup,
    Shipment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Recipient {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FulfillmentType,
    #[serde(default)]
    pub state: FulfillmentState,
    pub recipient: Recipient,
}

impl Fulfillment {
    pub fn new(id: &str, kind: FulfillmentType, recipient: Recipient) -> Self {
        Self {
            id: id.to_string(),
            kind,
            state: FulfillmentState::Proposed,
            recipient,
        }
    }

    pub fn advance(&mut self, next: FulfillmentState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(ChargeError::ValidationError(format!(
                "Fulfillment {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
