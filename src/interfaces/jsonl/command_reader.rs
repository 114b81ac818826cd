use crate::application::engine::ChargeEngine;
use crate::domain::customer::{Customer, CustomerId, UserId};
use crate::domain::deductible::{Discount, Tax};
use crate::domain::fulfillment::{Fulfillment, FulfillmentState};
use crate::domain::money::Currency;
use crate::domain::order::{OrderId, Product, ProductId};
use crate::error::Result;
use crate::interfaces::webhook::WebhookEvent;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use uuid::Uuid;

fn one() -> u32 {
    1
}

/// One line of a command script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateOrder {
        order: OrderId,
        #[serde(default)]
        currency: Option<Currency>,
    },
    AddProduct {
        order: OrderId,
        product: Product,
        #[serde(default = "one")]
        quantity: u32,
    },
    RemoveProduct {
        order: OrderId,
        product: ProductId,
    },
    ApplyTax {
        order: OrderId,
        tax: Tax,
    },
    ApplyDiscount {
        order: OrderId,
        discount: Discount,
    },
    RemoveDeductible {
        order: OrderId,
        id: String,
    },
    LinkRemoteOrder {
        order: OrderId,
        remote_order_id: String,
    },
    UpsertCustomer {
        customer: Customer,
    },
    LinkUser {
        customer: CustomerId,
        user: UserId,
    },
    UnlinkUser {
        customer: CustomerId,
        user: UserId,
    },
    AttachCustomer {
        order: OrderId,
        customer: CustomerId,
    },
    DetachCustomer {
        order: OrderId,
        customer: CustomerId,
    },
    AddFulfillment {
        order: OrderId,
        fulfillment: Fulfillment,
    },
    AdvanceFulfillment {
        order: OrderId,
        fulfillment: String,
        state: FulfillmentState,
    },
    Charge {
        order: OrderId,
        source_token: String,
    },
    Reconcile {
        transaction: Uuid,
    },
    ReconcileOpened,
    Webhook {
        event: WebhookEvent,
    },
}

impl Command {
    /// Runs the command against `engine`.
    pub async fn execute(self, engine: &ChargeEngine) -> Result<()> {
        match self {
            Command::CreateOrder { order, currency } => {
                engine.create_order(order, currency).await?;
            }
            Command::AddProduct {
                order,
                product,
                quantity,
            } => engine.add_product(&order, product, quantity).await?,
            Command::RemoveProduct { order, product } => {
                engine.remove_product(&order, &product).await?;
            }
            Command::ApplyTax { order, tax } => engine.apply_tax(&order, tax).await?,
            Command::ApplyDiscount { order, discount } => {
                engine.apply_discount(&order, discount).await?
            }
            Command::RemoveDeductible { order, id } => {
                engine.remove_deductible(&order, &id).await?;
            }
            Command::LinkRemoteOrder {
                order,
                remote_order_id,
            } => engine.link_remote_order(&order, &remote_order_id).await?,
            Command::UpsertCustomer { customer } => {
                engine.upsert_customer(customer).await?;
            }
            Command::LinkUser { customer, user } => {
                engine.link_user(&customer, user).await?;
            }
            Command::UnlinkUser { customer, user } => {
                engine.unlink_user(&customer, &user).await?;
            }
            Command::AttachCustomer { order, customer } => {
                engine.attach_customer(&order, &customer).await?;
            }
            Command::DetachCustomer { order, customer } => {
                engine.detach_customer(&order, &customer).await?;
            }
            Command::AddFulfillment { order, fulfillment } => {
                engine.add_fulfillment(&order, fulfillment).await?
            }
            Command::AdvanceFulfillment {
                order,
                fulfillment,
                state,
            } => {
                engine
                    .advance_fulfillment(&order, &fulfillment, state)
                    .await?
            }
            Command::Charge {
                order,
                source_token,
            } => {
                engine.charge(&order, &source_token).await?;
            }
            Command::Reconcile { transaction } => {
                engine.reconcile(transaction).await?;
            }
            Command::ReconcileOpened => {
                engine.reconcile_opened().await?;
            }
            Command::Webhook { event } => {
                engine.handle_webhook(event).await?;
            }
        }
        Ok(())
    }
}

/// Reads commands from a JSON Lines source.
///
/// Each non-blank line is parsed on its own, so a malformed line yields an
/// error item and reading continues with the next one.
pub struct CommandReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .lines()
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|line| -> Result<Command> {
                let line = line?;
                Ok(serde_json::from_str(&line)?)
            })
    }
}
