use super::customer::CustomerId;
use super::deductible::{Deductible, Discount, Scope, Tax};
use super::fulfillment::{Fulfillment, FulfillmentState};
use super::money::{Currency, Money};
use crate::error::{ChargeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    /// Unit price in minor currency units.
    pub price: Money,
    #[serde(default)]
    pub variation: Option<Variation>,
}

impl Product {
    pub fn new(id: &str, price: Money) -> Self {
        Self {
            id: ProductId::new(id),
            name: id.to_string(),
            price,
            variation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product: Product,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Open,
    /// Charged. Products, taxes and discounts can no longer change.
    Archived,
}

/// The aggregate being charged.
///
/// Line items and deductibles keep insertion order, which is also the order in
/// which discounts are applied. Every charge-relevant mutation bumps `version`
/// so a reservation can detect that the order moved underneath it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub customers: BTreeSet<CustomerId>,
    /// Falls back to the merchant currency when unset.
    pub currency: Option<Currency>,
    pub line_items: Vec<LineItem>,
    pub deductibles: Vec<Deductible>,
    pub fulfillments: Vec<Fulfillment>,
    /// The provider-side order this one is mirrored to, if any.
    pub remote_order_id: Option<String>,
    pub status: OrderStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            id,
            customers: BTreeSet::new(),
            currency: None,
            line_items: Vec::new(),
            deductibles: Vec::new(),
            fulfillments: Vec::new(),
            remote_order_id: None,
            status: OrderStatus::Open,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == OrderStatus::Archived
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_archived() {
            Err(ChargeError::OrderLocked(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Adds `quantity` units of `product`, merging with an identical existing line.
    pub fn add_product(&mut self, product: Product, quantity: u32) -> Result<()> {
        self.ensure_open()?;
        if quantity == 0 {
            return Err(ChargeError::ValidationError(format!(
                "Quantity for product {} must be positive",
                product.id
            )));
        }

        match self
            .line_items
            .iter_mut()
            .find(|line| line.product.id == product.id)
        {
            Some(line) if line.product == product => {
                line.quantity = line.quantity.checked_add(quantity).ok_or_else(|| {
                    ChargeError::ValidationError(format!(
                        "Quantity overflow for product {}",
                        product.id
                    ))
                })?;
            }
            Some(_) => {
                return Err(ChargeError::ValidationError(format!(
                    "Product {} is already on order {} with a different definition",
                    product.id, self.id
                )));
            }
            None => self.line_items.push(LineItem { product, quantity }),
        }

        self.touch();
        Ok(())
    }

    /// Removes a product and every tax or discount scoped to it.
    pub fn remove_product(&mut self, product_id: &ProductId) -> Result<bool> {
        self.ensure_open()?;
        let before = self.line_items.len();
        self.line_items.retain(|line| &line.product.id != product_id);
        if self.line_items.len() == before {
            return Ok(false);
        }
        self.deductibles
            .retain(|d| d.scope().product() != Some(product_id));
        self.touch();
        Ok(true)
    }

    pub fn apply(&mut self, deductible: Deductible) -> Result<()> {
        self.ensure_open()?;
        deductible.validate()?;
        if self.deductibles.iter().any(|d| d.id() == deductible.id()) {
            return Err(ChargeError::ValidationError(format!(
                "Order {} already has a tax or discount {}",
                self.id,
                deductible.id()
            )));
        }
        if let Scope::Product(product_id) = deductible.scope()
            && !self.has_product(product_id)
        {
            return Err(ChargeError::ValidationError(format!(
                "Order {} has no product {} for {}",
                self.id,
                product_id,
                deductible.id()
            )));
        }
        self.deductibles.push(deductible);
        self.touch();
        Ok(())
    }

    pub fn remove_deductible(&mut self, id: &str) -> Result<bool> {
        self.ensure_open()?;
        let before = self.deductibles.len();
        self.deductibles.retain(|d| d.id() != id);
        let removed = self.deductibles.len() != before;
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    pub fn set_currency(&mut self, currency: Currency) -> Result<()> {
        self.ensure_open()?;
        self.currency = Some(currency);
        self.touch();
        Ok(())
    }

    pub fn taxes(&self) -> impl Iterator<Item = &Tax> {
        self.deductibles.iter().filter_map(|d| match d {
            Deductible::Tax(tax) => Some(tax),
            Deductible::Discount(_) => None,
        })
    }

    pub fn discounts(&self) -> impl Iterator<Item = &Discount> {
        self.deductibles.iter().filter_map(|d| match d {
            Deductible::Discount(discount) => Some(discount),
            Deductible::Tax(_) => None,
        })
    }

    pub fn has_product(&self, product_id: &ProductId) -> bool {
        self.line_items
            .iter()
            .any(|line| &line.product.id == product_id)
    }

    pub fn has_customer(&self, customer: &CustomerId) -> bool {
        self.customers.contains(customer)
    }

    /// Customers do not affect the charge amount, so archived orders accept them.
    ///
    /// Returns `false` if the customer was already attached.
    pub fn attach_customer(&mut self, customer: CustomerId) -> bool {
        let attached = self.customers.insert(customer);
        if attached {
            self.updated_at = Utc::now();
        }
        attached
    }

    pub fn detach_customer(&mut self, customer: &CustomerId) -> bool {
        let detached = self.customers.remove(customer);
        if detached {
            self.updated_at = Utc::now();
        }
        detached
    }

    pub fn link_remote_order(&mut self, remote_order_id: &str) {
        self.remote_order_id = Some(remote_order_id.to_string());
        self.updated_at = Utc::now();
    }

    pub fn add_fulfillment(&mut self, fulfillment: Fulfillment) -> Result<()> {
        if self.fulfillments.iter().any(|f| f.id == fulfillment.id) {
            return Err(ChargeError::ValidationError(format!(
                "Order {} already has fulfillment {}",
                self.id, fulfillment.id
            )));
        }
        self.fulfillments.push(fulfillment);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn advance_fulfillment(&mut self, id: &str, next: FulfillmentState) -> Result<()> {
        let fulfillment = self
            .fulfillments
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| {
                ChargeError::ValidationError(format!(
                    "Order {} has no fulfillment {}",
                    self.id, id
                ))
            })?;
        fulfillment.advance(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub(crate) fn archive(&mut self) {
        self.status = OrderStatus::Archived;
        self.updated_at = Utc::now();
    }
}
