use super::money::{Money, Percentage};
use super::order::ProductId;
use crate::error::{ChargeError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How much a tax or discount is worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Percentage(Percentage),
    Fixed(Money),
}

/// Whether a tax is charged on top of the subtotal or already embedded in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaxMode {
    #[default]
    Additive,
    Inclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Order,
    Product(ProductId),
}

impl Scope {
    pub fn product(&self) -> Option<&ProductId> {
        match self {
            Scope::Order => None,
            Scope::Product(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tax {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: AdjustmentKind,
    #[serde(default)]
    pub mode: TaxMode,
    #[serde(default)]
    pub scope: Scope,
}

impl Tax {
    pub fn additive(id: &str, kind: AdjustmentKind) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            mode: TaxMode::Additive,
            scope: Scope::Order,
        }
    }

    pub fn inclusive(id: &str, kind: AdjustmentKind) -> Self {
        Self {
            mode: TaxMode::Inclusive,
            ..Self::additive(id, kind)
        }
    }

    pub fn on_product(mut self, product: ProductId) -> Self {
        self.scope = Scope::Product(product);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: AdjustmentKind,
    #[serde(default)]
    pub scope: Scope,
}

impl Discount {
    pub fn new(id: &str, kind: AdjustmentKind) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            scope: Scope::Order,
        }
    }

    pub fn on_product(mut self, product: ProductId) -> Self {
        self.scope = Scope::Product(product);
        self
    }

    /// Reduces `amount` by this discount, flooring at zero.
    pub fn apply_to(&self, amount: Money) -> Result<Money> {
        let reduction = match self.kind {
            AdjustmentKind::Fixed(value) => value,
            AdjustmentKind::Percentage(rate) => rate.of(amount)?,
        };
        Ok(amount.saturating_sub(reduction))
    }
}

/// A tax or a discount attached to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Deductible {
    Tax(Tax),
    Discount(Discount),
}

impl Deductible {
    pub fn id(&self) -> &str {
        match self {
            Deductible::Tax(tax) => &tax.id,
            Deductible::Discount(discount) => &discount.id,
        }
    }

    pub fn scope(&self) -> &Scope {
        match self {
            Deductible::Tax(tax) => &tax.scope,
            Deductible::Discount(discount) => &discount.scope,
        }
    }

    /// Rejects percentage discounts outside 0..=100 and empty identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.id().trim().is_empty() {
            return Err(ChargeError::ValidationError(
                "Tax and discount identifiers must not be empty".to_string(),
            ));
        }
        if let Deductible::Discount(Discount {
            kind: AdjustmentKind::Percentage(rate),
            ..
        }) = self
            && rate.value() > Decimal::ONE_HUNDRED
        {
            return Err(ChargeError::ValidationError(format!(
                "Discount {} exceeds 100 percent",
                self.id()
            )));
        }
        Ok(())
    }
}

impl From<Tax> for Deductible {
    fn from(tax: Tax) -> Self {
        Deductible::Tax(tax)
    }
}

impl From<Discount> for Deductible {
    fn from(discount: Discount) -> Self {
        Deductible::Discount(discount)
    }
}
