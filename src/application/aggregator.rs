use crate::config::ChargeContext;
use crate::domain::deductible::{AdjustmentKind, Scope, TaxMode};
use crate::domain::money::{Currency, Money};
use crate::domain::order::{Order, ProductId};
use crate::error::Result;
use serde::Serialize;

/// Breakdown of what an order costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub currency: Currency,
    /// Line totals after product-scoped discounts.
    pub subtotal: Money,
    /// Everything taken off by product- and order-scoped discounts.
    pub discount_total: Money,
    /// Subtotal after order-scoped discounts.
    pub discounted: Money,
    /// Tax already contained in `discounted`. Informational only.
    pub inclusive_tax: Money,
    pub additive_tax: Money,
    /// The amount to charge.
    pub total: Money,
}

struct LineNet<'a> {
    product: &'a ProductId,
    quantity: u32,
    net: Money,
}

/// Computes the charge amount for `order`.
///
/// Precedence: product discounts per unit, then order discounts in attach
/// order, then taxes on the discounted amount. Inclusive taxes are reported
/// but not added. Pure and safe to call concurrently.
pub fn compute_total(order: &Order, context: &ChargeContext) -> Result<OrderTotals> {
    let currency = order
        .currency
        .clone()
        .unwrap_or_else(|| context.currency.clone());

    let mut gross = Money::ZERO;
    let mut subtotal = Money::ZERO;
    let mut lines = Vec::with_capacity(order.line_items.len());

    for line in &order.line_items {
        let mut unit = line.product.price;
        for discount in order
            .discounts()
            .filter(|d| d.scope.product() == Some(&line.product.id))
        {
            unit = discount.apply_to(unit)?;
        }
        let net = unit.checked_mul(line.quantity)?;
        gross = gross.checked_add(line.product.price.checked_mul(line.quantity)?)?;
        subtotal = subtotal.checked_add(net)?;
        lines.push(LineNet {
            product: &line.product.id,
            quantity: line.quantity,
            net,
        });
    }

    let mut discounted = subtotal;
    for discount in order.discounts().filter(|d| d.scope == Scope::Order) {
        discounted = discount.apply_to(discounted)?;
    }

    let mut inclusive_tax = Money::ZERO;
    let mut additive_tax = Money::ZERO;
    for tax in order.taxes() {
        let (base, units) = match &tax.scope {
            Scope::Order => (discounted, 1),
            Scope::Product(product) => match lines.iter().find(|l| l.product == product) {
                // The line's share of the discounted amount
                Some(line) => (line.net.prorate(discounted, subtotal)?, line.quantity),
                None => (Money::ZERO, 0),
            },
        };

        match tax.mode {
            TaxMode::Additive => {
                let amount = match tax.kind {
                    AdjustmentKind::Percentage(rate) => rate.of(base)?,
                    AdjustmentKind::Fixed(value) => value.checked_mul(units)?,
                };
                additive_tax = additive_tax.checked_add(amount)?;
            }
            TaxMode::Inclusive => {
                let amount = match tax.kind {
                    AdjustmentKind::Percentage(rate) => rate.embedded_in(base)?,
                    AdjustmentKind::Fixed(value) => value.checked_mul(units)?.min(base),
                };
                inclusive_tax = inclusive_tax.checked_add(amount)?;
            }
        }
    }

    Ok(OrderTotals {
        currency,
        subtotal,
        discount_total: gross.saturating_sub(discounted),
        discounted,
        inclusive_tax,
        additive_tax,
        total: discounted.checked_add(additive_tax)?,
    })
}
