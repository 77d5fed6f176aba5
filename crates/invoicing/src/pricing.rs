//! Line pricing and invoice aggregates.
//!
//! ```text
//! total         = unit_price × quantity
//! discount      = total × discount% / 100
//! after_discount = total − discount
//! tax           = after_discount × tax% / 100
//! final         = after_discount + tax
//! insurance     = final × coverage% / 100   (when covered)
//! ```
//!
//! Every intermediate is rounded half-up to cents, so recomputing from the
//! stored inputs reproduces the stored amounts exactly.

use serde::{Deserialize, Serialize};

use clinicflow_core::{DomainError, DomainResult, InventoryItemId, InvoiceItemId, Money, Percentage};

use crate::purpose::ItemType;

/// Input for one billed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub item_name: String,
    #[serde(default)]
    pub item_description: Option<String>,
    pub item_type: ItemType,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub discount_percentage: Percentage,
    #[serde(default)]
    pub tax_percentage: Percentage,
    #[serde(default)]
    pub insurance_covered: bool,
    #[serde(default)]
    pub insurance_coverage_percentage: Percentage,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub inventory_item_id: Option<InventoryItemId>,
    #[serde(default)]
    pub sku: Option<String>,
}

impl NewInvoiceItem {
    /// A plain line with no discount, tax or insurance.
    pub fn simple(item_name: impl Into<String>, item_type: ItemType, quantity: u32, unit_price: Money) -> Self {
        Self {
            item_name: item_name.into(),
            item_description: None,
            item_type,
            quantity,
            unit_price,
            discount_percentage: Percentage::ZERO,
            tax_percentage: Percentage::ZERO,
            insurance_covered: false,
            insurance_coverage_percentage: Percentage::ZERO,
            notes: None,
            inventory_item_id: None,
            sku: None,
        }
    }

    pub fn with_tax(mut self, tax: Percentage) -> Self {
        self.tax_percentage = tax;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub item_name: String,
    pub item_description: Option<String>,
    pub item_type: ItemType,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub discount_percentage: Percentage,
    pub discount_amount: Money,
    pub tax_percentage: Percentage,
    pub tax_amount: Money,
    pub final_price: Money,
    pub insurance_covered: bool,
    pub insurance_coverage_percentage: Percentage,
    pub insurance_amount: Money,
    pub notes: Option<String>,
    pub inventory_item_id: Option<InventoryItemId>,
    pub sku: Option<String>,
}

/// Amounts derived from a line's inputs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineAmounts {
    pub total: Money,
    pub discount: Money,
    pub tax: Money,
    pub final_price: Money,
    pub insurance: Money,
}

impl LineAmounts {
    pub fn compute(
        unit_price: Money,
        quantity: u32,
        discount_pct: Percentage,
        tax_pct: Percentage,
        insurance_pct: Option<Percentage>,
    ) -> DomainResult<Self> {
        let total = unit_price.checked_mul_quantity(quantity.into())?;
        let discount = total.percent(discount_pct);
        let after_discount = total.saturating_sub(discount);
        let tax = after_discount.percent(tax_pct);
        let final_price = after_discount.checked_add(tax)?;
        let insurance = insurance_pct.map(|pct| final_price.percent(pct)).unwrap_or(Money::ZERO);
        Ok(Self {
            total,
            discount,
            tax,
            final_price,
            insurance,
        })
    }
}

impl InvoiceItem {
    pub fn price(id: InvoiceItemId, input: NewInvoiceItem) -> DomainResult<Self> {
        if input.item_name.trim().is_empty() {
            return Err(DomainError::validation("invoice item name is required"));
        }
        if input.quantity == 0 {
            return Err(DomainError::validation(format!(
                "quantity must be greater than zero for item: {}",
                input.item_name
            )));
        }
        let amounts = LineAmounts::compute(
            input.unit_price,
            input.quantity,
            input.discount_percentage,
            input.tax_percentage,
            input.insurance_covered.then_some(input.insurance_coverage_percentage),
        )?;

        Ok(Self {
            id,
            item_name: input.item_name.trim().to_string(),
            item_description: input.item_description,
            item_type: input.item_type,
            quantity: input.quantity,
            unit_price: input.unit_price,
            total_price: amounts.total,
            discount_percentage: input.discount_percentage,
            discount_amount: amounts.discount,
            tax_percentage: input.tax_percentage,
            tax_amount: amounts.tax,
            final_price: amounts.final_price,
            insurance_covered: input.insurance_covered,
            insurance_coverage_percentage: input.insurance_coverage_percentage,
            insurance_amount: amounts.insurance,
            notes: input.notes,
            inventory_item_id: input.inventory_item_id,
            sku: input.sku,
        })
    }

    /// Recompute amounts from the stored inputs.
    pub fn recompute(&self) -> DomainResult<LineAmounts> {
        LineAmounts::compute(
            self.unit_price,
            self.quantity,
            self.discount_percentage,
            self.tax_percentage,
            self.insurance_covered.then_some(self.insurance_coverage_percentage),
        )
    }
}

/// Invoice-level sums: `total = subtotal − discount + tax`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl InvoiceTotals {
    pub fn of(items: &[InvoiceItem]) -> DomainResult<Self> {
        let mut totals = InvoiceTotals::default();
        for item in items {
            totals.subtotal = totals.subtotal.checked_add(item.total_price)?;
            totals.discount = totals.discount.checked_add(item.discount_amount)?;
            totals.tax = totals.tax.checked_add(item.tax_amount)?;
        }
        totals.total = totals.subtotal.saturating_sub(totals.discount).checked_add(totals.tax)?;
        Ok(totals)
    }
}
