use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A storefront product variant. The primary variant's SKU is the identity
/// the reconciliation engine targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// A storefront product, read-only from this system's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    /// SKU of the primary variant, when present and non-empty.
    pub fn primary_sku(&self) -> Option<&str> {
        self.variants
            .first()
            .and_then(|v| v.sku.as_deref())
            .filter(|sku| !sku.is_empty())
    }
}

/// One page of a paginated product lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Cursor for the next page, `None` on the last page
    #[serde(default)]
    pub next: Option<String>,
}

/// One discount applied to a refunded line. Only the first allocation
/// participates in the credited rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountAllocation {
    pub amount: Decimal,
}

/// The sold line a refund line item points back at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundLineDetail {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub discount_allocations: Vec<DiscountAllocation>,
}

/// A returned quantity of one invoice line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundLineItem {
    pub line_item: RefundLineDetail,
    pub quantity: Decimal,
}

impl RefundLineItem {
    /// Per-unit credited rate: list price minus the per-unit share of the
    /// first discount allocation.
    pub fn credited_rate(&self) -> Decimal {
        match self.first_allocation() {
            Some(alloc) if !self.quantity.is_zero() => self.line_item.price - alloc / self.quantity,
            _ => self.line_item.price,
        }
    }

    /// Line price basis: list price minus the first discount allocation.
    pub fn price_basis(&self) -> Decimal {
        match self.first_allocation() {
            Some(alloc) => self.line_item.price - alloc,
            None => self.line_item.price,
        }
    }

    fn first_allocation(&self) -> Option<Decimal> {
        self.line_item.discount_allocations.first().map(|a| a.amount)
    }
}

/// An order-level adjustment (rounding, discrepancy) with no specific line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAdjustment {
    pub amount: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub kind: Option<String>,
}

/// A refund event delivered by the storefront, validated at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefundPayload {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[serde(default)]
    pub refund_line_items: Vec<RefundLineItem>,
    #[serde(default)]
    pub order_adjustments: Vec<OrderAdjustment>,
    /// When false, returned stock is not re-incremented
    #[serde(default = "default_restock")]
    pub restock: bool,
}

fn default_restock() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, qty: Decimal, alloc: Option<Decimal>) -> RefundLineItem {
        RefundLineItem {
            line_item: RefundLineDetail {
                sku: Some("SKU-1".into()),
                variant_id: None,
                price,
                discount_allocations: alloc
                    .into_iter()
                    .map(|amount| DiscountAllocation { amount })
                    .collect(),
            },
            quantity: qty,
        }
    }

    #[test]
    fn credited_rate_uses_first_allocation_per_unit() {
        let item = line(dec!(39.99), dec!(4), Some(dec!(15.99)));
        // 39.99 - 15.99/4
        assert_eq!(item.credited_rate(), dec!(35.9925));
        assert_eq!(item.price_basis(), dec!(24.00));
    }

    #[test]
    fn no_allocation_keeps_list_price() {
        let item = line(dec!(10.50), dec!(2), None);
        assert_eq!(item.credited_rate(), dec!(10.50));
        assert_eq!(item.price_basis(), dec!(10.50));
    }

    #[test]
    fn zero_quantity_does_not_divide() {
        let item = line(dec!(10), dec!(0), Some(dec!(2)));
        assert_eq!(item.credited_rate(), dec!(10));
    }
}
