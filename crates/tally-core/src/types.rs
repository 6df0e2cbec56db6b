//! # Domain Types
//!
//! Core domain types used throughout the Tally backend.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   Inventory     │   │      Bill       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  product_id     │   │  id             │       │
//! │  │  barcode        │   │  barcode        │   │  bill_number    │       │
//! │  │  stock (mirror) │◄──│  quantity  ★    │   │  items[]        │       │
//! │  │  price_cents    │   │  min_stock      │   │  totals         │       │
//! │  └─────────────────┘   │  status (derived)│  │  payment_*      │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ★ Inventory.quantity is authoritative. Product.stock is a read-mirror. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Document Shape
//! All types serialize with camelCase field names. They are stored as JSON
//! documents, so the serialized names double as query field names
//! (`productId`, `billNumber`, ...). Optional fields serialize as `null`
//! rather than being skipped so equality queries on `null` behave.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::stock::derive_status;

/// Generates a new document id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Stock Status
// =============================================================================

/// Stock level classification of an inventory record.
///
/// Never set independently: always the result of
/// [`derive_status`](crate::stock::derive_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Wire name, as stored in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,

    /// Display name shown to cashier and on bills.
    pub name: String,

    pub category: Option<String>,

    /// Selling price in minor units.
    pub price_cents: i64,

    /// Read-mirror of the authoritative inventory quantity.
    pub stock: i64,

    /// Barcode (EAN-13, UPC-A, etc.), unique when present.
    pub barcode: Option<String>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// The authoritative stock record for one product or barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,

    /// Product this stock belongs to. `None` for barcode registrations that
    /// no catalog product claims yet.
    pub product_id: Option<String>,

    pub barcode: Option<String>,

    /// Units on hand. Corrections may leave this negative.
    pub quantity: i64,

    /// Reorder threshold.
    pub min_stock: i64,

    pub status: StockStatus,

    pub location: Option<String>,

    pub warehouse: Option<String>,

    /// Set on every quantity change.
    #[ts(as = "String")]
    pub last_restocked: DateTime<Utc>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    /// Creates a record with its status already derived.
    pub fn new(
        product_id: Option<String>,
        barcode: Option<String>,
        quantity: i64,
        min_stock: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Inventory {
            id: new_id(),
            product_id,
            barcode,
            quantity,
            min_stock,
            status: derive_status(quantity, min_stock),
            location: None,
            warehouse: None,
            last_restocked: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Writes a new quantity and the status that goes with it.
    ///
    /// The only way quantity changes on an in-memory record, so the status
    /// can never be left behind.
    pub fn set_quantity(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity = quantity;
        self.status = derive_status(quantity, self.min_stock);
        self.last_restocked = now;
        self.updated_at = now;
    }

    /// Human-readable reference for messages: barcode, then product, then id.
    pub fn label(&self) -> &str {
        self.barcode
            .as_deref()
            .or(self.product_id.as_deref())
            .unwrap_or(&self.id)
    }
}

// =============================================================================
// Payment Method / Status
// =============================================================================

/// How a bill was paid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    BankTransfer,
    /// Store credit / pay later.
    Credit,
}

impl PaymentMethod {
    /// Wire name, as stored in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Credit => "credit",
        }
    }
}

/// Settlement state of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

// =============================================================================
// Stock Line
// =============================================================================

/// One stock movement request: which item and how many units.
///
/// Resolution order is barcode first, then product id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub name: String,
}

impl StockLine {
    /// Name for messages, falling back to whichever reference is present.
    pub fn label(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.barcode
            .as_deref()
            .or(self.product_id.as_deref())
            .unwrap_or("unknown item")
    }
}

// =============================================================================
// Bill
// =============================================================================

/// A line on a bill. Frozen at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    pub product_id: Option<String>,
    pub barcode: Option<String>,
    /// Product name at time of sale.
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// `unit_price_cents × quantity`.
    pub line_total_cents: i64,
}

impl BillItem {
    /// Builds a line, computing its total.
    pub fn new(
        product_id: Option<String>,
        barcode: Option<String>,
        name: impl Into<String>,
        unit_price_cents: i64,
        quantity: i64,
    ) -> Self {
        BillItem {
            product_id,
            barcode,
            name: name.into(),
            unit_price_cents,
            quantity,
            line_total_cents: Money::from_cents(unit_price_cents)
                .multiply_quantity(quantity)
                .cents(),
        }
    }

    /// The stock movement this line represents.
    pub fn stock_line(&self) -> StockLine {
        StockLine {
            barcode: self.barcode.clone(),
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            name: self.name.clone(),
        }
    }

    /// Key used to group sales of the same product across bills.
    pub fn product_key(&self) -> &str {
        self.product_id
            .as_deref()
            .or(self.barcode.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Monetary totals of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    pub total_cents: i64,
}

impl BillTotals {
    /// Checks `total = subtotal + tax - discount` and that no component is
    /// negative.
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("subtotal", self.subtotal_cents),
            ("tax", self.tax_cents),
            ("discount", self.discount_cents),
            ("total", self.total_cents),
        ] {
            if value < 0 {
                return Err(ValidationError::MustNotBeNegative {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let expected = self
            .subtotal_cents
            .checked_add(self.tax_cents)
            .and_then(|v| v.checked_sub(self.discount_cents));
        if expected != Some(self.total_cents) {
            return Err(CoreError::InconsistentTotals {
                subtotal: self.subtotal_cents,
                tax: self.tax_cents,
                discount: self.discount_cents,
                total: self.total_cents,
            });
        }

        Ok(())
    }
}

/// A completed sale.
///
/// Line items and totals are immutable after creation; only `notes`,
/// `customer_name` and `customer_phone` may change later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,

    /// Unique, human-readable number printed on the bill.
    pub bill_number: String,

    /// Cashier / shop account that created the bill.
    pub user_id: String,

    pub items: Vec<BillItem>,

    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,

    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,

    /// Cash handed over by the customer, when recorded.
    pub amount_received_cents: Option<i64>,

    /// `amount_received - total`, when amount received is recorded.
    pub change_cents: Option<i64>,

    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,

    /// Soft delete flag. Deleting never restores stock.
    pub is_deleted: bool,

    /// Set when the bill was voided and its stock restored.
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    /// Whether this bill counts towards revenue statistics.
    pub fn counts_as_sale(&self) -> bool {
        !self.is_deleted && self.voided_at.is_none()
    }

    pub fn totals(&self) -> BillTotals {
        BillTotals {
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            discount_cents: self.discount_cents,
            total_cents: self.total_cents,
        }
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A repeat customer, keyed by phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub phone: String,
    pub visit_count: i64,
    pub total_spent_cents: i64,
    #[ts(as = "String")]
    pub last_visit_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(subtotal: i64, tax: i64, discount: i64, total: i64) -> BillTotals {
        BillTotals {
            subtotal_cents: subtotal,
            tax_cents: tax,
            discount_cents: discount,
            total_cents: total,
        }
    }

    #[test]
    fn test_bill_totals_invariant() {
        assert!(totals(1000, 180, 80, 1100).validate().is_ok());
        assert!(totals(0, 0, 0, 0).validate().is_ok());

        let err = totals(1000, 180, 80, 1180).validate().unwrap_err();
        assert!(matches!(err, CoreError::InconsistentTotals { total: 1180, .. }));

        let err = totals(1000, -5, 0, 995).validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // overflowing sum is inconsistent, not a panic
        let err = totals(i64::MAX, 1, 0, i64::MAX).validate().unwrap_err();
        assert!(matches!(err, CoreError::InconsistentTotals { .. }));
    }

    #[test]
    fn test_bill_item_line_total() {
        let item = BillItem::new(None, Some("890123".into()), "Tea 250g", 4550, 3);
        assert_eq!(item.line_total_cents, 13650);
        assert_eq!(item.product_key(), "890123");
        assert_eq!(item.stock_line().quantity, 3);
    }

    #[test]
    fn test_inventory_set_quantity_rederives_status() {
        let now = Utc::now();
        let mut inv = Inventory::new(Some("p1".into()), None, 12, 10, now);
        assert_eq!(inv.status, StockStatus::InStock);

        inv.set_quantity(9, now);
        assert_eq!(inv.status, StockStatus::LowStock);

        inv.set_quantity(0, now);
        assert_eq!(inv.status, StockStatus::OutOfStock);
    }

    #[test]
    fn test_document_field_names_are_camel_case() {
        let inv = Inventory::new(Some("p1".into()), Some("b1".into()), 1, 10, Utc::now());
        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["productId"], "p1");
        assert_eq!(json["minStock"], 10);
        assert_eq!(json["status"], "low_stock");
        assert!(json["location"].is_null());
    }

    #[test]
    fn test_stock_line_label_fallbacks() {
        let line = StockLine {
            barcode: None,
            product_id: Some("p9".into()),
            quantity: 1,
            name: String::new(),
        };
        assert_eq!(line.label(), "p9");
    }
}
