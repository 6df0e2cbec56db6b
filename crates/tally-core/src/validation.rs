//! # Validation Module
//!
//! Input validation for inventory registrations, stock movements and bills.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP adapter                                                 │
//! │  └── Type validation (JSON deserialization)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: tally-engine                                                 │
//! │  └── THIS MODULE: business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Document store                                               │
//! │  └── Unique indexes (barcode, productId, billNumber, phone)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_item_reference, validate_quantity};
//!
//! validate_quantity(5).unwrap();
//! assert!(validate_item_reference(None, None).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::StockLine;
use crate::{MAX_AMOUNT_CENTS, MAX_BILL_ITEMS, MAX_LINE_QUANTITY, MAX_PAGE_SIZE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Trims an optional string, treating blank as absent.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates a required, non-blank string field and returns it trimmed.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(value.to_string())
}

/// Validates a barcode.
///
/// ## Rules
/// - Must not be blank
/// - At most 64 characters, no whitespace
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_barcode;
///
/// assert!(validate_barcode("8901234567890").is_ok());
/// assert!(validate_barcode("89 01").is_err());
/// assert!(validate_barcode("").is_err());
/// ```
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    if barcode.trim().is_empty() {
        return Err(ValidationError::required("barcode"));
    }

    if barcode.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 64,
        });
    }

    if barcode.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Requires at least one of product id or barcode.
pub fn validate_item_reference(
    product_id: Option<&str>,
    barcode: Option<&str>,
) -> ValidationResult<()> {
    let present = |v: Option<&str>| v.is_some_and(|v| !v.trim().is_empty());
    if !present(product_id) && !present(barcode) {
        return Err(ValidationError::OneOfRequired {
            fields: vec!["productId".to_string(), "barcode".to_string()],
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity that must be strictly positive (sales, restocks),
/// up to [`MAX_LINE_QUANTITY`].
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a stock quantity that may be zero (registrations).
pub fn validate_stock_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a reorder threshold.
pub fn validate_min_stock(min_stock: i64) -> ValidationResult<()> {
    if min_stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "minStock".to_string(),
        });
    }
    Ok(())
}

/// Validates a monetary amount in minor units, up to [`MAX_AMOUNT_CENTS`].
pub fn validate_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates pagination and returns `(page, limit)`.
///
/// ## Rules
/// - `page` starts at 1
/// - `limit` is between 1 and [`MAX_PAGE_SIZE`]
pub fn validate_pagination(page: u64, limit: u64) -> ValidationResult<(u64, u64)> {
    if page == 0 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }

    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_SIZE as i64,
        });
    }

    Ok((page, limit))
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates a batch of stock lines (bill deduction input).
///
/// ## Rules
/// - At least one line, at most [`MAX_BILL_ITEMS`]
///
/// Per-line problems (unknown item, bad quantity) are NOT rejected here:
/// they are reported per item by the ledger.
pub fn validate_stock_lines(lines: &[StockLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::required("items"));
    }

    if lines.len() > MAX_BILL_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_BILL_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: i64) -> StockLine {
        StockLine {
            barcode: Some("b".into()),
            product_id: None,
            quantity: qty,
            name: String::new(),
        }
    }

    #[test]
    fn test_validate_item_reference() {
        assert!(validate_item_reference(Some("p1"), None).is_ok());
        assert!(validate_item_reference(None, Some("890")).is_ok());
        assert!(validate_item_reference(Some("  "), None).is_err());
        assert!(matches!(
            validate_item_reference(None, None),
            Err(ValidationError::OneOfRequired { .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(
            validate_quantity(MAX_LINE_QUANTITY + 1),
            Err(ValidationError::OutOfRange { .. })
        ));

        assert!(validate_amount("taxCents", MAX_AMOUNT_CENTS).is_ok());
        assert!(matches!(
            validate_amount("unitPriceCents", MAX_AMOUNT_CENTS + 1),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "unitPriceCents"
        ));

        assert!(validate_stock_quantity(0).is_ok());
        assert!(validate_stock_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_pagination() {
        assert_eq!(validate_pagination(1, 20), Ok((1, 20)));
        assert!(validate_pagination(0, 20).is_err());
        assert!(validate_pagination(1, 0).is_err());
        assert!(validate_pagination(1, MAX_PAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_validate_stock_lines() {
        assert!(validate_stock_lines(&[]).is_err());
        // bad quantities are a per-item concern
        assert!(validate_stock_lines(&[line(-3)]).is_ok());

        let too_many: Vec<StockLine> = (0..=MAX_BILL_ITEMS).map(|_| line(1)).collect();
        assert!(validate_stock_lines(&too_many).is_err());
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  aisle 3 ")), Some("aisle 3".to_string()));
        assert_eq!(normalize_optional(Some("   ")), None);
        assert_eq!(normalize_optional(None), None);
        assert_eq!(validate_required("name", " x ").unwrap(), "x");
    }
}
