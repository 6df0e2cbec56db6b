//! # Stock Status
//!
//! The single rule that classifies a stock level.
//!
//! ```text
//!  quantity ≤ 0            → OutOfStock
//!  0 < quantity ≤ minStock → LowStock
//!  quantity > minStock     → InStock
//! ```
//!
//! Every write of `Inventory.quantity` goes through this function, so a
//! stored status is always reproducible from the stored quantity.

use crate::types::StockStatus;

/// Derives the stock status for a quantity and reorder threshold.
///
/// Negative quantities only arise from manual corrections and are treated as
/// out of stock.
#[inline]
pub fn derive_status(quantity: i64, min_stock: i64) -> StockStatus {
    if quantity <= 0 {
        StockStatus::OutOfStock
    } else if quantity <= min_stock {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}
