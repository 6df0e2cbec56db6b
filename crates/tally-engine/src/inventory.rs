//! # Inventory Ledger
//!
//! The single mutator of `Inventory.quantity`, its derived `status`, and the
//! `Product.stock` mirror.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  restock / sale / correction                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. atomic increment of quantity in the store                          │
//! │     (sales: guarded, quantity never drops below zero)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. settle: status = derive_status(quantity, minStock),                │
//! │     lastRestocked, metadata                      (follow-up write)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. mirror quantity onto Product.stock                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. invalidate inventory + product views         (best-effort)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step 1 is the only step that can lose an update, and it is atomic. Steps
//! 2 and 3 may lag a concurrent writer momentarily; the next mutation of the
//! record re-derives them.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tally_core::validation::{
    normalize_optional, validate_barcode, validate_item_reference, validate_min_stock,
    validate_stock_lines, validate_stock_quantity,
};
use tally_core::{CoreError, Inventory, Product, StockLine, StockStatus, DEFAULT_MIN_STOCK};
use tally_db::{Collection, IncrementOutcome, Query, RecordStore};
use tracing::{debug, error, info, warn};

use crate::coherence::{CacheCoherence, CacheKey, Change};
use crate::error::{EngineError, EngineResult};

const QUANTITY: &str = "quantity";

// =============================================================================
// Inputs and Reports
// =============================================================================

/// Stock arriving for a product or barcode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRegistration {
    pub product_id: Option<String>,
    pub barcode: Option<String>,
    /// Units added. Accumulates onto an existing record.
    #[serde(default)]
    pub quantity: i64,
    pub min_stock: Option<i64>,
    pub location: Option<String>,
    pub warehouse: Option<String>,
}

/// Filters for inventory listings. All empty means the cached full list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryFilter {
    pub status: Option<StockStatus>,
    pub location: Option<String>,
    pub warehouse: Option<String>,
    pub product_id: Option<String>,
}

impl InventoryFilter {
    /// Trims text filters; blank ones are dropped.
    pub fn normalized(self) -> Self {
        InventoryFilter {
            status: self.status,
            location: normalize_optional(self.location.as_deref()),
            warehouse: normalize_optional(self.warehouse.as_deref()),
            product_id: normalize_optional(self.product_id.as_deref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.location.is_none()
            && self.warehouse.is_none()
            && self.product_id.is_none()
    }

    fn to_query(&self) -> Query {
        let mut query = Query::new().newest_first();
        if let Some(status) = self.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(location) = &self.location {
            query = query.eq("location", location.as_str());
        }
        if let Some(warehouse) = &self.warehouse {
            query = query.eq("warehouse", warehouse.as_str());
        }
        if let Some(product_id) = &self.product_id {
            query = query.eq("productId", product_id.as_str());
        }
        query
    }
}

/// One applied stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub inventory_id: String,
    pub product_id: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    /// Units moved (always positive).
    pub quantity: i64,
    /// Quantity on hand after the movement.
    pub remaining: i64,
    pub status: StockStatus,
}

impl StockMovement {
    fn new(inv: &Inventory, line: &StockLine) -> Self {
        StockMovement {
            inventory_id: inv.id.clone(),
            product_id: inv.product_id.clone(),
            barcode: inv.barcode.clone(),
            name: line.label().to_string(),
            quantity: line.quantity,
            remaining: inv.quantity,
            status: inv.status,
        }
    }
}

/// One line that could not be moved, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub product_id: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    pub requested: i64,
    pub error: String,
}

impl ItemFailure {
    fn new(line: &StockLine, error: String) -> Self {
        ItemFailure {
            product_id: line.product_id.clone(),
            barcode: line.barcode.clone(),
            name: line.label().to_string(),
            requested: line.quantity,
            error,
        }
    }
}

/// Outcome of [`InventoryLedger::deduct_for_bill`]: every line lands in
/// exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductionReport {
    pub deducted: Vec<StockMovement>,
    pub errors: Vec<ItemFailure>,
}

/// Outcome of [`InventoryLedger::restock_for_void`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockReport {
    pub restocked: Vec<StockMovement>,
    pub errors: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Deduct,
    Restock,
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// Owns stock quantities and everything derived from them.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    inventory: Collection<Inventory>,
    products: Collection<Product>,
    cache: CacheCoherence,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn RecordStore>, cache: CacheCoherence) -> Self {
        InventoryLedger {
            inventory: Collection::new(store.clone()),
            products: Collection::new(store),
            cache,
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Adds stock to the record for a product or barcode, creating the record
    /// on first registration.
    ///
    /// Lookup is by barcode, then by product id, so a product never gains a
    /// second record. Supplied metadata overwrites; absent metadata is kept.
    pub async fn find_or_create(&self, registration: StockRegistration) -> EngineResult<Inventory> {
        let reg = Registration::normalize(registration)?;

        // A concurrent registration of the same item may win the insert; the
        // retry then finds its record and accumulates onto it.
        let mut attempt = 0;
        loop {
            attempt += 1;

            if let Some(existing) = self
                .lookup(reg.barcode.as_deref(), reg.product_id.as_deref())
                .await?
            {
                return self.accumulate(existing, &reg).await;
            }

            match self.create(&reg).await {
                Err(EngineError::Conflict(reason)) if attempt < 2 => {
                    debug!(reason = %reason, "Lost registration race, retrying lookup");
                }
                other => return other,
            }
        }
    }

    /// Applies a signed correction. The result may be negative and is stored
    /// as-is.
    pub async fn adjust_quantity(&self, inventory_id: &str, delta: i64) -> EngineResult<Inventory> {
        let mut inv = match self
            .inventory
            .increment(inventory_id, QUANTITY, delta, None)
            .await?
        {
            IncrementOutcome::Applied(inv) | IncrementOutcome::Rejected(inv) => inv,
            IncrementOutcome::Missing => {
                return Err(EngineError::not_found("Inventory", inventory_id))
            }
        };

        inv.set_quantity(inv.quantity, Utc::now());
        self.settle(&inv).await?;

        info!(
            inventory_id = %inv.id,
            delta,
            quantity = inv.quantity,
            status = inv.status.as_str(),
            "Inventory adjusted"
        );
        Ok(inv)
    }

    /// Deducts each sold line independently.
    ///
    /// Unknown items and insufficient stock are reported per line in
    /// `errors`; a line is either deducted in full or not at all. Only
    /// structurally invalid input (no lines) fails the call.
    pub async fn deduct_for_bill(&self, lines: &[StockLine]) -> EngineResult<DeductionReport> {
        validate_stock_lines(lines)?;

        let mut report = DeductionReport::default();
        for line in lines {
            match self.move_line(line, Direction::Deduct).await {
                Ok(movement) => report.deducted.push(movement),
                Err(reason) => {
                    warn!(item = line.label(), reason = %reason, "Stock deduction failed for item");
                    report.errors.push(ItemFailure::new(line, reason));
                }
            }
        }

        info!(
            deducted = report.deducted.len(),
            failed = report.errors.len(),
            "Bill stock deducted"
        );
        Ok(report)
    }

    /// Returns sold lines to stock, the inverse of
    /// [`deduct_for_bill`](Self::deduct_for_bill).
    pub async fn restock_for_void(&self, lines: &[StockLine]) -> EngineResult<RestockReport> {
        validate_stock_lines(lines)?;

        let mut report = RestockReport::default();
        for line in lines {
            match self.move_line(line, Direction::Restock).await {
                Ok(movement) => report.restocked.push(movement),
                Err(reason) => {
                    warn!(item = line.label(), reason = %reason, "Restock failed for item");
                    report.errors.push(ItemFailure::new(line, reason));
                }
            }
        }

        info!(
            restocked = report.restocked.len(),
            failed = report.errors.len(),
            "Voided bill restocked"
        );
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Inventory record by id, cache first.
    pub async fn get(&self, inventory_id: &str) -> EngineResult<Inventory> {
        let key = CacheKey::Inventory(inventory_id.to_string());
        if let Some(inv) = self.cache.get(&key).await {
            return Ok(inv);
        }

        let inv = self.inventory.require(inventory_id).await?;
        self.cache.put(&key, &inv).await;
        Ok(inv)
    }

    /// Inventory record by barcode, cache first.
    pub async fn get_by_barcode(&self, barcode: &str) -> EngineResult<Inventory> {
        let key = CacheKey::InventoryByBarcode(barcode.to_string());
        if let Some(inv) = self.cache.get(&key).await {
            return Ok(inv);
        }

        let inv = self
            .inventory
            .find_one(&Query::by("barcode", barcode))
            .await?
            .ok_or_else(|| EngineError::not_found("Inventory", barcode))?;
        self.cache.put(&key, &inv).await;
        Ok(inv)
    }

    /// Product by id, cache first. Its `stock` is the mirrored quantity.
    pub async fn product(&self, product_id: &str) -> EngineResult<Product> {
        let key = CacheKey::Product(product_id.to_string());
        if let Some(product) = self.cache.get(&key).await {
            return Ok(product);
        }

        let product = self.products.require(product_id).await?;
        self.cache.put(&key, &product).await;
        Ok(product)
    }

    /// Product by barcode, cache first.
    pub async fn product_by_barcode(&self, barcode: &str) -> EngineResult<Product> {
        let key = CacheKey::ProductByBarcode(barcode.to_string());
        if let Some(product) = self.cache.get(&key).await {
            return Ok(product);
        }

        let product = self
            .products
            .find_one(&Query::by("barcode", barcode))
            .await?
            .ok_or_else(|| EngineError::not_found("Product", barcode))?;
        self.cache.put(&key, &product).await;
        Ok(product)
    }

    /// Inventory records, newest first.
    ///
    /// The unfiltered list is served from cache; any filter goes straight
    /// to the store.
    pub async fn get_inventory_list(&self, filter: &InventoryFilter) -> EngineResult<Vec<Inventory>> {
        let filter = filter.clone().normalized();
        if !filter.is_empty() {
            debug!(?filter, "Filtered inventory list, bypassing cache");
            return Ok(self.inventory.find(&filter.to_query()).await?);
        }

        let key = CacheKey::InventoryList;
        if let Some(list) = self.cache.get(&key).await {
            return Ok(list);
        }

        let list = self.inventory.find(&filter.to_query()).await?;
        self.cache.put(&key, &list).await;
        Ok(list)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Barcode first, then product id. A bare barcode that no record carries
    /// falls back to the record of the product with that barcode.
    async fn lookup(
        &self,
        barcode: Option<&str>,
        product_id: Option<&str>,
    ) -> EngineResult<Option<Inventory>> {
        if let Some(barcode) = barcode {
            if let Some(inv) = self.inventory.find_one(&Query::by("barcode", barcode)).await? {
                return Ok(Some(inv));
            }
        }

        let product_id = match (product_id, barcode) {
            (Some(product_id), _) => Some(product_id.to_string()),
            (None, Some(barcode)) => self.product_id_for_barcode(barcode).await?,
            (None, None) => None,
        };
        match product_id {
            Some(product_id) => Ok(self
                .inventory
                .find_one(&Query::by("productId", product_id))
                .await?),
            None => Ok(None),
        }
    }

    /// Product the registration refers to: the given id, else the product
    /// carrying the barcode.
    async fn resolve_product_id(&self, reg: &Registration) -> EngineResult<Option<String>> {
        if reg.product_id.is_some() {
            return Ok(reg.product_id.clone());
        }
        match reg.barcode.as_deref() {
            Some(barcode) => self.product_id_for_barcode(barcode).await,
            None => Ok(None),
        }
    }

    async fn product_id_for_barcode(&self, barcode: &str) -> EngineResult<Option<String>> {
        Ok(self
            .products
            .find_one(&Query::by("barcode", barcode))
            .await?
            .map(|p| p.id))
    }

    /// Product id an existing record without one may take on. `None` when
    /// another record already stocks that product.
    async fn adoptable_product_id(
        &self,
        existing: &Inventory,
        reg: &Registration,
    ) -> EngineResult<Option<String>> {
        if existing.product_id.is_some() {
            return Ok(None);
        }
        let Some(product_id) = self.resolve_product_id(reg).await? else {
            return Ok(None);
        };

        match self
            .inventory
            .find_one(&Query::by("productId", product_id.as_str()))
            .await?
        {
            Some(other) if other.id != existing.id => {
                warn!(
                    inventory_id = %existing.id,
                    other_id = %other.id,
                    product_id = %product_id,
                    "Product already stocked by another record, not linking"
                );
                Ok(None)
            }
            _ => Ok(Some(product_id)),
        }
    }

    async fn create(&self, reg: &Registration) -> EngineResult<Inventory> {
        let product_id = self.resolve_product_id(reg).await?;
        let mut inv = Inventory::new(
            product_id,
            reg.barcode.clone(),
            reg.quantity,
            reg.min_stock.unwrap_or(DEFAULT_MIN_STOCK),
            Utc::now(),
        );
        inv.location = reg.location.clone();
        inv.warehouse = reg.warehouse.clone();

        let inv = self.inventory.insert(&inv).await?;
        let product = self.mirror(&inv).await?;
        self.cache
            .invalidate(&Change::inventory(&inv, product.as_ref()))
            .await;

        info!(
            inventory_id = %inv.id,
            product_id = ?inv.product_id,
            barcode = ?inv.barcode,
            quantity = inv.quantity,
            "Inventory created"
        );
        Ok(inv)
    }

    async fn accumulate(&self, existing: Inventory, reg: &Registration) -> EngineResult<Inventory> {
        let adopted_product = self.adoptable_product_id(&existing, reg).await?;

        let mut inv = match self
            .inventory
            .increment(&existing.id, QUANTITY, reg.quantity, None)
            .await?
        {
            IncrementOutcome::Applied(inv) | IncrementOutcome::Rejected(inv) => inv,
            IncrementOutcome::Missing => return Err(EngineError::not_found("Inventory", existing.id)),
        };

        if let Some(min_stock) = reg.min_stock {
            inv.min_stock = min_stock;
        }
        if reg.location.is_some() {
            inv.location = reg.location.clone();
        }
        if reg.warehouse.is_some() {
            inv.warehouse = reg.warehouse.clone();
        }
        // identity fields are filled in, never replaced
        if inv.barcode.is_none() {
            inv.barcode = reg.barcode.clone();
        }
        if inv.product_id.is_none() {
            inv.product_id = adopted_product;
        }

        inv.set_quantity(inv.quantity, Utc::now());
        self.settle(&inv).await?;

        info!(
            inventory_id = %inv.id,
            added = reg.quantity,
            quantity = inv.quantity,
            status = inv.status.as_str(),
            "Inventory restocked"
        );
        Ok(inv)
    }

    /// Moves one line's stock. Errors are per-item messages.
    async fn move_line(&self, line: &StockLine, direction: Direction) -> Result<StockMovement, String> {
        if line.quantity <= 0 {
            return Err(format!("quantity must be positive, got {}", line.quantity));
        }

        let barcode = normalize_optional(line.barcode.as_deref());
        let product_id = normalize_optional(line.product_id.as_deref());

        let existing = self
            .lookup(barcode.as_deref(), product_id.as_deref())
            .await
            .map_err(|e| {
                error!(item = line.label(), error = %e, "Inventory lookup failed");
                format!("could not read inventory: {e}")
            })?
            .ok_or_else(|| format!("Inventory not found for {}", line.label()))?;

        let (delta, floor) = match direction {
            Direction::Deduct => (-line.quantity, Some(0)),
            Direction::Restock => (line.quantity, None),
        };

        let outcome = self
            .inventory
            .increment(&existing.id, QUANTITY, delta, floor)
            .await
            .map_err(|e| {
                error!(inventory_id = %existing.id, error = %e, "Stock increment failed");
                format!("could not update inventory: {e}")
            })?;

        let mut inv = match outcome {
            IncrementOutcome::Applied(inv) => inv,
            IncrementOutcome::Rejected(current) => {
                return Err(CoreError::InsufficientStock {
                    item: line.label().to_string(),
                    available: current.quantity,
                    requested: line.quantity,
                }
                .to_string())
            }
            IncrementOutcome::Missing => {
                return Err(format!("Inventory not found for {}", line.label()))
            }
        };

        inv.set_quantity(inv.quantity, Utc::now());
        // The units have moved; a failed follow-up write only leaves derived
        // fields stale until the next mutation of this record.
        if let Err(e) = self.settle(&inv).await {
            error!(inventory_id = %inv.id, error = %e, "Stock moved but derived fields not persisted");
        }

        debug!(
            inventory_id = %inv.id,
            delta,
            quantity = inv.quantity,
            "Stock line applied"
        );
        Ok(StockMovement::new(&inv, line))
    }

    /// Persists everything derived from a freshly written quantity (status,
    /// timestamps, metadata), mirrors it onto the product, and invalidates
    /// the affected views. The quantity itself is not rewritten.
    async fn settle(&self, inv: &Inventory) -> EngineResult<()> {
        let patch = json!({
            "status": inv.status,
            "minStock": inv.min_stock,
            "location": inv.location,
            "warehouse": inv.warehouse,
            "barcode": inv.barcode,
            "productId": inv.product_id,
            "lastRestocked": inv.last_restocked,
            "updatedAt": inv.updated_at,
        });

        let written = match self.inventory.update(&inv.id, patch).await {
            Ok(_) => self.mirror(inv).await,
            Err(e) => Err(e.into()),
        };

        let product = written.as_ref().ok().and_then(Option::as_ref);
        self.cache
            .invalidate(&Change::inventory(inv, product))
            .await;

        written.map(|_| ())
    }

    /// Copies the quantity onto the product's `stock`. Returns the updated
    /// product, or `None` when the record has no product or it is gone.
    async fn mirror(&self, inv: &Inventory) -> EngineResult<Option<Product>> {
        let Some(product_id) = inv.product_id.as_deref() else {
            return Ok(None);
        };

        let product = self
            .products
            .update(
                product_id,
                json!({ "stock": inv.quantity, "updatedAt": inv.updated_at }),
            )
            .await?;

        if product.is_none() {
            debug!(product_id, "No product to mirror stock onto");
        }
        Ok(product)
    }
}

// =============================================================================
// Registration Normalization
// =============================================================================

/// A validated, trimmed [`StockRegistration`].
#[derive(Debug)]
struct Registration {
    product_id: Option<String>,
    barcode: Option<String>,
    quantity: i64,
    min_stock: Option<i64>,
    location: Option<String>,
    warehouse: Option<String>,
}

impl Registration {
    fn normalize(reg: StockRegistration) -> EngineResult<Self> {
        let product_id = normalize_optional(reg.product_id.as_deref());
        let barcode = normalize_optional(reg.barcode.as_deref());

        validate_item_reference(product_id.as_deref(), barcode.as_deref())?;
        if let Some(barcode) = &barcode {
            validate_barcode(barcode)?;
        }
        validate_stock_quantity(reg.quantity)?;
        if let Some(min_stock) = reg.min_stock {
            validate_min_stock(min_stock)?;
        }

        Ok(Registration {
            product_id,
            barcode,
            quantity: reg.quantity,
            min_stock: reg.min_stock,
            location: normalize_optional(reg.location.as_deref()),
            warehouse: normalize_optional(reg.warehouse.as_deref()),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
