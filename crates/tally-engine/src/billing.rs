//! # Billing Engine
//!
//! Creates bills, drives the matching stock movements through the
//! [`InventoryLedger`], and serves cached bill views and statistics.
//!
//! ## Bill Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create_bill ──► Completed ──┬── update_bill_metadata (notes, contact) │
//! │       │                       │                                         │
//! │       │ deduct stock          ├── delete_bill      soft, stock stays    │
//! │       ▼                       │                                         │
//! │   DeductionReport             └── void_and_restock stock returned,      │
//! │                                                   once only             │
//! │                                                                         │
//! │   Every transition invalidates the bill's keys, its owner's list       │
//! │   pages and all cached statistics.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Voided and deleted bills never count towards statistics, popular
//! products or exports.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_core::bill_number::{BillNumberGenerator, TimeBasedBillNumbers};
use tally_core::stats::{
    compute_stats, default_export_window, export_rows, rank_popular_products, BillExportRow,
    BillStats, MethodTotals, PopularProduct, StatsScope, TimeWindow,
};
use tally_core::validation::{
    normalize_optional, validate_amount, validate_pagination, validate_quantity,
    validate_required,
};
use tally_core::{
    new_id, Bill, BillItem, BillTotals, Customer, Money, PaymentMethod, PaymentStatus, StockLine,
    ValidationError, MAX_AMOUNT_CENTS, MAX_BILL_ITEMS,
};
use tally_db::{Collection, DbError, IncrementOutcome, Query, RecordStore};
use tracing::{debug, error, info, warn};

use crate::coherence::{CacheCoherence, CacheKey, Change};
use crate::error::{EngineError, EngineResult};
use crate::inventory::{DeductionReport, InventoryLedger, RestockReport};

/// Attempts at finding a free bill number before giving up.
const BILL_NUMBER_ATTEMPTS: usize = 5;

/// Spent once when a bill is voided: 0 unclaimed, -1 claimed.
const VOID_CLAIM: &str = "voidClaim";

// =============================================================================
// Inputs
// =============================================================================

/// A line as submitted by the till.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBillItem {
    pub product_id: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit_price_cents: i64,
    #[serde(default)]
    pub quantity: i64,
}

/// A bill as submitted by the till.
///
/// `subtotal_cents` and `total_cents` are optional; when present they must
/// agree with the lines and with `subtotal + tax - discount`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    #[serde(default)]
    pub items: Vec<NewBillItem>,
    pub subtotal_cents: Option<i64>,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    pub total_cents: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub amount_received_cents: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
}

/// Fields that may change on an existing bill. `Some("")` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillMetadataPatch {
    pub notes: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

impl BillMetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.customer_name.is_none() && self.customer_phone.is_none()
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// A persisted bill and the stock movements it caused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBill {
    pub bill: Bill,
    pub stock: DeductionReport,
}

/// A voided bill and the stock it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidedBill {
    pub bill: Bill,
    pub stock: RestockReport,
}

/// One page of a user's bills, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPage {
    pub bills: Vec<Bill>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

// =============================================================================
// Billing Engine
// =============================================================================

/// Bill creation, bill views and sales statistics.
#[derive(Clone)]
pub struct BillingEngine {
    bills: Collection<Bill>,
    customers: Collection<Customer>,
    ledger: Arc<InventoryLedger>,
    cache: CacheCoherence,
    numbers: Arc<dyn BillNumberGenerator>,
}

impl fmt::Debug for BillingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingEngine")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl BillingEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<InventoryLedger>,
        cache: CacheCoherence,
    ) -> Self {
        BillingEngine {
            bills: Collection::new(store.clone()),
            customers: Collection::new(store),
            ledger,
            cache,
            numbers: Arc::new(TimeBasedBillNumbers::new()),
        }
    }

    /// Replaces the bill number source.
    pub fn with_bill_numbers(mut self, numbers: Arc<dyn BillNumberGenerator>) -> Self {
        self.numbers = numbers;
        self
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Persists a completed bill for `user_id` and deducts its stock.
    ///
    /// Per-item stock problems do not fail the bill; they are returned in
    /// [`CreatedBill::stock`].
    pub async fn create_bill(&self, user_id: &str, new: NewBill) -> EngineResult<CreatedBill> {
        let user_id = validate_required("userId", user_id)?;
        let now = Utc::now();
        let draft = BillDraft::build(new)?;

        let bill = self.insert_with_fresh_number(&user_id, draft, now).await?;
        self.cache.invalidate(&Change::bill(&bill)).await;

        info!(
            bill_id = %bill.id,
            bill_number = %bill.bill_number,
            user_id = %bill.user_id,
            items = bill.items.len(),
            total_cents = bill.total_cents,
            "Bill created"
        );

        let lines: Vec<StockLine> = bill.items.iter().map(BillItem::stock_line).collect();
        let stock = self.ledger.deduct_for_bill(&lines).await?;

        if let Err(e) = self.record_visit(&bill).await {
            warn!(bill_number = %bill.bill_number, error = %e, "Customer visit not recorded");
        }

        Ok(CreatedBill { bill, stock })
    }

    /// Changes notes or customer contact. Lines and totals are immutable.
    pub async fn update_bill_metadata(
        &self,
        bill_id: &str,
        patch: BillMetadataPatch,
    ) -> EngineResult<Bill> {
        if patch.is_empty() {
            return Err(ValidationError::OneOfRequired {
                fields: vec![
                    "notes".to_string(),
                    "customerName".to_string(),
                    "customerPhone".to_string(),
                ],
            }
            .into());
        }

        self.live_bill(bill_id).await?;

        let mut body = json!({ "updatedAt": Utc::now() });
        for (field, value) in [
            ("notes", &patch.notes),
            ("customerName", &patch.customer_name),
            ("customerPhone", &patch.customer_phone),
        ] {
            if let Some(value) = value {
                body[field] = json!(normalize_optional(Some(value.as_str())));
            }
        }

        let bill = self
            .bills
            .update(bill_id, body)
            .await?
            .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
        self.cache.invalidate(&Change::bill(&bill)).await;

        info!(bill_id = %bill.id, bill_number = %bill.bill_number, "Bill metadata updated");
        Ok(bill)
    }

    /// Soft-deletes a bill. Its stock deduction is NOT reversed; use
    /// [`void_and_restock`](Self::void_and_restock) for that.
    pub async fn delete_bill(&self, bill_id: &str) -> EngineResult<Bill> {
        self.live_bill(bill_id).await?;

        let bill = self
            .bills
            .update(bill_id, json!({ "isDeleted": true, "updatedAt": Utc::now() }))
            .await?
            .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
        self.cache.invalidate(&Change::bill(&bill)).await;

        info!(
            bill_id = %bill.id,
            bill_number = %bill.bill_number,
            "Bill deleted, stock left as is"
        );
        Ok(bill)
    }

    /// Voids a bill and returns its lines to stock. A bill can be voided
    /// once.
    pub async fn void_and_restock(&self, bill_id: &str) -> EngineResult<VoidedBill> {
        let bill = self.live_bill(bill_id).await?;

        match self.bills.increment(bill_id, VOID_CLAIM, -1, Some(-1)).await? {
            IncrementOutcome::Applied(_) => {}
            IncrementOutcome::Rejected(_) => {
                return Err(EngineError::Conflict(format!(
                    "Bill {} is already voided",
                    bill.bill_number
                )))
            }
            IncrementOutcome::Missing => return Err(EngineError::not_found("Bill", bill_id)),
        }

        let now = Utc::now();
        let marked = self
            .bills
            .update(bill_id, json!({ "voidedAt": now, "updatedAt": now }))
            .await;
        let bill = match marked {
            Ok(Some(bill)) => bill,
            Ok(None) => {
                self.release_void_claim(bill_id).await;
                return Err(EngineError::not_found("Bill", bill_id));
            }
            Err(e) => {
                self.release_void_claim(bill_id).await;
                return Err(e.into());
            }
        };
        self.cache.invalidate(&Change::bill(&bill)).await;

        let lines: Vec<StockLine> = bill.items.iter().map(BillItem::stock_line).collect();
        let stock = self.ledger.restock_for_void(&lines).await?;

        info!(
            bill_id = %bill.id,
            bill_number = %bill.bill_number,
            restocked = stock.restocked.len(),
            failed = stock.errors.len(),
            "Bill voided"
        );
        Ok(VoidedBill { bill, stock })
    }

    /// Hands back a claim whose `voidedAt` write failed, so the void can be
    /// retried.
    async fn release_void_claim(&self, bill_id: &str) {
        match self.bills.increment(bill_id, VOID_CLAIM, 1, None).await {
            Ok(_) => debug!(bill_id, "Void claim released"),
            Err(e) => error!(
                bill_id,
                error = %e,
                "Void claim not released, bill cannot be voided again"
            ),
        }
    }

    // -------------------------------------------------------------------------
    // Bill Views
    // -------------------------------------------------------------------------

    /// Bill by id, cache first. Deleted bills are not found.
    pub async fn get_bill(&self, bill_id: &str) -> EngineResult<Bill> {
        let key = CacheKey::Bill(bill_id.to_string());
        if let Some(bill) = self.cache.get(&key).await {
            return Ok(bill);
        }

        let bill = self.live_bill(bill_id).await?;
        self.cache.put(&key, &bill).await;
        Ok(bill)
    }

    /// Bill by its printed number, cache first.
    pub async fn get_bill_by_number(&self, bill_number: &str) -> EngineResult<Bill> {
        let key = CacheKey::BillByNumber(bill_number.to_string());
        if let Some(bill) = self.cache.get(&key).await {
            return Ok(bill);
        }

        let bill = self
            .bills
            .find_one(&Query::by("billNumber", bill_number).eq("isDeleted", false))
            .await?
            .ok_or_else(|| EngineError::not_found("Bill", bill_number))?;
        self.cache.put(&key, &bill).await;
        Ok(bill)
    }

    /// One page of the user's bills, newest first. Voided bills are listed;
    /// deleted ones are not.
    pub async fn list_bills(&self, user_id: &str, page: u64, limit: u64) -> EngineResult<BillPage> {
        let (page, limit) = validate_pagination(page, limit)?;

        let key = CacheKey::BillList {
            user_id: user_id.to_string(),
            page,
            limit,
        };
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let scope = Query::by("userId", user_id).eq("isDeleted", false);
        let total = self.bills.count(&scope).await?;
        let bills = self
            .bills
            .find(&scope.newest_first().skip((page - 1) * limit).limit(limit))
            .await?;

        let listing = BillPage {
            bills,
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        };
        self.cache.put(&key, &listing).await;
        Ok(listing)
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    /// Sales statistics for the user over a calendar scope, cached briefly.
    pub async fn stats(&self, user_id: &str, scope: StatsScope) -> EngineResult<BillStats> {
        let now = Utc::now();
        let key = CacheKey::Stats {
            user_id: user_id.to_string(),
            tag: scope.cache_tag(now),
        };
        if let Some(stats) = self.cache.get(&key).await {
            return Ok(stats);
        }

        let bills = self.sales(user_id, scope.window(now)).await?;
        let stats = compute_stats(&bills);
        debug!(user_id, scope = scope.as_str(), bills = bills.len(), "Stats computed");

        self.cache.put(&key, &stats).await;
        Ok(stats)
    }

    /// Count and value per payment method over a scope.
    pub async fn payment_method_breakdown(
        &self,
        user_id: &str,
        scope: StatsScope,
    ) -> EngineResult<BTreeMap<PaymentMethod, MethodTotals>> {
        Ok(self.stats(user_id, scope).await?.payment_method_breakdown)
    }

    /// Best sellers over all of the user's sales, by number of bill lines.
    pub async fn popular_products(
        &self,
        user_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<PopularProduct>> {
        validate_pagination(1, limit as u64)?;

        let key = CacheKey::PopularProducts {
            user_id: user_id.to_string(),
            limit,
        };
        if let Some(ranked) = self.cache.get(&key).await {
            return Ok(ranked);
        }

        let bills = self.sales(user_id, None).await?;
        let ranked = rank_popular_products(&bills, limit);
        self.cache.put(&key, &ranked).await;
        Ok(ranked)
    }

    /// Flat rows for spreadsheet export, oldest first. Defaults to the last
    /// 30 days.
    pub async fn export_rows(
        &self,
        user_id: &str,
        window: Option<TimeWindow>,
    ) -> EngineResult<Vec<BillExportRow>> {
        let window = window.unwrap_or_else(|| default_export_window(Utc::now()));
        if window.from >= window.to {
            return Err(ValidationError::InvalidFormat {
                field: "from".to_string(),
                reason: "must be before to".to_string(),
            }
            .into());
        }

        let bills = self.sales(user_id, Some(window)).await?;
        Ok(export_rows(&bills))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// The stored bill, unless it is missing or deleted.
    async fn live_bill(&self, bill_id: &str) -> EngineResult<Bill> {
        let bill = self.bills.require(bill_id).await?;
        if bill.is_deleted {
            return Err(EngineError::not_found("Bill", bill_id));
        }
        Ok(bill)
    }

    /// Bills that count as sales, oldest first.
    async fn sales(&self, user_id: &str, window: Option<TimeWindow>) -> EngineResult<Vec<Bill>> {
        let mut query = Query::by("userId", user_id)
            .eq("isDeleted", false)
            .eq("voidedAt", Value::Null);
        if let Some(window) = window {
            query = query.between("createdAt", window.from, window.to);
        }

        let bills = self.bills.find(&query).await?;
        Ok(bills.into_iter().filter(Bill::counts_as_sale).collect())
    }

    /// Inserts the bill, drawing a new number whenever the store reports the
    /// number as taken.
    async fn insert_with_fresh_number(
        &self,
        user_id: &str,
        draft: BillDraft,
        now: DateTime<Utc>,
    ) -> EngineResult<Bill> {
        let mut bill = draft.into_bill(user_id, now);

        for attempt in 1..=BILL_NUMBER_ATTEMPTS {
            bill.bill_number = self.numbers.next(now);

            match self.bills.insert(&bill).await {
                Ok(stored) => return Ok(stored),
                Err(DbError::UniqueViolation { field, .. }) if field == "billNumber" => {
                    warn!(
                        bill_number = %bill.bill_number,
                        attempt,
                        "Bill number already taken, drawing another"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "No free bill number after {BILL_NUMBER_ATTEMPTS} attempts"
        )))
    }

    /// Finds or creates the customer by phone and counts the visit.
    async fn record_visit(&self, bill: &Bill) -> EngineResult<()> {
        let Some(phone) = bill.customer_phone.as_deref() else {
            return Ok(());
        };

        // a concurrent first visit may win the insert; the retry counts onto it
        for attempt in 1..=2 {
            if let Some(existing) = self.customers.find_one(&Query::by("phone", phone)).await? {
                self.customers
                    .increment(&existing.id, "visitCount", 1, None)
                    .await?;
                self.customers
                    .increment(&existing.id, "totalSpentCents", bill.total_cents, None)
                    .await?;

                let mut patch = json!({
                    "lastVisitAt": bill.created_at,
                    "updatedAt": bill.created_at,
                });
                if let Some(name) = &bill.customer_name {
                    patch["name"] = json!(name);
                }
                self.customers.update(&existing.id, patch).await?;

                debug!(customer_id = %existing.id, "Customer visit recorded");
                return Ok(());
            }

            let customer = Customer {
                id: new_id(),
                name: bill.customer_name.clone(),
                phone: phone.to_string(),
                visit_count: 1,
                total_spent_cents: bill.total_cents,
                last_visit_at: bill.created_at,
                created_at: bill.created_at,
                updated_at: bill.created_at,
            };
            match self.customers.insert(&customer).await {
                Ok(customer) => {
                    debug!(customer_id = %customer.id, "Customer created");
                    return Ok(());
                }
                Err(DbError::UniqueViolation { .. }) if attempt == 1 => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

// =============================================================================
// Bill Draft
// =============================================================================

/// A validated [`NewBill`] with computed line and bill totals.
#[derive(Debug)]
struct BillDraft {
    items: Vec<BillItem>,
    totals: BillTotals,
    payment_method: PaymentMethod,
    amount_received_cents: Option<i64>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    notes: Option<String>,
}

impl BillDraft {
    fn build(new: NewBill) -> EngineResult<Self> {
        if new.items.is_empty() {
            return Err(ValidationError::required("items").into());
        }
        if new.items.len() > MAX_BILL_ITEMS {
            return Err(ValidationError::OutOfRange {
                field: "items".to_string(),
                min: 1,
                max: MAX_BILL_ITEMS as i64,
            }
            .into());
        }
        let payment_method = new
            .payment_method
            .ok_or_else(|| ValidationError::required("paymentMethod"))?;

        let mut items = Vec::with_capacity(new.items.len());
        for item in new.items {
            let name = validate_required("name", &item.name)?;
            validate_quantity(item.quantity)?;
            validate_amount("unitPriceCents", item.unit_price_cents)?;
            items.push(BillItem::new(
                normalize_optional(item.product_id.as_deref()),
                normalize_optional(item.barcode.as_deref()),
                name,
                item.unit_price_cents,
                item.quantity,
            ));
        }

        let line_sum = items
            .iter()
            .try_fold(Money::zero(), |sum, item| {
                Money::from_cents(item.unit_price_cents)
                    .checked_mul(item.quantity)
                    .and_then(|line| sum.checked_add(line))
            })
            .filter(|sum| sum.cents() <= MAX_AMOUNT_CENTS)
            .ok_or_else(|| amount_out_of_range("subtotalCents"))?
            .cents();
        validate_amount("taxCents", new.tax_cents)?;
        validate_amount("discountCents", new.discount_cents)?;

        if let Some(subtotal) = new.subtotal_cents {
            if subtotal != line_sum {
                return Err(ValidationError::InvalidFormat {
                    field: "subtotalCents".to_string(),
                    reason: format!("expected {line_sum} from line items, got {subtotal}"),
                }
                .into());
            }
        }

        let total_cents = match new.total_cents {
            Some(total) => total,
            None => Money::from_cents(line_sum)
                .checked_add(Money::from_cents(new.tax_cents))
                .and_then(|sum| sum.checked_sub(Money::from_cents(new.discount_cents)))
                .ok_or_else(|| amount_out_of_range("totalCents"))?
                .cents(),
        };
        validate_amount("totalCents", total_cents)?;

        let totals = BillTotals {
            subtotal_cents: line_sum,
            tax_cents: new.tax_cents,
            discount_cents: new.discount_cents,
            total_cents,
        };
        totals.validate()?;

        if let Some(received) = new.amount_received_cents {
            validate_amount("amountReceivedCents", received)?;
        }

        Ok(BillDraft {
            items,
            totals,
            payment_method,
            amount_received_cents: new.amount_received_cents,
            customer_name: normalize_optional(new.customer_name.as_deref()),
            customer_phone: normalize_optional(new.customer_phone.as_deref()),
            notes: normalize_optional(new.notes.as_deref()),
        })
    }

    /// The bill to insert; its number is drawn by the caller.
    fn into_bill(self, user_id: &str, now: DateTime<Utc>) -> Bill {
        Bill {
            id: new_id(),
            bill_number: String::new(),
            user_id: user_id.to_string(),
            items: self.items,
            subtotal_cents: self.totals.subtotal_cents,
            tax_cents: self.totals.tax_cents,
            discount_cents: self.totals.discount_cents,
            total_cents: self.totals.total_cents,
            payment_method: self.payment_method,
            payment_status: PaymentStatus::Completed,
            amount_received_cents: self.amount_received_cents,
            // both sides are capped amounts
            change_cents: self
                .amount_received_cents
                .map(|received| received - self.totals.total_cents),
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            notes: self.notes,
            is_deleted: false,
            voided_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn amount_out_of_range(field: &str) -> EngineError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_AMOUNT_CENTS,
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================
