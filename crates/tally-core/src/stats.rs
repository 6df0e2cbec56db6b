//! # Bill Statistics
//!
//! Pure aggregations over a supplied set of bills. No I/O: callers fetch the
//! bills, these functions fold them.
//!
//! ```text
//!  bills ──► compute_stats ──────────► BillStats (revenue, tax, breakdown)
//!        ──► rank_popular_products ──► Vec<PopularProduct> (top N)
//!        ──► export_rows ────────────► Vec<BillExportRow> (flat rows)
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Bill, PaymentMethod, PaymentStatus};

// =============================================================================
// Statistics
// =============================================================================

/// Count and value of bills paid with one method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MethodTotals {
    pub count: u64,
    pub total_cents: i64,
}

/// Aggregate statistics over a set of bills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillStats {
    pub total_bills: u64,
    pub total_revenue_cents: i64,
    pub total_tax_cents: i64,
    pub total_discount_cents: i64,
    /// Revenue divided by bill count, zero for an empty set.
    pub average_bill_cents: i64,
    pub payment_method_breakdown: BTreeMap<PaymentMethod, MethodTotals>,
}

/// Folds bills into [`BillStats`].
///
/// ## Example
/// ```rust
/// use tally_core::stats::compute_stats;
/// use tally_core::Bill;
///
/// let stats = compute_stats(&Vec::<Bill>::new());
/// assert_eq!(stats.total_bills, 0);
/// assert_eq!(stats.average_bill_cents, 0);
/// assert!(stats.payment_method_breakdown.is_empty());
/// ```
pub fn compute_stats<'a, I>(bills: I) -> BillStats
where
    I: IntoIterator<Item = &'a Bill>,
{
    let mut stats = BillStats::default();
    let mut revenue = Money::zero();
    let mut tax = Money::zero();
    let mut discount = Money::zero();

    for bill in bills {
        stats.total_bills += 1;
        revenue += bill.total();
        tax += bill.tax();
        discount += bill.discount();

        let entry = stats
            .payment_method_breakdown
            .entry(bill.payment_method)
            .or_default();
        entry.count += 1;
        entry.total_cents += bill.total_cents;
    }

    stats.total_revenue_cents = revenue.cents();
    stats.total_tax_cents = tax.cents();
    stats.total_discount_cents = discount.cents();
    stats.average_bill_cents = revenue.average_over(stats.total_bills).cents();
    stats
}

// =============================================================================
// Popular Products
// =============================================================================

/// Sales figures for one product across many bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PopularProduct {
    pub product_id: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    /// Number of bill lines that sold this product.
    pub sales_count: u64,
    pub revenue_cents: i64,
    pub units_sold: i64,
}

/// Ranks products by how many bill lines sold them.
///
/// Ties keep the order in which products were first encountered.
pub fn rank_popular_products<'a, I>(bills: I, limit: usize) -> Vec<PopularProduct>
where
    I: IntoIterator<Item = &'a Bill>,
{
    let mut ranked: Vec<PopularProduct> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for bill in bills {
        for item in &bill.items {
            let slot = *index.entry(item.product_key()).or_insert_with(|| {
                ranked.push(PopularProduct {
                    product_id: item.product_id.clone(),
                    barcode: item.barcode.clone(),
                    name: item.name.clone(),
                    sales_count: 0,
                    revenue_cents: 0,
                    units_sold: 0,
                });
                ranked.len() - 1
            });

            let entry = &mut ranked[slot];
            entry.sales_count += 1;
            entry.revenue_cents += item.line_total_cents;
            entry.units_sold += item.quantity;
        }
    }

    // sort_by is stable: equal counts stay in encounter order
    ranked.sort_by(|a, b| b.sales_count.cmp(&a.sales_count));
    ranked.truncate(limit);
    ranked
}

// =============================================================================
// Export Rows
// =============================================================================

/// One bill flattened for spreadsheet export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillExportRow {
    pub bill_number: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub line_count: usize,
    pub units: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
}

/// Flattens bills into export rows, preserving order.
pub fn export_rows<'a, I>(bills: I) -> Vec<BillExportRow>
where
    I: IntoIterator<Item = &'a Bill>,
{
    bills
        .into_iter()
        .map(|bill| BillExportRow {
            bill_number: bill.bill_number.clone(),
            created_at: bill.created_at,
            customer_name: bill.customer_name.clone(),
            customer_phone: bill.customer_phone.clone(),
            line_count: bill.items.len(),
            units: bill.items.iter().map(|i| i.quantity).sum(),
            subtotal_cents: bill.subtotal_cents,
            tax_cents: bill.tax_cents,
            discount_cents: bill.discount_cents,
            total_cents: bill.total_cents,
            payment_method: bill.payment_method,
            payment_status: bill.payment_status,
        })
        .collect()
}

// =============================================================================
// Stats Scope
// =============================================================================

/// A half-open time window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// Period a statistics request covers. Calendar boundaries are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StatsScope {
    Daily,
    Monthly,
    Yearly,
    AllTime,
}

impl StatsScope {
    /// The calendar window containing `now`, or `None` for all time.
    pub fn window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        let today = now.date_naive();
        let (from, to) = match self {
            StatsScope::AllTime => return None,
            StatsScope::Daily => (today, today.succ_opt()?),
            StatsScope::Monthly => {
                let from = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
                let to = if today.month() == 12 {
                    NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)?
                };
                (from, to)
            }
            StatsScope::Yearly => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?,
            ),
        };

        Some(TimeWindow {
            from: from.and_time(NaiveTime::MIN).and_utc(),
            to: to.and_time(NaiveTime::MIN).and_utc(),
        })
    }

    /// Cache discriminator: the scope plus the window it resolved to, so a
    /// cached "daily" figure never outlives its day.
    pub fn cache_tag(&self, now: DateTime<Utc>) -> String {
        match self.window(now) {
            Some(window) => format!("{}:{}", self.as_str(), window.from.format("%Y%m%d")),
            None => self.as_str().to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsScope::Daily => "daily",
            StatsScope::Monthly => "monthly",
            StatsScope::Yearly => "yearly",
            StatsScope::AllTime => "all_time",
        }
    }
}

/// Default lookback for exports without an explicit range.
pub fn default_export_window(now: DateTime<Utc>) -> TimeWindow {
    TimeWindow {
        from: now - Duration::days(30),
        to: now + Duration::seconds(1),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BillItem;
    use chrono::TimeZone;

    fn bill(method: PaymentMethod, total: i64, tax: i64, discount: i64, items: Vec<BillItem>) -> Bill {
        let now = Utc::now();
        Bill {
            id: crate::types::new_id(),
            bill_number: format!("B-{}", total),
            user_id: "u1".into(),
            items,
            subtotal_cents: total - tax + discount,
            tax_cents: tax,
            discount_cents: discount,
            total_cents: total,
            payment_method: method,
            payment_status: PaymentStatus::Completed,
            amount_received_cents: None,
            change_cents: None,
            customer_name: None,
            customer_phone: None,
            notes: None,
            is_deleted: false,
            voided_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(id: &str, qty: i64, price: i64) -> BillItem {
        BillItem::new(Some(id.into()), None, id.to_uppercase(), price, qty)
    }

    #[test]
    fn test_empty_stats_do_not_divide_by_zero() {
        let stats = compute_stats(&Vec::<Bill>::new());
        assert_eq!(stats, BillStats::default());
        assert_eq!(stats.average_bill_cents, 0);
    }

    #[test]
    fn test_stats_totals_and_breakdown() {
        let bills = vec![
            bill(PaymentMethod::Cash, 1000, 100, 0, vec![]),
            bill(PaymentMethod::Upi, 2500, 250, 50, vec![]),
            bill(PaymentMethod::Cash, 501, 0, 0, vec![]),
        ];
        let stats = compute_stats(&bills);

        assert_eq!(stats.total_bills, 3);
        assert_eq!(stats.total_revenue_cents, 4001);
        assert_eq!(stats.total_tax_cents, 350);
        assert_eq!(stats.total_discount_cents, 50);
        assert_eq!(stats.average_bill_cents, 1334); // 1333.67 rounds up

        let cash = stats.payment_method_breakdown[&PaymentMethod::Cash];
        assert_eq!(cash, MethodTotals { count: 2, total_cents: 1501 });
        assert_eq!(stats.payment_method_breakdown[&PaymentMethod::Upi].count, 1);
        assert!(!stats.payment_method_breakdown.contains_key(&PaymentMethod::Card));
    }

    #[test]
    fn test_popular_products_ranking_is_stable() {
        let bills = vec![
            bill(PaymentMethod::Cash, 0, 0, 0, vec![item("tea", 1, 100), item("rice", 2, 500)]),
            bill(PaymentMethod::Cash, 0, 0, 0, vec![item("milk", 1, 60), item("rice", 1, 500)]),
            bill(PaymentMethod::Cash, 0, 0, 0, vec![item("tea", 3, 100)]),
        ];

        let ranked = rank_popular_products(&bills, 10);
        let names: Vec<&str> = ranked.iter().map(|p| p.name.as_str()).collect();
        // tea and rice tie on 2 sales; tea was seen first
        assert_eq!(names, vec!["TEA", "RICE", "MILK"]);

        assert_eq!(ranked[0].units_sold, 4);
        assert_eq!(ranked[0].revenue_cents, 400);
        assert_eq!(ranked[1].revenue_cents, 1500);

        assert_eq!(rank_popular_products(&bills, 1).len(), 1);
    }

    #[test]
    fn test_export_rows() {
        let bills = vec![bill(PaymentMethod::Card, 900, 0, 0, vec![item("tea", 2, 200), item("milk", 5, 100)])];
        let rows = export_rows(&bills);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line_count, 2);
        assert_eq!(rows[0].units, 7);
        assert_eq!(rows[0].payment_method, PaymentMethod::Card);
    }

    #[test]
    fn test_scope_windows() {
        let now = Utc.with_ymd_and_hms(2026, 12, 15, 13, 45, 0).unwrap();

        let daily = StatsScope::Daily.window(now).unwrap();
        assert_eq!(daily.from, Utc.with_ymd_and_hms(2026, 12, 15, 0, 0, 0).unwrap());
        assert_eq!(daily.to, Utc.with_ymd_and_hms(2026, 12, 16, 0, 0, 0).unwrap());
        assert!(daily.contains(now));

        let monthly = StatsScope::Monthly.window(now).unwrap();
        assert_eq!(monthly.to, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());

        let yearly = StatsScope::Yearly.window(now).unwrap();
        assert_eq!(yearly.from, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        assert!(StatsScope::AllTime.window(now).is_none());
        assert_eq!(StatsScope::Monthly.cache_tag(now), "monthly:20261201");
        assert_eq!(StatsScope::AllTime.cache_tag(now), "all_time");
    }
}
