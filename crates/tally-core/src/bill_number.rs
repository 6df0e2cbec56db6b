//! # Bill Numbers
//!
//! Human-readable, time-based bill numbers.
//!
//! ```text
//!  B260315-142507123 07
//!  │└──┬─┘ └───┬───┘ └┬┘
//!  │ yymmdd HHMMSSmmm seq (two digits, wraps at 100)
//!  └ prefix
//! ```
//!
//! The generator is pure apart from its sequence counter. Uniqueness is
//! checked by the billing engine against the store; a collision is retried
//! with a fresh value.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};

/// Source of candidate bill numbers.
pub trait BillNumberGenerator: Send + Sync {
    /// Produces a candidate number for a bill created at `now`.
    fn next(&self, now: DateTime<Utc>) -> String;
}

/// Default generator: timestamp plus a rolling two-digit sequence, so two
/// bills in the same millisecond still differ.
#[derive(Debug, Default)]
pub struct TimeBasedBillNumbers {
    seq: AtomicU32,
}

impl TimeBasedBillNumbers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BillNumberGenerator for TimeBasedBillNumbers {
    fn next(&self, now: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) % 100;
        format!("B{}{:02}", now.format("%y%m%d-%H%M%S%3f"), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 14, 25, 7).unwrap()
            + chrono::Duration::milliseconds(123);
        let gen = TimeBasedBillNumbers::new();
        assert_eq!(gen.next(now), "B260315-14250712300");
        assert_eq!(gen.next(now), "B260315-14250712301");
    }

    #[test]
    fn test_same_instant_yields_distinct_numbers() {
        let gen = TimeBasedBillNumbers::new();
        let now = Utc::now();
        let numbers: std::collections::HashSet<String> = (0..100).map(|_| gen.next(now)).collect();
        assert_eq!(numbers.len(), 100);
    }
}
