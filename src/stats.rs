//! Usage summaries derived from the ledger.
//!
//! Nothing here is stored; totals are recomputed by folding over the
//! ledger's record snapshot. Safe to run while commits are in flight — a
//! racing commit is simply in or out of the snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::PaymentRecord;
use crate::timestamp::UnixTimestamp;

/// Earnings and transaction counts, overall and for the current UTC day.
///
/// Amounts serialize as JSON numbers here (dashboard consumers expect
/// numeric totals), unlike the string amounts on the payment wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_earnings: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub today_earnings: Decimal,
    pub total_transactions: u64,
    pub today_transactions: u64,
}

/// Folds a record snapshot into [`UsageStats`], bucketing "today" by
/// `verified_at` against `now`.
pub fn summarize(records: &[PaymentRecord], now: UnixTimestamp) -> UsageStats {
    let mut stats = UsageStats {
        total_earnings: Decimal::ZERO,
        today_earnings: Decimal::ZERO,
        total_transactions: 0,
        today_transactions: 0,
    };
    for record in records {
        let amount = record.amount.as_decimal();
        stats.total_earnings += amount;
        stats.total_transactions += 1;
        if record.verified_at.same_utc_day(now) {
            stats.today_earnings += amount;
            stats.today_transactions += 1;
        }
    }
    stats
}
