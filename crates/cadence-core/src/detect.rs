//! Unsupervised recurring-pattern detection
//!
//! Groups a transaction window by merchant key, runs interval/amount
//! statistics per group, and promotes consistent groups to candidate
//! patterns. This path runs without any model assistance, so it trades
//! recall for precision: three occurrences minimum and low-confidence
//! candidates are dropped outright. The AI-assisted path applies its own
//! judgment and only needs two.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Confidence, Frequency, IncomeKind, Transaction};
use crate::normalize::{transaction_key, best_descriptor};
use crate::schedule::project_next;
use crate::stats::{GroupStats, ANALYZER_THRESHOLDS, DETECTOR_THRESHOLDS};
use crate::taxonomy;

/// Minimum group size for unsupervised promotion. Two observations of a gap
/// and an amount are easily coincidence; three is the deliberate
/// precision-over-recall bar for the detector that runs without a model.
pub const MIN_OCCURRENCES_BASIC: usize = 3;

/// Minimum group size when the AI detector is vouching for the merchant
pub const MIN_OCCURRENCES_AI: usize = 2;

/// Which side of the ledger a grouping pass looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Expense,
    Income,
}

/// A candidate pattern produced by a detector pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    /// Most recent observed amount
    pub amount: f64,
    pub average_amount: f64,
    pub is_income: bool,
    pub next_expected_date: Option<NaiveDate>,
    pub last_seen_date: NaiveDate,
    pub category: Option<String>,
    pub confidence: Confidence,
    pub occurrences: i64,
    pub income_kind: Option<IncomeKind>,
    /// Bill classification from the model (subscription, utility, income, ...)
    #[serde(default)]
    pub bill_type: Option<String>,
    /// Model's stated reason for the judgment, absent on the basic path
    #[serde(default)]
    pub reason: Option<String>,
}

/// Partition a transaction window into per-merchant candidate groups.
///
/// Transactions ignored everywhere (`ignore_scope = all`) and transactions
/// with an empty merchant key are excluded; groups below `min_occurrences`
/// are not eligible for promotion. Each group comes back sorted by date.
pub fn group_candidates<'a>(
    transactions: &'a [Transaction],
    direction: Direction,
    min_occurrences: usize,
) -> HashMap<String, Vec<&'a Transaction>> {
    let mut groups: HashMap<String, Vec<&Transaction>> = HashMap::new();

    for tx in transactions {
        if tx.ignore_scope == crate::models::IgnoreScope::All {
            continue;
        }

        let income = taxonomy::is_income(tx);
        let wanted = match direction {
            Direction::Income => income,
            Direction::Expense => !income && tx.amount > 0.0,
        };
        if !wanted {
            continue;
        }

        let key = transaction_key(tx);
        if key.is_empty() {
            // No pattern can anchor on an empty key
            continue;
        }

        groups.entry(key).or_default().push(tx);
    }

    groups.retain(|_, txs| txs.len() >= min_occurrences);
    for txs in groups.values_mut() {
        txs.sort_by_key(|t| t.date);
    }

    groups
}

/// Run the basic (unsupervised) detector over a transaction window.
///
/// Output is sorted by merchant key so repeated calls over the same window
/// and the same `today` are identical.
pub fn detect_basic(transactions: &[Transaction], today: NaiveDate) -> Vec<DetectedPattern> {
    let mut patterns = Vec::new();

    for direction in [Direction::Expense, Direction::Income] {
        let groups = group_candidates(transactions, direction, MIN_OCCURRENCES_BASIC);

        for (key, txs) in groups {
            if direction == Direction::Expense && !taxonomy::eligible_for_bill_detection(txs[0]) {
                debug!(merchant_key = %key, "Skipping shopping merchant");
                continue;
            }

            let Some(pattern) = promote_group(&key, &txs, direction, today) else {
                continue;
            };
            patterns.push(pattern);
        }
    }

    patterns.sort_by(|a, b| a.merchant_key.cmp(&b.merchant_key));
    patterns
}

/// Promote one sorted group to a pattern if its statistics clear the
/// detector thresholds.
fn promote_group(
    key: &str,
    txs: &[&Transaction],
    direction: Direction,
    today: NaiveDate,
) -> Option<DetectedPattern> {
    let observations: Vec<(NaiveDate, f64)> = txs.iter().map(|t| (t.date, t.amount)).collect();
    let stats = GroupStats::from_sorted(&observations)?;

    let Some(frequency) = stats.frequency() else {
        debug!(merchant_key = %key, avg_interval = stats.avg_interval, "Gap outside all frequency buckets");
        return None;
    };

    let confidence = stats.confidence(&DETECTOR_THRESHOLDS);
    if confidence == Confidence::Low {
        debug!(merchant_key = %key, "Dropping low-confidence candidate");
        return None;
    }

    let latest = txs.last()?;
    let is_income = direction == Direction::Income;

    Some(DetectedPattern {
        merchant_key: key.to_string(),
        display_name: best_descriptor(latest).to_string(),
        frequency,
        amount: stats.last_amount,
        average_amount: stats.avg_amount,
        is_income,
        next_expected_date: project_next(stats.last_date, frequency, None, today),
        last_seen_date: stats.last_date,
        category: latest.category.clone(),
        confidence,
        occurrences: stats.occurrences as i64,
        income_kind: is_income.then(|| taxonomy::classify_income_kind(best_descriptor(latest))),
        bill_type: None,
        reason: None,
    })
}

/// Single-merchant analyzer backing direct "is this recurring?" questions.
///
/// Uses the stricter analyzer thresholds and requires both signals to agree;
/// unlike the bulk detector it reports the result even when the answer is a
/// low-confidence "no".
pub fn analyze_merchant_group(
    txs: &[&Transaction],
    today: NaiveDate,
) -> Option<DetectedPattern> {
    if txs.is_empty() {
        return None;
    }

    let mut sorted: Vec<_> = txs.to_vec();
    sorted.sort_by_key(|t| t.date);

    let observations: Vec<(NaiveDate, f64)> = sorted.iter().map(|t| (t.date, t.amount)).collect();
    let stats = GroupStats::from_sorted(&observations)?;
    let frequency = stats.frequency()?;

    if !stats.amount_consistent(&ANALYZER_THRESHOLDS)
        || !stats.interval_consistent(&ANALYZER_THRESHOLDS)
    {
        return None;
    }

    let latest = sorted.last()?;
    let is_income = taxonomy::is_income(latest);

    Some(DetectedPattern {
        merchant_key: transaction_key(latest),
        display_name: best_descriptor(latest).to_string(),
        frequency,
        amount: stats.last_amount,
        average_amount: stats.avg_amount,
        is_income,
        next_expected_date: project_next(stats.last_date, frequency, None, today),
        last_seen_date: stats.last_date,
        category: latest.category.clone(),
        confidence: stats.confidence(&ANALYZER_THRESHOLDS),
        occurrences: stats.occurrences as i64,
        income_kind: is_income.then(|| taxonomy::classify_income_kind(best_descriptor(latest))),
        bill_type: None,
        reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IgnoreScope;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(id: i64, description: &str, amount: f64, d: NaiveDate) -> Transaction {
        Transaction {
            id,
            user_id: "u1".to_string(),
            date: d,
            description: description.to_string(),
            merchant_name: None,
            user_display_name: None,
            amount,
            category: None,
            explicit_income: None,
            ignore_scope: IgnoreScope::None,
            is_income: None,
            income_kind: None,
            created_at: Utc::now(),
        }
    }

    fn netflix_window() -> Vec<Transaction> {
        // Six monthly charges landing on the 14th-16th
        vec![
            tx(1, "NETFLIX.COM", 15.99, date(2024, 1, 15)),
            tx(2, "NETFLIX.COM", 15.99, date(2024, 2, 14)),
            tx(3, "NETFLIX.COM", 15.99, date(2024, 3, 15)),
            tx(4, "NETFLIX.COM", 15.99, date(2024, 4, 16)),
            tx(5, "NETFLIX.COM", 15.99, date(2024, 5, 15)),
            tx(6, "NETFLIX.COM", 15.99, date(2024, 6, 14)),
        ]
    }

    #[test]
    fn test_grouping_skips_empty_keys_and_ignored() {
        let mut txs = netflix_window();
        txs.push(tx(7, "***", 10.0, date(2024, 1, 1)));
        let mut ignored = tx(8, "NETFLIX.COM", 15.99, date(2024, 7, 15));
        ignored.ignore_scope = IgnoreScope::All;
        txs.push(ignored);

        let groups = group_candidates(&txs, Direction::Expense, MIN_OCCURRENCES_BASIC);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["netflix com"].len(), 6);
    }

    #[test]
    fn test_grouping_minimum_occurrences() {
        let txs = vec![
            tx(1, "HULU.COM", 7.99, date(2024, 1, 2)),
            tx(2, "HULU.COM", 7.99, date(2024, 2, 2)),
        ];
        assert!(group_candidates(&txs, Direction::Expense, MIN_OCCURRENCES_BASIC).is_empty());
        assert_eq!(
            group_candidates(&txs, Direction::Expense, MIN_OCCURRENCES_AI).len(),
            1
        );
    }

    #[test]
    fn test_detect_basic_netflix_scenario() {
        let today = date(2024, 6, 20);
        let patterns = detect_basic(&netflix_window(), today);

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.merchant_key, "netflix com");
        assert_eq!(p.frequency, Frequency::Monthly);
        assert_eq!(p.confidence, Confidence::High);
        assert_eq!(p.occurrences, 6);
        assert!(!p.is_income);
        let next = p.next_expected_date.unwrap();
        assert!(next >= today);
        assert_eq!(next, date(2024, 7, 14));
    }

    #[test]
    fn test_detect_basic_income_direction() {
        let today = date(2024, 4, 20);
        let txs = vec![
            tx(1, "ACME CORP PAYROLL DEP", -1500.0, date(2024, 1, 15)),
            tx(2, "ACME CORP PAYROLL DEP", -1500.0, date(2024, 2, 15)),
            tx(3, "ACME CORP PAYROLL DEP", -1500.0, date(2024, 3, 15)),
            tx(4, "ACME CORP PAYROLL DEP", -1500.0, date(2024, 4, 15)),
        ];
        let patterns = detect_basic(&txs, today);

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert!(p.is_income);
        assert_eq!(p.income_kind, Some(IncomeKind::Payroll));
        assert_eq!(p.frequency, Frequency::Monthly);
    }

    #[test]
    fn test_detect_basic_skips_shopping_merchants() {
        let today = date(2024, 4, 1);
        let txs = vec![
            tx(1, "STARBUCKS STORE 123", 6.40, date(2024, 1, 5)),
            tx(2, "STARBUCKS STORE 123", 6.40, date(2024, 2, 5)),
            tx(3, "STARBUCKS STORE 123", 6.40, date(2024, 3, 5)),
        ];
        assert!(detect_basic(&txs, today).is_empty());
    }

    #[test]
    fn test_detect_basic_is_deterministic() {
        let mut txs = netflix_window();
        for (i, d) in [date(2024, 1, 3), date(2024, 2, 3), date(2024, 3, 3)]
            .iter()
            .enumerate()
        {
            txs.push(tx(20 + i as i64, "SPOTIFY USA", 9.99, *d));
        }
        let today = date(2024, 6, 20);
        let first = detect_basic(&txs, today);
        let second = detect_basic(&txs, today);
        let keys: Vec<_> = first.iter().map(|p| p.merchant_key.clone()).collect();
        let keys2: Vec<_> = second.iter().map(|p| p.merchant_key.clone()).collect();
        assert_eq!(keys, keys2);
        assert_eq!(keys, vec!["netflix com", "spotify usa"]);
    }

    #[test]
    fn test_analyzer_requires_both_signals() {
        let today = date(2024, 6, 20);
        let window = netflix_window();
        let refs: Vec<&Transaction> = window.iter().collect();
        let analysis = analyze_merchant_group(&refs, today).unwrap();
        assert_eq!(analysis.frequency, Frequency::Monthly);

        // Erratic amounts fail the analyzer even on a clean monthly cadence
        let mut erratic = netflix_window();
        for (i, t) in erratic.iter_mut().enumerate() {
            t.amount = 10.0 + 10.0 * i as f64;
        }
        let refs: Vec<&Transaction> = erratic.iter().collect();
        assert!(analyze_merchant_group(&refs, today).is_none());
    }
}
