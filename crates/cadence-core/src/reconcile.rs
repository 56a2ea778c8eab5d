//! Pattern reconciliation
//!
//! One pure function merges four immutable snapshots (confirmed patterns,
//! dismissals, cached AI-assisted patterns, live basic-detector output) plus
//! income sources into the final recurring-item list. Keeping this a pure
//! pass over snapshots rules out the read-modify-write races and duplicate
//! entries that cascading in-place mutation invites.
//!
//! Precedence: confirmed patterns are authoritative when present; otherwise
//! cached AI patterns; otherwise the basic detector. Dismissals beat
//! everything. A previously confirmed pattern whose live match count has
//! fallen below the surfacing floor fades out without an explicit delete.

use chrono::NaiveDate;
use tracing::debug;

use crate::detect::DetectedPattern;
use crate::models::{
    Confidence, Dismissal, IncomeKind, IncomeSource, PatternSource, RecurringItem,
    RecurringPattern, Transaction,
};
use crate::normalize::{
    dismissal_matches, keys_match_loose, keys_match_strict, merchant_key, transaction_key,
    MATCH_KEY_TOKENS,
};
use crate::schedule::project_next;

/// Minimum live match count for an item to stay in the surfaced list,
/// regardless of how it was confirmed
pub const MIN_SURFACED_OCCURRENCES: i64 = 3;

/// `other`-typed income sources below this average amount are treated as
/// noise rather than a payday entry
const MIN_OTHER_INCOME_AMOUNT: f64 = 100.0;

/// Snapshots consumed by one reconciliation pass
pub struct ReconcileInputs<'a> {
    pub confirmed: &'a [RecurringPattern],
    pub dismissals: &'a [Dismissal],
    /// Cached AI-assisted detector output, if an analysis has run
    pub ai_patterns: &'a [DetectedPattern],
    /// Live basic-detector output over the current window
    pub basic_patterns: &'a [DetectedPattern],
    pub income_sources: &'a [IncomeSource],
    /// Current transaction window, used to refresh live counts
    pub transactions: &'a [Transaction],
    pub today: NaiveDate,
}

/// Live statistics for one pattern against the current window
struct RefreshedStats {
    occurrences: i64,
    average_amount: f64,
    last_amount: Option<f64>,
    last_seen_date: Option<NaiveDate>,
}

/// Whether a transaction belongs to a pattern.
///
/// Manual patterns match strictly (exact key or two-token prefix, or exact
/// containment of the normalized display name); AI patterns match loosely
/// (substring containment in either direction, including the aggregator's
/// merchant name). The asymmetry is intentional: a manual entry's precision
/// must not be diluted by generic substring drift.
fn transaction_matches(tx: &Transaction, key: &str, display_key: &str, strict: bool) -> bool {
    let tx_key = transaction_key(tx);
    if tx_key.is_empty() {
        return false;
    }

    if strict {
        keys_match_strict(&tx_key, key)
            || (!display_key.is_empty() && tx_key == display_key)
            || (!display_key.is_empty() && tx_key.contains(display_key))
    } else {
        keys_match_loose(&tx_key, key)
            || (!display_key.is_empty() && keys_match_loose(&tx_key, display_key))
            || tx
                .merchant_name
                .as_deref()
                .map(|m| keys_match_loose(&merchant_key(m, MATCH_KEY_TOKENS), key))
                .unwrap_or(false)
    }
}

fn refresh_against_window(
    transactions: &[Transaction],
    key: &str,
    display_name: &str,
    strict: bool,
) -> RefreshedStats {
    let display_key = merchant_key(display_name, MATCH_KEY_TOKENS);

    let mut matches: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| transaction_matches(tx, key, &display_key, strict))
        .collect();
    matches.sort_by_key(|tx| tx.date);

    let occurrences = matches.len() as i64;
    let average_amount = if matches.is_empty() {
        0.0
    } else {
        matches.iter().map(|tx| tx.amount.abs()).sum::<f64>() / matches.len() as f64
    };

    RefreshedStats {
        occurrences,
        average_amount,
        last_amount: matches.last().map(|tx| tx.amount.abs()),
        last_seen_date: matches.last().map(|tx| tx.date),
    }
}

fn item_from_confirmed(
    pattern: &RecurringPattern,
    transactions: &[Transaction],
    today: NaiveDate,
) -> RecurringItem {
    let strict = pattern.source != PatternSource::Ai;
    let refreshed =
        refresh_against_window(transactions, &pattern.merchant_key, &pattern.display_name, strict);

    // Prefer the freshest observation; a stored date can be newer when the
    // requested window is narrower than full history
    let last_seen = match (refreshed.last_seen_date, pattern.last_seen_date) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let next_expected_date = last_seen
        .and_then(|ls| project_next(ls, pattern.frequency, None, today));

    // Manual entries often track sources with no matching bank descriptor
    // (cash rent, a bill paid from another account); they keep their stored
    // count instead of fading out on zero live matches
    let occurrences = if refreshed.occurrences > 0 || pattern.source != PatternSource::Manual {
        refreshed.occurrences
    } else {
        pattern.occurrences
    };

    RecurringItem {
        merchant_key: pattern.merchant_key.clone(),
        display_name: pattern.display_name.clone(),
        frequency: pattern.frequency,
        amount: refreshed.last_amount.unwrap_or(pattern.amount),
        average_amount: if refreshed.occurrences > 0 {
            refreshed.average_amount
        } else {
            pattern.average_amount
        },
        is_income: pattern.is_income,
        next_expected_date,
        last_seen_date: last_seen,
        category: pattern.category.clone(),
        confidence: pattern.confidence,
        occurrences,
        bill_type: pattern.bill_type.clone(),
        source: pattern.source,
    }
}

fn item_from_detected(
    pattern: &DetectedPattern,
    source: PatternSource,
    today: NaiveDate,
) -> RecurringItem {
    RecurringItem {
        merchant_key: pattern.merchant_key.clone(),
        display_name: pattern.display_name.clone(),
        frequency: pattern.frequency,
        amount: pattern.amount,
        average_amount: pattern.average_amount,
        is_income: pattern.is_income,
        // A cached pattern can carry a projection that has since passed;
        // re-project at read time so a past date is never surfaced
        next_expected_date: project_next(pattern.last_seen_date, pattern.frequency, None, today),
        last_seen_date: Some(pattern.last_seen_date),
        category: pattern.category.clone(),
        confidence: pattern.confidence,
        occurrences: pattern.occurrences,
        bill_type: pattern.bill_type.clone(),
        source,
    }
}

fn is_dismissed(dismissals: &[Dismissal], key: &str) -> bool {
    dismissals
        .iter()
        .any(|d| dismissal_matches(&d.merchant_key, key))
}

/// Whether an income source duplicates an income item already in the list.
/// Dedup is by name substring containment, matching how duplicate payday
/// entries actually manifest (same employer, slightly different descriptor).
fn duplicates_existing_income(items: &[RecurringItem], source: &IncomeSource) -> bool {
    let source_key = merchant_key(&source.display_name, MATCH_KEY_TOKENS);
    items.iter().any(|item| {
        item.is_income
            && (keys_match_loose(&item.merchant_key, &source.merchant_key)
                || keys_match_loose(
                    &merchant_key(&item.display_name, MATCH_KEY_TOKENS),
                    &source_key,
                ))
    })
}

fn item_from_income_source(
    source: &IncomeSource,
    transactions: &[Transaction],
    today: NaiveDate,
) -> RecurringItem {
    let refreshed =
        refresh_against_window(transactions, &source.merchant_key, &source.display_name, true);

    let last_seen = refreshed.last_seen_date.or(source.last_seen_date);
    let next_expected_date =
        last_seen.and_then(|ls| project_next(ls, source.frequency, source.pay_day, today));

    RecurringItem {
        merchant_key: source.merchant_key.clone(),
        display_name: source.display_name.clone(),
        frequency: source.frequency,
        amount: refreshed.last_amount.unwrap_or(source.average_amount),
        average_amount: if refreshed.occurrences > 0 {
            refreshed.average_amount
        } else {
            source.average_amount
        },
        is_income: true,
        next_expected_date,
        last_seen_date: last_seen,
        category: None,
        confidence: source.confidence,
        occurrences: refreshed.occurrences,
        bill_type: None,
        source: PatternSource::Manual,
    }
}

/// Merge the four sources of truth into one consistent result list.
pub fn reconcile(inputs: &ReconcileInputs<'_>) -> Vec<RecurringItem> {
    // Step 1/2: confirmed patterns are authoritative; otherwise prefer the
    // cached AI-assisted pass over the bare heuristic one
    let mut items: Vec<RecurringItem> = if !inputs.confirmed.is_empty() {
        inputs
            .confirmed
            .iter()
            .map(|p| item_from_confirmed(p, inputs.transactions, inputs.today))
            .collect()
    } else if !inputs.ai_patterns.is_empty() {
        inputs
            .ai_patterns
            .iter()
            .map(|p| item_from_detected(p, PatternSource::Ai, inputs.today))
            .collect()
    } else {
        inputs
            .basic_patterns
            .iter()
            .map(|p| item_from_detected(p, PatternSource::Basic, inputs.today))
            .collect()
    };

    // Step 3: dismissals beat every source
    items.retain(|item| {
        let keep = !is_dismissed(inputs.dismissals, &item.merchant_key);
        if !keep {
            debug!(merchant_key = %item.merchant_key, "Filtered dismissed pattern");
        }
        keep
    });

    // Step 4: merge confirmed income sources, skipping duplicates of income
    // items already present and noise-level `other` sources
    for source in inputs.income_sources {
        if source.income_kind == IncomeKind::Other
            && (source.confidence == Confidence::Low
                || source.average_amount < MIN_OTHER_INCOME_AMOUNT)
        {
            continue;
        }
        if is_dismissed(inputs.dismissals, &source.merchant_key) {
            continue;
        }
        if duplicates_existing_income(&items, source) {
            continue;
        }
        items.push(item_from_income_source(source, inputs.transactions, inputs.today));
    }

    // Step 5: a pattern that has stopped recurring fades out of the active
    // list without requiring an explicit delete
    items.retain(|item| item.occurrences >= MIN_SURFACED_OCCURRENCES);

    items.sort_by(|a, b| a.merchant_key.cmp(&b.merchant_key));
    items
}

/// Annualized cost of the surviving expense items.
pub fn yearly_spend_estimate(items: &[RecurringItem]) -> f64 {
    items
        .iter()
        .filter(|item| !item.is_income)
        .map(|item| item.average_amount * item.frequency.annualization_factor())
        .sum()
}
