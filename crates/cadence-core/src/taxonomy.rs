//! Income and bill taxonomy
//!
//! Keyword-driven classification over lower-cased descriptors. Categories are
//! checked in a fixed declared order with first-hit-wins substring matching,
//! which keeps the classifier deterministic and explainable.
//!
//! Three independent lists interact here:
//! - the income taxonomy (payroll, government, ...) for semantic labeling
//! - a shopping denylist that keeps retail merchants out of bill detection
//! - a legitimate-income allowlist (gig platforms, payment processors) that
//!   takes precedence over both the denylist and the transfer exclusion,
//!   because a gig payout looks like retail and sometimes like a transfer

use crate::models::{IncomeKind, Transaction};
use crate::normalize::best_descriptor;

/// Ordered keyword taxonomy. First category with a substring hit wins.
pub(crate) const INCOME_TAXONOMY: &[(IncomeKind, &[&str])] = &[
    (
        IncomeKind::Payroll,
        &[
            "payroll",
            "direct dep",
            "dir dep",
            "salary",
            "wages",
            "paycheck",
            "adp",
            "gusto",
            "paychex",
            "workday",
        ],
    ),
    (
        IncomeKind::Government,
        &[
            "irs treas",
            "us treasury",
            "ssa",
            "social security",
            "unemployment",
            "tax ref",
            "veterans affairs",
            "va benefit",
            "snap benefit",
        ],
    ),
    (
        IncomeKind::Retirement,
        &["pension", "401k", "retirement", "annuity", "ira dist"],
    ),
    (
        IncomeKind::SelfEmployment,
        &[
            "uber",
            "lyft",
            "doordash",
            "grubhub",
            "instacart",
            "upwork",
            "fiverr",
            "etsy",
            "stripe",
            "square inc",
            "shopify",
            "airbnb",
        ],
    ),
    (
        IncomeKind::Investment,
        &[
            "dividend",
            "interest payment",
            "brokerage",
            "vanguard",
            "fidelity",
            "schwab",
            "robinhood",
            "coinbase",
        ],
    ),
    (
        IncomeKind::Rental,
        &["rental income", "rent received", "tenant payment"],
    ),
    (
        IncomeKind::Refund,
        &["refund", "reversal", "cashback", "cash back", "rebate"],
    ),
    (
        IncomeKind::Transfer,
        &["transfer", "xfer", "zelle", "wire", "ach credit"],
    ),
];

/// Retail-looking merchants excluded from bill detection
const SHOPPING_DENYLIST: &[&str] = &[
    "grocery",
    "supermarket",
    "walmart",
    "target",
    "costco",
    "kroger",
    "safeway",
    "whole foods",
    "trader joe",
    "aldi",
    "restaurant",
    "cafe",
    "coffee",
    "starbucks",
    "mcdonald",
    "chipotle",
    "pizza",
    "doordash",
    "grubhub",
    "uber",
    "lyft",
    "shell",
    "chevron",
    "exxon",
    "7-eleven",
    "amazon",
    "ebay",
    "etsy",
    "best buy",
    "home depot",
    "lowes",
    "cvs",
    "walgreens",
];

/// Merchants whose money-in transactions are legitimate income even when they
/// also match retail or transfer keywords. Checked before any exclusion.
const LEGITIMATE_INCOME_ALLOWLIST: &[&str] = &[
    "uber",
    "lyft",
    "doordash",
    "grubhub",
    "instacart",
    "upwork",
    "fiverr",
    "etsy",
    "paypal",
    "venmo",
    "stripe",
    "square inc",
    "cash app",
    "shopify",
    "airbnb",
];

/// Internal-movement phrasing that disqualifies a deposit from income
const TRANSFER_NAME_PATTERNS: &[&str] = &[
    "transfer to",
    "transfer from",
    "online transfer",
    "internal transfer",
    "recurring transfer",
    "wire transfer",
    "xfer",
    "credit card payment",
    "payment to card",
    "autopay payment",
];

/// Structured category codes that mark internal movement (aggregator codes)
const TRANSFER_CATEGORY_CODES: &[&str] = &[
    "transfer_out",
    "transfer_in",
    "transfer",
    "loan_payments",
    "internal",
];

/// Deposit-side keywords used to catch income on data sources with an
/// inverted sign convention
const INCOME_HINT_KEYWORDS: &[&str] = &[
    "payroll",
    "direct deposit",
    "direct dep",
    "salary",
    "pension",
    "ssa",
    "dividend",
    "tax ref",
];

fn matches_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classify a descriptor into its income taxonomy category.
pub fn classify_income_kind(descriptor: &str) -> IncomeKind {
    let desc = descriptor.to_lowercase();
    for (kind, keywords) in INCOME_TAXONOMY {
        if matches_any(&desc, keywords) {
            return *kind;
        }
    }
    IncomeKind::Other
}

/// Whether a descriptor matches the legitimate-income allowlist.
pub fn is_legitimate_income_merchant(descriptor: &str) -> bool {
    matches_any(&descriptor.to_lowercase(), LEGITIMATE_INCOME_ALLOWLIST)
}

/// Whether a descriptor looks like ordinary shopping (groceries, gas,
/// restaurants, general retail) rather than a bill.
pub fn is_shopping_merchant(descriptor: &str) -> bool {
    matches_any(&descriptor.to_lowercase(), SHOPPING_DENYLIST)
}

/// Whether a transaction looks like internal money movement.
///
/// Considers both structured category codes and descriptor phrasing; yields
/// to the legitimate-income allowlist, which must be checked first.
pub fn is_transfer_like(descriptor: &str, category: Option<&str>) -> bool {
    let desc = descriptor.to_lowercase();
    if is_legitimate_income_merchant(&desc) {
        return false;
    }
    if matches_any(&desc, TRANSFER_NAME_PATTERNS) {
        return true;
    }
    if let Some(cat) = category {
        if matches_any(&cat.to_lowercase(), TRANSFER_CATEGORY_CODES) {
            return true;
        }
    }
    false
}

/// Net income decision for a transaction, in priority order:
///
/// 1. an explicit user flag wins outright in either direction
/// 2. allowlisted merchant with a money-in amount is income
/// 3. transfer/internal-movement match is not income
/// 4. money-in with no contrary signal is income
/// 5. money-out matching income-like keywords (inverted-sign sources) is income
/// 6. otherwise not income
pub fn is_income(tx: &Transaction) -> bool {
    if let Some(flag) = tx.explicit_income {
        return flag;
    }

    let desc = best_descriptor(tx).to_lowercase();

    if tx.amount < 0.0 && is_legitimate_income_merchant(&desc) {
        return true;
    }
    if is_transfer_like(&desc, tx.category.as_deref()) {
        return false;
    }
    if tx.amount < 0.0 {
        return true;
    }
    if tx.amount > 0.0 && matches_any(&desc, INCOME_HINT_KEYWORDS) {
        return true;
    }
    false
}

/// Whether an expense transaction is eligible for bill detection.
///
/// Shopping-denylist merchants are excluded; the allowlist does not rescue
/// money-out transactions (a gig platform charge is still a retail purchase).
pub fn eligible_for_bill_detection(tx: &Transaction) -> bool {
    tx.amount > 0.0 && !is_shopping_merchant(best_descriptor(tx))
}
