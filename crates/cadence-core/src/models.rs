//! Domain models for Cadence

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Wire sentinel for "no projectable next date" (irregular frequency).
///
/// Internally a missing projection is `None`; the sentinel only exists on the
/// serialized output for compatibility with existing consumers.
pub const NO_PROJECTION_SENTINEL: &str = "9999-12-31";

/// Serialize an optional projection date, substituting the far-future sentinel
/// when there is no projectable next date.
pub fn serialize_projection<S: Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match date {
        Some(d) => serializer.serialize_str(&d.to_string()),
        None => serializer.serialize_str(NO_PROJECTION_SENTINEL),
    }
}

/// How a transaction is excluded from downstream features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreScope {
    #[default]
    None,
    Budget,
    All,
}

impl IgnoreScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Budget => "budget",
            Self::All => "all",
        }
    }
}

impl std::str::FromStr for IgnoreScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "budget" => Ok(Self::Budget),
            "all" => Ok(Self::All),
            _ => Err(format!("Unknown ignore scope: {}", s)),
        }
    }
}

/// A bank transaction (owned by the sync subsystem, read-only here except
/// for the income annotation written back when an income pattern is confirmed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub date: NaiveDate,
    /// Bank-provided raw descriptor
    pub description: String,
    /// Aggregator-resolved merchant name, when available
    pub merchant_name: Option<String>,
    /// User-assigned display name; wins over all other descriptors
    pub user_display_name: Option<String>,
    /// Negative = money in, positive = money out
    pub amount: f64,
    pub category: Option<String>,
    /// Tri-state user flag: Some(true)/Some(false) overrides all heuristics
    pub explicit_income: Option<bool>,
    pub ignore_scope: IgnoreScope,
    /// Annotated by the engine when an income pattern is confirmed
    pub is_income: Option<bool>,
    pub income_kind: Option<IncomeKind>,
    pub created_at: DateTime<Utc>,
}

/// A new transaction from the bank-sync feed (before DB insertion)
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub merchant_name: Option<String>,
    pub user_display_name: Option<String>,
    pub amount: f64,
    pub category: Option<String>,
    pub explicit_income: Option<bool>,
    #[serde(default)]
    pub ignore_scope: IgnoreScope,
}

/// Recurrence cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "bi-weekly")]
    BiWeekly,
    #[serde(rename = "semi-monthly")]
    SemiMonthly,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "quarterly")]
    Quarterly,
    #[serde(rename = "yearly")]
    Yearly,
    #[serde(rename = "irregular")]
    Irregular,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::SemiMonthly => "semi-monthly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Irregular => "irregular",
        }
    }

    /// Occurrences per year, used for yearly-cost aggregation.
    /// Irregular patterns contribute nothing to projections.
    pub fn annualization_factor(&self) -> f64 {
        match self {
            Self::Weekly => 52.0,
            Self::BiWeekly => 26.0,
            Self::SemiMonthly => 24.0,
            Self::Monthly => 12.0,
            Self::Quarterly => 4.0,
            Self::Yearly => 1.0,
            Self::Irregular => 0.0,
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "bi-weekly" | "biweekly" => Ok(Self::BiWeekly),
            "semi-monthly" | "semimonthly" => Ok(Self::SemiMonthly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" | "annual" | "annually" => Ok(Self::Yearly),
            "irregular" => Ok(Self::Irregular),
            _ => Err(format!("Unknown frequency: {}", s)),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How trustworthy a detected pattern is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

/// Which detector produced a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    /// User-entered; matched strictly against the transaction window
    Manual,
    /// AI-assisted suggestion the user confirmed; matched loosely
    Ai,
    /// Unsupervised detector output, surfaced without persistence
    Basic,
}

impl PatternSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ai => "ai",
            Self::Basic => "basic",
        }
    }
}

impl std::str::FromStr for PatternSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "ai" => Ok(Self::Ai),
            "basic" => Ok(Self::Basic),
            _ => Err(format!("Unknown pattern source: {}", s)),
        }
    }
}

/// Semantic income category from the keyword taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeKind {
    Payroll,
    Government,
    Retirement,
    SelfEmployment,
    Investment,
    Rental,
    Refund,
    Transfer,
    Other,
}

impl IncomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payroll => "payroll",
            Self::Government => "government",
            Self::Retirement => "retirement",
            Self::SelfEmployment => "self_employment",
            Self::Investment => "investment",
            Self::Rental => "rental",
            Self::Refund => "refund",
            Self::Transfer => "transfer",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for IncomeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "payroll" => Ok(Self::Payroll),
            "government" => Ok(Self::Government),
            "retirement" => Ok(Self::Retirement),
            "self_employment" => Ok(Self::SelfEmployment),
            "investment" => Ok(Self::Investment),
            "rental" => Ok(Self::Rental),
            "refund" => Ok(Self::Refund),
            "transfer" => Ok(Self::Transfer),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown income kind: {}", s)),
        }
    }
}

/// A confirmed recurring obligation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringPattern {
    pub id: i64,
    pub user_id: String,
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    /// Most recent observed amount
    pub amount: f64,
    pub average_amount: f64,
    pub is_income: bool,
    /// None = no projectable next date (irregular)
    pub next_expected_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub confidence: Confidence,
    /// Stored count at last refresh; callers always receive the live count
    pub occurrences: i64,
    pub bill_type: Option<String>,
    pub source: PatternSource,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating or updating a pattern (manual add or suggestion confirm)
#[derive(Debug, Clone, Deserialize)]
pub struct NewPattern {
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    pub amount: f64,
    pub average_amount: f64,
    pub is_income: bool,
    pub next_expected_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub confidence: Confidence,
    pub occurrences: i64,
    pub bill_type: Option<String>,
    pub source: PatternSource,
}

/// Lifecycle state of an AI-proposed pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Confirmed,
    Denied,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Denied => "denied",
        }
    }
}

/// A pending, unconfirmed pattern proposed by the AI-assisted detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSuggestion {
    pub id: i64,
    pub user_id: String,
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    pub amount: f64,
    pub average_amount: f64,
    pub is_income: bool,
    pub next_expected_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub confidence: Confidence,
    pub occurrences: i64,
    pub bill_type: Option<String>,
    /// Why the detector proposed this pattern
    pub detection_reason: Option<String>,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

/// A user's explicit rejection of a detected pattern.
///
/// Binding on all future detection until removed (which happens automatically
/// when the user manually re-adds the merchant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dismissal {
    pub id: i64,
    pub user_id: String,
    pub merchant_key: String,
    pub original_descriptor: String,
    pub reason: Option<String>,
    pub denial_reason: Option<String>,
    /// Tokens extracted for future learning; advisory only
    pub keywords: Vec<String>,
    pub dismissed_at: DateTime<Utc>,
}

/// A persisted income-specific pattern (paychecks, benefits, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeSource {
    pub id: i64,
    pub user_id: String,
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    pub average_amount: f64,
    /// Day-of-month anchor for monthly/semi-monthly projection
    pub pay_day: Option<u32>,
    pub employer_name: Option<String>,
    pub income_kind: IncomeKind,
    pub confidence: Confidence,
    pub first_seen_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
    pub total_received: f64,
    pub occurrences: i64,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// One reconciled recurring item as returned to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct RecurringItem {
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    pub amount: f64,
    pub average_amount: f64,
    pub is_income: bool,
    #[serde(serialize_with = "serialize_projection")]
    pub next_expected_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub confidence: Confidence,
    /// Live count of matching transactions in the window (manual patterns
    /// with no feed match fall back to their stored count)
    pub occurrences: i64,
    pub bill_type: Option<String>,
    pub source: PatternSource,
}

/// Result of the read operation
#[derive(Debug, Clone, Serialize)]
pub struct RecurringOverview {
    pub items: Vec<RecurringItem>,
    pub yearly_spend_estimate: f64,
    pub pending_suggestion_count: i64,
    /// Whether AI-assisted patterns contributed to this result
    pub ai_powered: bool,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

/// Result of an explicit re-analyze request
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub items: Vec<RecurringItem>,
    pub yearly_spend_estimate: f64,
    pub pending_suggestion_count: i64,
    pub ai_powered: bool,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub from_cache: bool,
    /// False when the user has too little history for AI-assisted analysis
    pub enough_history: bool,
}

/// Batch action over suggestion ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionAction {
    Confirm,
    Deny,
}

/// Per-batch counts reported back to the caller
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchActionSummary {
    pub confirmed: usize,
    pub denied: usize,
    pub failed: usize,
}
