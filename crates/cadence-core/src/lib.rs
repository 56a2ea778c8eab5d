//! Cadence Core Library
//!
//! Recurring financial pattern detection for bank transaction feeds:
//! - Database access and migrations (SQLCipher via rusqlite)
//! - Merchant descriptor normalization and matching
//! - Interval/amount statistics, frequency and confidence classification
//! - Income/bill taxonomy
//! - Next-occurrence projection
//! - Unsupervised and AI-assisted detectors
//! - Snapshot reconciliation into the final recurring-item list
//! - Pluggable local AI backends (Ollama, mock)

pub mod ai;
pub mod db;
pub mod detect;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod schedule;
pub mod stats;
pub mod taxonomy;

pub use ai::{AIBackend, AIClient, AIRecurringPattern, MerchantSummary, MockBackend, OllamaBackend};
pub use db::{CachedAnalysis, Database};
pub use engine::{EngineConfig, RecurringEngine};
pub use error::{Error, Result};
pub use models::{
    AnalysisOutcome, BatchActionSummary, Confidence, Dismissal, Frequency, IgnoreScope,
    IncomeKind, IncomeSource, NewPattern, NewTransaction, PatternSource, RecurringItem,
    RecurringOverview, RecurringPattern, RecurringSuggestion, SuggestionAction, SuggestionStatus,
    Transaction,
};
