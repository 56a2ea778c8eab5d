//! Types shared by AI backends

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Confidence, Frequency};
use crate::taxonomy;

/// Maximum sample dates included per merchant summary. The model only needs
/// enough to judge cadence; full history bloats the prompt.
pub const MAX_SAMPLE_DATES: usize = 5;

/// Compact per-merchant digest sent to the model instead of raw transactions
#[derive(Debug, Clone, Serialize)]
pub struct MerchantSummary {
    pub name: String,
    pub occurrences: i64,
    pub min_amount: f64,
    pub avg_amount: f64,
    pub max_amount: f64,
    /// Up to [`MAX_SAMPLE_DATES`] most recent dates, oldest first
    pub sample_dates: Vec<NaiveDate>,
    pub category: Option<String>,
    pub is_income: bool,
}

impl MerchantSummary {
    /// Build a summary from a merchant's sorted (date, amount) observations.
    pub fn from_observations(
        name: &str,
        observations: &[(NaiveDate, f64)],
        category: Option<&str>,
        is_income: bool,
    ) -> Self {
        let amounts: Vec<f64> = observations.iter().map(|(_, a)| a.abs()).collect();
        let min_amount = amounts.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_amount = amounts.iter().cloned().fold(0.0, f64::max);
        let avg_amount = if amounts.is_empty() {
            0.0
        } else {
            amounts.iter().sum::<f64>() / amounts.len() as f64
        };

        let skip = observations.len().saturating_sub(MAX_SAMPLE_DATES);
        let sample_dates = observations.iter().skip(skip).map(|(d, _)| *d).collect();

        Self {
            name: name.to_string(),
            occurrences: observations.len() as i64,
            min_amount: if min_amount.is_finite() { min_amount } else { 0.0 },
            avg_amount,
            max_amount,
            sample_dates,
            category: category.map(String::from),
            is_income,
        }
    }
}

/// One recurring-pattern judgment returned by the model.
///
/// Stats (dates, averages) stay authoritative on our side; the model only
/// contributes the recurrence judgment, cadence, and bill type.
#[derive(Debug, Clone, Serialize)]
pub struct AIRecurringPattern {
    pub name: String,
    pub frequency: Frequency,
    pub amount: Option<f64>,
    pub is_income: bool,
    pub confidence: Confidence,
    pub bill_type: Option<String>,
    pub reason: Option<String>,
}

/// Wire shape of one pattern in the model's JSON reply
#[derive(Debug, Deserialize)]
pub(crate) struct RawRecurringPattern {
    pub name: String,
    pub frequency: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub is_income: Option<bool>,
    pub confidence: String,
    #[serde(default)]
    pub bill_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Wire shape of the model's full reply
#[derive(Debug, Deserialize)]
pub(crate) struct RawRecurringAnalysis {
    #[serde(default)]
    pub patterns: Vec<RawRecurringPattern>,
}

/// Build the analysis prompt from merchant summaries.
///
/// The taxonomy's income categories are enumerated so the model's
/// vocabulary stays aligned with ours.
pub(crate) fn build_analysis_prompt(summaries: &[MerchantSummary]) -> String {
    let mut lines = Vec::with_capacity(summaries.len());
    for s in summaries {
        let dates: Vec<String> = s.sample_dates.iter().map(|d| d.to_string()).collect();
        lines.push(format!(
            "- {} | {} transactions | amounts {:.2}..{:.2} (avg {:.2}) | dates: {} | category: {}{}",
            s.name,
            s.occurrences,
            s.min_amount,
            s.max_amount,
            s.avg_amount,
            dates.join(", "),
            s.category.as_deref().unwrap_or("unknown"),
            if s.is_income { " | money in" } else { "" },
        ));
    }

    let kinds: Vec<&str> = taxonomy::INCOME_TAXONOMY
        .iter()
        .map(|(kind, _)| kind.as_str())
        .collect();

    format!(
        "You are analyzing bank transaction groups to find recurring bills, \
subscriptions, and income.\n\nMerchant groups:\n{}\n\n\
For each group that is genuinely recurring, output one entry. Skip one-off \
purchases and irregular shopping.\n\
Respond with ONLY a JSON object, no other text:\n\
{{\"patterns\": [{{\"name\": \"<merchant>\", \"frequency\": \
\"weekly|bi-weekly|semi-monthly|monthly|quarterly|yearly\", \"amount\": 0.0, \
\"is_income\": false, \"confidence\": \"high|medium|low\", \"bill_type\": \
\"subscription|utility|insurance|loan|rent|membership|income|other\", \
\"reason\": \"<one sentence>\"}}]}}\n\
Income kinds for context: {}.",
        lines.join("\n"),
        kinds.join(", "),
    )
}
