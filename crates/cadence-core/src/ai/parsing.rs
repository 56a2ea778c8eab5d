//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in extra prose; these functions slice
//! out the outermost object before deserializing.

use std::str::FromStr;

use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{Confidence, Frequency};

use super::types::{AIRecurringPattern, RawRecurringAnalysis};

fn truncate_for_error(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", &s[..200])
    } else {
        s.to_string()
    }
}

/// Parse a recurring-pattern analysis from an AI response.
///
/// Entries with an unknown frequency or confidence are dropped with a
/// warning rather than failing the whole batch, and `low`-confidence
/// judgments are discarded here so no caller ever surfaces them.
pub fn parse_recurring_analysis(response: &str) -> Result<Vec<AIRecurringPattern>> {
    let response = response.trim();

    let start = response.find('{');
    let end = response.rfind('}');

    let raw: RawRecurringAnalysis = match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidInput(format!(
                    "Invalid JSON from AI: {} | Raw: {}",
                    e,
                    truncate_for_error(json_str)
                ))
            })?
        }
        _ => {
            return Err(Error::InvalidInput(format!(
                "No JSON found in AI response | Raw: {}",
                truncate_for_error(response)
            )))
        }
    };

    let mut patterns = Vec::with_capacity(raw.patterns.len());
    for entry in raw.patterns {
        let frequency = match Frequency::from_str(&entry.frequency) {
            Ok(f) => f,
            Err(_) => {
                warn!(name = %entry.name, frequency = %entry.frequency, "Dropping AI pattern with unknown frequency");
                continue;
            }
        };
        let confidence = match Confidence::from_str(&entry.confidence) {
            Ok(c) => c,
            Err(_) => {
                warn!(name = %entry.name, confidence = %entry.confidence, "Dropping AI pattern with unknown confidence");
                continue;
            }
        };
        if confidence == Confidence::Low {
            continue;
        }

        patterns.push(AIRecurringPattern {
            name: entry.name,
            frequency,
            amount: entry.amount,
            is_income: entry.is_income.unwrap_or(false),
            confidence,
            bill_type: entry.bill_type,
            reason: entry.reason,
        });
    }

    Ok(patterns)
}
