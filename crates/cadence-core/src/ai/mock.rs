//! Mock backend for testing
//!
//! Deterministic stand-in for a real model. Judges recurrence from the
//! summary statistics alone, so tests never need a running LLM server.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::Confidence;
use crate::stats::frequency_for_interval;

use super::types::{AIRecurringPattern, MerchantSummary};
use super::AIBackend;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self { healthy: true }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn analyze_recurring(
        &self,
        summaries: &[MerchantSummary],
    ) -> Result<Vec<AIRecurringPattern>> {
        if !self.healthy {
            return Err(Error::Upstream("mock backend is offline".to_string()));
        }

        let mut patterns = Vec::new();

        for summary in summaries {
            if summary.occurrences < 2 || summary.sample_dates.len() < 2 {
                continue;
            }

            let total_days = (*summary.sample_dates.last().unwrap_or(&summary.sample_dates[0])
                - summary.sample_dates[0])
                .num_days() as f64;
            let avg_interval = total_days / (summary.sample_dates.len() - 1) as f64;

            let Some(frequency) = frequency_for_interval(avg_interval) else {
                continue;
            };
            // Mirror a real model's tendency to trust longer histories more
            let confidence = if summary.occurrences >= 4 {
                Confidence::High
            } else {
                Confidence::Medium
            };

            patterns.push(AIRecurringPattern {
                name: summary.name.clone(),
                frequency,
                amount: Some(summary.avg_amount),
                is_income: summary.is_income,
                confidence,
                bill_type: if summary.is_income {
                    Some("income".to_string())
                } else {
                    Some("subscription".to_string())
                },
                reason: Some(format!(
                    "{} occurrences at a ~{:.0}-day interval",
                    summary.occurrences, avg_interval
                )),
            });
        }

        Ok(patterns)
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::models::Frequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_mock_detects_monthly_cadence() {
        let observations: Vec<(NaiveDate, f64)> =
            (1..=4).map(|m| (date(2024, m, 15), 15.99)).collect();
        let summary =
            MerchantSummary::from_observations("NETFLIX.COM", &observations, None, false);

        let patterns = MockBackend::new().analyze_recurring(&[summary]).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, Frequency::Monthly);
    }

    #[tokio::test]
    async fn test_mock_skips_single_occurrence() {
        let summary = MerchantSummary::from_observations(
            "ONE OFF STORE",
            &[(date(2024, 3, 1), 99.0)],
            None,
            false,
        );
        let patterns = MockBackend::new().analyze_recurring(&[summary]).await.unwrap();
        assert!(patterns.is_empty());
    }
}
