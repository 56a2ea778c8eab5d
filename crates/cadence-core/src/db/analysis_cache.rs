//! Analysis cache operations
//!
//! One row per user holding the last AI-assisted detection result as JSON.
//! Freshness (the TTL) is the engine's concern; this layer only stores and
//! returns what it has.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{parse_datetime, Database};
use crate::detect::DetectedPattern;
use crate::error::Result;

/// Payload stored per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub patterns: Vec<DetectedPattern>,
    /// Whether a model actually contributed, as opposed to a basic-detector
    /// fallback that still got cached to avoid hammering a failing backend
    pub ai_powered: bool,
    #[serde(skip, default = "Utc::now")]
    pub analyzed_at: DateTime<Utc>,
}

impl Database {
    /// Fetch the cached analysis for a user, regardless of age
    pub fn get_cached_analysis(&self, user_id: &str) -> Result<Option<CachedAnalysis>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT payload, analyzed_at FROM analysis_cache WHERE user_id = ?",
            params![user_id],
            |row| {
                let payload: String = row.get(0)?;
                let analyzed_at: String = row.get(1)?;
                Ok((payload, analyzed_at))
            },
        );

        match result {
            Ok((payload, analyzed_at)) => {
                let mut cached: CachedAnalysis = serde_json::from_str(&payload)?;
                cached.analyzed_at = parse_datetime(&analyzed_at);
                Ok(Some(cached))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store the analysis result for a user, replacing any previous one
    pub fn put_cached_analysis(
        &self,
        user_id: &str,
        patterns: &[DetectedPattern],
        ai_powered: bool,
    ) -> Result<()> {
        let conn = self.conn()?;
        let payload = serde_json::to_string(&CachedAnalysis {
            patterns: patterns.to_vec(),
            ai_powered,
            analyzed_at: Utc::now(),
        })?;

        conn.execute(
            r#"
            INSERT INTO analysis_cache (user_id, payload, analyzed_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id) DO UPDATE SET
                payload = excluded.payload,
                analyzed_at = CURRENT_TIMESTAMP
            "#,
            params![user_id, payload],
        )?;

        Ok(())
    }

    /// Drop the cached analysis for a user.
    ///
    /// Called after every mutation that can change the result (confirm,
    /// deny, manual add/edit/delete, transaction ingest) so stale items are
    /// never served.
    pub fn invalidate_analysis_cache(&self, user_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM analysis_cache WHERE user_id = ?",
            params![user_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Frequency};
    use chrono::NaiveDate;

    fn pattern(key: &str) -> DetectedPattern {
        DetectedPattern {
            merchant_key: key.to_string(),
            display_name: "Netflix".to_string(),
            frequency: Frequency::Monthly,
            amount: 15.99,
            average_amount: 15.99,
            is_income: false,
            next_expected_date: NaiveDate::from_ymd_opt(2024, 7, 15),
            last_seen_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            category: None,
            confidence: Confidence::High,
            occurrences: 6,
            income_kind: None,
            bill_type: None,
            reason: None,
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let db = Database::in_memory().unwrap();
        db.put_cached_analysis("u1", &[pattern("netflix com")], true)
            .unwrap();

        let cached = db.get_cached_analysis("u1").unwrap().unwrap();
        assert!(cached.ai_powered);
        assert_eq!(cached.patterns.len(), 1);
        assert_eq!(cached.patterns[0].merchant_key, "netflix com");
        assert!(db.get_cached_analysis("u2").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_previous_entry() {
        let db = Database::in_memory().unwrap();
        db.put_cached_analysis("u1", &[pattern("netflix com")], true)
            .unwrap();
        db.put_cached_analysis("u1", &[], false).unwrap();

        let cached = db.get_cached_analysis("u1").unwrap().unwrap();
        assert!(!cached.ai_powered);
        assert!(cached.patterns.is_empty());
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let db = Database::in_memory().unwrap();
        db.put_cached_analysis("u1", &[pattern("netflix com")], true)
            .unwrap();
        db.invalidate_analysis_cache("u1").unwrap();
        assert!(db.get_cached_analysis("u1").unwrap().is_none());
    }
}
