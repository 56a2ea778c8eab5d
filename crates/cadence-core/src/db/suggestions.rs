//! Suggestion operations
//!
//! Suggestions are AI-proposed patterns awaiting user review. Re-running the
//! analysis upserts by merchant key, so a pending suggestion never duplicates
//! and a decided one keeps its status.

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Confidence, Frequency, RecurringSuggestion, SuggestionStatus};

/// Fields for inserting or refreshing a suggestion
#[derive(Debug, Clone)]
pub(crate) struct NewSuggestion {
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
    pub detection_reason: Option<String>,
}

const SUGGESTION_COLUMNS: &str = "id, user_id, merchant_key, display_name, frequency, amount, \
     average_amount, is_income, next_expected_date, last_seen_date, category, confidence, \
     occurrences, bill_type, detection_reason, status, created_at";

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn map_suggestion(row: &Row<'_>) -> rusqlite::Result<RecurringSuggestion> {
    let frequency_str: String = row.get(4)?;
    let is_income: i64 = row.get(7)?;
    let next_str: Option<String> = row.get(8)?;
    let last_str: Option<String> = row.get(9)?;
    let confidence_str: String = row.get(11)?;
    let status_str: String = row.get(15)?;
    let created_at_str: String = row.get(16)?;

    Ok(RecurringSuggestion {
        id: row.get(0)?,
        user_id: row.get(1)?,
        merchant_key: row.get(2)?,
        display_name: row.get(3)?,
        frequency: Frequency::from_str(&frequency_str).unwrap_or(Frequency::Irregular),
        amount: row.get(5)?,
        average_amount: row.get(6)?,
        is_income: is_income != 0,
        next_expected_date: parse_date(next_str),
        last_seen_date: parse_date(last_str),
        category: row.get(10)?,
        confidence: Confidence::from_str(&confidence_str).unwrap_or(Confidence::Low),
        occurrences: row.get(12)?,
        bill_type: row.get(13)?,
        detection_reason: row.get(14)?,
        status: match status_str.as_str() {
            "confirmed" => SuggestionStatus::Confirmed,
            "denied" => SuggestionStatus::Denied,
            _ => SuggestionStatus::Pending,
        },
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Upsert a suggestion by (user, merchant key).
    ///
    /// Refreshes the detection stats but never reopens a suggestion the user
    /// has already confirmed or denied.
    pub(crate) fn upsert_suggestion(&self, user_id: &str, s: &NewSuggestion) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO recurring_suggestions
                (user_id, merchant_key, display_name, frequency, amount, average_amount,
                 is_income, next_expected_date, last_seen_date, category, confidence,
                 occurrences, bill_type, detection_reason, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            ON CONFLICT(user_id, merchant_key) DO UPDATE SET
                display_name = excluded.display_name,
                frequency = excluded.frequency,
                amount = excluded.amount,
                average_amount = excluded.average_amount,
                is_income = excluded.is_income,
                next_expected_date = excluded.next_expected_date,
                last_seen_date = excluded.last_seen_date,
                category = excluded.category,
                confidence = excluded.confidence,
                occurrences = excluded.occurrences,
                bill_type = excluded.bill_type,
                detection_reason = excluded.detection_reason
            WHERE recurring_suggestions.status = 'pending'
            "#,
            params![
                user_id,
                s.merchant_key,
                s.display_name,
                s.frequency.as_str(),
                s.amount,
                s.average_amount,
                s.is_income as i64,
                s.next_expected_date.map(|d| d.to_string()),
                s.last_seen_date.map(|d| d.to_string()),
                s.category,
                s.confidence.as_str(),
                s.occurrences,
                s.bill_type,
                s.detection_reason,
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM recurring_suggestions WHERE user_id = ? AND merchant_key = ?",
            params![user_id, s.merchant_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// List suggestions for a user, optionally filtered by status
    pub fn list_suggestions(
        &self,
        user_id: &str,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<RecurringSuggestion>> {
        let conn = self.conn()?;

        if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM recurring_suggestions WHERE user_id = ? AND status = ? \
                 ORDER BY merchant_key ASC",
                SUGGESTION_COLUMNS
            ))?;
            let suggestions = stmt
                .query_map(params![user_id, status.as_str()], map_suggestion)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(suggestions)
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM recurring_suggestions WHERE user_id = ? \
                 ORDER BY merchant_key ASC",
                SUGGESTION_COLUMNS
            ))?;
            let suggestions = stmt
                .query_map(params![user_id], map_suggestion)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(suggestions)
        }
    }

    /// Get a suggestion by id, scoped to the user
    pub fn get_suggestion(&self, user_id: &str, id: i64) -> Result<Option<RecurringSuggestion>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!(
                "SELECT {} FROM recurring_suggestions WHERE user_id = ? AND id = ?",
                SUGGESTION_COLUMNS
            ),
            params![user_id, id],
            map_suggestion,
        );

        match result {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the user's decision on a suggestion
    pub fn set_suggestion_status(
        &self,
        user_id: &str,
        id: i64,
        status: SuggestionStatus,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE recurring_suggestions SET status = ? WHERE user_id = ? AND id = ?",
            params![status.as_str(), user_id, id],
        )?;
        Ok(updated > 0)
    }

    /// Count suggestions the user has not yet decided on
    pub fn count_pending_suggestions(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM recurring_suggestions WHERE user_id = ? AND status = 'pending'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_suggestion(key: &str) -> NewSuggestion {
        NewSuggestion {
            merchant_key: key.to_string(),
            display_name: "Hulu".to_string(),
            frequency: Frequency::Monthly,
            amount: 7.99,
            average_amount: 7.99,
            is_income: false,
            next_expected_date: NaiveDate::from_ymd_opt(2024, 7, 3),
            last_seen_date: NaiveDate::from_ymd_opt(2024, 6, 3),
            category: None,
            confidence: Confidence::Medium,
            occurrences: 4,
            bill_type: Some("subscription".to_string()),
            detection_reason: Some("4 charges at a monthly interval".to_string()),
        }
    }

    #[test]
    fn test_upsert_and_pending_count() {
        let db = Database::in_memory().unwrap();
        db.upsert_suggestion("u1", &new_suggestion("hulu com")).unwrap();
        db.upsert_suggestion("u1", &new_suggestion("hulu com")).unwrap();

        assert_eq!(db.count_pending_suggestions("u1").unwrap(), 1);
        assert_eq!(db.count_pending_suggestions("u2").unwrap(), 0);
    }

    #[test]
    fn test_decided_suggestion_not_reopened_by_reanalysis() {
        let db = Database::in_memory().unwrap();
        let id = db.upsert_suggestion("u1", &new_suggestion("hulu com")).unwrap();
        assert!(db
            .set_suggestion_status("u1", id, SuggestionStatus::Denied)
            .unwrap());

        // A later analysis proposes the same merchant again
        db.upsert_suggestion("u1", &new_suggestion("hulu com")).unwrap();

        let stored = db.get_suggestion("u1", id).unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Denied);
        assert_eq!(db.count_pending_suggestions("u1").unwrap(), 0);
    }

    #[test]
    fn test_list_filters_by_status() {
        let db = Database::in_memory().unwrap();
        let a = db.upsert_suggestion("u1", &new_suggestion("hulu com")).unwrap();
        db.upsert_suggestion("u1", &new_suggestion("netflix com")).unwrap();
        db.set_suggestion_status("u1", a, SuggestionStatus::Confirmed)
            .unwrap();

        let pending = db
            .list_suggestions("u1", Some(SuggestionStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].merchant_key, "netflix com");
        assert_eq!(db.list_suggestions("u1", None).unwrap().len(), 2);
    }
}
