//! Confirmed recurring pattern operations

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Confidence, Frequency, NewPattern, PatternSource, RecurringPattern};

const PATTERN_COLUMNS: &str = "id, user_id, merchant_key, display_name, frequency, amount, \
     average_amount, is_income, next_expected_date, last_seen_date, category, confidence, \
     occurrences, bill_type, source, last_analyzed_at, created_at";

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn map_pattern(row: &Row<'_>) -> rusqlite::Result<RecurringPattern> {
    let frequency_str: String = row.get(4)?;
    let is_income: i64 = row.get(7)?;
    let next_str: Option<String> = row.get(8)?;
    let last_str: Option<String> = row.get(9)?;
    let confidence_str: String = row.get(11)?;
    let source_str: String = row.get(14)?;
    let analyzed_str: Option<String> = row.get(15)?;
    let created_at_str: String = row.get(16)?;

    Ok(RecurringPattern {
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
        source: PatternSource::from_str(&source_str).unwrap_or(PatternSource::Manual),
        last_analyzed_at: analyzed_str.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Upsert a confirmed pattern by (user, merchant key).
    ///
    /// Re-confirming an existing merchant updates the stored stats in place
    /// rather than creating a duplicate row.
    pub fn upsert_pattern(&self, user_id: &str, pattern: &NewPattern) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO recurring_patterns
                (user_id, merchant_key, display_name, frequency, amount, average_amount,
                 is_income, next_expected_date, last_seen_date, category, confidence,
                 occurrences, bill_type, source, last_analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
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
                source = excluded.source,
                last_analyzed_at = CURRENT_TIMESTAMP
            "#,
            params![
                user_id,
                pattern.merchant_key,
                pattern.display_name,
                pattern.frequency.as_str(),
                pattern.amount,
                pattern.average_amount,
                pattern.is_income as i64,
                pattern.next_expected_date.map(|d| d.to_string()),
                pattern.last_seen_date.map(|d| d.to_string()),
                pattern.category,
                pattern.confidence.as_str(),
                pattern.occurrences,
                pattern.bill_type,
                pattern.source.as_str(),
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM recurring_patterns WHERE user_id = ? AND merchant_key = ?",
            params![user_id, pattern.merchant_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// List all confirmed patterns for a user
    pub fn list_patterns(&self, user_id: &str) -> Result<Vec<RecurringPattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM recurring_patterns WHERE user_id = ? ORDER BY merchant_key ASC",
            PATTERN_COLUMNS
        ))?;

        let patterns = stmt
            .query_map(params![user_id], map_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    /// Get a confirmed pattern by merchant key
    pub fn get_pattern(&self, user_id: &str, merchant_key: &str) -> Result<Option<RecurringPattern>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!(
                "SELECT {} FROM recurring_patterns WHERE user_id = ? AND merchant_key = ?",
                PATTERN_COLUMNS
            ),
            params![user_id, merchant_key],
            map_pattern,
        );

        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a confirmed pattern; returns whether a row existed
    pub fn delete_pattern(&self, user_id: &str, merchant_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM recurring_patterns WHERE user_id = ? AND merchant_key = ?",
            params![user_id, merchant_key],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pattern(key: &str) -> NewPattern {
        NewPattern {
            merchant_key: key.to_string(),
            display_name: "Netflix".to_string(),
            frequency: Frequency::Monthly,
            amount: 15.99,
            average_amount: 15.99,
            is_income: false,
            next_expected_date: NaiveDate::from_ymd_opt(2024, 7, 15),
            last_seen_date: NaiveDate::from_ymd_opt(2024, 6, 15),
            category: Some("entertainment".to_string()),
            confidence: Confidence::High,
            occurrences: 6,
            bill_type: Some("subscription".to_string()),
            source: PatternSource::Manual,
        }
    }

    #[test]
    fn test_upsert_round_trips_all_fields() {
        let db = Database::in_memory().unwrap();
        db.upsert_pattern("u1", &new_pattern("netflix com")).unwrap();

        let stored = db.get_pattern("u1", "netflix com").unwrap().unwrap();
        assert_eq!(stored.display_name, "Netflix");
        assert_eq!(stored.frequency, Frequency::Monthly);
        assert_eq!(stored.confidence, Confidence::High);
        assert_eq!(stored.source, PatternSource::Manual);
        assert_eq!(
            stored.next_expected_date,
            NaiveDate::from_ymd_opt(2024, 7, 15)
        );
    }

    #[test]
    fn test_upsert_is_idempotent_by_merchant_key() {
        let db = Database::in_memory().unwrap();
        let first = db.upsert_pattern("u1", &new_pattern("netflix com")).unwrap();

        let mut updated = new_pattern("netflix com");
        updated.amount = 17.99;
        let second = db.upsert_pattern("u1", &updated).unwrap();

        assert_eq!(first, second);
        assert_eq!(db.list_patterns("u1").unwrap().len(), 1);
        assert_eq!(
            db.get_pattern("u1", "netflix com").unwrap().unwrap().amount,
            17.99
        );
    }

    #[test]
    fn test_patterns_scoped_by_user() {
        let db = Database::in_memory().unwrap();
        db.upsert_pattern("u1", &new_pattern("netflix com")).unwrap();

        assert!(db.get_pattern("u2", "netflix com").unwrap().is_none());
        assert!(!db.delete_pattern("u2", "netflix com").unwrap());
        assert!(db.delete_pattern("u1", "netflix com").unwrap());
    }
}
