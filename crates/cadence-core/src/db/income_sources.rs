//! Income source operations

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Confidence, Frequency, IncomeKind, IncomeSource};

/// Fields for inserting or refreshing an income source
#[derive(Debug, Clone)]
pub(crate) struct NewIncomeSource {
    pub merchant_key: String,
    pub display_name: String,
    pub frequency: Frequency,
    pub average_amount: f64,
    pub pay_day: Option<u32>,
    pub employer_name: Option<String>,
    pub income_kind: IncomeKind,
    pub confidence: Confidence,
    pub first_seen_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
    pub total_received: f64,
    pub occurrences: i64,
    pub is_verified: bool,
}

const INCOME_SOURCE_COLUMNS: &str = "id, user_id, merchant_key, display_name, frequency, \
     average_amount, pay_day, employer_name, income_kind, confidence, first_seen_date, \
     last_seen_date, total_received, occurrences, is_verified, created_at";

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn map_income_source(row: &Row<'_>) -> rusqlite::Result<IncomeSource> {
    let frequency_str: String = row.get(4)?;
    let pay_day: Option<i64> = row.get(6)?;
    let kind_str: String = row.get(8)?;
    let confidence_str: String = row.get(9)?;
    let first_str: Option<String> = row.get(10)?;
    let last_str: Option<String> = row.get(11)?;
    let is_verified: i64 = row.get(14)?;
    let created_at_str: String = row.get(15)?;

    Ok(IncomeSource {
        id: row.get(0)?,
        user_id: row.get(1)?,
        merchant_key: row.get(2)?,
        display_name: row.get(3)?,
        frequency: Frequency::from_str(&frequency_str).unwrap_or(Frequency::Irregular),
        average_amount: row.get(5)?,
        pay_day: pay_day.and_then(|d| u32::try_from(d).ok()),
        employer_name: row.get(7)?,
        income_kind: IncomeKind::from_str(&kind_str).unwrap_or(IncomeKind::Other),
        confidence: Confidence::from_str(&confidence_str).unwrap_or(Confidence::Low),
        first_seen_date: parse_date(first_str),
        last_seen_date: parse_date(last_str),
        total_received: row.get(12)?,
        occurrences: row.get(13)?,
        is_verified: is_verified != 0,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Upsert an income source by (user, merchant key)
    pub(crate) fn upsert_income_source(&self, user_id: &str, s: &NewIncomeSource) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO income_sources
                (user_id, merchant_key, display_name, frequency, average_amount, pay_day,
                 employer_name, income_kind, confidence, first_seen_date, last_seen_date,
                 total_received, occurrences, is_verified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, merchant_key) DO UPDATE SET
                display_name = excluded.display_name,
                frequency = excluded.frequency,
                average_amount = excluded.average_amount,
                pay_day = excluded.pay_day,
                employer_name = excluded.employer_name,
                income_kind = excluded.income_kind,
                confidence = excluded.confidence,
                first_seen_date = excluded.first_seen_date,
                last_seen_date = excluded.last_seen_date,
                total_received = excluded.total_received,
                occurrences = excluded.occurrences,
                is_verified = excluded.is_verified
            "#,
            params![
                user_id,
                s.merchant_key,
                s.display_name,
                s.frequency.as_str(),
                s.average_amount,
                s.pay_day.map(|d| d as i64),
                s.employer_name,
                s.income_kind.as_str(),
                s.confidence.as_str(),
                s.first_seen_date.map(|d| d.to_string()),
                s.last_seen_date.map(|d| d.to_string()),
                s.total_received,
                s.occurrences,
                s.is_verified as i64,
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM income_sources WHERE user_id = ? AND merchant_key = ?",
            params![user_id, s.merchant_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// List all income sources for a user
    pub fn list_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM income_sources WHERE user_id = ? ORDER BY merchant_key ASC",
            INCOME_SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map(params![user_id], map_income_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sources)
    }

    /// Delete an income source; returns whether a row existed
    pub fn delete_income_source(&self, user_id: &str, merchant_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM income_sources WHERE user_id = ? AND merchant_key = ?",
            params![user_id, merchant_key],
        )?;
        Ok(deleted > 0)
    }
}
