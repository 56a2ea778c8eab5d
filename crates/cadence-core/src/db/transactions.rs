//! Transaction feed operations

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{IgnoreScope, IncomeKind, NewTransaction, Transaction};

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let date_str: String = row.get(2)?;
    let ignore_scope_str: String = row.get(9)?;
    let explicit_income: Option<i64> = row.get(8)?;
    let is_income: Option<i64> = row.get(10)?;
    let income_kind_str: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
        description: row.get(3)?,
        merchant_name: row.get(4)?,
        user_display_name: row.get(5)?,
        amount: row.get(6)?,
        category: row.get(7)?,
        explicit_income: explicit_income.map(|v| v != 0),
        ignore_scope: IgnoreScope::from_str(&ignore_scope_str).unwrap_or_default(),
        is_income: is_income.map(|v| v != 0),
        income_kind: income_kind_str.and_then(|s| IncomeKind::from_str(&s).ok()),
        created_at: parse_datetime(&created_at_str),
    })
}

const TRANSACTION_COLUMNS: &str = "id, user_id, date, description, merchant_name, \
     user_display_name, amount, category, explicit_income, ignore_scope, \
     is_income, income_kind, created_at";

impl Database {
    /// Insert a batch of transactions from the bank-sync feed
    pub fn insert_transactions(&self, user_id: &str, txs: &[NewTransaction]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for t in txs {
            tx.execute(
                r#"
                INSERT INTO transactions
                    (user_id, date, description, merchant_name, user_display_name,
                     amount, category, explicit_income, ignore_scope)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    user_id,
                    t.date.to_string(),
                    t.description,
                    t.merchant_name,
                    t.user_display_name,
                    t.amount,
                    t.category,
                    t.explicit_income.map(i64::from),
                    t.ignore_scope.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(txs.len())
    }

    /// List a user's transactions on or after a date, oldest first
    pub fn list_transactions_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ? AND date >= ? ORDER BY date ASC, id ASC",
            TRANSACTION_COLUMNS
        ))?;

        let txs = stmt
            .query_map(params![user_id, since.to_string()], map_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txs)
    }

    /// Total transaction count for a user (used for the history gate)
    pub fn count_transactions(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Annotate transactions as income of a given kind.
    ///
    /// Written back when an income pattern is confirmed so heuristics never
    /// have to re-derive the decision for these rows.
    pub fn annotate_income(&self, ids: &[i64], income_kind: IncomeKind) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut updated = 0;

        for id in ids {
            updated += tx.execute(
                "UPDATE transactions SET is_income = 1, income_kind = ? WHERE id = ?",
                params![income_kind.as_str(), id],
            )?;
        }

        tx.commit()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IgnoreScope;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_tx(description: &str, amount: f64, d: NaiveDate) -> NewTransaction {
        NewTransaction {
            date: d,
            description: description.to_string(),
            merchant_name: None,
            user_display_name: None,
            amount,
            category: None,
            explicit_income: None,
            ignore_scope: IgnoreScope::None,
        }
    }

    #[test]
    fn test_insert_and_list_scoped_by_user() {
        let db = Database::in_memory().unwrap();
        db.insert_transactions("u1", &[new_tx("NETFLIX.COM", 15.99, date(2024, 1, 15))])
            .unwrap();
        db.insert_transactions("u2", &[new_tx("SPOTIFY", 9.99, date(2024, 1, 20))])
            .unwrap();

        let txs = db.list_transactions_since("u1", date(2024, 1, 1)).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "NETFLIX.COM");
        assert_eq!(db.count_transactions("u2").unwrap(), 1);
    }

    #[test]
    fn test_list_respects_window_start() {
        let db = Database::in_memory().unwrap();
        db.insert_transactions(
            "u1",
            &[
                new_tx("OLD CHARGE", 5.0, date(2023, 1, 1)),
                new_tx("NEW CHARGE", 5.0, date(2024, 6, 1)),
            ],
        )
        .unwrap();

        let txs = db.list_transactions_since("u1", date(2024, 1, 1)).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "NEW CHARGE");
    }

    #[test]
    fn test_annotate_income_round_trips() {
        let db = Database::in_memory().unwrap();
        db.insert_transactions("u1", &[new_tx("ACME PAYROLL", -1500.0, date(2024, 1, 15))])
            .unwrap();

        let txs = db.list_transactions_since("u1", date(2024, 1, 1)).unwrap();
        let updated = db.annotate_income(&[txs[0].id], IncomeKind::Payroll).unwrap();
        assert_eq!(updated, 1);

        let txs = db.list_transactions_since("u1", date(2024, 1, 1)).unwrap();
        assert_eq!(txs[0].is_income, Some(true));
        assert_eq!(txs[0].income_kind, Some(IncomeKind::Payroll));
    }
}
