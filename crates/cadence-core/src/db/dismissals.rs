//! Dismissal operations

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::Dismissal;

fn map_dismissal(row: &Row<'_>) -> rusqlite::Result<Dismissal> {
    let keywords_json: String = row.get(6)?;
    let dismissed_at_str: String = row.get(7)?;

    Ok(Dismissal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        merchant_key: row.get(2)?,
        original_descriptor: row.get(3)?,
        reason: row.get(4)?,
        denial_reason: row.get(5)?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        dismissed_at: parse_datetime(&dismissed_at_str),
    })
}

impl Database {
    /// Record (or refresh) a dismissal for a merchant key
    pub fn upsert_dismissal(
        &self,
        user_id: &str,
        merchant_key: &str,
        original_descriptor: &str,
        reason: Option<&str>,
        denial_reason: Option<&str>,
        keywords: &[String],
    ) -> Result<i64> {
        let conn = self.conn()?;
        let keywords_json = serde_json::to_string(keywords)?;

        conn.execute(
            r#"
            INSERT INTO dismissals
                (user_id, merchant_key, original_descriptor, reason, denial_reason, keywords)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, merchant_key) DO UPDATE SET
                original_descriptor = excluded.original_descriptor,
                reason = excluded.reason,
                denial_reason = excluded.denial_reason,
                keywords = excluded.keywords,
                dismissed_at = CURRENT_TIMESTAMP
            "#,
            params![
                user_id,
                merchant_key,
                original_descriptor,
                reason,
                denial_reason,
                keywords_json,
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM dismissals WHERE user_id = ? AND merchant_key = ?",
            params![user_id, merchant_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// List all dismissals for a user
    pub fn list_dismissals(&self, user_id: &str) -> Result<Vec<Dismissal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, merchant_key, original_descriptor, reason, denial_reason, \
             keywords, dismissed_at FROM dismissals WHERE user_id = ? ORDER BY merchant_key ASC",
        )?;

        let dismissals = stmt
            .query_map(params![user_id], map_dismissal)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(dismissals)
    }

    /// Remove a dismissal (the user re-added the merchant); returns whether
    /// a row existed
    pub fn remove_dismissal(&self, user_id: &str, merchant_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM dismissals WHERE user_id = ? AND merchant_key = ?",
            params![user_id, merchant_key],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_round_trips_keywords() {
        let db = Database::in_memory().unwrap();
        let keywords = vec!["planet".to_string(), "fitness".to_string()];
        db.upsert_dismissal(
            "u1",
            "planet fitness",
            "PLANET FITNESS #1234",
            Some("not recurring"),
            None,
            &keywords,
        )
        .unwrap();

        let stored = db.list_dismissals("u1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].keywords, keywords);
        assert_eq!(stored[0].reason.as_deref(), Some("not recurring"));
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let db = Database::in_memory().unwrap();
        db.upsert_dismissal("u1", "planet fitness", "PLANET FITNESS", None, None, &[])
            .unwrap();
        db.upsert_dismissal(
            "u1",
            "planet fitness",
            "PLANET FITNESS #99",
            None,
            Some("cancelled membership"),
            &[],
        )
        .unwrap();

        let stored = db.list_dismissals("u1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].denial_reason.as_deref(),
            Some("cancelled membership")
        );
    }

    #[test]
    fn test_remove_dismissal() {
        let db = Database::in_memory().unwrap();
        db.upsert_dismissal("u1", "planet fitness", "PLANET FITNESS", None, None, &[])
            .unwrap();

        assert!(db.remove_dismissal("u1", "planet fitness").unwrap());
        assert!(!db.remove_dismissal("u1", "planet fitness").unwrap());
        assert!(db.list_dismissals("u1").unwrap().is_empty());
    }
}
