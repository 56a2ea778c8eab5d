//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Transaction feed and income annotations
//! - `patterns` - Confirmed recurring patterns
//! - `suggestions` - AI-proposed patterns pending review
//! - `dismissals` - User rejections of detected patterns
//! - `income_sources` - Persisted income-specific patterns
//! - `analysis_cache` - Per-user cache of the last AI-assisted analysis

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::{Error, Result};

mod analysis_cache;
mod dismissals;
mod income_sources;
mod patterns;
mod suggestions;
mod transactions;

pub use analysis_cache::CachedAnalysis;
pub(crate) use income_sources::NewIncomeSource;
pub(crate) use suggestions::NewSuggestion;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CADENCE_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the
/// same key, regardless of database path. This allows moving/renaming/
/// restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"cadence-salt-v1.";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    // Extract the hash portion for use as SQLCipher key (hex encoded)
    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CADENCE_DB_KEY` environment variable to be set. The database
    /// is encrypted using SQLCipher with a key derived from the passphrase
    /// via Argon2.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use an unencrypted database (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: Only use for development or testing. For production, use
    /// `new()` with `CADENCE_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/cadence_test_{}_{}.db", std::process::id(), id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Cache size: ~8MB (2000 pages * 4KB default page size)
            PRAGMA cache_size = 2000;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            PRAGMA temp_store = MEMORY;

            -- Bank transaction feed
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                merchant_name TEXT,
                user_display_name TEXT,
                amount REAL NOT NULL,
                category TEXT,
                explicit_income INTEGER,
                ignore_scope TEXT NOT NULL DEFAULT 'none',
                is_income INTEGER,
                income_kind TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date
                ON transactions(user_id, date);

            -- Confirmed recurring patterns, unique per user + merchant key
            CREATE TABLE IF NOT EXISTS recurring_patterns (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                display_name TEXT NOT NULL,
                frequency TEXT NOT NULL,
                amount REAL NOT NULL,
                average_amount REAL NOT NULL,
                is_income INTEGER NOT NULL DEFAULT 0,
                next_expected_date TEXT,
                last_seen_date TEXT,
                category TEXT,
                confidence TEXT NOT NULL,
                occurrences INTEGER NOT NULL DEFAULT 0,
                bill_type TEXT,
                source TEXT NOT NULL,
                last_analyzed_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, merchant_key)
            );

            -- AI-proposed patterns pending user review
            CREATE TABLE IF NOT EXISTS recurring_suggestions (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                display_name TEXT NOT NULL,
                frequency TEXT NOT NULL,
                amount REAL NOT NULL,
                average_amount REAL NOT NULL,
                is_income INTEGER NOT NULL DEFAULT 0,
                next_expected_date TEXT,
                last_seen_date TEXT,
                category TEXT,
                confidence TEXT NOT NULL,
                occurrences INTEGER NOT NULL DEFAULT 0,
                bill_type TEXT,
                detection_reason TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, merchant_key)
            );

            CREATE INDEX IF NOT EXISTS idx_suggestions_user_status
                ON recurring_suggestions(user_id, status);

            -- User rejections, binding until removed
            CREATE TABLE IF NOT EXISTS dismissals (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                original_descriptor TEXT NOT NULL,
                reason TEXT,
                denial_reason TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                dismissed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, merchant_key)
            );

            -- Persisted income-specific patterns
            CREATE TABLE IF NOT EXISTS income_sources (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                display_name TEXT NOT NULL,
                frequency TEXT NOT NULL,
                average_amount REAL NOT NULL,
                pay_day INTEGER,
                employer_name TEXT,
                income_kind TEXT NOT NULL,
                confidence TEXT NOT NULL,
                first_seen_date TEXT,
                last_seen_date TEXT,
                total_received REAL NOT NULL DEFAULT 0,
                occurrences INTEGER NOT NULL DEFAULT 0,
                is_verified INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, merchant_key)
            );

            -- One cached AI-assisted analysis per user
            CREATE TABLE IF NOT EXISTS analysis_cache (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                analyzed_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database_creates_schema() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('transactions', 'recurring_patterns', 'recurring_suggestions',
                  'dismissals', 'income_sources', 'analysis_cache')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 6);
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let a = derive_key("correct horse battery staple").unwrap();
        let b = derive_key("correct horse battery staple").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, derive_key("different passphrase").unwrap());
    }

    #[test]
    fn test_parse_datetime_round_trip() {
        let dt = parse_datetime("2024-06-15 10:30:00");
        assert_eq!(dt.to_rfc3339(), "2024-06-15T10:30:00+00:00");
    }
}
