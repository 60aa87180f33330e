//! Sqlite-backed watchlist store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_core::{AddOutcome, MarketDataError, WatchlistEntry, WatchlistStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::OnceCell;

fn db_err(e: sqlx::Error) -> MarketDataError {
    MarketDataError::Database(e.to_string())
}

#[derive(Clone)]
pub struct WatchlistDb {
    pool: SqlitePool,
}

impl WatchlistDb {
    pub async fn connect(database_url: &str) -> Result<Self, MarketDataError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_err)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), MarketDataError> {
        let schema = include_str!("../schema.sql");

        // sqlx executes one statement at a time.
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl WatchlistStore for WatchlistDb {
    async fn symbols_for_user(&self, user_id: &str) -> Result<Vec<String>, MarketDataError> {
        let rows = sqlx::query(
            "SELECT symbol FROM watchlist WHERE user_id = ? ORDER BY added_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| r.get::<String, _>("symbol"))
            .collect())
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<WatchlistEntry>, MarketDataError> {
        let rows = sqlx::query(
            "SELECT user_id, symbol, company, added_at FROM watchlist WHERE user_id = ? ORDER BY added_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| WatchlistEntry {
                user_id: r.get::<String, _>("user_id"),
                symbol: r.get::<String, _>("symbol"),
                company: r.get::<String, _>("company"),
                added_at: r.get::<DateTime<Utc>, _>("added_at"),
            })
            .collect())
    }

    async fn add(
        &self,
        user_id: &str,
        symbol: &str,
        company: &str,
    ) -> Result<AddOutcome, MarketDataError> {
        let symbol = symbol.trim().to_uppercase();
        let company = company.trim();

        let existing = sqlx::query("SELECT 1 FROM watchlist WHERE user_id = ? AND symbol = ?")
            .bind(user_id)
            .bind(&symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if existing.is_some() {
            return Ok(AddOutcome::AlreadyPresent);
        }

        sqlx::query("INSERT INTO watchlist (user_id, symbol, company, added_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(&symbol)
            .bind(company)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(AddOutcome::Added)
    }

    async fn remove(&self, user_id: &str, symbol: &str) -> Result<(), MarketDataError> {
        sqlx::query("DELETE FROM watchlist WHERE user_id = ? AND symbol = ?")
            .bind(user_id)
            .bind(symbol.trim().to_uppercase())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<bool, MarketDataError> {
        let result = sqlx::query("DELETE FROM watchlist WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Lazily-connected store handle with single-flight initialization:
/// concurrent first callers share one in-flight connection attempt, and a
/// failed attempt leaves the cell empty so the next caller retries.
pub struct LazyWatchlistDb {
    database_url: String,
    cell: OnceCell<WatchlistDb>,
}

impl LazyWatchlistDb {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&WatchlistDb, MarketDataError> {
        self.cell
            .get_or_try_init(|| WatchlistDb::connect(&self.database_url))
            .await
    }
}
