//! Trade journal: closed paper trades persisted to SQLite.
//!
//! Used to:
//! - Restore a channel's realised R and P&L for the day after a restart
//! - Carry paper equity across restarts
//! - List trades from the command line

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{ChannelId, ClosedTrade};

/// Journal backed by a SQLite pool. Cheap to clone.
#[derive(Clone)]
pub struct Journal {
    pool: SqlitePool,
}

/// Stored paper trade record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: String,
    pub channel_id: String,
    pub symbol: String,
    pub qty: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub initial_stop: f64,
    pub r_multiple: f64,
    pub pnl: f64,
    pub exit_reason: String,
    pub trading_day: String,
    pub opened_at: String,
    pub closed_at: String,
}

/// Realised totals for one channel and day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySummary {
    pub r_multiple: f64,
    pub pnl: Decimal,
    pub trades: u32,
}

impl Journal {
    /// Open (or create) the journal at `database_url`.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let journal = Self { pool };
        journal.run_migrations().await?;

        Ok(journal)
    }

    /// Private in-memory journal. One connection, since every
    /// `:memory:` connection is a separate database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let journal = Self { pool };
        journal.run_migrations().await?;

        Ok(journal)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paper_trades (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                qty INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                initial_stop REAL NOT NULL,
                r_multiple REAL NOT NULL,
                pnl REAL NOT NULL,
                exit_reason TEXT NOT NULL,
                trading_day TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_paper_trades_channel_day ON paper_trades(channel_id, trading_day)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Writes ====================

    /// Record a closed trade. Re-recording the same id is a no-op.
    pub async fn record_trade(&self, trade: &ClosedTrade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO paper_trades
                (id, channel_id, symbol, qty, entry_price, exit_price, initial_stop,
                 r_multiple, pnl, exit_reason, trading_day, opened_at, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(trade.channel.to_string())
        .bind(&trade.symbol)
        .bind(i64::try_from(trade.qty).unwrap_or(i64::MAX))
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.initial_stop)
        .bind(trade.r_multiple)
        .bind(trade.pnl)
        .bind(trade.exit_reason.as_str())
        .bind(trade.trading_day.to_string())
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.closed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to record paper trade")?;

        Ok(())
    }

    // ==================== Reads ====================

    /// Realised R, P&L and trade count for a channel on a trading day.
    pub async fn daily_summary(&self, channel: ChannelId, day: NaiveDate) -> Result<DailySummary> {
        let (r_multiple, pnl, trades): (f64, f64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(r_multiple), 0.0), COALESCE(SUM(pnl), 0.0), COUNT(*)
            FROM paper_trades
            WHERE channel_id = ? AND trading_day = ?
            "#,
        )
        .bind(channel.to_string())
        .bind(day.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(DailySummary {
            r_multiple,
            pnl: Decimal::try_from(pnl).unwrap_or(Decimal::ZERO).round_dp(2),
            trades: u32::try_from(trades).unwrap_or(u32::MAX),
        })
    }

    /// Total realised P&L for a channel across all days.
    pub async fn realized_pnl(&self, channel: ChannelId) -> Result<Decimal> {
        let (pnl,): (f64,) =
            sqlx::query_as("SELECT COALESCE(SUM(pnl), 0.0) FROM paper_trades WHERE channel_id = ?")
                .bind(channel.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(Decimal::try_from(pnl).unwrap_or(Decimal::ZERO).round_dp(2))
    }

    /// Trades closed on `day`, oldest first. All channels unless one is given.
    pub async fn trades_for_day(&self, day: NaiveDate, channel: Option<ChannelId>) -> Result<Vec<StoredTrade>> {
        let trades = match channel {
            Some(channel) => {
                sqlx::query_as::<_, StoredTrade>(
                    "SELECT * FROM paper_trades WHERE trading_day = ? AND channel_id = ? ORDER BY closed_at",
                )
                .bind(day.to_string())
                .bind(channel.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredTrade>(
                    "SELECT * FROM paper_trades WHERE trading_day = ? ORDER BY closed_at",
                )
                .bind(day.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(trades)
    }
}
