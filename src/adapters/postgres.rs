use super::repository::Repository;
use crate::domain::{TokenSnapshot, TrackedWallet, TradeSide, User, WatchlistEntry, WhaleTrade};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn tracked_from_row(r: &PgRow) -> TrackedWallet {
    TrackedWallet {
        id: r.get("id"),
        owner: r.get("owner"),
        address: r.get("address"),
        label: r.get("label"),
        created_at: r.get("created_at"),
    }
}

fn whale_trade_from_row(r: &PgRow) -> Option<WhaleTrade> {
    let side: String = r.get("side");
    let side = match TradeSide::try_from(side.as_str()) {
        Ok(side) => side,
        Err(e) => {
            warn!("Skipping whale trade row: {}", e);
            return None;
        }
    };

    Some(WhaleTrade {
        id: r.get("id"),
        token_address: r.get("token_address"),
        wallet: r.get("wallet"),
        side,
        amount_usd: r.get("amount_usd"),
        signature: r.get("signature"),
        timestamp: r.get("timestamp"),
    })
}

#[async_trait]
impl Repository for PostgresStore {
    // ==================== Users ====================

    #[instrument(skip(self))]
    async fn upsert_user(&self, wallet: &str) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (wallet, created_at, last_seen_at)
            VALUES ($1, NOW(), NOW())
            ON CONFLICT (wallet) DO UPDATE SET last_seen_at = NOW()
            RETURNING wallet, created_at, last_seen_at
            "#,
        )
        .bind(wallet)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            wallet: row.get("wallet"),
            created_at: row.get("created_at"),
            last_seen_at: row.get("last_seen_at"),
        })
    }

    async fn get_user(&self, wallet: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT wallet, created_at, last_seen_at FROM users WHERE wallet = $1")
            .bind(wallet)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| User {
            wallet: r.get("wallet"),
            created_at: r.get("created_at"),
            last_seen_at: r.get("last_seen_at"),
        }))
    }

    // ==================== Tracked Wallets ====================

    #[instrument(skip(self, wallet), fields(owner = %wallet.owner))]
    async fn add_tracked_wallet(&self, wallet: &TrackedWallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_wallets (id, owner, address, label, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (owner, address) DO NOTHING
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.owner)
        .bind(&wallet.address)
        .bind(&wallet.label)
        .bind(wallet.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tracked_wallets(&self, owner: &str) -> Result<Vec<TrackedWallet>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, address, label, created_at
            FROM tracked_wallets WHERE owner = $1
            ORDER BY created_at
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tracked_from_row).collect())
    }

    async fn remove_tracked_wallet(&self, owner: &str, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracked_wallets WHERE owner = $1 AND id = $2")
            .bind(owner)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Token Snapshots ====================

    async fn save_token_snapshot(&self, snapshot: &TokenSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO token_snapshots
                (token_address, symbol, price_usd, liquidity_usd, volume_24h, safety_score, captured_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&snapshot.token_address)
        .bind(&snapshot.symbol)
        .bind(snapshot.price_usd)
        .bind(snapshot.liquidity_usd)
        .bind(snapshot.volume_24h)
        .bind(snapshot.safety_score.map(i16::from))
        .bind(snapshot.captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn token_snapshots(
        &self,
        token_address: &str,
        limit: usize,
    ) -> Result<Vec<TokenSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT token_address, symbol, price_usd, liquidity_usd, volume_24h, safety_score, captured_at
            FROM token_snapshots
            WHERE token_address = $1
            ORDER BY captured_at DESC
            LIMIT $2
            "#,
        )
        .bind(token_address)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| TokenSnapshot {
                token_address: r.get("token_address"),
                symbol: r.get("symbol"),
                price_usd: r.get("price_usd"),
                liquidity_usd: r.get("liquidity_usd"),
                volume_24h: r.get("volume_24h"),
                safety_score: r
                    .get::<Option<i16>, _>("safety_score")
                    .and_then(|s| u8::try_from(s).ok()),
                captured_at: r.get("captured_at"),
            })
            .collect())
    }

    // ==================== Watchlist ====================

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watchlist (owner, token_address, note, added_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner, token_address) DO UPDATE SET note = EXCLUDED.note
            "#,
        )
        .bind(&entry.owner)
        .bind(&entry.token_address)
        .bind(&entry.note)
        .bind(entry.added_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_from_watchlist(&self, owner: &str, token_address: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM watchlist WHERE owner = $1 AND token_address = $2")
            .bind(owner)
            .bind(token_address)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn watchlist(&self, owner: &str) -> Result<Vec<WatchlistEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT owner, token_address, note, added_at
            FROM watchlist WHERE owner = $1
            ORDER BY added_at
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| WatchlistEntry {
                owner: r.get("owner"),
                token_address: r.get("token_address"),
                note: r.get("note"),
                added_at: r.get("added_at"),
            })
            .collect())
    }

    // ==================== Whale Trades ====================

    #[instrument(skip(self, trade), fields(token = %trade.token_address))]
    async fn record_whale_trade(&self, trade: &WhaleTrade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO whale_trades (id, token_address, wallet, side, amount_usd, signature, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(trade.id)
        .bind(&trade.token_address)
        .bind(&trade.wallet)
        .bind(trade.side.as_str())
        .bind(trade.amount_usd)
        .bind(&trade.signature)
        .bind(trade.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn whale_trades(
        &self,
        token_address: &str,
        min_usd: Decimal,
        limit: usize,
    ) -> Result<Vec<WhaleTrade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, token_address, wallet, side, amount_usd, signature, timestamp
            FROM whale_trades
            WHERE token_address = $1 AND amount_usd >= $2
            ORDER BY timestamp DESC
            LIMIT $3
            "#,
        )
        .bind(token_address)
        .bind(min_usd)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(whale_trade_from_row).collect())
    }
}
