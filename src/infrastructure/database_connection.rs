// Database connection and pool management
// SQLite catalog storage through sqlx

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        // Every connection to an in-memory url opens its own private database
        let in_memory = db_path.starts_with(":memory:") || db_path.contains("mode=memory");
        if !in_memory {
            if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(10)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to open catalog database")?;

        debug!(database_url, "catalog database connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_products_sql = r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY,
                vendor TEXT NOT NULL,
                office_id INTEGER,
                vendor_sku TEXT NOT NULL,
                url TEXT,
                price_cents INTEGER,
                special_price_cents INTEGER,
                is_special BOOLEAN NOT NULL DEFAULT 0,
                sku TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                price_expiration TEXT,
                is_inventory BOOLEAN NOT NULL DEFAULT 0,
                description TEXT,
                image_url TEXT,
                updated_at TEXT
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_products_vendor_office ON products (vendor, office_id);
            CREATE INDEX IF NOT EXISTS idx_products_price_expiration ON products (price_expiration);
        "#;

        sqlx::query(create_products_sql).execute(&self.pool).await?;
        sqlx::raw_sql(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
