//! PostgreSQL persistence layer for daybook.
//!
//! Exposes a combined [`Database`] context holding the connection pool
//! and one repository per table. Repositories implement the store traits
//! from `daybook-core`, so the HTTP layer serves them behind the same
//! interface the client-side façade uses.

pub mod entries;
pub mod pool;
pub mod settings;

pub use daybook_core::*;

pub use entries::{build_update_clause, PgEntryRepository, QueryParam};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use settings::PgSettingRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Diary entry repository.
    pub entries: PgEntryRepository,
    /// Key/value settings repository.
    pub settings: PgSettingRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            entries: PgEntryRepository::new(pool.clone()),
            settings: PgSettingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Create the schema if it does not exist yet. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS diary_entries (
                id           BIGSERIAL PRIMARY KEY,
                title        TEXT NOT NULL DEFAULT '',
                content      TEXT NOT NULL DEFAULT '',
                content_type TEXT NOT NULL DEFAULT 'markdown',
                mood         TEXT NOT NULL DEFAULT 'neutral',
                weather      TEXT NOT NULL DEFAULT 'unknown',
                images       TEXT NOT NULL DEFAULT '[]',
                location     TEXT,
                tags         TEXT NOT NULL DEFAULT '[]',
                hidden       BOOLEAN NOT NULL DEFAULT FALSE,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_diary_entries_created_at \
             ON diary_entries (created_at DESC, id DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS app_settings (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
