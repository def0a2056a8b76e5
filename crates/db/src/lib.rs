//! Relational store access for Libris.
//!
//! Wraps a `sqlx` SQLite pool. Handlers take a transaction per request with
//! [`Database::begin`]; schema is contributed by modules as [`Migration`]s and
//! applied once at startup with [`Database::apply_migrations`].

use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

mod migrate;

pub use migrate::Migration;

/// Shared handle to the backing store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a pool against `url`, creating the database file if it is missing.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url '{}'", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to database at '{}'", url))?;

        tracing::info!(target: "libris-db", %url, max_connections, "database pool ready");

        Ok(Self { pool })
    }

    /// Private in-memory database backed by a single long-lived connection.
    ///
    /// Every pooled connection to `sqlite::memory:` would otherwise see its own
    /// empty database.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory database url")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to open in-memory database")?;

        Ok(Self { pool })
    }

    /// Begin a transaction. Dropping it without `commit` rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all pooled connections, waiting for checked-out ones to return.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(target: "libris-db", "database pool closed");
    }
}
