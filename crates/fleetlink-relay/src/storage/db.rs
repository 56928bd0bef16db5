//! SQLite database handle for the FleetLink relay.

use std::path::Path;

use sqlx::{Pool, Sqlite};
use tracing::info;

use fleetlink_core::db::{open_pool, open_pool_in_memory};

pub use fleetlink_core::db::DatabaseError;

/// Handle to the relay's device and telemetry store.
#[derive(Clone)]
pub struct RelayDatabase {
    pool: Pool<Sqlite>,
}

impl RelayDatabase {
    /// Open or create the database at the given path and run migrations.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let pool = open_pool(path).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let pool = open_pool_in_memory().await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        info!("Relay database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
