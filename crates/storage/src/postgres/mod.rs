//! PostgreSQL-backed stores.
//!
//! [`PgStore`] wraps a shared [`PgPool`] and implements every storage trait;
//! the implementations are split by table across the submodules.

mod events;
mod ledger;
mod logs;
mod rules;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use radar_core::config::DatabaseConfig;

use crate::error::StorageError;

/// Handle to the scheduler's tables. Cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect to PostgreSQL, retrying up to `config.connect_attempts` times.
///
/// Waiting between attempts stops early when `cancel` fires.
pub async fn connect_with_retry(
    config: &DatabaseConfig,
    cancel: &CancellationToken,
) -> Result<PgPool, StorageError> {
    let attempts = config.connect_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await;

        match result {
            Ok(pool) => {
                info!(attempt, "PostgreSQL connected");
                return Ok(pool);
            }
            Err(e) if attempt >= attempts => {
                return Err(StorageError::Connect {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "PostgreSQL connect failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                    _ = tokio::time::sleep(config.connect_retry_interval) => {}
                }
            }
        }
    }
}

/// Apply pending schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}
