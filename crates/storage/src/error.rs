use thiserror::Error;

use radar_core::RadarError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("could not connect after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<StorageError> for RadarError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Cancelled => RadarError::Cancelled,
            other => RadarError::Storage(other.to_string()),
        }
    }
}
