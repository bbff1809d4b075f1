use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Scheduler run already in progress")]
    AlreadyRunning,

    #[error("Cancelled")]
    Cancelled,
}

impl RadarError {
    /// Cancellation is an orderly stop, not a failure worth alerting on.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RadarError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, RadarError>;
