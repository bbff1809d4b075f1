//! Notifier trait definition and shared error types.

use std::collections::HashMap;

use radar_core::RadarError;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Channel rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<NotifyError> for RadarError {
    fn from(e: NotifyError) -> Self {
        RadarError::Notify(e.to_string())
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Notification {
    /// Short one-line summary.
    pub subject: String,
    /// The full message text.
    pub body: String,
    /// Identifiers of what the message is about (rule, event, trigger).
    pub metadata: HashMap<String, String>,
}

/// Trait for messaging channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to `destination` (a channel id for chat
    /// platforms).
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self, destination: &str) -> Result<(), NotifyError> {
        let test_notification = Notification {
            subject: "[TEST] Event radar".to_string(),
            body: "This is a test notification from the event radar.".to_string(),
            metadata: HashMap::from([("trigger".to_string(), "test".to_string())]),
        };
        self.send(destination, &test_notification).await
    }

    /// Human-readable name for this channel (e.g., "discord", "webhook").
    fn channel_name(&self) -> &str;
}
