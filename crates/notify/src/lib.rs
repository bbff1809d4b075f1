//! Outbound messaging for event notifications.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable messaging channels
//! - Discord bot and generic webhook notifier implementations
//! - Minijinja rendering of the event notification message

pub mod discord;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use discord::DiscordNotifier;
pub use templating::{TemplateContext, TemplateRenderer};
pub use traits::{Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
