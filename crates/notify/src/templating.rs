//! Minijinja template rendering for notification messages.
//!
//! The subject and body of an event notification come from fixed built-in
//! templates. A fresh [`minijinja::Environment`] is created per render call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use radar_core::{EventSnapshot, Rule, TriggerKind};

use crate::traits::{Notification, NotifyError};

/// Built-in message body for an event notification.
pub const EVENT_TEMPLATE: &str = "\
**{{ event.title }}**
URL: {{ event.url }}
Start: {{ event.started_at }}
End: {{ event.ended_at }}
Participants: {{ event.accepted }}/{{ event.limit }} (waiting {{ event.waiting }})
Trigger: {{ trigger }}
Rule: {{ rule.name }}
{% if rule.description %}
{{ rule.description }}
{% endif %}
";

const SUBJECT_TEMPLATE: &str = "[{{ trigger }}] {{ event.title }}";

/// Rendered in place of timestamps the upstream did not provide.
pub const UNKNOWN_TIME: &str = "unknown";

/// Context data available to notification templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub rule: RuleContext,
    pub event: EventContext,
    /// Trigger kind name, e.g. `"almost_full"`.
    pub trigger: String,
    /// Render time in RFC 3339.
    pub now: String,
}

/// Rule metadata exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleContext {
    pub id: i64,
    pub name: String,
    /// `None` when the rule has no description.
    pub description: Option<String>,
}

/// Event snapshot fields exposed to templates, timestamps pre-formatted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventContext {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub started_at: String,
    pub ended_at: String,
    pub accepted: i32,
    pub limit: i32,
    pub waiting: i32,
    pub occupancy_percent: Option<i64>,
}

impl TemplateContext {
    pub fn new(rule: &Rule, snapshot: &EventSnapshot, trigger: TriggerKind, now: DateTime<Utc>) -> Self {
        let description = rule.description.trim();
        Self {
            rule: RuleContext {
                id: rule.id,
                name: rule.name.clone(),
                description: (!description.is_empty()).then(|| description.to_string()),
            },
            event: EventContext {
                id: snapshot.event_id,
                title: snapshot.title.clone(),
                url: snapshot.event_url.clone(),
                started_at: format_time(snapshot.started_at),
                ended_at: format_time(snapshot.ended_at),
                accepted: snapshot.accepted,
                limit: snapshot.limit,
                waiting: snapshot.waiting,
                occupancy_percent: snapshot.occupancy_percent(),
            },
            trigger: trigger.as_str().to_string(),
            now: now.to_rfc3339(),
        }
    }
}

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(t) => t.format("%a, %d %b %Y %H:%M:%S UTC").to_string(),
        None => UNKNOWN_TIME.to_string(),
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        // Block tags on their own line leave no blank line behind.
        env.set_trim_blocks(true);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render the built-in event message.
    pub fn render_event(&self, ctx: &TemplateContext) -> Result<Notification, NotifyError> {
        let subject = self.render(SUBJECT_TEMPLATE, ctx)?;
        let body = self.render(EVENT_TEMPLATE, ctx)?;
        Ok(Notification {
            subject,
            body,
            metadata: HashMap::from([
                ("rule_id".to_string(), ctx.rule.id.to_string()),
                ("event_id".to_string(), ctx.event.id.to_string()),
                ("trigger".to_string(), ctx.trigger.clone()),
            ]),
        })
    }
}
