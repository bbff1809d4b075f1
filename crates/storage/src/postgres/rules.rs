use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use radar_core::{Rule, TriggerKind};

use super::PgStore;
use crate::error::StorageError;
use crate::traits::RuleSource;

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    user_id: i64,
    guild_id: String,
    channel_id: String,
    channel_name: String,
    name: String,
    description: String,
    location: String,
    capacity_threshold: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl RuleSource for PgStore {
    async fn list_active(&self) -> Result<Vec<Rule>, StorageError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, user_id, guild_id, channel_id, channel_name, name,
                    description, location, capacity_threshold, is_active,
                    created_at, updated_at
             FROM rules
             WHERE is_active = TRUE
             ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let keyword_rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT rule_id, keyword
             FROM rule_keywords
             WHERE rule_id = ANY($1)
             ORDER BY rule_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let type_rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT rule_id, notify_key
             FROM rule_notify_types
             WHERE rule_id = ANY($1)
             ORDER BY rule_id, notify_key",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut keywords: HashMap<i64, Vec<String>> = HashMap::new();
        for (rule_id, keyword) in keyword_rows {
            let keyword = keyword.trim().to_string();
            if !keyword.is_empty() {
                keywords.entry(rule_id).or_default().push(keyword);
            }
        }

        let mut triggers: HashMap<i64, Vec<TriggerKind>> = HashMap::new();
        for (rule_id, key) in type_rows {
            match key.parse::<TriggerKind>() {
                Ok(kind) => triggers.entry(rule_id).or_default().push(kind),
                Err(e) => warn!(rule_id, error = %e, "Ignoring stored notify type"),
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| Rule {
                keywords: keywords.remove(&row.id).unwrap_or_default(),
                triggers: triggers.remove(&row.id).unwrap_or_default(),
                id: row.id,
                user_id: row.user_id,
                guild_id: row.guild_id,
                channel_id: row.channel_id,
                channel_name: row.channel_name,
                name: row.name,
                description: row.description,
                location: row.location,
                capacity_threshold: row.capacity_threshold,
                is_active: row.is_active,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }
}
