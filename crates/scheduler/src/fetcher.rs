//! connpass events API client.
//!
//! Every call passes through the shared [`RateGate`] first. Raw events are
//! normalized into [`EventSnapshot`]s; a malformed timestamp becomes `None`
//! instead of failing the page.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use radar_core::config::ConnpassConfig;
use radar_core::{EventSnapshot, RadarError};

use crate::gate::RateGate;

const USER_AGENT: &str = concat!("event-radar/", env!("CARGO_PKG_VERSION"));

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 1024;

/// Source of event snapshots for a keyword search.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Search events matching `keyword`, optionally restricted to `location`
    /// (empty means no filter).
    async fn fetch(
        &self,
        keyword: &str,
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EventSnapshot>, RadarError>;
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Option<Vec<WireEvent>>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: i64,
    // Every field but `id` may arrive as an explicit null.
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    ended_at: Option<String>,
    #[serde(default)]
    limit: Option<i32>,
    #[serde(default)]
    accepted: Option<i32>,
    #[serde(default)]
    waiting: Option<i32>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    owner_nickname: Option<String>,
    #[serde(default)]
    group: Option<WireGroup>,
}

#[derive(Debug, Deserialize)]
struct WireGroup {
    #[serde(default)]
    title: Option<String>,
}

pub struct ConnpassClient {
    base_url: String,
    api_key: String,
    page_size: u32,
    client: reqwest::Client,
    gate: Arc<RateGate>,
}

impl ConnpassClient {
    /// Fails with [`RadarError::Config`] when no API key is configured.
    pub fn new(config: &ConnpassConfig, gate: Arc<RateGate>) -> Result<Self, RadarError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RadarError::Config("CONNPASS_API_KEY is required".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RadarError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            page_size: config.page_size,
            client,
            gate,
        })
    }

    async fn request(&self, keyword: &str, location: &str) -> Result<Vec<EventSnapshot>, RadarError> {
        let count = self.page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![("keyword", keyword), ("count", count.as_str())];
        if !location.trim().is_empty() {
            query.push(("address", location));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .header("X-API-Key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| RadarError::Upstream(format!("request connpass: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(RadarError::Upstream(format!(
                "connpass status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let payload: EventsResponse = response
            .json()
            .await
            .map_err(|e| RadarError::Upstream(format!("decode connpass response: {e}")))?;

        let retrieved_at = Utc::now();
        Ok(payload
            .events
            .unwrap_or_default()
            .into_iter()
            .map(|ev| normalize(ev, retrieved_at))
            .collect())
    }
}

#[async_trait::async_trait]
impl EventSource for ConnpassClient {
    async fn fetch(
        &self,
        keyword: &str,
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EventSnapshot>, RadarError> {
        let _permit = self.gate.acquire(cancel).await?;
        debug!(keyword, location, "Calling connpass");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RadarError::Cancelled),
            result = self.request(keyword, location) => result,
        }
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// SHA-256 hex digest over `"{id}:{title}:{updated_at}:{accepted}:{limit}"`.
///
/// `updated_at` is the upstream string as received, not the parsed value.
pub fn fingerprint(id: i64, title: &str, updated_at: &str, accepted: i32, limit: i32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{id}:{title}:{updated_at}:{accepted}:{limit}").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize(ev: WireEvent, retrieved_at: DateTime<Utc>) -> EventSnapshot {
    let title = ev.title.unwrap_or_default();
    let limit = ev.limit.unwrap_or_default();
    let accepted = ev.accepted.unwrap_or_default();
    let updated_raw = ev.updated_at.as_deref().unwrap_or("");
    let hash_digest = fingerprint(ev.id, &title, updated_raw, accepted, limit);

    EventSnapshot {
        id: 0,
        event_id: ev.id,
        started_at: parse_timestamp(ev.started_at.as_deref()),
        ended_at: parse_timestamp(ev.ended_at.as_deref()),
        updated_at: parse_timestamp(ev.updated_at.as_deref()),
        limit,
        accepted,
        waiting: ev.waiting.unwrap_or_default(),
        retrieved_at,
        owner_nickname: ev.owner_nickname.unwrap_or_default(),
        series_title: ev.group.and_then(|g| g.title).unwrap_or_default(),
        hash_digest,
        title,
        event_url: ev.url.unwrap_or_default(),
    }
}
