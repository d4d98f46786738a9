use std::time::Duration;

use async_trait::async_trait;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, warn};

use crate::config::{UpstreamConfig, UPSTREAM_STATS_PATH};
use crate::error::{AppError, Result};
use crate::types::{UpstreamRow, Window};

/// Source of per-player wager statistics for a window.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn fetch_stats(&self, window: &Window) -> Result<Vec<UpstreamRow>>;
}

/// Client for the affiliate stats API.
pub struct AffiliateClient {
    client: reqwest::Client,
    stats_url: reqwest::Url,
    bearer_token: String,
    user_id: String,
    categories: Option<String>,
}

impl AffiliateClient {
    pub fn new(cfg: &UpstreamConfig, categories: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let stats_url = reqwest::Url::parse(&cfg.base_url)
            .and_then(|base| base.join(UPSTREAM_STATS_PATH))
            .map_err(|e| AppError::Config(format!("invalid upstream base URL: {e}")))?;

        Ok(Self {
            client,
            stats_url,
            bearer_token: cfg.bearer_token.clone(),
            user_id: cfg.user_id.clone(),
            categories,
        })
    }

    fn build_request(&self, window: &Window) -> Result<reqwest::Request> {
        let mut params = vec![
            ("userId", self.user_id.clone()),
            ("startDate", format_upstream_date(window.start)?),
            ("endDate", format_upstream_date(window.end)?),
        ];
        if let Some(categories) = &self.categories {
            params.push(("categories", categories.clone()));
        }

        Ok(self
            .client
            .get(self.stats_url.clone())
            .bearer_auth(&self.bearer_token)
            .query(&params)
            .build()?)
    }
}

#[async_trait]
impl StatsProvider for AffiliateClient {
    async fn fetch_stats(&self, window: &Window) -> Result<Vec<UpstreamRow>> {
        let request = self.build_request(window)?;
        debug!(url = %request.url(), "fetching affiliate stats");

        let resp = self.client.execute(request).await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "affiliate stats request failed");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        parse_stats_body(&body)
    }
}

/// Millisecond ISO 8601 in UTC, e.g. `2025-08-26T00:00:00.000Z`.
pub fn format_upstream_date(t: OffsetDateTime) -> Result<String> {
    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    t.to_offset(UtcOffset::UTC)
        .format(format)
        .map_err(|e| AppError::Config(format!("cannot format upstream date: {e}")))
}

/// Decode the stats array. A `null` body counts as no rows.
pub fn parse_stats_body(body: &str) -> Result<Vec<UpstreamRow>> {
    let rows: Option<Vec<UpstreamRow>> =
        serde_json::from_str(body).map_err(|e| AppError::UpstreamDecode(e.to_string()))?;
    Ok(rows.unwrap_or_default())
}
