//! Fetch, rank, truncate and persist the top entries of a window.

use std::collections::HashSet;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::LeaderboardStore;
use crate::error::Result;
use crate::fetcher::StatsProvider;
use crate::period::PeriodConfig;
use crate::types::{to_unix_ms, RankedEntry, ScoreField, UpstreamRow, Window};

/// Per-invocation pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub score_field: ScoreField,
    pub top_k: usize,
    pub prune_stale: bool,
}

impl From<&Config> for PipelineSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            score_field: cfg.score_field,
            top_k: cfg.top_k,
            prune_stale: cfg.prune_stale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub saved_current: usize,
    pub saved_previous: usize,
}

/// Sort by score descending and keep the first `top_k`, numbering ranks from 1.
///
/// The sort is stable, so equal scores keep upstream order. Rows without a uid
/// are dropped and a repeated uid keeps only its best-ranked occurrence, which
/// keeps the assigned ranks dense.
pub fn rank_rows(rows: Vec<UpstreamRow>, score_field: ScoreField, top_k: usize) -> Vec<RankedEntry> {
    let mut scored: Vec<(f64, UpstreamRow)> = rows
        .into_iter()
        .filter(|r| !r.uid.trim().is_empty())
        .map(|r| (r.score(score_field), r))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut seen = HashSet::new();
    scored
        .into_iter()
        .filter(|(_, r)| seen.insert(r.uid.clone()))
        .take(top_k)
        .enumerate()
        .map(|(i, (score, r))| RankedEntry {
            uid: r.uid,
            username: r.username.unwrap_or_default(),
            wagered: score,
            rank: i as i64 + 1,
        })
        .collect()
}

/// Run the pipeline for one window. Returns the number of rows upserted.
///
/// The upserts and the prune of a window commit as one transaction, so a
/// failed run leaves the previous board untouched.
pub async fn refresh_window<P>(
    provider: &P,
    store: &LeaderboardStore,
    window: &Window,
    settings: &PipelineSettings,
) -> Result<usize>
where
    P: StatsProvider + ?Sized,
{
    let rows = provider.fetch_stats(window).await?;
    let fetched = rows.len();
    let ranked = rank_rows(rows, settings.score_field, settings.top_k);

    let now_ms = to_unix_ms(OffsetDateTime::now_utc());
    let pruned = store
        .replace_window(window, &ranked, now_ms, settings.prune_stale)
        .await?;
    if fetched == 0 && pruned > 0 {
        warn!(period_start = %window.start, "upstream returned no rows; cleared window");
    }

    info!(
        period_start = %window.start,
        period_end = %window.end,
        score_field = %settings.score_field,
        fetched,
        saved = ranked.len(),
        pruned,
        "leaderboard window refreshed"
    );
    Ok(ranked.len())
}

/// Refresh the current window, then the previous one when the cadence has one.
pub async fn refresh_periods<P>(
    provider: &P,
    store: &LeaderboardStore,
    period: &PeriodConfig,
    settings: &PipelineSettings,
    now: OffsetDateTime,
) -> Result<RefreshOutcome>
where
    P: StatsProvider + ?Sized,
{
    let periods = period.periods_at(now)?;

    let saved_current = refresh_window(provider, store, &periods.current, settings).await?;
    let saved_previous = match &periods.previous {
        Some(previous) => refresh_window(provider, store, previous, settings).await?,
        None => 0,
    };

    Ok(RefreshOutcome {
        saved_current,
        saved_previous,
    })
}
