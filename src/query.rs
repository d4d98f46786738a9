//! Read side: resolve a window and return its persisted ranking.
//!
//! Reads never re-rank. Until the pipeline has run for the active window the
//! current board is empty or reflects the last run.

use serde::Serialize;
use time::OffsetDateTime;

use crate::config::CurrentLookup;
use crate::db::LeaderboardStore;
use crate::error::Result;
use crate::period::PeriodConfig;
use crate::types::{to_unix_ms, LeaderboardEntry, Window};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentBoard {
    pub items: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviousBoard {
    #[serde(with = "time::serde::rfc3339::option")]
    pub period_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub period_end: Option<OffsetDateTime>,
    pub items: Vec<LeaderboardEntry>,
}

/// Top entries of the active window, located per `lookup`.
pub async fn current_board(
    store: &LeaderboardStore,
    period: &PeriodConfig,
    lookup: CurrentLookup,
    top_k: usize,
    now: OffsetDateTime,
) -> Result<CurrentBoard> {
    let window: Option<Window> = match lookup {
        CurrentLookup::Recompute => Some(period.periods_at(now)?.current),
        CurrentLookup::Containing => store.window_containing(to_unix_ms(now)).await?,
    };

    let items = match window {
        Some(w) => store.entries_for_window(&w, top_k).await?,
        None => Vec::new(),
    };
    Ok(CurrentBoard { items })
}

/// Top entries of the most recently closed stored window.
pub async fn previous_board(
    store: &LeaderboardStore,
    top_k: usize,
    now: OffsetDateTime,
) -> Result<PreviousBoard> {
    let Some(window) = store.latest_closed_window(to_unix_ms(now)).await? else {
        return Ok(PreviousBoard {
            period_start: None,
            period_end: None,
            items: Vec::new(),
        });
    };

    let items = store.entries_for_window(&window, top_k).await?;
    Ok(PreviousBoard {
        period_start: Some(window.start),
        period_end: Some(window.end),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    use crate::db::memory_pool;
    use crate::types::RankedEntry;

    fn entry(uid: &str, rank: i64) -> RankedEntry {
        RankedEntry {
            uid: uid.to_string(),
            username: uid.to_uppercase(),
            wagered: 100.0 / rank as f64,
            rank,
        }
    }

    fn fixed(current: Window) -> PeriodConfig {
        PeriodConfig::fixed(current, None).unwrap()
    }

    #[tokio::test]
    async fn previous_without_any_closed_window_is_null() {
        let store = LeaderboardStore::new(memory_pool().await);
        let board = previous_board(&store, 15, datetime!(2025-09-15 0:00 UTC))
            .await
            .unwrap();
        assert_eq!(board.period_start, None);
        assert_eq!(board.items.len(), 0);

        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "period_start": null, "period_end": null, "items": [] })
        );
    }

    #[tokio::test]
    async fn previous_picks_latest_closed_window() {
        let store = LeaderboardStore::new(memory_pool().await);
        let older = Window::new(datetime!(2025-08-12 0:00 UTC), datetime!(2025-08-26 0:00 UTC));
        let newer = Window::new(datetime!(2025-08-26 0:00 UTC), datetime!(2025-09-09 0:00 UTC));
        let live = Window::new(datetime!(2025-09-09 0:00 UTC), datetime!(2025-09-23 0:00 UTC));
        for w in [&older, &newer, &live] {
            store.upsert_entry(w, &entry("a", 1), 0).await.unwrap();
        }
        store.upsert_entry(&newer, &entry("b", 2), 0).await.unwrap();

        let board = previous_board(&store, 15, datetime!(2025-09-15 0:00 UTC))
            .await
            .unwrap();
        assert_eq!(board.period_start, Some(newer.start));
        assert_eq!(board.period_end, Some(newer.end));
        let ranks: Vec<i64> = board.items.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2]);

        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["period_start"], "2025-08-26T00:00:00Z");
    }

    #[tokio::test]
    async fn current_recompute_reads_exact_window() {
        let store = LeaderboardStore::new(memory_pool().await);
        let live = Window::new(datetime!(2025-09-26 0:00 UTC), datetime!(2025-10-10 0:00 UTC));
        store.upsert_entry(&live, &entry("a", 1), 0).await.unwrap();
        store.upsert_entry(&live, &entry("b", 2), 0).await.unwrap();

        let board = current_board(
            &store,
            &fixed(live),
            CurrentLookup::Recompute,
            1,
            datetime!(2025-10-01 0:00 UTC),
        )
        .await
        .unwrap();
        assert_eq!(board.items.len(), 1);
        assert_eq!(board.items[0].uid, "a");
    }

    #[tokio::test]
    async fn lookup_strategies_diverge_when_config_drifts() {
        let store = LeaderboardStore::new(memory_pool().await);
        let written = Window::new(datetime!(2025-09-26 0:00 UTC), datetime!(2025-10-10 0:00 UTC));
        store.upsert_entry(&written, &entry("a", 1), 0).await.unwrap();

        let drifted = fixed(Window::new(
            datetime!(2025-09-27 0:00 UTC),
            datetime!(2025-10-11 0:00 UTC),
        ));
        let now = datetime!(2025-10-01 0:00 UTC);

        let recomputed = current_board(&store, &drifted, CurrentLookup::Recompute, 15, now)
            .await
            .unwrap();
        assert!(recomputed.items.is_empty());

        let containing = current_board(&store, &drifted, CurrentLookup::Containing, 15, now)
            .await
            .unwrap();
        assert_eq!(containing.items.len(), 1);
    }

    #[tokio::test]
    async fn current_with_nothing_written_is_empty() {
        let store = LeaderboardStore::new(memory_pool().await);
        let board = current_board(
            &store,
            &PeriodConfig::Monthly,
            CurrentLookup::Containing,
            15,
            datetime!(2025-10-01 0:00 UTC),
        )
        .await
        .unwrap();
        assert!(board.items.is_empty());
    }
}
