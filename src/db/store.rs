use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use crate::db::models::{LeaderboardRow, WindowRow};
use crate::error::Result;
use crate::types::{LeaderboardEntry, RankedEntry, Window};

/// Access to the `leaderboard_entries` table. Single-row writes go straight to
/// the pool; a pipeline run over one window goes through `replace_window`.
#[derive(Debug, Clone)]
pub struct LeaderboardStore {
    pool: SqlitePool,
}

impl LeaderboardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert or overwrite the row keyed by `(window, uid)`.
    pub async fn upsert_entry(&self, window: &Window, entry: &RankedEntry, now_ms: i64) -> Result<()> {
        upsert_row(&self.pool, window, entry, now_ms).await
    }

    /// Upsert `entries` into `window` and, when `prune` is set, delete the rows
    /// of that window whose uid is not among them. All of it commits together
    /// or not at all. Returns rows removed.
    pub async fn replace_window(
        &self,
        window: &Window,
        entries: &[RankedEntry],
        now_ms: i64,
        prune: bool,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            upsert_row(&mut *tx, window, entry, now_ms).await?;
        }

        let mut pruned = 0;
        if prune {
            let keep: Vec<String> = entries.iter().map(|e| e.uid.clone()).collect();
            pruned = delete_complement(&mut *tx, window, &keep).await?;
        }

        tx.commit().await?;
        Ok(pruned)
    }

    /// Rows of exactly `window`, best rank first.
    pub async fn entries_for_window(&self, window: &Window, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT period_start, period_end, uid, username, wagered, rank, updated_at
            FROM leaderboard_entries
            WHERE period_start = ? AND period_end = ?
            ORDER BY rank ASC, uid ASC
            LIMIT ?
            "#,
        )
        .bind(window.start_ms())
        .bind(window.end_ms())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LeaderboardEntry::try_from).collect()
    }

    /// The stored window with `period_start <= at < period_end`. When several
    /// overlap, the one that started last wins.
    pub async fn window_containing(&self, at_ms: i64) -> Result<Option<Window>> {
        let row = sqlx::query_as::<_, WindowRow>(
            r#"
            SELECT period_start, period_end
            FROM leaderboard_entries
            WHERE period_start <= ? AND period_end > ?
            ORDER BY period_start DESC, period_end ASC
            LIMIT 1
            "#,
        )
        .bind(at_ms)
        .bind(at_ms)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Window::from_unix_ms(r.period_start, r.period_end))
            .transpose()
    }

    /// The stored window with the greatest `period_end <= now`.
    pub async fn latest_closed_window(&self, now_ms: i64) -> Result<Option<Window>> {
        let row = sqlx::query_as::<_, WindowRow>(
            r#"
            SELECT period_start, period_end
            FROM leaderboard_entries
            WHERE period_end <= ?
            ORDER BY period_end DESC, period_start DESC
            LIMIT 1
            "#,
        )
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Window::from_unix_ms(r.period_start, r.period_end))
            .transpose()
    }
}

async fn upsert_row<'e, E>(executor: E, window: &Window, entry: &RankedEntry, now_ms: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO leaderboard_entries
            (period_start, period_end, uid, username, wagered, rank, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(period_start, period_end, uid) DO UPDATE SET
            username = excluded.username,
            wagered = excluded.wagered,
            rank = excluded.rank,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(window.start_ms())
    .bind(window.end_ms())
    .bind(&entry.uid)
    .bind(&entry.username)
    .bind(entry.wagered)
    .bind(entry.rank)
    .bind(now_ms)
    .execute(executor)
    .await?;
    Ok(())
}

async fn delete_complement<'e, E>(executor: E, window: &Window, keep: &[String]) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM leaderboard_entries WHERE period_start = ");
    qb.push_bind(window.start_ms())
        .push(" AND period_end = ")
        .push_bind(window.end_ms());

    if !keep.is_empty() {
        qb.push(" AND uid NOT IN (");
        let mut uids = qb.separated(", ");
        for uid in keep {
            uids.push_bind(uid.as_str());
        }
        uids.push_unseparated(")");
    }

    let result = qb.build().execute(executor).await?;
    Ok(result.rows_affected())
}
