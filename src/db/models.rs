/// Row type of `leaderboard_entries`. Timestamps are Unix milliseconds.
#[derive(Debug, sqlx::FromRow)]
pub struct LeaderboardRow {
    pub period_start: i64,
    pub period_end: i64,
    pub uid: String,
    pub username: String,
    pub wagered: f64,
    pub rank: i64,
    pub updated_at: i64,
}

impl TryFrom<LeaderboardRow> for crate::types::LeaderboardEntry {
    type Error = crate::error::AppError;

    fn try_from(r: LeaderboardRow) -> Result<Self, Self::Error> {
        use crate::types::from_unix_ms;
        Ok(Self {
            period_start: from_unix_ms(r.period_start)?,
            period_end: from_unix_ms(r.period_end)?,
            uid: r.uid,
            username: r.username,
            wagered: r.wagered,
            rank: r.rank,
            updated_at: from_unix_ms(r.updated_at)?,
        })
    }
}

/// Bounds of one stored window.
#[derive(Debug, sqlx::FromRow)]
pub struct WindowRow {
    pub period_start: i64,
    pub period_end: i64,
}
