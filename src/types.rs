use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// Half-open competition window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl Window {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at < self.end
    }

    pub fn start_ms(&self) -> i64 {
        to_unix_ms(self.start)
    }

    pub fn end_ms(&self) -> i64 {
        to_unix_ms(self.end)
    }

    pub fn from_unix_ms(start_ms: i64, end_ms: i64) -> Result<Self> {
        Ok(Self {
            start: from_unix_ms(start_ms)?,
            end: from_unix_ms(end_ms)?,
        })
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Output of the period calculator. `previous` is absent only for a fixed
/// configuration that names no previous window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Periods {
    pub current: Window,
    pub previous: Option<Window>,
}

pub fn to_unix_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_ms(ms: i64) -> Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(
        i128::from(ms) * 1_000_000,
    )?)
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Which upstream attribute ranks a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    #[default]
    Wagered,
    WeightedWagered,
}

impl std::str::FromStr for ScoreField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wagered" => Ok(ScoreField::Wagered),
            "weighted_wagered" | "weightedwagered" | "weighted" => Ok(ScoreField::WeightedWagered),
            other => Err(format!("unknown score field '{other}'")),
        }
    }
}

impl std::fmt::Display for ScoreField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreField::Wagered => write!(f, "wagered"),
            ScoreField::WeightedWagered => write!(f, "weighted_wagered"),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream rows
// ---------------------------------------------------------------------------

/// One row of the affiliate stats response. Scores are optional: a missing or
/// null value counts as zero.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRow {
    pub uid: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub wagered: Option<f64>,
    #[serde(default)]
    pub weighted_wagered: Option<f64>,
}

impl UpstreamRow {
    /// Score for `field`, clamped to a finite non-negative number.
    pub fn score(&self, field: ScoreField) -> f64 {
        let raw = match field {
            ScoreField::Wagered => self.wagered,
            ScoreField::WeightedWagered => self.weighted_wagered,
        };
        sanitize_score(raw.unwrap_or(0.0))
    }
}

pub fn sanitize_score(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// A row after ranking, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub uid: String,
    pub username: String,
    pub wagered: f64,
    pub rank: i64,
}

// ---------------------------------------------------------------------------
// Persisted entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub period_end: OffsetDateTime,
    pub uid: String,
    pub username: String,
    pub wagered: f64,
    pub rank: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn window_is_left_inclusive_right_exclusive() {
        let w = Window::new(datetime!(2025-09-09 0:00 UTC), datetime!(2025-09-23 0:00 UTC));
        assert!(w.contains(datetime!(2025-09-09 0:00 UTC)));
        assert!(w.contains(datetime!(2025-09-22 23:59:59 UTC)));
        assert!(!w.contains(datetime!(2025-09-23 0:00 UTC)));
    }

    #[test]
    fn unix_ms_conversion_preserves_instant() {
        let w = Window::new(datetime!(2025-08-26 0:00 UTC), datetime!(2025-09-09 0:00 UTC));
        let back = Window::from_unix_ms(w.start_ms(), w.end_ms()).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn missing_and_negative_scores_are_zero() {
        let row: UpstreamRow =
            serde_json::from_str(r#"{"uid":"a","username":"alice","wagered":null}"#).unwrap();
        assert_eq!(row.score(ScoreField::Wagered), 0.0);
        assert_eq!(row.score(ScoreField::WeightedWagered), 0.0);

        let row: UpstreamRow =
            serde_json::from_str(r#"{"uid":"b","username":"bob","wagered":-5,"weightedWagered":12.5}"#)
                .unwrap();
        assert_eq!(row.score(ScoreField::Wagered), 0.0);
        assert_eq!(row.score(ScoreField::WeightedWagered), 12.5);
    }

    #[test]
    fn score_field_parses_both_spellings() {
        assert_eq!("wagered".parse::<ScoreField>().unwrap(), ScoreField::Wagered);
        assert_eq!(
            "weightedWagered".parse::<ScoreField>().unwrap(),
            ScoreField::WeightedWagered
        );
        assert!("volume".parse::<ScoreField>().is_err());
    }
}
