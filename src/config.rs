use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::error::{AppError, Result};
use crate::period::PeriodConfig;
use crate::types::{ScoreField, Window};

/// Default number of ranked entries persisted and served per window.
pub const DEFAULT_TOP_K: usize = 15;

/// Default anchor of the rolling cadence (UTC midnight).
pub const DEFAULT_PERIOD_ANCHOR: &str = "2025-08-26T00:00:00Z";

/// Default rolling period length in days.
pub const DEFAULT_PERIOD_LENGTH_DAYS: i64 = 14;

/// Path of the upstream stats endpoint, relative to the configured base URL.
pub const UPSTREAM_STATS_PATH: &str = "/affiliate/v2/stats";

/// Edge cache hint for read endpoints.
pub const READ_CACHE_CONTROL: &str = "s-maxage=60, stale-while-revalidate=600";

/// How the "current" read endpoint locates its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentLookup {
    /// Recompute the window with the period calculator and read exactly it.
    #[default]
    Recompute,
    /// Read whichever stored window contains `now`.
    Containing,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub database_url: String,
    pub api_port: u16,
    pub period: PeriodConfig,
    /// Upstream attribute used for ranking (SCORE_FIELD)
    pub score_field: ScoreField,
    /// Entries kept per window (LEADERBOARD_TOP_K)
    pub top_k: usize,
    /// Opaque upstream category filter (UPSTREAM_CATEGORIES)
    pub categories: Option<String>,
    pub upstream_timeout_secs: u64,
    pub current_lookup: CurrentLookup,
    /// Delete rows that fell out of the top-K after each run (PRUNE_STALE_ROWS)
    pub prune_stale: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let top_k = get("LEADERBOARD_TOP_K")
            .unwrap_or_else(|| DEFAULT_TOP_K.to_string())
            .parse::<usize>()
            .map_err(|_| AppError::Config("LEADERBOARD_TOP_K must be a positive integer".to_string()))?;
        if top_k == 0 {
            return Err(AppError::Config("LEADERBOARD_TOP_K must be at least 1".to_string()));
        }

        Ok(Self {
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            database_url: get("DATABASE_URL")
                .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?,
            api_port: get("API_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            period: period_from_lookup(&get)?,
            score_field: get("SCORE_FIELD")
                .map(|s| s.parse::<ScoreField>())
                .transpose()
                .map_err(AppError::Config)?
                .unwrap_or_default(),
            top_k,
            categories: get("UPSTREAM_CATEGORIES"),
            upstream_timeout_secs: get("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse::<u64>()
                .map_err(|_| AppError::Config("UPSTREAM_TIMEOUT_SECS must be a number".to_string()))?,
            current_lookup: match get("CURRENT_PERIOD_LOOKUP").as_deref() {
                None | Some("recompute") => CurrentLookup::Recompute,
                Some("containing") => CurrentLookup::Containing,
                Some(other) => {
                    return Err(AppError::Config(format!(
                        "CURRENT_PERIOD_LOOKUP must be 'recompute' or 'containing', got '{other}'"
                    )))
                }
            },
            prune_stale: match get("PRUNE_STALE_ROWS").as_deref() {
                None => true,
                Some("1") | Some("true") | Some("yes") => true,
                Some("0") | Some("false") | Some("no") => false,
                Some(other) => {
                    return Err(AppError::Config(format!(
                        "PRUNE_STALE_ROWS must be a boolean, got '{other}'"
                    )))
                }
            },
        })
    }
}

fn parse_instant(key: &str, value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| AppError::Config(format!("{key} must be an RFC 3339 timestamp: {e}")))
}

fn period_from_lookup<G>(get: &G) -> Result<PeriodConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let mode = get("PERIOD_MODE").unwrap_or_else(|| "rolling".to_string());
    match mode.as_str() {
        "rolling" => {
            let anchor_raw =
                get("PERIOD_ANCHOR").unwrap_or_else(|| DEFAULT_PERIOD_ANCHOR.to_string());
            let anchor = parse_instant("PERIOD_ANCHOR", &anchor_raw)?;
            let days = get("PERIOD_LENGTH_DAYS")
                .unwrap_or_else(|| DEFAULT_PERIOD_LENGTH_DAYS.to_string())
                .parse::<i64>()
                .map_err(|_| AppError::Config("PERIOD_LENGTH_DAYS must be an integer".to_string()))?;
            let length = days
                .checked_mul(86_400)
                .map(Duration::seconds)
                .ok_or_else(|| AppError::Config(format!("PERIOD_LENGTH_DAYS {days} is too large")))?;
            PeriodConfig::rolling(anchor, length)
        }
        "fixed" => {
            let window = |start_key: &str, end_key: &str| -> Result<Option<Window>> {
                match (get(start_key), get(end_key)) {
                    (Some(s), Some(e)) => Ok(Some(Window::new(
                        parse_instant(start_key, &s)?,
                        parse_instant(end_key, &e)?,
                    ))),
                    (None, None) => Ok(None),
                    _ => Err(AppError::Config(format!(
                        "{start_key} and {end_key} must be set together"
                    ))),
                }
            };
            let current = window("PERIOD_CURRENT_START", "PERIOD_CURRENT_END")?.ok_or_else(|| {
                AppError::Config("fixed period mode requires PERIOD_CURRENT_START/END".to_string())
            })?;
            let previous = window("PERIOD_PREVIOUS_START", "PERIOD_PREVIOUS_END")?;
            PeriodConfig::fixed(current, previous)
        }
        "monthly" => Ok(PeriodConfig::Monthly),
        other => Err(AppError::Config(format!(
            "PERIOD_MODE must be 'rolling', 'fixed' or 'monthly', got '{other}'"
        ))),
    }
}

/// Upstream credentials. Read fresh for every refresh invocation so a missing
/// value fails that request instead of process startup.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub user_id: String,
}

impl UpstreamConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{key} is not set")))
        };
        Ok(Self {
            base_url: require("AFFILIATE_BASE_URL")?,
            bearer_token: require("AFFILIATE_TOKEN")?,
            user_id: require("AFFILIATE_USER_ID")?,
        })
    }
}
