use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::health::get_health;
use crate::config::{Config, UpstreamConfig, READ_CACHE_CONTROL};
use crate::db::LeaderboardStore;
use crate::error::{AppError, Result};
use crate::fetcher::AffiliateClient;
use crate::period::Countdown;
use crate::pipeline::{refresh_periods, PipelineSettings, RefreshOutcome};
use crate::query::{current_board, previous_board};
use crate::types::{sanitize_score, to_unix_ms, RankedEntry, Window};

/// Environment lookup used for per-request upstream credentials.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct ApiState {
    pub store: LeaderboardStore,
    pub config: Arc<Config>,
    pub env: EnvLookup,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/leaderboard/top", get(get_current))
        .route("/leaderboard/current", get(get_current))
        .route("/leaderboard/previous", get(get_previous))
        .route("/leaderboard/period", get(get_period))
        .route("/leaderboard/save", post(post_save))
        .route("/cron/refresh-leaderboard", get(refresh_leaderboard))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(cors)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct PeriodResponse {
    pub mode: &'static str,
    /// False once a fixed current window has already closed.
    pub active: bool,
    pub current: Window,
    pub previous: Option<Window>,
    pub remaining: Countdown,
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub ok: bool,
    pub saved: usize,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

fn cached<T: Serialize>(body: T) -> impl IntoResponse {
    ([(header::CACHE_CONTROL, READ_CACHE_CONTROL)], Json(body))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_current(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let cfg = &state.config;
    let board = current_board(
        &state.store,
        &cfg.period,
        cfg.current_lookup,
        cfg.top_k,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(cached(board))
}

async fn get_previous(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let board = previous_board(&state.store, state.config.top_k, OffsetDateTime::now_utc()).await?;
    Ok(cached(board))
}

async fn get_period(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let now = OffsetDateTime::now_utc();
    let periods = state.config.period.periods_at(now)?;
    Ok(cached(PeriodResponse {
        mode: state.config.period.mode_name(),
        active: periods.current.contains(now),
        current: periods.current,
        previous: periods.previous,
        remaining: Countdown::until_end(&periods.current, now),
    }))
}

async fn post_save(State(state): State<ApiState>, body: Bytes) -> Result<Json<SaveResponse>> {
    let (window, entries) = parse_save_body(&body)?;

    let now_ms = to_unix_ms(OffsetDateTime::now_utc());
    let mut saved = 0;
    for entry in &entries {
        state.store.upsert_entry(&window, entry, now_ms).await?;
        saved += 1;
    }

    info!(period_start = %window.start, period_end = %window.end, saved, "external leaderboard save");
    Ok(Json(SaveResponse { ok: true, saved }))
}

async fn refresh_leaderboard(State(state): State<ApiState>) -> Result<Json<RefreshResponse>> {
    let cfg = &state.config;
    let upstream = UpstreamConfig::from_lookup(|key| (state.env)(key))?;
    let client = AffiliateClient::new(
        &upstream,
        cfg.categories.clone(),
        Duration::from_secs(cfg.upstream_timeout_secs),
    )?;

    let settings = PipelineSettings::from(cfg.as_ref());
    let outcome = refresh_periods(
        &client,
        &state.store,
        &cfg.period,
        &settings,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok(Json(RefreshResponse { ok: true, outcome }))
}

// ---------------------------------------------------------------------------
// Save body parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SaveBody {
    #[serde(default)]
    period_start: Option<String>,
    #[serde(default)]
    period_end: Option<String>,
    items: Vec<SaveItem>,
}

#[derive(Deserialize)]
struct SaveItem {
    #[serde(default, deserialize_with = "lenient_uid")]
    uid: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    username: String,
    #[serde(default, deserialize_with = "lenient_number")]
    wagered: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    rank: f64,
}

/// Numbers may arrive as JSON numbers or numeric strings; anything else is zero.
fn lenient_number<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<f64, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_uid<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn invalid_body() -> AppError {
    AppError::Validation("Invalid body".to_string())
}

fn parse_bound(raw: Option<String>) -> Result<OffsetDateTime> {
    let raw = raw.filter(|s| !s.is_empty()).ok_or_else(invalid_body)?;
    OffsetDateTime::parse(&raw, &Rfc3339)
        .map_err(|_| AppError::Validation(format!("'{raw}' is not an RFC 3339 timestamp")))
}

/// Validate a bulk save body. Items without a uid are skipped.
pub fn parse_save_body(body: &[u8]) -> Result<(Window, Vec<RankedEntry>)> {
    let body: SaveBody = serde_json::from_slice(body).map_err(|_| invalid_body())?;

    let start = parse_bound(body.period_start)?;
    let end = parse_bound(body.period_end)?;
    if end <= start {
        return Err(AppError::Validation(
            "period_end must be after period_start".to_string(),
        ));
    }

    let entries = body
        .items
        .into_iter()
        .filter_map(|item| {
            Some(RankedEntry {
                uid: item.uid?,
                username: item.username,
                wagered: sanitize_score(item.wagered),
                rank: item.rank as i64,
            })
        })
        .collect();

    Ok((Window::new(start, end), entries))
}
