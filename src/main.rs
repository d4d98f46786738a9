mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod period;
mod pipeline;
mod query;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::LeaderboardStore;
use crate::error::Result;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Row store ---
    let pool = db::connect(&cfg.database_url).await?;
    info!("Row store ready at {}", cfg.database_url);

    info!(
        period_mode = cfg.period.mode_name(),
        score_field = %cfg.score_field,
        top_k = cfg.top_k,
        prune_stale = cfg.prune_stale,
        "leaderboard pipeline configured"
    );

    // --- HTTP API ---
    let state = ApiState {
        store: LeaderboardStore::new(pool),
        config: Arc::new(cfg.clone()),
        env: Arc::new(|key: &str| std::env::var(key).ok()),
    };
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
