//! Feed Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the ranker, card store, and metrics.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eyye_feed::api::{self, AppState};
use eyye_feed::config::FeedConfig;
use eyye_feed::feed::FeedRanker;
use eyye_feed::metrics::Metrics;
use eyye_feed::rest::RestStore;
use eyye_feed::store::{CardStore, MemoryStore};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FEED_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FEED_DEV_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eyye_feed=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = FeedConfig::load();
    let metrics = Metrics::init(config.default_limit);

    let store: Arc<dyn CardStore> = match RestStore::from_env()
        .expect("Failed to build card store client")
    {
        Some(rest) => Arc::new(rest),
        None => {
            warn!("FEED_STORE_URL/FEED_STORE_API_KEY not set; serving from an empty in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let ranker = Arc::new(FeedRanker::new(store, config));
    let router = api::create_router(AppState { ranker }).merge(metrics.router());

    Ok(router.into())
}
