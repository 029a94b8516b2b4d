//! Prometheus wiring: recorder install, series registration, and the
//! `/metrics` exposition route. Counter names live here so the API layer
//! and the exposition stay in sync.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Feed pages requested.
pub const FEED_REQUESTS_TOTAL: &str = "feed_requests_total";
/// Cards emitted across all feed pages.
pub const FEED_CARDS_SERVED_TOTAL: &str = "feed_cards_served_total";
/// Requests carrying an undecodable cursor token.
pub const FEED_INVALID_CURSOR_TOTAL: &str = "feed_invalid_cursor_total";

const FEED_DEFAULT_PAGE_SIZE: &str = "feed_default_page_size";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder, register the feed series, and
    /// expose a static gauge for the configured page size.
    pub fn init(default_page_size: usize) -> Self {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!(FEED_REQUESTS_TOTAL, "Feed pages requested");
        describe_counter!(
            FEED_CARDS_SERVED_TOTAL,
            "Cards emitted across all feed pages"
        );
        describe_counter!(
            FEED_INVALID_CURSOR_TOTAL,
            "Requests carrying an undecodable cursor token"
        );
        describe_gauge!(
            FEED_DEFAULT_PAGE_SIZE,
            "Page size used when the request omits a limit"
        );
        gauge!(FEED_DEFAULT_PAGE_SIZE).set(default_page_size as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    // Single test on purpose: the process-global recorder can only be
    // installed once.
    #[tokio::test]
    async fn exposition_includes_registered_series() {
        let m = Metrics::init(20);
        metrics::counter!(FEED_REQUESTS_TOTAL).increment(1);

        let resp = m
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains(FEED_DEFAULT_PAGE_SIZE));
        assert!(text.contains("20"));
        assert!(text.contains(FEED_REQUESTS_TOTAL));
    }
}
