use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use metrics::counter;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::cursor::{self, Cursor};
use crate::feed::{FeedPage, FeedRanker};
use crate::metrics::{FEED_CARDS_SERVED_TOTAL, FEED_INVALID_CURSOR_TOTAL, FEED_REQUESTS_TOTAL};

#[derive(Clone)]
pub struct AppState {
    pub ranker: Arc<FeedRanker>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feed", get(feed))
        .route("/debug/cursor", get(debug_cursor))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct FeedQuery {
    user_id: i64,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
}

async fn feed(
    State(state): State<AppState>,
    Query(q): Query<FeedQuery>,
) -> Result<Json<FeedPage>, (StatusCode, String)> {
    counter!(FEED_REQUESTS_TOTAL).increment(1);

    let page = state
        .ranker
        .build_feed(q.user_id, q.limit, q.offset.unwrap_or(0), q.cursor.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, "feed build failed");
            (StatusCode::BAD_GATEWAY, format!("feed unavailable: {e}"))
        })?;

    if page.debug.cursor_bad {
        counter!(FEED_INVALID_CURSOR_TOTAL).increment(1);
    }
    counter!(FEED_CARDS_SERVED_TOTAL).increment(page.items.len() as u64);

    Ok(Json(page))
}

#[derive(serde::Deserialize)]
struct CursorQuery {
    #[serde(default)]
    token: String,
}

/// Decode a cursor token without touching the store; `null` for any token
/// the feed would also ignore.
async fn debug_cursor(Query(q): Query<CursorQuery>) -> Json<Option<Cursor>> {
    Json(cursor::decode(&q.token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::testutil::card;
    use crate::card::SourceType;
    use crate::config::FeedConfig;
    use crate::cursor::FeedMode;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_router(store: MemoryStore) -> Router {
        let ranker = FeedRanker::new(Arc::new(store), FeedConfig::default());
        create_router(AppState {
            ranker: Arc::new(ranker),
        })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_router(MemoryStore::new());
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn feed_serves_fresh_mode_for_unknown_user() {
        let store = MemoryStore::new();
        let mut c = card(1, &[], SourceType::Rss);
        c.created_at = chrono::Utc::now();
        store.insert_card(c);

        let app = test_router(store);
        let resp = app
            .oneshot(
                Request::get("/feed?user_id=7&limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let v = body_json(resp).await;
        assert_eq!(v["debug"]["mode"], "fresh");
        assert_eq!(v["items"].as_array().unwrap().len(), 1);
        assert_eq!(v["cursor"]["has_more"], false);
    }

    #[tokio::test]
    async fn feed_requires_user_id() {
        let app = test_router(MemoryStore::new());
        let resp = app
            .oneshot(Request::get("/feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn debug_cursor_round_trips() {
        let token = cursor::encode(&Cursor {
            mode: FeedMode::Topics,
            offset: 40,
        });
        let app = test_router(MemoryStore::new());
        let resp = app
            .oneshot(
                Request::get(format!("/debug/cursor?token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["mode"], "topics");
        assert_eq!(v["offset"], 40);
    }

    #[tokio::test]
    async fn debug_cursor_rejects_garbage_as_null() {
        let app = test_router(MemoryStore::new());
        let resp = app
            .oneshot(
                Request::get("/debug/cursor?token=%21%21%21")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert!(v.is_null());
    }
}
