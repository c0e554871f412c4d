// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/` and are read-only views over what the
// feed loops have published. The order book endpoint answers 503 until the
// first book has been generated.
//
// CORS is configured permissively so a dashboard served from another origin
// can poll the service.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::coingecko::MarketSummary;
use crate::format::PriceHeader;
use crate::market_data::Candle;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/chart", get(chart))
        .route("/api/v1/orderbook", get(order_book))
        .route("/api/v1/summary", get(summary))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    feed_mode: String,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        feed_mode: state.runtime_config.read().feed_mode.to_string(),
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };
    Json(resp)
}

// =============================================================================
// Full state
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Chart
// =============================================================================

#[derive(Serialize)]
struct ChartResponse {
    interval_ms: Option<i64>,
    candles: Vec<Candle>,
}

async fn chart(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let candles = state.chart.read().clone();
    let interval_ms = match candles.as_slice() {
        [.., prev, last] => Some(last.timestamp - prev.timestamp),
        _ => None,
    };
    Json(ChartResponse {
        interval_ms,
        candles,
    })
}

// =============================================================================
// Order book
// =============================================================================

async fn order_book(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.order_book_view() {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "order book not available yet" })),
        )
            .into_response(),
    }
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Serialize)]
struct SummaryResponse {
    header: Option<PriceHeader>,
    summary: Option<MarketSummary>,
    live_price: Option<f64>,
    alert: Option<String>,
}

async fn summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(SummaryResponse {
        header: snapshot.header,
        summary: snapshot.summary,
        live_price: snapshot.live_price,
        alert: snapshot.alert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tower::ServiceExt;

    use crate::runtime_config::RuntimeConfig;
    use crate::types::FeedMode;

    fn synthetic_state() -> Arc<AppState> {
        let mut config = RuntimeConfig::default();
        config.feed_mode = FeedMode::Synthetic;
        Arc::new(AppState::new(config))
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_mode() {
        let (status, body) = get_json(synthetic_state(), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["feed_mode"], "Synthetic");
    }

    #[tokio::test]
    async fn order_book_unavailable_until_generated() {
        let state = synthetic_state();
        let (status, _) = get_json(state.clone(), "/api/v1/orderbook").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let mut rng = StdRng::seed_from_u64(9);
        state.refresh_order_book(50_000.0, &mut rng).unwrap();

        let (status, body) = get_json(state, "/api/v1/orderbook").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["book"]["asks"].as_array().map(Vec::len), Some(20));
        assert_eq!(body["rows"].as_array().map(Vec::len), Some(20));
        assert_eq!(body["book"]["bids"][1]["price"], 49_995.0);
    }

    #[tokio::test]
    async fn chart_reports_bucket_width() {
        let state = synthetic_state();
        let candle = |timestamp| Candle {
            timestamp,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
        };
        state.publish_chart(vec![candle(0), candle(10_000), candle(20_000)]);

        let (status, body) = get_json(state, "/api/v1/chart").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interval_ms"], 10_000);
        assert_eq!(body["candles"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn summary_uses_latest_candle_in_synthetic_mode() {
        let state = synthetic_state();
        state.publish_chart(vec![Candle {
            timestamp: 0,
            open: 100.0,
            high: 103.0,
            low: 99.0,
            close: 102.5,
        }]);

        let (status, body) = get_json(state, "/api/v1/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["header"]["price"], "$102.50");
        assert!(body["summary"].is_null());
    }

    #[tokio::test]
    async fn state_includes_alert() {
        let state = synthetic_state();
        state.push_error("Failed to fetch market data".to_string());
        let (_, body) = get_json(state, "/api/v1/state").await;
        assert_eq!(body["alert"], "Failed to fetch market data");
    }
}
