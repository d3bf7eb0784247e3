use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    active_stockings, analytics_summary, banner, chat, chat_history, create_harvest, create_pond,
    create_stocking, get_pond, healthz, list_ponds, pond_history, predict, readyz,
    report_mortality,
};
use crate::state::AppState;

pub fn build_router(state: AppState, upload_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/ponds", get(list_ponds).post(create_pond))
        .route("/api/ponds/:id", get(get_pond))
        .route("/api/stocking", post(create_stocking))
        .route("/api/stocking/active", get(active_stockings))
        .route("/api/harvest", post(create_harvest))
        .route("/api/mortality", post(report_mortality))
        .route("/api/history/:pond_id", get(pond_history))
        .route("/api/analytics/summary", get(analytics_summary))
        .route("/api/predict", post(predict))
        .route("/api/chat", post(chat))
        .route("/api/chat/history", get(chat_history))
        .layer(DefaultBodyLimit::max(upload_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
