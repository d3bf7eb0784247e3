mod ai;
mod analytics;
mod app;
mod config;
mod cycles;
mod db;
mod extract;
mod geometry;
mod handlers;
mod models;
mod owner;
mod predict;
mod service;
mod state;
mod stock;

use aquapin_common::{bind_listener, init_tracing, shutdown_signal};
use std::sync::Arc;
use tokio_postgres::NoTls;

use crate::ai::{ChatAssistant, ChatProvider, GeminiProvider};
use crate::config::ServiceConfig;
use crate::predict::YieldService;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("pond-service");

    let config = ServiceConfig::from_env();
    let database_url = config.database_url.clone().expect("DATABASE_URL is required");

    let (db, connection) = tokio_postgres::connect(&database_url, NoTls)
        .await
        .expect("connect db");
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::error!(error = %err, "database connection error");
        }
    });
    db::run_migrations(&db).await.expect("apply migrations");

    let yields = YieldService::from_path(&config.model_path, config.price_per_kg);
    let assistant = build_assistant(&config);

    let assistant_online = assistant.is_online();
    let state = AppState {
        db: Arc::new(tokio::sync::Mutex::new(db)),
        yields: Arc::new(yields),
        assistant,
        chat_history_limit: config.chat_history_limit,
    };

    let app = app::build_router(state, config.upload_limit_bytes);
    let listener = bind_listener(config.port).await.expect("bind listener");
    tracing::info!(
        port = config.port,
        assistant_online,
        "pond-service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}

fn build_assistant(config: &ServiceConfig) -> ChatAssistant {
    let Some(gemini) = config.gemini.clone() else {
        tracing::warn!("GEMINI_API_KEY not set, assistant runs offline");
        return ChatAssistant::offline();
    };
    let model = gemini.model.clone();
    match GeminiProvider::new(gemini) {
        Ok(provider) => {
            tracing::info!(model = model.as_str(), "gemini assistant enabled");
            ChatAssistant::new(Some(Arc::new(provider) as Arc<dyn ChatProvider>))
        }
        Err(err) => {
            tracing::warn!(error = %err, "gemini client init failed, assistant runs offline");
            ChatAssistant::offline()
        }
    }
}
