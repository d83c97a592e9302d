mod ask;
mod rag_response;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use pdf_rag::RagConfig;
use serde_json::json;
use std::env;
use tower_http::cors::CorsLayer;

use crate::ask::{handle_ask, AppState};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ask", post(handle_ask))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = RagConfig::from_env()?;
    if config.google_api_key.is_none() {
        log::warn!("GOOGLE_API_KEY is not set; embedding requests will fail");
    }
    if config.groq_api_key.is_none() {
        log::warn!("GROQ_API_KEY is not set; generation requests will fail");
    }

    let app = router(AppState::new(config));

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
