pub mod config;
pub mod mpesa;

use axum::{extract::State, http::Method, response::Json, routing::get, Router};
use chrono::Utc;
use mongodb::bson::doc;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub const API_PREFIX: &str = "/api/v1/daraja";

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let api = Router::new()
        .route("/health", get(health_check))
        .nest("/payments", mpesa::payment_routes())
        .nest("/config", config::config_routes());

    Router::new()
        .nest(API_PREFIX, api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match &state.db {
        Some(db) => match db.run_command(doc! { "ping": 1 }).await {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        None => "in-memory",
    };

    Json(json!({
        "status": "healthy",
        "database": database,
        "cachedTokens": state.tokens.cached_count().await,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
