use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod events;
pub mod hitl;
pub mod instances;
pub mod templates;

pub use events::event_routes;
pub use hitl::hitl_routes;
pub use instances::instance_routes;
pub use templates::template_routes;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub timestamp: String,
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let database = match &state.db_pool {
        Some(pool) => {
            if crate::database::health_check(pool).await {
                "up"
            } else {
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            }
        }
        None => "in-memory",
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: database.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "cadence-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
