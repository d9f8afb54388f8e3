use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::workflows::triggers::TriggerEvent;
use crate::AppState;

#[derive(Serialize)]
pub struct EventAccepted {
    pub event_id: Uuid,
    pub accepted: bool,
}

pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(publish_event))
}

/// Accept a trigger event for asynchronous processing. The publisher gets a
/// 202 immediately; matching and instance starts happen in the background
/// and never propagate errors back here.
async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<TriggerEvent>,
) -> (StatusCode, Json<EventAccepted>) {
    let event_id = event.event_id;
    let matcher = state.matcher.clone();
    tokio::spawn(async move {
        match matcher.process_event(event).await {
            Ok(started) if !started.is_empty() => {
                tracing::info!(%event_id, count = started.len(), "Event started instances");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(%event_id, "Event processing failed: {}", e);
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            event_id,
            accepted: true,
        }),
    )
}
