use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report storage availability and the number of live room actors.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.room_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "room store health check failed");
            }
        }
        None => warn!("room store unavailable (degraded mode)"),
    }

    let active_rooms = state.rooms().len();
    if state.is_degraded() {
        HealthResponse::degraded(active_rooms)
    } else {
        HealthResponse::ok(active_rooms)
    }
}
