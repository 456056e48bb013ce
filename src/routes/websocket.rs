use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{
    dto::requests::ConnectQuery,
    error::AppError,
    services::{coordinator::Credentials, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/rooms/{key}",
    tag = "realtime",
    params(("key" = String, Path, description = "Room key"), ConnectQuery),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Session token unknown or expired")
    )
)]
/// Upgrade to the real-time channel of a room. Credentials are checked before the upgrade.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let credentials = Credentials::new(query.name, query.token);
    let handle = websocket_service::authorize(&state, &key, credentials.clone()).await?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(handle, credentials, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/rooms/{key}", get(ws_handler))
}
