use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post, put},
};
use validator::Validate;

use crate::{
    dto::{
        requests::{
            ActorRequest, ImportQueueRequest, InitializeRoomRequest, IntegrationStateRequest,
            IntegrationStateResponse, JoinRoomRequest,
            JoinResponse, NameQuery, QueueResponse, ReplaceDataRequest, SESSION_HEADER,
            SetPasscodeRequest, ShowVotesResponse, SuccessResponse, UpdateSettingsRequest,
            ValidateSessionRequest,
        },
        room::RoomSnapshot,
    },
    error::AppError,
    services::{
        coordinator::{Admission, Credentials},
        room_service, session_service,
    },
    state::{SharedState, settings::RoomSettings},
};

/// Room lifecycle and moderation endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/rooms/initialize", post(initialize_room))
        .route("/api/rooms/{key}/join", post(join_room))
        .route("/api/rooms/{key}/session/validate", post(validate_session))
        .route("/api/rooms/{key}/logout", post(logout))
        .route("/api/rooms/{key}/leave", post(leave))
        .route("/api/rooms/{key}/showVotes", post(show_votes))
        .route("/api/rooms/{key}/resetVotes", post(reset_votes))
        .route(
            "/api/rooms/{key}/settings",
            get(get_settings).put(update_settings),
        )
        .route("/api/rooms/{key}/passcode", post(set_passcode))
        .route("/api/rooms/{key}/data", put(replace_data))
        .route("/api/rooms/{key}/queue/import", post(import_queue))
        .route("/api/rooms/{key}/integrations/state", post(integration_state))
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn credentials(headers: &HeaderMap, name: String) -> Result<Credentials, AppError> {
    let token = session_token(headers).ok_or_else(|| {
        AppError::Unauthorized("missing session token header `X-Session-Token`".into())
    })?;
    Ok(Credentials::new(name, token))
}

fn admitted(admission: Admission) -> Json<JoinResponse> {
    Json(JoinResponse {
        success: true,
        room: admission.room,
        session_token: admission.session_token,
    })
}

/// Create a room and become its moderator.
#[utoipa::path(
    post,
    path = "/api/rooms/initialize",
    tag = "rooms",
    request_body = InitializeRoomRequest,
    responses(
        (status = 200, description = "Room created", body = JoinResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Room key already in use")
    )
)]
pub async fn initialize_room(
    State(state): State<SharedState>,
    Json(payload): Json<InitializeRoomRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    payload.validate()?;
    let admission = session_service::initialize(&state, payload).await?;
    Ok(admitted(admission))
}

/// Join a room, or take over one's own seat with a previous session token.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/join",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = Option<String>, Header, description = "Previous session token of this name")
    ),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined", body = JoinResponse),
        (status = 403, description = "Incorrect passcode"),
        (status = 404, description = "Unknown room"),
        (status = 409, description = "Name already connected")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    payload.validate()?;
    let admission = session_service::join(&state, &key, payload, session_token(&headers)).await?;
    Ok(admitted(admission))
}

/// Check a stored session token.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/session/validate",
    tag = "rooms",
    params(("key" = String, Path, description = "Room key")),
    request_body = ValidateSessionRequest,
    responses(
        (status = 200, description = "Token is valid", body = SuccessResponse),
        (status = 401, description = "Token unknown or expired")
    )
)]
pub async fn validate_session(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(payload): Json<ValidateSessionRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    payload.validate()?;
    session_service::validate_session(&state, &key, payload.name, payload.session_token).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Revoke the caller's session token.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/logout",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = ActorRequest,
    responses((status = 200, description = "Logged out", body = SuccessResponse))
)]
pub async fn logout(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    payload.validate()?;
    session_service::logout(&state, &key, credentials(&headers, payload.name)?).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Leave the room for good.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/leave",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = ActorRequest,
    responses((status = 200, description = "Left the room", body = SuccessResponse))
)]
pub async fn leave(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    payload.validate()?;
    session_service::leave(&state, &key, credentials(&headers, payload.name)?).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Toggle whether votes are revealed.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/showVotes",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Reveal state toggled", body = ShowVotesResponse),
        (status = 403, description = "Not allowed to reveal")
    )
)]
pub async fn show_votes(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<ShowVotesResponse>, AppError> {
    payload.validate()?;
    let response = room_service::show_votes(&state, &key, credentials(&headers, payload.name)?).await?;
    Ok(Json(response))
}

/// Clear the current round.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/resetVotes",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Votes cleared", body = SuccessResponse),
        (status = 403, description = "Not allowed to clear votes")
    )
)]
pub async fn reset_votes(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    payload.validate()?;
    room_service::reset_votes(&state, &key, credentials(&headers, payload.name)?).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Read the room settings.
#[utoipa::path(
    get,
    path = "/api/rooms/{key}/settings",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        NameQuery,
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    responses((status = 200, description = "Current settings", body = RoomSettings))
)]
pub async fn get_settings(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(query): Query<NameQuery>,
    headers: HeaderMap,
) -> Result<Json<RoomSettings>, AppError> {
    let settings = room_service::settings(&state, &key, credentials(&headers, query.name)?).await?;
    Ok(Json(settings))
}

/// Replace the room settings.
#[utoipa::path(
    put,
    path = "/api/rooms/{key}/settings",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = RoomSettings),
        (status = 403, description = "Moderator only")
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<RoomSettings>, AppError> {
    payload.validate()?;
    let UpdateSettingsRequest { name, settings } = payload;
    let saved =
        room_service::update_settings(&state, &key, credentials(&headers, name)?, settings).await?;
    Ok(Json(saved))
}

/// Set or clear the room passcode.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/passcode",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = SetPasscodeRequest,
    responses(
        (status = 200, description = "Passcode updated", body = SuccessResponse),
        (status = 403, description = "Moderator only")
    )
)]
pub async fn set_passcode(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SetPasscodeRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    payload.validate()?;
    let SetPasscodeRequest { name, passcode } = payload;
    room_service::set_passcode(&state, &key, credentials(&headers, name)?, passcode).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Replace roster and current votes in one step.
#[utoipa::path(
    put,
    path = "/api/rooms/{key}/data",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = ReplaceDataRequest,
    responses(
        (status = 200, description = "Room data replaced", body = RoomSnapshot),
        (status = 403, description = "Moderator only")
    )
)]
pub async fn replace_data(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ReplaceDataRequest>,
) -> Result<Json<RoomSnapshot>, AppError> {
    payload.validate()?;
    let ReplaceDataRequest { name, room } = payload;
    let snapshot = room_service::replace_data(&state, &key, credentials(&headers, name)?, room).await?;
    Ok(Json(snapshot))
}

/// Import tickets from an external tracker.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/queue/import",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = ImportQueueRequest,
    responses(
        (status = 200, description = "Tickets imported", body = QueueResponse),
        (status = 400, description = "Ticket rejected; nothing imported")
    )
)]
pub async fn import_queue(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ImportQueueRequest>,
) -> Result<Json<QueueResponse>, AppError> {
    payload.validate()?;
    let ImportQueueRequest {
        name,
        tickets,
        state: integration,
    } = payload;
    let queue = room_service::import_queue(
        &state,
        &key,
        credentials(&headers, name)?,
        tickets,
        integration.as_deref(),
    )
    .await?;
    Ok(Json(queue))
}

/// Issue a signed `state` parameter for a tracker authorization round trip.
#[utoipa::path(
    post,
    path = "/api/rooms/{key}/integrations/state",
    tag = "rooms",
    params(
        ("key" = String, Path, description = "Room key"),
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = IntegrationStateRequest,
    responses(
        (status = 200, description = "Signed state", body = IntegrationStateResponse),
        (status = 401, description = "Invalid session")
    )
)]
pub async fn integration_state(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<IntegrationStateRequest>,
) -> Result<Json<IntegrationStateResponse>, AppError> {
    payload.validate()?;
    let IntegrationStateRequest { name, service } = payload;
    let signed =
        room_service::integration_state(&state, &key, credentials(&headers, name)?, service)
            .await?;
    Ok(Json(IntegrationStateResponse { state: signed }))
}
