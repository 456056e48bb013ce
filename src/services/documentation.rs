use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification of the estimation room service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::initialize_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::validate_session,
        crate::routes::rooms::logout,
        crate::routes::rooms::leave,
        crate::routes::rooms::show_votes,
        crate::routes::rooms::reset_votes,
        crate::routes::rooms::get_settings,
        crate::routes::rooms::update_settings,
        crate::routes::rooms::set_passcode,
        crate::routes::rooms::replace_data,
        crate::routes::rooms::import_queue,
        crate::routes::rooms::integration_state,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::requests::InitializeRoomRequest,
            crate::dto::requests::JoinRoomRequest,
            crate::dto::requests::JoinResponse,
            crate::dto::requests::ValidateSessionRequest,
            crate::dto::requests::ActorRequest,
            crate::dto::requests::UpdateSettingsRequest,
            crate::dto::requests::SetPasscodeRequest,
            crate::dto::requests::ReplaceDataRequest,
            crate::dto::requests::ImportQueueRequest,
            crate::dto::requests::ExternalTicket,
            crate::dto::requests::IntegrationStateRequest,
            crate::dto::requests::IntegrationStateResponse,
            crate::dto::requests::SuccessResponse,
            crate::dto::requests::ShowVotesResponse,
            crate::dto::requests::QueueResponse,
            crate::dto::room::RoomSnapshot,
            crate::state::settings::RoomSettings,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room admission, sessions and moderation"),
        (name = "realtime", description = "WebSocket channel of a room"),
    )
)]
pub struct ApiDoc;
