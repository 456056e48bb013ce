//! HTTP request and response bodies of the room API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    credentials::{MAX_PASSCODE_LEN, MIN_PASSCODE_LEN},
    dto::{
        room::RoomSnapshot,
        validation::{validate_participant_name, validate_room_key},
        ws::{TicketFields, check_ticket_limits},
    },
    state::{
        queue::{ExternalService, TicketQueueItem},
        room::RoomData,
        settings::RoomSettings,
    },
};

/// Header carrying the session token on HTTP requests.
pub const SESSION_HEADER: &str = "x-session-token";

/// Create a room and become its moderator.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRoomRequest {
    /// Room key; a random one is generated when absent.
    #[validate(custom(function = "validate_room_key"))]
    pub room_key: Option<String>,
    #[validate(custom(function = "validate_participant_name"))]
    pub moderator: String,
    #[validate(length(min = 4, max = 128))]
    pub passcode: Option<String>,
    #[validate(nested)]
    pub settings: Option<RoomSettings>,
    #[validate(length(max = 64))]
    pub avatar: Option<String>,
}

/// Join an existing room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    pub passcode: Option<String>,
    #[validate(length(max = 64))]
    pub avatar: Option<String>,
}

/// Check whether a stored session token is still valid.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSessionRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    #[validate(length(min = 1))]
    pub session_token: String,
}

/// Body of actions that only identify the acting participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
}

/// Replace the room settings.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    #[validate(nested)]
    pub settings: RoomSettings,
}

/// Set (`Some`) or clear (`None`) the room passcode.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetPasscodeRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    #[validate(custom(function = "validate_passcode_length"))]
    pub passcode: Option<String>,
}

/// Replace the roster and current votes in one step.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceDataRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    pub room: RoomData,
}

/// Work item delivered by an issue tracker integration.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTicket {
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub external_service: ExternalService,
    #[serde(default)]
    pub external_service_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

impl Validate for ExternalTicket {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(rejection) = check_ticket_limits(TicketFields {
            ticket_id: self.ticket_id.as_deref(),
            title: self.title.as_deref(),
            description: self.description.as_deref(),
            external_service_id: self.external_service_id.as_deref(),
            metadata: self.metadata.as_ref(),
        }) {
            let mut err = ValidationError::new("ticket_limits");
            err.message = Some(rejection.message.into());
            errors.add("ticket", err);
        }
        if self.ticket_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            errors.add("ticket_id", ValidationError::new("ticket_id_empty"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Append tickets coming from an external tracker.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImportQueueRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    #[validate(nested)]
    pub tickets: Vec<ExternalTicket>,
    /// Signed envelope from `/integrations/state`, echoed back by the tracker flow.
    #[serde(default)]
    pub state: Option<String>,
}

/// Ask for a signed `state` parameter before redirecting to a tracker.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStateRequest {
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
    pub service: ExternalService,
}

/// Signed `state` to hand to the tracker.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntegrationStateResponse {
    pub state: String,
}

/// Query of `GET /settings`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct NameQuery {
    /// Participant making the request.
    pub name: String,
}

/// Query of the WebSocket upgrade.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ConnectQuery {
    /// Participant opening the connection.
    pub name: String,
    /// Session token issued by initialize/join.
    pub token: String,
}

/// Successful initialize or join.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub success: bool,
    pub room: RoomSnapshot,
    pub session_token: String,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    /// Acknowledge success.
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Result of toggling the reveal state.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShowVotesResponse {
    pub success: bool,
    pub show_votes: bool,
}

/// Ticket queue after an import.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueResponse {
    pub queue: Vec<TicketQueueItem>,
}

fn validate_passcode_length(passcode: &str) -> Result<(), ValidationError> {
    let len = passcode.trim().chars().count();
    if !(MIN_PASSCODE_LEN..=MAX_PASSCODE_LEN).contains(&len) {
        let mut err = ValidationError::new("passcode_length");
        err.message = Some(
            format!("Passcode must be between {MIN_PASSCODE_LEN} and {MAX_PASSCODE_LEN} characters")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn initialize_request_validates_fields() {
        let ok: InitializeRoomRequest = serde_json::from_value(json!({
            "roomKey": "R1",
            "moderator": "Alice",
            "settings": {"ticketPrefix": "PROJ"}
        }))
        .unwrap();
        assert!(ok.validate().is_ok());

        let bad: InitializeRoomRequest = serde_json::from_value(json!({
            "roomKey": "has space",
            "moderator": "",
            "passcode": "abc"
        }))
        .unwrap();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("room_key"));
        assert!(fields.contains_key("moderator"));
        assert!(fields.contains_key("passcode"));
    }

    #[test]
    fn nested_settings_are_validated() {
        let bad: UpdateSettingsRequest = serde_json::from_value(json!({
            "name": "Alice",
            "settings": {"estimateOptions": []}
        }))
        .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn imports_respect_ticket_ceilings() {
        let ticket = |title: String| ExternalTicket {
            ticket_id: None,
            title: Some(title),
            description: None,
            external_service: ExternalService::Jira,
            external_service_id: Some("JIRA-1".into()),
            metadata: None,
        };
        let ok = ImportQueueRequest {
            name: "Alice".into(),
            tickets: vec![ticket("Fix login".into())],
            state: None,
        };
        assert!(ok.validate().is_ok());

        let too_long = ImportQueueRequest {
            name: "Alice".into(),
            tickets: vec![ticket("t".repeat(501))],
            state: None,
        };
        assert!(too_long.validate().is_err());

        let empty = ImportQueueRequest {
            name: "Alice".into(),
            tickets: Vec::new(),
            state: None,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn clearing_the_passcode_is_valid() {
        let clear = SetPasscodeRequest {
            name: "Alice".into(),
            passcode: None,
        };
        assert!(clear.validate().is_ok());
        let short = SetPasscodeRequest {
            name: "Alice".into(),
            passcode: Some("abc".into()),
        };
        assert!(short.validate().is_err());
    }
}
