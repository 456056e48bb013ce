use serde::{Deserialize, Serialize};

use crate::{
    credentials::{sign_state, verify_state},
    dto::{
        requests::{ExternalTicket, QueueResponse, ShowVotesResponse},
        room::RoomSnapshot,
        ws::ClientCommand,
    },
    error::ServiceError,
    services::{
        coordinator::{Credentials, RoomCommand},
        session_service::{self, room_for},
    },
    state::{
        SharedState, now_millis,
        queue::ExternalService,
        room::RoomData,
        settings::RoomSettings,
    },
};

/// Payload of the signed `state` parameter that round-trips through a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationState {
    pub room_key: String,
    pub name: String,
    pub service: ExternalService,
    pub issued_at: i64,
}

async fn execute(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
    command: impl Into<RoomCommand>,
) -> Result<RoomSnapshot, ServiceError> {
    room_for(state, key)?
        .execute(credentials, command.into())
        .await
}

/// Toggle the reveal state and report the new value.
pub async fn show_votes(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
) -> Result<ShowVotesResponse, ServiceError> {
    let snapshot = execute(state, key, credentials, ClientCommand::ShowVotes).await?;
    Ok(ShowVotesResponse {
        success: true,
        show_votes: snapshot.show_votes,
    })
}

pub async fn reset_votes(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
) -> Result<(), ServiceError> {
    execute(state, key, credentials, ClientCommand::ResetVotes).await?;
    Ok(())
}

/// Current settings; any participant with a valid session may read them.
pub async fn settings(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
) -> Result<RoomSettings, ServiceError> {
    let snapshot = room_for(state, key)?.snapshot(credentials).await?;
    Ok(snapshot.settings)
}

pub async fn update_settings(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
    settings: RoomSettings,
) -> Result<RoomSettings, ServiceError> {
    let snapshot = execute(
        state,
        key,
        credentials,
        ClientCommand::UpdateSettings { settings },
    )
    .await?;
    Ok(snapshot.settings)
}

/// Set or clear the room passcode. Hashing happens before the room is touched.
pub async fn set_passcode(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
    passcode: Option<String>,
) -> Result<(), ServiceError> {
    let hash = match passcode {
        Some(passcode) => Some(session_service::hash_passcode(state, passcode).await?),
        None => None,
    };
    execute(state, key, credentials, RoomCommand::SetPasscode(hash)).await?;
    Ok(())
}

/// Replace roster and current votes in one mutation.
pub async fn replace_data(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
    data: RoomData,
) -> Result<RoomSnapshot, ServiceError> {
    execute(state, key, credentials, RoomCommand::ReplaceData(data)).await
}

/// Sign an integration `state` for a participant with a live session.
pub async fn integration_state(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
    service: ExternalService,
) -> Result<String, ServiceError> {
    room_for(state, key)?
        .validate_session(credentials.clone())
        .await?;
    let payload = IntegrationState {
        room_key: key.to_string(),
        name: credentials.name,
        service,
        issued_at: now_millis(),
    };
    Ok(sign_state(&payload, state.state_secret())?)
}

/// Check a returned `state`: signature, room, caller and age.
pub fn verify_integration_state(
    state: &SharedState,
    key: &str,
    name: &str,
    envelope: &str,
) -> Result<IntegrationState, ServiceError> {
    let payload: IntegrationState = verify_state(envelope, state.state_secret())?;
    if payload.room_key != key {
        return Err(ServiceError::Auth("integration state belongs to another room".into()));
    }
    if payload.name.trim().to_lowercase() != name.trim().to_lowercase() {
        return Err(ServiceError::Auth("integration state belongs to another participant".into()));
    }
    if now_millis().saturating_sub(payload.issued_at) > state.config().session_ttl_ms() {
        return Err(ServiceError::Auth("integration state expired".into()));
    }
    Ok(payload)
}

/// Append tracker tickets to the queue; either all are imported or none.
///
/// When the import carries a signed `state`, every ticket must come from the
/// tracker it was issued for.
pub async fn import_queue(
    state: &SharedState,
    key: &str,
    credentials: Credentials,
    tickets: Vec<ExternalTicket>,
    integration: Option<&str>,
) -> Result<QueueResponse, ServiceError> {
    if let Some(envelope) = integration {
        let issued = verify_integration_state(state, key, &credentials.name, envelope)?;
        if let Some(stray) = tickets
            .iter()
            .find(|ticket| ticket.external_service != issued.service)
        {
            return Err(ServiceError::Validation(format!(
                "ticket from {:?} does not match the {:?} integration",
                stray.external_service, issued.service
            )));
        }
    }
    let snapshot = execute(state, key, credentials, RoomCommand::ImportQueue(tickets)).await?;
    Ok(QueueResponse {
        queue: snapshot.queue,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::RoomEntity,
            room_store::{MemoryRoomStore, RoomStore},
        },
        dto::requests::{InitializeRoomRequest, JoinRoomRequest},
        services::session_service::{initialize, join},
        state::{AppState, queue::ExternalService},
    };

    async fn stored(state: &SharedState) -> RoomEntity {
        let store = state.room_store().await.unwrap();
        store.load_room("ROOM").await.unwrap().unwrap()
    }

    async fn room_with_bob() -> (SharedState, Credentials, Credentials) {
        let config = AppConfig {
            passcode_iterations: 1_000,
            ..AppConfig::default()
        };
        let state = AppState::new(config, None).unwrap();
        state.install_room_store(Arc::new(MemoryRoomStore::new())).await;

        let alice = initialize(
            &state,
            InitializeRoomRequest {
                room_key: Some("ROOM".into()),
                moderator: "Alice".into(),
                passcode: None,
                settings: None,
                avatar: None,
            },
        )
        .await
        .unwrap();
        let bob = join(
            &state,
            "ROOM",
            JoinRoomRequest {
                name: "Bob".into(),
                passcode: None,
                avatar: None,
            },
            None,
        )
        .await
        .unwrap();
        (
            state,
            Credentials::new("Alice", alice.session_token),
            Credentials::new("Bob", bob.session_token),
        )
    }

    #[tokio::test]
    async fn only_moderator_reveals_by_default() {
        let (state, alice, bob) = room_with_bob().await;
        let before = stored(&state).await;

        let denied = show_votes(&state, "ROOM", bob).await;
        assert!(matches!(denied, Err(ServiceError::Permission(_))));
        assert_eq!(stored(&state).await, before);

        let shown = show_votes(&state, "ROOM", alice.clone()).await.unwrap();
        assert!(shown.show_votes);
        let hidden = show_votes(&state, "ROOM", alice).await.unwrap();
        assert!(!hidden.show_votes);
    }

    #[tokio::test]
    async fn settings_round_trip_and_permissions() {
        let (state, alice, bob) = room_with_bob().await;

        let mut next = settings(&state, "ROOM", bob.clone()).await.unwrap();
        next.allow_others_to_show_estimates = true;

        let before = stored(&state).await;
        let denied = update_settings(&state, "ROOM", bob.clone(), next.clone()).await;
        assert!(matches!(denied, Err(ServiceError::Permission(_))));
        assert_eq!(stored(&state).await, before);

        let saved = update_settings(&state, "ROOM", alice, next).await.unwrap();
        assert!(saved.allow_others_to_show_estimates);
        assert!(show_votes(&state, "ROOM", bob).await.unwrap().show_votes);
    }

    #[tokio::test]
    async fn passcode_can_be_set_and_cleared() {
        let (state, alice, bob) = room_with_bob().await;

        let denied = set_passcode(&state, "ROOM", bob, Some("letmein".into())).await;
        assert!(matches!(denied, Err(ServiceError::Permission(_))));

        set_passcode(&state, "ROOM", alice.clone(), Some("letmein".into()))
            .await
            .unwrap();
        let protected = room_for(&state, "ROOM")
            .unwrap()
            .snapshot(alice.clone())
            .await
            .unwrap();
        assert!(protected.has_passcode);

        set_passcode(&state, "ROOM", alice.clone(), None).await.unwrap();
        let open = room_for(&state, "ROOM").unwrap().snapshot(alice).await.unwrap();
        assert!(!open.has_passcode);
    }

    #[tokio::test]
    async fn import_appends_tickets() {
        let (state, alice, _bob) = room_with_bob().await;
        let ticket = |title: &str| ExternalTicket {
            ticket_id: None,
            title: Some(title.into()),
            description: None,
            external_service: ExternalService::Jira,
            external_service_id: Some(format!("JIRA-{title}")),
            metadata: None,
        };

        let response = import_queue(
            &state,
            "ROOM",
            alice,
            vec![ticket("one"), ticket("two")],
            None,
        )
        .await
        .unwrap();
        assert_eq!(response.queue.len(), 2);
        assert_eq!(response.queue[0].title.as_deref(), Some("one"));
        assert!(response.queue[0].ordinal < response.queue[1].ordinal);
    }

    #[tokio::test]
    async fn integration_state_guards_imports() {
        let (state, alice, _bob) = room_with_bob().await;
        let ticket = |service| ExternalTicket {
            ticket_id: None,
            title: Some("from tracker".into()),
            description: None,
            external_service: service,
            external_service_id: Some("LIN-7".into()),
            metadata: None,
        };

        let signed = integration_state(&state, "ROOM", alice.clone(), ExternalService::Linear)
            .await
            .unwrap();
        let decoded = verify_integration_state(&state, "ROOM", "alice", &signed).unwrap();
        assert_eq!(decoded.service, ExternalService::Linear);

        let foreign = verify_integration_state(&state, "ROOM", "Bob", &signed);
        assert!(matches!(foreign, Err(ServiceError::Auth(_))));
        let tampered = format!("{signed}x");
        assert!(verify_integration_state(&state, "ROOM", "Alice", &tampered).is_err());

        let mismatched = import_queue(
            &state,
            "ROOM",
            alice.clone(),
            vec![ticket(ExternalService::Jira)],
            Some(&signed),
        )
        .await;
        assert!(matches!(mismatched, Err(ServiceError::Validation(_))));

        let imported = import_queue(
            &state,
            "ROOM",
            alice,
            vec![ticket(ExternalService::Linear)],
            Some(&signed),
        )
        .await
        .unwrap();
        assert_eq!(imported.queue.len(), 1);

        let stale = Credentials::new("Bob", "not-a-token");
        let denied = integration_state(&state, "ROOM", stale, ExternalService::Github).await;
        assert!(matches!(denied, Err(ServiceError::Auth(_))));
    }
}
