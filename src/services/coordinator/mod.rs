//! Per-room coordination: one actor per live room serializes every read and
//! mutation of that room and fans committed changes out to its connections.

mod actor;
pub mod broadcast;
pub mod commands;
mod handle;
pub mod messages;

pub use broadcast::{ConnectionId, ConnectionSender, Outbound};
pub use handle::RoomHandle;
pub use messages::{Admission, Attachment, Credentials, RoomCommand};

use crate::state::SharedState;

use actor::RoomActor;

/// Handle to the actor serving `key`, starting one if none is running.
pub fn room(state: &SharedState, key: &str) -> RoomHandle {
    let mut entry = state
        .rooms()
        .entry(key.to_string())
        .or_insert_with(|| RoomActor::spawn(state.clone(), key.to_string()));
    if entry.is_closed() {
        *entry = RoomActor::spawn(state.clone(), key.to_string());
    }
    entry.clone()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::{MemoryRoomStore, RoomStore},
        dto::{events::DisconnectReason, ws::ClientCommand},
        error::ServiceError,
        state::{AppState, settings::RoomSettings},
    };

    async fn state_with_store(config: AppConfig) -> (SharedState, Arc<MemoryRoomStore>) {
        let state = AppState::new(config, None).unwrap();
        let store = Arc::new(MemoryRoomStore::new());
        state.install_room_store(store.clone()).await;
        (state, store)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Value {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(Outbound::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected an event, got {other:?}"),
        }
    }

    async fn next_of(rx: &mut mpsc::UnboundedReceiver<Outbound>, kind: &str) -> Value {
        loop {
            let event = next_event(rx).await;
            if event["type"] == kind {
                return event;
            }
        }
    }

    async fn attach_pair(
        state: &SharedState,
        key: &str,
        settings: RoomSettings,
    ) -> (
        RoomHandle,
        (Credentials, Attachment, mpsc::UnboundedReceiver<Outbound>),
        (Credentials, Attachment, mpsc::UnboundedReceiver<Outbound>),
    ) {
        let handle = room(state, key);
        let alice = handle
            .initialize("Alice".into(), None, settings, None)
            .await
            .unwrap();
        let bob = handle.join("Bob".into(), None, None, None).await.unwrap();

        let alice = Credentials::new("Alice", alice.session_token);
        let bob = Credentials::new("Bob", bob.session_token);
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let alice_conn = handle.attach(alice.clone(), alice_tx).await.unwrap();
        next_of(&mut alice_rx, "initialize").await;
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let bob_conn = handle.attach(bob.clone(), bob_tx).await.unwrap();
        next_of(&mut bob_rx, "initialize").await;
        next_of(&mut bob_rx, "userConnectionStatus").await;
        let status = next_of(&mut alice_rx, "userConnectionStatus").await;
        if status["user"] == "Alice" {
            next_of(&mut alice_rx, "userConnectionStatus").await;
        }

        (
            handle,
            (alice, alice_conn, alice_rx),
            (bob, bob_conn, bob_rx),
        )
    }

    #[tokio::test]
    async fn initialize_persists_and_rejects_duplicates() {
        let (state, store) = state_with_store(AppConfig::default()).await;
        let handle = room(&state, "ABC123");

        let admission = handle
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();
        assert_eq!(admission.name, "Alice");
        assert!(store.load_room("ABC123").await.unwrap().is_some());

        let again = handle
            .initialize("Carol".into(), None, RoomSettings::default(), None)
            .await;
        assert!(matches!(again, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn attach_sends_initialize_then_commands_fan_out() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let handle = room(&state, "R1");
        let alice = handle
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let attachment = handle
            .attach(Credentials::new("alice", alice.session_token.clone()), tx)
            .await
            .unwrap();

        let init = next_event(&mut rx).await;
        assert_eq!(init["type"], "initialize");
        assert_eq!(init["room"]["key"], "R1");
        let status = next_event(&mut rx).await;
        assert_eq!(status["type"], "userConnectionStatus");

        handle
            .command(attachment.connection_id, ClientCommand::Ping)
            .await
            .unwrap();
        assert_eq!(next_event(&mut rx).await["type"], "pong");

        handle
            .command(
                attachment.connection_id,
                ClientCommand::Vote {
                    vote: "banana".into(),
                    structured_vote: None,
                },
            )
            .await
            .unwrap();
        let error = next_event(&mut rx).await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["kind"], "validation");
    }

    #[tokio::test]
    async fn failed_write_leaves_room_untouched() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let handle = room(&state, "R2");
        let alice = handle
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();
        let credentials = Credentials::new("Alice", alice.session_token);

        state.clear_room_store().await;
        let result = handle
            .execute(credentials.clone(), ClientCommand::ShowVotes.into())
            .await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));

        state.install_room_store(Arc::new(MemoryRoomStore::new())).await;
        let snapshot = handle.snapshot(credentials).await.unwrap();
        assert!(!snapshot.show_votes);
    }

    #[tokio::test]
    async fn logout_closes_the_connection_with_auth_reason() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let handle = room(&state, "R3");
        let alice = handle
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();
        let credentials = Credentials::new("Alice", alice.session_token);

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.attach(credentials.clone(), tx).await.unwrap();
        next_event(&mut rx).await;
        next_event(&mut rx).await;

        handle
            .execute(credentials.clone(), RoomCommand::Logout)
            .await
            .unwrap();

        assert_eq!(next_event(&mut rx).await["type"], "userConnectionStatus");
        let disconnected = next_event(&mut rx).await;
        assert_eq!(disconnected["reason"], "auth");
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close(DisconnectReason::Auth))
        );
        assert!(matches!(
            handle.validate_session(credentials).await,
            Err(ServiceError::Auth(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_actor_unregisters_and_reloads_on_demand() {
        let config = AppConfig {
            idle_timeout: Duration::from_secs(5),
            ..AppConfig::default()
        };
        let (state, _store) = state_with_store(config).await;
        let handle = room(&state, "R4");
        let alice = handle
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(state.rooms().get("R4").is_none());

        let revived = room(&state, "R4");
        let snapshot = revived
            .snapshot(Credentials::new("Alice", alice.session_token))
            .await
            .unwrap();
        assert_eq!(snapshot.key, "R4");
    }

    #[tokio::test]
    async fn detach_keeps_the_participant_and_their_vote() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (handle, (alice, _, mut alice_rx), (_, bob_conn, _bob_rx)) =
            attach_pair(&state, "R5", RoomSettings::default()).await;

        handle
            .command(
                bob_conn.connection_id,
                ClientCommand::Vote {
                    vote: "5".into(),
                    structured_vote: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(next_of(&mut alice_rx, "vote").await["user"], "Bob");

        handle.detach(bob_conn.connection_id).await.unwrap();
        let status = next_of(&mut alice_rx, "userConnectionStatus").await;
        assert_eq!(status["user"], "Bob");
        assert_eq!(status["connected"], false);

        let snapshot = handle.snapshot(alice.clone()).await.unwrap();
        let bob = snapshot.users.iter().find(|u| u.name == "Bob").unwrap();
        assert!(!bob.connected);
        assert!(bob.has_voted);
        assert_eq!(snapshot.moderator, "Alice");

        let revealed = handle
            .execute(alice, ClientCommand::ShowVotes.into())
            .await
            .unwrap();
        let vote = revealed.votes.iter().find(|v| v.user == "Bob").unwrap();
        assert_eq!(vote.vote.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn detached_moderator_is_handed_off_when_enabled() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let settings = RoomSettings {
            auto_handoff_moderator: true,
            ..RoomSettings::default()
        };
        let (handle, (_, alice_conn, _alice_rx), (bob, _, mut bob_rx)) =
            attach_pair(&state, "R6", settings).await;

        handle.detach(alice_conn.connection_id).await.unwrap();
        let status = next_of(&mut bob_rx, "userConnectionStatus").await;
        assert_eq!(status["user"], "Alice");
        assert_eq!(status["connected"], false);
        let handoff = next_event(&mut bob_rx).await;
        assert_eq!(handoff["type"], "newModerator");
        assert_eq!(handoff["moderator"], "Bob");

        let snapshot = handle.snapshot(bob).await.unwrap();
        assert_eq!(snapshot.moderator, "Bob");
        assert!(snapshot.users.iter().any(|u| u.name == "Alice" && !u.connected));
    }

    #[tokio::test]
    async fn detached_moderator_keeps_the_role_by_default() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (handle, (_, alice_conn, _alice_rx), (bob, _, mut bob_rx)) =
            attach_pair(&state, "R7", RoomSettings::default()).await;

        handle.detach(alice_conn.connection_id).await.unwrap();
        assert_eq!(
            next_of(&mut bob_rx, "userConnectionStatus").await["connected"],
            false
        );
        assert_eq!(handle.snapshot(bob).await.unwrap().moderator, "Alice");
        assert!(bob_rx.try_recv().is_err());
    }
}
