use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::mpsc;

use estimation_room_back::{
    config::AppConfig,
    dao::room_store::{MemoryRoomStore, RoomStore},
    dto::{
        requests::{InitializeRoomRequest, JoinRoomRequest},
        ws::{ClientCommand, validate_message},
    },
    error::ServiceError,
    services::{
        coordinator::{self, ConnectionId, Credentials, Outbound, RoomHandle},
        room_service, session_service,
    },
    state::{AppState, SharedState},
};

async fn test_state() -> (SharedState, Arc<MemoryRoomStore>) {
    let config = AppConfig {
        passcode_iterations: 1_000,
        ..AppConfig::default()
    };
    let state = AppState::new(config, None).expect("state");
    let store = Arc::new(MemoryRoomStore::new());
    state.install_room_store(store.clone()).await;
    (state, store)
}

fn initialize_request(key: &str, moderator: &str) -> InitializeRoomRequest {
    InitializeRoomRequest {
        room_key: Some(key.into()),
        moderator: moderator.into(),
        passcode: None,
        settings: None,
        avatar: None,
    }
}

fn join_request(name: &str) -> JoinRoomRequest {
    JoinRoomRequest {
        name: name.into(),
        passcode: None,
        avatar: None,
    }
}

struct Client {
    connection_id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Client {
    async fn connect(handle: &RoomHandle, credentials: Credentials) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attachment = handle.attach(credentials, tx).await.expect("attach");
        let init = next_event(&mut rx).await;
        assert_eq!(init["type"], "initialize");
        Self {
            connection_id: attachment.connection_id,
            rx,
        }
    }

    async fn next(&mut self) -> Value {
        next_event(&mut self.rx).await
    }

    /// Skip presence chatter until an event of `kind` arrives.
    async fn next_of(&mut self, kind: &str) -> Value {
        loop {
            let event = self.next().await;
            if event["type"] == kind {
                return event;
            }
            assert_eq!(
                event["type"], "userConnectionStatus",
                "unexpected event while waiting for {kind}: {event}"
            );
        }
    }

    fn assert_quiet(&mut self) {
        assert!(self.rx.try_recv().is_err(), "no further events expected");
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Value {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(Outbound::Text(text))) => serde_json::from_str(&text).expect("json event"),
        other => panic!("expected an event, got {other:?}"),
    }
}

#[tokio::test]
async fn vote_then_reveal_reaches_everyone_in_order() {
    let (state, _store) = test_state().await;
    let alice = session_service::initialize(&state, initialize_request("R1", "Alice"))
        .await
        .unwrap();
    let bob = session_service::join(&state, "R1", join_request("Bob"), None)
        .await
        .unwrap();

    let handle = coordinator::room(&state, "R1");
    let mut alice_client =
        Client::connect(&handle, Credentials::new("Alice", alice.session_token.clone())).await;
    let mut bob_client =
        Client::connect(&handle, Credentials::new("Bob", bob.session_token.clone())).await;

    let vote = validate_message(r#"{"type":"vote","vote":"5"}"#).unwrap();
    handle.command(bob_client.connection_id, vote).await.unwrap();
    handle
        .command(alice_client.connection_id, ClientCommand::ShowVotes)
        .await
        .unwrap();

    let alice_vote = alice_client.next_of("vote").await;
    assert_eq!(alice_vote["user"], "Bob");
    assert_eq!(alice_vote["hasVoted"], true);
    assert!(alice_vote.get("vote").is_none());
    let alice_reveal = alice_client.next().await;
    assert_eq!(alice_reveal["type"], "showVotes");
    assert_eq!(alice_reveal["showVotes"], true);

    let bob_vote = bob_client.next_of("vote").await;
    assert_eq!(bob_vote["vote"], "5");
    let bob_reveal = bob_client.next().await;
    assert_eq!(bob_reveal["type"], "showVotes");

    alice_client.assert_quiet();
    bob_client.assert_quiet();

    let snapshot = handle
        .snapshot(Credentials::new("Alice", alice.session_token))
        .await
        .unwrap();
    assert!(snapshot.show_votes);
    assert_eq!(snapshot.votes.len(), 1);
}

#[tokio::test]
async fn second_join_of_a_connected_name_conflicts() {
    let (state, _store) = test_state().await;
    session_service::initialize(&state, initialize_request("R2", "Alice"))
        .await
        .unwrap();
    session_service::join(&state, "R2", join_request("Bob"), None)
        .await
        .unwrap();

    let err = session_service::join(&state, "R2", join_request("bob"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn rejected_command_changes_nothing() {
    let (state, store) = test_state().await;
    session_service::initialize(&state, initialize_request("R3", "Alice"))
        .await
        .unwrap();
    let bob = session_service::join(&state, "R3", join_request("Bob"), None)
        .await
        .unwrap();
    let bob_credentials = || Credentials::new("Bob", bob.session_token.clone());

    let handle = coordinator::room(&state, "R3");
    let mut bob_client = Client::connect(&handle, bob_credentials()).await;
    let before = store.load_room("R3").await.unwrap().unwrap();
    handle
        .command(bob_client.connection_id, ClientCommand::CompleteSession)
        .await
        .unwrap();

    let error = bob_client.next_of("error").await;
    assert_eq!(error["kind"], "permission");

    let denied = room_service::reset_votes(&state, "R3", bob_credentials()).await;
    assert!(matches!(denied, Err(ServiceError::Permission(_))));

    let reveal = room_service::show_votes(&state, "R3", bob_credentials()).await;
    assert!(matches!(reveal, Err(ServiceError::Permission(_))));

    let mut settings = room_service::settings(&state, "R3", bob_credentials())
        .await
        .unwrap();
    settings.allow_others_to_show_estimates = true;
    let update = room_service::update_settings(&state, "R3", bob_credentials(), settings).await;
    assert!(matches!(update, Err(ServiceError::Permission(_))));

    let after = store.load_room("R3").await.unwrap().unwrap();
    assert_eq!(before.room, after.room);
    assert_eq!(before.updated_at, after.updated_at);
}

#[tokio::test]
async fn leaving_moderator_hands_the_seat_to_the_next_participant() {
    let (state, _store) = test_state().await;
    let alice = session_service::initialize(&state, initialize_request("R4", "Alice"))
        .await
        .unwrap();
    let bob = session_service::join(&state, "R4", join_request("Bob"), None)
        .await
        .unwrap();

    let handle = coordinator::room(&state, "R4");
    let mut bob_client =
        Client::connect(&handle, Credentials::new("Bob", bob.session_token.clone())).await;

    session_service::leave(&state, "R4", Credentials::new("Alice", alice.session_token))
        .await
        .unwrap();

    let left = bob_client.next_of("userLeft").await;
    assert_eq!(left["user"], "Alice");
    let promoted = bob_client.next().await;
    assert_eq!(promoted["type"], "newModerator");
    assert_eq!(promoted["moderator"], "Bob");

    let snapshot = handle
        .snapshot(Credentials::new("Bob", bob.session_token))
        .await
        .unwrap();
    assert_eq!(snapshot.moderator, "Bob");
    assert_eq!(snapshot.users.len(), 1);
}
