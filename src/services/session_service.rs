use rand::{Rng, rng};
use tokio::task;
use tracing::{info, warn};

use crate::{
    credentials::{self, PasscodeHash},
    dto::{
        requests::{InitializeRoomRequest, JoinRoomRequest},
        validation::validate_room_key,
    },
    error::ServiceError,
    services::coordinator::{self, Admission, Credentials, RoomCommand, RoomHandle},
    state::{SharedState, settings::RoomSettings},
};

const ROOM_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GENERATED_ROOM_KEY_LEN: usize = 6;
const ROOM_KEY_ATTEMPTS: usize = 8;

/// Create a room and admit its moderator.
///
/// Without an explicit key a random one is drawn, retrying on collisions.
pub async fn initialize(
    state: &SharedState,
    request: InitializeRoomRequest,
) -> Result<Admission, ServiceError> {
    let InitializeRoomRequest {
        room_key,
        moderator,
        passcode,
        settings,
        avatar,
    } = request;

    let settings = settings.unwrap_or_else(|| state.config().default_room_settings());
    let passcode = match passcode {
        Some(passcode) => Some(hash_passcode(state, passcode).await?),
        None => None,
    };

    if let Some(key) = room_key {
        let handle = room_for(state, key.trim())?;
        return create(&handle, moderator, avatar, settings, passcode).await;
    }

    for _ in 0..ROOM_KEY_ATTEMPTS {
        let handle = coordinator::room(state, &generate_room_key());
        match create(
            &handle,
            moderator.clone(),
            avatar.clone(),
            settings.clone(),
            passcode.clone(),
        )
        .await
        {
            Err(ServiceError::Conflict(_)) => continue,
            other => return other,
        }
    }
    Err(ServiceError::Internal(
        "could not allocate a free room key".into(),
    ))
}

async fn create(
    handle: &RoomHandle,
    moderator: String,
    avatar: Option<String>,
    settings: RoomSettings,
    passcode: Option<PasscodeHash>,
) -> Result<Admission, ServiceError> {
    let admission = handle
        .initialize(moderator, avatar, settings, passcode)
        .await?;
    info!(room = %handle.key(), moderator = %admission.name, "room created");
    Ok(admission)
}

/// Admit `request.name` into an existing room.
///
/// `token` is the caller's previous session token, which lets a participant
/// that is still marked connected take over its own seat.
pub async fn join(
    state: &SharedState,
    key: &str,
    request: JoinRoomRequest,
    token: Option<String>,
) -> Result<Admission, ServiceError> {
    let JoinRoomRequest {
        name,
        passcode,
        avatar,
    } = request;
    let handle = room_for(state, key)?;

    let stored = handle.prepare_join(name.clone(), token.clone()).await?;
    if let Some(hash) = stored.clone() {
        let Some(candidate) = passcode else {
            return Err(ServiceError::Passcode);
        };
        let matches = task::spawn_blocking(move || credentials::verify_passcode(&candidate, &hash))
            .await
            .map_err(|e| ServiceError::Internal(format!("passcode check failed: {e}")))?;
        if !matches {
            warn!(room = %key, user = %name, "join rejected: wrong passcode");
            return Err(ServiceError::Passcode);
        }
    }

    handle.join(name, avatar, token, stored).await
}

/// Succeeds only while `token` is the current, unexpired token of `name`.
pub async fn validate_session(
    state: &SharedState,
    key: &str,
    name: String,
    token: String,
) -> Result<(), ServiceError> {
    room_for(state, key)?
        .validate_session(Credentials::new(name, token))
        .await
}

/// Revoke the caller's token and mark them disconnected.
pub async fn logout(state: &SharedState, key: &str, credentials: Credentials) -> Result<(), ServiceError> {
    let name = credentials.name.clone();
    room_for(state, key)?
        .execute(credentials, RoomCommand::Logout)
        .await?;
    info!(room = %key, user = %name, "participant logged out");
    Ok(())
}

/// Remove the caller from the room.
pub async fn leave(state: &SharedState, key: &str, credentials: Credentials) -> Result<(), ServiceError> {
    let name = credentials.name.clone();
    room_for(state, key)?
        .execute(credentials, RoomCommand::Leave)
        .await?;
    info!(room = %key, user = %name, "participant left");
    Ok(())
}

/// Hash a passcode off the async runtime using the configured rounds.
pub async fn hash_passcode(
    state: &SharedState,
    passcode: String,
) -> Result<PasscodeHash, ServiceError> {
    let iterations = state.config().passcode_iterations;
    task::spawn_blocking(move || credentials::hash_passcode(&passcode, None, Some(iterations)))
        .await
        .map_err(|e| ServiceError::Internal(format!("passcode hashing failed: {e}")))?
        .map_err(ServiceError::from)
}

/// Handle of the room `key` after checking the key format.
pub(crate) fn room_for(state: &SharedState, key: &str) -> Result<RoomHandle, ServiceError> {
    validate_room_key(key).map_err(|err| {
        ServiceError::Validation(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| "invalid room key".into()),
        )
    })?;
    Ok(coordinator::room(state, key))
}

fn generate_room_key() -> String {
    let mut rng = rng();
    (0..GENERATED_ROOM_KEY_LEN)
        .map(|_| ROOM_KEY_ALPHABET[rng.random_range(0..ROOM_KEY_ALPHABET.len())] as char)
        .collect()
}
