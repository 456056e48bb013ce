use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
    credentials::PasscodeHash,
    dto::{room::RoomSnapshot, ws::ClientCommand},
    error::ServiceError,
    state::settings::RoomSettings,
};

use super::{
    broadcast::{ConnectionId, ConnectionSender},
    messages::{Admission, Attachment, Credentials, Reply, RoomCommand, RoomMessage},
};

/// Handle to a room actor. Cheap to clone; every call is serialized by the actor.
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
    id: Uuid,
    key: Arc<str>,
}

impl RoomHandle {
    pub(super) fn new(sender: mpsc::Sender<RoomMessage>, id: Uuid, key: &str) -> Self {
        Self {
            sender,
            id,
            key: Arc::from(key),
        }
    }

    /// Room key served by the actor.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(super) fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the actor behind this handle has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomMessage,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| ServiceError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ServiceError::Internal(format!("response receive failed: {e}")))?
    }

    async fn notify(&self, message: RoomMessage) -> Result<(), ServiceError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| ServiceError::Internal(format!("channel send failed: {e}")))
    }

    /// Create the room with `moderator` as its first participant.
    pub async fn initialize(
        &self,
        moderator: String,
        avatar: Option<String>,
        settings: RoomSettings,
        passcode: Option<PasscodeHash>,
    ) -> Result<Admission, ServiceError> {
        self.request(|respond_to| RoomMessage::Initialize {
            moderator,
            avatar,
            settings,
            passcode,
            respond_to,
        })
        .await
    }

    /// Check that `name` may join and fetch the passcode hash to verify against.
    pub async fn prepare_join(
        &self,
        name: String,
        token: Option<String>,
    ) -> Result<Option<PasscodeHash>, ServiceError> {
        self.request(|respond_to| RoomMessage::PrepareJoin {
            name,
            token,
            respond_to,
        })
        .await
    }

    /// Admit `name`. `verified_passcode` is the hash the caller checked the
    /// passcode against; the join fails if it changed in the meantime.
    pub async fn join(
        &self,
        name: String,
        avatar: Option<String>,
        token: Option<String>,
        verified_passcode: Option<PasscodeHash>,
    ) -> Result<Admission, ServiceError> {
        self.request(|respond_to| RoomMessage::Join {
            name,
            avatar,
            token,
            verified_passcode,
            respond_to,
        })
        .await
    }

    pub async fn validate_session(&self, credentials: Credentials) -> Result<(), ServiceError> {
        self.request(|respond_to| RoomMessage::ValidateSession {
            credentials,
            respond_to,
        })
        .await
    }

    /// Snapshot of the room as the caller may see it.
    pub async fn snapshot(&self, credentials: Credentials) -> Result<RoomSnapshot, ServiceError> {
        self.request(|respond_to| RoomMessage::Snapshot {
            credentials,
            respond_to,
        })
        .await
    }

    /// Run `command` on behalf of an authenticated caller and return their
    /// snapshot after it committed.
    pub async fn execute(
        &self,
        credentials: Credentials,
        command: RoomCommand,
    ) -> Result<RoomSnapshot, ServiceError> {
        self.request(|respond_to| RoomMessage::Execute {
            credentials,
            command,
            respond_to,
        })
        .await
    }

    /// Register a real-time connection. The connection immediately receives `initialize`.
    pub async fn attach(
        &self,
        credentials: Credentials,
        sender: ConnectionSender,
    ) -> Result<Attachment, ServiceError> {
        self.request(|respond_to| RoomMessage::Attach {
            credentials,
            sender,
            respond_to,
        })
        .await
    }

    /// Queue a real-time command; its outcome is delivered on the connection.
    pub async fn command(
        &self,
        connection_id: ConnectionId,
        command: ClientCommand,
    ) -> Result<(), ServiceError> {
        self.notify(RoomMessage::Command {
            connection_id,
            command,
        })
        .await
    }

    pub async fn detach(&self, connection_id: ConnectionId) -> Result<(), ServiceError> {
        self.notify(RoomMessage::Detach { connection_id }).await
    }

    /// Ask the actor to drop expired session tokens.
    pub async fn purge_sessions(&self) -> Result<(), ServiceError> {
        self.notify(RoomMessage::PurgeSessions).await
    }
}
