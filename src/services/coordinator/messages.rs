use tokio::sync::oneshot;

use crate::{
    credentials::PasscodeHash,
    dto::{requests::ExternalTicket, room::RoomSnapshot, ws::ClientCommand},
    error::ServiceError,
    state::{room::RoomData, settings::RoomSettings},
};

use super::{
    broadcast::{ConnectionId, ConnectionSender},
    commands::FollowUp,
};

pub type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

/// Name and session token presented by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub token: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
        }
    }
}

/// Result of initialize and join.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Canonical participant name.
    pub name: String,
    /// Freshly issued token; any previous one is invalid.
    pub session_token: String,
    /// Room as the admitted participant sees it.
    pub room: RoomSnapshot,
}

/// Result of attaching a real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// Identifies the connection in later commands and the detach.
    pub connection_id: ConnectionId,
}

/// Mutations a caller may request of a room on top of the real-time vocabulary.
#[derive(Debug, Clone)]
pub enum RoomCommand {
    Client(ClientCommand),
    SetPasscode(Option<PasscodeHash>),
    ReplaceData(RoomData),
    ImportQueue(Vec<ExternalTicket>),
    Leave,
    Logout,
}

impl From<ClientCommand> for RoomCommand {
    fn from(command: ClientCommand) -> Self {
        RoomCommand::Client(command)
    }
}

/// Mailbox of a room actor.
pub(super) enum RoomMessage {
    Initialize {
        moderator: String,
        avatar: Option<String>,
        settings: RoomSettings,
        passcode: Option<PasscodeHash>,
        respond_to: Reply<Admission>,
    },
    /// Conflict check ahead of passcode verification; answers the stored hash.
    PrepareJoin {
        name: String,
        token: Option<String>,
        respond_to: Reply<Option<PasscodeHash>>,
    },
    Join {
        name: String,
        avatar: Option<String>,
        token: Option<String>,
        verified_passcode: Option<PasscodeHash>,
        respond_to: Reply<Admission>,
    },
    ValidateSession {
        credentials: Credentials,
        respond_to: Reply<()>,
    },
    Snapshot {
        credentials: Credentials,
        respond_to: Reply<RoomSnapshot>,
    },
    Execute {
        credentials: Credentials,
        command: RoomCommand,
        respond_to: Reply<RoomSnapshot>,
    },
    Attach {
        credentials: Credentials,
        sender: ConnectionSender,
        respond_to: Reply<Attachment>,
    },
    /// Real-time command; failures are reported to the connection itself.
    Command {
        connection_id: ConnectionId,
        command: ClientCommand,
    },
    Detach {
        connection_id: ConnectionId,
    },
    /// Result of work done outside the actor, applied as its own mutation.
    FollowUp(FollowUp),
    PurgeSessions,
}
