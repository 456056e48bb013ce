//! Connections attached to one room and per-viewer fanout.

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::{DisconnectReason, ServerEvent},
        room::{RoomSnapshot, vote_view},
    },
    state::room::Room,
};

/// Identifier of one attached connection.
pub type ConnectionId = Uuid;

/// Frames handed to a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized event.
    Text(String),
    /// Close the transport with the given reason.
    Close(DisconnectReason),
}

/// Sending half owned by the room; the receiving half is drained by the socket writer.
pub type ConnectionSender = mpsc::UnboundedSender<Outbound>;

/// Event waiting to be delivered after a committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Same payload for every connection.
    Everyone(ServerEvent),
    /// A `vote` event, rendered for each viewer.
    Vote { user: String },
    /// A fresh `initialize` snapshot, rendered for each viewer.
    Snapshot,
}

struct Connection {
    id: ConnectionId,
    name: String,
    sender: ConnectionSender,
}

/// At most one connection per participant name (case-insensitive).
#[derive(Default)]
pub struct ConnectionHub {
    connections: IndexMap<String, Connection>,
}

impl ConnectionHub {
    /// Attach `sender` for `name`. A previous connection of the same
    /// participant is told it was superseded and closed.
    pub fn attach(&mut self, name: &str, sender: ConnectionSender) -> ConnectionId {
        let id = Uuid::new_v4();
        let previous = self.connections.insert(
            fold(name),
            Connection {
                id,
                name: name.to_string(),
                sender,
            },
        );
        if let Some(previous) = previous {
            debug!(user = %previous.name, connection = %previous.id, "connection superseded");
            send_event(
                &previous.sender,
                &ServerEvent::Disconnected {
                    reason: DisconnectReason::Disconnect,
                },
            );
            let _ = previous.sender.send(Outbound::Close(DisconnectReason::Disconnect));
        }
        id
    }

    /// Drop the connection `id`. Returns the participant name when it was the
    /// live connection of that participant.
    pub fn detach(&mut self, id: ConnectionId) -> Option<String> {
        let key = self
            .connections
            .iter()
            .find(|(_, connection)| connection.id == id)
            .map(|(key, _)| key.clone())?;
        self.connections
            .shift_remove(&key)
            .map(|connection| connection.name)
    }

    /// Participant attached through `id`.
    pub fn name_of(&self, id: ConnectionId) -> Option<String> {
        self.connections
            .values()
            .find(|connection| connection.id == id)
            .map(|connection| connection.name.clone())
    }

    /// Names of the attached participants.
    pub fn names(&self) -> Vec<String> {
        self.connections
            .values()
            .map(|connection| connection.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Send `event` to the connection `id` only.
    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) {
        if let Some(connection) = self.connections.values().find(|c| c.id == id) {
            send_event(&connection.sender, event);
        }
    }

    /// Tell `name`'s connection why it is being closed, then close it.
    pub fn close(&mut self, name: &str, reason: DisconnectReason) {
        if let Some(connection) = self.connections.shift_remove(&fold(name)) {
            send_event(&connection.sender, &ServerEvent::Disconnected { reason });
            let _ = connection.sender.send(Outbound::Close(reason));
        }
    }

    /// Close every connection, used when the room actor stops.
    pub fn close_all(&mut self, reason: DisconnectReason) {
        for (_, connection) in self.connections.drain(..) {
            let _ = connection.sender.send(Outbound::Close(reason));
        }
    }

    /// Deliver `outgoing` to every attached connection, rendering per viewer
    /// where the payload depends on who is looking.
    pub fn deliver(&self, outgoing: &Outgoing, room: &Room, now: i64) {
        match outgoing {
            Outgoing::Everyone(event) => {
                let Some(payload) = serialize(event) else {
                    return;
                };
                for connection in self.connections.values() {
                    let _ = connection.sender.send(Outbound::Text(payload.clone()));
                }
            }
            Outgoing::Vote { user } => {
                for connection in self.connections.values() {
                    send_event(&connection.sender, &vote_event(room, user, &connection.name));
                }
            }
            Outgoing::Snapshot => {
                for connection in self.connections.values() {
                    send_event(
                        &connection.sender,
                        &initialize_event(room, &connection.name, now),
                    );
                }
            }
        }
    }
}

/// `vote` event for `user` as `viewer` sees it.
pub fn vote_event(room: &Room, user: &str, viewer: &str) -> ServerEvent {
    let view = vote_view(room, user, Some(viewer));
    let has_voted =
        room.votes().contains_key(user) || room.structured_votes().contains_key(user);
    // Anonymous reveal: only the voter sees the value next to the name.
    let anonymous = room.settings().anonymous_votes && !user.eq_ignore_ascii_case(viewer);
    ServerEvent::Vote {
        user: user.to_string(),
        has_voted,
        vote: view.vote.filter(|_| !anonymous),
        structured_vote: view.structured_vote.filter(|_| !anonymous),
    }
}

/// `initialize` event carrying `viewer`'s snapshot.
pub fn initialize_event(room: &Room, viewer: &str, now: i64) -> ServerEvent {
    ServerEvent::Initialize {
        room: Box::new(RoomSnapshot::for_viewer(room, Some(viewer), now)),
    }
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

fn serialize<T: Serialize + std::fmt::Debug>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize event `{value:?}`");
            None
        }
    }
}

fn send_event(sender: &ConnectionSender, event: &ServerEvent) {
    if let Some(payload) = serialize(event) {
        let _ = sender.send(Outbound::Text(payload));
    }
}
