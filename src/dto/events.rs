//! Coordinator to client event vocabulary.

use serde::Serialize;

use crate::{
    dto::room::{ParticipantView, RoomSnapshot, TimerView, VoteView},
    state::{
        queue::TicketQueueItem,
        room::{JudgeState, StructuredVote},
        settings::RoomSettings,
    },
};

/// Reason attached to `disconnected` events and transport closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    /// Credential missing, expired or revoked.
    Auth,
    /// Superseded by another connection or closed by the server.
    Disconnect,
    /// The participant lost a right required to stay.
    Permission,
    /// Transport failure.
    Network,
}

impl DisconnectReason {
    /// Wire value of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Disconnect => "disconnect",
            Self::Permission => "permission",
            Self::Network => "network",
        }
    }
}

/// Frames pushed to connected clients as `{ "type": ..., ...payload }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Initialize {
        room: Box<RoomSnapshot>,
    },
    UserJoined {
        user: ParticipantView,
    },
    UserLeft {
        user: String,
    },
    UserConnectionStatus {
        user: String,
        connected: bool,
    },
    SpectatorStatusChanged {
        user: String,
        is_spectator: bool,
    },
    Vote {
        user: String,
        has_voted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        vote: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        structured_vote: Option<StructuredVote>,
    },
    ShowVotes {
        show_votes: bool,
        votes: Vec<VoteView>,
    },
    ResetVotes {
        timer: TimerView,
    },
    NewModerator {
        moderator: String,
    },
    SettingsUpdated {
        settings: RoomSettings,
    },
    JudgeScoreUpdated {
        judge: Option<JudgeState>,
    },
    TicketAdded {
        ticket: TicketQueueItem,
    },
    TicketUpdated {
        ticket: TicketQueueItem,
    },
    TicketDeleted {
        ticket_id: u64,
    },
    TicketCompleted {
        ticket: TicketQueueItem,
    },
    NextTicket {
        ticket: Option<TicketQueueItem>,
        queue: Vec<TicketQueueItem>,
    },
    QueueUpdated {
        queue: Vec<TicketQueueItem>,
    },
    TimerStarted {
        timer: TimerView,
    },
    TimerPaused {
        timer: TimerView,
    },
    TimerReset {
        timer: TimerView,
    },
    TimerUpdated {
        timer: TimerView,
    },
    SessionCompleted {
        completed_at: i64,
    },
    StrudelGenerationStarted {
        requested_by: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    StrudelCodeGenerated {
        code: String,
        generated_at: i64,
    },
    StrudelPlaybackToggled {
        is_playing: bool,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        kind: String,
        message: String,
    },
    Disconnected {
        reason: DisconnectReason,
    },
}

impl ServerEvent {
    /// Wire name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::UserJoined { .. } => "userJoined",
            Self::UserLeft { .. } => "userLeft",
            Self::UserConnectionStatus { .. } => "userConnectionStatus",
            Self::SpectatorStatusChanged { .. } => "spectatorStatusChanged",
            Self::Vote { .. } => "vote",
            Self::ShowVotes { .. } => "showVotes",
            Self::ResetVotes { .. } => "resetVotes",
            Self::NewModerator { .. } => "newModerator",
            Self::SettingsUpdated { .. } => "settingsUpdated",
            Self::JudgeScoreUpdated { .. } => "judgeScoreUpdated",
            Self::TicketAdded { .. } => "ticketAdded",
            Self::TicketUpdated { .. } => "ticketUpdated",
            Self::TicketDeleted { .. } => "ticketDeleted",
            Self::TicketCompleted { .. } => "ticketCompleted",
            Self::NextTicket { .. } => "nextTicket",
            Self::QueueUpdated { .. } => "queueUpdated",
            Self::TimerStarted { .. } => "timerStarted",
            Self::TimerPaused { .. } => "timerPaused",
            Self::TimerReset { .. } => "timerReset",
            Self::TimerUpdated { .. } => "timerUpdated",
            Self::SessionCompleted { .. } => "sessionCompleted",
            Self::StrudelGenerationStarted { .. } => "strudelGenerationStarted",
            Self::StrudelCodeGenerated { .. } => "strudelCodeGenerated",
            Self::StrudelPlaybackToggled { .. } => "strudelPlaybackToggled",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn events_are_tagged_with_camel_case_fields() {
        let event = ServerEvent::SpectatorStatusChanged {
            user: "Bob".into(),
            is_spectator: true,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "spectatorStatusChanged", "user": "Bob", "isSpectator": true})
        );
        assert_eq!(event.name(), "spectatorStatusChanged");
    }

    #[test]
    fn hidden_vote_omits_value() {
        let event = ServerEvent::Vote {
            user: "Bob".into(),
            has_voted: true,
            vote: None,
            structured_vote: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "vote", "user": "Bob", "hasVoted": true})
        );
    }

    #[test]
    fn disconnect_reason_is_lowercase() {
        let event = ServerEvent::Disconnected {
            reason: DisconnectReason::Auth,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "disconnected", "reason": "auth"})
        );
        assert_eq!(DisconnectReason::Network.as_str(), "network");
    }
}
