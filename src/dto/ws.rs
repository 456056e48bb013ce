//! Real-time command vocabulary and the validator guarding it.
//!
//! Frames arrive as untrusted JSON text; [`validate_message`] is the only way
//! to obtain a [`ClientCommand`], so the coordinator never re-checks shapes.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

use crate::{
    dto::validation::{MAX_ESTIMATE_LEN, validate_participant_name},
    state::{
        queue::{ExternalService, MoveDirection, TicketStatus, TicketUpdate},
        room::StructuredVote,
        settings::RoomSettings,
        timer::TimerConfig,
    },
};

/// Longest ticket title accepted.
pub const MAX_TITLE_LEN: usize = 500;
/// Longest ticket description accepted.
pub const MAX_DESCRIPTION_LEN: usize = 10_000;
/// Longest serialized ticket metadata accepted.
pub const MAX_METADATA_LEN: usize = 10_000;
/// Longest strudel prompt accepted.
pub const MAX_PROMPT_LEN: usize = 1_000;
/// Longest human readable ticket id accepted.
pub const MAX_TICKET_ID_LEN: usize = 64;
/// Largest numeric suffix a client may put in a `PREFIX-NNN` ticket id.
pub const MAX_TICKET_NUMBER: u64 = 999_999_999;
/// Longest tracker-side identifier accepted.
pub const MAX_EXTERNAL_ID_LEN: usize = 200;
/// Ordinals set by clients stay within `-MAX_ORDINAL..=MAX_ORDINAL`.
pub const MAX_ORDINAL: i64 = 1_000_000_000_000;

const UNKNOWN_TYPE: &str = "Unknown message type";

/// Commands a connected participant may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    Vote {
        vote: String,
        #[serde(default)]
        structured_vote: Option<StructuredVote>,
    },
    ShowVotes,
    ResetVotes,
    UpdateSettings {
        settings: RoomSettings,
    },
    SelectTicket {
        ticket_id: u64,
    },
    NextTicket,
    AddTicket {
        ticket: TicketDraft,
    },
    UpdateTicket {
        ticket_id: u64,
        updates: TicketUpdate,
    },
    DeleteTicket {
        ticket_id: u64,
    },
    MoveTicket {
        ticket_id: u64,
        direction: MoveDirection,
    },
    StartTimer,
    PauseTimer,
    ResetTimer,
    ConfigureTimer {
        #[serde(flatten)]
        config: TimerConfig,
    },
    ToggleSpectator {
        is_spectator: bool,
    },
    TransferModerator {
        to: String,
    },
    CompleteSession,
    Ping,
    GenerateStrudelCode {
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        style: Option<String>,
    },
    ToggleStrudelPlayback {
        is_playing: bool,
    },
}

const KNOWN_TYPES: &[&str] = &[
    "vote",
    "showVotes",
    "resetVotes",
    "updateSettings",
    "selectTicket",
    "nextTicket",
    "addTicket",
    "updateTicket",
    "deleteTicket",
    "moveTicket",
    "startTimer",
    "pauseTimer",
    "resetTimer",
    "configureTimer",
    "toggleSpectator",
    "transferModerator",
    "completeSession",
    "ping",
    "generateStrudelCode",
    "toggleStrudelPlayback",
];

/// Ticket fields supplied by `addTicket`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDraft {
    /// Human readable id; generated from the room prefix when absent.
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub external_service: Option<ExternalService>,
    #[serde(default)]
    pub external_service_id: Option<String>,
    #[serde(default)]
    pub external_service_metadata: Option<Value>,
}

/// Why an inbound frame was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InvalidMessage {
    /// Human readable reason returned to the sender.
    pub message: String,
}

impl InvalidMessage {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turn a raw text frame into a typed command or a descriptive rejection.
pub fn validate_message(raw: &str) -> Result<ClientCommand, InvalidMessage> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| InvalidMessage::new(format!("Message is not valid JSON: {err}")))?;
    validate_value(value)
}

/// Same as [`validate_message`] for an already parsed JSON value.
pub fn validate_value(value: Value) -> Result<ClientCommand, InvalidMessage> {
    let Some(object) = value.as_object() else {
        return Err(InvalidMessage::new("Message must be a JSON object"));
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return Err(InvalidMessage::new("Message must carry a string `type`"));
    };
    if !KNOWN_TYPES.contains(&kind) {
        return Err(InvalidMessage::new(UNKNOWN_TYPE));
    }
    let kind = kind.to_string();

    let command: ClientCommand = serde_json::from_value(value)
        .map_err(|err| InvalidMessage::new(format!("Invalid `{kind}` message: {err}")))?;
    check_command(&command)?;
    Ok(command)
}

fn check_command(command: &ClientCommand) -> Result<(), InvalidMessage> {
    match command {
        ClientCommand::Vote { vote, .. } => {
            let len = vote.chars().count();
            if len == 0 || len > MAX_ESTIMATE_LEN {
                return Err(InvalidMessage::new(format!(
                    "Vote must be between 1 and {MAX_ESTIMATE_LEN} characters"
                )));
            }
            Ok(())
        }
        ClientCommand::AddTicket { ticket } => check_ticket_limits(TicketFields {
            ticket_id: ticket.ticket_id.as_deref(),
            title: ticket.title.as_deref(),
            description: ticket.description.as_deref(),
            external_service_id: ticket.external_service_id.as_deref(),
            metadata: ticket.external_service_metadata.as_ref(),
        }),
        ClientCommand::UpdateTicket { updates, .. } => {
            if updates
                .ordinal
                .is_some_and(|ordinal| !(-MAX_ORDINAL..=MAX_ORDINAL).contains(&ordinal))
            {
                return Err(InvalidMessage::new(format!(
                    "Ticket ordinal must be between -{MAX_ORDINAL} and {MAX_ORDINAL}"
                )));
            }
            check_ticket_limits(TicketFields {
                ticket_id: updates.ticket_id.as_deref(),
                title: updates.title.as_deref(),
                description: updates.description.as_deref(),
                external_service_id: None,
                metadata: updates.external_service_metadata.as_ref(),
            })
        }
        ClientCommand::UpdateSettings { settings } => settings
            .validate()
            .map_err(|err| InvalidMessage::new(format!("Invalid settings: {err}"))),
        ClientCommand::TransferModerator { to } => {
            validate_participant_name(to).map_err(|err| InvalidMessage::new(err.to_string()))
        }
        ClientCommand::GenerateStrudelCode { prompt, style } => {
            let too_long = |value: &Option<String>| {
                value
                    .as_deref()
                    .is_some_and(|text| text.chars().count() > MAX_PROMPT_LEN)
            };
            if too_long(prompt) || too_long(style) {
                return Err(InvalidMessage::new(format!(
                    "Prompt and style must be at most {MAX_PROMPT_LEN} characters"
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Client supplied ticket fields subject to [`check_ticket_limits`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketFields<'a> {
    /// Human readable id, when the client picks one.
    pub ticket_id: Option<&'a str>,
    /// Ticket title.
    pub title: Option<&'a str>,
    /// Ticket description.
    pub description: Option<&'a str>,
    /// Identifier on the issue tracker side.
    pub external_service_id: Option<&'a str>,
    /// Opaque tracker metadata.
    pub metadata: Option<&'a Value>,
}

/// Enforce the ticket ceilings shared by real-time commands and imports.
pub fn check_ticket_limits(fields: TicketFields<'_>) -> Result<(), InvalidMessage> {
    if let Some(ticket_id) = fields.ticket_id {
        check_ticket_id(ticket_id)?;
    }
    check_length("title", fields.title, MAX_TITLE_LEN)?;
    check_length("description", fields.description, MAX_DESCRIPTION_LEN)?;
    check_length(
        "external service id",
        fields.external_service_id,
        MAX_EXTERNAL_ID_LEN,
    )?;
    if let Some(metadata) = fields.metadata {
        let len = metadata.to_string().chars().count();
        if len > MAX_METADATA_LEN {
            return Err(InvalidMessage::new(format!(
                "Ticket metadata must serialize to at most {MAX_METADATA_LEN} characters (got {len})"
            )));
        }
    }
    Ok(())
}

fn check_length(field: &str, value: Option<&str>, max: usize) -> Result<(), InvalidMessage> {
    let len = value.map_or(0, |text| text.chars().count());
    if len > max {
        return Err(InvalidMessage::new(format!(
            "Ticket {field} must be at most {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Generated ids continue from the highest numeric suffix, so that suffix is capped.
fn check_ticket_id(ticket_id: &str) -> Result<(), InvalidMessage> {
    check_length("id", Some(ticket_id), MAX_TICKET_ID_LEN)?;
    let suffix = ticket_id.rsplit_once('-').map_or(ticket_id, |(_, suffix)| suffix);
    if !suffix.is_empty()
        && suffix.bytes().all(|b| b.is_ascii_digit())
        && suffix
            .parse::<u64>()
            .map_or(true, |number| number > MAX_TICKET_NUMBER)
    {
        return Err(InvalidMessage::new(format!(
            "Ticket id number must be at most {MAX_TICKET_NUMBER}"
        )));
    }
    Ok(())
}
