use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::{validate_estimate_options, validate_ticket_prefix},
    state::queue::ExternalService,
};

/// Deck offered when neither the room nor the configuration provides one.
pub fn default_estimate_options() -> Vec<String> {
    ["0", "1", "2", "3", "5", "8", "13", "21", "?", "coffee"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Ticket prefix used when nothing else is configured.
pub const DEFAULT_TICKET_PREFIX: &str = "TICKET";

/// Per-room behaviour and display toggles.
///
/// Every field has a default so clients can send partial objects on
/// initialize; `updateSettings` always replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Values participants can vote with.
    pub estimate_options: Vec<String>,
    /// Criteria names scored by structured votes.
    pub voting_criteria: Vec<String>,
    pub show_timer: bool,
    pub show_user_presence: bool,
    pub show_average: bool,
    pub show_median: bool,
    /// Redact voter names from revealed votes and ticket history.
    pub anonymous_votes: bool,
    /// Hide participant names from the presence list.
    pub hide_participant_names: bool,
    pub allow_others_to_show_estimates: bool,
    pub allow_others_to_delete_estimates: bool,
    pub allow_others_to_manage_queue: bool,
    pub allow_others_to_control_timer: bool,
    pub enable_ticket_queue: bool,
    pub enable_judge: bool,
    pub enable_structured_voting: bool,
    /// Hand the moderator role over when the moderator disconnects.
    pub auto_handoff_moderator: bool,
    /// Prefix of generated `PREFIX-NNN` ticket ids.
    pub ticket_prefix: String,
    /// Issue tracker the queue is wired to.
    pub external_service: ExternalService,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::with_defaults(default_estimate_options(), DEFAULT_TICKET_PREFIX.to_string())
    }
}

impl RoomSettings {
    /// Settings using the configured deck and ticket prefix.
    pub fn with_defaults(estimate_options: Vec<String>, ticket_prefix: String) -> Self {
        Self {
            estimate_options,
            voting_criteria: Vec::new(),
            show_timer: true,
            show_user_presence: true,
            show_average: true,
            show_median: false,
            anonymous_votes: false,
            hide_participant_names: false,
            allow_others_to_show_estimates: false,
            allow_others_to_delete_estimates: false,
            allow_others_to_manage_queue: false,
            allow_others_to_control_timer: false,
            enable_ticket_queue: true,
            enable_judge: false,
            enable_structured_voting: false,
            auto_handoff_moderator: false,
            ticket_prefix,
            external_service: ExternalService::None,
        }
    }

    /// Whether ticket vote history must be redacted when read.
    pub fn redacts_voters(&self) -> bool {
        self.anonymous_votes || self.hide_participant_names
    }
}

impl Validate for RoomSettings {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_estimate_options(&self.estimate_options) {
            errors.add("estimate_options", e);
        }
        if let Err(e) = validate_ticket_prefix(&self.ticket_prefix) {
            errors.add("ticket_prefix", e);
        }
        if self.enable_structured_voting && self.voting_criteria.is_empty() {
            errors.add(
                "voting_criteria",
                validator::ValidationError::new("voting_criteria_required"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
