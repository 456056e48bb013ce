//! Authoritative in-memory representation of one estimation room.
//!
//! A [`Room`] is only ever mutated by its coordinator. Every mutator either
//! applies completely or returns a [`RoomError`] before touching anything, and
//! the coordinator persists the whole value as one document, so multi-field
//! changes (roster + votes, ticket + votes) commit together.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    credentials::PasscodeHash,
    state::{
        queue::TicketQueue,
        sessions::SessionRegistry,
        settings::RoomSettings,
        timer::{TimerConfig, TimerState},
    },
};

/// Lifecycle of a room. Rooms are never deleted, only completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Accepting votes and commands.
    #[default]
    Active,
    /// Closed by the moderator; only leave and logout are accepted.
    Completed,
}

/// Member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Canonical casing: whichever spelling was used first.
    pub name: String,
    /// Avatar identifier picked by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Whether a live connection is attached.
    pub connected: bool,
    /// Spectators watch but never vote.
    pub spectator: bool,
    /// Join order, strictly increasing per room.
    pub ordinal: u32,
    /// Unix milliseconds of the first join.
    pub joined_at: i64,
}

/// Multi-criterion vote payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredVote {
    /// Score per criterion name.
    pub criteria_scores: IndexMap<String, f64>,
    /// Story points derived by the client, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_story_points: Option<String>,
}

/// Confidence attached to a judge recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JudgeConfidence {
    /// Votes agree.
    High,
    /// Votes are close but not unanimous.
    Medium,
    /// Votes are far apart.
    Low,
}

/// Details explaining how a recommendation was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeMetadata {
    /// Name of the judge that produced the recommendation.
    pub algorithm: String,
    /// Votes that could be interpreted numerically.
    pub numeric_votes: usize,
    /// Every vote cast, numeric or not.
    pub total_votes: usize,
    /// Distance between the highest and lowest numeric vote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
    /// Set when the spread is too wide to settle without talking.
    pub needs_discussion: bool,
}

/// Recommendation computed after votes are revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeState {
    /// Recommended value from the room deck, if one could be derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    /// How much the votes agreed.
    pub confidence: JudgeConfidence,
    /// Inputs behind the recommendation.
    pub metadata: JudgeMetadata,
    /// Unix milliseconds.
    pub computed_at: i64,
}

/// Live-coding music state shared by the room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrudelState {
    /// Last generated pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Prompt of the last generation request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<i64>,
    /// A generation is in flight.
    pub is_generating: bool,
    /// Clients should be playing `code`.
    pub is_playing: bool,
}

/// One finished estimation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    /// Random id of the round.
    pub id: Uuid,
    /// Ticket estimated in the round, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    /// Scalar votes by participant.
    pub votes: IndexMap<String, String>,
    /// Structured votes by participant.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub structured_votes: IndexMap<String, StructuredVote>,
    /// Judge recommendation at the end of the round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_score: Option<String>,
    /// Unix milliseconds.
    pub ended_at: i64,
}

/// Roster entry used by batch replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Participant name; matched case-insensitively against the current roster.
    pub name: String,
    /// Avatar; the current one is kept when absent.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Spectator flag.
    #[serde(default)]
    pub spectator: bool,
}

/// Full replacement of the roster and current-round votes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    /// New roster; must not be empty.
    pub users: Vec<RosterEntry>,
    /// Scalar votes of roster members.
    #[serde(default)]
    pub votes: IndexMap<String, String>,
    /// Structured votes of roster members.
    #[serde(default)]
    pub structured_votes: IndexMap<String, StructuredVote>,
    /// New moderator; the current one is kept when still on the roster.
    #[serde(default)]
    pub moderator: Option<String>,
    /// New reveal flag; unchanged when absent.
    #[serde(default)]
    pub show_votes: Option<bool>,
}

/// Rejections raised by room mutators. Nothing is changed when one is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    /// Name is not on the roster.
    #[error("`{0}` is not a participant of this room")]
    UnknownParticipant(String),
    /// Spectators cannot vote.
    #[error("spectator `{0}` cannot vote")]
    Spectator(String),
    /// Vote outside the deck.
    #[error("`{0}` is not one of the room's estimate options")]
    InvalidVote(String),
    /// Unknown criterion or out of range score.
    #[error("invalid structured vote: {0}")]
    InvalidStructuredVote(String),
    /// Batch replacement rejected.
    #[error("invalid room data: {0}")]
    InvalidData(String),
}

/// Persisted state of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room key.
    pub key: String,
    /// Lifecycle state.
    pub status: RoomStatus,
    /// Unix milliseconds.
    pub created_at: i64,
    participants: Vec<Participant>,
    votes: IndexMap<String, String>,
    structured_votes: IndexMap<String, StructuredVote>,
    show_votes: bool,
    moderator: String,
    settings: RoomSettings,
    judge: Option<JudgeState>,
    passcode: Option<PasscodeHash>,
    /// Session tokens; never serialized to clients, only to storage.
    pub sessions: SessionRegistry,
    round_history: Vec<RoundRecord>,
    timer: TimerState,
    /// Ticket backlog of the room.
    pub queue: TicketQueue,
    strudel: StrudelState,
    next_ordinal: u32,
}

impl Room {
    /// Create a room whose only participant is its moderator.
    pub fn new(key: String, moderator: &str, settings: RoomSettings, now: i64) -> Self {
        let mut room = Self {
            key,
            status: RoomStatus::Active,
            created_at: now,
            participants: Vec::new(),
            votes: IndexMap::new(),
            structured_votes: IndexMap::new(),
            show_votes: false,
            moderator: String::new(),
            settings,
            judge: None,
            passcode: None,
            sessions: SessionRegistry::default(),
            round_history: Vec::new(),
            timer: TimerState::default(),
            queue: TicketQueue::default(),
            strudel: StrudelState::default(),
            next_ordinal: 0,
        };
        room.moderator = room.ensure_user(moderator, now);
        room
    }

    // ---- participants ----

    /// Participants in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Case-insensitive participant lookup.
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        let name = name.trim();
        self.participants
            .iter()
            .find(|p| p.name.to_lowercase() == name.to_lowercase())
    }

    fn participant_mut(&mut self, name: &str) -> Result<&mut Participant, RoomError> {
        let folded = name.trim().to_lowercase();
        self.participants
            .iter_mut()
            .find(|p| p.name.to_lowercase() == folded)
            .ok_or_else(|| RoomError::UnknownParticipant(name.to_string()))
    }

    /// Canonical spelling of `name`, if it belongs to the room.
    pub fn canonical_name(&self, name: &str) -> Option<String> {
        self.participant(name).map(|p| p.name.clone())
    }

    /// Return the canonical name for `name`, adding the participant when unknown.
    pub fn ensure_user(&mut self, name: &str, now: i64) -> String {
        if let Some(existing) = self.canonical_name(name) {
            return existing;
        }
        let name = name.trim().to_string();
        self.participants.push(Participant {
            name: name.clone(),
            avatar: None,
            connected: false,
            spectator: false,
            ordinal: self.next_ordinal,
            joined_at: now,
        });
        self.next_ordinal += 1;
        name
    }

    /// Set the connection flag of a participant.
    pub fn set_user_connection(&mut self, name: &str, connected: bool) -> Result<(), RoomError> {
        self.participant_mut(name)?.connected = connected;
        Ok(())
    }

    /// Replace a participant's avatar.
    pub fn set_user_avatar(&mut self, name: &str, avatar: Option<String>) -> Result<(), RoomError> {
        self.participant_mut(name)?.avatar = avatar;
        Ok(())
    }

    /// Toggle spectator mode. Becoming a spectator discards the current vote.
    pub fn set_spectator(&mut self, name: &str, spectator: bool) -> Result<String, RoomError> {
        let participant = self.participant_mut(name)?;
        participant.spectator = spectator;
        let canonical = participant.name.clone();
        if spectator {
            self.votes.shift_remove(&canonical);
            self.structured_votes.shift_remove(&canonical);
        }
        Ok(canonical)
    }

    /// Remove a participant with their votes and session.
    pub fn remove_user(&mut self, name: &str) -> Result<Participant, RoomError> {
        let folded = name.trim().to_lowercase();
        let index = self
            .participants
            .iter()
            .position(|p| p.name.to_lowercase() == folded)
            .ok_or_else(|| RoomError::UnknownParticipant(name.to_string()))?;
        let removed = self.participants.remove(index);
        self.votes.shift_remove(&removed.name);
        self.structured_votes.shift_remove(&removed.name);
        self.sessions.revoke(&removed.name);
        Ok(removed)
    }

    // ---- moderator ----

    /// Canonical name of the moderator.
    pub fn moderator(&self) -> &str {
        &self.moderator
    }

    /// Case-insensitive moderator check.
    pub fn is_moderator(&self, name: &str) -> bool {
        self.moderator.to_lowercase() == name.trim().to_lowercase()
    }

    /// Hand the role to an existing participant; returns the canonical name.
    pub fn set_moderator(&mut self, name: &str) -> Result<String, RoomError> {
        let canonical = self
            .canonical_name(name)
            .ok_or_else(|| RoomError::UnknownParticipant(name.to_string()))?;
        self.moderator = canonical.clone();
        Ok(canonical)
    }

    /// Earliest connected non-spectator other than the current moderator.
    pub fn handoff_candidate(&self) -> Option<String> {
        self.participants
            .iter()
            .filter(|p| p.connected && !p.spectator && !self.is_moderator(&p.name))
            .min_by_key(|p| p.ordinal)
            .map(|p| p.name.clone())
    }

    /// Successor when the moderator leaves: connected participants first, then anyone.
    pub fn successor_candidate(&self) -> Option<String> {
        self.handoff_candidate().or_else(|| {
            self.participants
                .iter()
                .filter(|p| !self.is_moderator(&p.name))
                .min_by_key(|p| p.ordinal)
                .map(|p| p.name.clone())
        })
    }

    // ---- votes ----

    /// Whether votes are revealed.
    pub fn show_votes(&self) -> bool {
        self.show_votes
    }

    /// Reveal or hide the current votes.
    pub fn set_show_votes(&mut self, show: bool) {
        self.show_votes = show;
    }

    /// Scalar votes of the current round, keyed by canonical name.
    pub fn votes(&self) -> &IndexMap<String, String> {
        &self.votes
    }

    /// Record a scalar vote for a non-spectator participant.
    pub fn set_vote(&mut self, name: &str, value: &str) -> Result<String, RoomError> {
        let participant = self
            .participant(name)
            .ok_or_else(|| RoomError::UnknownParticipant(name.to_string()))?;
        if participant.spectator {
            return Err(RoomError::Spectator(participant.name.clone()));
        }
        if !self.settings.estimate_options.iter().any(|o| o == value) {
            return Err(RoomError::InvalidVote(value.to_string()));
        }
        let canonical = participant.name.clone();
        self.votes.insert(canonical.clone(), value.to_string());
        Ok(canonical)
    }

    /// Withdraw a scalar vote. Returns whether one existed.
    pub fn delete_user_vote(&mut self, name: &str) -> bool {
        match self.canonical_name(name) {
            Some(canonical) => self.votes.shift_remove(&canonical).is_some(),
            None => false,
        }
    }

    /// Structured votes of the current round, keyed by canonical name.
    pub fn structured_votes(&self) -> &IndexMap<String, StructuredVote> {
        &self.structured_votes
    }

    /// Record a structured vote. Criteria must belong to the room's configured set.
    pub fn set_structured_vote(
        &mut self,
        name: &str,
        vote: StructuredVote,
    ) -> Result<String, RoomError> {
        let participant = self
            .participant(name)
            .ok_or_else(|| RoomError::UnknownParticipant(name.to_string()))?;
        if participant.spectator {
            return Err(RoomError::Spectator(participant.name.clone()));
        }
        if let Some((criterion, _)) = vote
            .criteria_scores
            .iter()
            .find(|(criterion, _)| !self.settings.voting_criteria.contains(criterion))
        {
            return Err(RoomError::InvalidStructuredVote(format!(
                "unknown criterion `{criterion}`"
            )));
        }
        if vote
            .criteria_scores
            .values()
            .any(|score| !score.is_finite() || *score < 0.0)
        {
            return Err(RoomError::InvalidStructuredVote(
                "scores must be finite and non-negative".into(),
            ));
        }
        let canonical = participant.name.clone();
        self.structured_votes.insert(canonical.clone(), vote);
        Ok(canonical)
    }

    /// Whether any scalar or structured vote has been cast this round.
    pub fn has_votes(&self) -> bool {
        !self.votes.is_empty() || !self.structured_votes.is_empty()
    }

    // ---- judge / settings / passcode ----

    /// Latest recommendation, cleared on every new round.
    pub fn judge(&self) -> Option<&JudgeState> {
        self.judge.as_ref()
    }

    /// Store or clear the recommendation.
    pub fn set_judge_state(&mut self, judge: Option<JudgeState>) {
        self.judge = judge;
    }

    /// Current room settings.
    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// Replace settings. Votes no longer in the deck are discarded.
    pub fn set_settings(&mut self, settings: RoomSettings) {
        self.votes
            .retain(|_, vote| settings.estimate_options.contains(vote));
        if !settings.enable_structured_voting {
            self.structured_votes.clear();
        }
        self.settings = settings;
    }

    /// Stored passcode hash, if the room is protected.
    pub fn passcode(&self) -> Option<&PasscodeHash> {
        self.passcode.as_ref()
    }

    /// Protect the room with `passcode`, or open it with `None`.
    pub fn set_passcode(&mut self, passcode: Option<PasscodeHash>) {
        self.passcode = passcode;
    }

    // ---- timer ----

    /// Shared round timer.
    pub fn timer(&self) -> &TimerState {
        &self.timer
    }

    /// Start the timer. Returns `false` when it was already running.
    pub fn start_timer(&mut self, now: i64) -> bool {
        self.timer.start(now)
    }

    /// Pause the timer. Returns `false` when it was not running.
    pub fn pause_timer(&mut self, now: i64) -> bool {
        self.timer.pause(now)
    }

    /// Stop the timer and zero it.
    pub fn reset_timer(&mut self) {
        self.timer.reset();
    }

    /// Apply timer configuration changes.
    pub fn update_timer_config(&mut self, config: &TimerConfig) {
        self.timer.configure(config);
    }

    /// Re-anchor the round timer if the room asks for it. Returns whether it did.
    pub fn anchor_timer_round(&mut self, now: i64) -> bool {
        if !self.timer.auto_reset_on_votes_reset {
            return false;
        }
        self.timer.anchor_round(now);
        true
    }

    // ---- strudel ----

    /// Live-coding music state.
    pub fn strudel(&self) -> &StrudelState {
        &self.strudel
    }

    /// Mark a generation as started for `prompt`.
    pub fn set_strudel_generating(&mut self, prompt: Option<String>) {
        self.strudel.is_generating = true;
        self.strudel.prompt = prompt;
    }

    /// Store generated code and end the generation.
    pub fn set_strudel_code(&mut self, code: String, now: i64) {
        self.strudel.code = Some(code);
        self.strudel.generated_at = Some(now);
        self.strudel.is_generating = false;
    }

    /// End a generation that produced nothing.
    pub fn set_strudel_failed(&mut self) {
        self.strudel.is_generating = false;
    }

    /// Start or stop playback on clients.
    pub fn set_strudel_playing(&mut self, playing: bool) {
        self.strudel.is_playing = playing;
    }

    // ---- rounds ----

    /// Finished rounds, oldest first.
    pub fn round_history(&self) -> &[RoundRecord] {
        &self.round_history
    }

    /// Append the current round to the history, keeping at most `limit` entries.
    pub fn record_round(&mut self, ticket_id: Option<String>, now: i64, limit: usize) {
        self.round_history.push(RoundRecord {
            id: Uuid::new_v4(),
            ticket_id,
            votes: self.votes.clone(),
            structured_votes: self.structured_votes.clone(),
            judge_score: self.judge.as_ref().and_then(|j| j.score.clone()),
            ended_at: now,
        });
        if self.round_history.len() > limit {
            let excess = self.round_history.len() - limit;
            self.round_history.drain(..excess);
        }
    }

    /// Start a fresh round: no votes, hidden, no recommendation.
    pub fn clear_round(&mut self) {
        self.votes.clear();
        self.structured_votes.clear();
        self.show_votes = false;
        self.judge = None;
    }

    // ---- batch ----

    /// Replace roster and votes in one step, keeping connection flags of known names.
    pub fn replace_data(&mut self, data: RoomData, now: i64) -> Result<(), RoomError> {
        if data.users.is_empty() {
            return Err(RoomError::InvalidData("at least one user is required".into()));
        }

        let mut participants: Vec<Participant> = Vec::with_capacity(data.users.len());
        let mut next_ordinal = self.next_ordinal;
        for entry in &data.users {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(RoomError::InvalidData("user names cannot be empty".into()));
            }
            if participants
                .iter()
                .any(|p| p.name.to_lowercase() == name.to_lowercase())
            {
                return Err(RoomError::InvalidData(format!("duplicate user `{name}`")));
            }
            let previous = self.participant(name);
            participants.push(Participant {
                name: previous.map_or_else(|| name.to_string(), |p| p.name.clone()),
                avatar: entry
                    .avatar
                    .clone()
                    .or_else(|| previous.and_then(|p| p.avatar.clone())),
                connected: previous.is_some_and(|p| p.connected),
                spectator: entry.spectator,
                ordinal: previous.map_or_else(
                    || {
                        next_ordinal += 1;
                        next_ordinal - 1
                    },
                    |p| p.ordinal,
                ),
                joined_at: previous.map_or(now, |p| p.joined_at),
            });
        }
        participants.sort_by_key(|p| p.ordinal);

        let resolve = |name: &str| -> Result<String, RoomError> {
            participants
                .iter()
                .find(|p| p.name.to_lowercase() == name.trim().to_lowercase())
                .map(|p| p.name.clone())
                .ok_or_else(|| RoomError::InvalidData(format!("vote from unknown user `{name}`")))
        };

        let resolve_voter = |name: &str| -> Result<String, RoomError> {
            let canonical = resolve(name)?;
            if participants
                .iter()
                .any(|p| p.name == canonical && p.spectator)
            {
                return Err(RoomError::InvalidData(format!(
                    "spectator `{canonical}` cannot hold a vote"
                )));
            }
            Ok(canonical)
        };

        let mut votes = IndexMap::new();
        for (name, value) in &data.votes {
            if !self.settings.estimate_options.contains(value) {
                return Err(RoomError::InvalidVote(value.clone()));
            }
            votes.insert(resolve_voter(name)?, value.clone());
        }
        let mut structured_votes = IndexMap::new();
        for (name, vote) in &data.structured_votes {
            structured_votes.insert(resolve_voter(name)?, vote.clone());
        }

        let moderator = match data.moderator.as_deref() {
            Some(name) => resolve(name)?,
            None => resolve(&self.moderator).unwrap_or_else(|_| participants[0].name.clone()),
        };

        self.participants = participants;
        self.next_ordinal = next_ordinal;
        self.votes = votes;
        self.structured_votes = structured_votes;
        self.moderator = moderator;
        if let Some(show) = data.show_votes {
            self.show_votes = show;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn room() -> Room {
        Room::new("R1".into(), "Alice", RoomSettings::default(), NOW)
    }

    #[test]
    fn ensure_user_is_case_insensitive_and_keeps_first_casing() {
        let mut room = room();
        for spelling in ["bob", "BOB", "Bob", " bOb "] {
            assert_eq!(room.ensure_user(spelling, NOW), "bob");
        }
        let bobs = room
            .participants()
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case("bob"))
            .count();
        assert_eq!(bobs, 1);
        assert_eq!(room.participants().len(), 2);
    }

    #[test]
    fn ordinals_follow_join_order() {
        let mut room = room();
        room.ensure_user("Bob", NOW);
        room.ensure_user("Carol", NOW);
        let ordinals = room
            .participants()
            .iter()
            .map(|p| (p.name.as_str(), p.ordinal))
            .collect::<Vec<_>>();
        assert_eq!(ordinals, vec![("Alice", 0), ("Bob", 1), ("Carol", 2)]);
    }

    #[test]
    fn moderator_is_member() {
        let mut room = room();
        assert!(room.is_moderator("alice"));
        assert_eq!(
            room.set_moderator("Zed"),
            Err(RoomError::UnknownParticipant("Zed".into()))
        );
        room.ensure_user("Bob", NOW);
        assert_eq!(room.set_moderator("BOB").unwrap(), "Bob");
        assert_eq!(room.moderator(), "Bob");
    }

    #[test]
    fn votes_are_keyed_by_canonical_name() {
        let mut room = room();
        room.ensure_user("Bob", NOW);
        assert_eq!(room.set_vote("bob", "5").unwrap(), "Bob");
        assert_eq!(room.votes().get("Bob").map(String::as_str), Some("5"));
        assert_eq!(
            room.set_vote("Bob", "4"),
            Err(RoomError::InvalidVote("4".into()))
        );
        assert!(room.delete_user_vote("BOB"));
        assert!(!room.has_votes());
    }

    #[test]
    fn spectators_cannot_vote_and_lose_their_vote() {
        let mut room = room();
        room.ensure_user("Bob", NOW);
        room.set_vote("Bob", "3").unwrap();
        room.set_spectator("bob", true).unwrap();
        assert!(room.votes().is_empty());
        assert_eq!(room.set_vote("Bob", "3"), Err(RoomError::Spectator("Bob".into())));
    }

    #[test]
    fn structured_vote_criteria_are_checked() {
        let mut settings = RoomSettings::default();
        settings.enable_structured_voting = true;
        settings.voting_criteria = vec!["complexity".into()];
        let mut room = Room::new("R1".into(), "Alice", settings, NOW);

        let mut vote = StructuredVote::default();
        vote.criteria_scores.insert("complexity".into(), 3.0);
        assert!(room.set_structured_vote("Alice", vote.clone()).is_ok());

        vote.criteria_scores.insert("risk".into(), 1.0);
        assert!(matches!(
            room.set_structured_vote("Alice", vote),
            Err(RoomError::InvalidStructuredVote(_))
        ));
        assert_eq!(room.structured_votes().len(), 1);
    }

    #[test]
    fn remove_user_drops_votes_and_session() {
        let mut room = room();
        room.ensure_user("Bob", NOW);
        room.set_vote("Bob", "8").unwrap();
        room.sessions.insert("Bob", "tok".into(), NOW);

        let removed = room.remove_user("bob").unwrap();
        assert_eq!(removed.name, "Bob");
        assert!(room.votes().is_empty());
        assert!(room.sessions.get("bob").is_none());
        assert!(room.participant("Bob").is_none());
    }

    #[test]
    fn handoff_prefers_earliest_connected_voter() {
        let mut room = room();
        for name in ["Bob", "Carol", "Dave"] {
            room.ensure_user(name, NOW);
        }
        assert_eq!(room.handoff_candidate(), None);
        assert_eq!(room.successor_candidate().as_deref(), Some("Bob"));

        room.set_user_connection("Carol", true).unwrap();
        room.set_user_connection("Dave", true).unwrap();
        room.set_spectator("Carol", true).unwrap();
        assert_eq!(room.handoff_candidate().as_deref(), Some("Dave"));
    }

    #[test]
    fn round_history_is_capped() {
        let mut room = room();
        for round in 0..5 {
            room.set_vote("Alice", "3").unwrap();
            room.record_round(Some(format!("T-{round}")), NOW + round, 3);
            room.clear_round();
        }
        let ids = room
            .round_history()
            .iter()
            .map(|r| r.ticket_id.clone().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["T-2", "T-3", "T-4"]);
    }

    #[test]
    fn settings_change_discards_votes_outside_the_deck() {
        let mut room = room();
        room.set_vote("Alice", "13").unwrap();
        let mut settings = room.settings().clone();
        settings.estimate_options = vec!["S".into(), "M".into(), "L".into()];
        room.set_settings(settings);
        assert!(room.votes().is_empty());
    }

    #[test]
    fn replace_data_is_all_or_nothing() {
        let mut room = room();
        room.set_user_connection("Alice", true).unwrap();
        let before = room.clone();

        let bad = RoomData {
            users: vec![RosterEntry {
                name: "alice".into(),
                avatar: None,
                spectator: false,
            }],
            votes: IndexMap::from([("Mallory".to_string(), "5".to_string())]),
            ..RoomData::default()
        };
        assert!(room.replace_data(bad, NOW).is_err());
        assert_eq!(room, before);

        let good = RoomData {
            users: vec![
                RosterEntry {
                    name: "ALICE".into(),
                    avatar: None,
                    spectator: false,
                },
                RosterEntry {
                    name: "Bob".into(),
                    avatar: Some("fox".into()),
                    spectator: false,
                },
            ],
            votes: IndexMap::from([
                ("alice".to_string(), "3".to_string()),
                ("bob".to_string(), "5".to_string()),
            ]),
            moderator: Some("bob".into()),
            ..RoomData::default()
        };
        room.replace_data(good, NOW).unwrap();
        assert_eq!(room.participants().len(), 2);
        assert_eq!(room.participants()[0].name, "Alice");
        assert!(room.participants()[0].connected);
        assert_eq!(room.votes().get("Bob").map(String::as_str), Some("5"));
        assert_eq!(room.moderator(), "Bob");
    }

    #[test]
    fn replace_data_rejects_spectator_votes() {
        let mut room = room();
        let before = room.clone();
        let roster = vec![
            RosterEntry {
                name: "Alice".into(),
                avatar: None,
                spectator: false,
            },
            RosterEntry {
                name: "Carol".into(),
                avatar: None,
                spectator: true,
            },
        ];

        let scalar = RoomData {
            users: roster.clone(),
            votes: IndexMap::from([("carol".to_string(), "5".to_string())]),
            ..RoomData::default()
        };
        assert!(matches!(
            room.replace_data(scalar, NOW),
            Err(RoomError::InvalidData(_))
        ));

        let structured = RoomData {
            users: roster,
            structured_votes: IndexMap::from([("Carol".to_string(), StructuredVote::default())]),
            ..RoomData::default()
        };
        assert!(matches!(
            room.replace_data(structured, NOW),
            Err(RoomError::InvalidData(_))
        ));
        assert_eq!(room, before);
    }
}
