//! Client facing projections of a room. Everything here is derived from a
//! [`Room`] for one viewer and never written back.

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{
    queue::{ANONYMOUS_VOTER, TicketQueueItem, redact_ticket},
    room::{JudgeState, Room, RoomStatus, RoundRecord, StrudelState, StructuredVote},
    settings::RoomSettings,
    timer::TimerState,
};

/// Presence entry of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub connected: bool,
    pub is_spectator: bool,
    pub is_moderator: bool,
    pub has_voted: bool,
}

/// One vote as a given viewer may see it.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    pub user: String,
    /// Hidden (`None`) until reveal, except for the viewer's own vote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_vote: Option<StructuredVote>,
}

/// Timer state plus values derived at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    #[serde(flatten)]
    pub state: TimerState,
    pub elapsed_seconds: u64,
    pub round_seconds: u64,
    pub server_time: i64,
}

impl TimerView {
    /// Project `state` at `now`.
    pub fn at(state: &TimerState, now: i64) -> Self {
        Self {
            state: state.clone(),
            elapsed_seconds: state.elapsed_seconds(now),
            round_seconds: state.round_seconds(now),
            server_time: now,
        }
    }
}

/// Full room state sent on attach and returned by HTTP endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub key: String,
    pub status: RoomStatus,
    pub created_at: i64,
    pub moderator: String,
    pub users: Vec<ParticipantView>,
    pub votes: Vec<VoteView>,
    pub show_votes: bool,
    pub settings: RoomSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeState>,
    pub timer: TimerView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ticket: Option<TicketQueueItem>,
    pub queue: Vec<TicketQueueItem>,
    pub round_history: Vec<RoundRecord>,
    pub strudel: StrudelState,
    pub has_passcode: bool,
}

impl RoomSnapshot {
    /// Build the snapshot `viewer` is allowed to see at `now`.
    pub fn for_viewer(room: &Room, viewer: Option<&str>, now: i64) -> Self {
        let redact = room.settings().redacts_voters();
        Self {
            key: room.key.clone(),
            status: room.status,
            created_at: room.created_at,
            moderator: room.moderator().to_string(),
            users: participant_views(room),
            votes: visible_votes(room, viewer),
            show_votes: room.show_votes(),
            settings: room.settings().clone(),
            judge: room.judge().cloned(),
            timer: TimerView::at(room.timer(), now),
            current_ticket: room.queue.current().map(|t| redact_ticket(t, redact)),
            queue: queue_view(room),
            round_history: room
                .round_history()
                .iter()
                .map(|round| redact_round(round, room.settings().anonymous_votes))
                .collect(),
            strudel: room.strudel().clone(),
            has_passcode: room.passcode().is_some(),
        }
    }
}

/// Presence list in join order.
pub fn participant_views(room: &Room) -> Vec<ParticipantView> {
    room.participants()
        .iter()
        .map(|p| ParticipantView {
            name: p.name.clone(),
            avatar: p.avatar.clone(),
            connected: p.connected,
            is_spectator: p.spectator,
            is_moderator: room.is_moderator(&p.name),
            has_voted: room.votes().contains_key(&p.name)
                || room.structured_votes().contains_key(&p.name),
        })
        .collect()
}

/// Ordered ticket queue with vote history redacted per room settings.
pub fn queue_view(room: &Room) -> Vec<TicketQueueItem> {
    let redact = room.settings().redacts_voters();
    room.queue
        .ordered()
        .iter()
        .map(|ticket| redact_ticket(ticket, redact))
        .collect()
}

/// Single vote as `viewer` may see it.
pub fn vote_view(room: &Room, user: &str, viewer: Option<&str>) -> VoteView {
    let own = viewer.is_some_and(|viewer| viewer.eq_ignore_ascii_case(user));
    let public = room.show_votes() && !room.settings().anonymous_votes;
    let visible = own || public;
    VoteView {
        user: user.to_string(),
        vote: room.votes().get(user).filter(|_| visible).cloned(),
        structured_vote: room
            .structured_votes()
            .get(user)
            .filter(|_| visible)
            .cloned(),
    }
}

/// Every cast vote as `viewer` may see it.
///
/// Once revealed in an anonymous room the values are listed under a
/// placeholder name, sorted by value so order does not leak identity.
pub fn visible_votes(room: &Room, viewer: Option<&str>) -> Vec<VoteView> {
    if room.show_votes() && room.settings().anonymous_votes {
        return revealed_votes(room);
    }
    voters(room)
        .into_iter()
        .map(|user| vote_view(room, &user, viewer))
        .collect()
}

/// Votes broadcast on reveal; identical for every viewer.
pub fn revealed_votes(room: &Room) -> Vec<VoteView> {
    let anonymous = room.settings().anonymous_votes;
    let mut votes = voters(room)
        .into_iter()
        .map(|user| VoteView {
            vote: room.votes().get(&user).cloned(),
            structured_vote: room.structured_votes().get(&user).cloned(),
            user: if anonymous {
                ANONYMOUS_VOTER.to_string()
            } else {
                user
            },
        })
        .collect::<Vec<_>>();
    if anonymous {
        votes.sort_by(|a, b| a.vote.cmp(&b.vote));
    }
    votes
}

fn voters(room: &Room) -> Vec<String> {
    let mut names: Vec<String> = room.votes().keys().cloned().collect();
    for name in room.structured_votes().keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

fn redact_round(round: &RoundRecord, anonymous: bool) -> RoundRecord {
    if !anonymous {
        return round.clone();
    }
    let mut values: Vec<&String> = round.votes.values().collect();
    values.sort();
    let votes: IndexMap<String, String> = values
        .into_iter()
        .enumerate()
        .map(|(index, vote)| (format!("{ANONYMOUS_VOTER} {}", index + 1), vote.clone()))
        .collect();
    RoundRecord {
        votes,
        structured_votes: IndexMap::new(),
        ..round.clone()
    }
}
