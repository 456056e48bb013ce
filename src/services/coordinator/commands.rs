//! Pure application of commands to a room.
//!
//! Nothing here touches storage or sockets: the actor applies a command to a
//! copy of the room, persists the copy, and only then publishes what
//! [`Applied`] describes.

use crate::{
    dto::{
        events::{DisconnectReason, ServerEvent},
        requests::ExternalTicket,
        room::{TimerView, queue_view, revealed_votes},
        ws::{ClientCommand, TicketDraft},
    },
    error::ServiceError,
    services::judge::VoteJudge,
    state::{
        queue::{NewTicket, QueueError, TicketQueueItem, TicketStatus, TicketVote, redact_ticket},
        room::{Room, RoomStatus},
    },
};

use super::{broadcast::Outgoing, messages::RoomCommand};

/// Inputs a command needs besides the room itself.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    /// Unix milliseconds used for every timestamp the command writes.
    pub now: i64,
    /// Rounds kept in the history before the oldest is dropped.
    pub round_history_limit: usize,
    /// Whether a strudel generator is configured.
    pub generator_available: bool,
}

/// Mutation queued behind the one that produced it, applied and persisted on
/// its own.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    /// Compute the recommendation for the revealed votes.
    Judge,
    /// Re-anchor the round timer after votes were cleared.
    AnchorTimer,
    /// Move the moderator role off a disconnected moderator.
    Handoff,
    /// Publish the moderator elected by a previous mutation.
    AnnounceModerator,
    /// Outcome of an external strudel generation.
    StrudelResult(Result<String, String>),
}

/// Side effect executed by the actor once the mutation is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start an external strudel generation.
    GenerateStrudel {
        /// Free-form prompt.
        prompt: Option<String>,
        /// Musical style hint.
        style: Option<String>,
    },
    /// Close a participant's connection.
    Close {
        /// Canonical participant name.
        name: String,
        /// Reason sent before the close frame.
        reason: DisconnectReason,
    },
}

/// What a successful mutation produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Applied {
    /// Event to publish, if any.
    pub event: Option<Outgoing>,
    /// Mutations to apply after this one commits.
    pub follow_ups: Vec<FollowUp>,
    /// Side effects run after publishing.
    pub effects: Vec<Effect>,
}

impl Applied {
    fn everyone(event: ServerEvent) -> Self {
        Self::outgoing(Outgoing::Everyone(event))
    }

    fn outgoing(event: Outgoing) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }

    fn then(mut self, follow_up: FollowUp) -> Self {
        self.follow_ups.push(follow_up);
        self
    }
}

/// Apply `command` issued by the participant `actor` (canonical name).
pub fn apply_command(
    room: &mut Room,
    actor: &str,
    command: RoomCommand,
    ctx: &CommandContext,
) -> Result<Applied, ServiceError> {
    if room.status == RoomStatus::Completed
        && !matches!(command, RoomCommand::Leave | RoomCommand::Logout)
    {
        return Err(ServiceError::Conflict("room session is completed".into()));
    }

    match command {
        RoomCommand::Client(command) => apply_client(room, actor, command, ctx),
        RoomCommand::SetPasscode(passcode) => {
            require_moderator(room, actor, "change the passcode")?;
            room.set_passcode(passcode);
            Ok(Applied::default())
        }
        RoomCommand::ReplaceData(data) => {
            require_moderator(room, actor, "replace room data")?;
            room.replace_data(data, ctx.now)?;
            Ok(Applied::outgoing(Outgoing::Snapshot))
        }
        RoomCommand::ImportQueue(tickets) => {
            require_queue(room, actor)?;
            import_queue(room, tickets, ctx.now)?;
            Ok(Applied::everyone(ServerEvent::QueueUpdated {
                queue: queue_view(room),
            }))
        }
        RoomCommand::Leave => leave(room, actor),
        RoomCommand::Logout => {
            room.sessions.revoke(actor);
            room.set_user_connection(actor, false)?;
            let mut applied = Applied::everyone(ServerEvent::UserConnectionStatus {
                user: actor.to_string(),
                connected: false,
            });
            applied.effects.push(Effect::Close {
                name: actor.to_string(),
                reason: DisconnectReason::Auth,
            });
            if room.is_moderator(actor) {
                applied.follow_ups.push(FollowUp::Handoff);
            }
            Ok(applied)
        }
    }
}

fn apply_client(
    room: &mut Room,
    actor: &str,
    command: ClientCommand,
    ctx: &CommandContext,
) -> Result<Applied, ServiceError> {
    let now = ctx.now;
    match command {
        ClientCommand::Vote {
            vote,
            structured_vote,
        } => {
            let user = room.set_vote(actor, &vote)?;
            if let Some(structured) = structured_vote {
                if room.settings().enable_structured_voting {
                    room.set_structured_vote(&user, structured)?;
                }
            }
            let applied = Applied::outgoing(Outgoing::Vote { user });
            Ok(if room.show_votes() && room.settings().enable_judge {
                applied.then(FollowUp::Judge)
            } else {
                applied
            })
        }
        ClientCommand::ShowVotes => {
            let delegated = room.settings().allow_others_to_show_estimates;
            require(room, actor, delegated, "reveal votes")?;
            let show = !room.show_votes();
            room.set_show_votes(show);
            let votes = if show { revealed_votes(room) } else { Vec::new() };
            let applied = Applied::everyone(ServerEvent::ShowVotes {
                show_votes: show,
                votes,
            });
            Ok(if show && room.settings().enable_judge {
                applied.then(FollowUp::Judge)
            } else {
                applied
            })
        }
        ClientCommand::ResetVotes => {
            let delegated = room.settings().allow_others_to_delete_estimates;
            require(room, actor, delegated, "reset votes")?;
            if room.has_votes() {
                let ticket_id = current_ticket_id(room);
                room.record_round(ticket_id, now, ctx.round_history_limit);
            }
            room.clear_round();
            let applied = Applied::everyone(ServerEvent::ResetVotes {
                timer: TimerView::at(room.timer(), now),
            });
            Ok(with_anchor(room, applied))
        }
        ClientCommand::UpdateSettings { settings } => {
            require_moderator(room, actor, "change settings")?;
            room.set_settings(settings);
            Ok(Applied::everyone(ServerEvent::SettingsUpdated {
                settings: room.settings().clone(),
            }))
        }
        ClientCommand::SelectTicket { ticket_id } => {
            require_queue(room, actor)?;
            let already_current = room.queue.current().is_some_and(|t| t.id == ticket_id);
            if !already_current {
                if room.has_votes() {
                    let previous = current_ticket_id(room);
                    room.record_round(previous, now, ctx.round_history_limit);
                }
                room.clear_round();
            }
            let ticket = room.queue.select(ticket_id, now)?;
            let redact = room.settings().redacts_voters();
            Ok(Applied::everyone(ServerEvent::NextTicket {
                ticket: Some(redact_ticket(&ticket, redact)),
                queue: queue_view(room),
            }))
        }
        ClientCommand::NextTicket => {
            require_queue(room, actor)?;
            let votes: Vec<TicketVote> = room
                .votes()
                .iter()
                .map(|(user, vote)| TicketVote {
                    user_name: user.clone(),
                    vote: vote.clone(),
                    structured_vote: room.structured_votes().get(user).cloned(),
                    voted_at: now,
                })
                .collect();
            let finished = current_ticket_id(room);
            if finished.is_some() || room.has_votes() {
                room.record_round(finished, now, ctx.round_history_limit);
            }
            let advance = room.queue.advance(votes, now);
            room.clear_round();
            let redact = room.settings().redacts_voters();
            let applied = Applied::everyone(ServerEvent::NextTicket {
                ticket: advance.current.map(|t| redact_ticket(&t, redact)),
                queue: queue_view(room),
            });
            Ok(with_anchor(room, applied))
        }
        ClientCommand::AddTicket { ticket } => {
            require_queue(room, actor)?;
            let created = add_ticket(room, ticket, now)?;
            let redact = room.settings().redacts_voters();
            Ok(Applied::everyone(ServerEvent::TicketAdded {
                ticket: redact_ticket(&created, redact),
            }))
        }
        ClientCommand::UpdateTicket { ticket_id, updates } => {
            require_queue(room, actor)?;
            let was_completed = room
                .queue
                .get(ticket_id)
                .ok_or(QueueError::NotFound(ticket_id))?
                .status
                == TicketStatus::Completed;
            let updated = room.queue.update_ticket(ticket_id, updates, now)?;
            let ticket = redact_ticket(&updated, room.settings().redacts_voters());
            Ok(Applied::everyone(
                if !was_completed && updated.status == TicketStatus::Completed {
                    ServerEvent::TicketCompleted { ticket }
                } else {
                    ServerEvent::TicketUpdated { ticket }
                },
            ))
        }
        ClientCommand::DeleteTicket { ticket_id } => {
            require_queue(room, actor)?;
            let removed = room.queue.delete_ticket(ticket_id)?;
            Ok(Applied::everyone(ServerEvent::TicketDeleted {
                ticket_id: removed.id,
            }))
        }
        ClientCommand::MoveTicket {
            ticket_id,
            direction,
        } => {
            require_queue(room, actor)?;
            room.queue.move_ticket(ticket_id, direction, now)?;
            Ok(Applied::everyone(ServerEvent::QueueUpdated {
                queue: queue_view(room),
            }))
        }
        ClientCommand::StartTimer => {
            require_timer(room, actor)?;
            room.start_timer(now);
            Ok(Applied::everyone(ServerEvent::TimerStarted {
                timer: TimerView::at(room.timer(), now),
            }))
        }
        ClientCommand::PauseTimer => {
            require_timer(room, actor)?;
            room.pause_timer(now);
            Ok(Applied::everyone(ServerEvent::TimerPaused {
                timer: TimerView::at(room.timer(), now),
            }))
        }
        ClientCommand::ResetTimer => {
            require_timer(room, actor)?;
            room.reset_timer();
            Ok(Applied::everyone(ServerEvent::TimerReset {
                timer: TimerView::at(room.timer(), now),
            }))
        }
        ClientCommand::ConfigureTimer { config } => {
            require_timer(room, actor)?;
            room.update_timer_config(&config);
            Ok(Applied::everyone(ServerEvent::TimerUpdated {
                timer: TimerView::at(room.timer(), now),
            }))
        }
        ClientCommand::ToggleSpectator { is_spectator } => {
            let user = room.set_spectator(actor, is_spectator)?;
            Ok(Applied::everyone(ServerEvent::SpectatorStatusChanged {
                user,
                is_spectator,
            }))
        }
        ClientCommand::TransferModerator { to } => {
            let target = room
                .canonical_name(&to)
                .ok_or_else(|| ServiceError::NotFound(format!("participant `{to}`")))?;
            if !room.is_moderator(actor) {
                let moderator_connected = room
                    .participant(room.moderator())
                    .is_some_and(|p| p.connected);
                if moderator_connected || !target.eq_ignore_ascii_case(actor) {
                    return Err(ServiceError::Permission(
                        "only the moderator can transfer the role".into(),
                    ));
                }
            }
            let moderator = room.set_moderator(&target)?;
            Ok(Applied::everyone(ServerEvent::NewModerator { moderator }))
        }
        ClientCommand::CompleteSession => {
            require_moderator(room, actor, "complete the session")?;
            room.status = RoomStatus::Completed;
            room.pause_timer(now);
            Ok(Applied::everyone(ServerEvent::SessionCompleted {
                completed_at: now,
            }))
        }
        ClientCommand::Ping => Ok(Applied::default()),
        ClientCommand::GenerateStrudelCode { prompt, style } => {
            require_moderator(room, actor, "generate music")?;
            if !ctx.generator_available {
                return Err(ServiceError::Validation(
                    "strudel generation is not configured".into(),
                ));
            }
            if room.strudel().is_generating {
                return Err(ServiceError::Conflict(
                    "strudel generation already in progress".into(),
                ));
            }
            room.set_strudel_generating(prompt.clone());
            let mut applied = Applied::everyone(ServerEvent::StrudelGenerationStarted {
                requested_by: actor.to_string(),
                prompt: prompt.clone(),
            });
            applied
                .effects
                .push(Effect::GenerateStrudel { prompt, style });
            Ok(applied)
        }
        ClientCommand::ToggleStrudelPlayback { is_playing } => {
            require_moderator(room, actor, "control playback")?;
            room.set_strudel_playing(is_playing);
            Ok(Applied::everyone(ServerEvent::StrudelPlaybackToggled {
                is_playing,
            }))
        }
    }
}

/// Apply a queued follow-up. `None` means there is nothing left to do.
pub fn apply_follow_up(
    room: &mut Room,
    follow_up: FollowUp,
    judge: &dyn VoteJudge,
    now: i64,
) -> Option<Applied> {
    match follow_up {
        FollowUp::Judge => {
            if !room.show_votes() || !room.settings().enable_judge {
                return None;
            }
            let state = judge.evaluate(room.votes(), &room.settings().estimate_options, now);
            room.set_judge_state(Some(state));
            Some(Applied::everyone(ServerEvent::JudgeScoreUpdated {
                judge: room.judge().cloned(),
            }))
        }
        FollowUp::AnchorTimer => room.anchor_timer_round(now).then(|| {
            Applied::everyone(ServerEvent::TimerUpdated {
                timer: TimerView::at(room.timer(), now),
            })
        }),
        FollowUp::Handoff => {
            if !room.settings().auto_handoff_moderator {
                return None;
            }
            if room
                .participant(room.moderator())
                .is_some_and(|p| p.connected)
            {
                return None;
            }
            let next = room.handoff_candidate()?;
            let moderator = room.set_moderator(&next).ok()?;
            Some(Applied::everyone(ServerEvent::NewModerator { moderator }))
        }
        FollowUp::AnnounceModerator => Some(Applied::everyone(ServerEvent::NewModerator {
            moderator: room.moderator().to_string(),
        })),
        FollowUp::StrudelResult(Ok(code)) => {
            room.set_strudel_code(code.clone(), now);
            Some(Applied::everyone(ServerEvent::StrudelCodeGenerated {
                code,
                generated_at: now,
            }))
        }
        FollowUp::StrudelResult(Err(message)) => {
            room.set_strudel_failed();
            Some(Applied::everyone(ServerEvent::Error {
                kind: "unavailable".into(),
                message,
            }))
        }
    }
}

fn leave(room: &mut Room, actor: &str) -> Result<Applied, ServiceError> {
    let mut applied = if room.participants().len() <= 1 {
        room.set_user_connection(actor, false)?;
        room.sessions.revoke(actor);
        Applied::everyone(ServerEvent::UserConnectionStatus {
            user: actor.to_string(),
            connected: false,
        })
    } else {
        let was_moderator = room.is_moderator(actor);
        let removed = room.remove_user(actor)?;
        let applied = Applied::everyone(ServerEvent::UserLeft { user: removed.name });
        match room.successor_candidate().filter(|_| was_moderator) {
            Some(successor) => {
                room.set_moderator(&successor)?;
                applied.then(FollowUp::AnnounceModerator)
            }
            None => applied,
        }
    };
    applied.effects.push(Effect::Close {
        name: actor.to_string(),
        reason: DisconnectReason::Disconnect,
    });
    Ok(applied)
}

fn add_ticket(
    room: &mut Room,
    draft: TicketDraft,
    now: i64,
) -> Result<TicketQueueItem, ServiceError> {
    let ticket_id = match explicit_ticket_id(draft.ticket_id) {
        Some(ticket_id) => ticket_id,
        None => room.queue.next_ticket_id(&room.settings().ticket_prefix)?,
    };
    let ticket = NewTicket {
        ticket_id,
        title: draft.title,
        description: draft.description,
        status: draft.status.unwrap_or(TicketStatus::Pending),
        ordinal: room.queue.next_ordinal()?,
        external_service: draft.external_service.unwrap_or_default(),
        external_service_id: draft.external_service_id,
        external_service_metadata: draft.external_service_metadata,
    };
    Ok(room.queue.create_ticket(ticket, now)?)
}

fn import_queue(
    room: &mut Room,
    tickets: Vec<ExternalTicket>,
    now: i64,
) -> Result<(), ServiceError> {
    for ticket in tickets {
        let ticket_id = match explicit_ticket_id(ticket.ticket_id) {
            Some(ticket_id) => ticket_id,
            None => room.queue.next_ticket_id(&room.settings().ticket_prefix)?,
        };
        let item = NewTicket {
            ticket_id,
            title: ticket.title,
            description: ticket.description,
            status: TicketStatus::Pending,
            ordinal: room.queue.next_ordinal()?,
            external_service: ticket.external_service,
            external_service_id: ticket.external_service_id,
            external_service_metadata: ticket.metadata,
        };
        room.queue.create_ticket(item, now)?;
    }
    Ok(())
}

fn explicit_ticket_id(ticket_id: Option<String>) -> Option<String> {
    ticket_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn current_ticket_id(room: &Room) -> Option<String> {
    room.queue.current().map(|ticket| ticket.ticket_id.clone())
}

fn with_anchor(room: &Room, applied: Applied) -> Applied {
    if room.timer().auto_reset_on_votes_reset {
        applied.then(FollowUp::AnchorTimer)
    } else {
        applied
    }
}

fn require(room: &Room, actor: &str, delegated: bool, action: &str) -> Result<(), ServiceError> {
    if delegated || room.is_moderator(actor) {
        Ok(())
    } else {
        Err(ServiceError::Permission(format!(
            "only the moderator can {action}"
        )))
    }
}

fn require_moderator(room: &Room, actor: &str, action: &str) -> Result<(), ServiceError> {
    require(room, actor, false, action)
}

fn require_queue(room: &Room, actor: &str) -> Result<(), ServiceError> {
    if !room.settings().enable_ticket_queue {
        return Err(ServiceError::Validation("ticket queue is disabled".into()));
    }
    let delegated = room.settings().allow_others_to_manage_queue;
    require(room, actor, delegated, "manage the ticket queue")
}

fn require_timer(room: &Room, actor: &str) -> Result<(), ServiceError> {
    let delegated = room.settings().allow_others_to_control_timer;
    require(room, actor, delegated, "control the timer")
}
