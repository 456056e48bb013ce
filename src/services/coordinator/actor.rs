//! The per-room actor: sole owner and writer of one room.
//!
//! Every mutation follows the same path: apply to a copy, persist the copy as
//! one document, swap it in, then fan out. A failed write leaves the room and
//! every client untouched.

use std::{collections::VecDeque, time::Duration};

use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    credentials::{PasscodeHash, generate_session_token},
    dao::models::RoomEntity,
    dto::{
        events::{DisconnectReason, ServerEvent},
        room::{RoomSnapshot, participant_views},
        ws::ClientCommand,
    },
    error::ServiceError,
    services::strudel::GenerationRequest,
    state::{SharedState, now_millis, room::Room, settings::RoomSettings},
};

use super::{
    broadcast::{ConnectionHub, ConnectionId, ConnectionSender, Outgoing, initialize_event},
    commands::{self, Applied, CommandContext, Effect, FollowUp},
    handle::RoomHandle,
    messages::{Admission, Attachment, Credentials, RoomCommand, RoomMessage},
};

const MAX_IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub(super) struct RoomActor {
    key: String,
    id: Uuid,
    state: SharedState,
    receiver: mpsc::Receiver<RoomMessage>,
    mailbox: mpsc::WeakSender<RoomMessage>,
    room: Option<Room>,
    loaded: bool,
    hub: ConnectionHub,
    pending: VecDeque<FollowUp>,
    last_activity: Instant,
}

impl RoomActor {
    /// Start the actor for `key` and return its handle.
    pub(super) fn spawn(state: SharedState, key: String) -> RoomHandle {
        let (sender, receiver) = mpsc::channel(state.config().room_mailbox_capacity);
        let id = Uuid::new_v4();
        let handle = RoomHandle::new(sender.clone(), id, &key);

        let actor = Self {
            key,
            id,
            state,
            receiver,
            mailbox: sender.downgrade(),
            room: None,
            loaded: false,
            hub: ConnectionHub::default(),
            pending: VecDeque::new(),
            last_activity: Instant::now(),
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        info!(room = %self.key, "room actor started");

        let idle_timeout = self.state.config().idle_timeout;
        let mut idle_check = tokio::time::interval(idle_timeout.min(MAX_IDLE_CHECK_INTERVAL));
        idle_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = idle_check.tick() => {
                    if self.hub.is_empty() && self.last_activity.elapsed() >= idle_timeout {
                        info!(room = %self.key, "room actor idle, stopping");
                        break;
                    }
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => {
                            // Housekeeping alone must not keep an unused room alive.
                            if !matches!(message, RoomMessage::PurgeSessions) {
                                self.last_activity = Instant::now();
                            }
                            self.handle_message(message).await;
                            self.drain_follow_ups().await;
                        }
                        None => break,
                    }
                }
            }
        }

        // No new handle can be obtained once unregistered; serve what is already queued.
        self.state
            .rooms()
            .remove_if(&self.key, |_, handle| handle.id() == self.id);
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            self.handle_message(message).await;
            self.drain_follow_ups().await;
        }
        self.hub.close_all(DisconnectReason::Disconnect);

        info!(room = %self.key, "room actor stopped");
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Initialize {
                moderator,
                avatar,
                settings,
                passcode,
                respond_to,
            } => {
                let result = self.initialize(moderator, avatar, settings, passcode).await;
                let _ = respond_to.send(result);
            }
            RoomMessage::PrepareJoin {
                name,
                token,
                respond_to,
            } => {
                let result = self.prepare_join(&name, token.as_deref()).await;
                let _ = respond_to.send(result);
            }
            RoomMessage::Join {
                name,
                avatar,
                token,
                verified_passcode,
                respond_to,
            } => {
                let result = self.join(&name, avatar, token, verified_passcode).await;
                let _ = respond_to.send(result);
            }
            RoomMessage::ValidateSession {
                credentials,
                respond_to,
            } => {
                let result = match self.ensure_loaded().await {
                    Ok(()) => self.authenticate(&credentials).map(|_| ()),
                    Err(err) => Err(err),
                };
                let _ = respond_to.send(result);
            }
            RoomMessage::Snapshot {
                credentials,
                respond_to,
            } => {
                let result = self.snapshot(&credentials).await;
                let _ = respond_to.send(result);
            }
            RoomMessage::Execute {
                credentials,
                command,
                respond_to,
            } => {
                let result = self.execute(&credentials, command).await;
                let _ = respond_to.send(result);
            }
            RoomMessage::Attach {
                credentials,
                sender,
                respond_to,
            } => {
                let result = self.attach(&credentials, sender).await;
                let _ = respond_to.send(result);
            }
            RoomMessage::Command {
                connection_id,
                command,
            } => self.connection_command(connection_id, command).await,
            RoomMessage::Detach { connection_id } => self.detach(connection_id).await,
            RoomMessage::FollowUp(follow_up) => self.pending.push_back(follow_up),
            RoomMessage::PurgeSessions => self.purge_sessions().await,
        }
    }

    // ---- loading and persistence ----

    async fn ensure_loaded(&mut self) -> Result<(), ServiceError> {
        if self.loaded {
            return Ok(());
        }
        let store = self.state.require_room_store().await?;
        self.room = store.load_room(&self.key).await?.map(|entity| entity.room);
        self.loaded = true;
        debug!(room = %self.key, found = self.room.is_some(), "room loaded");
        Ok(())
    }

    fn room(&self) -> Result<&Room, ServiceError> {
        self.room
            .as_ref()
            .ok_or_else(|| ServiceError::NotFound(format!("room `{}`", self.key)))
    }

    /// Persist `next` and make it the current room. Unchanged rooms are not written.
    async fn commit(&mut self, next: Room) -> Result<(), ServiceError> {
        if self.room.as_ref() == Some(&next) {
            return Ok(());
        }
        let store = self.state.require_room_store().await?;
        if let Err(err) = store
            .save_room(RoomEntity::new(next.clone(), now_millis()))
            .await
        {
            warn!(room = %self.key, error = %err, "failed to persist room");
            return Err(err.into());
        }
        self.room = Some(next);
        Ok(())
    }

    fn context(&self) -> CommandContext {
        CommandContext {
            now: now_millis(),
            round_history_limit: self.state.config().round_history_limit,
            generator_available: self.state.code_generator().is_some(),
        }
    }

    fn session_ttl_ms(&self) -> i64 {
        self.state.config().session_ttl_ms()
    }

    // ---- mutations ----

    async fn mutate(&mut self, actor: &str, command: RoomCommand) -> Result<(), ServiceError> {
        let mut next = self.room()?.clone();
        let applied = commands::apply_command(&mut next, actor, command, &self.context())?;
        self.commit(next).await?;
        self.publish(applied);
        Ok(())
    }

    async fn drain_follow_ups(&mut self) {
        while let Some(follow_up) = self.pending.pop_front() {
            let Some(room) = self.room.as_ref() else {
                self.pending.clear();
                return;
            };
            let mut next = room.clone();
            let applied = commands::apply_follow_up(
                &mut next,
                follow_up,
                self.state.judge().as_ref(),
                now_millis(),
            );
            let Some(applied) = applied else {
                continue;
            };
            if let Err(err) = self.commit(next).await {
                warn!(room = %self.key, error = %err, "follow-up mutation dropped");
                continue;
            }
            self.publish(applied);
        }
    }

    fn publish(&mut self, applied: Applied) {
        let Applied {
            event,
            follow_ups,
            effects,
        } = applied;

        if let (Some(event), Some(room)) = (event.as_ref(), self.room.as_ref()) {
            self.hub.deliver(event, room, now_millis());
        }
        self.pending.extend(follow_ups);
        for effect in effects {
            self.run_effect(effect);
        }
        self.prune_connections();
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Close { name, reason } => self.hub.close(&name, reason),
            Effect::GenerateStrudel { prompt, style } => {
                let Some(generator) = self.state.code_generator().cloned() else {
                    self.pending.push_back(FollowUp::StrudelResult(Err(
                        "strudel generation is not configured".into(),
                    )));
                    return;
                };
                let Some(mailbox) = self.mailbox.upgrade() else {
                    return;
                };
                let request = GenerationRequest {
                    room_key: self.key.clone(),
                    prompt,
                    style,
                };
                let key = self.key.clone();
                tokio::spawn(async move {
                    let result = generator.generate(request).await.map_err(|err| {
                        warn!(room = %key, error = %err, "strudel generation failed");
                        err.to_string()
                    });
                    if mailbox
                        .send(RoomMessage::FollowUp(FollowUp::StrudelResult(result)))
                        .await
                        .is_err()
                    {
                        warn!(room = %key, "room stopped before strudel result arrived");
                    }
                });
            }
        }
    }

    /// Close connections whose participant is no longer part of the room.
    fn prune_connections(&mut self) {
        let Some(room) = self.room.as_ref() else {
            return;
        };
        let gone: Vec<String> = self
            .hub
            .names()
            .into_iter()
            .filter(|name| room.participant(name).is_none())
            .collect();
        for name in gone {
            self.hub.close(&name, DisconnectReason::Permission);
        }
    }

    // ---- admission ----

    async fn initialize(
        &mut self,
        moderator: String,
        avatar: Option<String>,
        settings: RoomSettings,
        passcode: Option<PasscodeHash>,
    ) -> Result<Admission, ServiceError> {
        self.ensure_loaded().await?;
        if self.room.is_some() {
            return Err(ServiceError::Conflict(format!(
                "room `{}` already exists",
                self.key
            )));
        }

        let now = now_millis();
        let mut room = Room::new(self.key.clone(), &moderator, settings, now);
        let name = room.moderator().to_string();
        room.set_user_avatar(&name, avatar)?;
        room.set_user_connection(&name, true)?;
        room.set_passcode(passcode);
        let session_token = generate_session_token()?;
        room.sessions.insert(&name, session_token.clone(), now);

        self.commit(room).await?;
        info!(room = %self.key, moderator = %name, "room initialized");

        Ok(Admission {
            room: RoomSnapshot::for_viewer(self.room()?, Some(&name), now),
            name,
            session_token,
        })
    }

    async fn prepare_join(
        &mut self,
        name: &str,
        token: Option<&str>,
    ) -> Result<Option<PasscodeHash>, ServiceError> {
        self.ensure_loaded().await?;
        let room = self.room()?;
        check_join_conflict(room, name, token, now_millis(), self.session_ttl_ms())?;
        Ok(room.passcode().cloned())
    }

    async fn join(
        &mut self,
        name: &str,
        avatar: Option<String>,
        token: Option<String>,
        verified_passcode: Option<PasscodeHash>,
    ) -> Result<Admission, ServiceError> {
        self.ensure_loaded().await?;
        let now = now_millis();
        let room = self.room()?;
        check_join_conflict(room, name, token.as_deref(), now, self.session_ttl_ms())?;
        if room.passcode().is_some() && room.passcode() != verified_passcode.as_ref() {
            return Err(ServiceError::Passcode);
        }

        let is_new = room.participant(name).is_none();
        let mut next = room.clone();
        let canonical = next.ensure_user(name, now);
        if avatar.is_some() {
            next.set_user_avatar(&canonical, avatar)?;
        }
        next.set_user_connection(&canonical, true)?;
        let session_token = generate_session_token()?;
        next.sessions.insert(&canonical, session_token.clone(), now);
        self.commit(next).await?;

        let room = self.room()?;
        let event = match participant_views(room)
            .into_iter()
            .find(|view| view.name == canonical)
        {
            Some(user) if is_new => ServerEvent::UserJoined { user },
            _ => ServerEvent::UserConnectionStatus {
                user: canonical.clone(),
                connected: true,
            },
        };
        self.hub.deliver(&Outgoing::Everyone(event), room, now);
        info!(room = %self.key, user = %canonical, new = is_new, "participant joined");

        Ok(Admission {
            room: RoomSnapshot::for_viewer(room, Some(&canonical), now),
            name: canonical,
            session_token,
        })
    }

    /// Canonical name of the caller if their token is current.
    fn authenticate(&self, credentials: &Credentials) -> Result<String, ServiceError> {
        let room = self.room()?;
        let name = room
            .canonical_name(&credentials.name)
            .ok_or_else(|| ServiceError::Auth("unknown participant".into()))?;
        if !room.sessions.validate(
            &name,
            &credentials.token,
            now_millis(),
            self.session_ttl_ms(),
        ) {
            return Err(ServiceError::Auth(
                "session token is invalid or expired".into(),
            ));
        }
        Ok(name)
    }

    async fn snapshot(&mut self, credentials: &Credentials) -> Result<RoomSnapshot, ServiceError> {
        self.ensure_loaded().await?;
        let name = self.authenticate(credentials)?;
        Ok(RoomSnapshot::for_viewer(
            self.room()?,
            Some(&name),
            now_millis(),
        ))
    }

    async fn execute(
        &mut self,
        credentials: &Credentials,
        command: RoomCommand,
    ) -> Result<RoomSnapshot, ServiceError> {
        self.ensure_loaded().await?;
        let name = self.authenticate(credentials)?;
        self.mutate(&name, command).await?;
        Ok(RoomSnapshot::for_viewer(
            self.room()?,
            Some(&name),
            now_millis(),
        ))
    }

    // ---- connections ----

    async fn attach(
        &mut self,
        credentials: &Credentials,
        sender: ConnectionSender,
    ) -> Result<Attachment, ServiceError> {
        self.ensure_loaded().await?;
        let name = self.authenticate(credentials)?;

        let room = self.room()?;
        if !room.participant(&name).is_some_and(|p| p.connected) {
            let mut next = room.clone();
            next.set_user_connection(&name, true)?;
            self.commit(next).await?;
        }

        let connection_id = self.hub.attach(&name, sender);
        let now = now_millis();
        let room = self.room()?;
        self.hub
            .send_to(connection_id, &initialize_event(room, &name, now));
        self.hub.deliver(
            &Outgoing::Everyone(ServerEvent::UserConnectionStatus {
                user: name.clone(),
                connected: true,
            }),
            room,
            now,
        );
        info!(room = %self.key, user = %name, connection = %connection_id, "connection attached");

        Ok(Attachment { connection_id })
    }

    async fn connection_command(&mut self, connection_id: ConnectionId, command: ClientCommand) {
        let Some(name) = self.hub.name_of(connection_id) else {
            debug!(room = %self.key, connection = %connection_id, "command from detached connection ignored");
            return;
        };

        if matches!(command, ClientCommand::Ping) {
            self.hub.send_to(
                connection_id,
                &ServerEvent::Pong {
                    timestamp: now_millis(),
                },
            );
            return;
        }

        if let Err(err) = self.mutate(&name, RoomCommand::Client(command)).await {
            debug!(room = %self.key, user = %name, error = %err, "command rejected");
            self.hub.send_to(
                connection_id,
                &ServerEvent::Error {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
            );
        }
    }

    async fn detach(&mut self, connection_id: ConnectionId) {
        let Some(name) = self.hub.detach(connection_id) else {
            return;
        };
        info!(room = %self.key, user = %name, connection = %connection_id, "connection detached");

        let Some(room) = self.room.as_ref() else {
            return;
        };
        if !room.participant(&name).is_some_and(|p| p.connected) {
            return;
        }
        let mut next = room.clone();
        let was_moderator = next.is_moderator(&name);
        if next.set_user_connection(&name, false).is_err() {
            return;
        }
        if let Err(err) = self.commit(next).await {
            warn!(room = %self.key, user = %name, error = %err, "disconnect not persisted");
            return;
        }

        if let Some(room) = self.room.as_ref() {
            self.hub.deliver(
                &Outgoing::Everyone(ServerEvent::UserConnectionStatus {
                    user: name,
                    connected: false,
                }),
                room,
                now_millis(),
            );
        }
        if was_moderator {
            self.pending.push_back(FollowUp::Handoff);
        }
    }

    async fn purge_sessions(&mut self) {
        if let Err(err) = self.ensure_loaded().await {
            debug!(room = %self.key, error = %err, "session purge skipped");
            return;
        }
        let Some(room) = self.room.as_ref() else {
            return;
        };
        let mut next = room.clone();
        let purged = next
            .sessions
            .purge_expired(now_millis(), self.session_ttl_ms());
        if purged == 0 {
            return;
        }
        match self.commit(next).await {
            Ok(()) => debug!(room = %self.key, purged, "expired sessions purged"),
            Err(err) => warn!(room = %self.key, error = %err, "session purge not persisted"),
        }
    }
}

/// A connected name can only be taken over with a current token for it.
fn check_join_conflict(
    room: &Room,
    name: &str,
    token: Option<&str>,
    now: i64,
    ttl_ms: i64,
) -> Result<(), ServiceError> {
    let Some(existing) = room.participant(name) else {
        return Ok(());
    };
    if !existing.connected {
        return Ok(());
    }
    let superseded = token.is_some_and(|token| room.sessions.validate(&existing.name, token, now, ttl_ms));
    if superseded {
        Ok(())
    } else {
        Err(ServiceError::Conflict(format!(
            "`{}` is already connected",
            existing.name
        )))
    }
}
