pub mod queue;
pub mod room;
pub mod sessions;
pub mod settings;
pub mod timer;

use std::{io, sync::Arc};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    credentials::{self, CredentialError},
    dao::{room_store::RoomStore, storage::StorageError},
    error::ServiceError,
    services::{
        coordinator::RoomHandle,
        judge::{MedianJudge, VoteJudge},
        strudel::CodeGenerator,
    },
};

pub type SharedState = Arc<AppState>;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Central application state: the storage slot, live room actors and the
/// collaborators they call into.
pub struct AppState {
    config: AppConfig,
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    rooms: DashMap<String, RoomHandle>,
    judge: Arc<dyn VoteJudge>,
    code_generator: Option<Arc<dyn CodeGenerator>>,
    state_secret: Vec<u8>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        code_generator: Option<Arc<dyn CodeGenerator>>,
    ) -> Result<SharedState, CredentialError> {
        Self::with_judge(config, Arc::new(MedianJudge), code_generator)
    }

    /// Same as [`AppState::new`] with a custom recommendation algorithm.
    pub fn with_judge(
        config: AppConfig,
        judge: Arc<dyn VoteJudge>,
        code_generator: Option<Arc<dyn CodeGenerator>>,
    ) -> Result<SharedState, CredentialError> {
        let state_secret = match config.state_secret.as_deref() {
            Some(secret) => secret.as_bytes().to_vec(),
            None => credentials::generate_state_secret()?,
        };
        let (degraded_tx, _rx) = watch::channel(true);
        Ok(Arc::new(Self {
            config,
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            rooms: DashMap::new(),
            judge,
            code_generator,
            state_secret,
        }))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current room store, or `Unavailable` while degraded.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or_else(|| {
            ServiceError::Unavailable(StorageError::unavailable(
                "no storage backend installed".to_string(),
                io::Error::from(io::ErrorKind::NotConnected),
            ))
        })
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Live room actors keyed by room key.
    pub fn rooms(&self) -> &DashMap<String, RoomHandle> {
        &self.rooms
    }

    pub fn judge(&self) -> &Arc<dyn VoteJudge> {
        &self.judge
    }

    pub fn code_generator(&self) -> Option<&Arc<dyn CodeGenerator>> {
        self.code_generator.as_ref()
    }

    /// HMAC key of signed state envelopes.
    pub fn state_secret(&self) -> &[u8] {
        &self.state_secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::MemoryRoomStore;

    #[tokio::test]
    async fn degraded_until_store_installed() {
        let state = AppState::new(AppConfig::default(), None).unwrap();
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_room_store().await,
            Err(ServiceError::Unavailable(_))
        ));

        state.install_room_store(Arc::new(MemoryRoomStore::new())).await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_room_store().await.is_ok());

        state.clear_room_store().await;
        assert!(state.is_degraded());
    }

    #[test]
    fn configured_secret_is_used_verbatim() {
        let config = AppConfig {
            state_secret: Some("s3cret".into()),
            ..AppConfig::default()
        };
        let state = AppState::new(config, None).unwrap();
        assert_eq!(state.state_secret(), b"s3cret");
    }

    #[test]
    fn now_is_unix_millis() {
        assert!(now_millis() > 1_600_000_000_000);
    }
}
