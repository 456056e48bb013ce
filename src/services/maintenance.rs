use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{services::coordinator::RoomHandle, state::SharedState};

/// Periodically ask every live room to drop expired session tokens.
///
/// Expired tokens are already rejected on use; this only keeps stored
/// documents small.
pub async fn run_session_sweeper(state: SharedState) {
    let mut ticker = interval(state.config().session_sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep(&state).await;
    }
}

async fn sweep(state: &SharedState) {
    let handles: Vec<RoomHandle> = state
        .rooms()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    debug!(rooms = handles.len(), "sweeping expired sessions");
    for handle in handles {
        if let Err(err) = handle.purge_sessions().await {
            debug!(room = %handle.key(), error = %err, "session sweep skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::{MemoryRoomStore, RoomStore},
        services::coordinator,
        state::{AppState, settings::RoomSettings},
    };

    #[tokio::test]
    async fn sweep_removes_expired_tokens_from_the_stored_room() {
        let config = AppConfig {
            session_ttl: Duration::from_millis(1),
            ..AppConfig::default()
        };
        let state = AppState::new(config, None).unwrap();
        let store = Arc::new(MemoryRoomStore::new());
        state.install_room_store(store.clone()).await;

        coordinator::room(&state, "SWEEP")
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        sweep(&state).await;
        // A round trip through the mailbox guarantees the purge ran.
        let _ = coordinator::room(&state, "SWEEP")
            .prepare_join("Bob".into(), None)
            .await;

        let stored = store.load_room("SWEEP").await.unwrap().unwrap();
        assert!(stored.room.sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeping_does_not_keep_idle_rooms_alive() {
        let config = AppConfig {
            idle_timeout: Duration::from_secs(5),
            session_sweep_interval: Duration::from_secs(1),
            ..AppConfig::default()
        };
        let state = AppState::new(config, None).unwrap();
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;

        coordinator::room(&state, "IDLE")
            .initialize("Alice".into(), None, RoomSettings::default(), None)
            .await
            .unwrap();
        let sweeper = tokio::spawn(run_session_sweeper(state.clone()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(state.rooms().get("IDLE").is_none());
        sweeper.abort();
    }
}
