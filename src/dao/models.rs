use serde::{Deserialize, Serialize};

use crate::state::room::Room;

/// Persisted form of a room: the whole state as one document.
///
/// Writing the full document on every mutation is what makes roster, vote
/// and ticket changes commit together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntity {
    /// Room key, unique across the store.
    pub key: String,
    /// Unix milliseconds of the last write.
    pub updated_at: i64,
    /// Complete room state.
    pub room: Room,
}

impl RoomEntity {
    /// Wrap `room` for a write happening at `now`.
    pub fn new(room: Room, now: i64) -> Self {
        Self {
            key: room.key.clone(),
            updated_at: now,
            room,
        }
    }
}
