use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{models::RoomEntity, room_store::RoomStore, storage::StorageResult};

/// Process-local store, used when no durable backend is configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, RoomEntity>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomStore for MemoryRoomStore {
    fn load_room(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let found = self.rooms.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.rooms.insert(room.key.clone(), room);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{room::Room, settings::RoomSettings};

    #[tokio::test]
    async fn saves_replace_whole_documents() {
        let store = MemoryRoomStore::new();
        let mut room = Room::new("R1".into(), "Alice", RoomSettings::default(), 1);
        store.save_room(RoomEntity::new(room.clone(), 1)).await.unwrap();

        room.ensure_user("Bob", 2);
        store.save_room(RoomEntity::new(room.clone(), 2)).await.unwrap();

        let loaded = store.load_room("R1").await.unwrap().unwrap();
        assert_eq!(loaded.updated_at, 2);
        assert_eq!(loaded.room, room);
        assert_eq!(store.len(), 1);
        assert!(store.load_room("missing").await.unwrap().is_none());
    }
}
