use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::fs;

use crate::dao::{
    models::RoomEntity,
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

/// One JSON document per room under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written room behind.
#[derive(Clone)]
pub struct FileRoomStore {
    dir: Arc<PathBuf>,
}

impl FileRoomStore {
    /// Create the directory if needed and return a store rooted at it.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|err| {
            StorageError::unavailable(format!("cannot create `{}`", dir.display()), err)
        })?;
        Ok(Self { dir: Arc::new(dir) })
    }

    fn room_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{key}.json"))
    }
}

impl RoomStore for FileRoomStore {
    fn load_room(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let path = Self::room_path(&self.dir, key);
        let key = key.to_string();
        Box::pin(async move {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("cannot read `{}`", path.display()),
                        err,
                    ));
                }
            };
            serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| StorageError::corrupted(key, err))
        })
    }

    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let path = Self::room_path(&self.dir, &room.key);
        let tmp = path.with_extension("json.tmp");
        Box::pin(async move {
            let bytes = serde_json::to_vec(&room)
                .map_err(|err| StorageError::corrupted(room.key.clone(), err))?;
            fs::write(&tmp, bytes).await.map_err(|err| {
                StorageError::unavailable(format!("cannot write `{}`", tmp.display()), err)
            })?;
            fs::rename(&tmp, &path).await.map_err(|err| {
                StorageError::unavailable(format!("cannot replace `{}`", path.display()), err)
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            fs::metadata(dir.as_path()).await.map(|_| ()).map_err(|err| {
                StorageError::unavailable(format!("cannot stat `{}`", dir.display()), err)
            })
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            fs::create_dir_all(dir.as_path()).await.map_err(|err| {
                StorageError::unavailable(format!("cannot create `{}`", dir.display()), err)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{room::Room, settings::RoomSettings};

    #[tokio::test]
    async fn roundtrips_through_disk() {
        let dir = std::env::temp_dir().join(format!("rooms-{}", uuid::Uuid::new_v4()));
        let store = FileRoomStore::open(&dir).await.unwrap();

        let mut room = Room::new("R1".into(), "Alice", RoomSettings::default(), 1);
        room.ensure_user("Bob", 1);
        room.set_vote("Bob", "5").unwrap();
        store.save_room(RoomEntity::new(room.clone(), 7)).await.unwrap();

        let loaded = store.load_room("R1").await.unwrap().unwrap();
        assert_eq!(loaded.room, room);
        assert_eq!(loaded.updated_at, 7);
        assert!(store.load_room("R2").await.unwrap().is_none());
        assert!(!dir.join("R1.json.tmp").exists());

        std::fs::write(dir.join("R3.json"), b"{not json").unwrap();
        assert!(matches!(
            store.load_room("R3").await,
            Err(StorageError::Corrupted { .. })
        ));

        let _ = std::fs::remove_dir_all(dir);
    }
}
