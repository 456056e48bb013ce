pub mod file;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::RoomEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

pub use file::FileRoomStore;
pub use memory::MemoryRoomStore;

/// Abstraction over the persistence layer for rooms.
///
/// Only a room's coordinator writes through this trait, one whole document at a time.
pub trait RoomStore: Send + Sync {
    fn load_room(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
