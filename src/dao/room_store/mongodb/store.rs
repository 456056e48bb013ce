use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    client::MongoConfig,
    error::{MongoDaoError, MongoResult},
};
use crate::{
    dao::{models::RoomEntity, room_store::RoomStore, storage::StorageResult},
    state::room::Room,
};

const ROOM_COLLECTION_NAME: &str = "rooms";

/// Stored shape: the room key doubles as the document id.
#[derive(Debug, Serialize, Deserialize)]
struct MongoRoomDocument {
    #[serde(rename = "_id")]
    key: String,
    updated_at: i64,
    room: Room,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(entity: RoomEntity) -> Self {
        Self {
            key: entity.key,
            updated_at: entity.updated_at,
            room: entity.room,
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(document: MongoRoomDocument) -> Self {
        Self {
            key: document.key,
            updated_at: document.updated_at,
            room: document.room,
        }
    }
}

#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = self.config.open().await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = config.open().await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! {"updated_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_updated_at_idx".to_owned()))
                    .build(),
            )
            .build();

        self.collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "updated_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn save_room(&self, room: RoomEntity) -> MongoResult<()> {
        let key = room.key.clone();
        let document: MongoRoomDocument = room.into();
        self.collection()
            .await
            .replace_one(doc! { "_id": key.as_str() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { key, source })?;
        Ok(())
    }

    async fn load_room(&self, key: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc! { "_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::LoadRoom { key, source })?;
        Ok(document.map(Into::into))
    }
}

impl RoomStore for MongoRoomStore {
    fn load_room(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.load_room(key).await.map_err(Into::into) })
    }

    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_room(room).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
