//! A self-hosted document store on SQLite, with in-process live queries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{
    BackendError, BackendResult, CollectionPath, DocPath, DocWrite, Document, DocumentStore, Fields,
    Listener, Query,
    clock::ServerClock,
    listeners::{Listeners, Watch},
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)";

#[derive(Debug)]
pub struct SqliteBackend {
    db_pool: SqlitePool,
    /// Serializes writes together with the snapshots they trigger.
    write_lock: Mutex<()>,
    clock: ServerClock,
    listeners: Listeners,
}

impl SqliteBackend {
    pub async fn connect(url: &str) -> BackendResult<Self> {
        let options: SqliteConnectOptions = url.parse()?;
        let db_pool = if url.contains(":memory:") {
            // every connection to :memory: is its own database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(16)
                .connect_with(options.create_if_missing(true))
                .await?
        };
        Self::with_pool(db_pool).await
    }

    pub async fn in_memory() -> BackendResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn with_pool(db_pool: SqlitePool) -> BackendResult<Self> {
        sqlx::query(SCHEMA).execute(&db_pool).await?;
        Ok(Self {
            db_pool,
            write_lock: Mutex::new(()),
            clock: ServerClock::new(),
            listeners: Listeners::default(),
        })
    }

    /// Number of live queries still held open by clients.
    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    async fn read(&self, path: &DocPath) -> BackendResult<Option<Fields>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection=? AND id=?")
                .bind(path.collection.as_str())
                .bind(&path.id)
                .fetch_optional(&self.db_pool)
                .await?;

        row.map(|(data,)| parse(path, &data)).transpose()
    }

    async fn read_collection(&self, collection: &CollectionPath) -> BackendResult<Vec<Document>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id,data FROM documents WHERE collection=?")
                .bind(collection.as_str())
                .fetch_all(&self.db_pool)
                .await?;

        rows.into_iter()
            .map(|(id, data)| {
                let path = collection.doc(id);
                let data = parse(&path, &data)?;
                Ok(Document { path, data })
            })
            .collect()
    }

    async fn write(&self, path: &DocPath, data: &Fields) -> BackendResult<()> {
        let data = serde_json::to_string(data).map_err(BackendError::Encode)?;
        sqlx::query(
            "INSERT INTO documents (collection,id,data) VALUES (?,?,?)
                ON CONFLICT(collection,id) DO UPDATE SET data=excluded.data",
        )
        .bind(path.collection.as_str())
        .bind(&path.id)
        .bind(data)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Pushes fresh snapshots to every live query the write could have changed.
    /// Callers hold `write_lock`.
    async fn publish(&self, collection: &CollectionPath, ids: &[String]) {
        let watches = self.listeners.affected(collection, ids);
        trace!(%collection, listeners = watches.len(), "publishing snapshots");
        for watch in watches {
            match watch {
                Watch::Doc(path, tx) => {
                    let snapshot = self.get(&path).await;
                    let _ = tx.send(snapshot);
                }
                Watch::Query(query, tx) => {
                    let snapshot = self.query(&query).await;
                    let _ = tx.send(snapshot);
                }
            }
        }
    }
}

fn parse(path: &DocPath, data: &str) -> BackendResult<Fields> {
    serde_json::from_str(data).map_err(|source| BackendError::Decode {
        path: path.to_string(),
        source,
    })
}

#[async_trait]
impl DocumentStore for SqliteBackend {
    async fn get(&self, path: &DocPath) -> BackendResult<Option<Document>> {
        Ok(self.read(path).await?.map(|data| Document {
            path: path.clone(),
            data,
        }))
    }

    async fn add(&self, collection: &CollectionPath, write: DocWrite) -> BackendResult<Document> {
        let _guard = self.write_lock.lock().await;
        let path = collection.doc(Uuid::now_v7().simple().to_string());
        let mut data = Fields::new();
        write.apply(&mut data, &self.clock.now()?);
        self.write(&path, &data).await?;
        debug!(%path, "added document");

        self.publish(collection, std::slice::from_ref(&path.id)).await;
        Ok(Document { path, data })
    }

    async fn set(&self, path: &DocPath, write: DocWrite) -> BackendResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = Fields::new();
        write.apply(&mut data, &self.clock.now()?);
        self.write(path, &data).await?;

        self.publish(&path.collection, std::slice::from_ref(&path.id)).await;
        Ok(())
    }

    async fn update(&self, path: &DocPath, write: DocWrite) -> BackendResult<()> {
        let _guard = self.write_lock.lock().await;
        let Some(mut data) = self.read(path).await? else {
            return Err(BackendError::NotFound(path.to_string()));
        };
        write.apply(&mut data, &self.clock.now()?);
        self.write(path, &data).await?;

        self.publish(&path.collection, std::slice::from_ref(&path.id)).await;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> BackendResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM documents WHERE collection=? AND id=?")
            .bind(path.collection.as_str())
            .bind(&path.id)
            .execute(&self.db_pool)
            .await?;
        debug!(%path, "deleted document");

        self.publish(&path.collection, std::slice::from_ref(&path.id)).await;
        Ok(())
    }

    async fn query(&self, query: &Query) -> BackendResult<Vec<Document>> {
        Ok(query.apply(self.read_collection(query.collection()).await?))
    }

    async fn delete_batch(&self, paths: Vec<DocPath>) -> BackendResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        let mut trx = self.db_pool.begin().await?;
        for path in &paths {
            sqlx::query("DELETE FROM documents WHERE collection=? AND id=?")
                .bind(path.collection.as_str())
                .bind(&path.id)
                .execute(&mut *trx)
                .await?;
        }
        trx.commit().await?;
        debug!(count = paths.len(), "batch deleted documents");

        let mut touched: BTreeMap<CollectionPath, Vec<String>> = BTreeMap::new();
        for path in paths {
            touched.entry(path.collection).or_default().push(path.id);
        }
        for (collection, ids) in touched {
            self.publish(&collection, &ids).await;
        }
        Ok(())
    }

    async fn listen_doc(&self, path: &DocPath) -> BackendResult<Listener<Option<Document>>> {
        let _guard = self.write_lock.lock().await;
        let initial = self.get(path).await?;
        let (tx, listener) = self.listeners.doc(path.clone());
        let _ = tx.send(Ok(initial));
        Ok(listener)
    }

    async fn listen_query(&self, query: &Query) -> BackendResult<Listener<Vec<Document>>> {
        let _guard = self.write_lock.lock().await;
        let initial = self.query(query).await?;
        let (tx, listener) = self.listeners.query(query.clone());
        let _ = tx.send(Ok(initial));
        Ok(listener)
    }
}
