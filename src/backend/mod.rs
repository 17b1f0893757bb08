//! The hosted services as seen from the client: a hierarchical document
//! store with live queries, and an authentication provider.
//!
//! Stores only ever talk to [`DocumentStore`] and [`AuthProvider`]; which
//! product sits behind them is decided when the [`Session`](crate::Session)
//! is built.

pub mod clock;
mod listeners;
mod query;
pub mod sqlite;

use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

use crate::db::UserId;

pub use query::{Direction, Filter, Query};
pub use sqlite::SqliteBackend;

pub type Fields = Map<String, Value>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("document {0} not found")]
    NotFound(String),
    /// The service refused the request; the message is passed through untouched.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    MissingField(String),
    #[error("malformed document {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("oauth: {0}")]
    OAuth(String),
    #[error(transparent)]
    Clock(#[from] time::error::Format),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_owned())
    }

    pub fn users() -> Self {
        Self::root("users")
    }

    pub fn campaigns() -> Self {
        Self::root("campaigns")
    }

    /// A subcollection hanging off one campaign, e.g. `campaigns/{id}/chat`.
    pub fn campaign(campaign_id: &str, sub: &str) -> Self {
        Self(format!("campaigns/{campaign_id}/{sub}"))
    }

    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored entity that knows its own document id.
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        &self.path.id
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> BackendResult<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|source| {
            BackendError::Decode {
                path: self.path.to_string(),
                source,
            }
        })
    }

    pub fn decode_record<T: Record>(&self) -> BackendResult<T> {
        let mut record: T = self.decode()?;
        record.set_id(self.path.id.clone());
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Replaced by the backend's own clock when the write lands.
    ServerTimestamp,
    /// Appends each value not already present in the stored array.
    ArrayUnion(Vec<Value>),
}

/// The fields of one write, possibly carrying backend-resolved sentinels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocWrite(BTreeMap<String, FieldValue>);

impl DocWrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a write from any value serializing to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> BackendResult<Self> {
        match serde_json::to_value(value).map_err(BackendError::Encode)? {
            Value::Object(fields) => Ok(Self::new().merge(fields)),
            other => Err(BackendError::Encode(serde::ser::Error::custom(format!(
                "expected an object, got {other}"
            )))),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.0.insert(field.to_owned(), FieldValue::ServerTimestamp);
        self
    }

    pub fn array_union(mut self, field: &str, values: Vec<Value>) -> Self {
        self.0.insert(field.to_owned(), FieldValue::ArrayUnion(values));
        self
    }

    pub fn merge(mut self, fields: Fields) -> Self {
        for (field, value) in fields {
            self.0.insert(field, FieldValue::Value(value));
        }
        self
    }

    pub fn remove(mut self, field: &str) -> Self {
        self.0.remove(field);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the write onto `target`, stamping server timestamps with `now`.
    pub(crate) fn apply(&self, target: &mut Fields, now: &str) {
        for (field, value) in &self.0 {
            match value {
                FieldValue::Value(value) => {
                    target.insert(field.clone(), value.clone());
                }
                FieldValue::ServerTimestamp => {
                    target.insert(field.clone(), Value::String(now.to_owned()));
                }
                FieldValue::ArrayUnion(values) => {
                    let slot = target
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        for value in values {
                            if !items.contains(value) {
                                items.push(value.clone());
                            }
                        }
                    }
                }
            }
        }
    }
}

/// A live query: every item is a full snapshot of the watched target.
///
/// Dropping the listener cancels it on the backend side.
#[derive(Debug)]
pub struct Listener<T> {
    rx: mpsc::UnboundedReceiver<BackendResult<T>>,
}

impl<T> Listener<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<BackendResult<T>>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<BackendResult<T>> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> BackendResult<Option<Document>>;

    /// Creates a document under a backend-generated id.
    async fn add(&self, collection: &CollectionPath, write: DocWrite) -> BackendResult<Document>;

    /// Creates or replaces a document.
    async fn set(&self, path: &DocPath, write: DocWrite) -> BackendResult<()>;

    /// Merges into an existing document, failing with [`BackendError::NotFound`] otherwise.
    async fn update(&self, path: &DocPath, write: DocWrite) -> BackendResult<()>;

    async fn delete(&self, path: &DocPath) -> BackendResult<()>;

    async fn query(&self, query: &Query) -> BackendResult<Vec<Document>>;

    /// Deletes every listed document, all or nothing.
    async fn delete_batch(&self, paths: Vec<DocPath>) -> BackendResult<()>;

    async fn listen_doc(&self, path: &DocPath) -> BackendResult<Listener<Option<Document>>>;

    async fn listen_query(&self, query: &Query) -> BackendResult<Listener<Vec<Document>>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Proof of a completed Google sign-in, exchanged for a session by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleCredential {
    pub access_token: String,
}

impl fmt::Debug for GoogleCredential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GoogleCredential").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthUser>;

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser>;

    async fn sign_in_with_google(&self, credential: &GoogleCredential) -> BackendResult<AuthUser>;

    async fn sign_out(&self) -> BackendResult<()>;

    /// The signed-in user, updated whenever the session changes, including
    /// changes the client did not initiate.
    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn write_resolves_sentinels() {
        let mut stored = json!({ "players": ["a"], "name": "old" })
            .as_object()
            .cloned()
            .unwrap();

        DocWrite::new()
            .set("name", "new")
            .server_timestamp("updatedAt")
            .array_union("players", vec![json!("a"), json!("b")])
            .apply(&mut stored, "2026-01-01T00:00:00.000000000Z");

        assert_eq!(
            Value::Object(stored),
            json!({
                "players": ["a", "b"],
                "name": "new",
                "updatedAt": "2026-01-01T00:00:00.000000000Z",
            })
        );
    }

    #[test]
    fn from_serialize_rejects_non_objects() {
        assert!(DocWrite::from_serialize(&3).is_err());
        let write = DocWrite::from_serialize(&json!({ "x": 1 })).unwrap();
        assert_eq!(write.get("x"), Some(&FieldValue::Value(json!(1))));
    }

    #[test]
    fn campaign_paths_nest() {
        let path = CollectionPath::campaign("c1", "tokens").doc("t1");
        assert_eq!(path.to_string(), "campaigns/c1/tokens/t1");
    }
}
