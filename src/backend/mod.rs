//! Collaborator interfaces the pantry core talks to, plus the local and
//! in-memory implementations of them.
//!
//! The core only ever sees the three traits below. `open_local` wires the
//! SQLite document store, the filesystem blob store and the local account
//! provider together for the application binary.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::{BackendOptions, ConfigPaths};
use crate::error::{BackendError, BackendResult};
use crate::model::UserIdentity;

pub mod auth;
pub mod blob;
pub mod memory;
pub mod observers;
mod schema;
pub mod sqlite;

pub use auth::LocalAuthProvider;
pub use blob::FsBlobStore;
pub use memory::{MemoryAuthProvider, MemoryBlobStore, MemoryDocumentStore, StoreOperation};
pub use observers::{ObserverRegistry, Subscription};
pub use sqlite::SqliteDocumentStore;

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Equality filter on a single top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub equals: Value,
}

impl FieldFilter {
    pub fn field_equals(field: impl Into<String>, equals: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.equals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    pub email: String,
    pub display_name: Option<String>,
}

/// Reference to an uploaded blob, relative to the blob store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef(pub String);

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;

    /// Session changes, starting with the state at registration time.
    fn watch(&self) -> Subscription<Option<UserIdentity>>;

    fn sign_in(&self, request: &SignInRequest) -> BackendResult<UserIdentity>;

    fn sign_out(&self) -> BackendResult<()>;

    /// Publishes a session change made behind this handle's back, for
    /// example by another process sharing the session file.
    fn poll_changes(&self) -> BackendResult<()> {
        Ok(())
    }
}

pub trait DocumentStore: Send + Sync {
    /// Subscribes to the documents of `collection` matching `filter`. The
    /// current result set is queued immediately, then again after every
    /// change that touches the collection.
    fn live_query(
        &self,
        collection: &str,
        filter: FieldFilter,
    ) -> BackendResult<Subscription<Snapshot>>;

    fn create(&self, collection: &str, fields: Fields) -> BackendResult<String>;

    /// Merges `fields` into an existing document.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> BackendResult<()>;

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()>;

    /// Deletes every id or none of them.
    fn batch_delete(&self, collection: &str, ids: &[String]) -> BackendResult<()>;

    /// Re-publishes snapshots if the underlying data changed behind this
    /// handle's back.
    fn poll_changes(&self) -> BackendResult<()> {
        Ok(())
    }
}

pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8]) -> BackendResult<BlobRef>;

    fn resolve_url(&self, reference: &BlobRef) -> BackendResult<String>;
}

#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backend {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            auth,
            documents,
            blobs,
        }
    }
}

pub fn open_local(paths: &ConfigPaths, options: &BackendOptions) -> Result<Backend> {
    let documents = SqliteDocumentStore::open(&options.database_path, options)
        .context("opening local document store")?;
    let auth = LocalAuthProvider::open(&options.database_path, &options.session_file, options)
        .context("opening local account provider")?;
    let blobs = FsBlobStore::open(&options.blob_dir).context("opening local blob store")?;
    tracing::debug!(
        database = %options.database_path.display(),
        blobs = %options.blob_dir.display(),
        state = %paths.state_dir.display(),
        "local backend ready"
    );
    Ok(Backend::new(
        Arc::new(auth),
        Arc::new(documents),
        Arc::new(blobs),
    ))
}

pub(crate) fn to_fields<T: Serialize>(value: &T) -> BackendResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(BackendError::Serialization(
            <serde_json::Error as serde::ser::Error>::custom(format!(
                "expected a JSON object, got {other}"
            )),
        )),
    }
}
