//! In-process backend. Holds everything in memory, records every request it
//! receives, and can be told to fail specific operations, which makes it
//! the backend of choice for exercising the pantry core.

use std::collections::HashSet;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::auth::normalize_email;
use super::observers::{ObserverRegistry, Subscription};
use super::{
    AuthProvider, BlobRef, BlobStore, Document, DocumentStore, FieldFilter, Fields,
    SignInRequest, Snapshot,
};
use crate::error::{BackendError, BackendResult};
use crate::model::{UserId, UserIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Create,
    Update,
    Delete,
    BatchDelete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub operation: StoreOperation,
    pub collection: String,
    pub ids: Vec<String>,
    pub fields: Option<Fields>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    fail_next: HashSet<StoreOperation>,
    batch_fail_after: Option<usize>,
}

type Collections = IndexMap<String, IndexMap<String, Fields>>;

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
    observers: ObserverRegistry<(String, FieldFilter), Snapshot>,
    failures: Mutex<FailurePlan>,
    requests: Mutex<Vec<RecordedRequest>>,
    next_id: Mutex<u64>,
    paused: Mutex<bool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document without recording a request.
    pub fn seed(&self, collection: &str, fields: Fields) -> String {
        let id = self.allocate_id();
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.publish(collection);
        id
    }

    /// Makes the next call of `operation` fail without touching any data.
    pub fn fail_next(&self, operation: StoreOperation) {
        self.failures.lock().fail_next.insert(operation);
    }

    /// Makes the next batch delete fail after removing `applied` documents
    /// from its working copy.
    pub fn fail_batch_after(&self, applied: usize) {
        self.failures.lock().batch_fail_after = Some(applied);
    }

    /// Holds back snapshot notifications until `resume_notifications`.
    pub fn pause_notifications(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume_notifications(&self) {
        *self.paused.lock() = false;
        let collections: Vec<String> = self.collections.lock().keys().cloned().collect();
        for collection in collections {
            self.publish(&collection);
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, operation: StoreOperation) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.operation == operation)
            .count()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock();
        *next += 1;
        format!("doc-{}", *next)
    }

    fn record(
        &self,
        operation: StoreOperation,
        collection: &str,
        ids: Vec<String>,
        fields: Option<Fields>,
    ) {
        self.requests.lock().push(RecordedRequest {
            operation,
            collection: collection.to_string(),
            ids,
            fields,
        });
    }

    fn take_failure(&self, operation: StoreOperation) -> BackendResult<()> {
        if self.failures.lock().fail_next.remove(&operation) {
            return Err(BackendError::Unavailable(format!(
                "injected {operation:?} failure"
            )));
        }
        Ok(())
    }

    fn snapshot(collections: &Collections, collection: &str, filter: &FieldFilter) -> Snapshot {
        let documents = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| filter.matches(fields))
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Snapshot { documents }
    }

    fn publish(&self, collection: &str) {
        if *self.paused.lock() {
            return;
        }
        let collections = self.collections.lock();
        self.observers.publish(|(wanted, filter)| {
            (wanted == collection).then(|| Self::snapshot(&collections, wanted, filter))
        });
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn live_query(
        &self,
        collection: &str,
        filter: FieldFilter,
    ) -> BackendResult<Subscription<Snapshot>> {
        let initial = Self::snapshot(&self.collections.lock(), collection, &filter);
        Ok(self
            .observers
            .register((collection.to_string(), filter), Some(initial)))
    }

    fn create(&self, collection: &str, fields: Fields) -> BackendResult<String> {
        self.record(StoreOperation::Create, collection, Vec::new(), Some(fields.clone()));
        self.take_failure(StoreOperation::Create)?;
        let id = self.allocate_id();
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.publish(collection);
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> BackendResult<()> {
        self.record(
            StoreOperation::Update,
            collection,
            vec![id.to_string()],
            Some(fields.clone()),
        );
        self.take_failure(StoreOperation::Update)?;
        {
            let mut collections = self.collections.lock();
            let existing = collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            for (key, value) in fields {
                existing.insert(key, value);
            }
        }
        self.publish(collection);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        self.record(StoreOperation::Delete, collection, vec![id.to_string()], None);
        self.take_failure(StoreOperation::Delete)?;
        if let Some(docs) = self.collections.lock().get_mut(collection) {
            docs.shift_remove(id);
        }
        self.publish(collection);
        Ok(())
    }

    fn batch_delete(&self, collection: &str, ids: &[String]) -> BackendResult<()> {
        self.record(StoreOperation::BatchDelete, collection, ids.to_vec(), None);
        self.take_failure(StoreOperation::BatchDelete)?;
        let fail_after = self.failures.lock().batch_fail_after.take();
        {
            let mut collections = self.collections.lock();
            let mut working = collections.get(collection).cloned().unwrap_or_default();
            for (applied, id) in ids.iter().enumerate() {
                if fail_after == Some(applied) {
                    return Err(BackendError::Unavailable(format!(
                        "batch aborted after {applied} of {} deletes",
                        ids.len()
                    )));
                }
                working.shift_remove(id);
            }
            collections.insert(collection.to_string(), working);
        }
        self.publish(collection);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuthProvider {
    current: RwLock<Option<UserIdentity>>,
    observers: ObserverRegistry<(), Option<UserIdentity>>,
    reject_next: Mutex<bool>,
    fail_sign_out: Mutex<bool>,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(email: &str) -> BackendResult<Self> {
        let provider = Self::new();
        provider.sign_in(&SignInRequest {
            email: email.to_string(),
            display_name: None,
        })?;
        Ok(provider)
    }

    pub fn reject_next_sign_in(&self) {
        *self.reject_next.lock() = true;
    }

    pub fn fail_next_sign_out(&self) {
        *self.fail_sign_out.lock() = true;
    }

    fn set_current(&self, user: Option<UserIdentity>) {
        *self.current.write() = user.clone();
        self.observers.publish(|_| Some(user.clone()));
    }
}

impl AuthProvider for MemoryAuthProvider {
    fn current_user(&self) -> Option<UserIdentity> {
        self.current.read().clone()
    }

    fn watch(&self) -> Subscription<Option<UserIdentity>> {
        self.observers.register((), Some(self.current_user()))
    }

    fn sign_in(&self, request: &SignInRequest) -> BackendResult<UserIdentity> {
        if std::mem::take(&mut *self.reject_next.lock()) {
            return Err(BackendError::SignInRejected("sign-in window closed".into()));
        }
        let email = normalize_email(&request.email)?;
        let user = UserIdentity {
            uid: UserId::new(format!("uid-{email}")),
            email,
            display_name: request.display_name.clone(),
        };
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    fn sign_out(&self) -> BackendResult<()> {
        if std::mem::take(&mut *self.fail_sign_out.lock()) {
            return Err(BackendError::Unavailable("sign-out request failed".into()));
        }
        self.set_current(None);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<IndexMap<String, Vec<u8>>>,
    fail_next_upload: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_upload(&self) {
        *self.fail_next_upload.lock() = true;
    }

    pub fn paths(&self) -> Vec<String> {
        self.blobs.lock().keys().cloned().collect()
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> BackendResult<BlobRef> {
        if std::mem::take(&mut *self.fail_next_upload.lock()) {
            return Err(BackendError::Unavailable("upload quota exceeded".into()));
        }
        self.blobs.lock().insert(path.to_string(), bytes.to_vec());
        Ok(BlobRef(path.to_string()))
    }

    fn resolve_url(&self, reference: &BlobRef) -> BackendResult<String> {
        if !self.blobs.lock().contains_key(&reference.0) {
            return Err(BackendError::NotFound(reference.0.clone()));
        }
        Ok(format!("memory://{}", reference.0))
    }
}
