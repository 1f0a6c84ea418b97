use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

use super::observers::{ObserverRegistry, Subscription};
use super::schema;
use super::{Document, DocumentStore, FieldFilter, Fields, Snapshot};
use crate::config::BackendOptions;
use crate::error::{BackendError, BackendResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct QueryKey {
    collection: String,
    filter: FieldFilter,
}

/// Tracks `PRAGMA data_version` on a dedicated connection so commits made
/// by other connections (including other processes) can be noticed.
struct ChangeWatcher {
    conn: Connection,
    last_version: i64,
}

impl ChangeWatcher {
    fn current_version(&self) -> BackendResult<i64> {
        let version = self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get::<_, i64>(0))?;
        Ok(version)
    }
}

/// Document store backed by a single SQLite file. Field maps are stored as
/// JSON text; every write re-publishes snapshots to the live queries on the
/// touched collection.
pub struct SqliteDocumentStore {
    db_path: Arc<PathBuf>,
    options: Arc<BackendOptions>,
    observers: ObserverRegistry<QueryKey, Snapshot>,
    watcher: Mutex<ChangeWatcher>,
}

impl SqliteDocumentStore {
    pub fn open(db_path: &Path, options: &BackendOptions) -> BackendResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;

        let mut watcher = ChangeWatcher {
            conn,
            last_version: 0,
        };
        watcher.last_version = watcher.current_version()?;

        Ok(Self {
            db_path: Arc::new(db_path.to_path_buf()),
            options: Arc::new(options.clone()),
            observers: ObserverRegistry::default(),
            watcher: Mutex::new(watcher),
        })
    }

    pub fn connect(&self) -> BackendResult<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> BackendResult<T>
    where
        F: FnOnce(&mut Connection) -> BackendResult<T>,
    {
        let mut conn = self.connect()?;
        f(&mut conn)
    }

    /// One-shot query, without registering an observer.
    pub fn query(&self, collection: &str, filter: &FieldFilter) -> BackendResult<Snapshot> {
        self.with_connection(|conn| query_snapshot(conn, collection, filter))
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn after_write(&self, collection: &str) {
        self.mark_seen();
        self.publish(|key| key.collection == collection);
    }

    fn mark_seen(&self) {
        let mut watcher = self.watcher.lock();
        match watcher.current_version() {
            Ok(version) => watcher.last_version = version,
            Err(err) => tracing::warn!(?err, "failed to read data_version"),
        }
    }

    fn publish<P>(&self, wanted: P)
    where
        P: Fn(&QueryKey) -> bool,
    {
        if self.observers.is_empty() {
            return;
        }
        let conn = match self.connect() {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!(?err, "failed to open connection for snapshot publish");
                return;
            }
        };
        let delivered = self.observers.publish(|key| {
            if !wanted(key) {
                return None;
            }
            match query_snapshot(&conn, &key.collection, &key.filter) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    tracing::error!(?err, collection = %key.collection, "failed to build snapshot");
                    None
                }
            }
        });
        tracing::trace!(delivered, "published snapshots");
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn live_query(
        &self,
        collection: &str,
        filter: FieldFilter,
    ) -> BackendResult<Subscription<Snapshot>> {
        let initial = self.query(collection, &filter)?;
        let key = QueryKey {
            collection: collection.to_string(),
            filter,
        };
        Ok(self.observers.register(key, Some(initial)))
    }

    fn create(&self, collection: &str, fields: Fields) -> BackendResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let encoded = serde_json::to_string(&fields)?;
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            conn.execute(
                "INSERT INTO documents (id, collection, fields, created_at, updated_at, seq)
                 VALUES (?1, ?2, ?3, ?4, ?4,
                         (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents))",
                params![id, collection, encoded, now],
            )?;
            Ok(())
        })?;
        tracing::debug!(collection, id = %id, "document created");
        self.after_write(collection);
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> BackendResult<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let existing: String = tx
                .query_row(
                    "SELECT fields FROM documents WHERE id = ?1 AND collection = ?2",
                    params![id, collection],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            let mut merged: Fields = serde_json::from_str(&existing)?;
            for (key, value) in fields {
                merged.insert(key, value);
            }
            let now = OffsetDateTime::now_utc().unix_timestamp();
            tx.execute(
                "UPDATE documents SET fields = ?1, updated_at = ?2
                 WHERE id = ?3 AND collection = ?4",
                params![serde_json::to_string(&merged)?, now, id, collection],
            )?;
            tx.commit()?;
            Ok(())
        })?;
        tracing::debug!(collection, id, "document updated");
        self.after_write(collection);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        let removed = self.with_connection(|conn| {
            let removed = conn.execute(
                "DELETE FROM documents WHERE id = ?1 AND collection = ?2",
                params![id, collection],
            )?;
            Ok(removed)
        })?;
        tracing::debug!(collection, id, removed, "document deleted");
        self.after_write(collection);
        Ok(())
    }

    fn batch_delete(&self, collection: &str, ids: &[String]) -> BackendResult<()> {
        let removed = self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0usize;
            {
                let mut stmt =
                    tx.prepare("DELETE FROM documents WHERE id = ?1 AND collection = ?2")?;
                for id in ids {
                    removed += stmt.execute(params![id, collection])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })?;
        tracing::debug!(collection, requested = ids.len(), removed, "batch delete committed");
        self.after_write(collection);
        Ok(())
    }

    fn poll_changes(&self) -> BackendResult<()> {
        let changed = {
            let mut watcher = self.watcher.lock();
            let version = watcher.current_version()?;
            let changed = version != watcher.last_version;
            watcher.last_version = version;
            changed
        };
        if changed {
            tracing::debug!("external change detected, republishing snapshots");
            self.publish(|_| true);
        }
        Ok(())
    }
}

fn query_snapshot(
    conn: &Connection,
    collection: &str,
    filter: &FieldFilter,
) -> BackendResult<Snapshot> {
    let mut stmt = conn.prepare(
        "SELECT id, fields FROM documents
         WHERE collection = ?1
         ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut documents = Vec::with_capacity(rows.len());
    for (id, raw) in rows {
        let fields: Fields = match serde_json::from_str(&raw) {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!(?err, id = %id, "skipping document with unreadable fields");
                continue;
            }
        };
        if filter.matches(&fields) {
            documents.push(Document { id, fields });
        }
    }
    Ok(Snapshot { documents })
}

pub(crate) fn prepare_connection(conn: &Connection, options: &BackendOptions) -> BackendResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        options.wal_autocheckpoint.to_string(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    fn open_store(temp: &TempDir) -> BackendResult<SqliteDocumentStore> {
        SqliteDocumentStore::open(&temp.path().join("pantry.db"), &BackendOptions::default())
    }

    #[test]
    fn live_query_delivers_initial_and_follow_up_snapshots() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        store.create("items", fields(json!({"name": "milk", "userId": "u1"})))?;

        let subscription = store.live_query("items", FieldFilter::field_equals("userId", "u1"))?;
        let initial = subscription.try_recv().expect("initial snapshot");
        assert_eq!(initial.len(), 1);

        store.create("items", fields(json!({"name": "bread", "userId": "u1"})))?;
        store.create("items", fields(json!({"name": "salt", "userId": "u2"})))?;

        let latest = subscription.drain_latest().expect("follow-up snapshot");
        let names: Vec<_> = latest
            .documents
            .iter()
            .map(|doc| doc.fields["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("milk"), json!("bread")]);
        Ok(())
    }

    #[test]
    fn update_merges_fields_and_reports_missing_documents() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let id = store.create(
            "items",
            fields(json!({"name": "milk", "quantity": "2", "userId": "u1"})),
        )?;

        store.update("items", &id, fields(json!({"quantity": 4})))?;
        let snapshot = store.query("items", &FieldFilter::field_equals("userId", "u1"))?;
        assert_eq!(snapshot.documents[0].fields["quantity"], json!(4));
        assert_eq!(snapshot.documents[0].fields["name"], json!("milk"));

        let missing = store.update("items", "nope", fields(json!({"quantity": 1})));
        assert_matches!(missing, Err(BackendError::NotFound(ref id)) if id == "nope");
        Ok(())
    }

    #[test]
    fn batch_delete_removes_every_listed_document() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let a = store.create("items", fields(json!({"name": "a", "userId": "u1"})))?;
        let b = store.create("items", fields(json!({"name": "b", "userId": "u1"})))?;
        store.create("items", fields(json!({"name": "c", "userId": "u2"})))?;

        store.batch_delete("items", &[a, b])?;

        let mine = store.query("items", &FieldFilter::field_equals("userId", "u1"))?;
        let theirs = store.query("items", &FieldFilter::field_equals("userId", "u2"))?;
        assert!(mine.is_empty());
        assert_eq!(theirs.len(), 1);
        Ok(())
    }

    #[test]
    fn dropped_subscription_is_unregistered() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let subscription = store.live_query("items", FieldFilter::field_equals("userId", "u1"))?;
        assert_eq!(store.observer_count(), 1);
        drop(subscription);
        assert_eq!(store.observer_count(), 0);
        Ok(())
    }

    #[test]
    fn poll_changes_picks_up_writes_from_another_handle() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let reader = open_store(&temp)?;
        let writer = open_store(&temp)?;
        let subscription = reader.live_query("items", FieldFilter::field_equals("userId", "u1"))?;
        assert!(subscription.drain_latest().expect("initial").is_empty());

        writer.create("items", fields(json!({"name": "oats", "userId": "u1"})))?;
        assert!(subscription.try_recv().is_none());

        reader.poll_changes()?;
        let snapshot = subscription.drain_latest().expect("republished snapshot");
        assert_eq!(snapshot.len(), 1);
        Ok(())
    }
}
