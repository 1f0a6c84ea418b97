use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::observers::{ObserverRegistry, Subscription};
use super::sqlite::prepare_connection;
use super::{schema, AuthProvider, SignInRequest};
use crate::config::BackendOptions;
use crate::error::{BackendError, BackendResult};
use crate::model::{UserId, UserIdentity};

const SESSION_TMP_EXTENSION: &str = "json.tmp";

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    user: UserIdentity,
    signed_in_at: i64,
}

/// Account provider for a single machine. Accounts live in the `users`
/// table keyed by email; the signed-in account is persisted to a JSON file
/// so the session survives restarts.
pub struct LocalAuthProvider {
    db_path: Arc<PathBuf>,
    options: Arc<BackendOptions>,
    session_file: PathBuf,
    current: RwLock<Option<UserIdentity>>,
    /// Session file contents as last written or read by this handle.
    last_seen: Mutex<Option<String>>,
    observers: ObserverRegistry<(), Option<UserIdentity>>,
}

impl LocalAuthProvider {
    pub fn open(
        db_path: &Path,
        session_file: &Path,
        options: &BackendOptions,
    ) -> BackendResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let provider = Self {
            db_path: Arc::new(db_path.to_path_buf()),
            options: Arc::new(options.clone()),
            session_file: session_file.to_path_buf(),
            current: RwLock::new(None),
            last_seen: Mutex::new(None),
            observers: ObserverRegistry::default(),
        };
        let conn = provider.connect()?;
        schema::apply(&conn)?;

        let restored = provider.restore_session(&conn)?;
        if let Some(user) = &restored {
            tracing::info!(uid = %user.uid, "restored saved session");
        }
        *provider.current.write() = restored;
        Ok(provider)
    }

    fn connect(&self) -> BackendResult<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    fn read_session_file(&self) -> BackendResult<Option<String>> {
        match fs::read_to_string(&self.session_file) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn restore_session(&self, conn: &Connection) -> BackendResult<Option<UserIdentity>> {
        let Some(raw) = self.read_session_file()? else {
            return Ok(None);
        };
        *self.last_seen.lock() = Some(raw.clone());
        let record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(?err, path = %self.session_file.display(), "discarding unreadable session file");
                remove_if_exists(&self.session_file)?;
                return Ok(None);
            }
        };
        let known = conn
            .query_row(
                "SELECT 1 FROM users WHERE uid = ?1",
                params![record.user.uid.as_str()],
                |_row| Ok(()),
            )
            .optional()?
            .is_some();
        if !known {
            tracing::warn!(uid = %record.user.uid, "saved session refers to an unknown account");
            remove_if_exists(&self.session_file)?;
            return Ok(None);
        }
        Ok(Some(record.user))
    }

    fn upsert_account(&self, email: &str, display_name: Option<&str>) -> BackendResult<UserIdentity> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let existing: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT uid, display_name FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let identity = match existing {
            Some((uid, stored_name)) => {
                let display_name = display_name.map(str::to_string).or(stored_name);
                tx.execute(
                    "UPDATE users SET display_name = ?1, last_sign_in_at = ?2 WHERE uid = ?3",
                    params![display_name, now, uid],
                )?;
                UserIdentity {
                    uid: UserId::new(uid),
                    email: email.to_string(),
                    display_name,
                }
            }
            None => {
                let uid = Uuid::new_v4().simple().to_string();
                tx.execute(
                    "INSERT INTO users (uid, email, display_name, created_at, last_sign_in_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![uid, email, display_name, now],
                )?;
                tracing::info!(uid = %uid, "created local account");
                UserIdentity {
                    uid: UserId::new(uid),
                    email: email.to_string(),
                    display_name: display_name.map(str::to_string),
                }
            }
        };
        tx.commit()?;
        Ok(identity)
    }

    fn write_session(&self, user: &UserIdentity) -> BackendResult<()> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = SessionRecord {
            user: user.clone(),
            signed_in_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let raw = serde_json::to_string_pretty(&record)?;
        let tmp = self.session_file.with_extension(SESSION_TMP_EXTENSION);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(raw.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.session_file)?;
        *self.last_seen.lock() = Some(raw);
        Ok(())
    }

    fn set_current(&self, user: Option<UserIdentity>) {
        *self.current.write() = user.clone();
        self.observers.publish(|_| Some(user.clone()));
    }
}

impl AuthProvider for LocalAuthProvider {
    fn current_user(&self) -> Option<UserIdentity> {
        self.current.read().clone()
    }

    fn watch(&self) -> Subscription<Option<UserIdentity>> {
        self.observers.register((), Some(self.current_user()))
    }

    fn sign_in(&self, request: &SignInRequest) -> BackendResult<UserIdentity> {
        let email = normalize_email(&request.email)?;
        let display_name = request
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let user = self.upsert_account(&email, display_name)?;
        self.write_session(&user)?;
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    fn sign_out(&self) -> BackendResult<()> {
        remove_if_exists(&self.session_file)?;
        *self.last_seen.lock() = None;
        self.set_current(None);
        Ok(())
    }

    fn poll_changes(&self) -> BackendResult<()> {
        let raw = self.read_session_file()?;
        {
            let mut last_seen = self.last_seen.lock();
            if *last_seen == raw {
                return Ok(());
            }
            *last_seen = raw.clone();
        }
        let user = match raw {
            None => None,
            Some(raw) => match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => Some(record.user),
                Err(err) => {
                    tracing::warn!(?err, path = %self.session_file.display(), "ignoring unreadable session file");
                    return Ok(());
                }
            },
        };
        if user != self.current_user() {
            tracing::info!(uid = ?user.as_ref().map(|u| u.uid.as_str()), "session changed outside this process");
            self.set_current(user);
        }
        Ok(())
    }
}

pub(crate) fn normalize_email(raw: &str) -> BackendResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(BackendError::SignInRejected(format!(
            "'{}' is not a valid email address",
            raw.trim()
        )));
    }
    Ok(email)
}

fn remove_if_exists(path: &Path) -> BackendResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn open_provider(temp: &TempDir) -> BackendResult<LocalAuthProvider> {
        LocalAuthProvider::open(
            &temp.path().join("pantry.db"),
            &temp.path().join("state").join("session.json"),
            &BackendOptions::default(),
        )
    }

    fn request(email: &str) -> SignInRequest {
        SignInRequest {
            email: email.to_string(),
            display_name: None,
        }
    }

    #[test]
    fn session_survives_reopen() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let provider = open_provider(&temp)?;
        let user = provider.sign_in(&request("Cook@Example.com"))?;
        assert_eq!(user.email, "cook@example.com");
        drop(provider);

        let reopened = open_provider(&temp)?;
        assert_eq!(reopened.current_user(), Some(user));
        Ok(())
    }

    #[test]
    fn same_email_maps_to_same_account() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let provider = open_provider(&temp)?;
        let first = provider.sign_in(&request("cook@example.com"))?;
        provider.sign_out()?;
        let second = provider.sign_in(&request(" cook@example.com "))?;
        assert_eq!(first.uid, second.uid);
        Ok(())
    }

    #[test]
    fn rejected_sign_in_keeps_session_unchanged() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let provider = open_provider(&temp)?;
        let result = provider.sign_in(&request("not-an-email"));
        assert_matches!(result, Err(BackendError::SignInRejected(_)));
        assert!(provider.current_user().is_none());
        Ok(())
    }

    #[test]
    fn poll_picks_up_session_changes_from_another_handle() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let tui = open_provider(&temp)?;
        let cli = open_provider(&temp)?;
        let user = tui.sign_in(&request("cook@example.com"))?;
        let watch = tui.watch();
        assert_eq!(watch.try_recv(), Some(Some(user.clone())));

        tui.poll_changes()?;
        assert_eq!(watch.try_recv(), None);

        cli.sign_out()?;
        tui.poll_changes()?;
        assert!(tui.current_user().is_none());
        assert_eq!(watch.try_recv(), Some(None));

        let other = cli.sign_in(&request("baker@example.com"))?;
        tui.poll_changes()?;
        assert_eq!(tui.current_user(), Some(other));
        Ok(())
    }

    #[test]
    fn watch_reports_initial_state_then_changes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let provider = open_provider(&temp)?;
        let watch = provider.watch();
        assert_eq!(watch.try_recv(), Some(None));

        let user = provider.sign_in(&request("cook@example.com"))?;
        provider.sign_out()?;
        assert_eq!(watch.try_recv(), Some(Some(user)));
        assert_eq!(watch.try_recv(), Some(None));
        Ok(())
    }
}
