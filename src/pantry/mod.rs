//! Client-side pantry core: session state, the live item feed, local edit
//! state and the derived view. `Pantry` ties them to a `Backend` and is
//! driven by calling `sync` once per UI tick.

use time::OffsetDateTime;

use crate::backend::{Backend, SignInRequest};
use crate::config::AppConfig;
use crate::error::BackendResult;
use crate::model::{Item, ItemId, UserId, UserIdentity, ITEMS_COLLECTION};

pub mod edit;
pub mod expiry;
pub mod feed;
pub mod session;
pub mod view;

pub use edit::{AddDraft, EditDraft, EditModel, Outcome, SkipReason, WriteContext};
pub use expiry::ExpiryStatus;
pub use feed::ItemFeed;
pub use session::SessionHolder;
pub use view::{PantryView, ViewRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PantrySettings {
    pub collection: String,
    pub soon_within_days: u32,
}

impl Default for PantrySettings {
    fn default() -> Self {
        Self {
            collection: ITEMS_COLLECTION.to_string(),
            soon_within_days: expiry::DEFAULT_SOON_WITHIN_DAYS,
        }
    }
}

impl PantrySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            soon_within_days: config.expiry.soon_within_days,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub user_changed: bool,
    pub items_changed: bool,
    /// The item being edited vanished from the feed and its draft was dropped.
    pub edit_discarded: bool,
}

pub struct Pantry {
    backend: Backend,
    settings: PantrySettings,
    session: SessionHolder,
    feed: ItemFeed,
    edits: EditModel,
}

impl Pantry {
    pub fn new(backend: Backend, settings: PantrySettings) -> Self {
        let session = SessionHolder::new(backend.auth.clone());
        let feed = ItemFeed::new(settings.collection.clone());
        let mut pantry = Self {
            backend,
            settings,
            session,
            feed,
            edits: EditModel::new(),
        };
        pantry.follow_session();
        pantry
    }

    /// One tick: picks up external writes, session changes and queued
    /// snapshots.
    pub fn sync(&mut self) -> SyncReport {
        if let Err(err) = self.backend.documents.poll_changes() {
            tracing::warn!(?err, "polling document store for changes failed");
        }
        if let Err(err) = self.backend.auth.poll_changes() {
            tracing::warn!(?err, "polling auth provider for session changes failed");
        }
        let user_changed = self.session.poll();
        if user_changed {
            self.edits.reset();
        }
        self.follow_session();
        let items_changed = self.feed.poll();
        let edit_discarded = items_changed && self.discard_stale_edit();
        SyncReport {
            user_changed,
            items_changed,
            edit_discarded,
        }
    }

    pub fn current_user(&self) -> Option<&UserIdentity> {
        self.session.current_user()
    }

    pub fn sign_in(&mut self, request: &SignInRequest) -> BackendResult<UserIdentity> {
        let before = self.session.user_id().cloned();
        let user = self.session.sign_in(request)?;
        self.after_session_change(before);
        Ok(user)
    }

    pub fn sign_out(&mut self) -> BackendResult<()> {
        let before = self.session.user_id().cloned();
        self.session.sign_out()?;
        self.after_session_change(before);
        Ok(())
    }

    pub fn items(&self) -> &[Item] {
        self.feed.items()
    }

    pub fn total(&self) -> f64 {
        self.feed.total()
    }

    pub fn find(&self, id: &str) -> Option<&Item> {
        self.feed.find(id)
    }

    pub fn is_feed_active(&self) -> bool {
        self.feed.is_active()
    }

    pub fn view(&self, now: OffsetDateTime) -> PantryView<'_> {
        PantryView::compute(
            self.feed.items(),
            self.edits.search(),
            now,
            self.settings.soon_within_days,
        )
    }

    pub fn edits(&self) -> &EditModel {
        &self.edits
    }

    pub fn edits_mut(&mut self) -> &mut EditModel {
        &mut self.edits
    }

    pub fn submit_add(&mut self) -> BackendResult<Outcome<ItemId>> {
        let ctx = write_context(&self.backend, &self.settings, &self.session);
        let outcome = self.edits.submit_add(&ctx)?;
        self.poll_feed();
        Ok(outcome)
    }

    /// Starts editing the listed item with `id`. Returns false when no such
    /// item is listed.
    pub fn begin_edit(&mut self, id: &ItemId) -> bool {
        match self.feed.find(id.as_str()) {
            Some(item) => {
                self.edits.begin_edit(item);
                true
            }
            None => false,
        }
    }

    pub fn submit_edit(&mut self) -> BackendResult<Outcome<ItemId>> {
        let ctx = write_context(&self.backend, &self.settings, &self.session);
        let outcome = self.edits.submit_edit(&ctx)?;
        self.poll_feed();
        Ok(outcome)
    }

    pub fn delete_item(&mut self, id: &ItemId) -> BackendResult<Outcome<ItemId>> {
        let ctx = write_context(&self.backend, &self.settings, &self.session);
        let outcome = self.edits.delete_item(&ctx, id)?;
        self.poll_feed();
        Ok(outcome)
    }

    pub fn clear_all(&mut self) -> BackendResult<Outcome<usize>> {
        let ctx = write_context(&self.backend, &self.settings, &self.session);
        let outcome = self.edits.clear_all(&ctx, self.feed.items())?;
        self.poll_feed();
        Ok(outcome)
    }

    fn after_session_change(&mut self, before: Option<UserId>) {
        if self.session.user_id() != before.as_ref() {
            self.edits.reset();
        }
        self.follow_session();
        self.poll_feed();
    }

    fn poll_feed(&mut self) {
        if self.feed.poll() {
            self.discard_stale_edit();
        }
    }

    /// Drops the edit draft when its item is no longer listed.
    fn discard_stale_edit(&mut self) -> bool {
        let Some(id) = self.edits.editing() else {
            return false;
        };
        if self.feed.find(id.as_str()).is_some() {
            return false;
        }
        tracing::info!(item_id = %id, "edited item disappeared; discarding draft");
        self.edits.cancel_edit();
        true
    }

    fn follow_session(&mut self) {
        let owner = self.session.user_id();
        if let Err(err) = self.feed.follow(&*self.backend.documents, owner) {
            tracing::error!(?err, "item feed unavailable");
        }
    }
}

fn write_context<'a>(
    backend: &'a Backend,
    settings: &'a PantrySettings,
    session: &'a SessionHolder,
) -> WriteContext<'a> {
    WriteContext {
        documents: &*backend.documents,
        blobs: &*backend.blobs,
        collection: &settings.collection,
        user: session.current_user(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{
        AuthProvider, DocumentStore, LocalAuthProvider, MemoryAuthProvider, MemoryBlobStore,
        MemoryDocumentStore, StoreOperation,
    };
    use assert_matches::assert_matches;
    use serde_json::json;
    use time::macros::datetime;

    struct Fixture {
        auth: Arc<MemoryAuthProvider>,
        documents: Arc<MemoryDocumentStore>,
        pantry: Pantry,
    }

    fn fixture(signed_in: bool) -> anyhow::Result<Fixture> {
        let auth = Arc::new(if signed_in {
            MemoryAuthProvider::signed_in("cook@example.com")?
        } else {
            MemoryAuthProvider::new()
        });
        let documents = Arc::new(MemoryDocumentStore::new());
        let backend = Backend::new(
            auth.clone(),
            documents.clone(),
            Arc::new(MemoryBlobStore::new()),
        );
        let pantry = Pantry::new(backend, PantrySettings::default());
        Ok(Fixture {
            auth,
            documents,
            pantry,
        })
    }

    fn sign_in_request() -> SignInRequest {
        SignInRequest {
            email: "cook@example.com".into(),
            display_name: Some("Cook".into()),
        }
    }

    fn add(pantry: &mut Pantry, name: &str, quantity: &str) -> anyhow::Result<Outcome<ItemId>> {
        pantry.edits_mut().open_add();
        let draft = pantry.edits_mut().add_draft_mut();
        draft.name = name.into();
        draft.quantity = quantity.into();
        Ok(pantry.submit_add()?)
    }

    #[test]
    fn signed_out_pantry_has_no_feed() -> anyhow::Result<()> {
        let mut fx = fixture(false)?;
        assert!(!fx.pantry.is_feed_active());
        assert_eq!(fx.documents.observer_count(), 0);
        assert_eq!(
            add(&mut fx.pantry, "milk", "2")?,
            Outcome::Skipped(SkipReason::SignedOut)
        );
        assert!(fx.documents.requests().is_empty());
        Ok(())
    }

    #[test]
    fn sign_in_subscribes_and_sign_out_tears_down() -> anyhow::Result<()> {
        let mut fx = fixture(false)?;
        let user = fx.pantry.sign_in(&sign_in_request())?;
        assert_eq!(user.label(), "Cook");
        assert!(fx.pantry.is_feed_active());

        add(&mut fx.pantry, "milk", "2")?;
        add(&mut fx.pantry, "bread", "3")?;
        assert_eq!(fx.pantry.items().len(), 2);
        assert_eq!(fx.pantry.total(), 5.0);

        fx.pantry.edits_mut().set_search("bread");
        fx.pantry.sign_out()?;
        assert!(!fx.pantry.is_feed_active());
        assert!(fx.pantry.items().is_empty());
        assert_eq!(fx.pantry.edits().search(), "");
        assert_eq!(fx.documents.observer_count(), 0);
        Ok(())
    }

    #[test]
    fn sync_follows_session_changes_made_by_the_provider() -> anyhow::Result<()> {
        let mut fx = fixture(true)?;
        assert!(fx.pantry.is_feed_active());
        fx.pantry.edits_mut().open_clear_dialog();

        fx.auth.sign_out()?;
        let report = fx.pantry.sync();
        assert!(report.user_changed);
        assert!(!fx.pantry.is_feed_active());
        assert!(!fx.pantry.edits().is_clear_dialog_open());

        fx.auth.sign_in(&sign_in_request())?;
        assert!(fx.pantry.sync().user_changed);
        assert!(fx.pantry.is_feed_active());
        Ok(())
    }

    #[test]
    fn filtered_view_keeps_unfiltered_total() -> anyhow::Result<()> {
        let mut fx = fixture(true)?;
        add(&mut fx.pantry, "milk", "2")?;
        add(&mut fx.pantry, "bread", "3")?;
        fx.pantry.edits_mut().set_search("bread");

        let view = fx.pantry.view(datetime!(2024-01-10 0:00 UTC));
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.total, 5.0);
        Ok(())
    }

    #[test]
    fn late_notification_does_not_disturb_reset_draft() -> anyhow::Result<()> {
        let mut fx = fixture(true)?;
        fx.documents.pause_notifications();
        assert!(add(&mut fx.pantry, "milk", "2")?.is_applied());
        assert!(fx.pantry.items().is_empty());
        assert_eq!(fx.pantry.edits().add_draft(), &AddDraft::default());

        fx.documents.resume_notifications();
        assert!(fx.pantry.sync().items_changed);
        assert_eq!(fx.pantry.items().len(), 1);
        assert_eq!(fx.pantry.edits().add_draft(), &AddDraft::default());
        Ok(())
    }

    #[test]
    fn edit_delete_and_clear_flow() -> anyhow::Result<()> {
        let mut fx = fixture(true)?;
        let milk = match add(&mut fx.pantry, "milk", "2")? {
            Outcome::Applied(id) => id,
            other => anyhow::bail!("unexpected outcome {other:?}"),
        };
        add(&mut fx.pantry, "bread", "3")?;

        assert!(fx.pantry.begin_edit(&milk));
        assert!(!fx.pantry.begin_edit(&ItemId::new("nope")));
        if let Some(draft) = fx.pantry.edits_mut().edit_draft_mut() {
            draft.quantity = "6".into();
        }
        fx.pantry.submit_edit()?;
        assert_eq!(fx.pantry.total(), 9.0);

        fx.pantry.delete_item(&milk)?;
        assert_eq!(fx.pantry.items().len(), 1);

        assert_matches!(
            fx.pantry.clear_all()?,
            Outcome::Skipped(SkipReason::DialogClosed)
        );
        fx.pantry.edits_mut().open_clear_dialog();
        assert_eq!(fx.pantry.clear_all()?, Outcome::Applied(1));
        assert!(fx.pantry.items().is_empty());
        assert_eq!(fx.documents.request_count(StoreOperation::BatchDelete), 1);
        Ok(())
    }

    #[test]
    fn edit_draft_is_dropped_when_its_item_disappears() -> anyhow::Result<()> {
        let mut fx = fixture(true)?;
        let milk = match add(&mut fx.pantry, "milk", "2")? {
            Outcome::Applied(id) => id,
            other => anyhow::bail!("unexpected outcome {other:?}"),
        };
        add(&mut fx.pantry, "bread", "3")?;
        assert!(fx.pantry.begin_edit(&milk));

        fx.documents.delete("items", milk.as_str())?;
        let report = fx.pantry.sync();
        assert!(report.items_changed);
        assert!(report.edit_discarded);
        assert!(fx.pantry.edits().editing().is_none());
        assert_eq!(
            fx.pantry.submit_edit()?,
            Outcome::Skipped(SkipReason::NoActiveEdit)
        );
        assert_eq!(fx.documents.request_count(StoreOperation::Update), 0);
        Ok(())
    }

    #[test]
    fn edit_draft_survives_unrelated_snapshots() -> anyhow::Result<()> {
        let mut fx = fixture(true)?;
        let milk = match add(&mut fx.pantry, "milk", "2")? {
            Outcome::Applied(id) => id,
            other => anyhow::bail!("unexpected outcome {other:?}"),
        };
        assert!(fx.pantry.begin_edit(&milk));
        add(&mut fx.pantry, "bread", "3")?;
        assert!(!fx.pantry.sync().edit_discarded);
        assert_eq!(fx.pantry.edits().editing(), Some(&milk));
        Ok(())
    }

    #[test]
    fn sync_notices_sign_out_from_another_process() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let options = crate::config::BackendOptions::default();
        let db = temp.path().join("pantry.db");
        let session_file = temp.path().join("state").join("session.json");
        let tui_auth = Arc::new(LocalAuthProvider::open(&db, &session_file, &options)?);
        let cli_auth = LocalAuthProvider::open(&db, &session_file, &options)?;
        let backend = Backend::new(
            tui_auth,
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryBlobStore::new()),
        );
        let mut pantry = Pantry::new(backend, PantrySettings::default());
        pantry.sign_in(&sign_in_request())?;
        assert!(pantry.is_feed_active());

        cli_auth.sign_out()?;
        let report = pantry.sync();
        assert!(report.user_changed);
        assert!(pantry.current_user().is_none());
        assert!(!pantry.is_feed_active());

        let other = cli_auth.sign_in(&SignInRequest {
            email: "baker@example.com".into(),
            display_name: None,
        })?;
        assert!(pantry.sync().user_changed);
        assert_eq!(pantry.current_user(), Some(&other));
        assert!(pantry.is_feed_active());
        Ok(())
    }

    #[test]
    fn other_users_items_stay_invisible() -> anyhow::Result<()> {
        let fx = fixture(true)?;
        let mut fields = crate::backend::Fields::new();
        fields.insert("name".into(), json!("caviar"));
        fields.insert("quantity".into(), json!(1));
        fields.insert("userId".into(), json!("someone-else"));
        fx.documents.create("items", fields)?;

        let mut pantry = fx.pantry;
        pantry.sync();
        assert!(pantry.items().is_empty());
        Ok(())
    }
}
