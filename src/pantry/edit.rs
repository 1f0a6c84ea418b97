//! Local edit state: the add draft, the single edit draft, the clear-all
//! dialog and the search filter. Every write to the document store goes
//! through here so draft state is only cleared once a request is accepted.

use strum::Display;
use uuid::Uuid;

use crate::backend::{BlobStore, DocumentStore};
use crate::error::BackendResult;
use crate::model::{coerce_number, ImageAttachment, Item, ItemId, ItemPatch, NewItem, UserId, UserIdentity};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddDraft {
    pub name: String,
    pub quantity: String,
    pub expiry_date: String,
    pub image: Option<ImageAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub item_id: ItemId,
    pub name: String,
    pub quantity: String,
    pub expiry_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[strum(to_string = "name is required")]
    EmptyName,
    #[strum(to_string = "quantity is required")]
    EmptyQuantity,
    #[strum(to_string = "not signed in")]
    SignedOut,
    #[strum(to_string = "no item is being edited")]
    NoActiveEdit,
    #[strum(to_string = "clear-all was not confirmed")]
    DialogClosed,
    #[strum(to_string = "nothing to clear")]
    NothingToClear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// Collaborators and caller context for one write.
#[derive(Clone, Copy)]
pub struct WriteContext<'a> {
    pub documents: &'a dyn DocumentStore,
    pub blobs: &'a dyn BlobStore,
    pub collection: &'a str,
    pub user: Option<&'a UserIdentity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditModel {
    add: AddDraft,
    add_open: bool,
    edit: Option<EditDraft>,
    clear_dialog_open: bool,
    search: String,
    /// Image already stored for the add draft, reused if the create is retried.
    uploaded_image: Option<(ImageAttachment, String)>,
}

impl EditModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_draft(&self) -> &AddDraft {
        &self.add
    }

    pub fn add_draft_mut(&mut self) -> &mut AddDraft {
        &mut self.add
    }

    pub fn is_add_open(&self) -> bool {
        self.add_open
    }

    pub fn open_add(&mut self) {
        self.add_open = true;
    }

    pub fn cancel_add(&mut self) {
        self.add_open = false;
        self.add = AddDraft::default();
        self.uploaded_image = None;
    }

    pub fn submit_add(&mut self, ctx: &WriteContext<'_>) -> BackendResult<Outcome<ItemId>> {
        if self.add.name.trim().is_empty() {
            return Ok(Outcome::Skipped(SkipReason::EmptyName));
        }
        if self.add.quantity.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::EmptyQuantity));
        }
        let Some(user) = ctx.user else {
            return Ok(Outcome::Skipped(SkipReason::SignedOut));
        };

        let mut payload = NewItem::new(&self.add.name, &self.add.quantity, user.uid.clone());
        let expiry = self.add.expiry_date.trim();
        if !expiry.is_empty() {
            payload = payload.with_expiry_date(expiry);
        }
        if let Some(image) = &self.add.image {
            let cached = self
                .uploaded_image
                .as_ref()
                .filter(|(uploaded, _)| uploaded == image)
                .map(|(_, url)| url.clone());
            let url = match cached {
                Some(url) => url,
                None => {
                    if let Some((_, stale)) = &self.uploaded_image {
                        tracing::warn!(url = %stale, "replaced image left behind in blob store");
                    }
                    let url = upload_image(ctx.blobs, &user.uid, image).map_err(|err| {
                        tracing::error!(?err, file = %image.file_name, "image upload failed");
                        err
                    })?;
                    self.uploaded_image = Some((image.clone(), url.clone()));
                    url
                }
            };
            payload = payload.with_image_url(url);
        }

        let id = ctx
            .documents
            .create(ctx.collection, payload.to_fields()?)
            .map_err(|err| {
                tracing::error!(?err, name = %payload.name, "adding item failed");
                err
            })?;
        tracing::info!(item_id = %id, name = %payload.name, "item added");
        self.cancel_add();
        Ok(Outcome::Applied(ItemId::new(id)))
    }

    pub fn edit_draft(&self) -> Option<&EditDraft> {
        self.edit.as_ref()
    }

    pub fn edit_draft_mut(&mut self) -> Option<&mut EditDraft> {
        self.edit.as_mut()
    }

    pub fn editing(&self) -> Option<&ItemId> {
        self.edit.as_ref().map(|draft| &draft.item_id)
    }

    /// Starts editing `item`, discarding any other unsaved edit.
    pub fn begin_edit(&mut self, item: &Item) {
        if let Some(previous) = self.edit.as_ref().filter(|draft| draft.item_id != item.id) {
            tracing::debug!(item_id = %previous.item_id, "discarding unsaved edit");
        }
        self.edit = Some(EditDraft {
            item_id: item.id.clone(),
            name: item.name.clone(),
            quantity: item.quantity.to_text(),
            expiry_date: item.expiry_date.clone().unwrap_or_default(),
        });
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    pub fn submit_edit(&mut self, ctx: &WriteContext<'_>) -> BackendResult<Outcome<ItemId>> {
        let Some(draft) = &self.edit else {
            return Ok(Outcome::Skipped(SkipReason::NoActiveEdit));
        };
        let patch = ItemPatch {
            name: draft.name.trim().to_string(),
            quantity: coerce_number(&draft.quantity),
            expiry_date: draft.expiry_date.clone(),
        };
        ctx.documents
            .update(ctx.collection, draft.item_id.as_str(), patch.to_fields()?)
            .map_err(|err| {
                tracing::error!(?err, item_id = %draft.item_id, "saving edit failed");
                err
            })?;
        let item_id = draft.item_id.clone();
        tracing::info!(item_id = %item_id, "item updated");
        self.edit = None;
        Ok(Outcome::Applied(item_id))
    }

    pub fn delete_item(
        &mut self,
        ctx: &WriteContext<'_>,
        item_id: &ItemId,
    ) -> BackendResult<Outcome<ItemId>> {
        ctx.documents
            .delete(ctx.collection, item_id.as_str())
            .map_err(|err| {
                tracing::error!(?err, item_id = %item_id, "deleting item failed");
                err
            })?;
        tracing::info!(item_id = %item_id, "item deleted");
        if self.editing() == Some(item_id) {
            self.edit = None;
        }
        Ok(Outcome::Applied(item_id.clone()))
    }

    pub fn is_clear_dialog_open(&self) -> bool {
        self.clear_dialog_open
    }

    pub fn open_clear_dialog(&mut self) {
        self.clear_dialog_open = true;
    }

    pub fn close_clear_dialog(&mut self) {
        self.clear_dialog_open = false;
    }

    /// Deletes every item in `items` in one batch. Requires the clear
    /// dialog to be open.
    pub fn clear_all(&mut self, ctx: &WriteContext<'_>, items: &[Item]) -> BackendResult<Outcome<usize>> {
        if !self.clear_dialog_open {
            return Ok(Outcome::Skipped(SkipReason::DialogClosed));
        }
        if items.is_empty() {
            self.clear_dialog_open = false;
            return Ok(Outcome::Skipped(SkipReason::NothingToClear));
        }
        let ids: Vec<String> = items.iter().map(|item| item.id.as_str().to_string()).collect();
        ctx.documents
            .batch_delete(ctx.collection, &ids)
            .map_err(|err| {
                tracing::error!(?err, count = ids.len(), "clearing items failed");
                err
            })?;
        tracing::info!(count = ids.len(), "all items cleared");
        self.clear_dialog_open = false;
        self.edit = None;
        Ok(Outcome::Applied(ids.len()))
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
    }

    /// Forgets drafts, dialogs and the filter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn upload_image(
    blobs: &dyn BlobStore,
    owner: &UserId,
    image: &ImageAttachment,
) -> BackendResult<String> {
    let file_name: String = image
        .file_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let path = format!("images/{}/{}-{}", owner, Uuid::new_v4().simple(), file_name);
    let reference = blobs.upload(&path, &image.bytes)?;
    let url = blobs.resolve_url(&reference)?;
    tracing::debug!(%reference, "image stored");
    Ok(url)
}
