use unicode_segmentation::UnicodeSegmentation;

use crate::backend::SignInRequest;
use crate::config::themes::Palette;

pub const MAX_FIELD_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddField {
    Name,
    Quantity,
    Expiry,
    Image,
}

impl AddField {
    pub fn next(self) -> Self {
        match self {
            AddField::Name => AddField::Quantity,
            AddField::Quantity => AddField::Expiry,
            AddField::Expiry => AddField::Image,
            AddField::Image => AddField::Name,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            AddField::Name => AddField::Image,
            AddField::Quantity => AddField::Name,
            AddField::Expiry => AddField::Quantity,
            AddField::Image => AddField::Expiry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Name,
    Quantity,
    Expiry,
}

impl EditField {
    pub fn next(self) -> Self {
        match self {
            EditField::Name => EditField::Quantity,
            EditField::Quantity => EditField::Expiry,
            EditField::Expiry => EditField::Name,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            EditField::Name => EditField::Expiry,
            EditField::Quantity => EditField::Name,
            EditField::Expiry => EditField::Quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInField {
    Email,
    DisplayName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInForm {
    pub email: String,
    pub display_name: String,
    pub focus: SignInField,
}

impl Default for SignInForm {
    fn default() -> Self {
        Self {
            email: String::new(),
            display_name: String::new(),
            focus: SignInField::Email,
        }
    }
}

impl SignInForm {
    pub fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            SignInField::Email => &mut self.email,
            SignInField::DisplayName => &mut self.display_name,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            SignInField::Email => SignInField::DisplayName,
            SignInField::DisplayName => SignInField::Email,
        };
    }

    pub fn to_request(&self) -> SignInRequest {
        let display_name = self.display_name.trim();
        SignInRequest {
            email: self.email.trim().to_string(),
            display_name: (!display_name.is_empty()).then(|| display_name.to_string()),
        }
    }
}

/// Overlays owned by the terminal UI. The add form, edit form and clear
/// dialog are driven by the pantry's edit model instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    SignIn(SignInForm),
    ConfirmSignOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub selected: usize,
    pub search_active: bool,
    pub add_focus: AddField,
    /// Path typed into the add form's image field, read on submit.
    pub image_path: String,
    pub edit_focus: EditField,
    pub palette: Palette,
    overlay: Option<OverlayState>,
    status: Option<StatusMessage>,
}

impl AppState {
    pub fn new(palette: Palette) -> Self {
        Self {
            selected: 0,
            search_active: false,
            add_focus: AddField::Name,
            image_path: String::new(),
            edit_focus: EditField::Name,
            palette,
            overlay: None,
            status: None,
        }
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn open_sign_in(&mut self) {
        self.overlay = Some(OverlayState::SignIn(SignInForm::default()));
    }

    pub fn sign_in_form_mut(&mut self) -> Option<&mut SignInForm> {
        match self.overlay.as_mut() {
            Some(OverlayState::SignIn(form)) => Some(form),
            _ => None,
        }
    }

    pub fn confirm_sign_out(&mut self) {
        self.overlay = Some(OverlayState::ConfirmSignOut);
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status = message.map(|text| StatusMessage {
            text: text.into(),
            kind: StatusKind::Info,
        });
    }

    pub fn set_error_message<S: Into<String>>(&mut self, message: S) {
        self.status = Some(StatusMessage {
            text: message.into(),
            kind: StatusKind::Error,
        });
    }

    pub fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        let last = len as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    pub fn clamp_selection(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    /// Clears per-user UI state after the signed-in user changes.
    pub fn reset_for_session(&mut self) {
        self.selected = 0;
        self.search_active = false;
        self.add_focus = AddField::Name;
        self.image_path.clear();
        self.edit_focus = EditField::Name;
    }
}

pub fn push_char(target: &mut String, ch: char) {
    if target.graphemes(true).count() < MAX_FIELD_LEN {
        target.push(ch);
    }
}

/// Removes the last user-perceived character.
pub fn pop_grapheme(target: &mut String) {
    if let Some((index, _)) = target.grapheme_indices(true).next_back() {
        target.truncate(index);
    }
}
