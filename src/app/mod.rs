use std::io::Stdout;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;
use time::OffsetDateTime;

use crate::config::themes::ThemeRegistry;
use crate::config::AppConfig;
use crate::model::{ImageAttachment, ItemId};
use crate::pantry::view::filter_items;
use crate::pantry::{Outcome, Pantry};
use crate::ui;

mod actions;
pub mod state;

pub use actions::Action;
pub use state::{AddField, AppState, EditField, OverlayState, SignInForm, StatusKind};

use actions::action_for_key;
use state::{pop_grapheme, push_char};

pub struct App {
    pub config: Arc<AppConfig>,
    pantry: Pantry,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, pantry: Pantry) -> Self {
        let palette = ThemeRegistry::default().palette(config.theme);
        let mut state = AppState::new(palette);
        if pantry.current_user().is_none() {
            state.set_status_message(Some("Press s to sign in"));
        }
        Self {
            tick_rate: config.tick_rate(),
            config,
            pantry,
            state,
            list_state: ListState::default(),
            should_quit: false,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn pantry(&self) -> &Pantry {
        &self.pantry
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    let view = self.pantry.view(OffsetDateTime::now_utc());
                    self.state.clamp_selection(view.rows.len());
                    if view.rows.is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.state.selected));
                    }
                    let screen = ui::Screen {
                        user: self.pantry.current_user(),
                        view: &view,
                        edits: self.pantry.edits(),
                    };
                    ui::draw_app(frame, &screen, &self.state, &mut self.list_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    pub fn on_tick(&mut self) {
        let report = self.pantry.sync();
        if report.user_changed {
            self.state.reset_for_session();
            match self.pantry.current_user() {
                Some(user) => {
                    let message = format!("Signed in as {}", user.label());
                    self.state.set_status_message(Some(message));
                }
                None => self.state.set_status_message(Some("Signed out")),
            }
        } else if report.edit_discarded {
            self.state
                .set_status_message(Some("The item you were editing was removed"));
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.handle_overlay_key(key) {
            return;
        }

        let edits = self.pantry.edits();
        let (clear_open, add_open, editing) = (
            edits.is_clear_dialog_open(),
            edits.is_add_open(),
            edits.edit_draft().is_some(),
        );
        if clear_open {
            self.handle_clear_dialog_key(key);
            return;
        }
        if add_open {
            self.handle_add_form_key(key);
            return;
        }
        if editing {
            self.handle_edit_form_key(key);
            return;
        }

        if self.state.search_active && self.handle_search_key(key) {
            return;
        }

        if let Some(action) = action_for_key(&key, self.pantry.current_user().is_some()) {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => {
                let len = self.visible_len();
                self.state.move_selection(1, len);
            }
            Action::SelectPrevious => {
                let len = self.visible_len();
                self.state.move_selection(-1, len);
            }
            Action::StartSearch => {
                self.state.search_active = true;
                self.state
                    .set_status_message(Some("Type to filter, Enter to keep, Esc to clear"));
            }
            Action::ClearSearch => {
                self.pantry.edits_mut().set_search("");
                self.state.set_status_message(None::<String>);
            }
            Action::AddItem => {
                self.pantry.edits_mut().open_add();
                self.state.add_focus = AddField::Name;
                self.state.image_path.clear();
                self.state
                    .set_status_message(Some("Tab moves between fields, Enter adds"));
            }
            Action::EditItem => match self.selected_item_id() {
                Some(id) => {
                    if self.pantry.begin_edit(&id) {
                        self.state.edit_focus = EditField::Name;
                        self.state
                            .set_status_message(Some("Editing: Enter saves, Esc cancels"));
                    }
                }
                None => self.state.set_status_message(Some("Nothing selected")),
            },
            Action::DeleteItem => self.handle_delete_item(),
            Action::ClearAll => {
                if self.pantry.items().is_empty() {
                    self.state.set_status_message(Some("Nothing to clear"));
                } else {
                    self.pantry.edits_mut().open_clear_dialog();
                }
            }
            Action::SignIn => self.state.open_sign_in(),
            Action::SignOut => self.state.confirm_sign_out(),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::SignIn(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Sign-in canceled"));
                    }
                    KeyCode::Enter => self.submit_sign_in(),
                    KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                        if let Some(form) = self.state.sign_in_form_mut() {
                            form.toggle_focus();
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(form) = self.state.sign_in_form_mut() {
                            pop_grapheme(form.focused_mut());
                        }
                    }
                    KeyCode::Char(ch) if is_text_input(&key) => {
                        if let Some(form) = self.state.sign_in_form_mut() {
                            push_char(form.focused_mut(), ch);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::ConfirmSignOut) => {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Enter => {
                        self.state.close_overlay();
                        self.submit_sign_out();
                    }
                    KeyCode::Char('n') | KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Still signed in"));
                    }
                    _ => {}
                }
                true
            }
            None => false,
        }
    }

    fn handle_clear_dialog_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => match self.pantry.clear_all() {
                Ok(Outcome::Applied(count)) => {
                    self.state.selected = 0;
                    self.state
                        .set_status_message(Some(format!("Cleared {count} item(s)")));
                }
                Ok(Outcome::Skipped(reason)) => {
                    self.state.set_status_message(Some(capitalize(&reason.to_string())));
                }
                Err(err) => {
                    self.state
                        .set_error_message(format!("Clearing failed: {err}"));
                }
            },
            KeyCode::Char('n') | KeyCode::Esc => {
                self.pantry.edits_mut().close_clear_dialog();
                self.state.set_status_message(Some("Clear canceled"));
            }
            _ => {}
        }
    }

    fn handle_add_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.pantry.edits_mut().cancel_add();
                self.state.image_path.clear();
                self.state.set_status_message(Some("Add canceled"));
            }
            KeyCode::Enter => self.submit_add(),
            KeyCode::Tab | KeyCode::Down => self.state.add_focus = self.state.add_focus.next(),
            KeyCode::BackTab | KeyCode::Up => {
                self.state.add_focus = self.state.add_focus.previous()
            }
            KeyCode::Backspace => pop_grapheme(self.add_field_mut()),
            KeyCode::Char(ch) if is_text_input(&key) => push_char(self.add_field_mut(), ch),
            _ => {}
        }
    }

    fn add_field_mut(&mut self) -> &mut String {
        match self.state.add_focus {
            AddField::Image => &mut self.state.image_path,
            AddField::Name => &mut self.pantry.edits_mut().add_draft_mut().name,
            AddField::Quantity => &mut self.pantry.edits_mut().add_draft_mut().quantity,
            AddField::Expiry => &mut self.pantry.edits_mut().add_draft_mut().expiry_date,
        }
    }

    fn handle_edit_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.pantry.edits_mut().cancel_edit();
                self.state.set_status_message(Some("Edit canceled"));
            }
            KeyCode::Enter => self.submit_edit(),
            KeyCode::Tab | KeyCode::Right => {
                self.state.edit_focus = self.state.edit_focus.next()
            }
            KeyCode::BackTab | KeyCode::Left => {
                self.state.edit_focus = self.state.edit_focus.previous()
            }
            KeyCode::Backspace => {
                if let Some(field) = self.edit_field_mut() {
                    pop_grapheme(field);
                }
            }
            KeyCode::Char(ch) if is_text_input(&key) => {
                if let Some(field) = self.edit_field_mut() {
                    push_char(field, ch);
                }
            }
            _ => {}
        }
    }

    fn edit_field_mut(&mut self) -> Option<&mut String> {
        let focus = self.state.edit_focus;
        let draft = self.pantry.edits_mut().edit_draft_mut()?;
        Some(match focus {
            EditField::Name => &mut draft.name,
            EditField::Quantity => &mut draft.quantity,
            EditField::Expiry => &mut draft.expiry_date,
        })
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.state.search_active = false;
                self.pantry.edits_mut().set_search("");
                self.state.set_status_message(None::<String>);
            }
            KeyCode::Enter => {
                self.state.search_active = false;
                self.state.set_status_message(None::<String>);
            }
            KeyCode::Backspace => {
                let mut text = self.pantry.edits().search().to_string();
                pop_grapheme(&mut text);
                self.pantry.edits_mut().set_search(text);
                self.state.selected = 0;
            }
            KeyCode::Char(ch) if is_text_input(&key) => {
                let mut text = self.pantry.edits().search().to_string();
                push_char(&mut text, ch);
                self.pantry.edits_mut().set_search(text);
                self.state.selected = 0;
            }
            _ => return false,
        }
        true
    }

    fn submit_sign_in(&mut self) {
        let Some(OverlayState::SignIn(form)) = self.state.overlay() else {
            return;
        };
        let request = form.to_request();
        match self.pantry.sign_in(&request) {
            Ok(user) => {
                self.state.close_overlay();
                self.state.reset_for_session();
                let message = format!("Signed in as {}", user.label());
                self.state.set_status_message(Some(message));
            }
            Err(err) => self.state.set_error_message(format!("Sign-in failed: {err}")),
        }
    }

    fn submit_sign_out(&mut self) {
        match self.pantry.sign_out() {
            Ok(()) => {
                self.state.reset_for_session();
                self.state.set_status_message(Some("Signed out"));
            }
            Err(err) => self.state.set_error_message(format!("Sign-out failed: {err}")),
        }
    }

    fn submit_add(&mut self) {
        let image_path = self.state.image_path.trim().to_string();
        let image = if image_path.is_empty() {
            None
        } else {
            match ImageAttachment::from_path(Path::new(&image_path)) {
                Ok(image) => Some(image),
                Err(err) => {
                    tracing::warn!(?err, path = %image_path, "could not read image");
                    self.state
                        .set_error_message(format!("Cannot read image {image_path}: {err}"));
                    return;
                }
            }
        };
        self.pantry.edits_mut().add_draft_mut().image = image;

        match self.pantry.submit_add() {
            Ok(Outcome::Applied(_)) => {
                self.state.image_path.clear();
                self.state.add_focus = AddField::Name;
                self.state.set_status_message(Some("Item added"));
            }
            Ok(Outcome::Skipped(reason)) => {
                self.state
                    .set_error_message(capitalize(&reason.to_string()));
            }
            Err(err) => self.state.set_error_message(format!("Add failed: {err}")),
        }
    }

    fn submit_edit(&mut self) {
        match self.pantry.submit_edit() {
            Ok(Outcome::Applied(_)) => self.state.set_status_message(Some("Item updated")),
            Ok(Outcome::Skipped(reason)) => {
                self.state.set_status_message(Some(capitalize(&reason.to_string())))
            }
            Err(err) => self.state.set_error_message(format!("Saving failed: {err}")),
        }
    }

    fn handle_delete_item(&mut self) {
        let Some(id) = self.selected_item_id() else {
            self.state.set_status_message(Some("Nothing selected"));
            return;
        };
        let name = self
            .pantry
            .find(id.as_str())
            .map(|item| item.name.clone())
            .unwrap_or_default();
        match self.pantry.delete_item(&id) {
            Ok(_) => {
                let len = self.visible_len();
                self.state.clamp_selection(len);
                self.state
                    .set_status_message(Some(format!("Deleted '{name}'")));
            }
            Err(err) => self.state.set_error_message(format!("Delete failed: {err}")),
        }
    }

    fn visible_len(&self) -> usize {
        filter_items(self.pantry.items(), self.pantry.edits().search()).len()
    }

    fn selected_item_id(&self) -> Option<ItemId> {
        filter_items(self.pantry.items(), self.pantry.edits().search())
            .get(self.state.selected)
            .map(|item| item.id.clone())
    }
}

fn is_text_input(key: &KeyEvent) -> bool {
    !key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("leaving alternate screen")?;
    terminal.show_cursor().context("showing cursor")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AuthProvider, Backend, DocumentStore, MemoryAuthProvider, MemoryBlobStore,
        MemoryDocumentStore, StoreOperation,
    };
    use crate::pantry::PantrySettings;

    struct Harness {
        auth: Arc<MemoryAuthProvider>,
        documents: Arc<MemoryDocumentStore>,
        app: App,
    }

    fn harness(signed_in: bool) -> anyhow::Result<Harness> {
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
        let app = App::new(Arc::new(AppConfig::default()), pantry);
        Ok(Harness {
            auth,
            documents,
            app,
        })
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn add_item(app: &mut App, name: &str, quantity: &str) {
        press(app, KeyCode::Char('a'));
        type_text(app, name);
        press(app, KeyCode::Tab);
        type_text(app, quantity);
        press(app, KeyCode::Enter);
    }

    #[test]
    fn sign_in_overlay_starts_a_session() -> anyhow::Result<()> {
        let mut h = harness(false)?;
        press(&mut h.app, KeyCode::Char('a'));
        assert!(!h.app.pantry().edits().is_add_open());

        press(&mut h.app, KeyCode::Char('s'));
        assert!(matches!(h.app.state().overlay(), Some(OverlayState::SignIn(_))));
        type_text(&mut h.app, "cook@example.com");
        press(&mut h.app, KeyCode::Enter);

        assert!(h.app.state().overlay().is_none());
        assert!(h.app.pantry().is_feed_active());
        let status = h.app.state().status().map(|s| s.text.clone());
        assert_eq!(status.as_deref(), Some("Signed in as cook@example.com"));
        Ok(())
    }

    #[test]
    fn rejected_sign_in_keeps_overlay_open() -> anyhow::Result<()> {
        let mut h = harness(false)?;
        press(&mut h.app, KeyCode::Char('s'));
        type_text(&mut h.app, "not-an-email");
        press(&mut h.app, KeyCode::Enter);
        assert!(h.app.state().overlay().is_some());
        assert_eq!(h.app.state().status().map(|s| s.kind), Some(StatusKind::Error));
        Ok(())
    }

    #[test]
    fn add_form_creates_item() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        add_item(&mut h.app, "milk", "2");
        assert!(!h.app.pantry().edits().is_add_open());
        assert_eq!(h.app.pantry().items().len(), 1);
        assert_eq!(h.documents.request_count(StoreOperation::Create), 1);
        Ok(())
    }

    #[test]
    fn incomplete_add_form_stays_open() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        press(&mut h.app, KeyCode::Char('a'));
        type_text(&mut h.app, "milk");
        press(&mut h.app, KeyCode::Enter);
        assert!(h.app.pantry().edits().is_add_open());
        assert!(h.documents.requests().is_empty());
        Ok(())
    }

    #[test]
    fn inline_edit_updates_quantity() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        add_item(&mut h.app, "milk", "2");
        press(&mut h.app, KeyCode::Char('e'));
        press(&mut h.app, KeyCode::Tab);
        press(&mut h.app, KeyCode::Backspace);
        type_text(&mut h.app, "5");
        press(&mut h.app, KeyCode::Enter);
        assert!(h.app.pantry().edits().edit_draft().is_none());
        assert_eq!(h.app.pantry().total(), 5.0);
        Ok(())
    }

    #[test]
    fn removed_item_ends_inline_edit() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        add_item(&mut h.app, "milk", "2");
        press(&mut h.app, KeyCode::Char('e'));
        let Some(id) = h.app.pantry().edits().editing().cloned() else {
            anyhow::bail!("edit did not start");
        };

        h.documents.delete("items", id.as_str())?;
        h.app.on_tick();
        assert!(h.app.pantry().edits().editing().is_none());
        let status = h.app.state().status().map(|s| s.text.clone());
        assert_eq!(status.as_deref(), Some("The item you were editing was removed"));

        press(&mut h.app, KeyCode::Char('a'));
        assert!(h.app.pantry().edits().is_add_open());
        Ok(())
    }

    #[test]
    fn clear_all_asks_for_confirmation() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        add_item(&mut h.app, "milk", "2");
        add_item(&mut h.app, "bread", "3");

        press(&mut h.app, KeyCode::Char('C'));
        assert!(h.app.pantry().edits().is_clear_dialog_open());
        press(&mut h.app, KeyCode::Char('n'));
        assert_eq!(h.app.pantry().items().len(), 2);

        press(&mut h.app, KeyCode::Char('C'));
        press(&mut h.app, KeyCode::Char('y'));
        assert!(h.app.pantry().items().is_empty());
        assert_eq!(h.documents.request_count(StoreOperation::BatchDelete), 1);
        Ok(())
    }

    #[test]
    fn search_filters_selection_targets() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        add_item(&mut h.app, "milk", "2");
        add_item(&mut h.app, "bread", "3");
        press(&mut h.app, KeyCode::Char('/'));
        type_text(&mut h.app, "BRE");
        press(&mut h.app, KeyCode::Enter);
        assert_eq!(h.app.pantry().edits().search(), "BRE");

        press(&mut h.app, KeyCode::Char('d'));
        let names: Vec<_> = h.app.pantry().items().iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, vec!["milk".to_string()]);
        Ok(())
    }

    #[test]
    fn sign_out_requires_confirmation_and_tick_notices_external_changes() -> anyhow::Result<()> {
        let mut h = harness(true)?;
        press(&mut h.app, KeyCode::Char('S'));
        press(&mut h.app, KeyCode::Esc);
        assert!(h.app.pantry().current_user().is_some());

        press(&mut h.app, KeyCode::Char('S'));
        press(&mut h.app, KeyCode::Char('y'));
        assert!(h.app.pantry().current_user().is_none());
        assert_eq!(h.documents.observer_count(), 0);

        h.auth.sign_in(&crate::backend::SignInRequest {
            email: "cook@example.com".into(),
            display_name: None,
        })?;
        h.app.on_tick();
        assert!(h.app.pantry().is_feed_active());
        Ok(())
    }
}
