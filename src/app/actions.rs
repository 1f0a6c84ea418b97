use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    StartSearch,
    ClearSearch,
    AddItem,
    EditItem,
    DeleteItem,
    ClearAll,
    SignIn,
    SignOut,
}

fn plain(key: &KeyEvent) -> bool {
    !key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

/// Maps a key pressed on the main screen to an action. Item actions are
/// only offered while someone is signed in.
pub fn action_for_key(key: &KeyEvent, signed_in: bool) -> Option<Action> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(Action::Quit)
        }
        KeyCode::Char('q') if plain(key) => return Some(Action::Quit),
        _ => {}
    }

    if !signed_in {
        return match key.code {
            KeyCode::Char('s') | KeyCode::Enter if plain(key) => Some(Action::SignIn),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
        KeyCode::Char('/') if plain(key) => Some(Action::StartSearch),
        KeyCode::Esc => Some(Action::ClearSearch),
        KeyCode::Char('a') if plain(key) => Some(Action::AddItem),
        KeyCode::Char('e') | KeyCode::Enter if plain(key) => Some(Action::EditItem),
        KeyCode::Char('d') | KeyCode::Delete if plain(key) => Some(Action::DeleteItem),
        KeyCode::Char('C') => Some(Action::ClearAll),
        KeyCode::Char('S') => Some(Action::SignOut),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn signed_out_screen_only_offers_sign_in_and_quit() {
        assert_eq!(action_for_key(&key(KeyCode::Char('s')), false), Some(Action::SignIn));
        assert_eq!(action_for_key(&key(KeyCode::Char('q')), false), Some(Action::Quit));
        assert_eq!(action_for_key(&key(KeyCode::Char('a')), false), None);
        assert_eq!(action_for_key(&key(KeyCode::Char('C')), false), None);
    }

    #[test]
    fn modifiers_block_single_letter_actions() {
        let ctrl_a = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(action_for_key(&ctrl_a, true), None);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(action_for_key(&ctrl_c, true), Some(Action::Quit));
        assert_eq!(action_for_key(&key(KeyCode::Char('C')), true), Some(Action::ClearAll));
    }
}
