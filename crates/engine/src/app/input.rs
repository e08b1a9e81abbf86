use winit::event::MouseButton;
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

/// Editor-level key identity, independent of the windowing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Digit(u8),
    Function(u8),
    Letter(char),
    Enter,
    Escape,
    Delete,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
    };

    /// Shift or ctrl; either extends a selection.
    pub fn additive(self) -> bool {
        self.shift || self.ctrl
    }
}

impl From<ModifiersState> for Modifiers {
    fn from(state: ModifiersState) -> Self {
        Self {
            shift: state.shift_key(),
            ctrl: state.control_key(),
            alt: state.alt_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

pub(crate) fn pointer_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

pub(crate) fn key_from_physical(key: PhysicalKey) -> Option<Key> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let key = match code {
        KeyCode::Digit0 | KeyCode::Numpad0 => Key::Digit(0),
        KeyCode::Digit1 | KeyCode::Numpad1 => Key::Digit(1),
        KeyCode::Digit2 | KeyCode::Numpad2 => Key::Digit(2),
        KeyCode::Digit3 | KeyCode::Numpad3 => Key::Digit(3),
        KeyCode::Digit4 | KeyCode::Numpad4 => Key::Digit(4),
        KeyCode::Digit5 | KeyCode::Numpad5 => Key::Digit(5),
        KeyCode::Digit6 | KeyCode::Numpad6 => Key::Digit(6),
        KeyCode::Digit7 | KeyCode::Numpad7 => Key::Digit(7),
        KeyCode::Digit8 | KeyCode::Numpad8 => Key::Digit(8),
        KeyCode::Digit9 | KeyCode::Numpad9 => Key::Digit(9),
        KeyCode::F1 => Key::Function(1),
        KeyCode::F2 => Key::Function(2),
        KeyCode::F3 => Key::Function(3),
        KeyCode::F4 => Key::Function(4),
        KeyCode::F5 => Key::Function(5),
        KeyCode::F6 => Key::Function(6),
        KeyCode::F7 => Key::Function(7),
        KeyCode::F8 => Key::Function(8),
        KeyCode::F9 => Key::Function(9),
        KeyCode::F10 => Key::Function(10),
        KeyCode::F11 => Key::Function(11),
        KeyCode::F12 => Key::Function(12),
        KeyCode::KeyA => Key::Letter('a'),
        KeyCode::KeyC => Key::Letter('c'),
        KeyCode::KeyD => Key::Letter('d'),
        KeyCode::KeyE => Key::Letter('e'),
        KeyCode::KeyG => Key::Letter('g'),
        KeyCode::KeyH => Key::Letter('h'),
        KeyCode::KeyM => Key::Letter('m'),
        KeyCode::KeyP => Key::Letter('p'),
        KeyCode::KeyQ => Key::Letter('q'),
        KeyCode::KeyW => Key::Letter('w'),
        KeyCode::KeyX => Key::Letter('x'),
        KeyCode::Enter | KeyCode::NumpadEnter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::Delete => Key::Delete,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::Equal | KeyCode::NumpadAdd => Key::Plus,
        KeyCode::Minus | KeyCode::NumpadSubtract => Key::Minus,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_and_numpad_share_keys() {
        assert_eq!(
            key_from_physical(PhysicalKey::Code(KeyCode::Digit7)),
            Some(Key::Digit(7))
        );
        assert_eq!(
            key_from_physical(PhysicalKey::Code(KeyCode::Numpad0)),
            Some(Key::Digit(0))
        );
    }

    #[test]
    fn function_row_covers_every_slot() {
        assert_eq!(
            key_from_physical(PhysicalKey::Code(KeyCode::F1)),
            Some(Key::Function(1))
        );
        assert_eq!(
            key_from_physical(PhysicalKey::Code(KeyCode::F12)),
            Some(Key::Function(12))
        );
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        assert_eq!(key_from_physical(PhysicalKey::Code(KeyCode::KeyZ)), None);
        assert_eq!(pointer_button(MouseButton::Back), None);
    }

    #[test]
    fn modifiers_follow_winit_state() {
        let mods = Modifiers::from(ModifiersState::SHIFT | ModifiersState::ALT);
        assert!(mods.shift && mods.alt && !mods.ctrl);
        assert!(mods.additive());
        assert!(!Modifiers::NONE.additive());
    }
}
