//! Key events and their mapping to motion commands

use crate::link::MotionCommand;

/// A key reported by the input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// A printable key
    Char(char),
    /// The escape key, ends the session
    Escape,
    /// Anything else (modifiers, arrows, function keys)
    Other,
}

impl Key {
    /// Motion command bound to this key, `None` for keys that are ignored
    pub fn motion(self) -> Option<MotionCommand> {
        match self {
            Key::Char('w') => Some(MotionCommand::Forward),
            Key::Char('a') => Some(MotionCommand::Left),
            Key::Char('d') => Some(MotionCommand::Right),
            _ => None,
        }
    }
}

/// Press or release of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed(Key),
    Released(Key),
}

impl KeyEvent {
    pub fn key(&self) -> Key {
        match *self {
            KeyEvent::Pressed(key) | KeyEvent::Released(key) => key,
        }
    }

    pub fn is_escape_press(&self) -> bool {
        matches!(self, KeyEvent::Pressed(Key::Escape))
    }
}
