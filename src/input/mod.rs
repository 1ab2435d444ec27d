//! Input module - keyboard events driving the remote

mod hotkey;
mod keys;

pub use hotkey::HotkeyListener;
pub use keys::{Key, KeyEvent};
