//! Global hotkey registration and key event delivery

use super::keys::{Key, KeyEvent};
use anyhow::{Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keys the remote listens to
const BINDINGS: [(Code, Key); 4] = [
    (Code::KeyW, Key::Char('w')),
    (Code::KeyA, Key::Char('a')),
    (Code::KeyD, Key::Char('d')),
    (Code::Escape, Key::Escape),
];

/// Listens for the remote's keys system-wide and forwards press/release events
pub struct HotkeyListener {
    /// Global hotkey manager from the crate (kept alive for hotkey registration)
    manager: GlobalHotKeyManager,
    /// Registered hotkeys
    hotkeys: Vec<HotKey>,
}

impl HotkeyListener {
    /// Register the bindings and start forwarding events to `key_tx`.
    ///
    /// Must be called on the thread that runs the platform event loop.
    pub fn new(key_tx: mpsc::UnboundedSender<KeyEvent>) -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;
        let mut hotkeys = Vec::new();
        let mut key_map = HashMap::new();

        for (code, key) in BINDINGS {
            let hotkey = HotKey::new(None, code);
            match manager.register(hotkey) {
                Ok(()) => {
                    key_map.insert(hotkey.id(), key);
                    hotkeys.push(hotkey);
                    debug!("Registered {:?} as {:?}", code, key);
                }
                Err(e) => {
                    warn!("Failed to register {:?}: {}", code, e);
                }
            }
        }

        if hotkeys.is_empty() {
            anyhow::bail!("No keys could be registered");
        }

        GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
            if let Some(event) = translate(&key_map, &event) {
                // Receiver gone means the session is over
                let _ = key_tx.send(event);
            }
        }));

        info!("Listening for {} key(s): w/a/d to drive, Esc to quit", hotkeys.len());
        Ok(Self { manager, hotkeys })
    }

    /// Stop delivering key events
    pub fn stop(&mut self) {
        GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>);
        if let Err(e) = self.manager.unregister_all(&self.hotkeys) {
            warn!("Failed to unregister hotkeys: {}", e);
        }
        self.hotkeys.clear();
        debug!("Hotkey listener stopped");
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        if !self.hotkeys.is_empty() {
            self.stop();
        }
    }
}

/// Convert a raw hotkey event into a [`KeyEvent`]
fn translate(key_map: &HashMap<u32, Key>, event: &GlobalHotKeyEvent) -> Option<KeyEvent> {
    let key = *key_map.get(&event.id)?;
    Some(match event.state {
        HotKeyState::Pressed => KeyEvent::Pressed(key),
        HotKeyState::Released => KeyEvent::Released(key),
    })
}
