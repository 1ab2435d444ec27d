//! Key events to motion commands
//!
//! Two encodings are supported:
//! - held: the held key's byte is resent every tick, silence means stop
//! - edge: one numeric state token per press/release transition

use crate::core::state::{SessionCounters, SessionStateCell};
use crate::input::{Key, KeyEvent};
use crate::link::commands::{build_held_byte, build_state_token};
use crate::link::{Link, LinkError, MotionCommand, RelayMode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// State shared by both relay encodings
struct RelayContext {
    link: Arc<dyn Link>,
    state: Arc<SessionStateCell>,
    counters: Arc<SessionCounters>,
}

impl RelayContext {
    fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.link.send(bytes)?;
        self.counters.record_command();
        Ok(())
    }
}

/// Held mode: a single "currently pressed" slot plus a periodic sender
pub struct HeldRelay {
    ctx: RelayContext,
    slot: Mutex<Option<MotionCommand>>,
}

impl HeldRelay {
    pub fn new(
        link: Arc<dyn Link>,
        state: Arc<SessionStateCell>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            ctx: RelayContext {
                link,
                state,
                counters,
            },
            slot: Mutex::new(None),
        }
    }

    pub fn press(&self, key: Key) {
        if let Some(command) = key.motion() {
            *self.slot.lock() = Some(command);
        }
    }

    /// Clears the slot only if `key` is the one currently held
    pub fn release(&self, key: Key) {
        if let Some(command) = key.motion() {
            let mut slot = self.slot.lock();
            if *slot == Some(command) {
                *slot = None;
            }
        }
    }

    pub fn current(&self) -> Option<MotionCommand> {
        *self.slot.lock()
    }

    /// Send the held command once. Returns whether a byte was sent.
    pub fn tick(&self) -> Result<bool, LinkError> {
        if !self.ctx.state.is_active() {
            return Ok(false);
        }
        match self.current().and_then(build_held_byte) {
            Some(byte) => {
                self.ctx.send(&byte)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tick every `interval` until the link closes or a send fails
    pub fn spawn_sender(self: &Arc<Self>, interval: Duration) -> std::io::Result<JoinHandle<()>> {
        let relay = Arc::clone(self);
        thread::Builder::new()
            .name("command-sender".into())
            .spawn(move || relay.run_sender(interval))
    }

    fn run_sender(&self, interval: Duration) {
        info!("Command sender started ({:?} interval)", interval);
        while !self.ctx.link.is_closed() {
            if let Err(e) = self.tick() {
                if !self.ctx.link.is_closed() {
                    warn!("Command sender stopped: {}", e);
                }
                break;
            }
            thread::sleep(interval);
        }
        info!("Command sender stopped");
    }
}

/// Edge mode: send a token on each transition, nothing in between
pub struct EdgeRelay {
    ctx: RelayContext,
    /// Last motion sent, `None` after a stop
    held: Mutex<Option<MotionCommand>>,
}

impl EdgeRelay {
    pub fn new(
        link: Arc<dyn Link>,
        state: Arc<SessionStateCell>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            ctx: RelayContext {
                link,
                state,
                counters,
            },
            held: Mutex::new(None),
        }
    }

    pub fn press(&self, key: Key) -> Result<(), LinkError> {
        let Some(command) = key.motion() else {
            return Ok(());
        };
        let mut held = self.held.lock();
        // Auto-repeat of the key already held is not a transition
        if *held == Some(command) {
            return Ok(());
        }
        self.ctx.send(&build_state_token(command))?;
        *held = Some(command);
        debug!("Sent {}", command);
        Ok(())
    }

    /// Sends stop when the released key is the one currently driving
    pub fn release(&self, key: Key) -> Result<(), LinkError> {
        let Some(command) = key.motion() else {
            return Ok(());
        };
        let mut held = self.held.lock();
        if *held != Some(command) {
            return Ok(());
        }
        self.ctx.send(&build_state_token(MotionCommand::Stop))?;
        *held = None;
        debug!("Sent {}", MotionCommand::Stop);
        Ok(())
    }
}

/// The configured relay
pub enum Relay {
    Held(Arc<HeldRelay>),
    Edge(EdgeRelay),
}

impl Relay {
    pub fn new(
        mode: RelayMode,
        link: Arc<dyn Link>,
        state: Arc<SessionStateCell>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        match mode {
            RelayMode::Held => Relay::Held(Arc::new(HeldRelay::new(link, state, counters))),
            RelayMode::Edge => Relay::Edge(EdgeRelay::new(link, state, counters)),
        }
    }

    pub fn mode(&self) -> RelayMode {
        match self {
            Relay::Held(_) => RelayMode::Held,
            Relay::Edge(_) => RelayMode::Edge,
        }
    }

    /// Apply a key event. Events are dropped unless the session is active.
    pub fn handle(&self, event: KeyEvent) -> Result<(), LinkError> {
        let state = match self {
            Relay::Held(relay) => &relay.ctx.state,
            Relay::Edge(relay) => &relay.ctx.state,
        };
        if !state.is_active() {
            debug!("Dropping {:?}, session is {}", event, state.get());
            return Ok(());
        }

        match (self, event) {
            (Relay::Held(relay), KeyEvent::Pressed(key)) => {
                relay.press(key);
                Ok(())
            }
            (Relay::Held(relay), KeyEvent::Released(key)) => {
                relay.release(key);
                Ok(())
            }
            (Relay::Edge(relay), KeyEvent::Pressed(key)) => relay.press(key),
            (Relay::Edge(relay), KeyEvent::Released(key)) => relay.release(key),
        }
    }
}
