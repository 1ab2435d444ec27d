//! Shared session state

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

/// Phase of the controller session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    AwaitingConnection = 0,
    AwaitingHandshake = 1,
    Active = 2,
    Terminated = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::AwaitingConnection,
            1 => SessionState::AwaitingHandshake,
            2 => SessionState::Active,
            _ => SessionState::Terminated,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::AwaitingConnection => "awaiting-connection",
            SessionState::AwaitingHandshake => "awaiting-handshake",
            SessionState::Active => "active",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding the [`SessionState`]. `Terminated` is absorbing.
#[derive(Debug)]
pub struct SessionStateCell(AtomicU8);

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionState::AwaitingConnection as u8))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn is_active(&self) -> bool {
        self.get() == SessionState::Active
    }

    /// Move from `from` to `to`. Fails if another thread changed the state first.
    pub fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn terminate(&self) {
        self.0.store(SessionState::Terminated as u8, Ordering::SeqCst);
    }
}

/// One-shot abort flag whose waiters can be woken early
#[derive(Debug, Default)]
pub struct AbortSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.cond.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.raised.lock()
    }

    /// Sleep for up to `timeout`. Returns `true` if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            self.cond.wait_while_for(&mut raised, |r| !*r, timeout);
        }
        *raised
    }
}

/// Traffic counters for the session summary
#[derive(Debug, Default)]
pub struct SessionCounters {
    connect_attempts: AtomicU64,
    config_bytes: AtomicUsize,
    log_lines: AtomicU64,
    commands_sent: AtomicU64,
}

impl SessionCounters {
    pub fn record_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config(&self, bytes: usize) {
        self.config_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn record_log_line(&self) {
        self.log_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSummary {
        SessionSummary {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            config_bytes: self.config_bytes.load(Ordering::Relaxed),
            log_lines: self.log_lines.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub connect_attempts: u64,
    pub config_bytes: usize,
    pub log_lines: u64,
    pub commands_sent: u64,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} connect attempt(s), {} config bytes, {} log line(s), {} command(s) sent",
            self.connect_attempts, self.config_bytes, self.log_lines, self.commands_sent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_state_transitions() {
        let state = SessionStateCell::new();
        assert_eq!(state.get(), SessionState::AwaitingConnection);
        assert!(state.advance(SessionState::AwaitingConnection, SessionState::AwaitingHandshake));
        assert!(!state.advance(SessionState::AwaitingConnection, SessionState::Active));
        assert!(state.advance(SessionState::AwaitingHandshake, SessionState::Active));
        assert!(state.is_active());
    }

    #[test]
    fn test_terminated_blocks_activation() {
        let state = SessionStateCell::new();
        assert!(state.advance(SessionState::AwaitingConnection, SessionState::AwaitingHandshake));
        state.terminate();
        assert!(!state.advance(SessionState::AwaitingHandshake, SessionState::Active));
        assert_eq!(state.get(), SessionState::Terminated);
    }

    #[test]
    fn test_abort_wait_times_out() {
        let signal = AbortSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_abort_wakes_waiter() {
        let signal = Arc::new(AbortSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        signal.raise();
        assert!(waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(signal.is_raised());
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = SessionCounters::default();
        counters.record_attempt();
        counters.record_attempt();
        counters.record_config(12);
        counters.record_log_line();
        counters.record_command();
        counters.record_command();
        counters.record_command();
        assert_eq!(
            counters.snapshot(),
            SessionSummary {
                connect_attempts: 2,
                config_bytes: 12,
                log_lines: 1,
                commands_sent: 3,
            }
        );
    }
}
