//! Application event definitions

use std::sync::Arc;
use tokio::sync::mpsc;

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Wrapper around `mpsc::UnboundedSender<AppEvent>` that can also wake the
/// platform event loop after every send, so the loop can sleep in
/// `ControlFlow::Wait` without missing session events.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AppEvent>,
    waker: Option<Waker>,
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("closed", &self.tx.is_closed())
            .field("waker", &self.waker.is_some())
            .finish()
    }
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx, waker: None }
    }

    /// Call `waker` after every event is queued
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    pub fn send(&self, event: AppEvent) -> Result<(), mpsc::error::SendError<AppEvent>> {
        let result = self.tx.send(event);
        if let Some(waker) = &self.waker {
            waker();
        }
        result
    }
}

/// Events emitted by the session to whoever drives the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Connection attempts started
    Connecting { target: String },

    /// Connection established
    Connected { target: String },

    /// Configuration frame transmitted
    ConfigUploaded { bytes: usize },

    /// Configuration payload could not be read
    ConfigMissing { source: String },

    /// Controller sent its GO line
    Ready,

    /// A line of controller output
    ControllerLog(String),

    /// Session is over; `exit_code` follows the session end taxonomy
    SessionEnded { exit_code: i32, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_send_wakes_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let wakes = Arc::new(AtomicUsize::new(0));
        let sender = {
            let wakes = Arc::clone(&wakes);
            EventSender::new(tx).with_waker(move || {
                wakes.fetch_add(1, Ordering::SeqCst);
            })
        };

        sender.send(AppEvent::Ready).unwrap();
        sender.send(AppEvent::ControllerLog("hi".into())).unwrap();

        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert_eq!(rx.try_recv().unwrap(), AppEvent::Ready);
        assert_eq!(rx.try_recv().unwrap(), AppEvent::ControllerLog("hi".into()));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(AppEvent::Ready).is_err());
    }
}
