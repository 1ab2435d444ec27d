//! Connection establishment with unbounded retry

use crate::core::error::SessionEnd;
use crate::core::state::{AbortSignal, SessionCounters};
use crate::link::{Dial, Link};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing of connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Timeout of a single attempt
    pub attempt_timeout: Duration,
    /// Pause after a failed attempt
    pub retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(2),
        }
    }
}

/// Dial until a connection succeeds or `abort` is raised.
///
/// There is no attempt limit: the robot may simply not be powered on yet.
/// The abort is honoured between attempts, and after an attempt that
/// succeeded while the abort was pending (that connection is closed unused).
pub fn connect_with_retry<D: Dial>(
    dialer: &mut D,
    policy: &RetryPolicy,
    abort: &AbortSignal,
    counters: &SessionCounters,
) -> Result<D::Link, SessionEnd> {
    let target = dialer.target();
    let mut attempt: u64 = 0;

    loop {
        if abort.is_raised() {
            info!("Connection to {} aborted after {} attempt(s)", target, attempt);
            return Err(SessionEnd::Aborted);
        }

        attempt += 1;
        counters.record_attempt();
        debug!("Connecting to {} (attempt {})", target, attempt);

        match dialer.dial(policy.attempt_timeout) {
            Ok(link) => {
                if abort.is_raised() {
                    link.close();
                    return Err(SessionEnd::Aborted);
                }
                info!("Connected to {} after {} attempt(s)", target, attempt);
                return Ok(link);
            }
            Err(e) => {
                warn!(
                    "Connection to {} failed: {}. Retrying in {:?}",
                    target, e, policy.retry_interval
                );
                if abort.wait_timeout(policy.retry_interval) {
                    info!("Connection to {} aborted after {} attempt(s)", target, attempt);
                    return Err(SessionEnd::Aborted);
                }
            }
        }
    }
}
