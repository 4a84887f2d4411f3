//! Cooperative cancellation.
//!
//! A `CancelToken` is shared by everything one invocation does: retry
//! backoff, chunk workers and the status poller all sleep through it, so an
//! interrupt (or a failed sibling chunk) wakes them immediately instead of
//! after the full delay. Child tokens observe their parent but can be
//! cancelled on their own.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Longest single wait between checks of a parent token.
const PARENT_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Longest single condvar wait. Longer sleeps wait in several steps.
const MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct Flag {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<Flag>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(Flag::default()),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        let mut cancelled = self.flag.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.flag.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let own = *self.flag.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        own || self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    /// Sleep for `duration`, returning `Error::Cancelled` as soon as the token
    /// is cancelled. A duration past the end of the clock never elapses.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            let mut wait = match deadline {
                Some(deadline) if now >= deadline => return Ok(()),
                Some(deadline) => (deadline - now).min(MAX_WAIT),
                None => MAX_WAIT,
            };
            if self.parent.is_some() {
                wait = wait.min(PARENT_CHECK_INTERVAL);
            }
            let guard = self.flag.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
            if *guard {
                return Err(Error::Cancelled);
            }
            let _ = self
                .flag
                .wake
                .wait_timeout(guard, wait)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
