//! Readiness barrier.
//!
//! A counter of pending registrations plus a single-fire notification once it
//! reaches zero. `listen` waits here before binding so that every plugin
//! registered before the wait has finished adding its routes.
//!
//! Once fired the barrier is closed: further `enter` calls fail and every
//! later `wait` returns the same outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::error::Error;

#[derive(Debug, Clone, Default)]
pub struct ReadinessBarrier {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<BarrierState>,
    settled: Notify,
}

#[derive(Debug, Default)]
struct BarrierState {
    pending: usize,
    fired: bool,
    failure: Option<String>,
}

/// Marker returned by `enter`. Must be completed; dropping it counts as a failure.
#[derive(Debug)]
pub struct Pending {
    inner: Arc<Inner>,
    completed: bool,
}

impl ReadinessBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more unit of pending setup work.
    pub fn enter(&self) -> Option<Pending> {
        let mut state = self.inner.lock();
        if state.fired {
            return None;
        }
        state.pending += 1;
        Some(Pending {
            inner: Arc::clone(&self.inner),
            completed: false,
        })
    }

    pub fn is_fired(&self) -> bool {
        self.inner.lock().fired
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }

    /// Wait until all pending work has completed, then fire.
    pub async fn wait(&self) -> Result<(), Error> {
        // Give tasks spawned just before this call a chance to enter.
        tokio::task::yield_now().await;

        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if state.pending == 0 {
                    if !state.fired {
                        state.fired = true;
                        tracing::debug!("Readiness barrier fired");
                    }
                    return match &state.failure {
                        Some(reason) => Err(Error::Plugin(reason.clone())),
                        None => Ok(()),
                    };
                }
            }

            notified.await;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn leave(&self, failure: Option<String>) {
        let mut state = self.lock();
        if state.failure.is_none() {
            state.failure = failure;
        }
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.settled.notify_waiters();
        }
    }
}

impl Pending {
    pub fn complete<E: std::fmt::Display>(mut self, result: Result<(), E>) {
        self.completed = true;
        self.inner.leave(result.err().map(|e| e.to_string()));
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if !self.completed {
            self.inner
                .leave(Some("registration dropped before completing".to_string()));
        }
    }
}
