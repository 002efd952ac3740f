//! # Background Preparation
//!
//! Some work is too slow for a tick: reading and decoding a savegame, building
//! a scene's environment. A [`Preparation`] runs that work on a named worker
//! thread and hands the finished value back through a single-slot channel.
//!
//! ```text
//! simulation thread                     worker "prepare:GameScene"
//! ─────────────────                     ──────────────────────────
//! Preparation::spawn ─────────────────► build value in isolation
//! poll() → false                        ...
//! poll() → false                        tx.send(value)   ← single publish
//! poll() → true  ◄──────────────────────┘
//! take() → Some(value)
//! ```
//!
//! The worker never touches shared simulation state; the only thing crossing
//! threads is the finished value, and receiving it is what makes the worker's
//! writes visible to the simulation thread.
//!
//! Cancellation is cooperative: [`CancelToken::is_cancelled`] is a flag the
//! worker checks between steps. Dropping a `Preparation` cancels it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::error::{PersistenceError, Result};

/// Shared cancellation flag between a [`Preparation`] and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A value being built on a worker thread.
pub struct Preparation<T> {
    name: String,
    receiver: Receiver<T>,
    token: CancelToken,
    value: Option<T>,
    failed: bool,
}

impl<T: Send + 'static> Preparation<T> {
    /// Start `work` on a worker thread named after `name`.
    pub fn spawn<F>(name: impl Into<String>, work: F) -> Result<Self>
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let name = name.into();
        let (tx, receiver) = mpsc::sync_channel(1);
        let token = CancelToken::new();
        let worker_token = token.clone();

        std::thread::Builder::new()
            .name(format!("prepare:{name}"))
            .spawn(move || {
                let value = work(&worker_token);
                // Ignore send errors (preparation dropped or cancelled).
                let _ = tx.send(value);
            })
            .map_err(|e| {
                log::warn!("cannot start worker for '{name}': {e}");
                PersistenceError::PreparationFailed { name: name.clone() }
            })?;

        Ok(Self {
            name,
            receiver,
            token,
            value: None,
            failed: false,
        })
    }
}

impl<T> Preparation<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check for the published value without blocking. `Ok(true)` once the
    /// value is available, an error if the worker ended without publishing.
    pub fn poll(&mut self) -> Result<bool> {
        if self.value.is_some() {
            return Ok(true);
        }
        if self.failed {
            return Err(self.failure());
        }
        match self.receiver.try_recv() {
            Ok(value) => {
                self.value = Some(value);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => {
                self.failed = true;
                Err(self.failure())
            }
        }
    }

    pub fn is_ready(&mut self) -> bool {
        matches!(self.poll(), Ok(true))
    }

    /// Take the value if it has been published.
    pub fn take(&mut self) -> Option<T> {
        let _ = self.poll();
        self.value.take()
    }

    /// Block until the worker publishes, then take the value.
    pub fn wait(&mut self) -> Result<T> {
        if let Some(value) = self.value.take() {
            return Ok(value);
        }
        if self.failed {
            return Err(self.failure());
        }
        self.receiver.recv().map_err(|_| {
            self.failed = true;
            self.failure()
        })
    }

    /// Ask the worker to stop and discard whatever it produces.
    pub fn cancel(self) {
        log::debug!("cancelling preparation of '{}'", self.name);
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    fn failure(&self) -> crate::error::Error {
        PersistenceError::PreparationFailed {
            name: self.name.clone(),
        }
        .into()
    }
}

impl<T> Drop for Preparation<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn value_published_once_ready() {
        let (gate_tx, gate_rx) = channel::<()>();
        let mut prep = Preparation::spawn("numbers", move |_| {
            gate_rx.recv().ok();
            (1..=4).sum::<u32>()
        })
        .unwrap();

        assert!(!prep.is_ready());
        assert!(prep.take().is_none());
        gate_tx.send(()).unwrap();
        assert_eq!(prep.wait().unwrap(), 10);
    }

    #[test]
    fn take_after_poll() {
        let mut prep = Preparation::spawn("quick", |_| "done").unwrap();
        while !prep.is_ready() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(prep.take(), Some("done"));
        assert_eq!(prep.take(), None);
    }

    #[test]
    fn cancel_sets_worker_flag() {
        let (seen_tx, seen_rx) = channel();
        let (gate_tx, gate_rx) = channel::<()>();
        let prep = Preparation::spawn("slow", move |token: &CancelToken| {
            gate_rx.recv().ok();
            seen_tx.send(token.is_cancelled()).ok();
        })
        .unwrap();

        prep.cancel();
        gate_tx.send(()).unwrap();
        assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    }

    #[test]
    fn panicking_worker_reports_failure() {
        let mut prep = Preparation::<u32>::spawn("broken", |_| panic!("worker failed")).unwrap();
        let err = prep.wait().unwrap_err();
        assert_eq!(
            err.to_string(),
            "background preparation of 'broken' did not complete"
        );
    }
}
