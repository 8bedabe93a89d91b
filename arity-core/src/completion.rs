//! Exactly-once completion
//!
//! A [`Resolver`] and its [`Completion`] form a single-resolution channel. The
//! resolver may be cloned and handed to several racing paths (an event
//! continuation and a cancel call, say); the first `resolve` consumes the
//! underlying sender and wins, every later call is ignored and returns `false`.

use crate::error::ArityError;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Create a linked resolver/completion pair
#[must_use]
pub fn completion<T>() -> (Resolver<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Resolver {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        Completion { rx },
    )
}

/// Resolving side of a completion
pub struct Resolver<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Resolver<T> {
    /// Resolve with `value`
    ///
    /// Returns `true` if this call resolved the completion, `false` if it had
    /// already been resolved.
    pub fn resolve(&self, value: T) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            // A dropped receiver still counts as resolved: nobody can observe a second value.
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Whether the completion has been resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Awaiting side of a completion
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T, ArityError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| ArityError::Abandoned))
    }
}
