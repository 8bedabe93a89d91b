//! Waiter registry: correlation of inbound events with pending operations
//!
//! A [`Waiter`] is a predicate plus a continuation waiting for one kind of
//! [`ProtocolEvent`], optionally scoped to a channel, bridge or playback id.
//! The registry keeps waiters in registration order and, for each dispatched
//! event, fires the **first** waiter that accepts it.
//!
//! # Concurrency
//!
//! The waiter list sits behind a single lock. Selection and removal of the
//! firing waiter happen under that lock, so a one-time waiter can never fire
//! twice. Continuations run after the lock is released: a continuation may
//! register or unregister waiters (start the next operation of a call, say)
//! without deadlocking, and registrations racing a dispatch are either seen
//! whole by that dispatch or not at all.
//!
//! Matchers run under the lock and must be cheap and side-effect free.

use crate::completion::{completion, Completion};
use crate::event::{EventKind, ProtocolEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

type Matcher = Box<dyn Fn(&ProtocolEvent) -> bool + Send + Sync>;

/// How often a waiter may fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Fires once and is removed as it fires
    OneTime,
    /// Fires on every accepted event until unregistered
    Persistent,
}

enum Continuation {
    Once(Box<dyn FnOnce(&ProtocolEvent) + Send>),
    Persistent(Arc<dyn Fn(&ProtocolEvent) + Send + Sync>),
}

/// A pending event matcher
pub struct Waiter {
    kind: EventKind,
    scope: Option<String>,
    matcher: Option<Matcher>,
    continuation: Continuation,
}

impl Waiter {
    /// Waiter that fires once on the first accepted event
    pub fn once<F>(kind: EventKind, scope: Option<&str>, on_event: F) -> Self
    where
        F: FnOnce(&ProtocolEvent) + Send + 'static,
    {
        Self {
            kind,
            scope: scope.map(str::to_string),
            matcher: None,
            continuation: Continuation::Once(Box::new(on_event)),
        }
    }

    /// Waiter that fires on every accepted event until unregistered
    pub fn persistent<F>(kind: EventKind, scope: Option<&str>, on_event: F) -> Self
    where
        F: Fn(&ProtocolEvent) + Send + Sync + 'static,
    {
        Self {
            kind,
            scope: scope.map(str::to_string),
            matcher: None,
            continuation: Continuation::Persistent(Arc::new(on_event)),
        }
    }

    /// Narrow the waiter with an extra predicate
    #[must_use]
    pub fn matching<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ProtocolEvent) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Box::new(predicate));
        self
    }

    /// Kind of event awaited
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Scope id, if any
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether this waiter fires once or repeatedly
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        match self.continuation {
            Continuation::Once(_) => Cardinality::OneTime,
            Continuation::Persistent(_) => Cardinality::Persistent,
        }
    }

    fn accepts(&self, event: &ProtocolEvent) -> bool {
        self.kind == event.kind()
            && self.scope.as_deref().map_or(true, |scope| event.concerns(scope))
            && self.matcher.as_ref().map_or(true, |m| m(event))
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("cardinality", &self.cardinality())
            .finish()
    }
}

/// Handle for unregistering a waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterHandle(u64);

/// Concurrency-safe, ordered collection of pending waiters
///
/// Once [closed](Self::close) the registry drops every waiter, present and
/// future, and wakes everything awaiting [`closed`](Self::closed).
pub struct WaiterRegistry {
    next_id: AtomicU64,
    waiters: Mutex<Vec<(u64, Waiter)>>,
    closed: watch::Sender<bool>,
}

impl Default for WaiterRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            waiters: Mutex::new(Vec::new()),
            closed: watch::channel(false).0,
        }
    }
}

impl WaiterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waiter
    ///
    /// On a closed registry the waiter is dropped straight away.
    pub fn register(&self, waiter: Waiter) -> WaiterHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(waiter_id = id, kind = ?waiter.kind, scope = ?waiter.scope, "Registering waiter");
        let mut waiters = self.waiters.lock();
        if !self.is_closed() {
            waiters.push((id, waiter));
        }
        WaiterHandle(id)
    }

    /// Remove a waiter
    ///
    /// Returns `false` if it already fired (one-time) or was removed.
    pub fn unregister(&self, handle: WaiterHandle) -> bool {
        let mut waiters = self.waiters.lock();
        match waiters.iter().position(|(id, _)| *id == handle.0) {
            Some(pos) => {
                waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Offer an event to the registered waiters
    ///
    /// Fires the first waiter, in registration order, that accepts the event;
    /// one-time waiters are removed as they are selected. Returns whether any
    /// waiter fired. Unmatched events are dropped.
    pub fn dispatch(&self, event: &ProtocolEvent) -> bool {
        let fired = {
            let mut waiters = self.waiters.lock();
            let Some(pos) = waiters.iter().position(|(_, w)| w.accepts(event)) else {
                return false;
            };
            match waiters[pos].1.cardinality() {
                Cardinality::OneTime => {
                    let (id, waiter) = waiters.remove(pos);
                    (id, waiter.continuation)
                }
                Cardinality::Persistent => {
                    let (id, waiter) = &waiters[pos];
                    let continuation = match &waiter.continuation {
                        Continuation::Persistent(f) => Continuation::Persistent(Arc::clone(f)),
                        Continuation::Once(_) => return false,
                    };
                    (*id, continuation)
                }
            }
        };

        let (id, continuation) = fired;
        tracing::trace!(waiter_id = id, kind = ?event.kind(), "Waiter fired");
        match continuation {
            Continuation::Once(f) => f(event),
            Continuation::Persistent(f) => f(event),
        }
        true
    }

    /// Register a one-time waiter and get a future for the event that fires it
    pub fn wait_for(
        &self,
        kind: EventKind,
        scope: Option<&str>,
    ) -> (WaiterHandle, Completion<ProtocolEvent>) {
        self.wait_for_matching(kind, scope, |_| true)
    }

    /// Like [`wait_for`](Self::wait_for) with an extra predicate
    pub fn wait_for_matching<P>(
        &self,
        kind: EventKind,
        scope: Option<&str>,
        predicate: P,
    ) -> (WaiterHandle, Completion<ProtocolEvent>)
    where
        P: Fn(&ProtocolEvent) -> bool + Send + Sync + 'static,
    {
        let (resolver, done) = completion();
        let waiter = Waiter::once(kind, scope, move |event| {
            resolver.resolve(event.clone());
        })
        .matching(predicate);
        (self.register(waiter), done)
    }

    /// Number of pending waiters
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether no waiters are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    /// Drop every pending waiter
    pub fn clear(&self) {
        self.waiters.lock().clear();
    }

    /// Drop every pending waiter and refuse new ones
    pub fn close(&self) {
        let dropped = {
            let mut waiters = self.waiters.lock();
            self.closed.send_replace(true);
            std::mem::take(&mut *waiters)
        };
        tracing::debug!(dropped = dropped.len(), "Waiter registry closed");
    }

    /// Whether the registry was closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the registry is closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for WaiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaiterRegistry")
            .field("pending", &self.len())
            .finish()
    }
}
