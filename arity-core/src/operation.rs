//! Operation framework
//!
//! An operation is one asynchronous call-control action whose result is
//! driven partly by outbound requests and partly by correlated events. Its
//! result resolves exactly once, by completion, by failure, or by
//! cancellation; whichever path gets there first wins.
//!
//! State machine:
//!
//! ```text
//! Active ──────────────► Completed
//!   │
//!   └──► Canceling ────► Canceled
//! ```
//!
//! Concrete operations share an [`OperationCore`] by composition. The core
//! owns the completion, the state and the waiters the operation registered,
//! which are released when the operation finishes however it finishes.

use crate::completion::{completion, Completion, Resolver};
use crate::error::ArityError;
use crate::event::{EventKind, ProtocolEvent};
use crate::registry::{Waiter, WaiterHandle, WaiterRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Cancellation state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Running, or not yet started
    Active,
    /// Cancel requested, result not yet resolved
    Canceling,
    /// Resolved by cancellation
    Canceled,
    /// Resolved normally or by failure
    Completed,
}

impl OperationState {
    /// Whether the operation reached a terminal state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Completed)
    }
}

/// Successful result of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran to completion
    Completed(T),
    /// The operation was canceled; carries the partial result
    Canceled(T),
}

impl<T> Outcome<T> {
    /// Whether the operation was canceled
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// The carried value
    pub fn into_inner(self) -> T {
        match self {
            Self::Completed(v) | Self::Canceled(v) => v,
        }
    }

    /// Borrow the carried value
    pub fn value(&self) -> &T {
        match self {
            Self::Completed(v) | Self::Canceled(v) => v,
        }
    }
}

/// Result type every operation resolves with
pub type OperationResult<T> = Result<Outcome<T>, ArityError>;

/// A cancelable call-control action
///
/// `run` and `cancel` take `&self`: share the operation (e.g. in an `Arc`) to
/// cancel it from another task while it runs.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Value the operation produces
    type Output: Send;

    /// Id of the channel or bridge the operation acts on
    fn target_id(&self) -> &str;

    /// Current cancellation state
    fn state(&self) -> OperationState;

    /// Run the operation to its single result
    ///
    /// Returns immediately with [`Outcome::Canceled`] if it was canceled
    /// before being run.
    ///
    /// # Errors
    ///
    /// Returns the mapped request failure, or [`ArityError::InvalidState`] if
    /// the operation was already run
    async fn run(&self) -> OperationResult<Self::Output>;

    /// Stop the operation's side effect and resolve its result
    ///
    /// Idempotent: canceling while canceling, or after the result resolved,
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the stop request fails; the result is resolved anyway
    async fn cancel(&self) -> Result<(), ArityError>;
}

/// Shared state machine, completion and waiter bookkeeping of an operation
pub struct OperationCore<T> {
    target_id: String,
    registry: Arc<WaiterRegistry>,
    state: Mutex<OperationState>,
    resolver: Resolver<OperationResult<T>>,
    completion: Mutex<Option<Completion<OperationResult<T>>>>,
    waiters: Mutex<Vec<WaiterHandle>>,
}

impl<T: Send + 'static> OperationCore<T> {
    /// Create the core of an operation on `target_id`
    pub fn new(target_id: impl Into<String>, registry: Arc<WaiterRegistry>) -> Self {
        let (resolver, done) = completion();
        Self {
            target_id: target_id.into(),
            registry,
            state: Mutex::new(OperationState::Active),
            resolver,
            completion: Mutex::new(Some(done)),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Target id
    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> OperationState {
        *self.state.lock()
    }

    /// Whether cancel was requested
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(
            self.state(),
            OperationState::Canceling | OperationState::Canceled
        )
    }

    /// Move `Active` to `Canceling`
    ///
    /// Returns `false` if the operation is already canceling or finished, in
    /// which case the caller must not cancel again.
    pub fn begin_cancel(&self) -> bool {
        let mut state = self.state.lock();
        if *state == OperationState::Active {
            *state = OperationState::Canceling;
            true
        } else {
            false
        }
    }

    /// Resolve the result
    ///
    /// Returns `true` if this call resolved it; later calls are ignored.
    pub fn settle(&self, result: OperationResult<T>) -> bool {
        let terminal = match &result {
            Ok(Outcome::Canceled(_)) => OperationState::Canceled,
            _ => OperationState::Completed,
        };
        let mut state = self.state.lock();
        if self.resolver.resolve(result) {
            *state = terminal;
            true
        } else {
            false
        }
    }

    /// Register a waiter released when the operation finishes
    pub fn register(&self, waiter: Waiter) -> WaiterHandle {
        let handle = self.registry.register(waiter);
        self.waiters.lock().push(handle);
        handle
    }

    /// One-time wait for an event, released when the operation finishes
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
        let (handle, done) = self.registry.wait_for_matching(kind, scope, predicate);
        self.waiters.lock().push(handle);
        (handle, done)
    }

    /// Remove a waiter before the operation finishes
    pub fn unregister(&self, handle: WaiterHandle) -> bool {
        self.waiters.lock().retain(|h| *h != handle);
        self.registry.unregister(handle)
    }

    fn release_waiters(&self) {
        let handles = std::mem::take(&mut *self.waiters.lock());
        for handle in handles {
            self.registry.unregister(handle);
        }
    }

    /// Run `driver` against the result
    ///
    /// `driver` issues the operation's requests and may resolve the result
    /// itself by returning; event continuations and `cancel` resolve it via
    /// [`settle`](Self::settle). Whichever resolves first is returned and the
    /// driver is dropped. Closing the registry resolves it with
    /// [`ArityError::Abandoned`].
    ///
    /// # Errors
    ///
    /// Returns the resolved failure, [`ArityError::Abandoned`] if the runtime
    /// shut down first, or [`ArityError::InvalidState`] on a second run
    pub async fn drive<F>(&self, driver: F) -> OperationResult<T>
    where
        F: Future<Output = OperationResult<T>>,
    {
        let mut done = self
            .completion
            .lock()
            .take()
            .ok_or_else(|| ArityError::InvalidState("operation already run".to_string()))?;

        let result = tokio::select! {
            biased;
            resolved = &mut done => resolved.and_then(|r| r),
            () = self.registry.closed() => {
                tracing::debug!(target_id = %self.target_id, "Runtime closed, abandoning operation");
                self.settle(Err(ArityError::Abandoned));
                done.await.and_then(|r| r)
            }
            driven = driver => {
                self.settle(driven);
                done.await.and_then(|r| r)
            }
        };
        self.release_waiters();
        result
    }
}

impl<T> std::fmt::Debug for OperationCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCore")
            .field("target_id", &self.target_id)
            .field("state", &*self.state.lock())
            .field("waiters", &self.waiters.lock().len())
            .finish()
    }
}
