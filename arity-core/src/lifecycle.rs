//! Call lifecycle: pending legs, per-call state and call handlers

use crate::completion::{completion, Completion, Resolver};
use crate::controller::CallController;
use crate::error::ArityError;
use crate::types::ChannelSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Channels created by the application that will announce themselves with
/// their own application-start event
///
/// Consuming an id is an atomic test-and-remove: the first start event for a
/// tracked id is claimed here and never reaches top-level dispatch; a second
/// one is a genuine new call.
#[derive(Default)]
pub struct PendingLegTracker {
    legs: Mutex<HashMap<String, Option<Resolver<CallState>>>>,
    closed: AtomicBool,
}

impl PendingLegTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect an application-start event for `channel_id`
    pub fn track_pending_leg(&self, channel_id: &str) {
        tracing::debug!(channel_id, "Tracking pending leg");
        let mut legs = self.legs.lock();
        if !self.closed.load(Ordering::Acquire) {
            legs.entry(channel_id.to_string()).or_insert(None);
        }
    }

    /// Track `channel_id` and get the leg's state once it starts
    ///
    /// After [`close`](Self::close) the returned completion resolves with
    /// [`ArityError::Abandoned`].
    pub fn await_application_start(&self, channel_id: &str) -> Completion<CallState> {
        let (resolver, done) = completion();
        let mut legs = self.legs.lock();
        if !self.closed.load(Ordering::Acquire) {
            legs.insert(channel_id.to_string(), Some(resolver));
        }
        done
    }

    /// Claim a tracked id
    ///
    /// Returns `None` if the id is not tracked, otherwise the start listener
    /// registered for it, if any.
    pub fn consume(&self, channel_id: &str) -> Option<Option<Resolver<CallState>>> {
        self.legs.lock().remove(channel_id)
    }

    /// Stop tracking an id whose channel will never start
    pub fn forget(&self, channel_id: &str) -> bool {
        self.legs.lock().remove(channel_id).is_some()
    }

    /// Whether `channel_id` is tracked
    #[must_use]
    pub fn is_pending(&self, channel_id: &str) -> bool {
        self.legs.lock().contains_key(channel_id)
    }

    /// Number of tracked ids
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.legs.lock().len()
    }

    /// Stop tracking every id and abandon the start listeners
    pub fn close(&self) {
        let dropped = {
            let mut legs = self.legs.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *legs)
        };
        tracing::debug!(dropped = dropped.len(), "Pending-leg tracker closed");
    }
}

impl std::fmt::Debug for PendingLegTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLegTracker")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// State of one call, owned by exactly one handler at a time
///
/// Not `Clone`: handing a call to the next handler moves its state.
pub struct CallState {
    channel: ChannelSnapshot,
    args: Vec<String>,
    created_at: DateTime<Utc>,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CallState {
    /// State for a channel that just entered the application
    #[must_use]
    pub fn new(channel: ChannelSnapshot, args: Vec<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            channel,
            args,
            created_at,
            data: HashMap::new(),
        }
    }

    /// Channel id
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel.id
    }

    /// Channel snapshot taken when the call started
    #[must_use]
    pub fn channel(&self) -> &ChannelSnapshot {
        &self.channel
    }

    /// Application arguments
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// When the call started
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Store a value, replacing any previous value under `key`
    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Borrow a stored value
    ///
    /// Returns `None` if the key is absent or holds a different type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Whether a value is stored under `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Take a stored value out
    ///
    /// A value of a different type is left in place.
    pub fn remove<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        if !self.data.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallState")
            .field("channel_id", &self.channel.id)
            .field("created_at", &self.created_at)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Application logic for one call
#[async_trait]
pub trait CallHandler: Send + 'static {
    /// Handle the call until done or handed off
    ///
    /// # Errors
    ///
    /// Returns error if the call logic fails
    async fn run(self: Box<Self>, call: CallController) -> Result<(), ArityError>;
}

/// [`CallHandler`] built from an async closure
pub struct FnHandler<F>(F);

/// Wrap an async closure as a [`CallHandler`]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: FnOnce(CallController) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ArityError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> CallHandler for FnHandler<F>
where
    F: FnOnce(CallController) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ArityError>> + Send + 'static,
{
    async fn run(self: Box<Self>, call: CallController) -> Result<(), ArityError> {
        (self.0)(call).await
    }
}
