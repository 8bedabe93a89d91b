//! Event dispatcher
//!
//! Single consumer of the inbound event stream. Application-start events for
//! pending legs are claimed by the [`PendingLegTracker`]; start events for
//! unknown channels become new top-level calls; every other event, and every
//! new-call start event, is offered to the [`WaiterRegistry`]. A pending leg
//! whose end event arrives first is no longer tracked.

use crate::event::{EventBody, ProtocolEvent};
use crate::lifecycle::{CallState, PendingLegTracker};
use crate::registry::WaiterRegistry;
use crate::transport::{EventStream, TransportError};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;

type CallHook = Arc<dyn Fn(CallState) + Send + Sync>;
type FailureObserver = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Routes inbound events
pub struct EventDispatcher {
    registry: Arc<WaiterRegistry>,
    lifecycle: Arc<PendingLegTracker>,
    on_call: RwLock<Option<CallHook>>,
    on_failure: RwLock<Option<FailureObserver>>,
}

impl EventDispatcher {
    /// Create a dispatcher over a registry and a pending-leg tracker
    #[must_use]
    pub fn new(registry: Arc<WaiterRegistry>, lifecycle: Arc<PendingLegTracker>) -> Self {
        Self {
            registry,
            lifecycle,
            on_call: RwLock::new(None),
            on_failure: RwLock::new(None),
        }
    }

    /// Set the hook invoked with the state of each new top-level call
    pub fn on_new_call<F>(&self, hook: F)
    where
        F: Fn(CallState) + Send + Sync + 'static,
    {
        *self.on_call.write() = Some(Arc::new(hook));
    }

    /// Set the observer of connection-level failures
    pub fn on_transport_failure<F>(&self, observer: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        *self.on_failure.write() = Some(Arc::new(observer));
    }

    /// Route one event
    pub fn dispatch(&self, event: ProtocolEvent) {
        if let EventBody::ApplicationStart { channel, args } = &event.body {
            match self.lifecycle.consume(&channel.id) {
                Some(listener) => {
                    tracing::debug!(channel_id = %channel.id, "Pending leg started");
                    if let Some(listener) = listener {
                        listener.resolve(CallState::new(
                            channel.clone(),
                            args.clone(),
                            event.received_at,
                        ));
                    }
                    return;
                }
                None => {
                    let hook = self.on_call.read().clone();
                    match hook {
                        Some(hook) => {
                            tracing::info!(channel_id = %channel.id, "New call");
                            hook(CallState::new(channel.clone(), args.clone(), event.received_at));
                        }
                        None => {
                            tracing::warn!(channel_id = %channel.id, "New call with no handler registered");
                        }
                    }
                }
            }
        }

        if let EventBody::ApplicationEnd { channel } = &event.body {
            if self.lifecycle.forget(&channel.id) {
                tracing::debug!(channel_id = %channel.id, "Pending leg ended without starting");
            }
        }

        if !self.registry.dispatch(&event) {
            tracing::trace!(kind = ?event.kind(), "No waiter for event");
        }
    }

    /// Report a connection-level failure
    pub fn report_failure(&self, error: &TransportError) {
        let observer = self.on_failure.read().clone();
        match observer {
            Some(observer) => observer(error),
            None => tracing::warn!(error = %error, "Transport failure"),
        }
    }

    /// Consume `events` until the stream ends
    pub async fn run(self: Arc<Self>, mut events: EventStream) {
        tracing::debug!("Event dispatch started");
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.dispatch(event),
                Err(error) => self.report_failure(&error),
            }
        }
        tracing::info!("Event stream ended");
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
