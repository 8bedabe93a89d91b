//! Runtime service orchestration

use crate::controller::CallController;
use crate::dispatcher::EventDispatcher;
use crate::error::ArityError;
use crate::lifecycle::{CallHandler, CallState, PendingLegTracker};
use crate::registry::WaiterRegistry;
use crate::retry::{mappers, retry, RetryPolicy};
use crate::transport::{SwitchTransport, TransportError};
use crate::types::{new_id, ChannelSnapshot, HangupReason};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

type HandlerFactory = Arc<dyn Fn() -> Box<dyn CallHandler> + Send + Sync>;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArityConfig {
    /// Application name scoping the event subscription
    pub app_name: String,
    /// Retry policy for outbound requests
    pub retry: RetryPolicy,
    /// Ring timeout passed to the switch when dialing
    pub dial_timeout_secs: u32,
    /// Playback language when the channel does not report one
    pub default_language: String,
    /// Audio format for recordings
    pub default_record_format: String,
}

impl Default for ArityConfig {
    fn default() -> Self {
        Self {
            app_name: "arity".to_string(),
            retry: RetryPolicy::default(),
            dial_timeout_secs: 60,
            default_language: "en".to_string(),
            default_record_format: "slin".to_string(),
        }
    }
}

struct Inner {
    config: ArityConfig,
    transport: Arc<dyn SwitchTransport>,
    registry: Arc<WaiterRegistry>,
    lifecycle: Arc<PendingLegTracker>,
    dispatcher: Arc<EventDispatcher>,
    factory: RwLock<Option<HandlerFactory>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

/// The call-control runtime
///
/// Owns the waiter registry, the pending-leg tracker and the event
/// dispatcher. Cheap to clone; clones share the same runtime.
#[derive(Clone)]
pub struct Arity {
    inner: Arc<Inner>,
}

impl Arity {
    /// Start building a runtime over `transport`
    pub fn builder(transport: Arc<dyn SwitchTransport>) -> ArityBuilder {
        ArityBuilder::new(transport)
    }

    /// Subscribe to the application's events and start dispatching them
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::ConnectionFailed`] if the subscription fails
    #[tracing::instrument(skip(transport, config), fields(app = %config.app_name))]
    pub async fn connect(
        transport: Arc<dyn SwitchTransport>,
        config: ArityConfig,
    ) -> Result<Self, ArityError> {
        Self::builder(transport).with_config(config).connect().await
    }

    fn assemble(transport: Arc<dyn SwitchTransport>, config: ArityConfig) -> Self {
        let registry = Arc::new(WaiterRegistry::new());
        let lifecycle = Arc::new(PendingLegTracker::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
        ));
        let inner = Arc::new(Inner {
            config,
            transport,
            registry,
            lifecycle,
            dispatcher,
            factory: RwLock::new(None),
            dispatch_task: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.dispatcher.on_new_call(move |state| {
            if let Some(inner) = weak.upgrade() {
                Arity { inner }.start_call(state);
            }
        });
        Self { inner }
    }

    async fn start(&self) -> Result<(), ArityError> {
        let app_name = &self.inner.config.app_name;
        tracing::info!(app = %app_name, "Connecting to switch");

        let events = self
            .inner
            .transport
            .subscribe(app_name)
            .await
            .map_err(|e| ArityError::ConnectionFailed(e.to_string()))?;

        let dispatcher = Arc::clone(&self.inner.dispatcher);
        let task = tokio::spawn(dispatcher.run(events));
        if let Some(previous) = self.inner.dispatch_task.lock().replace(task) {
            previous.abort();
        }

        tracing::info!(app = %app_name, "Connected");
        Ok(())
    }

    fn start_call(&self, state: CallState) {
        let factory = self.inner.factory.read().clone();
        let Some(factory) = factory else {
            tracing::warn!(channel_id = %state.channel_id(), "No top-level handler registered, ignoring call");
            return;
        };

        let channel_id = state.channel_id().to_string();
        let handler = factory();
        let call = CallController::new(state, self.clone());
        tokio::spawn(async move {
            match handler.run(call).await {
                Ok(()) => tracing::debug!(channel_id = %channel_id, "Call handler finished"),
                Err(e) => tracing::warn!(channel_id = %channel_id, error = %e, "Call handler failed"),
            }
        });
    }

    /// Register the factory producing a handler for each new inbound call
    ///
    /// Replaces any previously registered factory.
    pub fn register_top_level_handler<F, H>(&self, factory: F)
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: CallHandler,
    {
        *self.inner.factory.write() = Some(Arc::new(move || Box::new(factory()) as Box<dyn CallHandler>));
    }

    /// Observe connection-level failures of the event stream
    pub fn on_transport_failure<F>(&self, observer: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_transport_failure(observer);
    }

    /// Stop dispatching events and drop every pending waiter
    ///
    /// Operations still awaiting events, and channels still awaiting their
    /// start event, resolve with [`ArityError::Abandoned`]. Operations run
    /// after shutdown resolve the same way.
    #[tracing::instrument(skip(self))]
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.dispatch_task.lock().take() {
            task.abort();
        }
        let dropped_waiters = self.inner.registry.len();
        let dropped_legs = self.inner.lifecycle.pending_count();
        self.inner.registry.close();
        self.inner.lifecycle.close();
        tracing::info!(dropped_waiters, dropped_legs, "Runtime shut down");
    }

    /// Whether the dispatch task is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .dispatch_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Channel management outside of a call
    #[must_use]
    pub fn channels(&self) -> Channels {
        Channels { arity: self.clone() }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &ArityConfig {
        &self.inner.config
    }

    /// Application name
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.inner.config.app_name
    }

    /// Retry policy for outbound requests
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.config.retry
    }

    /// Transport
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn SwitchTransport> {
        &self.inner.transport
    }

    /// Waiter registry
    #[must_use]
    pub fn registry(&self) -> &Arc<WaiterRegistry> {
        &self.inner.registry
    }

    /// Pending-leg tracker
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<PendingLegTracker> {
        &self.inner.lifecycle
    }

    /// Event dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }
}

impl std::fmt::Debug for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arity")
            .field("app_name", &self.inner.config.app_name)
            .field("registry", &self.inner.registry)
            .field("lifecycle", &self.inner.lifecycle)
            .finish()
    }
}

/// Builder for [`Arity`]
pub struct ArityBuilder {
    transport: Arc<dyn SwitchTransport>,
    config: ArityConfig,
    factory: Option<HandlerFactory>,
    failure_observer: Option<Box<dyn Fn(&TransportError) + Send + Sync>>,
}

impl ArityBuilder {
    /// Create new builder
    #[must_use]
    pub fn new(transport: Arc<dyn SwitchTransport>) -> Self {
        Self {
            transport,
            config: ArityConfig::default(),
            factory: None,
            failure_observer: None,
        }
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: ArityConfig) -> Self {
        self.config = config;
        self
    }

    /// Set application name
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = app_name.into();
        self
    }

    /// Set retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the top-level call handler factory
    ///
    /// Registering it here guarantees no call arrives before a handler exists.
    #[must_use]
    pub fn with_handler<F, H>(mut self, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: CallHandler,
    {
        self.factory = Some(Arc::new(move || Box::new(factory()) as Box<dyn CallHandler>));
        self
    }

    /// Set the observer of connection-level failures
    #[must_use]
    pub fn on_transport_failure<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.failure_observer = Some(Box::new(observer));
        self
    }

    /// Connect the runtime
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::ConnectionFailed`] if the subscription fails
    pub async fn connect(self) -> Result<Arity, ArityError> {
        let arity = Arity::assemble(self.transport, self.config);
        if let Some(factory) = self.factory {
            *arity.inner.factory.write() = Some(factory);
        }
        if let Some(observer) = self.failure_observer {
            arity.inner.dispatcher.on_transport_failure(observer);
        }
        arity.start().await?;
        Ok(arity)
    }
}

/// Channel management outside of a call
#[derive(Debug, Clone)]
pub struct Channels {
    arity: Arity,
}

impl Channels {
    /// Originate a channel to `endpoint` into the application
    ///
    /// The channel is tracked as a pending leg, so its start event does not
    /// become a new top-level call.
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::DialFailed`] if the switch refuses the channel
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, endpoint: &str) -> Result<ChannelSnapshot, ArityError> {
        let channel_id = new_id();
        let lifecycle = self.arity.lifecycle();
        lifecycle.track_pending_leg(&channel_id);

        let transport = self.arity.transport();
        let app_name = self.arity.app_name();
        let created = retry(
            self.arity.retry_policy(),
            || transport.create_channel(endpoint, app_name, &channel_id, None),
            mappers::dial,
        )
        .await;
        if created.is_err() {
            lifecycle.forget(&channel_id);
        }
        created
    }

    /// Hang up any channel
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::HangupFailed`] if the request fails
    #[tracing::instrument(skip(self))]
    pub async fn hangup(&self, channel_id: &str, reason: Option<HangupReason>) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.hangup(channel_id, reason),
            mappers::hangup,
        )
        .await
    }

    /// Create an external media channel relaying audio to `external_host`
    ///
    /// Resolves once the channel has entered the application, with a
    /// controller for it.
    ///
    /// # Errors
    ///
    /// Returns error if the channel cannot be created, or
    /// [`ArityError::Abandoned`] if the runtime shuts down first
    #[tracing::instrument(skip(self))]
    pub async fn external_media(
        &self,
        external_host: &str,
        encapsulation: &str,
        transport_kind: &str,
        format: &str,
    ) -> Result<CallController, ArityError> {
        let channel_id = new_id();
        let lifecycle = self.arity.lifecycle();
        let started = lifecycle.await_application_start(&channel_id);

        let transport = self.arity.transport();
        let app_name = self.arity.app_name();
        let created = retry(
            self.arity.retry_policy(),
            || {
                transport.external_media(
                    app_name,
                    &channel_id,
                    external_host,
                    encapsulation,
                    transport_kind,
                    format,
                )
            },
            mappers::none,
        )
        .await;
        if let Err(e) = created {
            lifecycle.forget(&channel_id);
            return Err(e);
        }

        let state = started.await?;
        tracing::info!(channel_id = %channel_id, "External media channel started");
        Ok(CallController::new(state, self.arity.clone()))
    }
}
