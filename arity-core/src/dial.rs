//! Two-leg outbound dial
//!
//! A dial originates a callee leg on behalf of a caller channel and follows
//! it until one of the two legs hangs up:
//!
//! ```text
//! Dialing ──► Ringing ──► Answered ──► Ended
//!                │
//!                └──────► Failed / Canceled ──► Ended
//! ```
//!
//! The callee leg is registered as a pending leg before it is created, so
//! its own application-start event never becomes a new top-level call.
//!
//! Origination runs in its own task. Once the create request is sent it
//! completes even if the dial is canceled meanwhile, and releasing the callee
//! waits for its answer: a leg the switch created is always hung up.

use crate::error::ArityError;
use crate::event::{EventBody, EventKind};
use crate::operation::{Operation, OperationCore, OperationResult, OperationState, Outcome};
use crate::registry::Waiter;
use crate::retry::{mappers, retry};
use crate::service::Arity;
use crate::types::{new_id, DialStatus, HangupReason};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Which side ended a dial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndedBy {
    /// The caller hung up (abandoned the call)
    Caller,
    /// The callee hung up
    Callee,
    /// The dial was canceled
    Canceled,
}

/// Result of a dial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialReport {
    /// Id of the callee leg
    pub callee_channel_id: String,
    /// Last classified dial status
    pub dial_status: DialStatus,
    /// Last raw dial status reported by the switch
    pub raw_status: String,
    /// Time from dial start to end of call, if the callee answered
    pub call_duration: Option<Duration>,
    /// Time from answer to end of call, if the callee answered
    pub media_duration: Option<Duration>,
    /// Which side ended the dial
    pub ended_by: EndedBy,
}

impl DialReport {
    /// Whether the callee answered
    #[must_use]
    pub fn answered(&self) -> bool {
        self.media_duration.is_some()
    }
}

#[derive(Debug, Default)]
struct DialProgress {
    status: Option<DialStatus>,
    raw_status: String,
    dial_start: Option<Instant>,
    answered_at: Option<Instant>,
    canceled: bool,
}

/// Where the callee leg's create request stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origination {
    NotRequested,
    InFlight,
    Created,
    Refused,
}

impl DialProgress {
    fn report(&self, callee_channel_id: &str, ended_by: EndedBy) -> DialReport {
        let now = Instant::now();
        let (call_duration, media_duration) = match self.answered_at {
            Some(answered_at) => (
                self.dial_start.map(|start| now.saturating_duration_since(start)),
                Some(now.saturating_duration_since(answered_at)),
            ),
            None => (None, None),
        };
        DialReport {
            callee_channel_id: callee_channel_id.to_string(),
            dial_status: self.status.unwrap_or(DialStatus::Unknown),
            raw_status: self.raw_status.clone(),
            call_duration,
            media_duration,
            ended_by,
        }
    }
}

/// Outbound dial operation
pub struct Dial {
    core: Arc<OperationCore<DialReport>>,
    arity: Arity,
    caller_channel_id: String,
    callee_channel_id: String,
    endpoint: String,
    caller_id: Option<String>,
    progress: Arc<Mutex<DialProgress>>,
    origination: Arc<watch::Sender<Origination>>,
}

impl Dial {
    /// Dial `endpoint` on behalf of `caller_channel_id`
    pub fn new(arity: Arity, caller_channel_id: &str, endpoint: &str) -> Self {
        Self {
            core: Arc::new(OperationCore::new(
                caller_channel_id,
                Arc::clone(arity.registry()),
            )),
            arity,
            caller_channel_id: caller_channel_id.to_string(),
            callee_channel_id: new_id(),
            endpoint: endpoint.to_string(),
            caller_id: None,
            progress: Arc::new(Mutex::new(DialProgress::default())),
            origination: Arc::new(watch::channel(Origination::NotRequested).0),
        }
    }

    /// Present `caller_id` to the callee
    #[must_use]
    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    /// Id the callee leg is created with
    #[must_use]
    pub fn callee_channel_id(&self) -> &str {
        &self.callee_channel_id
    }

    /// Endpoint being dialed
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Last classified dial status
    #[must_use]
    pub fn dial_status(&self) -> DialStatus {
        self.progress.lock().status.unwrap_or(DialStatus::Unknown)
    }

    fn watch_dial_status(&self) {
        let progress = Arc::clone(&self.progress);
        self.core.register(Waiter::persistent(
            EventKind::DialResult,
            Some(&self.callee_channel_id),
            move |event| {
                let EventBody::DialResult { dialstatus, .. } = &event.body else {
                    return;
                };
                let status = DialStatus::from_wire(dialstatus);
                tracing::debug!(dial_status = %dialstatus, "Dial progress");
                let mut progress = progress.lock();
                if status == DialStatus::Answered && progress.answered_at.is_none() {
                    progress.answered_at = Some(Instant::now());
                }
                if status != DialStatus::Unknown {
                    progress.status = Some(status);
                }
                progress.raw_status.clone_from(dialstatus);
            },
        ));
    }

    fn watch_hangups(&self) {
        let core = Arc::clone(&self.core);
        let progress = Arc::clone(&self.progress);
        let origination = Arc::clone(&self.origination);
        let arity = self.arity.clone();
        let caller = self.caller_channel_id.clone();
        let callee = self.callee_channel_id.clone();
        let legs = [caller.clone(), callee.clone()];

        let waiter = Waiter::once(EventKind::ChannelHangupRequest, None, move |event| {
            if event.channel_id() == Some(caller.as_str()) {
                let report = {
                    let mut progress = progress.lock();
                    if progress.canceled {
                        return;
                    }
                    progress.canceled = true;
                    progress.report(&callee, EndedBy::Caller)
                };
                tracing::info!(channel_id = %caller, callee = %callee, "Caller abandoned dial");
                core.settle(Ok(Outcome::Completed(report)));

                tokio::spawn(async move {
                    if let Err(e) = release_callee(&arity, &origination, &callee).await {
                        tracing::warn!(callee = %callee, error = %e, "Failed to hang up callee");
                    }
                });
            } else {
                // Events arrive in order: a start for this leg was already consumed
                arity.lifecycle().forget(&callee);
                let report = progress.lock().report(&callee, EndedBy::Callee);
                tracing::info!(
                    callee = %callee,
                    answered = report.answered(),
                    call_ms = report.call_duration.map(|d| d.as_millis() as u64),
                    "Callee hung up"
                );
                core.settle(Ok(Outcome::Completed(report)));
            }
        })
        .matching(move |event| {
            event
                .channel_id()
                .is_some_and(|id| legs.iter().any(|leg| leg == id))
        });
        self.core.register(waiter);
    }

    async fn place_call(&self) -> OperationResult<DialReport> {
        let lifecycle = self.arity.lifecycle();
        let canceled = {
            let progress = self.progress.lock();
            if !progress.canceled {
                lifecycle.track_pending_leg(&self.callee_channel_id);
                self.origination.send_replace(Origination::InFlight);
            }
            progress.canceled
        };
        if canceled {
            return futures::future::pending().await;
        }
        self.watch_dial_status();
        self.watch_hangups();

        let originating = tokio::spawn(originate(
            self.arity.clone(),
            self.endpoint.clone(),
            self.callee_channel_id.clone(),
            self.caller_id.clone(),
            Arc::clone(&self.origination),
        ));
        let requested = match originating.await {
            Ok(created) => created,
            Err(e) => Err(ArityError::OperationFailed(e.to_string())),
        };

        let requested = match requested {
            Ok(()) => {
                self.progress.lock().dial_start = Some(Instant::now());
                let transport = self.arity.transport();
                let timeout = self.arity.config().dial_timeout_secs;
                retry(
                    self.arity.retry_policy(),
                    || transport.dial(&self.callee_channel_id, Some(&self.caller_channel_id), timeout),
                    mappers::dial,
                )
                .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = requested {
            tracing::warn!(callee = %self.callee_channel_id, error = %e, "Dial failed");
            lifecycle.forget(&self.callee_channel_id);
            return Err(e);
        }
        tracing::info!(callee = %self.callee_channel_id, "Dialing");

        futures::future::pending().await
    }
}

/// Create the callee leg and publish how the request ended
async fn originate(
    arity: Arity,
    endpoint: String,
    callee: String,
    caller_id: Option<String>,
    origination: Arc<watch::Sender<Origination>>,
) -> Result<(), ArityError> {
    let transport = arity.transport();
    let created = retry(
        arity.retry_policy(),
        || transport.create_channel(&endpoint, arity.app_name(), &callee, caller_id.as_deref()),
        mappers::dial,
    )
    .await;
    origination.send_replace(if created.is_ok() {
        Origination::Created
    } else {
        Origination::Refused
    });
    created.map(|_| ())
}

/// Hang up the callee leg once its create request has been answered
///
/// A leg the switch never created is only untracked. A created leg stays
/// tracked until its start or end event, so a late start is still consumed.
async fn release_callee(
    arity: &Arity,
    origination: &watch::Sender<Origination>,
    callee: &str,
) -> Result<(), ArityError> {
    let mut answered = origination.subscribe();
    let state = answered
        .wait_for(|state| *state != Origination::InFlight)
        .await
        .map(|state| *state)
        .unwrap_or(Origination::Refused);
    if state != Origination::Created {
        arity.lifecycle().forget(callee);
        return Ok(());
    }

    let transport = arity.transport();
    let hangup = retry(
        arity.retry_policy(),
        || transport.hangup(callee, Some(HangupReason::Normal)),
        mappers::hangup,
    )
    .await;
    match hangup {
        Err(ArityError::HangupFailed(message)) => {
            tracing::debug!(callee, %message, "Callee already gone");
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl Operation for Dial {
    type Output = DialReport;

    fn target_id(&self) -> &str {
        self.core.target_id()
    }

    fn state(&self) -> OperationState {
        self.core.state()
    }

    #[tracing::instrument(skip(self), fields(channel_id = %self.caller_channel_id, endpoint = %self.endpoint))]
    async fn run(&self) -> OperationResult<DialReport> {
        self.core.drive(self.place_call()).await
    }

    #[tracing::instrument(skip(self), fields(callee = %self.callee_channel_id))]
    async fn cancel(&self) -> Result<(), ArityError> {
        if !self.core.begin_cancel() {
            return Ok(());
        }
        let report = {
            let mut progress = self.progress.lock();
            progress.canceled = true;
            progress.report(&self.callee_channel_id, EndedBy::Canceled)
        };
        self.core.settle(Ok(Outcome::Canceled(report)));
        tracing::info!("Dial canceled");

        release_callee(&self.arity, &self.origination, &self.callee_channel_id).await
    }
}

impl std::fmt::Debug for Dial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dial")
            .field("caller", &self.caller_channel_id)
            .field("callee", &self.callee_channel_id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.core.state())
            .finish()
    }
}
