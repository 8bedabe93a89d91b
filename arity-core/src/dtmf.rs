//! DTMF input collection

use crate::error::ArityError;
use crate::event::{EventBody, EventKind};
use crate::operation::{Operation, OperationCore, OperationResult, OperationState, Outcome};
use crate::registry::Waiter;
use crate::service::Arity;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Collects digits pressed on a channel
///
/// Finishes when the terminating key is pressed (not included in the input)
/// or when `max_digits` digits were collected, whichever comes first.
pub struct ReceiveDtmf {
    core: Arc<OperationCore<String>>,
    channel_id: String,
    terminator: Option<char>,
    max_digits: usize,
    digits: Arc<Mutex<String>>,
}

impl ReceiveDtmf {
    /// Collect one digit, or stop at `#`
    pub fn new(arity: Arity, channel_id: &str) -> Self {
        Self {
            core: Arc::new(OperationCore::new(channel_id, Arc::clone(arity.registry()))),
            channel_id: channel_id.to_string(),
            terminator: Some('#'),
            max_digits: 1,
            digits: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Stop at `key`, or never stop on a key with `None`
    #[must_use]
    pub fn with_terminator(mut self, key: Option<char>) -> Self {
        self.terminator = key;
        self
    }

    /// Stop after `count` digits
    #[must_use]
    pub fn with_max_digits(mut self, count: usize) -> Self {
        self.max_digits = count.max(1);
        self
    }

    /// Digits collected so far
    #[must_use]
    pub fn digits(&self) -> String {
        self.digits.lock().clone()
    }

    async fn collect(&self) -> OperationResult<String> {
        let core = Arc::clone(&self.core);
        let digits = Arc::clone(&self.digits);
        let terminator = self.terminator;
        let max_digits = self.max_digits;

        self.core.register(Waiter::persistent(
            EventKind::DtmfReceived,
            Some(&self.channel_id),
            move |event| {
                let EventBody::DtmfReceived { digit, .. } = &event.body else {
                    return;
                };
                if core.state().is_terminal() {
                    return;
                }
                let input = {
                    let mut collected = digits.lock();
                    let terminated = terminator.is_some_and(|t| digit.starts_with(t));
                    if !terminated {
                        collected.push_str(digit);
                    }
                    if !terminated && collected.chars().count() < max_digits {
                        return;
                    }
                    collected.clone()
                };
                tracing::debug!(input = %input, "DTMF input complete");
                core.settle(Ok(Outcome::Completed(input)));
            },
        ));

        futures::future::pending().await
    }
}

#[async_trait]
impl Operation for ReceiveDtmf {
    type Output = String;

    fn target_id(&self) -> &str {
        self.core.target_id()
    }

    fn state(&self) -> OperationState {
        self.core.state()
    }

    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id))]
    async fn run(&self) -> OperationResult<String> {
        self.core.drive(self.collect()).await
    }

    async fn cancel(&self) -> Result<(), ArityError> {
        if self.core.begin_cancel() {
            let partial = self.digits();
            self.core.settle(Ok(Outcome::Canceled(partial)));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReceiveDtmf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveDtmf")
            .field("channel_id", &self.channel_id)
            .field("terminator", &self.terminator)
            .field("max_digits", &self.max_digits)
            .field("state", &self.core.state())
            .finish()
    }
}
