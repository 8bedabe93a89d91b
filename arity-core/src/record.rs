//! Recording a single channel

use crate::error::ArityError;
use crate::event::{EventBody, EventKind};
use crate::operation::{Operation, OperationCore, OperationResult, OperationState, Outcome};
use crate::retry::{mappers, retry};
use crate::service::Arity;
use crate::types::{LiveRecording, MediaTarget, RecordOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A finished (or stopped) channel recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingReport {
    /// The recording as last reported by the switch
    pub recording: LiveRecording,
    /// Time from the start request being accepted to the end of recording
    pub elapsed: Duration,
}

/// Records one channel until the switch finishes the recording
pub struct Record {
    core: Arc<OperationCore<RecordingReport>>,
    arity: Arity,
    channel_id: String,
    options: RecordOptions,
    started: Mutex<Option<(Instant, LiveRecording)>>,
}

impl Record {
    /// Record `channel_id` with `options`
    pub fn new(arity: Arity, channel_id: &str, options: RecordOptions) -> Self {
        Self {
            core: Arc::new(OperationCore::new(channel_id, Arc::clone(arity.registry()))),
            arity,
            channel_id: channel_id.to_string(),
            options,
            started: Mutex::new(None),
        }
    }

    /// Recording name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Recording options
    #[must_use]
    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    fn elapsed(&self) -> (Duration, Option<LiveRecording>) {
        match &*self.started.lock() {
            Some((at, recording)) => (at.elapsed(), Some(recording.clone())),
            None => (Duration::ZERO, None),
        }
    }

    async fn record(&self) -> OperationResult<RecordingReport> {
        let name = self.options.name.clone();
        let wanted = name.clone();
        let (_, finished) = self.core.wait_for_matching(
            EventKind::RecordingFinished,
            Some(&self.channel_id),
            move |event| event.recording_name() == Some(wanted.as_str()),
        );

        let transport = self.arity.transport();
        let target = MediaTarget::Channel(self.channel_id.clone());
        let recording = retry(
            self.arity.retry_policy(),
            || transport.record(&target, &self.options),
            mappers::recording(&name),
        )
        .await?;
        tracing::info!(recording = %name, "Recording started");
        *self.started.lock() = Some((Instant::now(), recording));

        let event = finished.await?;
        let (elapsed, _) = self.elapsed();
        let EventBody::RecordingFinished { recording } = event.body else {
            return Err(ArityError::RecordingFailed {
                name,
                message: "unexpected event".to_string(),
            });
        };
        tracing::info!(recording = %name, elapsed_ms = elapsed.as_millis() as u64, "Recording finished");
        Ok(Outcome::Completed(RecordingReport { recording, elapsed }))
    }
}

#[async_trait]
impl Operation for Record {
    type Output = RecordingReport;

    fn target_id(&self) -> &str {
        self.core.target_id()
    }

    fn state(&self) -> OperationState {
        self.core.state()
    }

    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id, recording = %self.options.name))]
    async fn run(&self) -> OperationResult<RecordingReport> {
        self.core.drive(self.record()).await
    }

    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id, recording = %self.options.name))]
    async fn cancel(&self) -> Result<(), ArityError> {
        if !self.core.begin_cancel() {
            return Ok(());
        }
        let (elapsed, started) = self.elapsed();
        let requested = started.is_some();
        let recording = started.unwrap_or_else(|| LiveRecording {
            name: self.options.name.clone(),
            format: self.options.format.clone(),
            target_uri: MediaTarget::Channel(self.channel_id.clone()).uri(),
            ..LiveRecording::default()
        });
        self.core
            .settle(Ok(Outcome::Canceled(RecordingReport { recording, elapsed })));

        if !requested {
            return Ok(());
        }
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.stop_recording(&self.options.name),
            mappers::recording(&self.options.name),
        )
        .await
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("channel_id", &self.channel_id)
            .field("name", &self.options.name)
            .field("state", &self.core.state())
            .finish()
    }
}
