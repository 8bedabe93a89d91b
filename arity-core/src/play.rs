//! Repeatable media playback
//!
//! Each start request runs in its own task so it completes even when the
//! play is canceled meanwhile; cancel waits for the switch to acknowledge the
//! playback before stopping it.

use crate::error::ArityError;
use crate::event::{EventBody, EventKind};
use crate::operation::{Operation, OperationCore, OperationResult, OperationState, Outcome};
use crate::registry::WaiterHandle;
use crate::retry::{mappers, retry};
use crate::service::Arity;
use crate::types::{new_id, MediaSource, MediaTarget, Playback};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Result of a playback run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayReport {
    /// Number of playbacks that finished
    pub played: u32,
    /// The last finished playback
    pub last_playback: Option<Playback>,
}

#[derive(Debug, Default)]
struct PlayProgress {
    remaining: u32,
    played: u32,
    current: Option<(String, WaiterHandle)>,
    last_playback: Option<Playback>,
}

impl PlayProgress {
    fn report(&self) -> PlayReport {
        PlayReport {
            played: self.played,
            last_playback: self.last_playback.clone(),
        }
    }
}

/// Where the current playback's start request stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackStart {
    Requested,
    Acknowledged,
    Refused,
}

/// Plays one media source a number of times, one playback after the other
pub struct Play {
    core: Arc<OperationCore<PlayReport>>,
    arity: Arity,
    target: MediaTarget,
    source: MediaSource,
    language: String,
    progress: Mutex<PlayProgress>,
    start: Arc<watch::Sender<PlaybackStart>>,
}

impl Play {
    /// Play `source` once to `target`
    pub fn new(arity: Arity, target: MediaTarget, source: MediaSource) -> Self {
        let language = arity.config().default_language.clone();
        Self {
            core: Arc::new(OperationCore::new(target.id(), Arc::clone(arity.registry()))),
            arity,
            target,
            source,
            language,
            progress: Mutex::new(PlayProgress {
                remaining: 1,
                ..PlayProgress::default()
            }),
            start: Arc::new(watch::channel(PlaybackStart::Acknowledged).0),
        }
    }

    /// Play `times` times in sequence
    #[must_use]
    pub fn with_repeat(self, times: u32) -> Self {
        self.progress.lock().remaining = times;
        self
    }

    /// Playback language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Media being played
    #[must_use]
    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    /// Id of the playback in progress, if any
    #[must_use]
    pub fn current_playback_id(&self) -> Option<String> {
        self.progress.lock().current.as_ref().map(|(id, _)| id.clone())
    }

    async fn play_all(&self) -> OperationResult<PlayReport> {
        let media_uri = self.source.uri();

        loop {
            let (playback_id, finished) = {
                let mut progress = self.progress.lock();
                if progress.remaining == 0 {
                    break;
                }
                let playback_id = new_id();
                let (handle, finished) =
                    self.core.wait_for(EventKind::PlaybackFinished, Some(&playback_id));
                progress.current = Some((playback_id.clone(), handle));
                self.start.send_replace(PlaybackStart::Requested);
                (playback_id, finished)
            };

            tracing::debug!(playback_id = %playback_id, media = %media_uri, "Starting playback");
            let starting = tokio::spawn(start_playback(
                self.arity.clone(),
                self.target.clone(),
                self.source.clone(),
                self.language.clone(),
                playback_id,
                Arc::clone(&self.start),
            ));
            let started = match starting.await {
                Ok(started) => started,
                Err(e) => Err(ArityError::OperationFailed(e.to_string())),
            };
            if let Err(e) = started {
                if let Some((_, handle)) = self.progress.lock().current.take() {
                    self.core.unregister(handle);
                }
                return Err(e);
            }

            let event = finished.await?;
            let mut progress = self.progress.lock();
            progress.current = None;
            progress.remaining = progress.remaining.saturating_sub(1);
            progress.played += 1;
            if let EventBody::PlaybackFinished { playback } = event.body {
                progress.last_playback = Some(playback);
            }
        }

        let report = self.progress.lock().report();
        tracing::debug!(played = report.played, "Playback done");
        Ok(Outcome::Completed(report))
    }
}

#[async_trait]
impl Operation for Play {
    type Output = PlayReport;

    fn target_id(&self) -> &str {
        self.core.target_id()
    }

    fn state(&self) -> OperationState {
        self.core.state()
    }

    #[tracing::instrument(skip(self), fields(target = %self.target.uri(), media = %self.source))]
    async fn run(&self) -> OperationResult<PlayReport> {
        self.core.drive(self.play_all()).await
    }

    #[tracing::instrument(skip(self), fields(target = %self.target.uri(), media = %self.source))]
    async fn cancel(&self) -> Result<(), ArityError> {
        if !self.core.begin_cancel() {
            return Ok(());
        }
        let (report, current) = {
            let mut progress = self.progress.lock();
            progress.remaining = 0;
            (progress.report(), progress.current.take())
        };
        self.core.settle(Ok(Outcome::Canceled(report)));

        let Some((playback_id, handle)) = current else {
            return Ok(());
        };
        self.core.unregister(handle);

        let mut start = self.start.subscribe();
        let acknowledged = start
            .wait_for(|state| *state != PlaybackStart::Requested)
            .await
            .map(|state| *state == PlaybackStart::Acknowledged)
            .unwrap_or(false);
        if !acknowledged {
            return Ok(());
        }
        tracing::debug!(playback_id = %playback_id, "Stopping playback");
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.stop_playback(&playback_id),
            mappers::playback(self.source.name()),
        )
        .await
    }
}

/// Issue one start request and publish how it ended
async fn start_playback(
    arity: Arity,
    target: MediaTarget,
    source: MediaSource,
    language: String,
    playback_id: String,
    start: Arc<watch::Sender<PlaybackStart>>,
) -> Result<(), ArityError> {
    let transport = arity.transport();
    let media_uri = source.uri();
    let started = retry(
        arity.retry_policy(),
        || transport.play(&target, &media_uri, &language, &playback_id),
        mappers::playback(source.name()),
    )
    .await;
    start.send_replace(if started.is_ok() {
        PlaybackStart::Acknowledged
    } else {
        PlaybackStart::Refused
    });
    started.map(|_| ())
}

impl std::fmt::Debug for Play {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Play")
            .field("target", &self.target)
            .field("source", &self.source)
            .field("state", &self.core.state())
            .finish()
    }
}
