//! Bridge management and bridge recordings

use crate::error::ArityError;
use crate::event::{EventBody, EventKind};
use crate::play::Play;
use crate::record::RecordingReport;
use crate::retry::{mappers, retry};
use crate::service::Arity;
use crate::types::{new_id, BridgeSnapshot, IfExists, MediaSource, MediaTarget, RecordOptions, TerminateOn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

const BRIDGE_TYPE: &str = "mixing";
const MEMBER_ROLE: &str = "member";

/// One mixing bridge and the recordings made of it
///
/// Membership changes can wait for the switch's confirming entered/left
/// event: with `confirm` set, the call returns only once both the request
/// succeeded and the event arrived, in either order.
pub struct BridgeOperations {
    arity: Arity,
    bridge_id: String,
    name: String,
    record_template: RecordOptions,
    recordings: Mutex<HashMap<String, RecordingReport>>,
}

impl BridgeOperations {
    /// Manager for a new bridge with a fresh id
    #[must_use]
    pub fn new(arity: Arity) -> Self {
        Self::existing(arity, &new_id())
    }

    /// Manager for the bridge `bridge_id`
    #[must_use]
    pub fn existing(arity: Arity, bridge_id: &str) -> Self {
        let record_template = RecordOptions::default()
            .with_format(arity.config().default_record_format.clone())
            .with_max_duration(0)
            .with_max_silence(0)
            .with_if_exists(IfExists::Overwrite)
            .with_beep(false)
            .with_terminate_on(TerminateOn::Hash);
        Self {
            name: arity.app_name().to_string(),
            arity,
            bridge_id: bridge_id.to_string(),
            record_template,
            recordings: Mutex::new(HashMap::new()),
        }
    }

    /// Name given to the bridge on creation
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Options applied to every recording of this bridge; the name is set per recording
    #[must_use]
    pub fn with_record_options(mut self, options: RecordOptions) -> Self {
        self.record_template = options;
        self
    }

    /// Bridge id
    #[must_use]
    pub fn bridge_id(&self) -> &str {
        &self.bridge_id
    }

    /// Create the bridge
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    #[tracing::instrument(skip(self), fields(bridge_id = %self.bridge_id))]
    pub async fn create(&self) -> Result<BridgeSnapshot, ArityError> {
        let transport = self.arity.transport();
        let bridge = retry(
            self.arity.retry_policy(),
            || transport.create_bridge(&self.bridge_id, BRIDGE_TYPE, &self.name),
            mappers::bridge,
        )
        .await?;
        tracing::info!("Bridge created");
        Ok(bridge)
    }

    /// Destroy the bridge and forget its recordings
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::BridgeNotFound`] if the bridge does not exist
    #[tracing::instrument(skip(self), fields(bridge_id = %self.bridge_id))]
    pub async fn destroy(&self) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.destroy_bridge(&self.bridge_id),
            mappers::bridge,
        )
        .await?;
        self.recordings.lock().clear();
        tracing::info!("Bridge destroyed");
        Ok(())
    }

    /// Fetch the bridge
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::BridgeNotFound`] if the bridge does not exist
    pub async fn get(&self) -> Result<BridgeSnapshot, ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.get_bridge(&self.bridge_id),
            mappers::bridge,
        )
        .await
    }

    /// Ids of the channels in the bridge
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::BridgeNotFound`] if the bridge does not exist
    pub async fn channels(&self) -> Result<Vec<String>, ArityError> {
        Ok(self.get().await?.channels)
    }

    /// Add a channel to the bridge
    ///
    /// # Errors
    ///
    /// Returns the mapped bridge error if the request fails
    #[tracing::instrument(skip(self), fields(bridge_id = %self.bridge_id))]
    pub async fn add_channel(&self, channel_id: &str, confirm: bool) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        self.change_membership(EventKind::ChannelEnteredBridge, channel_id, confirm, || {
            transport.add_channel_to_bridge(&self.bridge_id, channel_id, MEMBER_ROLE)
        })
        .await?;
        tracing::info!(channel_id, "Channel added to bridge");
        Ok(())
    }

    /// Remove a channel from the bridge
    ///
    /// # Errors
    ///
    /// Returns the mapped bridge error if the request fails
    #[tracing::instrument(skip(self), fields(bridge_id = %self.bridge_id))]
    pub async fn remove_channel(&self, channel_id: &str, confirm: bool) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        self.change_membership(EventKind::ChannelLeftBridge, channel_id, confirm, || {
            transport.remove_channel_from_bridge(&self.bridge_id, channel_id)
        })
        .await?;
        tracing::info!(channel_id, "Channel removed from bridge");
        Ok(())
    }

    async fn change_membership<F, Fut>(
        &self,
        confirmation: EventKind,
        channel_id: &str,
        confirm: bool,
        request: F,
    ) -> Result<(), ArityError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), crate::transport::TransportError>>,
    {
        let registry = self.arity.registry();
        let confirmed = confirm.then(|| {
            let member = channel_id.to_string();
            registry.wait_for_matching(confirmation, Some(&self.bridge_id), move |event| {
                event.channel_id() == Some(member.as_str())
            })
        });

        if let Err(e) = retry(self.arity.retry_policy(), request, mappers::bridge).await {
            if let Some((handle, _)) = confirmed {
                registry.unregister(handle);
            }
            return Err(e);
        }
        if let Some((_, done)) = confirmed {
            done.await?;
        }
        Ok(())
    }

    /// Playback of a sound into the bridge
    #[must_use]
    pub fn play(&self, sound: &str) -> Play {
        Play::new(
            self.arity.clone(),
            MediaTarget::Bridge(self.bridge_id.clone()),
            MediaSource::Sound(sound.to_string()),
        )
    }

    /// Start music on hold; `None` uses the switch's default class
    ///
    /// # Errors
    ///
    /// Returns the mapped bridge error if the request fails
    pub async fn start_music_on_hold(&self, class: Option<&str>) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        let class = class.unwrap_or("default");
        retry(
            self.arity.retry_policy(),
            || transport.start_moh(&self.bridge_id, class),
            mappers::bridge,
        )
        .await
    }

    /// Stop music on hold
    ///
    /// # Errors
    ///
    /// Returns the mapped bridge error if the request fails
    pub async fn stop_music_on_hold(&self) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.stop_moh(&self.bridge_id),
            mappers::bridge,
        )
        .await
    }

    /// Record the bridge until the switch finishes the recording
    ///
    /// The finished recording is stored under its name.
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::RecordingFailed`] if the recording cannot start
    #[tracing::instrument(skip(self), fields(bridge_id = %self.bridge_id))]
    pub async fn record(&self, name: &str) -> Result<RecordingReport, ArityError> {
        let options = self.record_template.clone().with_name(name);
        let registry = self.arity.registry();
        let wanted = name.to_string();
        let (handle, finished) = registry.wait_for_matching(
            EventKind::RecordingFinished,
            Some(&self.bridge_id),
            move |event| event.recording_name() == Some(wanted.as_str()),
        );

        let transport = self.arity.transport();
        let target = MediaTarget::Bridge(self.bridge_id.clone());
        let started_at = Instant::now();
        let started = retry(
            self.arity.retry_policy(),
            || transport.record(&target, &options),
            mappers::recording(name),
        )
        .await;
        if let Err(e) = started {
            registry.unregister(handle);
            return Err(e);
        }
        tracing::info!(recording = name, "Bridge recording started");

        let event = finished.await?;
        let elapsed = started_at.elapsed();
        let EventBody::RecordingFinished { mut recording } = event.body else {
            return Err(ArityError::RecordingFailed {
                name: name.to_string(),
                message: "unexpected event".to_string(),
            });
        };
        // The measured time replaces whatever the switch reported
        recording.duration = Some(elapsed.as_secs());

        let report = RecordingReport { recording, elapsed };
        self.recordings
            .lock()
            .insert(name.to_string(), report.clone());
        tracing::info!(recording = name, elapsed_ms = elapsed.as_millis() as u64, "Bridge recording finished");
        Ok(report)
    }

    /// Stop a live recording of the bridge
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::RecordingFailed`] if the request fails
    pub async fn stop_recording(&self, name: &str) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.stop_recording(name),
            mappers::recording(name),
        )
        .await
    }

    /// A finished recording of this bridge
    #[must_use]
    pub fn recording(&self, name: &str) -> Option<RecordingReport> {
        self.recordings.lock().get(name).cloned()
    }

    /// Names of the finished recordings of this bridge
    #[must_use]
    pub fn recording_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.recordings.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for BridgeOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeOperations")
            .field("bridge_id", &self.bridge_id)
            .field("recordings", &self.recordings.lock().len())
            .finish()
    }
}
