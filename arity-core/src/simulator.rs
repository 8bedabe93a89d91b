//! In-process switch for tests and demos
//!
//! [`SimulatedSwitch`] implements [`SwitchTransport`] without a network. It
//! records every request attempt, fails requests on demand, emits events
//! injected by the caller, and with auto-complete enabled produces the
//! events a real switch would send in response to media, dial and bridge
//! actions.

use crate::event::{EventBody, ProtocolEvent};
use crate::transport::{EventStream, SwitchTransport, TransportError};
use crate::types::{
    BridgeSnapshot, ChannelSnapshot, HangupReason, LiveRecording, MediaTarget, MuteDirection,
    Playback, RecordOptions,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A request received by the simulated switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchRequest {
    /// Event subscription
    Subscribe {
        /// Application name
        app_name: String,
    },
    /// Channel origination
    CreateChannel {
        /// Endpoint
        endpoint: String,
        /// Requested channel id
        channel_id: String,
        /// Caller id presented
        caller_id: Option<String>,
    },
    /// Dial of a created channel
    Dial {
        /// Dialed channel
        channel_id: String,
        /// Channel dialing on whose behalf
        caller_channel_id: Option<String>,
        /// Ring timeout
        timeout_secs: u32,
    },
    /// Channel lookup
    GetChannel {
        /// Channel id
        channel_id: String,
    },
    /// Answer
    Answer {
        /// Channel id
        channel_id: String,
    },
    /// Ring indication
    Ring {
        /// Channel id
        channel_id: String,
    },
    /// Hangup
    Hangup {
        /// Channel id
        channel_id: String,
        /// Reason
        reason: Option<HangupReason>,
    },
    /// Mute
    Mute {
        /// Channel id
        channel_id: String,
        /// Direction
        direction: MuteDirection,
    },
    /// Redirect
    Redirect {
        /// Channel id
        channel_id: String,
        /// New endpoint
        endpoint: String,
    },
    /// Variable write
    SetVariable {
        /// Channel id
        channel_id: String,
        /// Variable name
        name: String,
        /// Value
        value: String,
    },
    /// Variable read
    GetVariable {
        /// Channel id
        channel_id: String,
        /// Variable name
        name: String,
    },
    /// External media channel creation
    ExternalMedia {
        /// Requested channel id
        channel_id: String,
        /// Relay host
        external_host: String,
        /// Audio format
        format: String,
    },
    /// Playback start
    Play {
        /// Target
        target: MediaTarget,
        /// Media URI
        media_uri: String,
        /// Correlation id
        playback_id: String,
    },
    /// Playback stop
    StopPlayback {
        /// Playback id
        playback_id: String,
    },
    /// Recording start
    Record {
        /// Target
        target: MediaTarget,
        /// Recording name
        name: String,
    },
    /// Recording stop
    StopRecording {
        /// Recording name
        name: String,
    },
    /// Bridge creation
    CreateBridge {
        /// Bridge id
        bridge_id: String,
    },
    /// Bridge lookup
    GetBridge {
        /// Bridge id
        bridge_id: String,
    },
    /// Bridge destruction
    DestroyBridge {
        /// Bridge id
        bridge_id: String,
    },
    /// Bridge membership addition
    AddChannelToBridge {
        /// Bridge id
        bridge_id: String,
        /// Channel id
        channel_id: String,
    },
    /// Bridge membership removal
    RemoveChannelFromBridge {
        /// Bridge id
        bridge_id: String,
        /// Channel id
        channel_id: String,
    },
    /// Music on hold start
    StartMoh {
        /// Bridge id
        bridge_id: String,
        /// Music class
        class: String,
    },
    /// Music on hold stop
    StopMoh {
        /// Bridge id
        bridge_id: String,
    },
}

impl SwitchRequest {
    /// Short name of the request, as used by [`SimulatedSwitch::fail_next`]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::CreateChannel { .. } => "create_channel",
            Self::Dial { .. } => "dial",
            Self::GetChannel { .. } => "get_channel",
            Self::Answer { .. } => "answer",
            Self::Ring { .. } => "ring",
            Self::Hangup { .. } => "hangup",
            Self::Mute { .. } => "mute",
            Self::Redirect { .. } => "redirect",
            Self::SetVariable { .. } => "set_variable",
            Self::GetVariable { .. } => "get_variable",
            Self::ExternalMedia { .. } => "external_media",
            Self::Play { .. } => "play",
            Self::StopPlayback { .. } => "stop_playback",
            Self::Record { .. } => "record",
            Self::StopRecording { .. } => "stop_recording",
            Self::CreateBridge { .. } => "create_bridge",
            Self::GetBridge { .. } => "get_bridge",
            Self::DestroyBridge { .. } => "destroy_bridge",
            Self::AddChannelToBridge { .. } => "add_channel_to_bridge",
            Self::RemoveChannelFromBridge { .. } => "remove_channel_from_bridge",
            Self::StartMoh { .. } => "start_moh",
            Self::StopMoh { .. } => "stop_moh",
        }
    }
}

#[derive(Default)]
struct SwitchState {
    requests: Vec<SwitchRequest>,
    failures: HashMap<&'static str, VecDeque<TransportError>>,
    delays: HashMap<&'static str, VecDeque<Duration>>,
    channels: HashMap<String, ChannelSnapshot>,
    variables: HashMap<(String, String), String>,
    bridges: HashMap<String, BridgeSnapshot>,
    playbacks: HashMap<String, Playback>,
    recordings: HashMap<String, LiveRecording>,
    auto_complete: bool,
    refuse_subscribe: bool,
}

type EventItem = Result<ProtocolEvent, TransportError>;

/// Simulated switch
pub struct SimulatedSwitch {
    state: Mutex<SwitchState>,
    events_tx: mpsc::UnboundedSender<EventItem>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EventItem>>>,
    activity: Notify,
}

impl Default for SimulatedSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSwitch {
    /// Create a switch that only emits injected events
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(SwitchState::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            activity: Notify::new(),
        }
    }

    /// Emit the events a real switch sends in response to requests
    #[must_use]
    pub fn with_auto_complete(self) -> Self {
        self.set_auto_complete(true);
        self
    }

    /// Toggle auto-completion
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().auto_complete = enabled;
    }

    /// Make the subscription fail
    pub fn refuse_subscribe(&self) {
        self.state.lock().refuse_subscribe = true;
    }

    /// Fail the next attempt of request `name` with `error`
    ///
    /// Failures queue up per request name.
    pub fn fail_next(&self, name: &'static str, error: TransportError) {
        self.state
            .lock()
            .failures
            .entry(name)
            .or_default()
            .push_back(error);
    }

    /// Hold back the response to the next attempt of request `name`
    ///
    /// The attempt is recorded on arrival; its effect on the switch and its
    /// response happen once `delay` has passed.
    pub fn delay_next(&self, name: &'static str, delay: Duration) {
        self.state
            .lock()
            .delays
            .entry(name)
            .or_default()
            .push_back(delay);
    }

    /// Deliver an event to the subscriber
    ///
    /// Start events make the channel known to the switch.
    pub fn emit(&self, event: impl Into<ProtocolEvent>) {
        let event = event.into();
        if let EventBody::ApplicationStart { channel, .. } = &event.body {
            self.state
                .lock()
                .channels
                .entry(channel.id.clone())
                .or_insert_with(|| channel.clone());
        }
        let _ = self.events_tx.send(Ok(event));
    }

    /// Deliver a connection-level failure to the subscriber
    pub fn emit_failure(&self, error: TransportError) {
        let _ = self.events_tx.send(Err(error));
    }

    /// Every request attempt so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<SwitchRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of attempts of request `name`
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.name() == name)
            .count()
    }

    /// Attempts of request `name`, in order
    #[must_use]
    pub fn requests_named(&self, name: &str) -> Vec<SwitchRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.name() == name)
            .cloned()
            .collect()
    }

    /// Wait until request `name` was attempted `n` times; returns the `n`th attempt
    pub async fn wait_for_nth(&self, name: &str, n: usize) -> SwitchRequest {
        loop {
            let notified = self.activity.notified();
            if let Some(request) = self.requests_named(name).into_iter().nth(n.saturating_sub(1)) {
                return request;
            }
            notified.await;
        }
    }

    /// Wait for the first attempt of request `name`
    pub async fn wait_for(&self, name: &str) -> SwitchRequest {
        self.wait_for_nth(name, 1).await
    }

    /// Whether a channel is known and not hung up
    #[must_use]
    pub fn has_channel(&self, channel_id: &str) -> bool {
        self.state.lock().channels.contains_key(channel_id)
    }

    /// Ids of the channels in a bridge
    #[must_use]
    pub fn bridge_members(&self, bridge_id: &str) -> Vec<String> {
        self.state
            .lock()
            .bridges
            .get(bridge_id)
            .map(|b| b.channels.clone())
            .unwrap_or_default()
    }

    async fn receive(&self, request: SwitchRequest) -> Result<bool, TransportError> {
        let (result, delay) = {
            let mut state = self.state.lock();
            let failure = state
                .failures
                .get_mut(request.name())
                .and_then(VecDeque::pop_front);
            let delay = state
                .delays
                .get_mut(request.name())
                .and_then(VecDeque::pop_front);
            tracing::trace!(request = request.name(), failing = failure.is_some(), "Simulated request");
            state.requests.push(request);
            let result = match failure {
                Some(err) => Err(err),
                None => Ok(state.auto_complete),
            };
            (result, delay)
        };
        self.activity.notify_waiters();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn channel(&self, channel_id: &str) -> Result<ChannelSnapshot, TransportError> {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| TransportError::rejected(404, "Channel not found"))
    }

    fn bridge(&self, bridge_id: &str) -> Result<BridgeSnapshot, TransportError> {
        self.state
            .lock()
            .bridges
            .get(bridge_id)
            .cloned()
            .ok_or_else(|| TransportError::rejected(404, "Bridge not found"))
    }
}

impl std::fmt::Debug for SimulatedSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedSwitch")
            .field("requests", &state.requests.len())
            .field("channels", &state.channels.len())
            .field("bridges", &state.bridges.len())
            .field("auto_complete", &state.auto_complete)
            .finish()
    }
}

#[async_trait]
impl SwitchTransport for SimulatedSwitch {
    async fn subscribe(&self, app_name: &str) -> Result<EventStream, TransportError> {
        self.receive(SwitchRequest::Subscribe {
            app_name: app_name.to_string(),
        })
        .await?;
        if self.state.lock().refuse_subscribe {
            return Err(TransportError::rejected(403, "Subscription refused"));
        }
        let rx = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| TransportError::rejected(409, "Already subscribed"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn create_channel(
        &self,
        endpoint: &str,
        _app_name: &str,
        channel_id: &str,
        caller_id: Option<&str>,
    ) -> Result<ChannelSnapshot, TransportError> {
        self.receive(SwitchRequest::CreateChannel {
            endpoint: endpoint.to_string(),
            channel_id: channel_id.to_string(),
            caller_id: caller_id.map(str::to_string),
        })
        .await?;
        let mut channel = ChannelSnapshot::with_id(channel_id);
        channel.name = endpoint.to_string();
        channel.state = "Down".to_string();
        channel.caller.number = caller_id.unwrap_or_default().to_string();
        self.state
            .lock()
            .channels
            .insert(channel_id.to_string(), channel.clone());
        Ok(channel)
    }

    async fn dial(
        &self,
        channel_id: &str,
        caller_channel_id: Option<&str>,
        timeout_secs: u32,
    ) -> Result<(), TransportError> {
        let auto = self.receive(SwitchRequest::Dial {
            channel_id: channel_id.to_string(),
            caller_channel_id: caller_channel_id.map(str::to_string),
            timeout_secs,
        })
        .await?;
        let mut peer = self.channel(channel_id)?;
        if auto {
            let caller = caller_channel_id.map(ChannelSnapshot::with_id);
            self.emit(events::start(channel_id));
            for status in ["RINGING", "ANSWER"] {
                self.emit(EventBody::DialResult {
                    peer: peer.clone(),
                    caller: caller.clone(),
                    dialstatus: status.to_string(),
                });
            }
            peer.state = "Up".to_string();
            self.state.lock().channels.insert(channel_id.to_string(), peer);
        }
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<ChannelSnapshot, TransportError> {
        self.receive(SwitchRequest::GetChannel {
            channel_id: channel_id.to_string(),
        })
        .await?;
        self.channel(channel_id)
    }

    async fn answer(&self, channel_id: &str) -> Result<(), TransportError> {
        self.receive(SwitchRequest::Answer {
            channel_id: channel_id.to_string(),
        })
        .await?;
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| TransportError::rejected(404, "Channel not found"))?;
        channel.state = "Up".to_string();
        Ok(())
    }

    async fn ring(&self, channel_id: &str) -> Result<(), TransportError> {
        self.receive(SwitchRequest::Ring {
            channel_id: channel_id.to_string(),
        })
        .await?;
        self.channel(channel_id).map(|_| ())
    }

    async fn hangup(
        &self,
        channel_id: &str,
        reason: Option<HangupReason>,
    ) -> Result<(), TransportError> {
        let auto = self.receive(SwitchRequest::Hangup {
            channel_id: channel_id.to_string(),
            reason,
        })
        .await?;
        let channel = {
            let mut state = self.state.lock();
            for bridge in state.bridges.values_mut() {
                bridge.channels.retain(|c| c != channel_id);
            }
            state.channels.remove(channel_id)
        };
        let channel = channel.ok_or_else(|| TransportError::rejected(404, "Channel not found"))?;
        if auto {
            self.emit(EventBody::ApplicationEnd { channel });
        }
        Ok(())
    }

    async fn mute(&self, channel_id: &str, direction: MuteDirection) -> Result<(), TransportError> {
        self.receive(SwitchRequest::Mute {
            channel_id: channel_id.to_string(),
            direction,
        })
        .await?;
        self.channel(channel_id).map(|_| ())
    }

    async fn redirect(&self, channel_id: &str, endpoint: &str) -> Result<(), TransportError> {
        self.receive(SwitchRequest::Redirect {
            channel_id: channel_id.to_string(),
            endpoint: endpoint.to_string(),
        })
        .await?;
        self.channel(channel_id).map(|_| ())
    }

    async fn set_variable(
        &self,
        channel_id: &str,
        name: &str,
        value: &str,
    ) -> Result<(), TransportError> {
        self.receive(SwitchRequest::SetVariable {
            channel_id: channel_id.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        })
        .await?;
        self.state
            .lock()
            .variables
            .insert((channel_id.to_string(), name.to_string()), value.to_string());
        Ok(())
    }

    async fn get_variable(&self, channel_id: &str, name: &str) -> Result<String, TransportError> {
        self.receive(SwitchRequest::GetVariable {
            channel_id: channel_id.to_string(),
            name: name.to_string(),
        })
        .await?;
        self.state
            .lock()
            .variables
            .get(&(channel_id.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::rejected(404, "Provided variable was not found"))
    }

    async fn external_media(
        &self,
        _app_name: &str,
        channel_id: &str,
        external_host: &str,
        _encapsulation: &str,
        _transport: &str,
        format: &str,
    ) -> Result<ChannelSnapshot, TransportError> {
        let auto = self.receive(SwitchRequest::ExternalMedia {
            channel_id: channel_id.to_string(),
            external_host: external_host.to_string(),
            format: format.to_string(),
        })
        .await?;
        let mut channel = ChannelSnapshot::with_id(channel_id);
        channel.name = format!("UnicastRTP/{external_host}");
        channel.state = "Up".to_string();
        self.state
            .lock()
            .channels
            .insert(channel_id.to_string(), channel.clone());
        if auto {
            self.emit(EventBody::ApplicationStart {
                channel: channel.clone(),
                args: Vec::new(),
            });
        }
        Ok(channel)
    }

    async fn play(
        &self,
        target: &MediaTarget,
        media_uri: &str,
        language: &str,
        playback_id: &str,
    ) -> Result<Playback, TransportError> {
        let auto = self.receive(SwitchRequest::Play {
            target: target.clone(),
            media_uri: media_uri.to_string(),
            playback_id: playback_id.to_string(),
        })
        .await?;
        match target {
            MediaTarget::Channel(id) => self.channel(id).map(|_| ())?,
            MediaTarget::Bridge(id) => self.bridge(id).map(|_| ())?,
        }
        let playback = Playback {
            id: playback_id.to_string(),
            media_uri: media_uri.to_string(),
            target_uri: target.uri(),
            state: "queued".to_string(),
            language: Some(language.to_string()),
        };
        if auto {
            self.emit(EventBody::PlaybackStarted {
                playback: Playback {
                    state: "playing".to_string(),
                    ..playback.clone()
                },
            });
            self.emit(EventBody::PlaybackFinished {
                playback: Playback {
                    state: "done".to_string(),
                    ..playback.clone()
                },
            });
        } else {
            self.state
                .lock()
                .playbacks
                .insert(playback_id.to_string(), playback.clone());
        }
        Ok(playback)
    }

    async fn stop_playback(&self, playback_id: &str) -> Result<(), TransportError> {
        let auto = self.receive(SwitchRequest::StopPlayback {
            playback_id: playback_id.to_string(),
        })
        .await?;
        let playback = self
            .state
            .lock()
            .playbacks
            .remove(playback_id)
            .ok_or_else(|| TransportError::rejected(404, "Playback not found"))?;
        if auto {
            self.emit(EventBody::PlaybackFinished {
                playback: Playback {
                    state: "done".to_string(),
                    ..playback
                },
            });
        }
        Ok(())
    }

    async fn record(
        &self,
        target: &MediaTarget,
        options: &RecordOptions,
    ) -> Result<LiveRecording, TransportError> {
        let auto = self.receive(SwitchRequest::Record {
            target: target.clone(),
            name: options.name.clone(),
        })
        .await?;
        match target {
            MediaTarget::Channel(id) => self.channel(id).map(|_| ())?,
            MediaTarget::Bridge(id) => self.bridge(id).map(|_| ())?,
        }
        let recording = LiveRecording {
            name: options.name.clone(),
            format: options.format.clone(),
            target_uri: target.uri(),
            state: "recording".to_string(),
            duration: None,
        };
        self.state
            .lock()
            .recordings
            .insert(options.name.clone(), recording.clone());
        if auto {
            self.emit(EventBody::RecordingStarted {
                recording: recording.clone(),
            });
        }
        Ok(recording)
    }

    async fn stop_recording(&self, name: &str) -> Result<(), TransportError> {
        let auto = self.receive(SwitchRequest::StopRecording {
            name: name.to_string(),
        })
        .await?;
        let recording = self
            .state
            .lock()
            .recordings
            .remove(name)
            .ok_or_else(|| TransportError::rejected(404, "Recording not found"))?;
        if auto {
            self.emit(EventBody::RecordingFinished {
                recording: LiveRecording {
                    state: "done".to_string(),
                    ..recording
                },
            });
        }
        Ok(())
    }

    async fn create_bridge(
        &self,
        bridge_id: &str,
        bridge_type: &str,
        name: &str,
    ) -> Result<BridgeSnapshot, TransportError> {
        self.receive(SwitchRequest::CreateBridge {
            bridge_id: bridge_id.to_string(),
        })
        .await?;
        let bridge = BridgeSnapshot {
            id: bridge_id.to_string(),
            bridge_type: bridge_type.to_string(),
            name: name.to_string(),
            channels: Vec::new(),
        };
        self.state
            .lock()
            .bridges
            .insert(bridge_id.to_string(), bridge.clone());
        Ok(bridge)
    }

    async fn get_bridge(&self, bridge_id: &str) -> Result<BridgeSnapshot, TransportError> {
        self.receive(SwitchRequest::GetBridge {
            bridge_id: bridge_id.to_string(),
        })
        .await?;
        self.bridge(bridge_id)
    }

    async fn destroy_bridge(&self, bridge_id: &str) -> Result<(), TransportError> {
        self.receive(SwitchRequest::DestroyBridge {
            bridge_id: bridge_id.to_string(),
        })
        .await?;
        self.state
            .lock()
            .bridges
            .remove(bridge_id)
            .map(|_| ())
            .ok_or_else(|| TransportError::rejected(404, "Bridge not found"))
    }

    async fn add_channel_to_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
        _role: &str,
    ) -> Result<(), TransportError> {
        let auto = self.receive(SwitchRequest::AddChannelToBridge {
            bridge_id: bridge_id.to_string(),
            channel_id: channel_id.to_string(),
        })
        .await?;
        let (bridge, channel) = {
            let mut state = self.state.lock();
            let channel = state
                .channels
                .get(channel_id)
                .cloned()
                .ok_or_else(|| TransportError::rejected(422, "Channel not in Stasis application"))?;
            let bridge = state
                .bridges
                .get_mut(bridge_id)
                .ok_or_else(|| TransportError::rejected(404, "Bridge not found"))?;
            if !bridge.channels.iter().any(|c| c == channel_id) {
                bridge.channels.push(channel_id.to_string());
            }
            (bridge.clone(), channel)
        };
        if auto {
            self.emit(EventBody::ChannelEnteredBridge { bridge, channel });
        }
        Ok(())
    }

    async fn remove_channel_from_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
    ) -> Result<(), TransportError> {
        let auto = self.receive(SwitchRequest::RemoveChannelFromBridge {
            bridge_id: bridge_id.to_string(),
            channel_id: channel_id.to_string(),
        })
        .await?;
        let (bridge, channel) = {
            let mut state = self.state.lock();
            let channel = state
                .channels
                .get(channel_id)
                .cloned()
                .unwrap_or_else(|| ChannelSnapshot::with_id(channel_id));
            let bridge = state
                .bridges
                .get_mut(bridge_id)
                .ok_or_else(|| TransportError::rejected(404, "Bridge not found"))?;
            let before = bridge.channels.len();
            bridge.channels.retain(|c| c != channel_id);
            if bridge.channels.len() == before {
                return Err(TransportError::rejected(422, "Channel not in this bridge"));
            }
            (bridge.clone(), channel)
        };
        if auto {
            self.emit(EventBody::ChannelLeftBridge { bridge, channel });
        }
        Ok(())
    }

    async fn start_moh(&self, bridge_id: &str, class: &str) -> Result<(), TransportError> {
        self.receive(SwitchRequest::StartMoh {
            bridge_id: bridge_id.to_string(),
            class: class.to_string(),
        })
        .await?;
        self.bridge(bridge_id).map(|_| ())
    }

    async fn stop_moh(&self, bridge_id: &str) -> Result<(), TransportError> {
        self.receive(SwitchRequest::StopMoh {
            bridge_id: bridge_id.to_string(),
        })
        .await?;
        self.bridge(bridge_id).map(|_| ())
    }
}

/// Constructors for the events a switch sends
pub mod events {
    use crate::event::{EventBody, ProtocolEvent};
    use crate::types::{BridgeSnapshot, ChannelSnapshot, LiveRecording, Playback};

    /// A channel entered the application
    #[must_use]
    pub fn start(channel_id: &str) -> ProtocolEvent {
        start_with(ChannelSnapshot::with_id(channel_id), Vec::new())
    }

    /// A channel entered the application, with full snapshot and arguments
    #[must_use]
    pub fn start_with(channel: ChannelSnapshot, args: Vec<String>) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::ApplicationStart { channel, args })
    }

    /// Hangup was requested on a channel
    #[must_use]
    pub fn hangup(channel_id: &str) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::ChannelHangupRequest {
            channel: ChannelSnapshot::with_id(channel_id),
            cause: Some(16),
        })
    }

    /// Dial progress for the dialed channel `peer_id`
    #[must_use]
    pub fn dial(peer_id: &str, caller_id: Option<&str>, status: &str) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::DialResult {
            peer: ChannelSnapshot::with_id(peer_id),
            caller: caller_id.map(ChannelSnapshot::with_id),
            dialstatus: status.to_string(),
        })
    }

    /// A playback finished
    #[must_use]
    pub fn playback_finished(playback_id: &str, target_uri: &str) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::PlaybackFinished {
            playback: Playback {
                id: playback_id.to_string(),
                target_uri: target_uri.to_string(),
                state: "done".to_string(),
                ..Playback::default()
            },
        })
    }

    /// A recording finished
    #[must_use]
    pub fn recording_finished(name: &str, target_uri: &str) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::RecordingFinished {
            recording: LiveRecording {
                name: name.to_string(),
                target_uri: target_uri.to_string(),
                state: "done".to_string(),
                ..LiveRecording::default()
            },
        })
    }

    /// A channel joined a bridge
    #[must_use]
    pub fn entered_bridge(bridge_id: &str, channel_id: &str) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::ChannelEnteredBridge {
            bridge: BridgeSnapshot {
                id: bridge_id.to_string(),
                ..BridgeSnapshot::default()
            },
            channel: ChannelSnapshot::with_id(channel_id),
        })
    }

    /// A channel left a bridge
    #[must_use]
    pub fn left_bridge(bridge_id: &str, channel_id: &str) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::ChannelLeftBridge {
            bridge: BridgeSnapshot {
                id: bridge_id.to_string(),
                ..BridgeSnapshot::default()
            },
            channel: ChannelSnapshot::with_id(channel_id),
        })
    }

    /// A DTMF digit was pressed
    #[must_use]
    pub fn dtmf(channel_id: &str, digit: char) -> ProtocolEvent {
        ProtocolEvent::new(EventBody::DtmfReceived {
            channel: ChannelSnapshot::with_id(channel_id),
            digit: digit.to_string(),
            duration_ms: 100,
        })
    }
}
