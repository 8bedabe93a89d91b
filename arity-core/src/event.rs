//! Protocol events delivered by the switch
//!
//! Every inbound notification is decoded into a [`ProtocolEvent`]: a receipt
//! timestamp plus a closed, tagged [`EventBody`]. Correlation matches on
//! [`EventKind`] and on the ids an event concerns, never on runtime type
//! inspection.

use crate::types::{BridgeSnapshot, ChannelSnapshot, LiveRecording, Playback};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag of a protocol event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A channel entered the application
    ApplicationStart,
    /// A channel left the application
    ApplicationEnd,
    /// Hangup was requested on a channel
    ChannelHangupRequest,
    /// Progress of a dial
    DialResult,
    /// A playback started
    PlaybackStarted,
    /// A playback finished
    PlaybackFinished,
    /// A recording started
    RecordingStarted,
    /// A recording finished
    RecordingFinished,
    /// A channel joined a bridge
    ChannelEnteredBridge,
    /// A channel left a bridge
    ChannelLeftBridge,
    /// A DTMF digit was received on a channel
    DtmfReceived,
    /// Any event the runtime does not interpret
    Other,
}

impl EventKind {
    /// Map the switch's event type name to a kind
    ///
    /// Returns `None` for types the runtime does not interpret.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        let kind = match name {
            "StasisStart" => Self::ApplicationStart,
            "StasisEnd" => Self::ApplicationEnd,
            "ChannelHangupRequest" => Self::ChannelHangupRequest,
            "Dial" => Self::DialResult,
            "PlaybackStarted" => Self::PlaybackStarted,
            "PlaybackFinished" => Self::PlaybackFinished,
            "RecordingStarted" => Self::RecordingStarted,
            "RecordingFinished" => Self::RecordingFinished,
            "ChannelEnteredBridge" => Self::ChannelEnteredBridge,
            "ChannelLeftBridge" => Self::ChannelLeftBridge,
            "ChannelDtmfReceived" => Self::DtmfReceived,
            _ => return None,
        };
        Some(kind)
    }
}

/// Kind-specific payload of a protocol event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventBody {
    /// A channel entered the application
    #[serde(rename = "StasisStart")]
    ApplicationStart {
        /// The channel
        channel: ChannelSnapshot,
        /// Application arguments
        #[serde(default)]
        args: Vec<String>,
    },

    /// A channel left the application
    #[serde(rename = "StasisEnd")]
    ApplicationEnd {
        /// The channel
        channel: ChannelSnapshot,
    },

    /// Hangup was requested on a channel
    #[serde(rename = "ChannelHangupRequest")]
    ChannelHangupRequest {
        /// The channel
        channel: ChannelSnapshot,
        /// Hangup cause code
        #[serde(default)]
        cause: Option<i64>,
    },

    /// Progress of a dial
    #[serde(rename = "Dial")]
    DialResult {
        /// The dialed channel
        peer: ChannelSnapshot,
        /// The channel that dialed, if any
        #[serde(default)]
        caller: Option<ChannelSnapshot>,
        /// Raw dial status (`RINGING`, `ANSWER`, `BUSY`, ...)
        #[serde(default)]
        dialstatus: String,
    },

    /// A playback started
    #[serde(rename = "PlaybackStarted")]
    PlaybackStarted {
        /// The playback
        playback: Playback,
    },

    /// A playback finished
    #[serde(rename = "PlaybackFinished")]
    PlaybackFinished {
        /// The playback
        playback: Playback,
    },

    /// A recording started
    #[serde(rename = "RecordingStarted")]
    RecordingStarted {
        /// The recording
        recording: LiveRecording,
    },

    /// A recording finished
    #[serde(rename = "RecordingFinished")]
    RecordingFinished {
        /// The recording
        recording: LiveRecording,
    },

    /// A channel joined a bridge
    #[serde(rename = "ChannelEnteredBridge")]
    ChannelEnteredBridge {
        /// The bridge
        bridge: BridgeSnapshot,
        /// The channel
        channel: ChannelSnapshot,
    },

    /// A channel left a bridge
    #[serde(rename = "ChannelLeftBridge")]
    ChannelLeftBridge {
        /// The bridge
        bridge: BridgeSnapshot,
        /// The channel
        channel: ChannelSnapshot,
    },

    /// A DTMF digit was received
    #[serde(rename = "ChannelDtmfReceived")]
    DtmfReceived {
        /// The channel
        channel: ChannelSnapshot,
        /// The digit
        digit: String,
        /// Duration of the key press in milliseconds
        #[serde(default)]
        duration_ms: u32,
    },

    /// Uninterpreted event, passed through untouched
    #[serde(skip)]
    Other {
        /// Wire type name
        kind: String,
        /// Channel id, if the event carried one
        channel_id: Option<String>,
        /// Bridge id, if the event carried one
        bridge_id: Option<String>,
    },
}

/// A decoded event together with its receipt time
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolEvent {
    /// When the runtime received the event
    pub received_at: DateTime<Utc>,
    /// Payload
    pub body: EventBody,
}

impl ProtocolEvent {
    /// Wrap a payload, stamping it with the current time
    #[must_use]
    pub fn new(body: EventBody) -> Self {
        Self {
            received_at: Utc::now(),
            body,
        }
    }

    /// Decode an event object as sent by the switch
    ///
    /// Types the runtime does not interpret decode to [`EventBody::Other`].
    ///
    /// # Errors
    ///
    /// Returns error if the input is not valid JSON or a known event type is malformed
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let type_name = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let body = if EventKind::from_wire(&type_name).is_some() {
            serde_json::from_value(value)?
        } else {
            let nested_id = |key: &str| {
                value
                    .get(key)
                    .and_then(|v| v.get("id"))
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            };
            EventBody::Other {
                channel_id: nested_id("channel"),
                bridge_id: nested_id("bridge"),
                kind: type_name,
            }
        };
        Ok(Self::new(body))
    }

    /// Kind tag of this event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.body {
            EventBody::ApplicationStart { .. } => EventKind::ApplicationStart,
            EventBody::ApplicationEnd { .. } => EventKind::ApplicationEnd,
            EventBody::ChannelHangupRequest { .. } => EventKind::ChannelHangupRequest,
            EventBody::DialResult { .. } => EventKind::DialResult,
            EventBody::PlaybackStarted { .. } => EventKind::PlaybackStarted,
            EventBody::PlaybackFinished { .. } => EventKind::PlaybackFinished,
            EventBody::RecordingStarted { .. } => EventKind::RecordingStarted,
            EventBody::RecordingFinished { .. } => EventKind::RecordingFinished,
            EventBody::ChannelEnteredBridge { .. } => EventKind::ChannelEnteredBridge,
            EventBody::ChannelLeftBridge { .. } => EventKind::ChannelLeftBridge,
            EventBody::DtmfReceived { .. } => EventKind::DtmfReceived,
            EventBody::Other { .. } => EventKind::Other,
        }
    }

    /// Id of the channel this event concerns
    ///
    /// For dial results this is the dialed (peer) channel.
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        match &self.body {
            EventBody::ApplicationStart { channel, .. }
            | EventBody::ApplicationEnd { channel }
            | EventBody::ChannelHangupRequest { channel, .. }
            | EventBody::ChannelEnteredBridge { channel, .. }
            | EventBody::ChannelLeftBridge { channel, .. }
            | EventBody::DtmfReceived { channel, .. } => Some(&channel.id),
            EventBody::DialResult { peer, .. } => Some(&peer.id),
            EventBody::PlaybackStarted { playback } | EventBody::PlaybackFinished { playback } => {
                playback.target_uri.strip_prefix("channel:")
            }
            EventBody::RecordingStarted { recording }
            | EventBody::RecordingFinished { recording } => recording.channel_id(),
            EventBody::Other { channel_id, .. } => channel_id.as_deref(),
        }
    }

    /// Id of the bridge this event concerns
    #[must_use]
    pub fn bridge_id(&self) -> Option<&str> {
        match &self.body {
            EventBody::ChannelEnteredBridge { bridge, .. }
            | EventBody::ChannelLeftBridge { bridge, .. } => Some(&bridge.id),
            EventBody::PlaybackStarted { playback } | EventBody::PlaybackFinished { playback } => {
                playback.target_uri.strip_prefix("bridge:")
            }
            EventBody::RecordingStarted { recording }
            | EventBody::RecordingFinished { recording } => recording.bridge_id(),
            EventBody::Other { bridge_id, .. } => bridge_id.as_deref(),
            _ => None,
        }
    }

    /// Id of the playback this event concerns
    #[must_use]
    pub fn playback_id(&self) -> Option<&str> {
        match &self.body {
            EventBody::PlaybackStarted { playback } | EventBody::PlaybackFinished { playback } => {
                Some(&playback.id)
            }
            _ => None,
        }
    }

    /// Name of the recording this event concerns
    #[must_use]
    pub fn recording_name(&self) -> Option<&str> {
        match &self.body {
            EventBody::RecordingStarted { recording }
            | EventBody::RecordingFinished { recording } => Some(&recording.name),
            _ => None,
        }
    }

    /// Whether `scope` names the channel, bridge or playback this event concerns
    #[must_use]
    pub fn concerns(&self, scope: &str) -> bool {
        self.channel_id() == Some(scope)
            || self.bridge_id() == Some(scope)
            || self.playback_id() == Some(scope)
    }
}

impl From<EventBody> for ProtocolEvent {
    fn from(body: EventBody) -> Self {
        Self::new(body)
    }
}
