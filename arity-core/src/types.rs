//! Value objects and small enums shared across the runtime

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a fresh identifier for channels, bridges and playbacks created locally
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Caller identification attached to a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerId {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Number
    #[serde(default)]
    pub number: String,
}

/// Dialplan location of a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialplanLocation {
    /// Context name
    #[serde(default)]
    pub context: String,
    /// Extension
    #[serde(default)]
    pub exten: String,
    /// Priority
    #[serde(default)]
    pub priority: i64,
}

/// Snapshot of a channel as reported by the switch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel id
    pub id: String,
    /// Channel name (e.g. `PJSIP/trunk-00000001`)
    #[serde(default)]
    pub name: String,
    /// Channel state (`Up`, `Ring`, ...)
    #[serde(default)]
    pub state: String,
    /// Calling party
    #[serde(default)]
    pub caller: CallerId,
    /// Account code
    #[serde(default)]
    pub accountcode: String,
    /// Dialplan location, when the channel is in the dialplan
    #[serde(default)]
    pub dialplan: Option<DialplanLocation>,
    /// Creation time as reported by the switch
    #[serde(default)]
    pub creationtime: Option<String>,
    /// Default language of the channel
    #[serde(default)]
    pub language: Option<String>,
}

impl ChannelSnapshot {
    /// Minimal snapshot carrying only an id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Snapshot of a bridge as reported by the switch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    /// Bridge id
    pub id: String,
    /// Bridge type (`mixing`, `holding`)
    #[serde(default)]
    pub bridge_type: String,
    /// Bridge name
    #[serde(default)]
    pub name: String,
    /// Ids of member channels
    #[serde(default)]
    pub channels: Vec<String>,
}

/// A playback started on a channel or bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playback {
    /// Playback id (the correlation id chosen when starting it)
    pub id: String,
    /// Media URI (`sound:hello-world`)
    #[serde(default)]
    pub media_uri: String,
    /// Target URI (`channel:<id>` or `bridge:<id>`)
    #[serde(default)]
    pub target_uri: String,
    /// Playback state
    #[serde(default)]
    pub state: String,
    /// Language
    #[serde(default)]
    pub language: Option<String>,
}

/// A recording in progress or finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRecording {
    /// Recording name
    pub name: String,
    /// Audio format
    #[serde(default)]
    pub format: String,
    /// Target URI (`channel:<id>` or `bridge:<id>`)
    #[serde(default)]
    pub target_uri: String,
    /// Recording state
    #[serde(default)]
    pub state: String,
    /// Duration in seconds, when known
    #[serde(default)]
    pub duration: Option<u64>,
}

impl LiveRecording {
    /// Id of the bridge this recording targets, if any
    #[must_use]
    pub fn bridge_id(&self) -> Option<&str> {
        self.target_uri.strip_prefix("bridge:")
    }

    /// Id of the channel this recording targets, if any
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.target_uri.strip_prefix("channel:")
    }
}

/// Reason given when hanging up a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HangupReason {
    /// Normal clearing
    Normal,
    /// User busy
    Busy,
    /// Congestion
    Congestion,
    /// No answer
    NoAnswer,
    /// Call rejected
    Rejected,
}

impl HangupReason {
    /// Wire value of the reason
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Busy => "busy",
            Self::Congestion => "congestion",
            Self::NoAnswer => "no_answer",
            Self::Rejected => "rejected",
        }
    }
}

/// Direction of a mute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteDirection {
    /// Both directions
    Both,
    /// Audio into the switch
    In,
    /// Audio out of the switch
    Out,
}

impl MuteDirection {
    /// Wire value of the direction
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// DTMF input that terminates a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminateOn {
    /// Never terminate on DTMF
    None,
    /// Any key
    Any,
    /// `*`
    Star,
    /// `#`
    Hash,
}

impl TerminateOn {
    /// Wire value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Any => "any",
            Self::Star => "*",
            Self::Hash => "#",
        }
    }
}

/// What to do when a recording with the same name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Fail the request
    Fail,
    /// Overwrite the existing recording
    Overwrite,
    /// Append to the existing recording
    Append,
}

impl IfExists {
    /// Wire value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Overwrite => "overwrite",
            Self::Append => "append",
        }
    }
}

/// Media to play
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSource {
    /// A sound file known to the switch
    Sound(String),
    /// A stored recording
    Recording(String),
}

impl MediaSource {
    /// Resource name without the URI scheme
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Sound(name) | Self::Recording(name) => name,
        }
    }

    /// Full media URI
    #[must_use]
    pub fn uri(&self) -> String {
        match self {
            Self::Sound(name) => format!("sound:{name}"),
            Self::Recording(name) => format!("recording:{name}"),
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Where a playback or recording is directed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaTarget {
    /// A channel
    Channel(String),
    /// A bridge
    Bridge(String),
}

impl MediaTarget {
    /// Id of the channel or bridge
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Channel(id) | Self::Bridge(id) => id,
        }
    }

    /// Target URI as reported in playback and recording objects
    #[must_use]
    pub fn uri(&self) -> String {
        match self {
            Self::Channel(id) => format!("channel:{id}"),
            Self::Bridge(id) => format!("bridge:{id}"),
        }
    }
}

/// Progress of an outbound dial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialStatus {
    /// No dial result seen yet
    Unknown,
    /// The callee is ringing
    Ringing,
    /// The callee answered
    Answered,
    /// The dial ended without an answer (busy, no answer, congestion, ...)
    Failed,
}

impl DialStatus {
    /// Classify a raw dial status string from the switch
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "ANSWER" => Self::Answered,
            "RINGING" | "PROGRESS" | "PROCEEDING" => Self::Ringing,
            "" => Self::Unknown,
            _ => Self::Failed,
        }
    }
}

/// Parameters of a recording request
///
/// Unset options are left to the switch's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOptions {
    /// Recording name
    pub name: String,
    /// Audio format
    pub format: String,
    /// Maximum duration in seconds, 0 for no limit
    pub max_duration_seconds: Option<u32>,
    /// Maximum silence in seconds, 0 for no limit
    pub max_silence_seconds: Option<u32>,
    /// What to do when a recording with this name exists
    pub if_exists: Option<IfExists>,
    /// Play a beep when recording starts
    pub beep: Option<bool>,
    /// DTMF input terminating the recording
    pub terminate_on: Option<TerminateOn>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            name: new_id(),
            format: "slin".to_string(),
            max_duration_seconds: None,
            max_silence_seconds: None,
            if_exists: None,
            beep: None,
            terminate_on: None,
        }
    }
}

impl RecordOptions {
    /// Set the recording name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the audio format
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Set the maximum duration
    #[must_use]
    pub fn with_max_duration(mut self, seconds: u32) -> Self {
        self.max_duration_seconds = Some(seconds);
        self
    }

    /// Set the maximum silence
    #[must_use]
    pub fn with_max_silence(mut self, seconds: u32) -> Self {
        self.max_silence_seconds = Some(seconds);
        self
    }

    /// Set the if-exists policy
    #[must_use]
    pub fn with_if_exists(mut self, policy: IfExists) -> Self {
        self.if_exists = Some(policy);
        self
    }

    /// Play a beep when the recording starts
    #[must_use]
    pub fn with_beep(mut self, beep: bool) -> Self {
        self.beep = Some(beep);
        self
    }

    /// Terminate the recording on DTMF input
    #[must_use]
    pub fn with_terminate_on(mut self, key: TerminateOn) -> Self {
        self.terminate_on = Some(key);
        self
    }
}
