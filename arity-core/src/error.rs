//! Domain errors surfaced by the runtime
//!
//! Raw transport failures never reach application code directly: the retry
//! primitive in [`crate::retry`] translates them into one of these kinds.

use thiserror::Error;

/// Errors produced by the call-control runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArityError {
    /// The event subscription could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A transient transport failure persisted through every retry attempt
    #[error("Transient transport error after {attempts} attempts: {message}")]
    TransientTransport {
        /// Number of attempts made
        attempts: u32,
        /// Last failure message
        message: String,
    },

    /// The bridge does not exist on the switch
    #[error("Bridge not found: {0}")]
    BridgeNotFound(String),

    /// The channel is not a member of the bridge
    #[error("Channel not in bridge: {0}")]
    ChannelNotInBridge(String),

    /// The channel may not join the bridge (e.g. it is not in the application)
    #[error("Channel not allowed in bridge: {0}")]
    ChannelNotAllowedInBridge(String),

    /// Originating or dialing the outbound leg failed
    #[error("Dial failed: {0}")]
    DialFailed(String),

    /// Hanging up a channel failed
    #[error("Hangup failed: {0}")]
    HangupFailed(String),

    /// Starting a playback failed
    #[error("Playback of {media} failed: {message}")]
    PlaybackFailed {
        /// Media URI that was requested
        media: String,
        /// Failure message
        message: String,
    },

    /// Starting or stopping a recording failed
    #[error("Recording {name} failed: {message}")]
    RecordingFailed {
        /// Recording name
        name: String,
        /// Failure message
        message: String,
    },

    /// Unmapped request failure, original message retained
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The operation was used in a way its state machine does not allow
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The resolving side of a completion went away without resolving it
    #[error("Operation abandoned before completion")]
    Abandoned,
}

impl ArityError {
    /// Whether this error came from bridge membership handling
    #[must_use]
    pub fn is_bridge_error(&self) -> bool {
        matches!(
            self,
            Self::BridgeNotFound(_) | Self::ChannelNotInBridge(_) | Self::ChannelNotAllowedInBridge(_)
        )
    }
}
