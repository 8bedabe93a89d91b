//! Boundary to the switch
//!
//! The runtime never talks to the switch directly. Everything goes through a
//! [`SwitchTransport`]: request/response control actions plus one subscribed,
//! already-decoded event stream.

use crate::event::ProtocolEvent;
use crate::types::{
    BridgeSnapshot, ChannelSnapshot, HangupReason, LiveRecording, MediaTarget, MuteDirection,
    Playback, RecordOptions,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Raw failure reported by the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The connection to the switch was lost
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The switch rejected the request
    #[error("{message}")]
    Rejected {
        /// HTTP-style status code
        status: u16,
        /// Message returned by the switch (`Bridge not found`, ...)
        message: String,
    },
}

impl TransportError {
    /// Shorthand for a rejection
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectionClosed(_) => true,
            Self::Rejected { status, .. } => *status >= 500 && *status != 501,
        }
    }

    /// Message carried by the failure
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Timeout(msg) | Self::ConnectionClosed(msg) => msg,
            Self::Rejected { message, .. } => message,
        }
    }
}

/// Inbound event feed: decoded events in receipt order, interleaved with
/// connection-level failures
pub type EventStream = BoxStream<'static, Result<ProtocolEvent, TransportError>>;

/// Request/response access to the switch plus its event subscription
///
/// Implement this for the concrete REST/WebSocket client. Every method is a
/// single request; retries and error mapping happen above this trait.
#[async_trait]
pub trait SwitchTransport: Send + Sync {
    /// Subscribe to the events of application `app_name`
    ///
    /// Called once when the runtime connects.
    async fn subscribe(&self, app_name: &str) -> Result<EventStream, TransportError>;

    /// Create a channel to `endpoint` placed in application `app_name`
    async fn create_channel(
        &self,
        endpoint: &str,
        app_name: &str,
        channel_id: &str,
        caller_id: Option<&str>,
    ) -> Result<ChannelSnapshot, TransportError>;

    /// Dial a created channel, optionally on behalf of `caller_channel_id`
    async fn dial(
        &self,
        channel_id: &str,
        caller_channel_id: Option<&str>,
        timeout_secs: u32,
    ) -> Result<(), TransportError>;

    /// Fetch a channel
    async fn get_channel(&self, channel_id: &str) -> Result<ChannelSnapshot, TransportError>;

    /// Answer a channel
    async fn answer(&self, channel_id: &str) -> Result<(), TransportError>;

    /// Indicate ringing on a channel
    async fn ring(&self, channel_id: &str) -> Result<(), TransportError>;

    /// Hang up a channel
    async fn hangup(
        &self,
        channel_id: &str,
        reason: Option<HangupReason>,
    ) -> Result<(), TransportError>;

    /// Mute a channel
    async fn mute(&self, channel_id: &str, direction: MuteDirection) -> Result<(), TransportError>;

    /// Redirect a channel to another endpoint
    async fn redirect(&self, channel_id: &str, endpoint: &str) -> Result<(), TransportError>;

    /// Set a channel variable
    async fn set_variable(
        &self,
        channel_id: &str,
        name: &str,
        value: &str,
    ) -> Result<(), TransportError>;

    /// Read a channel variable
    async fn get_variable(&self, channel_id: &str, name: &str) -> Result<String, TransportError>;

    /// Create an external media (relay) channel
    async fn external_media(
        &self,
        app_name: &str,
        channel_id: &str,
        external_host: &str,
        encapsulation: &str,
        transport: &str,
        format: &str,
    ) -> Result<ChannelSnapshot, TransportError>;

    /// Start a playback with the given correlation id
    async fn play(
        &self,
        target: &MediaTarget,
        media_uri: &str,
        language: &str,
        playback_id: &str,
    ) -> Result<Playback, TransportError>;

    /// Stop a playback
    async fn stop_playback(&self, playback_id: &str) -> Result<(), TransportError>;

    /// Start recording a channel or bridge
    async fn record(
        &self,
        target: &MediaTarget,
        options: &RecordOptions,
    ) -> Result<LiveRecording, TransportError>;

    /// Stop a live recording
    async fn stop_recording(&self, name: &str) -> Result<(), TransportError>;

    /// Create a bridge
    async fn create_bridge(
        &self,
        bridge_id: &str,
        bridge_type: &str,
        name: &str,
    ) -> Result<BridgeSnapshot, TransportError>;

    /// Fetch a bridge
    async fn get_bridge(&self, bridge_id: &str) -> Result<BridgeSnapshot, TransportError>;

    /// Destroy a bridge
    async fn destroy_bridge(&self, bridge_id: &str) -> Result<(), TransportError>;

    /// Add a channel to a bridge
    async fn add_channel_to_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
        role: &str,
    ) -> Result<(), TransportError>;

    /// Remove a channel from a bridge
    async fn remove_channel_from_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
    ) -> Result<(), TransportError>;

    /// Start music on hold in a bridge
    async fn start_moh(&self, bridge_id: &str, class: &str) -> Result<(), TransportError>;

    /// Stop music on hold in a bridge
    async fn stop_moh(&self, bridge_id: &str) -> Result<(), TransportError>;
}
