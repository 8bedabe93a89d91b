//! Per-call façade handed to application handlers

use crate::bridge::BridgeOperations;
use crate::dial::Dial;
use crate::dtmf::ReceiveDtmf;
use crate::error::ArityError;
use crate::lifecycle::{CallHandler, CallState};
use crate::play::Play;
use crate::record::Record;
use crate::retry::{mappers, retry};
use crate::service::Arity;
use crate::types::{ChannelSnapshot, HangupReason, MediaSource, MediaTarget, MuteDirection, RecordOptions};
use std::any::Any;

/// Controller of one call
///
/// Owns the call's [`CallState`]. Handing the call to another handler with
/// [`execute`](Self::execute) consumes the controller, so the previous
/// handler cannot touch the state afterwards.
#[derive(Debug)]
pub struct CallController {
    state: CallState,
    arity: Arity,
}

impl CallController {
    /// Controller over a call's state
    #[must_use]
    pub fn new(state: CallState, arity: Arity) -> Self {
        Self { state, arity }
    }

    /// Runtime the call belongs to
    #[must_use]
    pub fn arity(&self) -> &Arity {
        &self.arity
    }

    /// Call state
    #[must_use]
    pub fn state(&self) -> &CallState {
        &self.state
    }

    /// Mutable call state
    pub fn state_mut(&mut self) -> &mut CallState {
        &mut self.state
    }

    /// Give up the controller, keeping its state
    #[must_use]
    pub fn into_state(self) -> CallState {
        self.state
    }

    /// Lightweight handle for tearing the call down after hand-off
    #[must_use]
    pub fn handle(&self) -> CallHandle {
        CallHandle {
            arity: self.arity.clone(),
            channel_id: self.channel_id().to_string(),
        }
    }

    // Channel metadata

    /// Channel id
    #[must_use]
    pub fn channel_id(&self) -> &str {
        self.state.channel_id()
    }

    /// Channel snapshot taken when the call started
    #[must_use]
    pub fn channel(&self) -> &ChannelSnapshot {
        self.state.channel()
    }

    /// Dialed extension
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.channel().dialplan.as_ref().map(|d| d.exten.as_str())
    }

    /// Dialplan context
    #[must_use]
    pub fn dialplan_context(&self) -> Option<&str> {
        self.channel().dialplan.as_ref().map(|d| d.context.as_str())
    }

    /// Dialplan priority
    #[must_use]
    pub fn priority(&self) -> Option<i64> {
        self.channel().dialplan.as_ref().map(|d| d.priority)
    }

    /// Caller number
    #[must_use]
    pub fn caller_number(&self) -> &str {
        &self.channel().caller.number
    }

    /// Account code
    #[must_use]
    pub fn account_code(&self) -> &str {
        &self.channel().accountcode
    }

    /// Channel name
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel().name
    }

    /// Channel state when the call started
    #[must_use]
    pub fn channel_state(&self) -> &str {
        &self.channel().state
    }

    /// Channel creation time as reported by the switch
    #[must_use]
    pub fn creation_time(&self) -> Option<&str> {
        self.channel().creationtime.as_deref()
    }

    /// Application arguments
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.state.args()
    }

    /// Playback language of the channel
    #[must_use]
    pub fn language(&self) -> &str {
        self.channel()
            .language
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(self.arity.config().default_language.as_str())
    }

    // Call data

    /// Store a value in the call state
    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.state.put(key, value);
    }

    /// Borrow a value from the call state
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.state.get(key)
    }

    /// Whether the call state holds `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state.contains(key)
    }

    /// Take a value out of the call state
    pub fn remove<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        self.state.remove(key)
    }

    // Operations

    /// Play a sound file to the caller
    #[must_use]
    pub fn play(&self, sound: &str) -> Play {
        self.play_media(MediaSource::Sound(sound.to_string()))
    }

    /// Play a stored recording to the caller
    #[must_use]
    pub fn play_recording(&self, name: &str) -> Play {
        self.play_media(MediaSource::Recording(name.to_string()))
    }

    fn play_media(&self, source: MediaSource) -> Play {
        Play::new(
            self.arity.clone(),
            MediaTarget::Channel(self.channel_id().to_string()),
            source,
        )
        .with_language(self.language())
    }

    /// Dial `endpoint` on behalf of this call
    #[must_use]
    pub fn dial(&self, endpoint: &str) -> Dial {
        Dial::new(self.arity.clone(), self.channel_id(), endpoint)
    }

    /// Record the caller
    #[must_use]
    pub fn record(&self, options: RecordOptions) -> Record {
        Record::new(self.arity.clone(), self.channel_id(), options)
    }

    /// Collect DTMF input from the caller
    #[must_use]
    pub fn receive_dtmf(&self) -> ReceiveDtmf {
        ReceiveDtmf::new(self.arity.clone(), self.channel_id())
    }

    /// New bridge manager with a fresh bridge id
    #[must_use]
    pub fn bridge(&self) -> BridgeOperations {
        BridgeOperations::new(self.arity.clone())
    }

    /// Bridge manager for an existing bridge
    #[must_use]
    pub fn existing_bridge(&self, bridge_id: &str) -> BridgeOperations {
        BridgeOperations::existing(self.arity.clone(), bridge_id)
    }

    // Channel control

    /// Answer the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id()))]
    pub async fn answer(&self) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(self.arity.retry_policy(), || transport.answer(self.channel_id()), mappers::none).await
    }

    /// Indicate ringing to the caller
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn ring(&self) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(self.arity.retry_policy(), || transport.ring(self.channel_id()), mappers::none).await
    }

    /// Hang up the call
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::HangupFailed`] if the request fails
    pub async fn hangup(&self) -> Result<(), ArityError> {
        self.handle().hangup(None).await
    }

    /// Hang up the call with a reason
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::HangupFailed`] if the request fails
    pub async fn hangup_with(&self, reason: HangupReason) -> Result<(), ArityError> {
        self.handle().hangup(Some(reason)).await
    }

    /// Mute the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn mute(&self, direction: MuteDirection) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.mute(self.channel_id(), direction),
            mappers::none,
        )
        .await
    }

    /// Redirect the call to another endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id()))]
    pub async fn redirect(&self, endpoint: &str) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.redirect(self.channel_id(), endpoint),
            mappers::none,
        )
        .await
    }

    /// Set a channel variable
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn set_variable(&self, name: &str, value: &str) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.set_variable(self.channel_id(), name, value),
            mappers::none,
        )
        .await
    }

    /// Read a channel variable
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn get_variable(&self, name: &str) -> Result<String, ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.get_variable(self.channel_id(), name),
            mappers::none,
        )
        .await
    }

    /// Read a SIP header of the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn sip_header(&self, header: &str) -> Result<String, ArityError> {
        self.get_variable(&format!("SIP_HEADER({header})")).await
    }

    /// Set a SIP header on the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn set_sip_header(&self, header: &str, value: &str) -> Result<(), ArityError> {
        self.set_variable(&format!("SIP_HEADER({header})"), value).await
    }

    /// Read a PJSIP header of the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn pjsip_header(&self, header: &str) -> Result<String, ArityError> {
        self.get_variable(&format!("PJSIP_HEADER({header})")).await
    }

    /// Set a PJSIP header on the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn set_pjsip_header(&self, header: &str, value: &str) -> Result<(), ArityError> {
        self.set_variable(&format!("PJSIP_HEADER({header})"), value).await
    }

    /// Configure talk detection (`set`/`remove`) on the call
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn set_talk_detect(&self, action: &str, value: &str) -> Result<(), ArityError> {
        self.set_variable(&format!("TALK_DETECT({action})"), value).await
    }

    /// Whether the channel still exists on the switch
    pub async fn is_call_active(&self) -> bool {
        let active = self
            .arity
            .transport()
            .get_channel(self.channel_id())
            .await
            .is_ok();
        tracing::debug!(channel_id = %self.channel_id(), active, "Checked call");
        active
    }

    // Hand-off

    /// Hand the call to `next` and run it
    ///
    /// # Errors
    ///
    /// Returns the failure of `next`
    #[tracing::instrument(skip(self, next), fields(channel_id = %self.channel_id()))]
    pub async fn execute<H: CallHandler>(self, next: H) -> Result<(), ArityError> {
        tracing::debug!("Handing call off");
        Box::new(next).run(self).await
    }

    /// Hand the call to `next`, then hang up whatever the outcome
    ///
    /// # Errors
    ///
    /// Returns the failure of `next`; hangup failures are ignored
    pub async fn execute_with_hangup<H: CallHandler>(self, next: H) -> Result<(), ArityError> {
        let handle = self.handle();
        let result = self.execute(next).await;
        handle.end_call(result).await
    }

    /// Hang up, then re-surface `result`
    ///
    /// # Errors
    ///
    /// Returns the error carried by `result`
    pub async fn end_call<T>(&self, result: Result<T, ArityError>) -> Result<T, ArityError> {
        self.handle().end_call(result).await
    }
}

/// Channel id plus runtime, usable after the controller was handed off
#[derive(Debug, Clone)]
pub struct CallHandle {
    arity: Arity,
    channel_id: String,
}

impl CallHandle {
    /// Channel id
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Hang up the channel
    ///
    /// # Errors
    ///
    /// Returns [`ArityError::HangupFailed`] if the request fails
    pub async fn hangup(&self, reason: Option<HangupReason>) -> Result<(), ArityError> {
        let transport = self.arity.transport();
        retry(
            self.arity.retry_policy(),
            || transport.hangup(&self.channel_id, reason),
            mappers::hangup,
        )
        .await
    }

    /// Hang up ignoring failures, then re-surface `result`
    ///
    /// # Errors
    ///
    /// Returns the error carried by `result`
    pub async fn end_call<T>(&self, result: Result<T, ArityError>) -> Result<T, ArityError> {
        if let Err(e) = self.hangup(None).await {
            tracing::debug!(channel_id = %self.channel_id, error = %e, "Hangup while ending call failed");
        }
        result
    }
}
