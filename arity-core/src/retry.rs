//! Retry/request primitive
//!
//! [`retry`] wraps one outbound request. Transient failures are re-issued with
//! exponential backoff; terminal failures are translated into an
//! [`ArityError`] by an injected mapping function. This is the only place raw
//! [`TransportError`]s become domain errors.

use crate::error::ArityError;
use crate::transport::TransportError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound on the backoff delay
    pub max_delay_ms: u64,
    /// Random jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            jitter_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

/// Issue `action` until it succeeds, fails terminally, or the policy is exhausted
///
/// Terminal failures go through `map`; a `None` from the mapper passes the
/// failure through as [`ArityError::OperationFailed`] with the original message.
///
/// # Errors
///
/// Returns the mapped terminal failure, or [`ArityError::TransientTransport`]
/// when every attempt failed transiently
pub async fn retry<T, F, Fut, M>(policy: &RetryPolicy, mut action: F, map: M) -> Result<T, ArityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
    M: Fn(&TransportError) -> Option<ArityError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt >= max_attempts {
                    tracing::warn!(attempt, error = %err, "Transient failure, retries exhausted");
                    return Err(ArityError::TransientTransport {
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                tracing::debug!(error = %err, "Request failed");
                return Err(map(&err).unwrap_or_else(|| ArityError::OperationFailed(err.to_string())));
            }
        }
    }
}

/// Kind-specific mappings from raw failures to domain errors
pub mod mappers {
    use super::{ArityError, TransportError};

    /// Leave every failure unmapped
    #[must_use]
    pub fn none(_err: &TransportError) -> Option<ArityError> {
        None
    }

    /// Failures while originating or dialing a leg
    #[must_use]
    pub fn dial(err: &TransportError) -> Option<ArityError> {
        Some(ArityError::DialFailed(err.message().to_string()))
    }

    /// Failures while hanging up
    #[must_use]
    pub fn hangup(err: &TransportError) -> Option<ArityError> {
        Some(ArityError::HangupFailed(err.message().to_string()))
    }

    /// Failures while starting a playback of `media`
    pub fn playback(media: &str) -> impl Fn(&TransportError) -> Option<ArityError> + '_ {
        move |err| {
            Some(ArityError::PlaybackFailed {
                media: media.to_string(),
                message: err.message().to_string(),
            })
        }
    }

    /// Failures while starting or stopping recording `name`
    pub fn recording(name: &str) -> impl Fn(&TransportError) -> Option<ArityError> + '_ {
        move |err| {
            Some(ArityError::RecordingFailed {
                name: name.to_string(),
                message: err.message().to_string(),
            })
        }
    }

    /// Failures of bridge membership requests, keyed on the switch's messages
    #[must_use]
    pub fn bridge(err: &TransportError) -> Option<ArityError> {
        let message = err.message();
        match message {
            "Bridge not found" => Some(ArityError::BridgeNotFound(message.to_string())),
            "Channel not found" | "Channel not in this bridge" => {
                Some(ArityError::ChannelNotInBridge(message.to_string()))
            }
            "Channel not in Stasis application" => {
                Some(ArityError::ChannelNotAllowedInBridge(message.to_string()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_ms: 0,
        }
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_ms: 0,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let mut calls = 0u32;
        let result = retry(
            &fast_policy(5),
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(TransportError::Timeout("slow".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            mappers::none,
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_transient_error() {
        let mut calls = 0u32;
        let result: Result<(), _> = retry(
            &fast_policy(2),
            || {
                calls += 1;
                async { Err(TransportError::ConnectionClosed("reset".into())) }
            },
            mappers::dial,
        )
        .await;
        assert_eq!(calls, 2);
        assert!(matches!(
            result,
            Err(ArityError::TransientTransport { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn terminal_failure_is_mapped_without_retry() {
        let mut calls = 0u32;
        let result: Result<(), _> = retry(
            &fast_policy(5),
            || {
                calls += 1;
                async { Err(TransportError::rejected(404, "Bridge not found")) }
            },
            mappers::bridge,
        )
        .await;
        assert_eq!(calls, 1);
        assert_eq!(
            result,
            Err(ArityError::BridgeNotFound("Bridge not found".into()))
        );
    }

    #[tokio::test]
    async fn unmapped_failure_keeps_message() {
        let result: Result<(), _> = retry(
            &fast_policy(1),
            || async { Err(TransportError::rejected(409, "Channel in invalid state")) },
            mappers::bridge,
        )
        .await;
        assert_eq!(
            result,
            Err(ArityError::OperationFailed("Channel in invalid state".into()))
        );
    }
}
