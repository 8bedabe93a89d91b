//! Shared harness for integration tests against the simulated switch

#![allow(dead_code)]

use arity_core::simulator::{events, SimulatedSwitch};
use arity_core::{Arity, ArityConfig, CallController, CallState, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub switch: Arc<SimulatedSwitch>,
    pub arity: Arity,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_config() -> ArityConfig {
    ArityConfig {
        app_name: "test".to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_ms: 0,
        },
        ..ArityConfig::default()
    }
}

pub async fn connect(switch: SimulatedSwitch) -> Harness {
    connect_with(switch, fast_config()).await
}

pub async fn connect_with(switch: SimulatedSwitch, config: ArityConfig) -> Harness {
    init_tracing();
    let switch = Arc::new(switch);
    let arity = Arity::connect(switch.clone(), config)
        .await
        .expect("connect to simulated switch");
    Harness { switch, arity }
}

impl Harness {
    /// Controller for a channel known to the switch, without going through a handler
    pub fn call(&self, channel_id: &str) -> CallController {
        let event = events::start(channel_id);
        let state = match &event.body {
            arity_core::EventBody::ApplicationStart { channel, args } => {
                CallState::new(channel.clone(), args.clone(), event.received_at)
            }
            _ => unreachable!(),
        };
        self.arity.lifecycle().track_pending_leg(channel_id);
        self.switch.emit(event);
        CallController::new(state, self.arity.clone())
    }
}

/// Poll `condition` until it holds, failing after two seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Give the dispatch task time to drain queued events
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
