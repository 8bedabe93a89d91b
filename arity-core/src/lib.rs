//! ARIty - asynchronous call-control runtime for ARI-style switches
//!
//! This library drives telephony calls on a switch that exposes a
//! request/response control API plus an asynchronous event feed. It features:
//!
//! - **Event correlation**: a first-match waiter registry resolves pending
//!   operations from inbound events, exactly once
//! - **Call lifecycle**: new inbound calls are routed to application
//!   handlers; legs the application creates itself never are
//! - **Cancelable operations**: play, dial, record, DTMF collection and
//!   bridge management, all resolving exactly once even under cancellation
//! - **Retry with error mapping**: transient transport failures are retried
//!   with backoff, terminal ones surface as typed domain errors
//!
//! # Examples
//!
//! ```rust,no_run
//! use arity_core::prelude::*;
//! use arity_core::simulator::SimulatedSwitch;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), ArityError> {
//! let switch = Arc::new(SimulatedSwitch::new().with_auto_complete());
//!
//! let arity = Arity::builder(switch)
//!     .with_app_name("ivr")
//!     .with_handler(|| {
//!         handler_fn(|call: CallController| async move {
//!             call.answer().await?;
//!             let greeting = call.play("hello-world").with_repeat(2);
//!             let result = greeting.run().await.map(|_| ());
//!             call.end_call(result).await
//!         })
//!     })
//!     .connect()
//!     .await?;
//!
//! // ... calls are handled until shutdown
//! arity.shutdown();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

/// Domain errors
pub mod error;

/// Value objects shared across the runtime
pub mod types;

/// Protocol events and their decoding
pub mod event;

/// Boundary to the switch
pub mod transport;

/// Retry/request primitive and error mapping
pub mod retry;

/// Exactly-once completion primitive
pub mod completion;

/// Waiter registry
pub mod registry;

/// Pending legs, call state and call handlers
pub mod lifecycle;

/// Inbound event routing
pub mod dispatcher;

/// Runtime service and configuration
pub mod service;

/// Per-call façade
pub mod controller;

/// Operation framework
pub mod operation;

/// Two-leg outbound dial
pub mod dial;

/// Media playback
pub mod play;

/// Channel recording
pub mod record;

/// DTMF collection
pub mod dtmf;

/// Bridge management
pub mod bridge;

/// In-process simulated switch
pub mod simulator;

// Re-export main types at crate root
pub use bridge::BridgeOperations;
pub use completion::{completion, Completion, Resolver};
pub use controller::{CallController, CallHandle};
pub use dial::{Dial, DialReport, EndedBy};
pub use dispatcher::EventDispatcher;
pub use dtmf::ReceiveDtmf;
pub use error::ArityError;
pub use event::{EventBody, EventKind, ProtocolEvent};
pub use lifecycle::{handler_fn, CallHandler, CallState, FnHandler, PendingLegTracker};
pub use operation::{Operation, OperationCore, OperationResult, OperationState, Outcome};
pub use play::{Play, PlayReport};
pub use record::{Record, RecordingReport};
pub use registry::{Cardinality, Waiter, WaiterHandle, WaiterRegistry};
pub use retry::{retry, RetryPolicy};
pub use service::{Arity, ArityBuilder, ArityConfig, Channels};
pub use transport::{EventStream, SwitchTransport, TransportError};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::BridgeOperations;
    pub use crate::controller::{CallController, CallHandle};
    pub use crate::dial::{Dial, DialReport, EndedBy};
    pub use crate::error::ArityError;
    pub use crate::lifecycle::{handler_fn, CallHandler, CallState};
    pub use crate::operation::{Operation, OperationState, Outcome};
    pub use crate::play::{Play, PlayReport};
    pub use crate::service::{Arity, ArityConfig};
    pub use crate::transport::SwitchTransport;
    pub use crate::types::{DialStatus, HangupReason, MediaSource, MuteDirection, RecordOptions};
}
