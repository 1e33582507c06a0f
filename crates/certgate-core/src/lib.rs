//! # Certgate Core Library
//!
//! Domain model and contracts for the external-authority gateway.
//!
//! ## Modules
//!
//! - `domain` - Authority configuration, call outcomes, reports, events
//! - `error` - Gateway error taxonomy
//! - `event_bus` - Broadcast sink for gateway events
//! - `service` - Collaborator traits (data transform, audit, metrics)

pub mod domain;
pub mod error;
pub mod event_bus;
pub mod service;

pub use domain::*;
pub use error::{GatewayError, GatewayResult, TransportErrorKind};
pub use event_bus::{EventBus, EventReceiver, EventSender, SharedEventBus};
pub use service::*;
