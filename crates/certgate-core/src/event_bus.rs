//! Event Bus - gateway event distribution
//!
//! The injected event sink for the gateway. Components hold an
//! [`EventSender`]; monitoring surfaces, tests and audit bridges subscribe.
//!
//! ```text
//! Producers:                         Consumers:
//! ├─ Dispatcher (call_completed)     ├─ health / monitoring
//! ├─ CircuitBreaker (circuit_*)      ├─ test assertions
//! ├─ AuthProvider (token_*)          └─ log bridges
//! └─ Gateway / Aggregator
//! ```

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::GatewayEvent;

/// Default channel capacity for the event bus
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub for [`GatewayEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a sender for emitting events
    pub fn sender(&self) -> EventSender {
        EventSender::new(self.sender.clone())
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheaply cloneable emitting half of the bus
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventSender {
    fn new(sender: broadcast::Sender<GatewayEvent>) -> Self {
        Self { sender }
    }

    /// Sender with no bus behind it; every emit is dropped
    pub fn detached() -> Self {
        EventBus::with_capacity(1).sender()
    }

    /// Emit an event. Returns the number of receivers; 0 is not an error.
    pub fn emit(&self, event: GatewayEvent) -> usize {
        let type_name = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => 0,
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Receiving half for one consumer
pub struct EventReceiver {
    receiver: broadcast::Receiver<GatewayEvent>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<GatewayEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event, skipping over lag. `None` once closed.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "[EventBus] Receiver lagged, skipped {} events", skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<GatewayEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(
                    skipped_events = skipped,
                    "[EventBus] Receiver lagged on try_recv"
                );
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<GatewayEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

pub type SharedEventBus = Arc<EventBus>;
