//! Per-instance event bus for transport and bridge observability.
//!
//! Every transport and bridge owns its own bus; nothing is routed through a
//! process-wide hub, so listeners on one instance never see another
//! instance's traffic. Translation events carry the protocol pair only --
//! payload content must never reach the bus.

use tokio::sync::broadcast;

/// Events emitted by transports and the translation bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A message was handed to the transport for delivery.
    MessageSent { id: String, target: String },
    /// A message addressed to this agent was dispatched to handlers.
    MessageReceived { id: String, source: String },
    /// Socket connection established (or re-established).
    Connected,
    /// Socket connection lost.
    Disconnected,
    /// A reconnect attempt has been scheduled.
    ReconnectScheduled { attempt: u32, delay_ms: u64 },
    /// Reconnection abandoned after exceeding the attempt ceiling.
    ReconnectExhausted { attempts: u32 },
    /// Server-pushed notification content arrived on a system frame.
    Notification(String),
    /// A message payload was translated between two protocols.
    MessageTranslated { source: String, target: String },
    /// A capability descriptor was translated between two protocols.
    CapabilityTranslated { source: String, target: String },
    /// A tool definition was translated between two protocols.
    ToolTranslated { source: String, target: String },
    /// An ad-hoc translation ran between two caller-described protocols.
    DynamicTranslation { source: String, target: String },
    /// A custom protocol was taught (or re-taught) to the registry.
    ProtocolLearned { name: String },
    /// A built-in protocol descriptor was refreshed.
    ProtocolUpdated { name: String },
}

/// Broadcast-backed event bus owned by a single transport or bridge.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emit an event. Silently dropped when nobody is subscribed.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
