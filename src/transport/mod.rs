//! Transport abstraction for agent-to-agent messaging.
//!
//! Both concrete transports implement the same capability contract; an
//! agent holds one of them and never needs to know which.

pub mod file;
pub mod message;
pub mod socket;

pub use file::FileTransport;
pub use message::{Message, MessageMetadata, BROADCAST_TARGET};
pub use socket::{SocketTransport, SocketTransportConfig};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Boxed future returned by message handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// An async message handler.
pub type MessageHandler = Arc<dyn Fn(Message) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

/// Capability contract implemented by every transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Idempotent one-time setup (directories, state).
    async fn initialize(&self) -> Result<()>;

    /// Start the receive side. No-op when already listening.
    async fn start_listening(&self) -> Result<()>;

    /// Stop the receive side and release timers/sockets synchronously; no
    /// dispatch happens after this returns. No-op when not listening.
    async fn stop_listening(&self);

    /// Build and dispatch a [`Message`], returning it while delivery
    /// proceeds.
    async fn send_message(
        &self,
        target: &str,
        content: Value,
        message_type: &str,
        conversation_id: Option<String>,
    ) -> Result<Message>;

    /// Reply to a received message: source and target swap, the
    /// conversation id is preserved.
    async fn send_response(&self, original: &Message, content: Value) -> Result<Message> {
        self.send_message(
            &original.source,
            content,
            message::message_type::RESPONSE,
            Some(original.metadata.conversation_id.clone()),
        )
        .await
    }

    /// Register the handler for one message type. Re-registering a type
    /// overwrites the previous handler.
    fn on_message_type(&self, message_type: &str, handler: MessageHandler);

    /// Register a handler fired for every inbound message regardless of
    /// type.
    fn on_message_received(&self, handler: MessageHandler);

    /// Transport kind and liveness diagnostics. Never fails.
    fn transport_info(&self) -> TransportInfo;
}

/// Transport kind plus liveness diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransportInfo {
    pub kind: String,
    pub details: Value,
}

/// Per-instance handler table: one handler per message type plus a list of
/// catch-all handlers. Owned by a single transport, never shared between
/// instances.
#[derive(Default)]
pub struct HandlerTable {
    by_type: Mutex<HashMap<String, MessageHandler>>,
    general: Mutex<Vec<MessageHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_type_handler(&self, message_type: impl Into<String>, handler: MessageHandler) {
        self.by_type
            .lock()
            .unwrap()
            .insert(message_type.into(), handler);
    }

    pub fn add_general_handler(&self, handler: MessageHandler) {
        self.general.lock().unwrap().push(handler);
    }

    /// Run the handler pipeline for one inbound message: every general
    /// handler, then the type handler (falling back to `"default"`).
    /// Handler errors are logged here and never propagate -- one bad
    /// message must not stop the listening loop.
    pub async fn dispatch(&self, message: &Message) {
        let general: Vec<MessageHandler> = self.general.lock().unwrap().clone();
        for h in general {
            if let Err(e) = h(message.clone()).await {
                tracing::warn!("Message handler error for {}: {}", message.id, e);
            }
        }

        let typed = {
            let by_type = self.by_type.lock().unwrap();
            by_type
                .get(&message.metadata.message_type)
                .or_else(|| by_type.get("default"))
                .cloned()
        };

        match typed {
            Some(h) => {
                if let Err(e) = h(message.clone()).await {
                    tracing::warn!(
                        "Handler error for type '{}' on {}: {}",
                        message.metadata.message_type,
                        message.id,
                        e
                    );
                }
            }
            None => {
                tracing::debug!(
                    "No handler for message type '{}'",
                    message.metadata.message_type
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> MessageHandler {
        handler(move |_msg| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_dispatch_runs_general_and_typed() {
        let table = HandlerTable::new();
        let general = Arc::new(AtomicUsize::new(0));
        let typed = Arc::new(AtomicUsize::new(0));

        table.add_general_handler(counting_handler(general.clone()));
        table.set_type_handler("text", counting_handler(typed.clone()));

        let msg = Message::new("a", "b", json!({"text": "hi"}), "text", None);
        table.dispatch(&msg).await;

        assert_eq!(general.load(Ordering::SeqCst), 1);
        assert_eq!(typed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reregistering_type_overwrites() {
        let table = HandlerTable::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        table.set_type_handler("text", counting_handler(first.clone()));
        table.set_type_handler("text", counting_handler(second.clone()));

        let msg = Message::new("a", "b", json!({}), "text", None);
        table.dispatch(&msg).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_handler_catches_unknown_types() {
        let table = HandlerTable::new();
        let fallback = Arc::new(AtomicUsize::new(0));
        table.set_type_handler("default", counting_handler(fallback.clone()));

        let msg = Message::new("a", "b", json!({}), "mystery", None);
        table.dispatch(&msg).await;

        assert_eq!(fallback.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_pipeline() {
        let table = HandlerTable::new();
        let after = Arc::new(AtomicUsize::new(0));

        table.add_general_handler(handler(|_msg| async {
            Err(crate::error::Error::Other("boom".to_string()))
        }));
        table.set_type_handler("text", counting_handler(after.clone()));

        let msg = Message::new("a", "b", json!({}), "text", None);
        table.dispatch(&msg).await;

        // The failing general handler was logged, the typed one still ran.
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }
}
