//! WebSocket duplex transport with heartbeat and reconnecting backoff.
//!
//! One connection-driver task owns the socket for the lifetime of the
//! transport: connect, register, then a select loop over the outbound
//! queue, inbound frames, and the heartbeat tick. Because the driver is a
//! single sequential task, at most one reconnect delay can ever be pending
//! and the state machine below cannot be driven from two places at once.
//!
//! Messages sent while disconnected are not dropped: they sit in the
//! unbounded outbound queue and flush, in order, once the socket reopens.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

use super::message::{now_iso, ControlFrame, InboundFrame, Message, SystemSubtype};
use super::{HandlerTable, MessageHandler, Transport, TransportInfo};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};

/// Ceiling applied to the exponential reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Message>;

/// Connection lifecycle. Owned by the driver task; readers only observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Backoff(u32),
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff(_) => "backoff",
            ConnectionState::Failed => "failed",
        }
    }
}

/// Socket transport tuning.
#[derive(Debug, Clone)]
pub struct SocketTransportConfig {
    pub server_url: String,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl SocketTransportConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            auto_reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_base_delay: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Reconnect delay for the given attempt (1-based):
/// `min(30s, base * 1.5^(attempt - 1))`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1.5_f64.powi(attempt.saturating_sub(1) as i32);
    let ms = (base.as_millis() as f64 * factor).min(MAX_RECONNECT_DELAY.as_millis() as f64);
    Duration::from_millis(ms as u64)
}

/// Persistent duplex transport over a WebSocket connection.
pub struct SocketTransport {
    agent_id: String,
    config: SocketTransportConfig,
    handlers: Arc<HandlerTable>,
    events: EventBus,
    state: Arc<Mutex<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    listening: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SocketTransport {
    pub fn new(agent_id: impl Into<String>, config: SocketTransportConfig) -> Self {
        Self {
            agent_id: agent_id.into(),
            config,
            handlers: Arc::new(HandlerTable::new()),
            events: EventBus::default(),
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            attempts: Arc::new(AtomicU32::new(0)),
            listening: Arc::new(AtomicBool::new(false)),
            outbound: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    /// The event bus owned by this instance.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Failed)
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn initialize(&self) -> Result<()> {
        tracing::debug!(
            "Socket transport ready for {} -> {}",
            self.agent_id,
            self.config.server_url
        );
        Ok(())
    }

    async fn start_listening(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            tracing::debug!("Already listening on {}", self.config.server_url);
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap() = Some(tx);

        let driver = Driver {
            agent_id: self.agent_id.clone(),
            config: self.config.clone(),
            handlers: self.handlers.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            attempts: self.attempts.clone(),
            listening: self.listening.clone(),
            rx,
            carryover: None,
        };
        *self.driver.lock().unwrap() = Some(tokio::spawn(driver.run()));

        tracing::info!("Connecting to {}", self.config.server_url);
        Ok(())
    }

    async fn stop_listening(&self) {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return;
        }

        // Dropping the sender and aborting the driver releases the socket,
        // heartbeat, and any pending reconnect delay at once.
        *self.outbound.lock().unwrap() = None;
        if let Some(handle) = self.driver.lock().unwrap().take() {
            handle.abort();
        }
        *self.state.lock().unwrap() = ConnectionState::Idle;
        tracing::info!("Stopped listening on {}", self.config.server_url);
    }

    async fn send_message(
        &self,
        target: &str,
        content: Value,
        message_type: &str,
        conversation_id: Option<String>,
    ) -> Result<Message> {
        let tx = self
            .outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| {
                Error::NotConnected(
                    "socket transport is not listening; call start_listening first".to_string(),
                )
            })?;

        let message = Message::new(&self.agent_id, target, content, message_type, conversation_id);
        let raw = serde_json::to_string(&message)?;

        tx.send(raw)
            .map_err(|_| Error::NotConnected("connection driver has shut down".to_string()))?;

        self.events.emit(Event::MessageSent {
            id: message.id.clone(),
            target: target.to_string(),
        });
        tracing::debug!("Queued message {} for {}", message.id, target);

        Ok(message)
    }

    fn on_message_type(&self, message_type: &str, handler: MessageHandler) {
        self.handlers.set_type_handler(message_type, handler);
    }

    fn on_message_received(&self, handler: MessageHandler) {
        self.handlers.add_general_handler(handler);
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            kind: "socket".to_string(),
            details: json!({
                "serverUrl": self.config.server_url,
                "state": self.connection_state().as_str(),
                "connected": self.connection_state() == ConnectionState::Connected,
                "reconnectAttempts": self.attempts.load(Ordering::SeqCst),
                "listening": self.listening.load(Ordering::SeqCst),
            }),
        }
    }
}

/// The connection-driver task.
struct Driver {
    agent_id: String,
    config: SocketTransportConfig,
    handlers: Arc<HandlerTable>,
    events: EventBus,
    state: Arc<Mutex<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    listening: Arc<AtomicBool>,
    rx: mpsc::UnboundedReceiver<String>,
    /// Frame pulled from the queue but not yet delivered when the socket
    /// dropped; re-sent first on the next session so nothing is lost.
    carryover: Option<String>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            if !self.listening.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Idle);
                return;
            }

            self.set_state(ConnectionState::Connecting);
            match connect_async(self.config.server_url.as_str()).await {
                Ok((ws, _)) => {
                    self.attempts.store(0, Ordering::SeqCst);
                    self.session(ws).await;
                    self.events.emit(Event::Disconnected);
                }
                Err(e) => {
                    tracing::warn!("Connection to {} failed: {}", self.config.server_url, e);
                }
            }

            if !self.listening.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Idle);
                return;
            }
            if !self.config.auto_reconnect {
                self.set_state(ConnectionState::Idle);
                return;
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.config.max_reconnect_attempts {
                tracing::error!(
                    "Giving up on {} after {} reconnect attempts",
                    self.config.server_url,
                    self.config.max_reconnect_attempts
                );
                self.set_state(ConnectionState::Failed);
                self.events.emit(Event::ReconnectExhausted {
                    attempts: self.config.max_reconnect_attempts,
                });
                return;
            }

            let delay = backoff_delay(self.config.reconnect_base_delay, attempt);
            tracing::info!(
                "Reconnecting to {} in {:?} (attempt {})",
                self.config.server_url,
                delay,
                attempt
            );
            self.set_state(ConnectionState::Backoff(attempt));
            self.events.emit(Event::ReconnectScheduled {
                attempt,
                delay_ms: delay.as_millis() as u64,
            });
            tokio::time::sleep(delay).await;
        }
    }

    /// One connected session: register, heartbeat, pump frames until the
    /// socket closes.
    async fn session(&mut self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let (mut sink, mut stream) = ws.split();

        let register = ControlFrame::Register {
            source: self.agent_id.clone(),
            timestamp: now_iso(),
        };
        if send_frame(&mut sink, &register).await.is_err() {
            return;
        }

        self.set_state(ConnectionState::Connected);
        self.events.emit(Event::Connected);
        tracing::info!("Connected to {}", self.config.server_url);

        // Deliver the frame that was in flight when the last session died.
        if let Some(raw) = self.carryover.take() {
            if sink.send(tungstenite::Message::Text(raw.clone())).await.is_err() {
                self.carryover = Some(raw);
                return;
            }
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // skip the immediate first tick

        let agent_id = self.agent_id.clone();
        let handlers = self.handlers.clone();
        let events = self.events.clone();

        loop {
            tokio::select! {
                queued = self.rx.recv() => match queued {
                    Some(raw) => {
                        if sink.send(tungstenite::Message::Text(raw.clone())).await.is_err() {
                            self.carryover = Some(raw);
                            break;
                        }
                    }
                    // Transport handle dropped the sender: shutting down.
                    None => return,
                },
                frame = stream.next() => match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text(&agent_id, &handlers, &events, &mut sink, &text).await;
                    }
                    Some(Ok(tungstenite::Message::Ping(payload))) => {
                        let _ = sink.send(tungstenite::Message::Pong(payload)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        tracing::info!("Connection to {} closed", self.config.server_url);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Socket error: {}", e);
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    let ping = ControlFrame::Ping {
                        source: agent_id.clone(),
                        timestamp: now_iso(),
                    };
                    if send_frame(&mut sink, &ping).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: &ControlFrame) -> Result<()> {
    let raw = serde_json::to_string(frame)?;
    sink.send(tungstenite::Message::Text(raw))
        .await
        .map_err(|e| Error::NotConnected(e.to_string()))
}

/// Decode one inbound text frame and act on it.
async fn handle_text(
    agent_id: &str,
    handlers: &HandlerTable,
    events: &EventBus,
    sink: &mut WsSink,
    text: &str,
) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Undecodable frame dropped: {}", e);
            return;
        }
    };

    match frame {
        InboundFrame::Control(ControlFrame::Pong { .. }) => {
            tracing::trace!("Heartbeat pong received");
        }
        InboundFrame::Control(ControlFrame::Ping { .. }) => {
            let pong = ControlFrame::Pong {
                source: agent_id.to_string(),
                timestamp: now_iso(),
            };
            let _ = send_frame(sink, &pong).await;
        }
        InboundFrame::Control(ControlFrame::System { subtype, content }) => match subtype {
            SystemSubtype::Welcome => {
                tracing::info!("Server welcome: {}", content);
            }
            SystemSubtype::Error => {
                tracing::warn!("Server error frame: {}", content);
            }
            SystemSubtype::Notification => {
                events.emit(Event::Notification(content.to_string()));
            }
        },
        InboundFrame::Control(ControlFrame::Register { .. }) => {
            // Client-to-server handshake; nothing to do on this side.
        }
        InboundFrame::Message(message) => {
            if !message.is_for(agent_id) {
                return;
            }
            handlers.dispatch(&message).await;
            events.emit(Event::MessageReceived {
                id: message.id.clone(),
                source: message.source.clone(),
            });
        }
    }
}
