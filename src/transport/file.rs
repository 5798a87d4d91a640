//! File-based polling mailbox transport.
//!
//! Agents with no direct network path exchange messages through a shared
//! directory: one `<message-id>.json` file per send, scanned on a fixed
//! interval by every agent. A message addressed to the local agent is
//! dispatched and the file atomically renamed to a `.processed` marker --
//! the rename is the sole concurrency control (a file renamed before a
//! concurrent scanner reads it no longer matches the unprocessed filter)
//! and doubles as an audit trail. Messages for other agents are left
//! untouched; the directory is a broadcast medium scanned independently by
//! every agent.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use super::message::Message;
use super::{HandlerTable, MessageHandler, Transport, TransportInfo};
use crate::error::Result;
use crate::events::{Event, EventBus};

/// Canonical scan interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const PROCESSED_SUFFIX: &str = ".processed";

/// Shared-directory polling mailbox.
pub struct FileTransport {
    core: Arc<MailboxCore>,
    listening: Arc<AtomicBool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between the transport handle and its poll task.
struct MailboxCore {
    agent_id: String,
    dir: PathBuf,
    poll_interval: Duration,
    handlers: HandlerTable,
    events: EventBus,
    /// Unix-millis mtime checkpoint; files at or after it are candidates.
    /// Starts at zero so unprocessed mail survives a crash or restart.
    checkpoint: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    errors: AtomicU64,
}

impl FileTransport {
    pub fn new(agent_id: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self::with_poll_interval(agent_id, dir, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        agent_id: impl Into<String>,
        dir: impl AsRef<Path>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            core: Arc::new(MailboxCore {
                agent_id: agent_id.into(),
                dir: dir.as_ref().to_path_buf(),
                poll_interval,
                handlers: HandlerTable::new(),
                events: EventBus::default(),
                checkpoint: AtomicU64::new(0),
                sent: AtomicU64::new(0),
                received: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
            listening: Arc::new(AtomicBool::new(false)),
            poll_task: Mutex::new(None),
        }
    }

    /// The event bus owned by this instance.
    pub fn events(&self) -> &EventBus {
        &self.core.events
    }

    /// Run one mailbox scan: parse unprocessed files newer than the
    /// checkpoint, dispatch the ones addressed to this agent, and rename
    /// them to their processed markers. Returns how many were dispatched.
    pub async fn poll_once(&self) -> Result<usize> {
        self.core.poll_once().await
    }

    /// Remove every message and marker file, resetting the conversation.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        if !self.core.dir.exists() {
            return Ok(0);
        }

        for entry in fs::read_dir(&self.core.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.ends_with(".json") || name.ends_with(PROCESSED_SUFFIX) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        tracing::info!("Cleared {} files from mailbox {}", removed, self.core.dir.display());
        Ok(removed)
    }
}

impl MailboxCore {
    async fn poll_once(&self) -> Result<usize> {
        let scan_started = now_millis();
        let checkpoint = self.checkpoint.load(Ordering::SeqCst);
        let mut dispatched = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Mailbox scan entry error: {}", e);
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
            };

            let name = entry.file_name();
            let name = name.to_string_lossy().to_string();
            if !name.ends_with(".json") {
                continue;
            }

            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(unix_millis)
                .unwrap_or(0);
            if mtime < checkpoint {
                continue;
            }

            let path = entry.path();
            let message: Message = match fs::read_to_string(&path)
                .map_err(crate::error::Error::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
            {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Skipping unparseable mailbox file {}: {}", name, e);
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
            };

            // Only exact-id matches are consumed; anything else belongs to
            // other scanners of the shared directory.
            if message.target != self.agent_id {
                continue;
            }

            tracing::debug!(
                "Mailbox message {} from {} ({})",
                message.id,
                message.source,
                message.metadata.message_type
            );

            self.handlers.dispatch(&message).await;
            self.received.fetch_add(1, Ordering::SeqCst);
            self.events.emit(Event::MessageReceived {
                id: message.id.clone(),
                source: message.source.clone(),
            });

            let processed = path.with_file_name(format!("{}{}", name, PROCESSED_SUFFIX));
            if let Err(e) = fs::rename(&path, &processed) {
                tracing::warn!("Failed to mark {} processed: {}", name, e);
                self.errors.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            dispatched += 1;
        }

        // One second of slack for filesystems with coarse mtime
        // granularity; the processed-rename keeps re-reads harmless.
        self.checkpoint
            .store(scan_started.saturating_sub(1000), Ordering::SeqCst);
        Ok(dispatched)
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.core.dir)?;
        tracing::debug!("Mailbox directory ready: {}", self.core.dir.display());
        Ok(())
    }

    async fn start_listening(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            tracing::debug!("Already listening on mailbox");
            return Ok(());
        }

        fs::create_dir_all(&self.core.dir)?;

        let core = self.core.clone();
        let listening = self.listening.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(core.poll_interval);
            loop {
                ticker.tick().await;
                if !listening.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = core.poll_once().await {
                    tracing::warn!("Mailbox scan failed: {}", e);
                    core.errors.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        *self.poll_task.lock().unwrap() = Some(handle);
        tracing::info!(
            "Listening on mailbox {} every {:?}",
            self.core.dir.display(),
            self.core.poll_interval
        );
        Ok(())
    }

    async fn stop_listening(&self) {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.poll_task.lock().unwrap().take() {
            handle.abort();
        }
        tracing::info!("Stopped listening on mailbox {}", self.core.dir.display());
    }

    async fn send_message(
        &self,
        target: &str,
        content: Value,
        message_type: &str,
        conversation_id: Option<String>,
    ) -> Result<Message> {
        let message = Message::new(
            &self.core.agent_id,
            target,
            content,
            message_type,
            conversation_id,
        );

        fs::create_dir_all(&self.core.dir)?;
        let path = self.core.dir.join(format!("{}.json", message.id));
        let raw = serde_json::to_string_pretty(&message)?;
        fs::write(&path, raw)?;

        self.core.sent.fetch_add(1, Ordering::SeqCst);
        self.core.events.emit(Event::MessageSent {
            id: message.id.clone(),
            target: target.to_string(),
        });
        tracing::debug!("Wrote message {} for {}", message.id, target);

        Ok(message)
    }

    fn on_message_type(&self, message_type: &str, handler: MessageHandler) {
        self.core.handlers.set_type_handler(message_type, handler);
    }

    fn on_message_received(&self, handler: MessageHandler) {
        self.core.handlers.add_general_handler(handler);
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            kind: "file".to_string(),
            details: json!({
                "dir": self.core.dir.display().to_string(),
                "listening": self.listening.load(Ordering::SeqCst),
                "pollIntervalMs": self.core.poll_interval.as_millis() as u64,
                "messagesSent": self.core.sent.load(Ordering::SeqCst),
                "messagesReceived": self.core.received.load(Ordering::SeqCst),
                "errors": self.core.errors.load(Ordering::SeqCst),
            }),
        }
    }
}

fn now_millis() -> u64 {
    unix_millis(SystemTime::now())
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
