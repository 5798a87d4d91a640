//! CLI commands for agentwire using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;

use crate::bridge::ProtocolBridge;
use crate::config::{load_settings, save_settings, Settings};
use crate::directory::{AgentRegistration, DirectoryClient};
use crate::transport::socket::SocketTransportConfig;
use crate::transport::{handler, FileTransport, SocketTransport, Transport};

/// agentwire - agent-to-agent messaging with protocol translation.
#[derive(Parser)]
#[command(name = "agentwire")]
#[command(version = "0.1.0")]
#[command(about = "Agent-to-agent messaging with runtime protocol translation", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default settings file
    Setup,

    /// Listen for messages on a transport
    Listen {
        /// Transport to use: file or socket
        #[arg(default_value = "file")]
        transport: String,
    },

    /// Send a message over the file transport
    Send {
        /// Target agent id
        target: String,
        /// Message body
        message: String,
        /// Message type
        #[arg(long, default_value = "query")]
        message_type: String,
        /// Conversation id to thread onto
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Remove every message and marker file from the mailbox
    Clear,

    /// Show transport diagnostics
    Info {
        /// Transport to inspect: file or socket
        #[arg(default_value = "file")]
        transport: String,
    },

    /// Translate a JSON payload between two protocols
    Translate {
        /// Source payload as JSON
        source: String,
        /// Source protocol name
        #[arg(long)]
        from: String,
        /// Target protocol name
        #[arg(long)]
        to: String,
        /// Artifact kind: message, capability, or tool
        #[arg(long, default_value = "message")]
        kind: String,
    },
}

impl Commands {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Setup => run_setup(),
            Command::Listen { transport } => run_listen(&transport).await,
            Command::Send {
                target,
                message,
                message_type,
                conversation,
            } => run_send(&target, &message, &message_type, conversation).await,
            Command::Clear => run_clear(),
            Command::Info { transport } => run_info(&transport).await,
            Command::Translate {
                source,
                from,
                to,
                kind,
            } => run_translate(&source, &from, &to, &kind).await,
        }
    }
}

fn run_setup() -> Result<()> {
    let path = crate::config::get_settings_path()?;
    if path.exists() {
        println!("Settings already exist at {}", path.display());
        return Ok(());
    }

    let settings = Settings::default();
    save_settings(&settings)?;
    println!("Wrote default settings to {}", path.display());
    println!("Edit agent.id before connecting to a shared mailbox.");
    Ok(())
}

async fn run_listen(transport_name: &str) -> Result<()> {
    let settings = load_settings()?;

    // Announce ourselves to the directory once; a failure is surfaced but
    // does not prevent listening.
    if let Some(url) = &settings.directory.url {
        let registration = AgentRegistration::from_settings(&settings);
        if let Err(e) = DirectoryClient::new(url).register(&registration).await {
            tracing::warn!("Directory registration failed: {}", e);
        }
    }

    let transport = build_transport(transport_name, &settings)?;

    transport.on_message_received(handler(|msg| async move {
        tracing::info!(
            "[{}] {} from {}: {}",
            msg.metadata.message_type,
            msg.id,
            msg.source,
            msg.content
        );
        Ok(())
    }));

    transport.initialize().await?;
    transport.start_listening().await?;
    println!(
        "Listening as '{}' on the {} transport. Ctrl-C to stop.",
        settings.agent.id, transport_name
    );

    tokio::signal::ctrl_c().await?;
    transport.stop_listening().await;
    println!("Stopped.");
    Ok(())
}

async fn run_send(
    target: &str,
    message: &str,
    message_type: &str,
    conversation: Option<String>,
) -> Result<()> {
    let settings = load_settings()?;
    let transport = file_transport(&settings)?;

    let content = serde_json::from_str(message)
        .unwrap_or_else(|_| serde_json::json!({ "text": message }));
    let sent = transport
        .send_message(target, content, message_type, conversation)
        .await?;

    println!("Sent {} to {}", sent.id, target);
    println!("Conversation: {}", sent.metadata.conversation_id);
    Ok(())
}

fn run_clear() -> Result<()> {
    let settings = load_settings()?;
    let transport = file_transport(&settings)?;
    let removed = transport.clear()?;
    println!("Removed {} files from the mailbox", removed);
    Ok(())
}

async fn run_info(transport_name: &str) -> Result<()> {
    let settings = load_settings()?;
    let transport = build_transport(transport_name, &settings)?;
    let info = transport.transport_info();
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run_translate(source: &str, from: &str, to: &str, kind: &str) -> Result<()> {
    let settings = load_settings().unwrap_or_default();
    let bridge = ProtocolBridge::new(&settings.model);

    let payload: Value = serde_json::from_str(source)?;
    let translated = match kind {
        "capability" => bridge.translate_capability(&payload, from, to).await?,
        "tool" => bridge.translate_tool(&payload, from, to).await?,
        _ => bridge.translate_message(&payload, from, to).await?,
    };

    println!("{}", serde_json::to_string_pretty(&translated)?);
    Ok(())
}

fn file_transport(settings: &Settings) -> Result<FileTransport> {
    let dir = settings.mailbox.resolve_dir()?;
    Ok(FileTransport::with_poll_interval(
        &settings.agent.id,
        dir,
        std::time::Duration::from_millis(settings.mailbox.poll_interval_ms),
    ))
}

fn build_transport(name: &str, settings: &Settings) -> Result<Arc<dyn Transport>> {
    match name {
        "socket" => {
            let url = settings.socket.url.clone().ok_or_else(|| {
                anyhow::anyhow!("socket.url is not configured; edit settings.json")
            })?;
            let mut config = SocketTransportConfig::new(url);
            config.auto_reconnect = settings.socket.auto_reconnect;
            config.max_reconnect_attempts = settings.socket.max_reconnect_attempts;
            config.reconnect_base_delay =
                std::time::Duration::from_millis(settings.socket.reconnect_base_delay_ms);
            config.heartbeat_interval =
                std::time::Duration::from_secs(settings.socket.heartbeat_interval_secs);
            Ok(Arc::new(SocketTransport::new(&settings.agent.id, config)))
        }
        "file" => Ok(Arc::new(file_transport(settings)?)),
        other => Err(anyhow::anyhow!(
            "unknown transport '{}'; expected 'file' or 'socket'",
            other
        )),
    }
}
