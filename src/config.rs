//! Configuration loading for agentwire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the agentwire home directory (~/.agentwire).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agentwire"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.agentwire/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'agentwire setup' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write settings to ~/.agentwire/settings.json.
pub fn save_settings(settings: &Settings) -> Result<()> {
    let path = get_settings_path()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;

    tracing::info!("Saved settings to {}", path.display());
    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.agent.id.trim().is_empty() {
        return Err(Error::Config("agent.id must not be empty".to_string()));
    }

    if settings.mailbox.poll_interval_ms == 0 {
        return Err(Error::Config(
            "mailbox.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if settings.socket.max_reconnect_attempts == 0 {
        return Err(Error::Config(
            "socket.max_reconnect_attempts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Identity of the local agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable agent id used as the message source and mailbox address.
    pub id: String,
    /// Human-readable name announced to the agent directory.
    pub name: String,
    /// Capability names announced to the agent directory.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Protocol dialects this agent speaks natively.
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Trust level announced to the agent directory.
    #[serde(default = "default_trust_level")]
    pub trust_level: String,
    /// Free-form metadata forwarded to the agent directory.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_trust_level() -> String {
    "standard".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: "agent".to_string(),
            name: "Agentwire Agent".to_string(),
            capabilities: Vec::new(),
            protocols: vec!["A2A".to_string()],
            trust_level: default_trust_level(),
            metadata: HashMap::new(),
        }
    }
}

/// File-based transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Shared mailbox directory. Defaults to ~/.agentwire/mailbox.
    pub dir: Option<PathBuf>,
    /// Scan interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            dir: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl MailboxConfig {
    /// Resolve the mailbox directory, falling back to the home default.
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_home_dir()?.join("mailbox")),
        }
    }
}

/// Socket transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// WebSocket server URL, e.g. ws://127.0.0.1:3711.
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: None,
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

/// Model endpoint used by the translation bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key. Falls back to AGENTWIRE_MODEL_KEY, then OPENAI_API_KEY.
    pub api_key: Option<String>,
    /// Optional organization id sent alongside the key.
    pub organization: Option<String>,
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    /// Translation cache capacity (distinct shape/pair entries).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_model_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o".to_string()
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            organization: None,
            base_url: default_model_base_url(),
            model: default_model_name(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl ModelConfig {
    /// Credential accessor: explicit setting first, then environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("AGENTWIRE_MODEL_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Agent directory endpoint registered against at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryConfig {
    /// Base URL of the agent directory service. Registration is skipped
    /// when unset.
    pub url: Option<String>,
}
