//! Agent directory registration.
//!
//! The directory is an external collaborator: agentwire only announces the
//! local agent once at startup and never reads the directory back.

use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::Settings;
use crate::error::{Error, Result};

/// Registration payload announced to the directory.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub protocols: Vec<String>,
    pub trust_level: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentRegistration {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            id: settings.agent.id.clone(),
            name: settings.agent.name.clone(),
            capabilities: settings.agent.capabilities.clone(),
            protocols: settings.agent.protocols.clone(),
            trust_level: settings.agent.trust_level.clone(),
            metadata: settings.agent.metadata.clone(),
        }
    }
}

/// HTTP client for the agent directory.
pub struct DirectoryClient {
    client: Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Announce the agent. Called once at startup.
    pub async fn register(&self, registration: &AgentRegistration) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/agents", self.base_url))
            .json(registration)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Directory(format!("HTTP {}: {}", status, text)));
        }

        tracing::info!("Registered agent '{}' with directory", registration.id);
        Ok(())
    }
}
