//! Model-endpoint client for the model-mediated translation path.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModelConfig;
use crate::error::{Error, Result};

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert in AI agent communication protocols. \
Your task is to translate data between different protocol formats accurately. \
Always respond with valid JSON only. Do not include any explanations or markdown formatting.";

pub struct ModelClient {
    client: Client,
    api_key: Option<String>,
    organization: Option<String>,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl ModelClient {
    /// Build from configuration. Always succeeds: a missing credential
    /// fails each call individually, never construction.
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.resolve_api_key(),
            organization: config.organization.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn get_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Model("model API key not configured".to_string()))
    }

    /// One JSON-mode completion: system + user prompt in, parsed JSON out.
    pub async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<Value> {
        let api_key = self.get_api_key()?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: 0.1,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");

        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org.clone());
        }

        let response = builder.json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("HTTP {}: {}", status, text)));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| Error::Model("no response choices".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Model(format!("model did not return valid JSON: {}", e)))
    }

    /// Translate `data` under the given instruction prompt.
    pub async fn translate(&self, data: &Value, prompt: &str) -> Result<Value> {
        let pretty = serde_json::to_string_pretty(data)?;
        let user_prompt = format!("{}\n\nData to translate: {}", prompt, pretty);
        self.complete_json(DEFAULT_SYSTEM_PROMPT, &user_prompt).await
    }

    /// Research the current shape of a protocol. Returns structured
    /// information with description and per-kind examples.
    pub async fn protocol_information(&self, protocol: &str) -> Result<Value> {
        let system = "You are an expert research assistant on AI agent protocols and \
                      standards. Always respond with valid JSON only.";
        let user = format!(
            "Provide the most up-to-date information about the {} agent protocol. \
             Include message formats, tool definitions, and capability declarations. \
             Return a JSON object with a 'description' string and \
             'message_examples', 'capability_examples', and 'tool_examples' arrays.",
            protocol
        );
        self.complete_json(system, &user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> ModelClient {
        ModelClient {
            client: Client::new(),
            api_key: None,
            organization: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    #[test]
    fn test_constructs_without_credential() {
        let client = unconfigured();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_calls_fail_individually_without_credential() {
        let client = unconfigured();
        let err = client
            .translate(&serde_json::json!({"role": "user"}), "translate this")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
