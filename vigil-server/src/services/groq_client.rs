//! Groq (OpenAI-compatible chat-completions) classifier client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_common::config::ClassifierConfig;

use super::classifier::{parse_verdict, truncate, ClassifierError, ThreatClassifier};
use crate::models::Verdict;

const USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));
const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 1000;
const SYSTEM_PROMPT: &str = "You are a cybersecurity threat detection AI.";

/// Connection settings, fixed for the client's lifetime
#[derive(Debug, Clone)]
pub struct GroqConfig {
    /// Base URL without the `/chat/completions` suffix
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl GroqConfig {
    pub fn from_config(config: &ClassifierConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

/// Asks the endpoint for a single JSON object reply
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Production classifier backed by a chat-completions API
pub struct GroqClassifier {
    http_client: reqwest::Client,
    config: GroqConfig,
}

impl GroqClassifier {
    pub fn new(config: GroqConfig) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        tracing::info!(model = %config.model, base_url = %config.base_url, "Initialized classifier client");

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ClassifierError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            ClassifierError::NotConfigured("no classifier API key configured".to_string())
        })?;

        let request = ChatCompletionRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClassifierError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api(
                status.as_u16(),
                truncate(&error_text, 500),
            ));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Parse("response contained no message content".to_string()))
    }
}

#[async_trait]
impl ThreatClassifier for GroqClassifier {
    async fn classify_text(
        &self,
        content: &str,
        model_hint: Option<&str>,
    ) -> Result<Verdict, ClassifierError> {
        let model = model_hint.unwrap_or(self.config.model.as_str());
        tracing::debug!(model, chars = content.chars().count(), "Classifying text");

        let reply = self.complete(model, &build_text_prompt(content)).await?;
        let verdict = parse_verdict(&reply)?;

        tracing::info!(
            model,
            detected = verdict.detected,
            severity = %verdict.severity,
            confidence = verdict.confidence,
            "Classification completed"
        );

        Ok(verdict)
    }
}

/// Build the user prompt asking for a JSON verdict
fn build_text_prompt(text: &str) -> String {
    format!(
        r#"You are a cybersecurity threat detection system.
Analyze the following text for potential security threats such as phishing attempts,
social engineering, malware indications, or suspicious instructions.

Text: {text}

Provide your analysis in the following JSON format:
{{
    "threat_detected": true/false,
    "threat_level": "LOW"/"MEDIUM"/"HIGH"/"CRITICAL",
    "confidence_score": 0.0-1.0,
    "threat_type": "string",
    "description": "string",
    "indicators": ["string", "string"]
}}

Only provide the JSON output, nothing else."#
    )
}
