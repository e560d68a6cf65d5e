use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::VisionConfig;
use crate::error::BridgeError;

/// A request to the vision model: fixed instructions plus one encoded frame.
#[derive(Debug, Clone)]
pub struct VisionRequest<'a> {
    pub instructions: &'a str,
    pub jpeg_base64: &'a str,
    pub temperature: f32,
}

/// Anything that can turn an image and instructions into free-form text.
pub trait VisionModel {
    fn describe(&self, request: &VisionRequest<'_>) -> Result<String>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: ChatMessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatMessageContent<'a> {
    Text(&'a str),
    Mixed(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client. Blocking: it runs on the
/// session worker thread, never inside the async runtime.
pub struct RemoteVisionModel {
    base_url: String,
    model_name: String,
    client: reqwest::blocking::Client,
}

impl RemoteVisionModel {
    pub fn new(config: &VisionConfig) -> Result<Self, BridgeError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            BridgeError::ClientInitFailed(format!(
                "no API key configured (set vision.api_key or {})",
                config.api_key_env
            ))
        })?;

        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let auth_header = format!("Bearer {}", api_key);
        default_headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .map_err(|e| BridgeError::ClientInitFailed(format!("invalid API key format: {}", e)))?,
        );

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("visionarm/0.1")
            .default_headers(default_headers)
            .build()
            .map_err(|e| BridgeError::ClientInitFailed(format!("failed to create HTTP client: {}", e)))?;

        info!("Initialized vision model client for: {}", config.model_name);
        info!("Base URL: {}", config.base_url);

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
            client,
        })
    }
}

impl VisionModel for RemoteVisionModel {
    fn describe(&self, request: &VisionRequest<'_>) -> Result<String> {
        let start_time = Instant::now();
        let body = ChatCompletionRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ChatMessageContent::Text(request.instructions),
                },
                ChatMessage {
                    role: "user",
                    content: ChatMessageContent::Mixed(vec![ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", request.jpeg_base64),
                        },
                    }]),
                },
            ],
            temperature: request.temperature,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .context("Failed to send request to vision model")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Vision model API error ({}): {}", status, error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .context("Failed to parse response from vision model")?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No response content from vision model"))?;

        debug!("Vision model response received in {}ms", start_time.elapsed().as_millis());
        Ok(text)
    }
}
