use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, Endpoint, LlmProvider, Message, ProviderError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Longest error body echoed into logs and errors.
const ERROR_BODY_MAX: usize = 512;

/// Client for a local Ollama server. Stateless apart from the pooled
/// HTTP client.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    /// Build a provider whose every request is bounded by `timeout`.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let endpoint = req.endpoint();
        let url = format!("{}{}", self.base_url, endpoint.path());
        let body = build_request_body(req);

        debug!(model = %req.model, url = %url, messages = req.messages.len(), "sending request to Ollama");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        // Body read failures surface as ProviderError::Http.
        let text = resp.text().await?;

        if !status.is_success() {
            let message = truncate(&text, ERROR_BODY_MAX);
            warn!(status = status.as_u16(), body = %message, "Ollama API error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_resp: ApiResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %truncate(&text, ERROR_BODY_MAX), "failed to decode Ollama response");
            ProviderError::Decode(e.to_string())
        })?;

        parse_response(endpoint, api_resp)
    }
}

// Ollama wire types. `format` and `raw` are part of the API surface but this
// bot never sets them, so they are always omitted.

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestBody<'a> {
    Chat(ChatBody<'a>),
    Generate(GenerateBody<'a>),
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<bool>,
}

fn build_request_body(req: &ChatRequest) -> RequestBody<'_> {
    match req.endpoint() {
        Endpoint::Generate => RequestBody::Generate(GenerateBody {
            model: &req.model,
            system: req.system.as_deref(),
            prompt: req.prompt.as_deref().unwrap_or_default(),
            stream: false,
            format: None,
            raw: None,
        }),
        Endpoint::Chat => {
            // System prompt always leads the list and never comes from history.
            let mut messages = Vec::with_capacity(req.messages.len() + 1);
            if let Some(system) = &req.system {
                messages.push(Message::system(system.clone()));
            }
            messages.extend(req.messages.iter().cloned());
            RequestBody::Chat(ChatBody {
                model: &req.model,
                messages,
                stream: false,
                format: None,
            })
        }
    }
}

fn parse_response(endpoint: Endpoint, resp: ApiResponse) -> Result<ChatResponse, ProviderError> {
    let content = match endpoint {
        Endpoint::Chat => resp.message.map(|m| m.content).unwrap_or_default(),
        Endpoint::Generate => resp.response,
    };

    if content.is_empty() {
        warn!(model = %resp.model, "Ollama returned empty content");
        return Err(ProviderError::EmptyResponse);
    }

    Ok(ChatResponse {
        content,
        model: resp.model,
        done: resp.done,
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &text[..i]),
        None => text.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}
