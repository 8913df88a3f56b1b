use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Which Ollama endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/api/chat`, carrying a message list.
    Chat,
    /// `/api/generate`, carrying a single raw prompt.
    Generate,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Chat => "/api/chat",
            Endpoint::Generate => "/api/generate",
        }
    }
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Optional system prompt. Chat requests send it as the first message,
    /// generate requests in the top-level `system` field.
    pub system: Option<String>,
    /// Conversation, oldest first. Empty for generate requests.
    pub messages: Vec<Message>,
    /// Raw prompt text for generate requests.
    pub prompt: Option<String>,
    /// Always `false`; partial responses are not supported.
    pub stream: bool,
}

impl ChatRequest {
    /// A stateless single-prompt request.
    pub fn generate(model: impl Into<String>, system: Option<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system,
            messages: Vec::new(),
            prompt: Some(prompt.into()),
            stream: false,
        }
    }

    /// A request carrying the full message list.
    pub fn chat(model: impl Into<String>, system: Option<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system,
            messages,
            prompt: None,
            stream: false,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        if self.messages.is_empty() && self.prompt.is_some() {
            Endpoint::Generate
        } else {
            Endpoint::Chat
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Assistant text. Never empty: providers reject empty replies.
    pub content: String,
    /// Model name as reported by the service.
    pub model: String,
    /// Whether the service marked the reply as complete.
    pub done: bool,
}

/// Common interface for LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send one request and wait for the full response. Never retries.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection failure, timeout, or body read failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The body was not the JSON shape we expect.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Well-formed reply without any text.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Short label for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http(_) | ProviderError::Api { .. } => "transport",
            ProviderError::Decode(_) => "decode",
            ProviderError::EmptyResponse => "empty_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_targets_generate_endpoint() {
        let req = ChatRequest::generate("llama3", None, "what is 2+2");
        assert_eq!(req.endpoint(), Endpoint::Generate);
        assert_eq!(req.endpoint().path(), "/api/generate");
        assert!(!req.stream);
    }

    #[test]
    fn chat_request_targets_chat_endpoint() {
        let req = ChatRequest::chat("llama3", None, vec![Message::user("hi")]);
        assert_eq!(req.endpoint(), Endpoint::Chat);
        assert_eq!(req.endpoint().path(), "/api/chat");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("4")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"4"}"#);
    }

    #[test]
    fn error_kinds() {
        let api = ProviderError::Api {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(api.kind(), "transport");
        assert_eq!(api.to_string(), "API error (502): bad gateway");
        assert_eq!(ProviderError::EmptyResponse.kind(), "empty_response");
        assert_eq!(ProviderError::Decode("x".into()).kind(), "decode");
    }
}
