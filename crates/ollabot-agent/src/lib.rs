//! The conversation side of the bot: command routing, per-scope history and
//! the Ollama gateway client.

pub mod context;
pub mod history;
pub mod ollama;
pub mod pipeline;
pub mod provider;
pub mod router;

pub use context::ContextManager;
pub use history::{History, HistoryStore, Scope};
pub use ollama::OllamaProvider;
pub use pipeline::Bridge;
pub use provider::{ChatRequest, ChatResponse, Endpoint, LlmProvider, Message, ProviderError, Role};
pub use router::{Command, CommandError, CommandRouter};
