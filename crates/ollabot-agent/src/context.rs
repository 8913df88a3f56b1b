//! Conversation context manager: decides which history goes with each
//! LLM request and commits the exchange afterwards.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use ollabot_core::config::OllamaConfig;
use ollabot_core::ContextMode;

use crate::history::{HistoryStore, Scope};
use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError};

pub struct ContextManager {
    provider: Arc<dyn LlmProvider>,
    store: HistoryStore,
    model: String,
    system: Option<String>,
}

impl ContextManager {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        system: Option<String>,
        max_history: usize,
    ) -> Self {
        Self {
            provider,
            store: HistoryStore::new(max_history),
            model: model.into(),
            system,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &OllamaConfig) -> Self {
        Self::new(
            provider,
            config.model.clone(),
            config.system.clone(),
            config.max_history,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Answer `input` from `user_id` in `channel`, with history selected by
    /// `mode`. Returns the assistant text to post.
    ///
    /// - `none`: one generate request, nothing stored.
    /// - `general` / `user`: the user message is appended to the scope's
    ///   history, and the whole history goes out as a chat request. The reply
    ///   is appended on success only, so a failed turn stays in the history
    ///   unanswered. The scope stays locked for the whole exchange, so
    ///   concurrent queries against one scope run one after another.
    ///
    /// Failures are returned to the caller.
    pub async fn handle_query(
        &self,
        mode: ContextMode,
        channel: &str,
        user_id: &str,
        input: &str,
    ) -> Result<String, ProviderError> {
        let exchange_id = Uuid::new_v4();
        let scope = Scope::resolve(mode, user_id);
        let user_message = Message::user(input);

        let Some(slot) = self.store.get(&scope) else {
            let req = ChatRequest::generate(&self.model, self.system.clone(), input);
            let reply = self.exchange(exchange_id, &scope, channel, &req).await?;
            return Ok(reply);
        };

        let mut history = slot.lock().await;
        history.push(user_message, self.store.limit());

        let req = ChatRequest::chat(&self.model, self.system.clone(), history.messages().to_vec());
        let reply = self.exchange(exchange_id, &scope, channel, &req).await?;

        history.push(Message::assistant(reply.clone()), self.store.limit());
        debug!(
            exchange = %exchange_id,
            scope = %scope,
            stored = history.len(),
            "exchange committed to history"
        );

        Ok(reply)
    }

    /// Snapshot of the stored history for `mode` / `user_id`. Empty for `none`.
    pub async fn history(&self, mode: ContextMode, user_id: &str) -> Vec<Message> {
        self.store.snapshot(&Scope::resolve(mode, user_id)).await
    }

    async fn exchange(
        &self,
        exchange_id: Uuid,
        scope: &Scope,
        channel: &str,
        req: &ChatRequest,
    ) -> Result<String, ProviderError> {
        info!(
            exchange = %exchange_id,
            scope = %scope,
            channel = %channel,
            model = %req.model,
            endpoint = req.endpoint().path(),
            messages = req.messages.len(),
            provider = %self.provider.name(),
            "processing query"
        );

        let started = Instant::now();
        let resp = self.provider.send(req).await?;

        debug!(
            exchange = %exchange_id,
            model = %resp.model,
            done = resp.done,
            latency_ms = started.elapsed().as_millis() as u64,
            reply_len = resp.content.len(),
            "LLM reply received"
        );
        Ok(resp.content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::provider::{ChatResponse, Role};

    /// Records every request and answers with a canned reply.
    struct FakeProvider {
        requests: StdMutex<Vec<ChatRequest>>,
        reply: Result<&'static str, fn() -> ProviderError>,
        delay: Duration,
    }

    impl FakeProvider {
        fn replying(reply: &'static str) -> Self {
            Self {
                requests: StdMutex::new(Vec::new()),
                reply: Ok(reply),
                delay: Duration::ZERO,
            }
        }

        fn failing(err: fn() -> ProviderError) -> Self {
            Self {
                requests: StdMutex::new(Vec::new()),
                reply: Err(err),
                delay: Duration::ZERO,
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(req.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(ChatResponse {
                    content: text.to_string(),
                    model: req.model.clone(),
                    done: true,
                }),
                Err(make) => Err(make()),
            }
        }
    }

    fn manager(provider: Arc<FakeProvider>, system: Option<&str>) -> ContextManager {
        ContextManager::new(provider, "llama3", system.map(str::to_string), 0)
    }

    #[tokio::test]
    async fn none_mode_is_stateless() {
        let provider = Arc::new(FakeProvider::replying("ok"));
        let cm = manager(provider.clone(), Some("be brief"));

        cm.handle_query(ContextMode::None, "forsen", "u1", "first question").await.unwrap();
        cm.handle_query(ContextMode::None, "forsen", "u1", "second question").await.unwrap();

        let reqs = provider.requests();
        assert_eq!(reqs.len(), 2);
        let second = &reqs[1];
        assert_eq!(second.prompt.as_deref(), Some("second question"));
        assert!(second.messages.is_empty());
        assert_eq!(second.system.as_deref(), Some("be brief"));
        assert!(cm.history(ContextMode::None, "u1").await.is_empty());
        assert!(cm.history(ContextMode::General, "u1").await.is_empty());
    }

    #[tokio::test]
    async fn general_mode_accumulates_across_users() {
        let provider = Arc::new(FakeProvider::replying("sure"));
        let cm = manager(provider.clone(), None);

        cm.handle_query(ContextMode::General, "forsen", "alice", "hello").await.unwrap();
        assert_eq!(cm.history(ContextMode::General, "").await.len(), 2);
        cm.handle_query(ContextMode::General, "nouryxd", "bob", "and you?").await.unwrap();
        assert_eq!(cm.history(ContextMode::General, "").await.len(), 4);

        let second = &provider.requests()[1];
        let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "sure", "and you?"]);
        assert_eq!(second.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn user_mode_keeps_users_apart() {
        let provider = Arc::new(FakeProvider::replying("noted"));
        let cm = manager(provider.clone(), None);

        cm.handle_query(ContextMode::User, "forsen", "alice", "alice secret").await.unwrap();
        cm.handle_query(ContextMode::User, "forsen", "bob", "bob question").await.unwrap();

        let bob_req = &provider.requests()[1];
        assert!(bob_req.messages.iter().all(|m| m.content != "alice secret"));
        assert_eq!(bob_req.messages.len(), 1);

        let alice = cm.history(ContextMode::User, "alice").await;
        let bob = cm.history(ContextMode::User, "bob").await;
        assert_eq!(alice.len(), 2);
        assert_eq!(bob.len(), 2);
        assert_eq!(alice[0].content, "alice secret");
        assert!(bob.iter().all(|m| m.content != "alice secret"));
    }

    #[tokio::test]
    async fn system_prompt_is_never_stored() {
        let provider = Arc::new(FakeProvider::replying("hi"));
        let cm = manager(provider.clone(), Some("be brief"));

        cm.handle_query(ContextMode::General, "forsen", "u1", "hello").await.unwrap();
        let stored = cm.history(ContextMode::General, "u1").await;
        assert!(stored.iter().all(|m| m.role != Role::System));
        assert_eq!(provider.requests()[0].system.as_deref(), Some("be brief"));
    }

    #[tokio::test]
    async fn failed_exchange_keeps_only_the_user_turn() {
        let provider = Arc::new(FakeProvider::failing(|| ProviderError::EmptyResponse));
        let cm = manager(provider.clone(), None);

        let err = cm
            .handle_query(ContextMode::User, "forsen", "alice", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));

        let stored = cm.history(ContextMode::User, "alice").await;
        assert_eq!(stored, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn history_bound_is_applied() {
        let provider = Arc::new(FakeProvider::replying("ok"));
        let cm = ContextManager::new(provider.clone(), "llama3", None, 4);

        for n in 0..5 {
            cm.handle_query(ContextMode::General, "c", "u", &format!("q{n}")).await.unwrap();
        }
        let stored = cm.history(ContextMode::General, "u").await;
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0].content, "q3");
        // The new user turn is stored before the call, so requests stay
        // within the bound too.
        assert!(provider.requests().iter().all(|r| r.messages.len() <= 4));
        assert_eq!(provider.requests().last().unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_queries_in_one_scope_are_serialized() {
        let provider = Arc::new(FakeProvider {
            requests: StdMutex::new(Vec::new()),
            reply: Ok("pong"),
            delay: Duration::from_millis(20),
        });
        let cm = Arc::new(manager(provider.clone(), None));

        let mut handles = Vec::new();
        for n in 0..4 {
            let cm = Arc::clone(&cm);
            handles.push(tokio::spawn(async move {
                cm.handle_query(ContextMode::General, "c", "u", &format!("ping {n}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = cm.history(ContextMode::General, "u").await;
        assert_eq!(stored.len(), 8);
        for pair in stored.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
        // Each request saw every earlier exchange.
        let mut sizes: Vec<usize> = provider.requests().iter().map(|r| r.messages.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 5, 7]);
    }
}
