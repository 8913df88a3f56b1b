//! In-memory conversation histories, one per scope.
//!
//! Nothing here is persisted: a restart starts every scope empty.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use ollabot_core::ContextMode;

use crate::provider::{Message, Role};

/// The history a query reads from and commits to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Stateless; nothing is read or written.
    None,
    /// The single process-wide history.
    General,
    /// The history of one user identity.
    User(String),
}

impl Scope {
    pub fn resolve(mode: ContextMode, user_id: &str) -> Self {
        match mode {
            ContextMode::None => Scope::None,
            ContextMode::General => Scope::General,
            ContextMode::User => Scope::User(user_id.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::None => f.write_str("none"),
            Scope::General => f.write_str("general"),
            Scope::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Ordered messages of one scope, oldest first.
#[derive(Debug, Default, Clone)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append one message, then evict down to `limit` messages
    /// (`0` = unbounded).
    pub fn push(&mut self, message: Message, limit: usize) {
        self.messages.push(message);
        self.enforce_limit(limit);
    }

    fn enforce_limit(&mut self, limit: usize) {
        if limit == 0 || self.messages.len() <= limit {
            return;
        }
        let mut excess = self.messages.len() - limit;
        // Never start a history with an orphaned assistant turn.
        while excess < self.messages.len() && self.messages[excess].role == Role::Assistant {
            excess += 1;
        }
        self.messages.drain(..excess);
    }
}

/// Owner of every history in the process.
///
/// Each history sits behind its own async mutex. Callers hold the lock for
/// the whole read → LLM call → commit sequence, which serializes queries
/// within one scope while other users' scopes proceed in parallel.
pub struct HistoryStore {
    general: Arc<Mutex<History>>,
    users: DashMap<String, Arc<Mutex<History>>>,
    limit: usize,
}

impl HistoryStore {
    /// `limit` is the maximum number of stored messages per scope; `0`
    /// disables eviction.
    pub fn new(limit: usize) -> Self {
        Self {
            general: Arc::new(Mutex::new(History::default())),
            users: DashMap::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The lock guarding `scope`, created on first use. `None` for the
    /// stateless scope.
    pub fn get(&self, scope: &Scope) -> Option<Arc<Mutex<History>>> {
        match scope {
            Scope::None => None,
            Scope::General => Some(Arc::clone(&self.general)),
            // Clone the Arc out so no DashMap shard lock outlives this call.
            Scope::User(id) => Some(self.users.entry(id.clone()).or_default().value().clone()),
        }
    }

    /// Copy of the messages currently stored for `scope`.
    pub async fn snapshot(&self, scope: &Scope) -> Vec<Message> {
        let Some(history) = self.get_existing(scope) else {
            return Vec::new();
        };
        let guard = history.lock().await;
        guard.messages().to_vec()
    }

    /// Number of user identities that have a history.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn get_existing(&self, scope: &Scope) -> Option<Arc<Mutex<History>>> {
        match scope {
            Scope::None => None,
            Scope::General => Some(Arc::clone(&self.general)),
            Scope::User(id) => self.users.get(id).map(|h| Arc::clone(h.value())),
        }
    }
}
