//! Session-scoped conversation memory.
//!
//! The orchestration client holds no history of its own: every turn it
//! reads a session's messages from a [`Memory`] implementation, builds a
//! request from them, and appends the new turn back. This is a
//! generalization of the teacher's single `Vec<Message>` field on `Client`
//! into a trait, so a caller can swap in a persistent store without
//! touching the client.
//!
//! Per the append-only contract, reads return errors (a broken store is
//! something the caller must react to) while writes are best-effort: the
//! client cannot meaningfully recover mid-turn from a failed history
//! append, so `append`/`pop_last`/`clear` log on failure rather than
//! propagate.

use crate::error::Result;
use crate::wire::{Message, Role};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Identifies one conversation's history within a [`Memory`] store.
pub type SessionId = String;

/// An append-only, session-scoped conversation log.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Appends `messages` to `session`'s history, in order. Best-effort:
    /// implementations log and swallow their own failures rather than
    /// propagate them.
    async fn append(&self, session: &SessionId, messages: Vec<Message>);

    /// The number of messages currently stored for `session`.
    async fn count(&self, session: &SessionId) -> Result<usize>;

    /// The full history for `session`, in turn order. An unknown session
    /// returns an empty vector, not an error.
    async fn all(&self, session: &SessionId) -> Result<Vec<Message>>;

    /// The last `n` messages, in turn order. `n <= 0` returns an empty
    /// vector without touching the store.
    async fn last_n(&self, session: &SessionId, n: i64) -> Result<Vec<Message>>;

    /// Removes and returns the most recent message, or `None` if the
    /// session is empty. Best-effort on failure, same as `append`.
    async fn pop_last(&self, session: &SessionId) -> Option<Message>;

    /// Drops a session's entire history. Best-effort on failure.
    async fn clear(&self, session: &SessionId);

    /// Every message in `session` with the given role, in turn order.
    async fn filter_by_role(&self, session: &SessionId, role: Role) -> Result<Vec<Message>>;
}

/// An in-process [`Memory`] backed by a `RwLock<HashMap<..>>`. Suitable for
/// single-process use and for tests; nothing here survives a restart, and
/// every write that could fail here is infallible (it's all in memory), so
/// the "log on failure" write contract never actually has anything to log.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<SessionId, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Vec<Message>>> {
        self.sessions.read().expect("memory store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Vec<Message>>> {
        self.sessions.write().expect("memory store lock poisoned")
    }
}

#[async_trait]
impl Memory for InMemoryStore {
    async fn append(&self, session: &SessionId, messages: Vec<Message>) {
        self.write().entry(session.clone()).or_default().extend(messages);
    }

    async fn count(&self, session: &SessionId) -> Result<usize> {
        Ok(self.read().get(session).map_or(0, Vec::len))
    }

    async fn all(&self, session: &SessionId) -> Result<Vec<Message>> {
        Ok(self.read().get(session).cloned().unwrap_or_default())
    }

    async fn last_n(&self, session: &SessionId, n: i64) -> Result<Vec<Message>> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let n = n as usize;
        let history = self.read();
        let Some(messages) = history.get(session) else {
            return Ok(Vec::new());
        };
        let start = messages.len().saturating_sub(n);
        Ok(messages[start..].to_vec())
    }

    async fn pop_last(&self, session: &SessionId) -> Option<Message> {
        self.write().get_mut(session).and_then(Vec::pop)
    }

    async fn clear(&self, session: &SessionId) {
        self.write().remove(session);
    }

    async fn filter_by_role(&self, session: &SessionId, role: Role) -> Result<Vec<Message>> {
        Ok(self
            .read()
            .get(session)
            .map(|messages| messages.iter().filter(|m| m.role == Some(role)).cloned().collect())
            .unwrap_or_default())
    }
}
