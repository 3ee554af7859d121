//! Process-wide session cache keyed by upstream user id.

use std::future::Future;

use dashmap::DashMap;

use crate::error::Error;
use crate::types::{Region, Session, UserId};

/// Session persistence used by login and authenticated requests.
///
/// One session per user id; writes are last-writer-wins.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for RedisSessions {
///     async fn put(&self, session: Session) -> Result<(), Error> {
///         self.conn.set(session.user_id.as_str(), encode(&session)?).await?;
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Store `session` under its user id, replacing any previous one.
    fn put(&self, session: Session) -> impl Future<Output = Result<(), Error>> + Send;

    /// Look up the session for `user_id`.
    fn get(&self, user_id: &UserId) -> impl Future<Output = Result<Option<Session>, Error>> + Send;

    /// Change the region of an existing session.
    ///
    /// Fails with [`Error::SessionNotFound`] and changes nothing when no
    /// session exists for `user_id`.
    fn update_region(
        &self,
        user_id: &UserId,
        region: Region,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Drop the session for `user_id` (logout). Returns whether one existed.
    fn remove(&self, user_id: &UserId) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// In-memory [`SessionStore`].
///
/// Unbounded: sessions live until overwritten, removed, or the process
/// exits. Per-key locking means a reader never sees a half-written session.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<UserId, Session>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    async fn put(&self, session: Session) -> Result<(), Error> {
        self.sessions.insert(session.user_id.clone(), session);
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Session>, Error> {
        Ok(self.sessions.get(user_id).map(|s| s.value().clone()))
    }

    async fn update_region(&self, user_id: &UserId, region: Region) -> Result<(), Error> {
        let mut entry = self
            .sessions
            .get_mut(user_id)
            .ok_or_else(|| Error::SessionNotFound(user_id.clone()))?;
        entry.region = region;
        tracing::debug!(user_id = %user_id, region = %region, "Session region updated");
        Ok(())
    }

    async fn remove(&self, user_id: &UserId) -> Result<bool, Error> {
        Ok(self.sessions.remove(user_id).is_some())
    }
}
