//! Session state storage
//!
//! The turn controller only ever sees full records: fetch, mutate a private
//! copy, write back.

use crate::db::{Database, DbError};
use crate::state_machine::SessionState;
use async_trait::async_trait;
use std::sync::Arc;
#[cfg(test)]
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Db(#[from] DbError),
    #[error("session not found: {0}")]
    NotFound(String),
}

/// Key-value store of session records with atomic replace
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Existing record, or the fixed initial record for a new session.
    ///
    /// Returns an owned copy; mutating it never affects the stored record.
    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError>;

    /// Replace the full record
    async fn put(&self, session_id: &str, state: &SessionState) -> Result<(), StoreError>;

    /// Existing record only
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        (**self).get_or_create(session_id).await
    }

    async fn put(&self, session_id: &str, state: &SessionState) -> Result<(), StoreError> {
        (**self).put(session_id, state).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        (**self).load(session_id).await
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        (**self).delete(session_id).await
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Adapter to use Database as a session store
#[derive(Clone)]
pub struct DatabaseSessionStore {
    db: Database,
}

impl DatabaseSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseSessionStore {
    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        Ok(self.load(session_id).await?.unwrap_or_else(SessionState::initial))
    }

    async fn put(&self, session_id: &str, state: &SessionState) -> Result<(), StoreError> {
        self.db.put_session(session_id, state)?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.db.get_session(session_id)?.map(|record| record.state))
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        match self.db.delete_session(session_id) {
            Ok(()) => Ok(()),
            Err(DbError::SessionNotFound(id)) => Err(StoreError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store; records are lost on restart
#[cfg(test)]
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

#[cfg(test)]
impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, session_id: &str) -> Result<SessionState, StoreError> {
        Ok(self
            .sessions()
            .get(session_id)
            .cloned()
            .unwrap_or_else(SessionState::initial))
    }

    async fn put(&self, session_id: &str, state: &SessionState) -> Result<(), StoreError> {
        self.sessions().insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.sessions().get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }
}
