//! Session storage backends.
//!
//! Sessions are keyed by [`SessionId`] and serialized to JSON where the
//! backend needs bytes. Every record carries a TTL; a session past its TTL
//! is never returned by `load`.

pub mod memory;
pub mod redis_store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

use crate::auth::session::{Session, SessionId};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Insert or replace, expiring after `ttl`.
    async fn save(&self, id: &SessionId, session: &Session, ttl: Duration)
        -> Result<(), StoreError>;

    /// Returns true if a record was removed.
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;

    /// Drop records whose TTL has elapsed. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}
