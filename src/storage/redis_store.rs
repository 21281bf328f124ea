//! Redis-backed session store.
//!
//! Redis key pattern:
//! - `siwe:session:{id}`: session data (JSON), written with `SET EX`
//!
//! Redis expires keys itself, so `purge_expired` has nothing to do. Loaded
//! JSON is wrapped in `Zeroizing` so the pending nonce does not linger in
//! freed memory.

use super::{SessionStore, StoreError};
use crate::auth::session::{Session, SessionId};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use zeroize::Zeroizing;

const KEY_PREFIX: &str = "siwe:session:";

fn session_key(id: &SessionId) -> String {
    format!("{}{}", KEY_PREFIX, id.as_str())
}

/// Redis `SET EX` takes whole seconds and rejects 0.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[derive(Clone)]
pub struct RedisSessionStore {
    con: MultiplexedConnection,
}

impl RedisSessionStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(Self { con })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let mut con = self.con.clone();
        let json: Option<String> = con.get(session_key(id)).await?;

        match json {
            Some(data) => {
                let data = Zeroizing::new(data);
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let json = Zeroizing::new(serde_json::to_string(session)?);
        con.set_ex::<_, _, ()>(session_key(id), json.as_str(), ttl_secs(ttl))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        let deleted: i32 = con.del(session_key(id)).await?;
        Ok(deleted > 0)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
