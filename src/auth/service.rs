//! Sign-in orchestration over a session store.
//!
//! Every operation that reads and then writes a session runs under that
//! session's lock, so a nonce can be consumed at most once even when two
//! `/verify` requests for the same session race.

use super::session::{Authentication, Session, SessionId};
use crate::siwe::{self, VerificationError, VerifyOptions};
use crate::storage::{SessionStore, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Lifetime of an authenticated session whose message has no expiration.
    pub session_ttl: Duration,
    /// Lifetime of an unconsumed nonce.
    pub nonce_ttl: Duration,
    pub verify: VerifyOptions,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(86_400),
            nonce_ttl: Duration::from_secs(300),
            verify: VerifyOptions::default(),
        }
    }
}

/// Outcome of a successful sign-in: the session's new id and who it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub id: SessionId,
    pub authentication: Authentication,
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub sessions_purged: usize,
    pub locks_pruned: usize,
}

pub struct AuthService {
    store: Arc<dyn SessionStore>,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(store: Arc<dyn SessionStore>, settings: AuthSettings) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    async fn lock(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is released before awaiting
        let lock = self.locks.entry(id.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Load a session, treating a lapsed authentication as empty.
    async fn load(&self, id: &SessionId, now: DateTime<Utc>) -> Result<Session, StoreError> {
        let session = self.store.load(id).await?.unwrap_or_default();
        if session.is_expired(now) {
            tracing::debug!(session = id.redacted(), "Session authentication expired");
            self.store.delete(id).await?;
            return Ok(Session::Empty);
        }
        Ok(session)
    }

    async fn persist(
        &self,
        id: &SessionId,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match session.time_to_live(self.settings.nonce_ttl, now) {
            Some(ttl) if !ttl.is_zero() => self.store.save(id, session, ttl).await,
            _ => self.store.delete(id).await.map(|_| ()),
        }
    }

    /// Issue a fresh nonce, replacing any earlier one.
    ///
    /// A presented id is only reused when the store already holds a session
    /// for it; any other id gets a freshly generated one, so callers can never
    /// choose their own session id.
    pub async fn issue_nonce(
        &self,
        presented: Option<&SessionId>,
    ) -> Result<(SessionId, String), StoreError> {
        if let Some(id) = presented {
            let _guard = self.lock(id).await;
            if self.store.load(id).await?.is_some() {
                let nonce = self.issue_locked(id).await?;
                return Ok((id.clone(), nonce));
            }
            tracing::debug!(session = id.redacted(), "Ignoring unknown session id");
        }

        let id = SessionId::generate();
        let _guard = self.lock(&id).await;
        let nonce = self.issue_locked(&id).await?;
        Ok((id, nonce))
    }

    /// Caller holds the session's lock.
    async fn issue_locked(&self, id: &SessionId) -> Result<String, StoreError> {
        let now = Utc::now();
        let mut session = self.load(id, now).await?;
        let nonce = session.issue_nonce(now);
        self.persist(id, &session, now).await?;

        tracing::info!(action = "nonce_issued", session = id.redacted());
        Ok(nonce)
    }

    /// Verify a signed message against the session's nonce and record the
    /// outcome.
    ///
    /// On success the authenticated session moves to a newly generated id and
    /// the old one is deleted. On failure the old session is cleared. With no
    /// session at all there is no nonce to match, so a well-formed message
    /// fails with `NonceMismatch` and nothing is stored.
    pub async fn verify(
        &self,
        id: Option<&SessionId>,
        message: &str,
        signature: &str,
    ) -> Result<SignedIn, AuthError> {
        let Some(id) = id else {
            let now = Utc::now();
            let outcome = siwe::verify(message, signature, None, &self.settings.verify, now);
            let err = match outcome {
                Err(e) => e,
                Ok(_) => VerificationError::NonceMismatch,
            };
            tracing::warn!(action = "verify_failed", reason = %err, "Verification without session");
            return Err(err.into());
        };

        let _guard = self.lock(id).await;
        let now = Utc::now();

        let mut session = self.load(id, now).await?;
        let result = siwe::verify(
            message,
            signature,
            session.pending_nonce(),
            &self.settings.verify,
            now,
        );

        let default_ttl = chrono::Duration::from_std(self.settings.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        session.materialize(&result, default_ttl, now);

        match result {
            Ok(_) => {
                let authentication = session
                    .authentication()
                    .cloned()
                    .ok_or(VerificationError::ExpiredMessage)?;

                let rotated = SessionId::generate();
                self.persist(&rotated, &session, now).await?;
                self.store.delete(id).await?;

                tracing::info!(
                    action = "auth_success",
                    session = rotated.redacted(),
                    previous = id.redacted(),
                    address = %authentication.address,
                    chain_id = authentication.chain_id,
                );
                Ok(SignedIn {
                    id: rotated,
                    authentication,
                })
            }
            Err(e) => {
                self.persist(id, &session, now).await?;
                tracing::warn!(action = "verify_failed", session = id.redacted(), reason = %e);
                Err(e.into())
            }
        }
    }

    /// The session's current authentication, if any.
    pub async fn authenticated(&self, id: &SessionId) -> Result<Option<Authentication>, StoreError> {
        let _guard = self.lock(id).await;
        let session = self.load(id, Utc::now()).await?;
        Ok(session.authentication().cloned())
    }

    /// Destroy the session. Returns true if there was one.
    pub async fn logout(&self, id: &SessionId) -> Result<bool, StoreError> {
        let _guard = self.lock(id).await;
        let existed = self.store.delete(id).await?;
        tracing::info!(action = "logout", session = id.redacted(), existed);
        Ok(existed)
    }

    /// Drop per-session locks nobody is holding or waiting on.
    pub fn prune_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Periodic maintenance: purge expired records and idle locks.
    pub async fn cleanup(&self) -> Result<CleanupStats, StoreError> {
        let sessions_purged = self.store.purge_expired().await?;
        let locks_pruned = self.prune_locks();
        Ok(CleanupStats {
            sessions_purged,
            locks_pruned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::siwe::SiweMessage;
    use crate::storage::MemorySessionStore;
    use crate::wallet::LocalWallet;

    fn service() -> (Arc<MemorySessionStore>, AuthService) {
        let store = Arc::new(MemorySessionStore::new());
        let service = AuthService::new(store.clone(), AuthSettings::default());
        (store, service)
    }

    fn signed_message(wallet: &LocalWallet, nonce: &str) -> (String, String) {
        let text = SiweMessage::new(
            "localhost:8080",
            wallet.address(),
            "http://localhost:8080",
            1,
            nonce,
            Utc::now(),
        )
        .with_statement("Sign in with Ethereum to the app.")
        .unwrap()
        .to_canonical_string();
        let signature = wallet.sign(&text).unwrap();
        (text, signature)
    }

    #[tokio::test]
    async fn test_issue_nonce_stores_pending() {
        let (store, service) = service();

        let (id, nonce) = service.issue_nonce(None).await.unwrap();
        let stored = store.load(&id).await.unwrap().unwrap();
        assert_eq!(stored.pending_nonce(), Some(nonce.as_str()));

        // A known id is kept and its nonce replaced
        let (same, second) = service.issue_nonce(Some(&id)).await.unwrap();
        assert_eq!(same, id);
        assert_ne!(nonce, second);
        let stored = store.load(&id).await.unwrap().unwrap();
        assert_eq!(stored.pending_nonce(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_session_id_is_replaced() {
        let (store, service) = service();
        let chosen = SessionId::generate();

        let (id, _nonce) = service.issue_nonce(Some(&chosen)).await.unwrap();
        assert_ne!(id, chosen);
        assert_eq!(store.load(&chosen).await.unwrap(), None);
        assert!(store.load(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_moves_session_to_new_id() {
        let (store, service) = service();
        let id = SessionId::generate();
        let now = Utc::now();
        store
            .save(
                &id,
                &Session::Pending {
                    nonce: "abc123XY".to_string(),
                    issued_at: now,
                },
                Duration::from_secs(300),
            )
            .await
            .unwrap();

        let wallet = LocalWallet::random();
        let (message, signature) = signed_message(&wallet, "abc123XY");

        let signed = service.verify(Some(&id), &message, &signature).await.unwrap();
        assert_eq!(signed.authentication.address, wallet.address());
        assert_ne!(signed.id, id);

        assert_eq!(store.load(&id).await.unwrap(), None);
        assert_eq!(service.authenticated(&id).await.unwrap(), None);
        assert_eq!(
            service.authenticated(&signed.id).await.unwrap().unwrap().address,
            wallet.address()
        );
    }

    #[tokio::test]
    async fn test_replay_is_rejected() {
        let (_store, service) = service();
        let wallet = LocalWallet::random();

        let (id, nonce) = service.issue_nonce(None).await.unwrap();
        let (message, signature) = signed_message(&wallet, &nonce);

        let signed = service.verify(Some(&id), &message, &signature).await.unwrap();

        let replay = service.verify(Some(&id), &message, &signature).await;
        assert!(matches!(
            replay,
            Err(AuthError::Verification(VerificationError::NonceMismatch))
        ));

        let replay = service.verify(Some(&signed.id), &message, &signature).await;
        assert!(matches!(
            replay,
            Err(AuthError::Verification(VerificationError::NonceMismatch))
        ));

        // The failed replay also cleared the earlier authentication
        assert_eq!(service.authenticated(&signed.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_clears_nonce() {
        let (store, service) = service();
        let wallet = LocalWallet::random();

        let (id, _nonce) = service.issue_nonce(None).await.unwrap();
        let (message, signature) = signed_message(&wallet, "zzz999");

        let result = service.verify(Some(&id), &message, &signature).await;
        assert!(matches!(
            result,
            Err(AuthError::Verification(VerificationError::NonceMismatch))
        ));
        assert_eq!(store.load(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_verify_without_session() {
        let (_store, service) = service();
        let wallet = LocalWallet::random();
        let (message, signature) = signed_message(&wallet, "abc123XY");

        let result = service.verify(None, &message, &signature).await;
        assert!(matches!(
            result,
            Err(AuthError::Verification(VerificationError::NonceMismatch))
        ));

        let result = service.verify(None, "garbage", &signature).await;
        assert!(matches!(
            result,
            Err(AuthError::Verification(VerificationError::MalformedMessage(_)))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_verify_consumes_nonce_once() {
        let (_store, service) = service();
        let service = Arc::new(service);
        let wallet = LocalWallet::random();

        let (id, nonce) = service.issue_nonce(None).await.unwrap();
        let (message, signature) = signed_message(&wallet, &nonce);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let id = id.clone();
            let message = message.clone();
            let signature = signature.clone();
            handles.push(tokio::spawn(async move {
                service.verify(Some(&id), &message, &signature).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_expired_authentication_reads_as_empty() {
        let (store, service) = service();
        let id = SessionId::generate();
        let wallet = LocalWallet::random();

        // Stored with a long TTL but an authentication that already lapsed
        let auth = Authentication {
            address: wallet.address(),
            chain_id: 1,
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        store
            .save(&id, &Session::Authenticated(auth), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(service.authenticated(&id).await.unwrap(), None);
        assert_eq!(store.load(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_and_cleanup() {
        let (_store, service) = service();

        let (id, _nonce) = service.issue_nonce(None).await.unwrap();
        assert!(service.logout(&id).await.unwrap());
        assert!(!service.logout(&id).await.unwrap());

        let stats = service.cleanup().await.unwrap();
        assert_eq!(stats.locks_pruned, 1);
        assert_eq!(service.prune_locks(), 0);
    }
}
