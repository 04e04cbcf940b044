// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session lifecycle manager
//!
//! Sessions are issued, revalidated and invalidated against the in-memory
//! [`SessionCache`]; every change is queued for the write-behind
//! [`DrainWorker`] so the request path never waits on a storage write.
//! The only suspension point is the store read on a cache miss.

use super::cache::{SessionCache, SweepReport};
use super::clock::Clock;
use super::error::{SessionError, SessionResult};
use super::models::{IssuedSession, Session};
use super::persistence::{DrainWorker, PersistOp, PersistenceHealth, PersistenceQueue};
use super::store::SessionStore;
use super::token::{Claims, TokenError, TokenIssuer};
use crate::config::{RetentionPolicy, SessionConfig};
use crate::principal::{Principal, PrincipalSource};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Cache occupancy, for operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub cached: usize,
    pub revoked: usize,
}

pub struct SessionManager {
    config: SessionConfig,
    cache: SessionCache,
    store: Arc<dyn SessionStore>,
    issuer: Arc<dyn TokenIssuer>,
    principals: Arc<dyn PrincipalSource>,
    clock: Arc<dyn Clock>,
    queue: PersistenceQueue,
    /// Taken by `spawn_drain_worker`
    worker: Mutex<Option<DrainWorker>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        issuer: Arc<dyn TokenIssuer>,
        principals: Arc<dyn PrincipalSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (queue, receiver) = PersistenceQueue::channel(config.queue_capacity);
        let worker = DrainWorker::new(receiver, store.clone(), config.drain_tick());
        Self {
            config,
            cache: SessionCache::new(),
            store,
            issuer,
            principals,
            clock,
            queue,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Start the persistence drain worker; only the first call spawns
    pub fn spawn_drain_worker(&self) -> Option<JoinHandle<()>> {
        let worker = self.worker.lock().take()?;
        log::debug!(
            "starting session drain worker (capacity {}, tick {:?})",
            self.config.queue_capacity,
            self.config.drain_tick()
        );
        Some(worker.spawn())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn create_session(&self, principal: Arc<Principal>) -> SessionResult<IssuedSession> {
        self.create_session_with_credential(principal, Vec::new())
    }

    /// Issue a session carrying an opaque credential blob
    pub fn create_session_with_credential(
        &self,
        principal: Arc<Principal>,
        credential: Vec<u8>,
    ) -> SessionResult<IssuedSession> {
        let now = self.clock.now();
        let session = Session::new(principal, credential, now, self.config.ttl())?;
        let claims = Claims::new(
            session.uuid(),
            session.principal().user(),
            now,
            self.issuer.token_lifetime(),
        );
        // Mint first so a failed issue leaves nothing behind.
        let token = self.issuer.issue_token(&claims)?;

        let slot = self.cache.insert(session);
        let session = {
            let guard = slot.lock();
            self.queue.enqueue(PersistOp::Put(guard.to_record()));
            guard.clone()
        };
        log::debug!(
            "session.create uuid={} user={}",
            session.uuid(),
            session.principal().user()
        );
        Ok(IssuedSession { session, token })
    }

    /// Resolve a bearer token to its principal, sliding the session expiry
    pub async fn validate(&self, token: &str) -> SessionResult<Arc<Principal>> {
        self.resolve(token).await.map(|(_, principal)| principal)
    }

    /// Like [`validate`](Self::validate), also returning the session UUID
    pub async fn resolve(&self, token: &str) -> SessionResult<(Uuid, Arc<Principal>)> {
        let claims = self.issuer.validate_claims(token)?;
        let uuid = claims.sid;

        if self.cache.is_revoked(&uuid) {
            return Err(SessionError::Invalidated(uuid));
        }
        let slot = match self.cache.get(&uuid) {
            Some(slot) => slot,
            None => self.load(uuid).await?,
        };

        let now = self.clock.now();
        let mut session = slot.lock();
        if session.is_invalidated() {
            return Err(SessionError::Invalidated(uuid));
        }
        if session.is_expired(now) {
            return Err(SessionError::Expired(uuid));
        }
        if session.principal().user() != claims.sub {
            log::warn!("token subject does not own session {}", uuid);
            return Err(SessionError::InvalidToken(TokenError::Invalid(
                "subject mismatch".to_string(),
            )));
        }

        session.touch(now, self.config.ttl())?;
        self.queue.enqueue(PersistOp::Put(session.to_record()));
        Ok((uuid, session.principal().clone()))
    }

    async fn load(&self, uuid: Uuid) -> SessionResult<super::cache::SessionSlot> {
        let store = self.store.clone();
        let record = tokio::task::spawn_blocking(move || store.get(&uuid))
            .await
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?
            .map_err(|e| {
                log::warn!("session store read failed for {}: {}", uuid, e);
                SessionError::StoreUnavailable(e.to_string())
            })?
            .ok_or(SessionError::NotFound(uuid))?;

        if record.invalidated {
            return Err(SessionError::Invalidated(uuid));
        }
        if record.is_expired(self.clock.now()) {
            return Err(SessionError::Expired(uuid));
        }
        let principal =
            self.principals
                .resolve(&record.user)
                .ok_or_else(|| SessionError::UnknownPrincipal {
                    uuid,
                    user: record.user.clone(),
                })?;

        log::debug!("session.reload uuid={} user={}", uuid, record.user);
        self.cache
            .insert_loaded(Session::from_record(record, principal))
            .ok_or(SessionError::Invalidated(uuid))
    }

    /// Invalidate a session; returns `false` if it already was
    pub fn invalidate(&self, uuid: Uuid) -> bool {
        let Some(slot) = self.cache.revoke(uuid, self.clock.now()) else {
            return false;
        };

        let retention = self.config.retention;
        match slot {
            Some(slot) => {
                let mut session = slot.lock();
                session.invalidate();
                self.queue.enqueue(match retention {
                    RetentionPolicy::HardDelete => PersistOp::Delete(uuid),
                    RetentionPolicy::SoftInvalidate => PersistOp::Put(session.to_record()),
                });
            }
            None => {
                self.queue.enqueue(match retention {
                    RetentionPolicy::HardDelete => PersistOp::Delete(uuid),
                    RetentionPolicy::SoftInvalidate => PersistOp::MarkInvalidated(uuid),
                });
            }
        }
        log::debug!("session.invalidate uuid={} retention={:?}", uuid, retention);
        true
    }

    /// Invalidate the session a token is bound to
    pub fn logout(&self, token: &str) -> SessionResult<Uuid> {
        let claims = self.issuer.validate_claims(token)?;
        self.invalidate(claims.sid);
        Ok(claims.sid)
    }

    /// Force-expire every live session of `user`, cached or stored
    pub async fn invalidate_user(&self, user: &str) -> SessionResult<usize> {
        let mut uuids = self.cache.sessions_of(user);

        let store = self.store.clone();
        let owner = user.to_string();
        let stored = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            let scanned = store.range_active(&mut |record| {
                if record.user == owner {
                    found.push(record.uuid);
                }
                true
            });
            scanned.map(|()| found)
        })
        .await
        .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;
        match stored {
            Ok(found) => uuids.extend(found),
            Err(e) => log::warn!(
                "could not scan stored sessions of {}; invalidating cached ones only: {}",
                user,
                e
            ),
        }

        uuids.sort();
        uuids.dedup();
        let count = uuids.into_iter().filter(|uuid| self.invalidate(*uuid)).count();
        log::info!("session.invalidate_user user={} count={}", user, count);
        Ok(count)
    }

    /// Snapshot of a cached session
    pub fn session(&self, uuid: &Uuid) -> Option<Session> {
        self.cache.get(uuid).map(|slot| slot.lock().clone())
    }

    /// Evict expired cache entries and old tombstones
    ///
    /// A tombstone outlives its session's last possible expiry, so once it
    /// is dropped no stored record can be revived through it.
    pub fn sweep(&self) -> SweepReport {
        let grace = self.config.grace();
        let report = self
            .cache
            .sweep(self.clock.now(), grace, self.config.ttl() + grace);
        if report.evicted_sessions > 0 || report.evicted_tombstones > 0 {
            log::debug!(
                "session.sweep evicted={} tombstones={}",
                report.evicted_sessions,
                report.evicted_tombstones
            );
        }
        report
    }

    /// Wait for every queued write so far to be attempted
    pub async fn flush(&self) -> bool {
        self.queue.flush().await
    }

    pub fn health(&self) -> PersistenceHealth {
        self.queue.health()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            cached: self.cache.len(),
            revoked: self.cache.revoked_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::PrincipalDirectory;
    use crate::session::clock::ManualClock;
    use crate::session::models::SessionRecord;
    use crate::session::store::TreeSessionStore;
    use crate::session::token::JwtTokenIssuer;
    use crate::storage::{StorageDriverError, StorageResult};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        manager: SessionManager,
        store: Arc<TreeSessionStore>,
        clock: Arc<ManualClock>,
        directory: Arc<PrincipalDirectory>,
    }

    fn fixture(retention: RetentionPolicy) -> Fixture {
        let store = Arc::new(TreeSessionStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let directory = Arc::new(PrincipalDirectory::new());
        let config = SessionConfig {
            retention,
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(
            config,
            store.clone(),
            Arc::new(JwtTokenIssuer::new(b"manager-tests", chrono::Duration::days(1))),
            directory.clone(),
            clock.clone(),
        );
        manager.spawn_drain_worker().unwrap();
        Fixture {
            manager,
            store,
            clock,
            directory,
        }
    }

    /// Store that fails every call while `down` is set
    struct DownStore {
        inner: TreeSessionStore,
        down: AtomicBool,
    }

    impl DownStore {
        fn check(&self) -> StorageResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StorageDriverError::BackendSpecific("store offline".into()));
            }
            Ok(())
        }
    }

    impl SessionStore for DownStore {
        fn get(&self, uuid: &Uuid) -> StorageResult<Option<SessionRecord>> {
            self.check()?;
            self.inner.get(uuid)
        }

        fn put(&self, record: &SessionRecord) -> StorageResult<()> {
            self.check()?;
            self.inner.put(record)
        }

        fn delete(&self, uuid: &Uuid) -> StorageResult<()> {
            self.check()?;
            self.inner.delete(uuid)
        }

        fn range_active(&self, f: &mut dyn FnMut(&SessionRecord) -> bool) -> StorageResult<()> {
            self.check()?;
            self.inner.range_active(f)
        }
    }

    fn issuer() -> Arc<JwtTokenIssuer> {
        Arc::new(JwtTokenIssuer::new(b"manager-tests", chrono::Duration::days(1)))
    }

    #[tokio::test]
    async fn test_worker_spawns_once() {
        let f = fixture(RetentionPolicy::HardDelete);
        assert!(f.manager.spawn_drain_worker().is_none());
    }

    #[tokio::test]
    async fn test_soft_invalidate_keeps_flagged_record() {
        let f = fixture(RetentionPolicy::SoftInvalidate);
        let issued = f
            .manager
            .create_session(Arc::new(Principal::new("rita")))
            .unwrap();
        let uuid = issued.session.uuid();

        assert!(f.manager.invalidate(uuid));
        assert!(f.manager.flush().await);
        let record = f.store.get(&uuid).unwrap().unwrap();
        assert!(record.invalidated);
        assert!(matches!(
            f.manager.validate(&issued.token).await,
            Err(SessionError::Invalidated(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_requires_known_principal() {
        let f = fixture(RetentionPolicy::HardDelete);
        let issued = f
            .manager
            .create_session(Arc::new(Principal::new("sam")))
            .unwrap();
        assert!(f.manager.flush().await);

        // A second manager over the same store has an empty cache.
        let other = SessionManager::new(
            SessionConfig::default(),
            f.store.clone(),
            Arc::new(JwtTokenIssuer::new(b"manager-tests", chrono::Duration::days(1))),
            f.directory.clone(),
            f.clock.clone(),
        );
        assert!(matches!(
            other.validate(&issued.token).await,
            Err(SessionError::UnknownPrincipal { .. })
        ));

        f.directory.remember(Arc::new(Principal::new("sam")));
        let principal = other.validate(&issued.token).await.unwrap();
        assert_eq!(principal.user(), "sam");
        assert_eq!(other.stats().cached, 1);
    }

    #[tokio::test]
    async fn test_invalidate_user_reaches_stored_sessions() {
        let f = fixture(RetentionPolicy::HardDelete);
        let a = f.manager.create_session(Arc::new(Principal::new("tess"))).unwrap();
        let b = f.manager.create_session(Arc::new(Principal::new("tess"))).unwrap();
        let c = f.manager.create_session(Arc::new(Principal::new("uma"))).unwrap();
        assert!(f.manager.flush().await);

        assert_eq!(f.manager.invalidate_user("tess").await.unwrap(), 2);
        assert!(f.manager.validate(&a.token).await.is_err());
        assert!(f.manager.validate(&b.token).await.is_err());
        assert!(f.manager.validate(&c.token).await.is_ok());

        assert!(f.manager.flush().await);
        assert!(f.store.get(&a.session.uuid()).unwrap().is_none());
        assert_eq!(f.manager.invalidate_user("tess").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_swept() {
        let f = fixture(RetentionPolicy::HardDelete);
        let issued = f
            .manager
            .create_session(Arc::new(Principal::new("vera")))
            .unwrap();

        f.clock.advance(chrono::Duration::hours(7));
        assert!(matches!(
            f.manager.validate(&issued.token).await,
            Err(SessionError::Expired(_))
        ));
        assert_eq!(f.manager.sweep().evicted_sessions, 1);
        assert!(f.manager.session(&issued.session.uuid()).is_none());
    }

    #[tokio::test]
    async fn test_store_outage_serves_cached_and_fails_misses() {
        let store = Arc::new(DownStore {
            inner: TreeSessionStore::in_memory().unwrap(),
            down: AtomicBool::new(false),
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let directory = Arc::new(PrincipalDirectory::new());
        directory.remember(Arc::new(Principal::new("walt")));

        let manager = SessionManager::new(
            SessionConfig::default(),
            store.clone(),
            issuer(),
            directory.clone(),
            clock.clone(),
        );
        manager.spawn_drain_worker().unwrap();
        let issued = manager
            .create_session(Arc::new(Principal::new("walt")))
            .unwrap();
        assert!(manager.flush().await);

        store.down.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::minutes(5));

        // Cached: still valid, the failed write is only queued for retry.
        let principal = manager.validate(&issued.token).await.unwrap();
        assert_eq!(principal.user(), "walt");
        assert!(manager.flush().await);
        let health = manager.health();
        assert!(health.store_degraded);
        assert_eq!(health.pending_retries, 1);

        // Cache miss on another node: the store cannot answer.
        let other = SessionManager::new(
            SessionConfig::default(),
            store.clone(),
            issuer(),
            directory,
            clock,
        );
        let err = other.validate(&issued.token).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert!(!err.is_auth_failure());

        store.down.store(false, Ordering::SeqCst);
        let principal = other.validate(&issued.token).await.unwrap();
        assert_eq!(principal.user(), "walt");
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_fails_create() {
        let f = fixture(RetentionPolicy::HardDelete);
        f.clock.set(DateTime::<Utc>::MAX_UTC - chrono::Duration::hours(1));

        let err = f
            .manager
            .create_session(Arc::new(Principal::new("xavi")))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTtl(_)));
        assert_eq!(f.manager.stats().cached, 0);
    }

    #[tokio::test]
    async fn test_logout_rejects_garbage_token() {
        let f = fixture(RetentionPolicy::HardDelete);
        assert!(matches!(
            f.manager.logout("garbage"),
            Err(SessionError::InvalidToken(_))
        ));
    }
}
