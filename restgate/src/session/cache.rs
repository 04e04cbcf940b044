// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory session cache
//!
//! One authoritative slot per UUID. Each slot carries its own mutex, which
//! serializes revalidation and invalidation of that session; the map lock is
//! only held to find or insert slots.
//!
//! Invalidation also leaves a tombstone so that a concurrent cache miss can
//! not reload a record the store has not yet deleted.

use super::models::Session;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to one cached session
pub type SessionSlot = Arc<Mutex<Session>>;

#[derive(Default)]
struct CacheState {
    live: HashMap<Uuid, SessionSlot>,
    /// Revoked UUIDs and when they were revoked
    revoked: HashMap<Uuid, DateTime<Utc>>,
}

/// Counts removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_sessions: usize,
    pub evicted_tombstones: usize,
}

#[derive(Default)]
pub struct SessionCache {
    state: RwLock<CacheState>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<SessionSlot> {
        self.state.read().live.get(uuid).cloned()
    }

    pub fn is_revoked(&self, uuid: &Uuid) -> bool {
        self.state.read().revoked.contains_key(uuid)
    }

    /// Insert a freshly created session
    pub fn insert(&self, session: Session) -> SessionSlot {
        let uuid = session.uuid();
        let slot = Arc::new(Mutex::new(session));
        self.state.write().live.insert(uuid, slot.clone());
        slot
    }

    /// Insert a session reloaded from the store
    ///
    /// If another request loaded it first, that slot wins. Returns `None`
    /// when the UUID was revoked while the record was being read.
    pub fn insert_loaded(&self, session: Session) -> Option<SessionSlot> {
        let uuid = session.uuid();
        let mut state = self.state.write();
        if state.revoked.contains_key(&uuid) {
            return None;
        }
        Some(
            state
                .live
                .entry(uuid)
                .or_insert_with(|| Arc::new(Mutex::new(session)))
                .clone(),
        )
    }

    /// Record a tombstone for `uuid`
    ///
    /// Returns `None` if it was already revoked, otherwise the cached slot
    /// (if any) for the caller to flag.
    pub fn revoke(&self, uuid: Uuid, at: DateTime<Utc>) -> Option<Option<SessionSlot>> {
        let mut state = self.state.write();
        if state.revoked.contains_key(&uuid) {
            return None;
        }
        state.revoked.insert(uuid, at);
        Some(state.live.get(&uuid).cloned())
    }

    /// UUIDs of cached sessions owned by `user`
    pub fn sessions_of(&self, user: &str) -> Vec<Uuid> {
        let slots: Vec<(Uuid, SessionSlot)> = self
            .state
            .read()
            .live
            .iter()
            .map(|(uuid, slot)| (*uuid, slot.clone()))
            .collect();
        slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().principal().user() == user)
            .map(|(uuid, _)| uuid)
            .collect()
    }

    /// Evict sessions expired for longer than `grace` and invalidated
    /// sessions, and drop tombstones older than `tombstone_age`
    pub fn sweep(
        &self,
        now: DateTime<Utc>,
        grace: chrono::Duration,
        tombstone_age: chrono::Duration,
    ) -> SweepReport {
        let mut state = self.state.write();

        let before = state.live.len();
        state.live.retain(|_, slot| {
            let session = slot.lock();
            !session.is_invalidated() && session.expires_at() + grace >= now
        });
        let evicted_sessions = before - state.live.len();

        let before = state.revoked.len();
        state.revoked.retain(|_, at| *at + tombstone_age >= now);
        let evicted_tombstones = before - state.revoked.len();

        SweepReport {
            evicted_sessions,
            evicted_tombstones,
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revoked_len(&self) -> usize {
        self.state.read().revoked.len()
    }
}
