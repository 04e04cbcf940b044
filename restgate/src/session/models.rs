// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session models
//!
//! [`Session`] is the cached, principal-bound view used on the request path;
//! [`SessionRecord`] is the durable form written by the drain worker. The
//! record carries only the owning user name because principals are sourced
//! from outside the core.

use super::error::{SessionError, SessionResult};
use crate::principal::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Durable session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub uuid: Uuid,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Opaque encrypted credential blob
    #[serde(default)]
    pub credential: Vec<u8>,
    pub invalidated: bool,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Neither invalidated nor expired
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.invalidated && !self.is_expired(now)
    }
}

/// Server-side session bound to a principal
#[derive(Debug, Clone)]
pub struct Session {
    uuid: Uuid,
    principal: Arc<Principal>,
    created_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    credential: Vec<u8>,
    invalidated: bool,
}

impl Session {
    /// Fresh session with a newly allocated UUID
    pub fn new(
        principal: Arc<Principal>,
        credential: Vec<u8>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> SessionResult<Self> {
        Ok(Self {
            uuid: Uuid::new_v4(),
            principal,
            created_at: now,
            last_access: now,
            expires_at: expiry(now, ttl)?,
            credential,
            invalidated: false,
        })
    }

    /// Rebind a stored record to its principal
    pub fn from_record(record: SessionRecord, principal: Arc<Principal>) -> Self {
        Self {
            uuid: record.uuid,
            principal,
            created_at: record.created_at,
            last_access: record.last_access,
            expires_at: record.expires_at,
            credential: record.credential,
            invalidated: record.invalidated,
        }
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            uuid: self.uuid,
            user: self.principal.user().to_string(),
            created_at: self.created_at,
            last_access: self.last_access,
            expires_at: self.expires_at,
            credential: self.credential.clone(),
            invalidated: self.invalidated,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn principal(&self) -> &Arc<Principal> {
        &self.principal
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn credential(&self) -> &[u8] {
        &self.credential
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Slide the validity window: expiry = now + ttl
    pub(crate) fn touch(
        &mut self,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> SessionResult<()> {
        self.expires_at = expiry(now, ttl)?;
        self.last_access = now;
        Ok(())
    }

    pub(crate) fn invalidate(&mut self) {
        self.invalidated = true;
    }
}

/// `now + ttl`, refusing non-positive or unrepresentable lifetimes
fn expiry(now: DateTime<Utc>, ttl: chrono::Duration) -> SessionResult<DateTime<Utc>> {
    if ttl <= chrono::Duration::zero() {
        return Err(SessionError::InvalidTtl(format!(
            "{}s is not positive",
            ttl.num_seconds()
        )));
    }
    now.checked_add_signed(ttl).ok_or_else(|| {
        SessionError::InvalidTtl(format!("{}s overflows the expiry", ttl.num_seconds()))
    })
}

/// Result of a successful `create_session`
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    /// Bearer token bound to the session UUID
    pub token: String,
}
