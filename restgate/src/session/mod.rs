// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session lifecycle
//!
//! This module provides:
//! - [`SessionManager`]: create, validate, invalidate and expire sessions
//! - [`SessionCache`]: per-UUID slots in front of the persistent store
//! - [`PersistenceQueue`] / [`DrainWorker`]: bounded write-behind persistence
//! - [`SessionStore`]: the durable store contract, with a storage-tree backend
//! - [`TokenIssuer`]: bearer token capability, with an HS256 JWT default
//!
//! Writes never block the request path. When the queue saturates,
//! persistence degrades and the condition is reported by
//! [`SessionManager::health`].

pub mod cache;
pub mod clock;
pub mod error;
pub mod manager;
pub mod models;
pub mod persistence;
pub mod store;
pub mod sweeper;
pub mod token;

pub use cache::{SessionCache, SessionSlot, SweepReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SessionError, SessionResult};
pub use manager::{SessionManager, SessionStats};
pub use models::{IssuedSession, Session, SessionRecord};
pub use persistence::{DrainWorker, PersistOp, PersistenceHealth, PersistenceQueue};
pub use store::{SessionStore, TreeSessionStore, SESSIONS_TREE};
pub use sweeper::spawn_sweeper;
pub use token::{Claims, JwtTokenIssuer, TokenError, TokenIssuer};
