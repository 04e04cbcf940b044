// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session lifecycle error types

use super::token::TokenError;
use crate::storage::StorageDriverError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Session invalidated: {0}")]
    Invalidated(Uuid),

    #[error("Session expired: {0}")]
    Expired(Uuid),

    #[error("No principal available for user '{user}' of session {uuid}")]
    UnknownPrincipal { uuid: Uuid, user: String },

    #[error("Session lifetime out of range: {0}")]
    InvalidTtl(String),

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageDriverError),
}

impl SessionError {
    /// Normal negative outcomes surfaced to the transport as an
    /// authentication failure rather than an internal error
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidToken(_)
                | SessionError::NotFound(_)
                | SessionError::Invalidated(_)
                | SessionError::Expired(_)
                | SessionError::UnknownPrincipal { .. }
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
