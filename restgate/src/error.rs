// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Gateway-level error type

use crate::config::ConfigError;
use crate::plugin::PluginError;
use crate::session::SessionError;
use crate::storage::StorageDriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageDriverError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Authentication failed for user '{0}'")]
    AuthenticationFailed(String),

    #[error("Missing bearer token")]
    MissingToken,
}

impl GatewayError {
    /// Outcomes the transport reports as an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        match self {
            GatewayError::AuthenticationFailed(_) | GatewayError::MissingToken => true,
            GatewayError::Session(e) => e.is_auth_failure(),
            _ => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
