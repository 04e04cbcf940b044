// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver types and error handling
//!
//! This module defines the types, enums, and error handling used by the
//! key-value drivers that back the persistent session store.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Storage driver type configuration
///
/// Specifies which underlying storage technology holds session records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Sled - Pure Rust embedded database
    /// Best for: single-node gateways that must survive restarts
    #[default]
    Sled,

    /// Memory - In-memory storage
    /// Best for: Unit testing, development, stateless deployments
    Memory,
}

impl std::str::FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sled" => Ok(StorageType::Sled),
            "memory" => Ok(StorageType::Memory),
            _ => Err(format!(
                "Unknown storage type: {}. Valid options: sled, memory",
                s
            )),
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Sled => "sled",
            StorageType::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Error type for storage driver operations
#[derive(Error, Debug)]
pub enum StorageDriverError {
    /// I/O related errors (file system, locks)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Data serialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Data deserialization failed
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Backend is not compiled into this build
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    /// Driver-specific error (Sled, etc.)
    #[error("Storage driver error: {0}")]
    BackendSpecific(String),
}

impl From<bincode::Error> for StorageDriverError {
    fn from(e: bincode::Error) -> Self {
        StorageDriverError::SerializationError(e.to_string())
    }
}

/// Result type for storage driver operations
pub type StorageResult<T> = Result<T, StorageDriverError>;
