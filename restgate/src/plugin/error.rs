// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plugin loading and runtime errors

use super::api::Capability;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to load module {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Module {path} does not export the loader contract: {message}")]
    MissingContract { path: PathBuf, message: String },

    #[error("ABI version mismatch for {path}: expected {expected}, found {found}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("Module '{module}' declares {capability} but does not export {symbol}")]
    MissingCapability {
        module: String,
        capability: Capability,
        symbol: String,
    },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Plugin call failed: {0}")]
    Failed(String),

    #[error("Plugin panicked: {0}")]
    Panicked(String),

    #[error("Plugin directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub fn failed(message: impl Into<String>) -> Self {
        PluginError::Failed(message.into())
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        PluginError::NotImplemented(what.into())
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Readable message out of a `catch_unwind` payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
