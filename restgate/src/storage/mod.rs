// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Durable storage for the gateway
//!
//! Only the key-value driver layer lives here; session-specific encoding is
//! in [`crate::session::store`].

pub mod persistent;

pub use persistent::memory::MemoryStorageDriver;
pub use persistent::{
    create_storage_driver, BoxedStorageDriver, StorageDriver, StorageDriverError, StorageResult,
    StorageTree, StorageType,
};
