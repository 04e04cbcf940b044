// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent storage backends
//!
//! Trait-based abstractions for persistent key-value storage, allowing the
//! session store to run on different backends interchangeably.
//!
//! # Architecture
//!
//! ```text
//! SessionStore (session records)
//!     ↓
//! StorageDriver (key-value abstraction)
//!     ↓
//! Concrete Implementations (Sled, Memory)
//! ```

pub mod factory;
pub mod traits;
pub mod types;

#[cfg(feature = "sled-backend")]
pub mod sled;
pub mod memory;

pub use factory::{create_storage_driver, BoxedStorageDriver};
pub use traits::{StorageDriver, StorageTree, TreeIter};
pub use types::{StorageDriverError, StorageResult, StorageType};
