// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver traits
//!
//! All storage drivers implement these traits so the session store can run
//! on sled in production and on the in-memory driver in tests.

use super::types::{StorageResult, StorageType};
use std::path::Path;

/// Iterator over raw key-value pairs of a tree
pub type TreeIter<'a> = Box<dyn Iterator<Item = StorageResult<(Vec<u8>, Vec<u8>)>> + 'a>;

/// Trait for a tree/column family in the storage driver
///
/// Represents a named collection of key-value pairs within a storage driver.
pub trait StorageTree: Send + Sync {
    /// Insert a key-value pair
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Get a value by key
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Remove a key-value pair
    fn remove(&self, key: &[u8]) -> StorageResult<()>;

    /// Number of entries in the tree
    fn len(&self) -> StorageResult<usize>;

    /// Check if the tree is empty
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate over all key-value pairs
    fn iter(&self) -> StorageResult<TreeIter<'_>>;

    /// Flush any pending writes to disk
    fn flush(&self) -> StorageResult<()>;
}

/// Main storage driver trait
pub trait StorageDriver: Send + Sync {
    /// Type of tree/column family used by this driver
    type Tree: StorageTree;

    /// Open or create a storage driver at the given path
    fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self>
    where
        Self: Sized;

    /// Open or create a named tree/column family
    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree>;

    /// List all available trees/column families
    fn list_trees(&self) -> StorageResult<Vec<String>>;

    /// Flush all pending writes to disk
    fn flush(&self) -> StorageResult<()>;

    /// Get storage type
    fn storage_type(&self) -> StorageType;
}

// Lets boxed trees flow through the same generic code as concrete ones.
impl StorageTree for Box<dyn StorageTree> {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).insert(key, value)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        (**self).remove(key)
    }

    fn len(&self) -> StorageResult<usize> {
        (**self).len()
    }

    fn is_empty(&self) -> StorageResult<bool> {
        (**self).is_empty()
    }

    fn iter(&self) -> StorageResult<TreeIter<'_>> {
        (**self).iter()
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }
}
