// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory storage driver implementation for testing

use super::traits::{StorageDriver, StorageTree, TreeIter};
use super::types::{StorageResult, StorageType};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

type TreeData = Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>;

/// In-memory storage driver
#[derive(Default)]
pub struct MemoryStorageDriver {
    trees: Arc<RwLock<HashMap<String, TreeData>>>,
}

/// In-memory tree implementation
pub struct MemoryTree {
    data: TreeData,
}

impl MemoryStorageDriver {
    /// Create a new memory storage driver
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageTree for MemoryTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.data.read().len())
    }

    fn iter(&self) -> StorageResult<TreeIter<'_>> {
        // Snapshot so callers never hold the lock while iterating.
        let items: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Ok(Box::new(items.into_iter()))
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl StorageDriver for MemoryStorageDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(_path: P) -> StorageResult<Self> {
        Ok(Self::new())
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        let data = self
            .trees
            .write()
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(Box::new(MemoryTree { data }) as Box<dyn StorageTree>)
    }

    fn list_trees(&self) -> StorageResult<Vec<String>> {
        Ok(self.trees.read().keys().cloned().collect())
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trees_share_data_by_name() {
        let driver = MemoryStorageDriver::new();
        let a = driver.open_tree("sessions").unwrap();
        let b = driver.open_tree("sessions").unwrap();

        a.insert(b"k", b"v").unwrap();
        assert_eq!(b.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(b.len().unwrap(), 1);

        b.remove(b"k").unwrap();
        assert!(a.is_empty().unwrap());
    }
}
