// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent session store
//!
//! [`SessionStore`] is the contract the lifecycle manager consumes;
//! [`TreeSessionStore`] implements it on any [`StorageDriver`] tree with
//! bincode-encoded records keyed by the UUID bytes.

use super::models::SessionRecord;
use crate::storage::{
    BoxedStorageDriver, MemoryStorageDriver, StorageDriver, StorageDriverError, StorageResult,
    StorageTree,
};
use uuid::Uuid;

/// Name of the tree holding session records
pub const SESSIONS_TREE: &str = "sessions";

/// Durable session storage consumed by the session manager
pub trait SessionStore: Send + Sync {
    fn get(&self, uuid: &Uuid) -> StorageResult<Option<SessionRecord>>;

    fn put(&self, record: &SessionRecord) -> StorageResult<()>;

    fn delete(&self, uuid: &Uuid) -> StorageResult<()>;

    /// Visit every record not flagged invalidated; stops early when `f`
    /// returns `false`
    fn range_active(&self, f: &mut dyn FnMut(&SessionRecord) -> bool) -> StorageResult<()>;

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Session store backed by a storage driver tree
pub struct TreeSessionStore {
    tree: Box<dyn StorageTree>,
    driver: BoxedStorageDriver,
}

impl TreeSessionStore {
    pub fn open(driver: BoxedStorageDriver) -> StorageResult<Self> {
        let tree = driver.open_tree(SESSIONS_TREE)?;
        Ok(Self { tree, driver })
    }

    /// Store on a fresh in-memory driver
    pub fn in_memory() -> StorageResult<Self> {
        Self::open(Box::new(MemoryStorageDriver::new()))
    }

    pub fn len(&self) -> StorageResult<usize> {
        self.tree.len()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        self.tree.is_empty()
    }

    fn decode(bytes: &[u8]) -> StorageResult<SessionRecord> {
        bincode::deserialize(bytes)
            .map_err(|e| StorageDriverError::DeserializationError(e.to_string()))
    }
}

impl SessionStore for TreeSessionStore {
    fn get(&self, uuid: &Uuid) -> StorageResult<Option<SessionRecord>> {
        match self.tree.get(uuid.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &SessionRecord) -> StorageResult<()> {
        let bytes = bincode::serialize(record)?;
        self.tree.insert(record.uuid.as_bytes(), &bytes)
    }

    fn delete(&self, uuid: &Uuid) -> StorageResult<()> {
        self.tree.remove(uuid.as_bytes())
    }

    fn range_active(&self, f: &mut dyn FnMut(&SessionRecord) -> bool) -> StorageResult<()> {
        for entry in self.tree.iter()? {
            let (key, bytes) = entry?;
            let record = match Self::decode(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!(
                        "Skipping undecodable session record {:?}: {}",
                        Uuid::from_slice(&key).ok(),
                        e
                    );
                    continue;
                }
            };
            if record.invalidated {
                continue;
            }
            if !f(&record) {
                break;
            }
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.tree.flush()?;
        self.driver.flush()
    }
}
