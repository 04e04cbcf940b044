// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver factory
//!
//! Creates storage drivers from configuration. The session store only sees
//! the resulting trait object.

use super::traits::{StorageDriver, StorageTree};
use super::types::{StorageResult, StorageType};
use std::path::Path;

/// Boxed driver handed to the session store
pub type BoxedStorageDriver = Box<dyn StorageDriver<Tree = Box<dyn StorageTree>>>;

/// Factory function to create a storage driver based on configuration
///
/// # Arguments
/// * `storage_type` - The type of storage driver to create
/// * `path` - The filesystem path where the database should be stored
///   (ignored by the memory driver)
///
/// # Examples
/// ```ignore
/// let driver = create_storage_driver(StorageType::Sled, "./data")?;
/// let tree = driver.open_tree("sessions")?;
/// ```
pub fn create_storage_driver<P: AsRef<Path>>(
    storage_type: StorageType,
    path: P,
) -> StorageResult<BoxedStorageDriver> {
    match storage_type {
        #[cfg(feature = "sled-backend")]
        StorageType::Sled => {
            use crate::storage::persistent::sled::SledDriver;
            let driver = SledDriver::open(path)?;
            Ok(Box::new(driver) as BoxedStorageDriver)
        }
        #[cfg(not(feature = "sled-backend"))]
        StorageType::Sled => {
            let _ = path;
            Err(super::types::StorageDriverError::Unavailable(
                "sled backend not compiled in (enable the `sled-backend` feature)".to_string(),
            ))
        }
        StorageType::Memory => {
            use crate::storage::persistent::memory::MemoryStorageDriver;
            let driver = MemoryStorageDriver::open(path)?;
            Ok(Box::new(driver) as BoxedStorageDriver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(feature = "sled-backend")]
    #[test]
    fn test_create_sled_driver() {
        let temp_dir = TempDir::new().unwrap();
        let driver = create_storage_driver(StorageType::Sled, temp_dir.path()).unwrap();
        assert_eq!(driver.storage_type(), StorageType::Sled);

        let tree = driver.open_tree("sessions").unwrap();
        tree.insert(b"a", b"1").unwrap();
        assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(driver.list_trees().unwrap().contains(&"sessions".to_string()));
    }

    #[test]
    fn test_create_memory_driver() {
        let temp_dir = TempDir::new().unwrap();
        let driver = create_storage_driver(StorageType::Memory, temp_dir.path()).unwrap();
        assert_eq!(driver.storage_type(), StorageType::Memory);
    }

    #[test]
    fn test_storage_type_parsing() {
        assert_eq!("SLED".parse::<StorageType>().unwrap(), StorageType::Sled);
        assert_eq!(" memory ".parse::<StorageType>().unwrap(), StorageType::Memory);
        assert!("rocksdb".parse::<StorageType>().is_err());
    }
}
