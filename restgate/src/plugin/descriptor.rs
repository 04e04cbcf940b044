// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Descriptor of a loaded module

use super::api::{CapabilitySet, PluginModule};
use super::registry::PluginId;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One module accepted by the startup scan
#[derive(Clone)]
pub struct PluginDescriptor {
    /// File identity (file stem), the registry key
    pub id: PluginId,
    pub name: String,
    pub version: String,
    /// Capabilities the module declared
    pub capabilities: CapabilitySet,
    /// Capabilities whose entry point resolved and was registered
    pub registered: CapabilitySet,
    pub path: PathBuf,
    module: Arc<dyn PluginModule>,
}

impl PluginDescriptor {
    pub fn new(id: PluginId, path: &Path, module: Arc<dyn PluginModule>) -> Self {
        Self {
            id,
            name: module.name().to_string(),
            version: module.version().to_string(),
            capabilities: module.capabilities(),
            registered: CapabilitySet::new(),
            path: path.to_path_buf(),
            module,
        }
    }

    pub fn module(&self) -> &Arc<dyn PluginModule> {
        &self.module
    }

    /// Declared capabilities that failed to resolve
    pub fn missing(&self) -> CapabilitySet {
        self.capabilities
            .difference(&self.registered)
            .copied()
            .collect()
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .field("registered", &self.registered)
            .field("path", &self.path)
            .finish()
    }
}
