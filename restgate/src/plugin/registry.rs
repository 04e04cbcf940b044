// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Capability registry
//!
//! Modules are classified into per-capability maps by a [`RegistryBuilder`]
//! during the startup scan. [`RegistryBuilder::freeze`] turns the builder
//! into an immutable [`CapabilityRegistry`] that dispatch chains share
//! behind an `Arc` and read without locking.

use super::api::{
    AuditPlugin, AuthPlugin, Capability, DataEventPlugin, ExtendPlugin, PluginModule,
    ValidatorPlugin,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Module identity: the file stem of the library it came from
pub type PluginId = String;

/// A resolved capability entry point
#[derive(Clone)]
pub enum CapabilityEntry {
    Audit(Arc<dyn AuditPlugin>),
    Validator(Arc<dyn ValidatorPlugin>),
    Extend(Arc<dyn ExtendPlugin>),
    Auth(Arc<dyn AuthPlugin>),
    DataEvent(Arc<dyn DataEventPlugin>),
}

impl CapabilityEntry {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityEntry::Audit(_) => Capability::Audit,
            CapabilityEntry::Validator(_) => Capability::Validator,
            CapabilityEntry::Extend(_) => Capability::Extend,
            CapabilityEntry::Auth(_) => Capability::Auth,
            CapabilityEntry::DataEvent(_) => Capability::DataEvent,
        }
    }
}

/// Mutable registry used while modules are being loaded
#[derive(Default)]
pub struct RegistryBuilder {
    modules: BTreeMap<PluginId, Arc<dyn PluginModule>>,
    audit: BTreeMap<PluginId, Arc<dyn AuditPlugin>>,
    validators: Vec<(PluginId, Arc<dyn ValidatorPlugin>)>,
    extend: BTreeMap<String, (PluginId, Arc<dyn ExtendPlugin>)>,
    auth: BTreeMap<PluginId, Arc<dyn AuthPlugin>>,
    data_event: BTreeMap<PluginId, Arc<dyn DataEventPlugin>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a module for shutdown
    pub fn register_module(&mut self, id: &str, module: Arc<dyn PluginModule>) {
        if self.modules.insert(id.to_string(), module).is_some() {
            log::warn!("Module '{}' registered twice; keeping the latest", id);
        }
    }

    pub fn register_audit(&mut self, id: &str, plugin: Arc<dyn AuditPlugin>) {
        if self.audit.insert(id.to_string(), plugin).is_some() {
            log::warn!("Audit module '{}' replaced by a later registration", id);
        }
        log::info!("Registered audit module: {}", id);
    }

    /// Add a validator at the end of the chain
    ///
    /// Re-registering an id replaces it in place, keeping its position.
    pub fn register_validator(&mut self, id: &str, plugin: Arc<dyn ValidatorPlugin>) {
        match self.validators.iter_mut().find(|(existing, _)| existing == id) {
            Some(slot) => {
                log::warn!("Validator '{}' replaced by a later registration", id);
                slot.1 = plugin;
            }
            None => self.validators.push((id.to_string(), plugin)),
        }
        log::info!("Registered validator module: {}", id);
    }

    /// Claim `prefix` for an extension module
    ///
    /// # Arguments
    /// * `prefix` - First path segment; surrounding slashes are ignored
    /// * `id` - Identity of the claiming module
    /// * `plugin` - Handler receiving requests under the prefix
    ///
    /// # Returns
    /// * `Some(previous_id)` if another registration held the prefix; the
    ///   latest registration wins
    pub fn register_extend(
        &mut self,
        prefix: &str,
        id: &str,
        plugin: Arc<dyn ExtendPlugin>,
    ) -> Option<PluginId> {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains('/') {
            log::warn!(
                "Module '{}' claims invalid extend prefix '{}'; ignored",
                id,
                prefix
            );
            return None;
        }
        let previous = self
            .extend
            .insert(prefix.to_string(), (id.to_string(), plugin))
            .map(|(previous, _)| previous);
        match &previous {
            Some(previous) if previous != id => log::warn!(
                "Extend prefix '{}' claimed by '{}' is now handled by '{}'",
                prefix,
                previous,
                id
            ),
            _ => log::info!("Registered extend prefix '{}' for module {}", prefix, id),
        }
        previous
    }

    pub fn register_auth(&mut self, id: &str, plugin: Arc<dyn AuthPlugin>) {
        if self.auth.insert(id.to_string(), plugin).is_some() {
            log::warn!("Auth module '{}' replaced by a later registration", id);
        }
        log::info!("Registered auth module: {}", id);
    }

    pub fn register_data_event(&mut self, id: &str, plugin: Arc<dyn DataEventPlugin>) {
        if self.data_event.insert(id.to_string(), plugin).is_some() {
            log::warn!("Data event module '{}' replaced by a later registration", id);
        }
        log::info!("Registered data event module: {}", id);
    }

    /// Register a resolved entry under its capability
    ///
    /// Extend entries are registered under every prefix they claim.
    pub fn register_entry(&mut self, id: &str, entry: CapabilityEntry) {
        match entry {
            CapabilityEntry::Audit(plugin) => self.register_audit(id, plugin),
            CapabilityEntry::Validator(plugin) => self.register_validator(id, plugin),
            CapabilityEntry::Extend(plugin) => {
                let prefixes = plugin.prefixes();
                if prefixes.is_empty() {
                    log::warn!("Extend module '{}' claims no prefixes", id);
                }
                for prefix in prefixes {
                    self.register_extend(&prefix, id, plugin.clone());
                }
            }
            CapabilityEntry::Auth(plugin) => self.register_auth(id, plugin),
            CapabilityEntry::DataEvent(plugin) => self.register_data_event(id, plugin),
        }
    }

    /// Finish loading; the result is read-only
    pub fn freeze(self) -> Arc<CapabilityRegistry> {
        Arc::new(CapabilityRegistry {
            modules: self.modules.into_iter().collect(),
            audit: self.audit.into_iter().collect(),
            validators: self.validators,
            extend: self.extend.into_iter().collect(),
            auth: self.auth.into_iter().collect(),
            data_event: self.data_event.into_iter().collect(),
        })
    }
}

/// Immutable per-capability view consulted by the dispatch chains
#[derive(Default)]
pub struct CapabilityRegistry {
    modules: Vec<(PluginId, Arc<dyn PluginModule>)>,
    audit: Vec<(PluginId, Arc<dyn AuditPlugin>)>,
    validators: Vec<(PluginId, Arc<dyn ValidatorPlugin>)>,
    extend: HashMap<String, (PluginId, Arc<dyn ExtendPlugin>)>,
    auth: Vec<(PluginId, Arc<dyn AuthPlugin>)>,
    data_event: Vec<(PluginId, Arc<dyn DataEventPlugin>)>,
}

/// Keys held by a registry, for comparison and display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    pub modules: Vec<PluginId>,
    pub audit: Vec<PluginId>,
    /// In consultation order
    pub validators: Vec<PluginId>,
    /// `(prefix, owner)` sorted by prefix
    pub extend: Vec<(String, PluginId)>,
    pub auth: Vec<PluginId>,
    pub data_event: Vec<PluginId>,
}

impl CapabilityRegistry {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn modules(&self) -> &[(PluginId, Arc<dyn PluginModule>)] {
        &self.modules
    }

    pub fn audit(&self) -> &[(PluginId, Arc<dyn AuditPlugin>)] {
        &self.audit
    }

    pub fn validators(&self) -> &[(PluginId, Arc<dyn ValidatorPlugin>)] {
        &self.validators
    }

    pub fn extend(&self, prefix: &str) -> Option<&(PluginId, Arc<dyn ExtendPlugin>)> {
        self.extend.get(prefix)
    }

    pub fn auth(&self) -> &[(PluginId, Arc<dyn AuthPlugin>)] {
        &self.auth
    }

    pub fn data_event(&self) -> &[(PluginId, Arc<dyn DataEventPlugin>)] {
        &self.data_event
    }

    pub fn has_audit(&self) -> bool {
        !self.audit.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
            && self.audit.is_empty()
            && self.validators.is_empty()
            && self.extend.is_empty()
            && self.auth.is_empty()
            && self.data_event.is_empty()
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut extend: Vec<(String, PluginId)> = self
            .extend
            .iter()
            .map(|(prefix, (id, _))| (prefix.clone(), id.clone()))
            .collect();
        extend.sort();
        RegistrySummary {
            modules: self.modules.iter().map(|(id, _)| id.clone()).collect(),
            audit: self.audit.iter().map(|(id, _)| id.clone()).collect(),
            validators: self.validators.iter().map(|(id, _)| id.clone()).collect(),
            extend,
            auth: self.auth.iter().map(|(id, _)| id.clone()).collect(),
            data_event: self.data_event.iter().map(|(id, _)| id.clone()).collect(),
        }
    }
}
