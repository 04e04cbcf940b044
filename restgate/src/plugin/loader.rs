// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Startup scan of the plugin directory
//!
//! The scan never fails: every load or resolve problem is logged, recorded
//! in the [`LoadReport`] and skipped. A [`ModuleOpener`] turns a file into a
//! [`ModuleHandle`]; [`NativeOpener`] uses dynamic libraries and
//! [`InProcessOpener`] serves statically linked modules through the same
//! classification path.

use super::api::{
    AuditPlugin, AuthPlugin, Capability, DataEventPlugin, ExtendPlugin, PluginModule,
    ValidatorPlugin, ABI_VERSION, ABI_VERSION_SYMBOL, MODULE_ENTRY_SYMBOL,
};
use super::descriptor::PluginDescriptor;
use super::error::{PluginError, PluginResult};
use super::registry::{CapabilityEntry, CapabilityRegistry, PluginId, RegistryBuilder};
use crate::config::PluginConfig;
use libloading::Library;
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded module, before classification
pub trait ModuleHandle: Send + Sync {
    /// Resolve the loader contract
    fn module(&self) -> PluginResult<Arc<dyn PluginModule>>;

    /// Resolve one capability's entry point
    fn resolve(&self, capability: Capability) -> PluginResult<CapabilityEntry>;
}

/// Turns candidate files into module handles
pub trait ModuleOpener: Send + Sync {
    /// Files to consider, sorted
    fn candidates(&self, directory: Option<&Path>) -> PluginResult<Vec<PathBuf>> {
        let Some(directory) = directory else {
            return Ok(Vec::new());
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();
            let is_library = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(std::env::consts::DLL_SUFFIX))
                .unwrap_or(false);
            if is_library && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn open(&self, path: &Path) -> PluginResult<Box<dyn ModuleHandle>>;
}

type AbiVersionFn = unsafe extern "C" fn() -> u32;
type EntryFn = unsafe extern "C" fn() -> *mut c_void;

/// Opens native dynamic libraries
///
/// Libraries are leaked on purpose: plugin code and the trait objects it
/// handed out must stay mapped for the life of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl ModuleOpener for NativeOpener {
    fn open(&self, path: &Path) -> PluginResult<Box<dyn ModuleHandle>> {
        // SAFETY: loading runs the library's initializers; plugin code is
        // trusted to share the host's fault domain.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let found = {
            // SAFETY: the symbol is declared with this signature by `export_module!`.
            let version = unsafe { library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL.as_bytes()) }
                .map_err(|e| PluginError::MissingContract {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            unsafe { version() }
        };
        if found != ABI_VERSION {
            return Err(PluginError::AbiMismatch {
                path: path.to_path_buf(),
                expected: ABI_VERSION,
                found,
            });
        }

        let library: &'static Library = Box::leak(Box::new(library));
        Ok(Box::new(NativeHandle {
            library,
            path: path.to_path_buf(),
        }))
    }
}

struct NativeHandle {
    library: &'static Library,
    path: PathBuf,
}

impl NativeHandle {
    /// Call an entry symbol and take ownership of the boxed value it returns
    ///
    /// # Safety
    /// `T` must be the type the symbol boxed with `Box::into_raw`.
    unsafe fn take<T>(&self, symbol: &str) -> Result<T, String> {
        let entry = self
            .library
            .get::<EntryFn>(symbol.as_bytes())
            .map_err(|e| e.to_string())?;
        let raw = entry();
        if raw.is_null() {
            return Err(format!("{} returned null", symbol));
        }
        Ok(*Box::from_raw(raw as *mut T))
    }
}

impl ModuleHandle for NativeHandle {
    fn module(&self) -> PluginResult<Arc<dyn PluginModule>> {
        // SAFETY: `export_module!` boxes an `Arc<dyn PluginModule>`.
        unsafe { self.take::<Arc<dyn PluginModule>>(MODULE_ENTRY_SYMBOL) }.map_err(|message| {
            PluginError::MissingContract {
                path: self.path.clone(),
                message,
            }
        })
    }

    fn resolve(&self, capability: Capability) -> PluginResult<CapabilityEntry> {
        let symbol = capability.entry_symbol();
        // SAFETY: each capability symbol boxes an `Arc` of its own trait.
        let entry = unsafe {
            match capability {
                Capability::Audit => self
                    .take::<Arc<dyn AuditPlugin>>(&symbol)
                    .map(CapabilityEntry::Audit),
                Capability::Validator => self
                    .take::<Arc<dyn ValidatorPlugin>>(&symbol)
                    .map(CapabilityEntry::Validator),
                Capability::Extend => self
                    .take::<Arc<dyn ExtendPlugin>>(&symbol)
                    .map(CapabilityEntry::Extend),
                Capability::Auth => self
                    .take::<Arc<dyn AuthPlugin>>(&symbol)
                    .map(CapabilityEntry::Auth),
                Capability::DataEvent => self
                    .take::<Arc<dyn DataEventPlugin>>(&symbol)
                    .map(CapabilityEntry::DataEvent),
            }
        };
        entry.map_err(|message| {
            log::debug!("{}: {}", self.path.display(), message);
            PluginError::MissingCapability {
                module: self.path.display().to_string(),
                capability,
                symbol,
            }
        })
    }
}

/// A statically linked module and the capability entries it provides
#[derive(Clone)]
pub struct StaticModule {
    module: Arc<dyn PluginModule>,
    entries: BTreeMap<Capability, CapabilityEntry>,
}

impl StaticModule {
    pub fn new(module: Arc<dyn PluginModule>) -> Self {
        Self {
            module,
            entries: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, entry: CapabilityEntry) -> Self {
        self.entries.insert(entry.capability(), entry);
        self
    }

    pub fn with_audit(self, plugin: Arc<dyn AuditPlugin>) -> Self {
        self.with_entry(CapabilityEntry::Audit(plugin))
    }

    pub fn with_validator(self, plugin: Arc<dyn ValidatorPlugin>) -> Self {
        self.with_entry(CapabilityEntry::Validator(plugin))
    }

    pub fn with_extend(self, plugin: Arc<dyn ExtendPlugin>) -> Self {
        self.with_entry(CapabilityEntry::Extend(plugin))
    }

    pub fn with_auth(self, plugin: Arc<dyn AuthPlugin>) -> Self {
        self.with_entry(CapabilityEntry::Auth(plugin))
    }

    pub fn with_data_event(self, plugin: Arc<dyn DataEventPlugin>) -> Self {
        self.with_entry(CapabilityEntry::DataEvent(plugin))
    }
}

impl ModuleHandle for StaticModule {
    fn module(&self) -> PluginResult<Arc<dyn PluginModule>> {
        Ok(self.module.clone())
    }

    fn resolve(&self, capability: Capability) -> PluginResult<CapabilityEntry> {
        self.entries
            .get(&capability)
            .cloned()
            .ok_or_else(|| PluginError::MissingCapability {
                module: self.module.name().to_string(),
                capability,
                symbol: capability.entry_symbol(),
            })
    }
}

/// Serves statically linked modules under synthetic file names
///
/// A module added as `audit_log` appears as `audit_log` + the platform
/// library suffix, so its identity is `audit_log`.
#[derive(Default, Clone)]
pub struct InProcessOpener {
    modules: BTreeMap<PathBuf, StaticModule>,
}

impl InProcessOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, id: &str, module: StaticModule) -> Self {
        self.modules.insert(Self::synthetic_path(id), module);
        self
    }

    pub fn synthetic_path(id: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", id, std::env::consts::DLL_SUFFIX))
    }
}

impl ModuleOpener for InProcessOpener {
    fn candidates(&self, _directory: Option<&Path>) -> PluginResult<Vec<PathBuf>> {
        Ok(self.modules.keys().cloned().collect())
    }

    fn open(&self, path: &Path) -> PluginResult<Box<dyn ModuleHandle>> {
        self.modules
            .get(path)
            .cloned()
            .map(|module| Box::new(module) as Box<dyn ModuleHandle>)
            .ok_or_else(|| PluginError::Load {
                path: path.to_path_buf(),
                message: "no in-process module under this name".to_string(),
            })
    }
}

/// A file or capability the scan left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPlugin {
    pub path: PathBuf,
    pub capability: Option<Capability>,
    pub reason: String,
}

/// Outcome of a scan
pub struct LoadReport {
    pub descriptors: Vec<PluginDescriptor>,
    pub registry: Arc<CapabilityRegistry>,
    pub skipped: Vec<SkippedPlugin>,
}

impl LoadReport {
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
            registry: CapabilityRegistry::empty(),
            skipped: Vec::new(),
        }
    }
}

pub struct PluginLoader {
    opener: Arc<dyn ModuleOpener>,
    config: PluginConfig,
}

impl PluginLoader {
    pub fn new(opener: Arc<dyn ModuleOpener>) -> Self {
        Self {
            opener,
            config: PluginConfig::default(),
        }
    }

    pub fn native() -> Self {
        Self::new(Arc::new(NativeOpener))
    }

    /// Only modules whose declared name is listed get registered
    pub fn with_allow_list(mut self, allow_list: Option<Vec<String>>) -> Self {
        self.config.allow_list = allow_list;
        self
    }

    pub fn from_config(config: &PluginConfig, opener: Arc<dyn ModuleOpener>) -> Self {
        Self {
            opener,
            config: config.clone(),
        }
    }

    /// Scan `directory` and freeze the resulting registry
    pub fn load(&self, directory: Option<&Path>) -> LoadReport {
        let mut builder = RegistryBuilder::new();
        let (descriptors, skipped) = self.load_into(directory, &mut builder);
        LoadReport {
            descriptors,
            registry: builder.freeze(),
            skipped,
        }
    }

    /// Scan `directory` into an existing builder
    pub fn load_into(
        &self,
        directory: Option<&Path>,
        builder: &mut RegistryBuilder,
    ) -> (Vec<PluginDescriptor>, Vec<SkippedPlugin>) {
        let mut descriptors = Vec::new();
        let mut skipped = Vec::new();

        let candidates = match self.opener.candidates(directory) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!(
                    "Cannot read plugin directory {:?}: {}; continuing without plugins",
                    directory,
                    e
                );
                return (descriptors, skipped);
            }
        };

        for path in candidates {
            let mut skip = |capability: Option<Capability>, reason: String| {
                match capability {
                    Some(cap) => log::warn!("Skipping {} of {}: {}", cap, path.display(), reason),
                    None => log::warn!("Skipping plugin {}: {}", path.display(), reason),
                }
                skipped.push(SkippedPlugin {
                    path: path.clone(),
                    capability,
                    reason,
                });
            };

            let handle = match self.opener.open(&path) {
                Ok(handle) => handle,
                Err(e) => {
                    skip(None, e.to_string());
                    continue;
                }
            };
            let module = match handle.module() {
                Ok(module) => module,
                Err(e) => {
                    skip(None, e.to_string());
                    continue;
                }
            };

            if !self.config.is_allowed(module.name()) {
                skip(None, format!("module '{}' not in allow-list", module.name()));
                continue;
            }

            let id: PluginId = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| module.name().to_string());
            let mut descriptor = PluginDescriptor::new(id.clone(), &path, module.clone());

            for capability in descriptor.capabilities.clone() {
                match handle.resolve(capability) {
                    Ok(entry) if entry.capability() == capability => {
                        builder.register_entry(&id, entry);
                        descriptor.registered.insert(capability);
                    }
                    Ok(entry) => skip(
                        Some(capability),
                        format!("entry resolved as {}", entry.capability()),
                    ),
                    Err(e) => skip(Some(capability), e.to_string()),
                }
            }

            builder.register_module(&id, module);
            log::info!(
                "Loaded plugin {} ({} {}) with {:?}",
                id,
                descriptor.name,
                descriptor.version,
                descriptor.registered
            );
            descriptors.push(descriptor);
        }

        (descriptors, skipped)
    }
}
