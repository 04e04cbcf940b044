// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plugin loading and capability registries
//!
//! At startup [`PluginLoader`] scans the plugin directory, resolves each
//! module's loader contract and classifies its capability entry points
//! into a [`RegistryBuilder`]. The frozen [`CapabilityRegistry`] is shared
//! read-only by the dispatch chains. Load and resolve failures are logged
//! and skipped; they never abort startup.

pub mod api;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod registry;
pub mod shutdown;

pub use api::{
    AuditPlugin, AuthPlugin, Capability, CapabilitySet, DataEvent, DataEventPlugin,
    DataOperation, ExtendPlugin, ExtendResponse, LoginRequest, LoginStatus, PluginModule,
    ValidatorPlugin, ABI_VERSION,
};
pub use descriptor::PluginDescriptor;
pub use error::{PluginError, PluginResult};
pub use loader::{
    InProcessOpener, LoadReport, ModuleHandle, ModuleOpener, NativeOpener, PluginLoader,
    SkippedPlugin, StaticModule,
};
pub use registry::{CapabilityEntry, CapabilityRegistry, PluginId, RegistryBuilder, RegistrySummary};
pub use shutdown::{spawn_signal_listener, PluginShutdown, ShutdownController};
