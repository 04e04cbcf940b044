// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! restgate - runtime core of a database-backed REST gateway
//!
//! restgate keeps a crash-tolerant view of live sessions in front of a
//! persistent store, and wires natively loaded plugins into the audit,
//! validation and protocol-extension pipelines.
//!
//! # Features
//!
//! - **Sessions**: in-memory cache with write-behind persistence to sled
//! - **Fail-safe degradation**: a saturated write queue or failing store is
//!   reported through health, never by blocking requests
//! - **Plugins**: dynamic libraries classified by capability (audit,
//!   validator, extend, auth, data event) into immutable registries
//! - **Dispatch chains**: audit fan-out, validator gate and prefix routing
//!
//! # Usage
//!
//! restgate is embedded by a transport layer through [`Gateway`]; the
//! `restgate` CLI runs it standalone for operations:
//!
//! ```bash
//! # Start the gateway core and wait for Ctrl-C
//! restgate serve --data-dir ./restgate-data --plugin-dir ./plugins
//!
//! # Inspect what the plugin scan would load
//! restgate plugins --plugin-dir ./plugins
//!
//! # List active sessions in the store
//! restgate sessions --data-dir ./restgate-data
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod plugin;
pub mod principal;
pub mod session;
pub mod storage;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{CredentialVerifier, Gateway, GatewayBuilder, GatewayHealth, StaticCredentials};
pub use principal::{AccessRole, GatewayRequest, Principal, RequestContext};
pub use session::{IssuedSession, SessionError, SessionManager};

/// restgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// restgate crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
