// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plugin-facing API
//!
//! A module implements [`PluginModule`] (the loader contract) plus one
//! trait per capability it declares. Native modules are exported with
//! [`export_module!`](crate::export_module); they must be built against the
//! same restgate version and toolchain as the host, which
//! [`ABI_VERSION`] guards.

use super::error::{PluginError, PluginResult};
use crate::principal::{AccessRole, GatewayRequest, Principal, PrincipalSeed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Bumped whenever a plugin trait changes shape
pub const ABI_VERSION: u32 = 1;

pub const ABI_VERSION_SYMBOL: &str = "restgate_abi_version";
pub const MODULE_ENTRY_SYMBOL: &str = "restgate_module_entry";

/// Extension point a module may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Audit,
    Validator,
    Extend,
    Auth,
    DataEvent,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Audit,
        Capability::Validator,
        Capability::Extend,
        Capability::Auth,
        Capability::DataEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Audit => "audit",
            Capability::Validator => "validator",
            Capability::Extend => "extend",
            Capability::Auth => "auth",
            Capability::DataEvent => "data_event",
        }
    }

    /// Symbol a native module exports for this capability
    pub fn entry_symbol(&self) -> String {
        format!("restgate_{}_entry", self.as_str())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audit" => Ok(Capability::Audit),
            "validator" => Ok(Capability::Validator),
            "extend" => Ok(Capability::Extend),
            "auth" => Ok(Capability::Auth),
            "data_event" | "dataevent" => Ok(Capability::DataEvent),
            other => Err(format!("Unknown capability: {}", other)),
        }
    }
}

pub type CapabilitySet = BTreeSet<Capability>;

/// Loader contract every module exports
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Called exactly once at shutdown
    fn stop(&self) {}
}

/// Outcome reported by `login_audit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Success,
    Failure,
    Logout,
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginStatus::Success => write!(f, "success"),
            LoginStatus::Failure => write!(f, "failure"),
            LoginStatus::Logout => write!(f, "logout"),
        }
    }
}

/// Lifecycle notifications
///
/// Errors are logged by the chain and never change the request outcome.
pub trait AuditPlugin: Send + Sync {
    fn receive_audit(&self, principal: &Principal, request: &GatewayRequest) -> PluginResult<()>;

    fn send_audit(
        &self,
        _elapsed: Duration,
        _principal: &Principal,
        _request: &GatewayRequest,
    ) -> PluginResult<()> {
        Ok(())
    }

    fn send_audit_error(
        &self,
        _elapsed: Duration,
        _principal: &Principal,
        _request: &GatewayRequest,
        _error: &str,
    ) -> PluginResult<()> {
        Ok(())
    }

    fn login_audit(
        &self,
        _method: &str,
        _status: LoginStatus,
        _session: Option<Uuid>,
        _user: &str,
    ) -> PluginResult<()> {
        Ok(())
    }
}

/// Policy gate consulted before protected operations
pub trait ValidatorPlugin: Send + Sync {
    fn validate(
        &self,
        principal: &Principal,
        role: AccessRole,
        resource: &str,
        request: &GatewayRequest,
    ) -> bool;
}

/// Response produced by an extension handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ExtendResponse {
    pub fn ok(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok("application/json", value.to_string())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

/// Handler owning one or more first-path-segment prefixes
///
/// Verbs a module does not handle report [`PluginError::NotImplemented`].
pub trait ExtendPlugin: Send + Sync {
    fn prefixes(&self) -> Vec<String>;

    fn get(&self, principal: &Principal, request: &GatewayRequest) -> PluginResult<ExtendResponse>;

    fn put(&self, _principal: &Principal, _request: &GatewayRequest) -> PluginResult<ExtendResponse> {
        Err(PluginError::not_implemented("PUT"))
    }

    fn post(&self, _principal: &Principal, _request: &GatewayRequest) -> PluginResult<ExtendResponse> {
        Err(PluginError::not_implemented("POST"))
    }
}

/// Credentials presented at login
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user: String,
    pub secret: String,
    /// Authentication method label, e.g. `password`
    pub method: String,
}

impl LoginRequest {
    pub fn password(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
            method: "password".to_string(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("method", &self.method)
            .finish()
    }
}

/// Pluggable authenticator
///
/// `Ok(None)` means the module does not recognize the credentials and the
/// next module is asked.
pub trait AuthPlugin: Send + Sync {
    fn authenticate(&self, login: &LoginRequest) -> PluginResult<Option<PrincipalSeed>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOperation {
    Insert,
    Update,
    Delete,
}

/// Data change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEvent {
    pub table: String,
    pub operation: DataOperation,
    pub key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DataEvent {
    pub fn new(table: impl Into<String>, operation: DataOperation) -> Self {
        Self {
            table: table.into(),
            operation,
            key: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

pub trait DataEventPlugin: Send + Sync {
    fn on_data_event(&self, event: &DataEvent) -> PluginResult<()>;
}

/// Export a type as a native restgate module
///
/// ```ignore
/// restgate::export_module!(ReportsPlugin, ReportsPlugin::new, [extend, audit]);
/// ```
///
/// One instance is created lazily and shared by the loader contract and
/// every listed capability entry.
#[macro_export]
macro_rules! export_module {
    ($ty:ty, $ctor:expr, [$($cap:ident),* $(,)?]) => {
        static __RESTGATE_INSTANCE: ::std::sync::OnceLock<::std::sync::Arc<$ty>> =
            ::std::sync::OnceLock::new();

        fn __restgate_instance() -> ::std::sync::Arc<$ty> {
            __RESTGATE_INSTANCE
                .get_or_init(|| ::std::sync::Arc::new(($ctor)()))
                .clone()
        }

        #[no_mangle]
        pub extern "C" fn restgate_abi_version() -> u32 {
            $crate::plugin::ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn restgate_module_entry() -> *mut ::std::ffi::c_void {
            let module: ::std::sync::Arc<dyn $crate::plugin::PluginModule> = __restgate_instance();
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(module)) as *mut ::std::ffi::c_void
        }

        $( $crate::export_capability!($cap); )*
    };
}

/// Capability entry symbol; used by [`export_module!`](crate::export_module)
#[doc(hidden)]
#[macro_export]
macro_rules! export_capability {
    (audit) => {
        $crate::export_capability!(@entry restgate_audit_entry, AuditPlugin);
    };
    (validator) => {
        $crate::export_capability!(@entry restgate_validator_entry, ValidatorPlugin);
    };
    (extend) => {
        $crate::export_capability!(@entry restgate_extend_entry, ExtendPlugin);
    };
    (auth) => {
        $crate::export_capability!(@entry restgate_auth_entry, AuthPlugin);
    };
    (data_event) => {
        $crate::export_capability!(@entry restgate_data_event_entry, DataEventPlugin);
    };
    (@entry $symbol:ident, $iface:ident) => {
        #[no_mangle]
        pub extern "C" fn $symbol() -> *mut ::std::ffi::c_void {
            let entry: ::std::sync::Arc<dyn $crate::plugin::$iface> = __restgate_instance();
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(entry)) as *mut ::std::ffi::c_void
        }
    };
}
