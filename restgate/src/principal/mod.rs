// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Principal and request context
//!
//! This module provides the identity carried through a request:
//! - [`Principal`]: immutable authenticated identity with roles and permissions
//! - [`GatewayRequest`]: transport-neutral request handed to plugins
//! - [`RequestContext`]: principal + request + elapsed-time tracking
//! - [`PrincipalDirectory`]: in-memory principal cache with first-seen provisioning

pub mod context;
pub mod directory;
pub mod models;
pub mod request;

pub use context::RequestContext;
pub use directory::{PrincipalDirectory, PrincipalSeed, PrincipalSource};
pub use models::{AccessRole, PermissionSet, Principal, ANY_RESOURCE};
pub use request::{GatewayRequest, Method};
