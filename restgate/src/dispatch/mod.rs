// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Dispatch chains over the capability registry
//!
//! No ordering across modules is guaranteed by any chain. Validators run
//! in registration order but callers must not rely on relative priority.

pub mod audit;
pub mod auth;
pub mod data_event;
pub mod extend;
pub mod validator;

pub use audit::{
    audit_hook_installed, clear_audit_hook, install_audit_hook, report_error, AuditChain,
    AuditEvent, AuditMode, AuditReport,
};
pub use auth::{AuthChain, AuthMatch};
pub use data_event::DataEventChain;
pub use extend::{extend_resource, ExtendChain, ExtendOutcome};
pub use validator::ValidatorChain;
