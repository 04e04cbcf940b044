// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Extension prefix routing
//!
//! The first path segment selects the module that claimed it. The
//! validator chain is consulted with resource `#<prefix>` before the
//! module's verb handler runs.

use super::validator::ValidatorChain;
use crate::plugin::{CapabilityRegistry, ExtendResponse, PluginError, PluginResult};
use crate::principal::{AccessRole, GatewayRequest, Method, Principal};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendOutcome {
    Handled(ExtendResponse),
    /// No module owns the prefix, or the owner does not handle the verb
    NotImplemented,
    /// The validator chain refused access
    Denied,
}

/// Resource name the validator chain sees for an extension prefix
pub fn extend_resource(prefix: &str) -> String {
    format!("#{}", prefix)
}

pub struct ExtendChain {
    registry: Arc<CapabilityRegistry>,
    validators: ValidatorChain,
}

impl ExtendChain {
    pub fn new(registry: Arc<CapabilityRegistry>, validators: ValidatorChain) -> Self {
        Self {
            registry,
            validators,
        }
    }

    /// Whether some module owns the request's first segment
    pub fn claims(&self, request: &GatewayRequest) -> bool {
        request
            .first_segment()
            .is_some_and(|prefix| self.registry.extend(prefix).is_some())
    }

    /// Route `request` to the module owning its first segment
    ///
    /// Module failures other than "not implemented" are returned as errors.
    pub fn dispatch(
        &self,
        principal: &Principal,
        request: &GatewayRequest,
    ) -> PluginResult<ExtendOutcome> {
        let Some(prefix) = request.first_segment() else {
            return Ok(ExtendOutcome::NotImplemented);
        };
        let Some((id, plugin)) = self.registry.extend(prefix) else {
            return Ok(ExtendOutcome::NotImplemented);
        };
        let role = match request.method {
            Method::Get => AccessRole::Read,
            Method::Put | Method::Post => AccessRole::Write,
            _ => return Ok(ExtendOutcome::NotImplemented),
        };

        if !self
            .validators
            .validate(principal, role, &extend_resource(prefix), request)
        {
            return Ok(ExtendOutcome::Denied);
        }

        let result = match request.method {
            Method::Get => plugin.get(principal, request),
            Method::Put => plugin.put(principal, request),
            _ => plugin.post(principal, request),
        };
        match result {
            Ok(response) => Ok(ExtendOutcome::Handled(response)),
            Err(PluginError::NotImplemented(_)) => Ok(ExtendOutcome::NotImplemented),
            Err(e) => {
                log::warn!(
                    "Extend module {} failed on {} {}: {}",
                    id,
                    request.method,
                    request.path,
                    e
                );
                Err(e)
            }
        }
    }
}
