// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Validator chain

use crate::plugin::error::panic_message;
use crate::plugin::CapabilityRegistry;
use crate::principal::{AccessRole, GatewayRequest, Principal};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Sequential policy gate in front of protected operations
#[derive(Clone)]
pub struct ValidatorChain {
    registry: Arc<CapabilityRegistry>,
}

impl ValidatorChain {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Consult validators in registration order, stopping at the first
    /// denial; if all pass, apply the principal's own permission check
    ///
    /// A panicking validator counts as a denial.
    pub fn validate(
        &self,
        principal: &Principal,
        role: AccessRole,
        resource: &str,
        request: &GatewayRequest,
    ) -> bool {
        for (id, validator) in self.registry.validators() {
            let allowed = catch_unwind(AssertUnwindSafe(|| {
                validator.validate(principal, role, resource, request)
            }))
            .unwrap_or_else(|payload| {
                log::error!(
                    "Validator {} panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                );
                false
            });
            if !allowed {
                log::debug!(
                    "validator {} denied {} {} for {}",
                    id,
                    role,
                    resource,
                    principal.user()
                );
                return false;
            }
        }
        principal.can_access(role, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{RegistryBuilder, ValidatorPlugin};
    use crate::principal::PermissionSet;

    struct Panicking;

    impl ValidatorPlugin for Panicking {
        fn validate(&self, _: &Principal, _: AccessRole, _: &str, _: &GatewayRequest) -> bool {
            panic!("validator bug")
        }
    }

    #[test]
    fn test_empty_chain_falls_through_to_permissions() {
        let chain = ValidatorChain::new(CapabilityRegistry::empty());
        let reader = Principal::new("amy")
            .with_permissions(PermissionSet::new().grant("tables", AccessRole::Read));
        let request = GatewayRequest::get("tables");

        assert!(chain.validate(&reader, AccessRole::Read, "tables", &request));
        assert!(!chain.validate(&reader, AccessRole::Write, "tables", &request));
    }

    #[test]
    fn test_panicking_validator_denies() {
        let mut builder = RegistryBuilder::new();
        builder.register_validator("buggy", Arc::new(Panicking));
        let chain = ValidatorChain::new(builder.freeze());
        let admin = Principal::new("ben")
            .with_permissions(PermissionSet::new().grant("*", AccessRole::Admin));

        assert!(!chain.validate(&admin, AccessRole::Read, "x", &GatewayRequest::get("x")));
    }
}
