// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Authentication chain

use crate::plugin::error::panic_message;
use crate::plugin::{CapabilityRegistry, LoginRequest, PluginId};
use crate::principal::PrincipalSeed;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Principal seed produced by an auth module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMatch {
    pub module: PluginId,
    pub seed: PrincipalSeed,
}

pub struct AuthChain {
    registry: Arc<CapabilityRegistry>,
}

impl AuthChain {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn is_empty(&self) -> bool {
        self.registry.auth().is_empty()
    }

    /// Ask auth modules in key order; the first one that recognizes the
    /// credentials wins. Failing modules are logged and passed over.
    pub fn authenticate(&self, login: &LoginRequest) -> Option<AuthMatch> {
        for (id, plugin) in self.registry.auth() {
            match catch_unwind(AssertUnwindSafe(|| plugin.authenticate(login))) {
                Ok(Ok(Some(seed))) => {
                    log::debug!("auth module {} accepted {}", id, login.user);
                    return Some(AuthMatch {
                        module: id.clone(),
                        seed,
                    });
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => log::warn!("Auth module {} failed for {}: {}", id, login.user, e),
                Err(payload) => log::error!(
                    "Auth module {} panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                ),
            }
        }
        None
    }
}
