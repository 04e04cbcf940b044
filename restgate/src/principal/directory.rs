// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory principal cache
//!
//! Principals are sourced from outside the core (credential verifiers, auth
//! plugins) and cached here so sessions reloaded from the store can be bound
//! back to an identity. Nothing in this module is persisted.

use super::models::{PermissionSet, Principal};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Identity data an authenticator produces before a principal exists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalSeed {
    pub user: String,
    pub long_name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: PermissionSet,
}

impl PrincipalSeed {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = Some(long_name.into());
        self
    }
}

/// Resolves the owning principal of a session reloaded from storage
pub trait PrincipalSource: Send + Sync {
    fn resolve(&self, user: &str) -> Option<Arc<Principal>>;
}

/// Principal cache with first-seen provisioning
#[derive(Default)]
pub struct PrincipalDirectory {
    principals: RwLock<HashMap<String, Arc<Principal>>>,
    default_roles: Vec<String>,
}

impl PrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roles given to principals provisioned on first sight
    pub fn with_default_roles(mut self, roles: Vec<String>) -> Self {
        self.default_roles = roles;
        self
    }

    /// Existing-user lookup, or first-seen provisioning from `seed`
    ///
    /// Returns the principal stamped with `now` as its last login. The cached
    /// copy is replaced, never mutated, so holders of older `Arc`s keep a
    /// consistent view.
    pub fn login(&self, seed: &PrincipalSeed, now: DateTime<Utc>) -> Arc<Principal> {
        let mut principals = self.principals.write();
        let principal = match principals.get(&seed.user) {
            Some(existing) => {
                log::debug!("principal.lookup user={}", seed.user);
                Principal::clone(existing)
                    .with_roles(merge_roles(existing.roles(), &seed.roles))
                    .with_permissions(if seed.permissions.is_empty() {
                        existing.permissions().clone()
                    } else {
                        seed.permissions.clone()
                    })
                    .with_last_login(now)
            }
            None => {
                log::info!("principal.provision user={}", seed.user);
                let roles = merge_roles(&self.default_roles, &seed.roles);
                Principal::new(seed.user.clone())
                    .with_long_name(seed.long_name.clone().unwrap_or_else(|| seed.user.clone()))
                    .with_roles(roles)
                    .with_permissions(seed.permissions.clone())
                    .with_created_at(now)
                    .with_last_login(now)
            }
        };
        let principal = Arc::new(principal);
        principals.insert(seed.user.clone(), principal.clone());
        principal
    }

    /// Cache a principal that was authenticated elsewhere
    pub fn remember(&self, principal: Arc<Principal>) {
        self.principals
            .write()
            .insert(principal.user().to_string(), principal);
    }

    pub fn forget(&self, user: &str) -> bool {
        self.principals.write().remove(user).is_some()
    }

    pub fn len(&self) -> usize {
        self.principals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PrincipalSource for PrincipalDirectory {
    fn resolve(&self, user: &str) -> Option<Arc<Principal>> {
        self.principals.read().get(user).cloned()
    }
}

fn merge_roles(base: &[String], extra: &[String]) -> Vec<String> {
    let mut roles = base.to_vec();
    for role in extra {
        if !roles.contains(role) {
            roles.push(role.clone());
        }
    }
    roles
}
