// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Authenticated identity models
//!
//! A [`Principal`] is built once at login and shared behind an `Arc` for the
//! rest of the request; it is never mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource that matches every resource in a [`PermissionSet`]
pub const ANY_RESOURCE: &str = "*";

/// Access level requested for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    Read,
    Write,
    Execute,
    /// Implies every other role on the same resource
    Admin,
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessRole::Read => "read",
            AccessRole::Write => "write",
            AccessRole::Execute => "execute",
            AccessRole::Admin => "admin",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for AccessRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(AccessRole::Read),
            "write" => Ok(AccessRole::Write),
            "execute" => Ok(AccessRole::Execute),
            "admin" => Ok(AccessRole::Admin),
            other => Err(format!("Unknown access role: {}", other)),
        }
    }
}

/// Role grants per resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    grants: BTreeMap<String, BTreeSet<AccessRole>>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` on `resource` (use [`ANY_RESOURCE`] for every resource)
    pub fn grant(mut self, resource: impl Into<String>, role: AccessRole) -> Self {
        self.grants.entry(resource.into()).or_default().insert(role);
        self
    }

    /// Check whether `role` is granted on `resource`
    pub fn allows(&self, role: AccessRole, resource: &str) -> bool {
        [resource, ANY_RESOURCE].iter().any(|key| {
            self.grants
                .get(*key)
                .map(|roles| roles.contains(&role) || roles.contains(&AccessRole::Admin))
                .unwrap_or(false)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Iterate `(resource, role)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, AccessRole)> + '_ {
        self.grants
            .iter()
            .flat_map(|(res, roles)| roles.iter().map(move |r| (res.as_str(), *r)))
    }
}

/// Authenticated identity carried through one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    user: String,
    long_name: String,
    permissions: PermissionSet,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn new(user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            long_name: user.clone(),
            user,
            permissions: PermissionSet::new(),
            roles: Vec::new(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = long_name.into();
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_last_login(mut self, last_login: DateTime<Utc>) -> Self {
        self.last_login = Some(last_login);
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Role/resource permission check run after the validator chain
    pub fn can_access(&self, role: AccessRole, resource: &str) -> bool {
        self.permissions.allows(role, resource)
    }
}
