// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Audit fan-out
//!
//! Every event goes to every registered audit module. A module that errors
//! or panics only loses its own notification. In detached mode each
//! module's call runs on the blocking pool, so a slow module does not delay
//! the caller or the other modules either.
//!
//! The error-reporting path reaches the chain through a process-wide hook
//! installed after the plugin scan; see [`report_error`].

use crate::config::AuditConfig;
use crate::plugin::error::panic_message;
use crate::plugin::{AuditPlugin, CapabilityRegistry, LoginStatus, PluginId};
use crate::principal::{GatewayRequest, Principal};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How notifications are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    /// Sequentially on the calling thread
    Inline,
    /// One blocking-pool task per module; falls back to inline outside a runtime
    Detached,
}

/// One audit event, owned so it can cross into detached tasks
#[derive(Debug, Clone)]
pub enum AuditEvent {
    Receive {
        principal: Arc<Principal>,
        request: GatewayRequest,
    },
    Send {
        elapsed: Duration,
        principal: Arc<Principal>,
        request: GatewayRequest,
    },
    SendError {
        elapsed: Duration,
        principal: Arc<Principal>,
        request: GatewayRequest,
        error: String,
    },
    Login {
        method: String,
        status: LoginStatus,
        session: Option<Uuid>,
        user: String,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Receive { .. } => "receive",
            AuditEvent::Send { .. } => "send",
            AuditEvent::SendError { .. } => "send_error",
            AuditEvent::Login { .. } => "login",
        }
    }

    fn request(&self) -> Option<&GatewayRequest> {
        match self {
            AuditEvent::Receive { request, .. }
            | AuditEvent::Send { request, .. }
            | AuditEvent::SendError { request, .. } => Some(request),
            AuditEvent::Login { .. } => None,
        }
    }

    fn deliver(&self, plugin: &dyn AuditPlugin) -> crate::plugin::PluginResult<()> {
        match self {
            AuditEvent::Receive { principal, request } => plugin.receive_audit(principal, request),
            AuditEvent::Send {
                elapsed,
                principal,
                request,
            } => plugin.send_audit(*elapsed, principal, request),
            AuditEvent::SendError {
                elapsed,
                principal,
                request,
                error,
            } => plugin.send_audit_error(*elapsed, principal, request, error),
            AuditEvent::Login {
                method,
                status,
                session,
                user,
            } => plugin.login_audit(method, *status, *session, user),
        }
    }
}

/// What happened to one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Modules the event was handed to
    pub dispatched: usize,
    /// Modules that failed, with the reason; inline mode only
    pub failures: Vec<(PluginId, String)>,
    /// The request hit an excluded endpoint
    pub excluded: bool,
}

pub struct AuditChain {
    registry: Arc<CapabilityRegistry>,
    excluded: HashSet<String>,
    mode: AuditMode,
}

impl AuditChain {
    pub fn new(registry: Arc<CapabilityRegistry>, config: &AuditConfig) -> Self {
        Self {
            registry,
            excluded: config.excluded_endpoints.iter().cloned().collect(),
            mode: if config.detached {
                AuditMode::Detached
            } else {
                AuditMode::Inline
            },
        }
    }

    pub fn with_mode(mut self, mode: AuditMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> AuditMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.registry.audit().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the request's endpoint is kept out of audit
    pub fn is_excluded(&self, request: &GatewayRequest) -> bool {
        request
            .first_segment()
            .map(|segment| self.excluded.contains(segment))
            .unwrap_or(false)
    }

    pub fn receive_audit(&self, principal: &Arc<Principal>, request: &GatewayRequest) -> AuditReport {
        self.dispatch(AuditEvent::Receive {
            principal: principal.clone(),
            request: request.clone(),
        })
    }

    pub fn send_audit(
        &self,
        elapsed: Duration,
        principal: &Arc<Principal>,
        request: &GatewayRequest,
    ) -> AuditReport {
        self.dispatch(AuditEvent::Send {
            elapsed,
            principal: principal.clone(),
            request: request.clone(),
        })
    }

    pub fn send_audit_error(
        &self,
        elapsed: Duration,
        principal: &Arc<Principal>,
        request: &GatewayRequest,
        error: &str,
    ) -> AuditReport {
        self.dispatch(AuditEvent::SendError {
            elapsed,
            principal: principal.clone(),
            request: request.clone(),
            error: error.to_string(),
        })
    }

    pub fn login_audit(
        &self,
        method: &str,
        status: LoginStatus,
        session: Option<Uuid>,
        user: &str,
    ) -> AuditReport {
        self.dispatch(AuditEvent::Login {
            method: method.to_string(),
            status,
            session,
            user: user.to_string(),
        })
    }

    pub fn dispatch(&self, event: AuditEvent) -> AuditReport {
        if event.request().is_some_and(|request| self.is_excluded(request)) {
            return AuditReport {
                excluded: true,
                ..AuditReport::default()
            };
        }
        let modules = self.registry.audit();
        if modules.is_empty() {
            return AuditReport::default();
        }

        let runtime = match self.mode {
            AuditMode::Detached => tokio::runtime::Handle::try_current().ok(),
            AuditMode::Inline => None,
        };
        match runtime {
            Some(runtime) => {
                let event = Arc::new(event);
                for (id, plugin) in modules {
                    let (id, plugin, event) = (id.clone(), plugin.clone(), event.clone());
                    runtime.spawn_blocking(move || {
                        if let Err(reason) = deliver_one(&id, plugin.as_ref(), &event) {
                            log::debug!("detached audit to {} failed: {}", id, reason);
                        }
                    });
                }
                AuditReport {
                    dispatched: modules.len(),
                    ..AuditReport::default()
                }
            }
            None => {
                let failures = modules
                    .iter()
                    .filter_map(|(id, plugin)| {
                        deliver_one(id, plugin.as_ref(), &event)
                            .err()
                            .map(|reason| (id.clone(), reason))
                    })
                    .collect();
                AuditReport {
                    dispatched: modules.len(),
                    failures,
                    excluded: false,
                }
            }
        }
    }
}

fn deliver_one(id: &str, plugin: &dyn AuditPlugin, event: &AuditEvent) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| event.deliver(plugin))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::warn!("Audit module {} failed on {} event: {}", id, event.kind(), e);
            Err(e.to_string())
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            log::error!(
                "Audit module {} panicked on {} event: {}",
                id,
                event.kind(),
                reason
            );
            Err(format!("panicked: {}", reason))
        }
    }
}

static AUDIT_HOOK: Lazy<RwLock<Option<Arc<AuditChain>>>> = Lazy::new(|| RwLock::new(None));

/// Make `chain` the target of [`report_error`]
pub fn install_audit_hook(chain: Arc<AuditChain>) {
    log::info!("Installing audit hook ({} modules)", chain.len());
    *AUDIT_HOOK.write() = Some(chain);
}

/// Remove the hook; returns whether one was installed
pub fn clear_audit_hook() -> bool {
    AUDIT_HOOK.write().take().is_some()
}

pub fn audit_hook_installed() -> bool {
    AUDIT_HOOK.read().is_some()
}

/// Error-reporting entry point for the transport
///
/// Fans the failure out as a `send_audit_error` event when the audit hook
/// is installed, and logs it otherwise.
pub fn report_error(
    elapsed: Duration,
    principal: &Arc<Principal>,
    request: &GatewayRequest,
    error: &str,
) -> Option<AuditReport> {
    let chain = AUDIT_HOOK.read().clone();
    match chain {
        Some(chain) => Some(chain.send_audit_error(elapsed, principal, request, error)),
        None => {
            log::error!(
                "{} {} failed for {}: {}",
                request.method,
                request.path,
                principal.user(),
                error
            );
            None
        }
    }
}
