//! In-process test modules

use parking_lot::Mutex;
use restgate::plugin::{
    AuditPlugin, AuthPlugin, Capability, CapabilitySet, ExtendPlugin, ExtendResponse,
    LoginRequest, LoginStatus, PluginError, PluginModule, PluginResult, StaticModule,
    ValidatorPlugin,
};
use restgate::principal::{AccessRole, GatewayRequest, Principal, PrincipalSeed};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Loader contract with a fixed name and capability list
pub struct TestModule {
    name: String,
    capabilities: CapabilitySet,
    pub stops: AtomicUsize,
}

impl TestModule {
    pub fn new(name: &str, capabilities: &[Capability]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capabilities: capabilities.iter().copied().collect(),
            stops: AtomicUsize::new(0),
        })
    }
}

impl PluginModule for TestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audit module recording one line per event
#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<String>>,
}

impl RecordingAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn record(&self, line: String) {
        self.events.lock().push(line);
    }
}

impl AuditPlugin for RecordingAudit {
    fn receive_audit(&self, principal: &Principal, request: &GatewayRequest) -> PluginResult<()> {
        self.record(format!("receive {} {}", principal.user(), request.path));
        Ok(())
    }

    fn send_audit(
        &self,
        _elapsed: Duration,
        principal: &Principal,
        request: &GatewayRequest,
    ) -> PluginResult<()> {
        self.record(format!("send {} {}", principal.user(), request.path));
        Ok(())
    }

    fn send_audit_error(
        &self,
        _elapsed: Duration,
        principal: &Principal,
        request: &GatewayRequest,
        error: &str,
    ) -> PluginResult<()> {
        self.record(format!(
            "error {} {} {}",
            principal.user(),
            request.path,
            error
        ));
        Ok(())
    }

    fn login_audit(
        &self,
        method: &str,
        status: LoginStatus,
        _session: Option<Uuid>,
        user: &str,
    ) -> PluginResult<()> {
        self.record(format!("login {} {} {}", method, status, user));
        Ok(())
    }
}

/// Audit module that rejects every event
pub struct FailingAudit;

impl AuditPlugin for FailingAudit {
    fn receive_audit(&self, _principal: &Principal, _request: &GatewayRequest) -> PluginResult<()> {
        Err(PluginError::failed("audit sink unreachable"))
    }

    fn send_audit_error(
        &self,
        _elapsed: Duration,
        _principal: &Principal,
        _request: &GatewayRequest,
        _error: &str,
    ) -> PluginResult<()> {
        Err(PluginError::failed("audit sink unreachable"))
    }
}

/// Extension answering GET under the `reports` prefix
#[derive(Default)]
pub struct ReportsExtend {
    pub calls: AtomicUsize,
}

impl ReportsExtend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ExtendPlugin for ReportsExtend {
    fn prefixes(&self) -> Vec<String> {
        vec!["reports".to_string()]
    }

    fn get(&self, principal: &Principal, request: &GatewayRequest) -> PluginResult<ExtendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExtendResponse::json(&serde_json::json!({
            "report": request.sub_path(),
            "user": principal.user(),
        })))
    }
}

/// Validator returning a fixed answer and counting calls
pub struct FixedValidator {
    allow: bool,
    pub calls: AtomicUsize,
}

impl FixedValidator {
    pub fn allowing() -> Arc<Self> {
        Arc::new(Self {
            allow: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            allow: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ValidatorPlugin for FixedValidator {
    fn validate(
        &self,
        _principal: &Principal,
        _role: AccessRole,
        _resource: &str,
        _request: &GatewayRequest,
    ) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.allow
    }
}

/// Authenticator accepting one token-style credential
pub struct TokenAuth {
    pub user: String,
    pub secret: String,
}

impl AuthPlugin for TokenAuth {
    fn authenticate(&self, login: &LoginRequest) -> PluginResult<Option<PrincipalSeed>> {
        if login.method == "token" && login.user == self.user && login.secret == self.secret {
            Ok(Some(PrincipalSeed::new(login.user.clone()).with_roles(["sso"])))
        } else {
            Ok(None)
        }
    }
}

pub fn audit_module(name: &str, audit: Arc<dyn AuditPlugin>) -> StaticModule {
    StaticModule::new(TestModule::new(name, &[Capability::Audit])).with_audit(audit)
}

pub fn extend_module(name: &str, extend: Arc<dyn ExtendPlugin>) -> StaticModule {
    StaticModule::new(TestModule::new(name, &[Capability::Extend])).with_extend(extend)
}

pub fn validator_module(name: &str, validator: Arc<dyn ValidatorPlugin>) -> StaticModule {
    StaticModule::new(TestModule::new(name, &[Capability::Validator])).with_validator(validator)
}
