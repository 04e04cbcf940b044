//! Plugin registry and dispatch chain integration tests
//!
//! Modules are served in-process through the same scan and
//! classification path native libraries go through.

#[path = "testutils/mod.rs"]
mod testutils;

use restgate::config::AuditConfig;
use restgate::dispatch::{
    audit_hook_installed, clear_audit_hook, install_audit_hook, report_error, AuditChain,
    AuditMode, ExtendOutcome, ValidatorChain,
};
use restgate::plugin::{
    Capability, CapabilityEntry, InProcessOpener, LoginRequest, PluginLoader, RegistryBuilder,
    StaticModule,
};
use restgate::principal::{AccessRole, GatewayRequest, Principal};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use testutils::gateway_fixture::{GatewayFixture, ALICE};
use testutils::plugins::{
    audit_module, extend_module, FailingAudit, FixedValidator, RecordingAudit,
    ReportsExtend, TestModule, TokenAuth,
};

fn register(builder: &mut RegistryBuilder, id: &str, module: &StaticModule) {
    use restgate::plugin::{ModuleHandle, PluginModule};

    let contract = module.module().unwrap();
    for capability in contract.capabilities() {
        builder.register_entry(id, module.resolve(capability).unwrap());
    }
    builder.register_module(id, contract);
}

#[test]
fn test_registration_order_does_not_matter() {
    let a = StaticModule::new(TestModule::new(
        "a",
        &[Capability::Audit, Capability::Extend],
    ))
    .with_audit(RecordingAudit::new())
    .with_extend(ReportsExtend::new());
    let b = StaticModule::new(TestModule::new(
        "b",
        &[Capability::Audit, Capability::Validator],
    ))
    .with_audit(RecordingAudit::new())
    .with_validator(FixedValidator::allowing());

    let mut forward = RegistryBuilder::new();
    register(&mut forward, "a", &a);
    register(&mut forward, "b", &b);

    let mut backward = RegistryBuilder::new();
    register(&mut backward, "b", &b);
    register(&mut backward, "a", &a);

    assert_eq!(forward.freeze().summary(), backward.freeze().summary());
}

#[test]
fn test_same_prefix_last_registration_wins() {
    let mut builder = RegistryBuilder::new();
    assert_eq!(
        builder.register_extend("reports", "first", ReportsExtend::new()),
        None
    );
    assert_eq!(
        builder.register_extend("/reports/", "second", ReportsExtend::new()),
        Some("first".to_string())
    );
    let registry = builder.freeze();
    assert_eq!(registry.extend("reports").unwrap().0, "second");

    let mut builder = RegistryBuilder::new();
    builder.register_extend("reports", "second", ReportsExtend::new());
    builder.register_extend("reports", "first", ReportsExtend::new());
    assert_eq!(builder.freeze().extend("reports").unwrap().0, "first");
}

#[test]
fn test_validator_short_circuit() {
    let deny = FixedValidator::denying();
    let record = FixedValidator::allowing();

    let mut builder = RegistryBuilder::new();
    builder.register_entry("deny", CapabilityEntry::Validator(deny.clone()));
    builder.register_entry("record", CapabilityEntry::Validator(record.clone()));
    let chain = ValidatorChain::new(builder.freeze());

    let principal = Principal::new("ivan");
    assert!(!chain.validate(
        &principal,
        AccessRole::Read,
        "orders",
        &GatewayRequest::get("orders")
    ));
    assert_eq!(deny.call_count(), 1);
    assert_eq!(record.call_count(), 0);
}

#[test]
fn test_allow_list_filters_by_declared_name() {
    let opener = InProcessOpener::new()
        .with_module("audit_file", audit_module("audit-log", RecordingAudit::new()))
        .with_module("reports_file", extend_module("reports", ReportsExtend::new()));

    let report = PluginLoader::new(Arc::new(opener))
        .with_allow_list(Some(vec!["reports".to_string()]))
        .load(None);

    assert_eq!(report.descriptors.len(), 1);
    assert_eq!(report.descriptors[0].name, "reports");
    assert!(report.registry.extend("reports").is_some());
    assert!(!report.registry.has_audit());
    assert_eq!(report.skipped.len(), 1);
}

#[test]
fn test_declared_but_missing_capability_is_skipped() {
    let module = StaticModule::new(TestModule::new(
        "half",
        &[Capability::Audit, Capability::Extend],
    ))
    .with_audit(RecordingAudit::new());
    let opener = InProcessOpener::new().with_module("half", module);

    let report = PluginLoader::new(Arc::new(opener)).load(None);
    assert_eq!(report.descriptors.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].capability, Some(Capability::Extend));
    assert!(report.registry.has_audit());
    assert!(report.registry.extend("half").is_none());
}

#[tokio::test]
async fn test_reports_prefix_dispatch() {
    let reports = ReportsExtend::new();
    let fixture = GatewayFixture::builder()
        .with_module("reports", extend_module("reports", reports.clone()))
        .start()
        .await;
    let token = fixture.login_alice();

    let ctx = fixture
        .gateway
        .authenticate_request(&fixture.request("reports/q1", &token))
        .await
        .unwrap();
    let outcome = fixture
        .gateway
        .dispatch_extend(&ctx.principal, &ctx.request)
        .unwrap();
    match outcome {
        ExtendOutcome::Handled(response) => {
            assert_eq!(response.status, 200);
            let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
            assert_eq!(body["report"], "q1");
            assert_eq!(body["user"], ALICE);
        }
        other => panic!("expected a handled response, got {:?}", other),
    }
    assert_eq!(reports.calls.load(Ordering::SeqCst), 1);

    let unknown = fixture
        .gateway
        .dispatch_extend(&ctx.principal, &GatewayRequest::get("unknown/x"))
        .unwrap();
    assert_eq!(unknown, ExtendOutcome::NotImplemented);

    let post = fixture
        .gateway
        .dispatch_extend(&ctx.principal, &GatewayRequest::post("reports/q1", "{}"))
        .unwrap();
    assert_eq!(post, ExtendOutcome::Denied);
}

#[tokio::test]
async fn test_extend_without_permission_is_denied() {
    let reports = ReportsExtend::new();
    let fixture = GatewayFixture::builder()
        .with_module("reports", extend_module("reports", reports.clone()))
        .start()
        .await;

    let stranger = Principal::new("mallory");
    let outcome = fixture
        .gateway
        .dispatch_extend(&stranger, &GatewayRequest::get("reports/q1"))
        .unwrap();
    assert_eq!(outcome, ExtendOutcome::Denied);
    assert_eq!(reports.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_audit_does_not_stop_the_next() {
    let recorder = RecordingAudit::new();
    let fixture = GatewayFixture::builder()
        .with_module("a_failing", audit_module("failing", Arc::new(FailingAudit)))
        .with_module("b_recording", audit_module("recording", recorder.clone()))
        .start()
        .await;
    let token = fixture.login_alice();

    let ctx = fixture
        .gateway
        .authenticate_request(&fixture.request("orders/7", &token))
        .await
        .unwrap();
    let report = fixture.gateway.receive_audit(&ctx);

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "a_failing");
    assert!(recorder
        .events()
        .contains(&format!("receive {} orders/7", ALICE)));
}

#[tokio::test]
async fn test_login_and_logout_are_audited() {
    let recorder = RecordingAudit::new();
    let fixture = GatewayFixture::builder()
        .with_module("recording", audit_module("recording", recorder.clone()))
        .start()
        .await;

    let token = fixture.login_alice();
    let _ = fixture
        .gateway
        .login(&LoginRequest::password(ALICE, "nope"));
    fixture.gateway.logout(&token).unwrap();

    let events = recorder.events();
    assert_eq!(
        events,
        vec![
            format!("login password success {}", ALICE),
            format!("login password failure {}", ALICE),
            format!("login logout logout {}", ALICE),
        ]
    );
}

#[tokio::test]
async fn test_excluded_endpoint_is_not_audited() {
    let recorder = RecordingAudit::new();
    let fixture = GatewayFixture::builder()
        .with_module("recording", audit_module("recording", recorder.clone()))
        .start()
        .await;
    let token = fixture.login_alice();

    let ctx = fixture
        .gateway
        .authenticate_request(&fixture.request("health", &token))
        .await
        .unwrap();
    let report = fixture.gateway.send_audit(&ctx);
    assert!(report.excluded);
    assert!(!recorder.events().iter().any(|e| e.starts_with("send")));
}

#[tokio::test]
async fn test_auth_module_is_asked_before_credentials() {
    let auth = Arc::new(TokenAuth {
        user: "sso-user".to_string(),
        secret: "sso-token".to_string(),
    });
    let module = StaticModule::new(TestModule::new("sso", &[Capability::Auth])).with_auth(auth);
    let fixture = GatewayFixture::builder()
        .with_module("sso", module)
        .start()
        .await;

    let login = LoginRequest {
        user: "sso-user".to_string(),
        secret: "sso-token".to_string(),
        method: "token".to_string(),
    };
    let issued = fixture.gateway.login(&login).unwrap();
    assert!(issued.session.principal().has_role("sso"));

    // Password logins still fall through to the credential verifier.
    fixture.login_alice();
}

#[tokio::test]
async fn test_shutdown_stops_every_module_once() {
    let module = TestModule::new("stoppable", &[Capability::Audit]);
    let fixture = GatewayFixture::builder()
        .with_module(
            "stoppable",
            StaticModule::new(module.clone()).with_audit(RecordingAudit::new()),
        )
        .start()
        .await;

    fixture.gateway.shutdown().await;
    fixture.gateway.shutdown().await;
    assert_eq!(module.stops.load(Ordering::SeqCst), 1);
    assert!(fixture.gateway.health().shutting_down);
}

#[test]
#[serial_test::serial]
fn test_report_error_reaches_installed_hook() {
    let recorder = RecordingAudit::new();
    let mut builder = RegistryBuilder::new();
    builder.register_entry("recording", CapabilityEntry::Audit(recorder.clone()));
    let chain = AuditChain::new(builder.freeze(), &AuditConfig::default())
        .with_mode(AuditMode::Inline);

    install_audit_hook(Arc::new(chain));
    assert!(audit_hook_installed());

    let principal = Arc::new(Principal::new("judy"));
    let report = report_error(
        Duration::from_millis(12),
        &principal,
        &GatewayRequest::get("orders/9"),
        "constraint violated",
    )
    .unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(
        recorder.events(),
        vec!["error judy orders/9 constraint violated".to_string()]
    );

    assert!(clear_audit_hook());
    assert!(report_error(
        Duration::from_millis(1),
        &principal,
        &GatewayRequest::get("orders/9"),
        "ignored",
    )
    .is_none());
}
