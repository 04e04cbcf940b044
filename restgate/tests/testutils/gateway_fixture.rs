//! Gateway fixture for integration tests
//!
//! Builds a started gateway on an in-memory session store, with a manual
//! clock, inline audit delivery and no signal listener. Plugins are served
//! in-process so no shared libraries are needed.

use restgate::config::GatewayConfig;
use restgate::plugin::{InProcessOpener, LoginRequest, StaticModule};
use restgate::principal::{AccessRole, GatewayRequest, PermissionSet, PrincipalSeed};
use restgate::session::{ManualClock, SessionStore, TreeSessionStore};
use restgate::{Gateway, StaticCredentials};
use std::sync::Arc;

pub const ALICE: &str = "alice";
pub const ALICE_SECRET: &str = "wonderland";

pub struct GatewayFixture {
    pub gateway: Gateway,
    pub clock: Arc<ManualClock>,
    pub store: Arc<TreeSessionStore>,
}

pub struct FixtureBuilder {
    config: GatewayConfig,
    opener: InProcessOpener,
    clock: Arc<ManualClock>,
    store: Option<Arc<TreeSessionStore>>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        let mut config = GatewayConfig::default();
        config.audit.detached = false;
        Self {
            config,
            opener: InProcessOpener::new(),
            clock: Arc::new(ManualClock::default()),
            store: None,
        }
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut GatewayConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_module(mut self, id: &str, module: StaticModule) -> Self {
        self.opener = self.opener.with_module(id, module);
        self
    }

    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<TreeSessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn start(self) -> GatewayFixture {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(TreeSessionStore::in_memory().expect("in-memory store")),
        };
        let credentials = StaticCredentials::new().with_user(
            ALICE_SECRET,
            PrincipalSeed::new(ALICE).with_permissions(
                PermissionSet::new()
                    .grant("#reports", AccessRole::Read)
                    .grant("orders", AccessRole::Write),
            ),
        );

        let gateway = Gateway::builder(self.config)
            .store(store.clone() as Arc<dyn SessionStore>)
            .clock(self.clock.clone())
            .module_opener(Arc::new(self.opener))
            .credential_verifier(Arc::new(credentials))
            .listen_for_signals(false)
            .install_audit_hook(false)
            .start()
            .await
            .expect("Failed to start gateway");

        GatewayFixture {
            gateway,
            clock: self.clock,
            store,
        }
    }
}

impl GatewayFixture {
    /// Gateway with no plugins
    pub async fn new() -> Self {
        FixtureBuilder::new().start().await
    }

    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::new()
    }

    /// Log alice in and return her bearer token
    pub fn login_alice(&self) -> String {
        self.gateway
            .login(&LoginRequest::password(ALICE, ALICE_SECRET))
            .expect("alice should log in")
            .token
    }

    pub fn request(&self, path: &str, token: &str) -> GatewayRequest {
        GatewayRequest::get(path).with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }
}
