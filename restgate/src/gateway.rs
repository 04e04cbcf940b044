// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Gateway facade
//!
//! [`GatewayBuilder::start`] wires configuration, storage, the session
//! manager, the plugin scan and the dispatch chains, then starts the
//! background tasks (drain worker, expiry sweep, termination listener).
//! The resulting [`Gateway`] is what a transport layer talks to.

use crate::config::GatewayConfig;
use crate::dispatch::{
    clear_audit_hook, install_audit_hook, AuditChain, AuditReport, AuthChain, DataEventChain,
    ExtendChain, ExtendOutcome, ValidatorChain,
};
use crate::error::{GatewayError, GatewayResult};
use crate::plugin::{
    spawn_signal_listener, CapabilityRegistry, DataEvent, LoginRequest, LoginStatus,
    ModuleOpener, NativeOpener, PluginDescriptor, PluginLoader, PluginShutdown,
    ShutdownController, SkippedPlugin,
};
use crate::principal::{
    AccessRole, GatewayRequest, Principal, PrincipalDirectory, PrincipalSeed, PrincipalSource,
    RequestContext,
};
use crate::session::{
    spawn_sweeper, Clock, IssuedSession, JwtTokenIssuer, PersistenceHealth, SessionManager,
    SessionStats, SessionStore, SystemClock, TokenIssuer, TreeSessionStore,
};
use crate::storage::create_storage_driver;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Checks login credentials when no auth module recognizes them
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, login: &LoginRequest) -> Option<PrincipalSeed>;
}

/// Fixed user table
#[derive(Default)]
pub struct StaticCredentials {
    users: HashMap<String, (String, PrincipalSeed)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, secret: impl Into<String>, seed: PrincipalSeed) -> Self {
        self.users.insert(seed.user.clone(), (secret.into(), seed));
        self
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, login: &LoginRequest) -> Option<PrincipalSeed> {
        self.users
            .get(&login.user)
            .filter(|(secret, _)| *secret == login.secret)
            .map(|(_, seed)| seed.clone())
    }
}

/// Operator view of the gateway
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub persistence: PersistenceHealth,
    pub sessions: SessionStats,
    pub plugins_loaded: usize,
    pub plugins_skipped: usize,
    pub audit_hook: bool,
    pub shutting_down: bool,
}

impl GatewayHealth {
    pub fn is_degraded(&self) -> bool {
        self.persistence.is_degraded()
    }
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn SessionStore>>,
    issuer: Option<Arc<dyn TokenIssuer>>,
    clock: Option<Arc<dyn Clock>>,
    opener: Option<Arc<dyn ModuleOpener>>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    principals: Option<Arc<dyn PrincipalSource>>,
    directory: Option<Arc<PrincipalDirectory>>,
    listen_for_signals: bool,
    install_audit_hook: bool,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            store: None,
            issuer: None,
            clock: None,
            opener: None,
            verifier: None,
            principals: None,
            directory: None,
            listen_for_signals: true,
            install_audit_hook: true,
        }
    }

    /// Use this store instead of opening the configured storage driver
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn module_opener(mut self, opener: Arc<dyn ModuleOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn credential_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Source used to rebind sessions reloaded from the store; defaults to
    /// the principal directory
    pub fn principal_source(mut self, principals: Arc<dyn PrincipalSource>) -> Self {
        self.principals = Some(principals);
        self
    }

    pub fn principal_directory(mut self, directory: Arc<PrincipalDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Whether to stop plugins on Ctrl-C / SIGTERM (default on)
    pub fn listen_for_signals(mut self, listen: bool) -> Self {
        self.listen_for_signals = listen;
        self
    }

    /// Whether to install the process-wide audit hook (default on)
    pub fn install_audit_hook(mut self, install: bool) -> Self {
        self.install_audit_hook = install;
        self
    }

    pub async fn start(self) -> GatewayResult<Gateway> {
        let config = self.config;
        config.validate()?;

        let store: Arc<dyn SessionStore> = match self.store {
            Some(store) => store,
            None => {
                let driver =
                    create_storage_driver(config.storage.storage_type, &config.storage.path)?;
                Arc::new(TreeSessionStore::open(driver)?)
            }
        };
        let issuer = self
            .issuer
            .unwrap_or_else(|| Arc::new(JwtTokenIssuer::from_config(&config.token)) as Arc<dyn TokenIssuer>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(PrincipalDirectory::new()));
        let principals = self
            .principals
            .unwrap_or_else(|| directory.clone() as Arc<dyn PrincipalSource>);

        let sessions = Arc::new(SessionManager::new(
            config.session.clone(),
            store.clone(),
            issuer,
            principals,
            clock.clone(),
        ));
        // Detached; the worker exits once the session manager is dropped.
        let _ = sessions.spawn_drain_worker();

        let opener = self
            .opener
            .unwrap_or_else(|| Arc::new(NativeOpener) as Arc<dyn ModuleOpener>);
        let report = PluginLoader::from_config(&config.plugins, opener)
            .load(config.plugins.directory.as_deref());
        let registry = report.registry;

        let validators = ValidatorChain::new(registry.clone());
        let audit = Arc::new(AuditChain::new(registry.clone(), &config.audit));
        let owns_audit_hook = self.install_audit_hook && registry.has_audit();
        if owns_audit_hook {
            install_audit_hook(audit.clone());
        }

        let controller = ShutdownController::new();
        let plugin_shutdown = Arc::new(PluginShutdown::new(&registry));
        let mut tasks = vec![spawn_sweeper(
            sessions.clone(),
            config.session.sweep_interval(),
            controller.subscribe(),
        )];
        if self.listen_for_signals {
            tasks.push(spawn_signal_listener(
                controller.clone(),
                plugin_shutdown.clone(),
            ));
        }

        log::info!(
            "restgate gateway started: {} plugins loaded, {} skipped, {} storage",
            report.descriptors.len(),
            report.skipped.len(),
            config.storage.storage_type
        );

        Ok(Gateway {
            extend: ExtendChain::new(registry.clone(), validators.clone()),
            auth: AuthChain::new(registry.clone()),
            data_events: DataEventChain::new(registry.clone()),
            validators,
            audit,
            owns_audit_hook,
            registry,
            descriptors: report.descriptors,
            skipped: report.skipped,
            sessions,
            store,
            directory,
            verifier: self.verifier,
            clock,
            plugin_shutdown,
            controller,
            tasks: Mutex::new(tasks),
            config,
        })
    }
}

pub struct Gateway {
    config: GatewayConfig,
    sessions: Arc<SessionManager>,
    store: Arc<dyn SessionStore>,
    directory: Arc<PrincipalDirectory>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    clock: Arc<dyn Clock>,
    registry: Arc<CapabilityRegistry>,
    descriptors: Vec<PluginDescriptor>,
    skipped: Vec<SkippedPlugin>,
    audit: Arc<AuditChain>,
    owns_audit_hook: bool,
    validators: ValidatorChain,
    extend: ExtendChain,
    auth: AuthChain,
    data_events: DataEventChain,
    plugin_shutdown: Arc<PluginShutdown>,
    controller: ShutdownController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Authenticate credentials and open a session
    ///
    /// Auth modules are asked first, then the credential verifier.
    pub fn login(&self, login: &LoginRequest) -> GatewayResult<IssuedSession> {
        let seed = self
            .auth
            .authenticate(login)
            .map(|found| found.seed)
            .or_else(|| self.verifier.as_ref().and_then(|v| v.verify(login)));
        let Some(seed) = seed else {
            self.audit
                .login_audit(&login.method, LoginStatus::Failure, None, &login.user);
            return Err(GatewayError::AuthenticationFailed(login.user.clone()));
        };

        let principal = self.directory.login(&seed, self.clock.now());
        let issued = self.sessions.create_session(principal)?;
        self.audit.login_audit(
            &login.method,
            LoginStatus::Success,
            Some(issued.session.uuid()),
            &seed.user,
        );
        Ok(issued)
    }

    /// Open a session for a principal the transport authenticated itself
    pub fn open_session(&self, principal: Arc<Principal>) -> GatewayResult<IssuedSession> {
        self.directory.remember(principal.clone());
        Ok(self.sessions.create_session(principal)?)
    }

    pub fn logout(&self, token: &str) -> GatewayResult<Uuid> {
        let uuid = self.sessions.logout(token)?;
        let user = self
            .sessions
            .session(&uuid)
            .map(|session| session.principal().user().to_string())
            .unwrap_or_default();
        self.audit
            .login_audit("logout", LoginStatus::Logout, Some(uuid), &user);
        Ok(uuid)
    }

    pub async fn validate(&self, token: &str) -> GatewayResult<Arc<Principal>> {
        Ok(self.sessions.validate(token).await?)
    }

    /// Resolve the bearer token of `request` into a request context
    pub async fn authenticate_request(
        &self,
        request: &GatewayRequest,
    ) -> GatewayResult<RequestContext> {
        let token = request.bearer_token().ok_or(GatewayError::MissingToken)?;
        let (uuid, principal) = self.sessions.resolve(token).await?;
        Ok(RequestContext::new(principal, request.clone()).with_session(uuid))
    }

    pub fn invalidate(&self, uuid: Uuid) -> bool {
        self.sessions.invalidate(uuid)
    }

    pub async fn invalidate_user(&self, user: &str) -> GatewayResult<usize> {
        Ok(self.sessions.invalidate_user(user).await?)
    }

    /// Validator chain, then the principal's own permissions
    pub fn authorize(
        &self,
        principal: &Principal,
        role: AccessRole,
        resource: &str,
        request: &GatewayRequest,
    ) -> bool {
        self.validators.validate(principal, role, resource, request)
    }

    pub fn dispatch_extend(
        &self,
        principal: &Principal,
        request: &GatewayRequest,
    ) -> GatewayResult<ExtendOutcome> {
        Ok(self.extend.dispatch(principal, request)?)
    }

    pub fn receive_audit(&self, ctx: &RequestContext) -> AuditReport {
        self.audit.receive_audit(&ctx.principal, &ctx.request)
    }

    pub fn send_audit(&self, ctx: &RequestContext) -> AuditReport {
        self.audit
            .send_audit(ctx.elapsed(), &ctx.principal, &ctx.request)
    }

    pub fn send_audit_error(&self, ctx: &RequestContext, error: &str) -> AuditReport {
        self.audit
            .send_audit_error(ctx.elapsed(), &ctx.principal, &ctx.request, error)
    }

    pub fn publish_data_event(&self, event: &DataEvent) -> usize {
        self.data_events.publish(event)
    }

    pub fn health(&self) -> GatewayHealth {
        GatewayHealth {
            persistence: self.sessions.health(),
            sessions: self.sessions.stats(),
            plugins_loaded: self.descriptors.len(),
            plugins_skipped: self.skipped.len(),
            audit_hook: self.owns_audit_hook,
            shutting_down: self.controller.is_triggered(),
        }
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub fn skipped(&self) -> &[SkippedPlugin] {
        &self.skipped
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.controller
    }

    /// Block until a termination signal or trigger, then shut down
    pub async fn wait_for_shutdown(&self) {
        self.controller.triggered().await;
        self.shutdown().await;
    }

    /// Stop background tasks and plugins, and flush pending session writes
    pub async fn shutdown(&self) {
        self.controller.trigger();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("Background task ended abnormally: {}", e);
            }
        }
        self.plugin_shutdown.stop_all();

        if !self.sessions.flush().await {
            log::warn!("Session persistence worker unavailable during shutdown");
        }
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to flush session store: {}", e),
            Err(e) => log::warn!("Session store flush task failed: {}", e),
        }

        if self.owns_audit_hook {
            clear_audit_hook();
        }
        log::info!("restgate gateway stopped");
    }
}
