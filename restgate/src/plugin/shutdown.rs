// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plugin shutdown
//!
//! [`PluginShutdown::stop_all`] calls `stop()` on every loaded module behind
//! a one-shot gate. [`spawn_signal_listener`] runs it on Ctrl-C, SIGTERM or
//! a cooperative [`ShutdownController::trigger`], whichever comes first.

use super::api::PluginModule;
use super::error::panic_message;
use super::registry::{CapabilityRegistry, PluginId};
use once_cell::sync::OnceCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Stops every module exactly once
pub struct PluginShutdown {
    modules: Vec<(PluginId, Arc<dyn PluginModule>)>,
    stopped: OnceCell<usize>,
}

impl PluginShutdown {
    pub fn new(registry: &CapabilityRegistry) -> Self {
        Self {
            modules: registry.modules().to_vec(),
            stopped: OnceCell::new(),
        }
    }

    /// Run `stop()` on every module; returns `false` if it already ran
    ///
    /// Concurrent callers block until the first one finishes.
    pub fn stop_all(&self) -> bool {
        let mut ran = false;
        self.stopped.get_or_init(|| {
            ran = true;
            let mut clean = 0;
            for (id, module) in &self.modules {
                match catch_unwind(AssertUnwindSafe(|| module.stop())) {
                    Ok(()) => {
                        clean += 1;
                        log::debug!("Stopped plugin {}", id);
                    }
                    Err(payload) => log::error!(
                        "Plugin {} panicked during stop: {}",
                        id,
                        panic_message(payload.as_ref())
                    ),
                }
            }
            log::info!("Stopped {} of {} plugins", clean, self.modules.len());
            clean
        });
        ran
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get().is_some()
    }
}

/// Cooperative shutdown signal shared by background tasks
#[derive(Clone)]
pub struct ShutdownController {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            log::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once `trigger` has been called
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so this only ends on a trigger.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Wait for a termination signal or a trigger, then stop every plugin
pub fn spawn_signal_listener(
    controller: ShutdownController,
    plugins: Arc<PluginShutdown>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = termination_signal() => {
                log::warn!("Termination signal received; shutting down");
                controller.trigger();
            }
            _ = controller.triggered() => {}
        }
        plugins.stop_all();
    })
}

async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
