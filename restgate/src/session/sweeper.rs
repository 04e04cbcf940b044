// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Periodic session expiry sweep

use super::manager::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn the sweep loop; it stops when `shutdown` flips to `true`
pub fn spawn_sweeper(
    manager: Arc<SessionManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    manager.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::debug!("session sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::principal::{Principal, PrincipalDirectory};
    use crate::session::clock::ManualClock;
    use crate::session::store::TreeSessionStore;
    use crate::session::token::JwtTokenIssuer;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = Arc::new(SessionManager::new(
            SessionConfig::default(),
            Arc::new(TreeSessionStore::in_memory().unwrap()),
            Arc::new(JwtTokenIssuer::new(b"sweeper", chrono::Duration::days(1))),
            Arc::new(PrincipalDirectory::new()),
            clock.clone(),
        ));
        manager.create_session(Arc::new(Principal::new("walt"))).unwrap();
        clock.advance(chrono::Duration::days(1));

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(manager.clone(), Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(manager.stats().cached, 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
