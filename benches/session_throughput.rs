/// Benchmark for session throughput
///
/// Measures create / validate / invalidate rates against the in-memory
/// cache with write-behind persistence to a sled store, then how long the
/// drain worker takes to catch up.

use restgate::config::SessionConfig;
use restgate::principal::{Principal, PrincipalDirectory};
use restgate::session::{JwtTokenIssuer, SessionManager, SystemClock, TreeSessionStore};
use restgate::storage::{create_storage_driver, StorageType};
use std::sync::Arc;
use std::time::Instant;
use tempfile::tempdir;

const SESSIONS: usize = 1000;

fn main() {
    println!("=== Session Throughput Benchmark ===\n");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let temp_dir = tempdir().unwrap();
    let driver = create_storage_driver(StorageType::Sled, temp_dir.path().join("bench_db"))
        .expect("Failed to open storage");
    let store = Arc::new(TreeSessionStore::open(driver).expect("Failed to open session store"));

    let directory = Arc::new(PrincipalDirectory::new());
    let principals: Vec<Arc<Principal>> = (0..SESSIONS)
        .map(|i| {
            let principal = Arc::new(Principal::new(format!("user{}", i)));
            directory.remember(principal.clone());
            principal
        })
        .collect();

    let config = SessionConfig {
        queue_capacity: SESSIONS * 4,
        ..SessionConfig::default()
    };
    let sessions = Arc::new(SessionManager::new(
        config,
        store,
        Arc::new(JwtTokenIssuer::new(b"bench-secret", chrono::Duration::hours(1))),
        directory,
        Arc::new(SystemClock),
    ));

    runtime.block_on(async {
        let _ = sessions.spawn_drain_worker();

        println!("📊 Session Creation:");
        let create_start = Instant::now();
        let mut tokens = Vec::with_capacity(SESSIONS);
        for principal in &principals {
            let issued = sessions
                .create_session(principal.clone())
                .expect("Failed to create session");
            tokens.push((issued.session.uuid(), issued.token));
        }
        let create_duration = create_start.elapsed();
        let create_ops_per_sec = SESSIONS as f64 / create_duration.as_secs_f64();
        println!("  Created {} sessions", SESSIONS);
        println!("  Time: {:?}", create_duration);
        println!("  Throughput: {:.0} sessions/sec", create_ops_per_sec);
        println!();

        println!("📊 Validation (cache hits):");
        let validate_start = Instant::now();
        let iterations = SESSIONS * 5;
        for i in 0..iterations {
            let (_, token) = &tokens[i % tokens.len()];
            sessions.validate(token).await.expect("Failed to validate");
        }
        let validate_duration = validate_start.elapsed();
        let validate_ops_per_sec = iterations as f64 / validate_duration.as_secs_f64();
        println!("  Iterations: {}", iterations);
        println!("  Time: {:?}", validate_duration);
        println!("  Throughput: {:.0} validations/sec", validate_ops_per_sec);
        println!();

        println!("📊 Invalidation:");
        let invalidate_start = Instant::now();
        for (uuid, _) in &tokens {
            sessions.invalidate(*uuid);
        }
        let invalidate_duration = invalidate_start.elapsed();
        let invalidate_ops_per_sec = SESSIONS as f64 / invalidate_duration.as_secs_f64();
        println!("  Invalidated {} sessions", SESSIONS);
        println!("  Time: {:?}", invalidate_duration);
        println!("  Throughput: {:.0} invalidations/sec", invalidate_ops_per_sec);
        println!();

        println!("📊 Persistence Drain:");
        let drain_start = Instant::now();
        sessions.flush().await;
        let drain_duration = drain_start.elapsed();
        let health = sessions.health();
        println!("  Completed writes: {}", health.completed_writes);
        println!("  Dropped writes: {}", health.dropped_writes);
        println!("  Time to drain: {:?}", drain_duration);
        println!();

        println!("=== Summary ===");
        println!("  Session creation: {:.0} sessions/sec", create_ops_per_sec);
        println!("  Validation:       {:.0} validations/sec", validate_ops_per_sec);
        println!("  Invalidation:     {:.0} invalidations/sec", invalidate_ops_per_sec);
        println!(
            "  Persistence:      {}",
            if health.is_degraded() { "degraded" } else { "healthy" }
        );
    });
}
