// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Write-behind session persistence
//!
//! The request path enqueues [`PersistOp`]s with a non-blocking `try_send`
//! onto a bounded channel; a single supervised [`DrainWorker`] applies them
//! to the [`SessionStore`]. Failed writes are kept and retried on the idle
//! tick, in per-session order.
//!
//! Two fail-safe flags live in [`PersistenceState`] instead of globals:
//! - *persistence disabled*: set when the queue saturates; new `Put`s are
//!   dropped (invalidations still try) until the worker drains the backlog
//! - *store degraded*: set while the store is failing writes

use super::models::SessionRecord;
use super::store::SessionStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Attempts before a failing write is abandoned
const MAX_WRITE_ATTEMPTS: u32 = 5;
const RESTART_BACKOFF: Duration = Duration::from_millis(250);

/// One queued storage mutation
#[derive(Debug)]
pub enum PersistOp {
    Put(SessionRecord),
    Delete(Uuid),
    /// Soft-invalidate: read, flag, write back
    MarkInvalidated(Uuid),
    /// Completes once every earlier op has been attempted
    Barrier(oneshot::Sender<()>),
}

impl PersistOp {
    fn uuid(&self) -> Option<Uuid> {
        match self {
            PersistOp::Put(record) => Some(record.uuid),
            PersistOp::Delete(uuid) | PersistOp::MarkInvalidated(uuid) => Some(*uuid),
            PersistOp::Barrier(_) => None,
        }
    }

    fn is_invalidation(&self) -> bool {
        matches!(self, PersistOp::Delete(_) | PersistOp::MarkInvalidated(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            PersistOp::Put(_) => "put",
            PersistOp::Delete(_) => "delete",
            PersistOp::MarkInvalidated(_) => "mark_invalidated",
            PersistOp::Barrier(_) => "barrier",
        }
    }
}

#[derive(Debug)]
struct PendingWrite {
    op: PersistOp,
    attempts: u32,
}

/// Shared state between the queue handle and the worker
#[derive(Default)]
pub struct PersistenceState {
    disabled: AtomicBool,
    store_degraded: AtomicBool,
    depth: AtomicUsize,
    dropped: AtomicU64,
    written: AtomicU64,
    worker_restarts: AtomicU64,
    last_error: Mutex<Option<String>>,
    retry: Mutex<VecDeque<PendingWrite>>,
}

impl PersistenceState {
    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }
}

/// Operator-facing view of the persistence pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceHealth {
    pub persistence_enabled: bool,
    pub store_degraded: bool,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub pending_retries: usize,
    pub dropped_writes: u64,
    pub completed_writes: u64,
    pub worker_restarts: u64,
    pub last_error: Option<String>,
}

impl PersistenceHealth {
    pub fn is_degraded(&self) -> bool {
        !self.persistence_enabled || self.store_degraded
    }
}

/// Producer side of the persistence queue
#[derive(Clone)]
pub struct PersistenceQueue {
    tx: mpsc::Sender<PersistOp>,
    state: Arc<PersistenceState>,
    capacity: usize,
}

/// Consumer side, handed to [`DrainWorker::new`]
pub struct PersistenceReceiver {
    rx: mpsc::Receiver<PersistOp>,
    state: Arc<PersistenceState>,
}

impl PersistenceQueue {
    pub fn channel(capacity: usize) -> (PersistenceQueue, PersistenceReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let state = Arc::new(PersistenceState::default());
        (
            PersistenceQueue {
                tx,
                state: state.clone(),
                capacity,
            },
            PersistenceReceiver { rx, state },
        )
    }

    /// Non-blocking enqueue; returns whether the op was accepted
    pub fn enqueue(&self, op: PersistOp) -> bool {
        let state = &self.state;
        if state.disabled.load(Ordering::Acquire) && !op.is_invalidation() {
            state.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("persistence disabled, dropping {} op", op.kind());
            return false;
        }

        state.depth.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(op) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(op)) => {
                state.depth.fetch_sub(1, Ordering::AcqRel);
                state.dropped.fetch_add(1, Ordering::Relaxed);
                if !state.disabled.swap(true, Ordering::AcqRel) {
                    log::error!(
                        "session persistence disabled: queue saturated at capacity {} (dropped {} op)",
                        self.capacity,
                        op.kind()
                    );
                    state.record_error(format!("queue saturated at capacity {}", self.capacity));
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(op)) => {
                state.depth.fetch_sub(1, Ordering::AcqRel);
                state.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("persistence worker gone, dropping {} op", op.kind());
                state.record_error("persistence queue closed".to_string());
                false
            }
        }
    }

    /// Wait until every op enqueued before this call has been attempted
    ///
    /// Returns `false` when the worker is gone.
    pub async fn flush(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        self.state.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(PersistOp::Barrier(done_tx)).await.is_err() {
            self.state.depth.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        done_rx.await.is_ok()
    }

    pub fn is_enabled(&self) -> bool {
        !self.state.disabled.load(Ordering::Acquire)
    }

    pub fn health(&self) -> PersistenceHealth {
        let state = &self.state;
        PersistenceHealth {
            persistence_enabled: !state.disabled.load(Ordering::Acquire),
            store_degraded: state.store_degraded.load(Ordering::Acquire),
            queue_depth: state.depth.load(Ordering::Acquire),
            queue_capacity: self.capacity,
            pending_retries: state.retry.lock().len(),
            dropped_writes: state.dropped.load(Ordering::Relaxed),
            completed_writes: state.written.load(Ordering::Relaxed),
            worker_restarts: state.worker_restarts.load(Ordering::Relaxed),
            last_error: state.last_error.lock().clone(),
        }
    }
}

/// Single background consumer of the persistence queue
pub struct DrainWorker {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PersistOp>>>,
    state: Arc<PersistenceState>,
    store: Arc<dyn SessionStore>,
    tick: Duration,
}

impl DrainWorker {
    pub fn new(receiver: PersistenceReceiver, store: Arc<dyn SessionStore>, tick: Duration) -> Self {
        Self {
            rx: Arc::new(tokio::sync::Mutex::new(receiver.rx)),
            state: receiver.state,
            store,
            tick,
        }
    }

    /// Spawn the worker under a supervisor that restarts it after a panic
    ///
    /// The task ends once every [`PersistenceQueue`] handle is dropped and
    /// the backlog is drained.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let run = tokio::spawn(drain(
                    self.rx.clone(),
                    self.state.clone(),
                    self.store.clone(),
                    self.tick,
                ));
                match run.await {
                    Ok(()) => break,
                    Err(e) if e.is_panic() => {
                        self.state.worker_restarts.fetch_add(1, Ordering::Relaxed);
                        self.state
                            .record_error("persistence worker panicked".to_string());
                        log::error!("session persistence worker panicked; restarting");
                        tokio::time::sleep(RESTART_BACKOFF).await;
                    }
                    Err(_) => break,
                }
            }
            log::debug!("session persistence worker stopped");
        })
    }
}

async fn drain(
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PersistOp>>>,
    state: Arc<PersistenceState>,
    store: Arc<dyn SessionStore>,
    tick: Duration,
) {
    let mut rx = rx.lock().await;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(op) => {
                    if state.depth.fetch_sub(1, Ordering::AcqRel) == 1
                        && state.disabled.swap(false, Ordering::AcqRel)
                    {
                        log::warn!("session persistence re-enabled: backlog drained");
                    }
                    handle(op, &state, &store).await;
                }
                None => {
                    retry_pending(&state, &store).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                retry_pending(&state, &store).await;
            }
        }
    }
}

async fn handle(op: PersistOp, state: &Arc<PersistenceState>, store: &Arc<dyn SessionStore>) {
    if let PersistOp::Barrier(done) = op {
        let _ = done.send(());
        return;
    }

    // Keep per-session order behind an earlier failed write.
    let blocked = op.uuid().is_some_and(|uuid| {
        state
            .retry
            .lock()
            .iter()
            .any(|pending| pending.op.uuid() == Some(uuid))
    });
    if blocked {
        state.retry.lock().push_back(PendingWrite { op, attempts: 0 });
        return;
    }

    if let Some(failed) = attempt(PendingWrite { op, attempts: 0 }, state, store).await {
        state.retry.lock().push_back(failed);
    }
}

async fn retry_pending(state: &Arc<PersistenceState>, store: &Arc<dyn SessionStore>) {
    let pending: Vec<PendingWrite> = state.retry.lock().drain(..).collect();
    if pending.is_empty() {
        return;
    }
    log::debug!("retrying {} pending session writes", pending.len());

    let mut blocked: HashSet<Uuid> = HashSet::new();
    let mut keep = VecDeque::new();
    for write in pending {
        let uuid = write.op.uuid();
        if uuid.is_some_and(|u| blocked.contains(&u)) {
            keep.push_back(write);
            continue;
        }
        if let Some(failed) = attempt(write, state, store).await {
            if let Some(u) = uuid {
                blocked.insert(u);
            }
            keep.push_back(failed);
        }
    }

    // Writes enqueued behind these while we were retrying stay after them.
    let mut retry = state.retry.lock();
    while let Some(write) = keep.pop_back() {
        retry.push_front(write);
    }
}

/// Apply one write on the blocking pool; returns it back on failure
async fn attempt(
    mut write: PendingWrite,
    state: &Arc<PersistenceState>,
    store: &Arc<dyn SessionStore>,
) -> Option<PendingWrite> {
    write.attempts += 1;
    let store = store.clone();
    let (op, result) = match tokio::task::spawn_blocking(move || {
        let result = apply(store.as_ref(), &write.op);
        (write, result)
    })
    .await
    {
        Ok((w, result)) => (w, result),
        Err(e) => {
            // A panicking store loses the op along with the closure.
            state.dropped.fetch_add(1, Ordering::Relaxed);
            state.record_error(format!("session store panicked: {}", e));
            log::error!("session store panicked while writing: {}", e);
            mark_degraded(state, true);
            return None;
        }
    };

    match result {
        Ok(()) => {
            state.written.fetch_add(1, Ordering::Relaxed);
            mark_degraded(state, false);
            None
        }
        Err(message) => {
            state.record_error(message.clone());
            mark_degraded(state, true);
            if op.attempts >= MAX_WRITE_ATTEMPTS {
                state.dropped.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "abandoning session {} op for {:?} after {} attempts: {}",
                    op.op.kind(),
                    op.op.uuid(),
                    op.attempts,
                    message
                );
                None
            } else {
                log::warn!(
                    "session {} op for {:?} failed (attempt {}): {}",
                    op.op.kind(),
                    op.op.uuid(),
                    op.attempts,
                    message
                );
                Some(op)
            }
        }
    }
}

fn apply(store: &dyn SessionStore, op: &PersistOp) -> Result<(), String> {
    match op {
        PersistOp::Put(record) => store.put(record).map_err(|e| e.to_string()),
        PersistOp::Delete(uuid) => store.delete(uuid).map_err(|e| e.to_string()),
        PersistOp::MarkInvalidated(uuid) => match store.get(uuid).map_err(|e| e.to_string())? {
            Some(mut record) => {
                record.invalidated = true;
                store.put(&record).map_err(|e| e.to_string())
            }
            // Nothing was ever persisted for this session.
            None => Ok(()),
        },
        PersistOp::Barrier(_) => Ok(()),
    }
}

fn mark_degraded(state: &PersistenceState, degraded: bool) {
    let was = state.store_degraded.swap(degraded, Ordering::AcqRel);
    if degraded && !was {
        log::warn!("session store degraded: writes are being retried");
    } else if !degraded && was {
        log::info!("session store recovered");
    }
}
