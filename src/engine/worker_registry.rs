//! Supervisor for per-camera background workers.
//!
//! One slot per `(camera, role)`. The map lock is only held while a slot is
//! inserted or removed; joins happen after the slot is already gone, so a worker
//! stuck in I/O never blocks starts or stops of any camera, including its own.

use futures::future::join_all;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera_config::CameraId;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkerRole {
    Capture,
    Recording,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::Capture => write!(f, "capture"),
            WorkerRole::Recording => write!(f, "recording"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Connecting,
    Active,
    Stopping,
    Failed,
}

impl WorkerStatus {
    /// Set by the worker itself as its last action.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Idle | WorkerStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub status: WorkerStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

/// Status channel shared between one worker and its registry slot.
#[derive(Clone)]
pub struct WorkerStatusCell {
    tx: Arc<watch::Sender<WorkerSnapshot>>,
}

impl WorkerStatusCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkerSnapshot {
            status: WorkerStatus::Connecting,
            retry_count: 0,
            last_error: None,
        });
        WorkerStatusCell { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        self.tx.borrow().clone()
    }

    pub fn status(&self) -> WorkerStatus {
        self.tx.borrow().status
    }

    pub fn set_status(&self, status: WorkerStatus) {
        self.tx.send_if_modified(|snap| {
            if snap.status == status {
                return false;
            }
            snap.status = status;
            true
        });
    }

    pub fn set_retry_count(&self, retry_count: u32) {
        self.tx.send_modify(|snap| snap.retry_count = retry_count);
    }

    pub fn record_error(&self, err: &AppError) {
        let msg = err.to_string();
        self.tx.send_modify(|snap| snap.last_error = Some(msg));
    }

    pub fn fail(&self, err: &AppError) {
        let msg = err.to_string();
        self.tx.send_modify(|snap| {
            snap.last_error = Some(msg);
            snap.status = WorkerStatus::Failed;
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for WorkerStatusCell {
    fn default() -> Self {
        Self::new()
    }
}

pub type WorkerKey = (CameraId, WorkerRole);

struct WorkerSlot {
    cancel: CancellationToken,
    status: WorkerStatusCell,
    handle: JoinHandle<()>,
    started_at: Instant,
}

impl WorkerSlot {
    fn is_live(&self) -> bool {
        !self.handle.is_finished() && !self.status.status().is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// No slot existed.
    NotRunning,
    /// The slot held a worker that had already ended on its own (e.g. Failed); it was reaped.
    AlreadyFinished(WorkerSnapshot),
    /// The worker observed cancellation and exited within the timeout.
    Stopped,
    /// The worker did not exit within the timeout. Its slot is free regardless;
    /// the task finishes in the background.
    Abandoned,
}

impl StopOutcome {
    pub fn was_running(&self) -> bool {
        matches!(self, StopOutcome::Stopped | StopOutcome::Abandoned)
    }
}

pub struct WorkerRegistry {
    slots: Mutex<HashMap<WorkerKey, WorkerSlot>>,
    stop_timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(stop_timeout: Duration) -> Self {
        WorkerRegistry { slots: Mutex::new(HashMap::new()), stop_timeout }
    }

    /// Spawns the worker built by `spawn_worker` unless a live worker already holds the
    /// slot. Returns false (an idempotent rejection) in that case.
    pub async fn start<F, Fut>(
        &self,
        camera_id: CameraId,
        role: WorkerRole,
        spawn_worker: F,
    ) -> bool
    where
        F: FnOnce(CancellationToken, WorkerStatusCell) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = (camera_id, role);
        let mut slots = self.slots.lock().await;
        if let Some(existing) = slots.get(&key) {
            if existing.is_live() {
                warn!(
                    "Camera {} already has an active {} worker (running for {:?}).",
                    camera_id, role, existing.started_at.elapsed()
                );
                return false;
            }
            debug!(
                "Reaping finished {} worker for camera {}: {:?}",
                role,
                camera_id,
                existing.status.snapshot()
            );
            slots.remove(&key);
        }

        let cancel = CancellationToken::new();
        let status = WorkerStatusCell::new();
        let handle = tokio::spawn(spawn_worker(cancel.clone(), status.clone()));
        slots.insert(key, WorkerSlot { cancel, status, handle, started_at: Instant::now() });
        info!("▶️ Started {} worker for camera {}", role, camera_id);
        true
    }

    /// Cancels the worker and waits for it up to the stop timeout.
    pub async fn stop(&self, camera_id: CameraId, role: WorkerRole) -> StopOutcome {
        let slot = { self.slots.lock().await.remove(&(camera_id, role)) };
        let Some(slot) = slot else {
            debug!("No {} worker registered for camera {}", role, camera_id);
            return StopOutcome::NotRunning;
        };
        if !slot.is_live() {
            let snapshot = slot.status.snapshot();
            debug!("{} worker for camera {} had already ended: {:?}", role, camera_id, snapshot);
            return StopOutcome::AlreadyFinished(snapshot);
        }

        let stop_start = Instant::now();
        slot.status.set_status(WorkerStatus::Stopping);
        slot.cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, slot.handle).await {
            Ok(Ok(())) => {
                info!(
                    "⏹️ Stopped {} worker for camera {} in {:?}",
                    role,
                    camera_id,
                    stop_start.elapsed()
                );
                StopOutcome::Stopped
            }
            Ok(Err(join_err)) => {
                error!(
                    "💀 {} worker for camera {} ended abnormally: {}",
                    role, camera_id, join_err
                );
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    "⌛ {} worker for camera {} did not stop within {:?}; \
                     slot released, worker left to exit on its own.",
                    role, camera_id, self.stop_timeout
                );
                StopOutcome::Abandoned
            }
        }
    }

    pub async fn status(&self, camera_id: CameraId, role: WorkerRole) -> Option<WorkerSnapshot> {
        self.slots.lock().await.get(&(camera_id, role)).map(|slot| slot.status.snapshot())
    }

    pub async fn is_active(&self, camera_id: CameraId, role: WorkerRole) -> bool {
        self.slots.lock().await.get(&(camera_id, role)).map(WorkerSlot::is_live).unwrap_or(false)
    }

    /// Receiver that follows the worker's status transitions, if a slot exists.
    pub async fn watch(
        &self,
        camera_id: CameraId,
        role: WorkerRole,
    ) -> Option<watch::Receiver<WorkerSnapshot>> {
        self.slots.lock().await.get(&(camera_id, role)).map(|slot| slot.status.subscribe())
    }

    pub async fn list(&self) -> Vec<(WorkerKey, WorkerSnapshot)> {
        let slots = self.slots.lock().await;
        let mut all: Vec<_> =
            slots.iter().map(|(key, slot)| (*key, slot.status.snapshot())).collect();
        all.sort_by_key(|(key, _)| *key);
        all
    }

    /// Stops every registered worker concurrently.
    pub async fn stop_all(&self) -> usize {
        let keys: Vec<WorkerKey> = { self.slots.lock().await.keys().copied().collect() };
        let stops = keys.iter().map(|(camera_id, role)| self.stop(*camera_id, *role));
        let outcomes = join_all(stops).await;
        outcomes.iter().filter(|o| o.was_running()).count()
    }
}
