//! Scheduler jobs
//!
//! A job is one periodic subscription. Blocking jobs run on the caller's
//! task inside [`Connector::subscribe`](crate::Connector::subscribe);
//! background jobs run in their own spawned task. Both are tracked in a
//! [`JobRegistry`] so they can be cancelled in bulk on disconnect.
//!
//! ## Lifecycle
//!
//! `Created → Running → Stopped`, one way. A stopped job never restarts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use phonelink_core::{
    AccelerationMsg, ColorPointerMsg, Frame, GridPointerMsg, GyroMsg, KeyMsg,
};

/// Unique identifier of a job within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Runs on the caller's task; inbound dispatch is deferred to it.
    Blocking,
    /// Runs in its own task.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Stopped,
}

#[derive(Debug)]
struct Job {
    id: JobId,
    mode: JobMode,
    state: Mutex<JobState>,
    started_at: Mutex<Option<Instant>>,
    stopped_at: Mutex<Option<Instant>>,
    cancel_tx: watch::Sender<bool>,
}

/// Shared handle to a job. Cloning does not create a new job.
#[derive(Debug, Clone)]
pub struct JobHandle(Arc<Job>);

impl JobHandle {
    fn new(id: JobId, mode: JobMode) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self(Arc::new(Job {
            id,
            mode,
            state: Mutex::new(JobState::Created),
            started_at: Mutex::new(None),
            stopped_at: Mutex::new(None),
            cancel_tx,
        }))
    }

    pub fn id(&self) -> JobId {
        self.0.id
    }

    pub fn mode(&self) -> JobMode {
        self.0.mode
    }

    pub fn state(&self) -> JobState {
        *self.0.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    /// Time since the job started (or since [`Self::reset_time`]), frozen
    /// once the job is stopped.
    pub fn elapsed(&self) -> Duration {
        let Some(started) = *self.0.started_at.lock().unwrap_or_else(|e| e.into_inner()) else {
            return Duration::ZERO;
        };
        let end = self
            .0
            .stopped_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or_else(Instant::now);
        end.saturating_duration_since(started)
    }

    /// Restart the [`Self::elapsed`] clock.
    pub fn reset_time(&self) {
        *self.0.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// Ask the job to stop. Takes effect before its next tick.
    pub fn stop(&self) {
        *self.0.state.lock().unwrap_or_else(|e| e.into_inner()) = JobState::Stopped;
        self.0
            .stopped_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_or_insert_with(Instant::now);
        self.0.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.cancel_tx.borrow()
    }

    /// Resolves once [`Self::stop`] has been called.
    pub async fn stopped(&self) {
        let mut rx = self.0.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// `Created → Running`. Returns `false` for a job that already ran.
    pub(crate) fn start(&self) -> bool {
        let mut state = self.0.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != JobState::Created {
            return false;
        }
        *state = JobState::Running;
        drop(state);
        self.reset_time();
        true
    }
}

impl PartialEq for JobHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Every job not yet finished.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<Vec<JobHandle>>,
    next_id: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, mode: JobMode) -> JobHandle {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let job = JobHandle::new(id, mode);
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.clone());
        job
    }

    /// Forget a finished job.
    pub fn remove(&self, id: JobId) {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|j| j.id() != id);
    }

    /// Most recently created job still registered.
    pub fn latest(&self) -> Option<JobHandle> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn running(&self) -> Vec<JobHandle> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Stop and forget every job. Returns how many were stopped.
    pub fn cancel_all(&self) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap_or_else(|e| e.into_inner()));
        for job in &jobs {
            job.stop();
        }
        jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot handed to periodic callbacks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataFrame {
    pub key: KeyMsg,
    pub acceleration: AccelerationMsg,
    pub gyro: GyroMsg,
    pub color_pointer: ColorPointerMsg,
    pub grid_pointer: GridPointerMsg,
    /// The job this frame was built for.
    #[serde(skip)]
    pub job: Option<JobHandle>,
}

impl DataFrame {
    pub fn new(frame: Frame, job: Option<JobHandle>) -> Self {
        Self {
            key: frame.key,
            acceleration: frame.acceleration,
            gyro: frame.gyro,
            color_pointer: frame.color_pointer,
            grid_pointer: frame.grid_pointer,
            job,
        }
    }

    /// Stop the job that produced this frame, if any.
    pub fn stop(&self) {
        if let Some(job) = &self.job {
            job.stop();
        }
    }
}
