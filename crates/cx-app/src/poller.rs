//! Job status polling.
//!
//! A [`Poller`] owns at most one polling session at a time. A session is a
//! tokio task that fetches a job on a fixed interval until the job reaches a
//! terminal status or the transport fails. Sessions are numbered; anything a
//! superseded or stopped session produces is dropped, so the observer never
//! sees a late response resurrect a session it already stopped.
//!
//! Ticks are serialized: the session awaits each fetch before it waits on the
//! next tick, and missed ticks are skipped rather than replayed. A session
//! therefore never has two fetches in flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cx_client::{ApiClient, ApiError};
use cx_core::{CanonicalResult, Job, JobId, JobStatus, normalize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Source of job snapshots. Implemented by the HTTP client and by test doubles.
#[async_trait]
pub trait JobFetcher: Send + Sync {
    async fn fetch_job(&self, id: JobId) -> Result<Job, ApiError>;
}

#[async_trait]
impl JobFetcher for ApiClient {
    async fn fetch_job(&self, id: JobId) -> Result<Job, ApiError> {
        self.get_job(id).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Non-terminal snapshot (`uploaded` or `processing`).
    Updated(Job),
    /// Carries the normalized result so observers never touch the raw payload.
    Done { job: Job, result: CanonicalResult },
    PipelineFailed { job: Job, message: String },
    TransportFailed { id: JobId, message: String },
}

impl PollEvent {
    pub fn job(&self) -> Option<&Job> {
        match self {
            Self::Updated(job) | Self::Done { job, .. } | Self::PipelineFailed { job, .. } => Some(job),
            Self::TransportFailed { .. } => None,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            Self::Updated(job) | Self::Done { job, .. } | Self::PipelineFailed { job, .. } => job.id,
            Self::TransportFailed { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Updated(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    PipelineError,
    TransportError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running(JobId),
    /// Terminal; the timer is already gone.
    Finished(Outcome),
}

impl PollState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

struct Tagged {
    generation: u64,
    event: PollEvent,
}

struct Inner {
    generation: u64,
    state: PollState,
    last: Option<Job>,
}

struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_generation(&self) -> u64 {
        self.lock().generation
    }

    /// Publishes an event if `generation` is still current. Returns false for a stale session.
    fn publish(&self, generation: u64, event: PollEvent, tx: &UnboundedSender<Tagged>) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }

        if let Some(job) = event.job() {
            inner.last = Some(job.clone());
        }
        inner.state = match &event {
            PollEvent::Updated(job) => PollState::Running(job.id),
            PollEvent::Done { .. } => PollState::Finished(Outcome::Done),
            PollEvent::PipelineFailed { .. } => PollState::Finished(Outcome::PipelineError),
            PollEvent::TransportFailed { .. } => PollState::Finished(Outcome::TransportError),
        };

        tx.send(Tagged { generation, event }).is_ok()
    }
}

/// Receiving half of a [`Poller`]. Only yields events from the current session.
pub struct PollEvents {
    rx: UnboundedReceiver<Tagged>,
    shared: Arc<Shared>,
}

impl PollEvents {
    pub async fn recv(&mut self) -> Option<PollEvent> {
        loop {
            let tagged = self.rx.recv().await?;
            if tagged.generation == self.shared.current_generation() {
                return Some(tagged.event);
            }
            debug!("discarding event from stale session {}", tagged.generation);
        }
    }

    pub fn try_recv(&mut self) -> Option<PollEvent> {
        while let Ok(tagged) = self.rx.try_recv() {
            if tagged.generation == self.shared.current_generation() {
                return Some(tagged.event);
            }
        }
        None
    }
}

pub struct Poller {
    fetcher: Arc<dyn JobFetcher>,
    fetch_timeout: Duration,
    shared: Arc<Shared>,
    tx: UnboundedSender<Tagged>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(fetcher: Arc<dyn JobFetcher>, fetch_timeout: Duration) -> (Self, PollEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                generation: 0,
                state: PollState::Idle,
                last: None,
            }),
        });

        let poller = Self {
            fetcher,
            fetch_timeout,
            shared: shared.clone(),
            tx,
            task: None,
        };
        (poller, PollEvents { rx, shared })
    }

    /// Starts polling `id`, replacing any session already running.
    ///
    /// `id` is trusted; callers validate it through [`JobId`] before getting here.
    pub fn start(&mut self, id: JobId, interval: Duration) {
        self.stop();

        let generation = {
            let mut inner = self.shared.lock();
            inner.state = PollState::Running(id);
            inner.last = None;
            inner.generation
        };

        info!("polling job {} every {:?}", id, interval);
        let session = Session {
            fetcher: self.fetcher.clone(),
            shared: self.shared.clone(),
            tx: self.tx.clone(),
            id,
            interval,
            fetch_timeout: self.fetch_timeout,
            generation,
        };
        self.task = Some(tokio::spawn(session.run()));
    }

    /// Cancels the current session, if any. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if inner.state.is_running() {
            inner.state = PollState::Idle;
        }
        drop(inner);

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn state(&self) -> PollState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn last_snapshot(&self) -> Option<Job> {
        self.shared.lock().last.clone()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Session {
    fetcher: Arc<dyn JobFetcher>,
    shared: Arc<Shared>,
    tx: UnboundedSender<Tagged>,
    id: JobId,
    interval: Duration,
    fetch_timeout: Duration,
    generation: u64,
}

impl Session {
    async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let event = match time::timeout(self.fetch_timeout, self.fetcher.fetch_job(self.id)).await {
                Ok(Ok(job)) => classify(job),
                Ok(Err(e)) => {
                    warn!("fetching job {} failed: {}", self.id, e);
                    PollEvent::TransportFailed {
                        id: self.id,
                        message: e.to_string(),
                    }
                }
                Err(_) => {
                    warn!("fetching job {} timed out", self.id);
                    PollEvent::TransportFailed {
                        id: self.id,
                        message: format!("request timed out after {}s", self.fetch_timeout.as_secs_f32()),
                    }
                }
            };

            let terminal = event.is_terminal();
            if !self.shared.publish(self.generation, event, &self.tx) {
                debug!("session {} for job {} superseded", self.generation, self.id);
                return;
            }
            if terminal {
                debug!("session {} for job {} finished", self.generation, self.id);
                return;
            }
        }
    }
}

fn classify(job: Job) -> PollEvent {
    match job.status {
        JobStatus::Uploaded | JobStatus::Processing => PollEvent::Updated(job),
        JobStatus::Done => {
            let result = job.result_payload().map(|p| normalize(&p)).unwrap_or_default();
            PollEvent::Done { job, result }
        }
        JobStatus::Error => {
            let message = job.failure_message();
            PollEvent::PipelineFailed { job, message }
        }
    }
}
