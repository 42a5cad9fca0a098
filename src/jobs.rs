//! Job tracking
//!
//! State-changing Manager calls (StartUnit, StopUnit, ...) return a job object
//! path straight away. The job's outcome arrives later, out of band, as a
//! `JobRemoved` signal. [`JobRegistry`] maps job paths to waiters and resolves
//! each waiter when its signal shows up.
//!
//! ```text
//!   enqueue(call) ──► call in flight ──► job path ──► register waiter
//!                          │                               ▲
//!                          │ JobRemoved seen early         │ consumed
//!                          ▼                               │
//!                    parked results ───────────────────────┘
//!
//!   JobRemoved(job, result) ──► complete() ──► waiter.send(result)
//! ```
//!
//! The bus delivers a job's `JobRemoved` after the reply that created it, but
//! the signal can still be dispatched before the caller gets around to
//! registering. While an enqueue call is in flight, completions for unknown
//! jobs are parked instead of dropped, and registration picks them up.
//!
//! Every call start and every parked completion takes a sequence number from
//! the same counter. A call only claims parked completions that arrived after
//! it started, so a completion seen before a job was enqueued never resolves it.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_lite::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Every result string the manager reports for a finished job
pub const JOB_RESULTS: [&str; 6] = ["done", "canceled", "timeout", "failed", "dependency", "skipped"];

/// Completions parked while calls are in flight
const MAX_PARKED: usize = 1024;

/// Whether a job result means the job ran successfully.
///
/// The registry forwards results verbatim; this is for callers that only care
/// about success versus anything else.
pub fn is_success(result: &str) -> bool {
    result == "done"
}

/// A job completion event, as carried by `JobRemoved`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    /// Numeric job id
    pub id: u32,
    /// Job object path
    pub job: String,
    /// Unit the job belonged to
    pub unit: String,
    /// One of [`JOB_RESULTS`]
    pub result: String,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<String>,
}

struct Parked {
    arrived: u64,
    job: String,
    result: String,
}

#[derive(Default)]
struct Inner {
    waiters: HashMap<String, Waiter>,
    parked: VecDeque<Parked>,
    /// Start sequence of each call in flight
    in_flight: BTreeSet<u64>,
    seq: u64,
    next_id: u64,
    closed: bool,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Drop parked completions that no call in flight can claim
    fn prune_parked(&mut self) {
        match self.in_flight.first().copied() {
            Some(oldest) => self.parked.retain(|p| p.arrived > oldest),
            None => self.parked.clear(),
        }
    }
}

/// Pending jobs for one client session
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place a call that enqueues a job and register a waiter for it.
    ///
    /// `call` must resolve to the job path the manager assigned. If it fails
    /// the error is returned as-is and nothing is registered.
    pub async fn enqueue<F, E>(&self, call: F) -> Result<PendingJob, E>
    where
        F: Future<Output = Result<String, E>>,
    {
        let in_flight = InFlight::begin(self);
        let job = call.await?;
        Ok(self.register(job, in_flight.started))
    }

    fn register(&self, job: String, started: u64) -> PendingJob {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        if inner.closed {
            log::debug!("Job registry closed, not tracking {}", job);
            drop(tx);
        } else if let Some(pos) = inner
            .parked
            .iter()
            .position(|p| p.arrived > started && p.job == job)
        {
            if let Some(parked) = inner.parked.remove(pos) {
                log::debug!("Job {} completed before registration: {}", job, parked.result);
                let _ = tx.send(parked.result);
            }
        } else if inner
            .waiters
            .insert(job.clone(), Waiter { id, tx })
            .is_some()
        {
            log::warn!("Job {} registered twice, replacing earlier waiter", job);
        }
        drop(inner);

        PendingJob {
            job,
            id,
            rx: Some(rx),
            result: None,
            registry: self.clone(),
        }
    }

    /// Deliver a job's result to its waiter.
    ///
    /// Returns true if a waiter received it. Unknown jobs are dropped, unless
    /// an enqueue call is still in flight, in which case the result is parked
    /// for that call to pick up.
    pub fn complete(&self, job: &str, result: &str) -> bool {
        let mut inner = self.lock();

        if let Some(waiter) = inner.waiters.remove(job) {
            return waiter.tx.send(result.to_string()).is_ok();
        }

        if inner.in_flight.is_empty() {
            log::debug!("Dropping completion for untracked job {} ({})", job, result);
            return false;
        }

        if inner.parked.len() >= MAX_PARKED {
            if let Some(evicted) = inner.parked.pop_front() {
                log::warn!(
                    "Too many parked completions, dropping {} ({})",
                    evicted.job,
                    evicted.result
                );
            }
        }
        let arrived = inner.next_seq();
        inner.parked.push_back(Parked {
            arrived,
            job: job.to_string(),
            result: result.to_string(),
        });
        log::debug!("Parked completion for {} ({}) while calls are in flight", job, result);
        false
    }

    /// Number of jobs still waiting for a result
    pub fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every waiter. Pending and future jobs resolve to [`JobError::Closed`].
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        if !inner.waiters.is_empty() {
            log::debug!("Closing job registry with {} pending jobs", inner.waiters.len());
        }
        inner.waiters.clear();
        inner.parked.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn forget(&self, job: &str, id: u64) {
        let mut inner = self.lock();
        if inner.waiters.get(job).is_some_and(|w| w.id == id) {
            inner.waiters.remove(job);
        }
    }
}

/// Marks an enqueue call as in flight until dropped
struct InFlight<'a> {
    registry: &'a JobRegistry,
    started: u64,
}

impl<'a> InFlight<'a> {
    fn begin(registry: &'a JobRegistry) -> Self {
        let mut inner = registry.lock();
        let started = inner.next_seq();
        inner.in_flight.insert(started);
        Self { registry, started }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.registry.lock();
        inner.in_flight.remove(&self.started);
        inner.prune_parked();
    }
}

/// A registered job whose result has not been read yet.
///
/// Dropping it stops tracking the job.
pub struct PendingJob {
    job: String,
    id: u64,
    /// `None` once the channel has resolved, one way or the other
    rx: Option<oneshot::Receiver<String>>,
    /// Result taken by [`try_result`](Self::try_result)
    result: Option<String>,
    registry: JobRegistry,
}

impl PendingJob {
    /// Job object path
    pub fn path(&self) -> &str {
        &self.job
    }

    /// Wait for the job's result. There is no deadline: this waits until the
    /// manager reports the job or the registry is closed.
    pub async fn wait(mut self) -> Result<String, JobError> {
        if let Some(result) = self.result.take() {
            return Ok(result);
        }
        match self.rx.take() {
            Some(rx) => rx.await.map_err(|_| JobError::Closed(self.job.clone())),
            None => Err(JobError::Closed(self.job.clone())),
        }
    }

    /// Like [`wait`](Self::wait), but give up after `timeout`.
    pub async fn wait_timeout(mut self, timeout: Duration) -> Result<String, JobError> {
        if let Some(result) = self.result.take() {
            return Ok(result);
        }
        let Some(rx) = self.rx.take() else {
            return Err(JobError::Closed(self.job.clone()));
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(JobError::Closed(self.job.clone())),
            Err(_) => Err(JobError::Timeout {
                job: self.job.clone(),
                timeout,
            }),
        }
    }

    /// Result if it has already arrived. The result stays available to
    /// [`wait`](Self::wait).
    pub fn try_result(&mut self) -> Option<String> {
        if self.result.is_none() {
            let rx = self.rx.as_mut()?;
            match rx.try_recv() {
                Ok(result) => {
                    self.rx = None;
                    self.result = Some(result);
                }
                Err(oneshot::error::TryRecvError::Empty) => return None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
        self.result.clone()
    }
}

impl Drop for PendingJob {
    fn drop(&mut self) {
        self.registry.forget(&self.job, self.id);
    }
}

impl std::fmt::Debug for PendingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingJob").field("job", &self.job).finish()
    }
}

/// Feed completion events into `registry` until the stream ends
pub fn spawn_completion_listener<S>(registry: JobRegistry, events: S) -> JoinHandle<()>
where
    S: Stream<Item = JobCompletion> + Send + 'static,
{
    tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            if registry.complete(&event.job, &event.result) {
                log::debug!("Job {} for {} finished: {}", event.id, event.unit, event.result);
            }
        }
        log::debug!("Job completion stream ended");
    })
}

/// A registry together with the task feeding it completions.
///
/// Dropping it shuts the listener down.
pub struct CompletionListener {
    registry: JobRegistry,
    task: JoinHandle<()>,
}

impl CompletionListener {
    pub fn spawn<S>(registry: JobRegistry, events: S) -> Self
    where
        S: Stream<Item = JobCompletion> + Send + 'static,
    {
        let task = spawn_completion_listener(registry.clone(), events);
        Self { registry, task }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Whether the listener task has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the listener task and close the registry
    pub fn shutdown(&self) {
        self.task.abort();
        self.registry.close();
    }
}

impl Drop for CompletionListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Stopped tracking job {0} before it completed")]
    Closed(String),

    #[error("Job {job} did not complete within {timeout:?}")]
    Timeout { job: String, timeout: Duration },
}
