//! Sequenced task execution with explicit drain barriers.
//!
//! A [`SequencedTaskExecutor`] owns a fixed set of worker threads. Tasks carry
//! a component id (the field id for inversion and push work); all tasks of one
//! component run on the same worker, in submission order, so per-field state
//! is never touched by two tasks at once.
//!
//! Completion is tracked by [`TaskBarrier`]s supplied by the caller rather
//! than by the executor, so two users sharing one executor drain
//! independently:
//!
//! ```text
//! barrier.enter()  -> pending += 1
//! task finishes    -> pending -= 1, first failure recorded
//! barrier.wait()   -> blocks until pending == 0, returns the failure
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use log::{error, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::{MemIndexError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct BarrierState {
    pending: usize,
    failure: Option<MemIndexError>,
}

#[derive(Debug, Default)]
struct BarrierInner {
    state: Mutex<BarrierState>,
    idle: Condvar,
}

/// Counts outstanding tasks and remembers the first failure among them.
#[derive(Debug, Clone, Default)]
pub struct TaskBarrier {
    inner: Arc<BarrierInner>,
}

impl TaskBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one outstanding task. The task completes when the returned
    /// token is dropped.
    pub fn enter(&self) -> PendingTask {
        self.inner.state.lock().pending += 1;
        PendingTask {
            barrier: self.clone(),
        }
    }

    /// Number of tasks registered and not yet completed.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending
    }

    /// Record a failure. Only the first failure since the last `wait` is kept.
    pub fn fail(&self, err: MemIndexError) {
        let mut state = self.inner.state.lock();
        if state.failure.is_none() {
            state.failure = Some(err);
        } else {
            warn!("Dropping additional task failure: {err}");
        }
    }

    /// Block until every registered task has completed, then return and clear
    /// the first recorded failure.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        while state.pending > 0 {
            self.inner.idle.wait(&mut state);
        }
        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Token for one outstanding task registered on a [`TaskBarrier`].
#[derive(Debug)]
pub struct PendingTask {
    barrier: TaskBarrier,
}

impl PendingTask {
    pub fn fail(&self, err: MemIndexError) {
        self.barrier.fail(err);
    }
}

impl Drop for PendingTask {
    fn drop(&mut self) {
        let mut state = self.barrier.inner.state.lock();
        state.pending -= 1;
        if state.pending == 0 {
            self.barrier.inner.idle.notify_all();
        }
    }
}

/// A pool of single-threaded executors addressed by component id.
pub struct SequencedTaskExecutor {
    name: String,
    senders: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for SequencedTaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencedTaskExecutor")
            .field("name", &self.name)
            .field("num_executors", &self.senders.len())
            .finish()
    }
}

impl SequencedTaskExecutor {
    /// Spawn `num_executors` worker threads named `{name}-{n}`.
    pub fn new(name: impl Into<String>, num_executors: usize) -> Result<Self> {
        let name = name.into();
        if num_executors == 0 {
            return Err(MemIndexError::invalid_config(format!(
                "executor '{name}' needs at least one thread"
            )));
        }

        let mut senders = Vec::with_capacity(num_executors);
        let mut workers = Vec::with_capacity(num_executors);
        for id in 0..num_executors {
            let (sender, receiver) = unbounded::<Job>();
            let worker = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || {
                    for job in receiver {
                        job();
                    }
                })?;
            senders.push(sender);
            workers.push(worker);
        }

        Ok(Self {
            name,
            senders,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_executors(&self) -> usize {
        self.senders.len()
    }

    /// The worker that runs tasks for `component`.
    pub fn executor_id(&self, component: u32) -> usize {
        component as usize % self.senders.len()
    }

    /// Queue `task` behind all earlier tasks of `component`.
    ///
    /// The task is registered on `barrier` before it is queued. An `Err`
    /// returned by the task, or a panic inside it, is recorded on the barrier.
    pub fn execute<F>(&self, component: u32, barrier: &TaskBarrier, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let pending = barrier.enter();
        let executor_name = self.name.clone();
        let job: Job = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => pending.fail(err),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        "Task for component {component} on '{executor_name}' panicked: {message}"
                    );
                    pending.fail(MemIndexError::executor(format!(
                        "task for component {component} panicked: {message}"
                    )));
                }
            }
        });

        let executor_id = self.executor_id(component);
        if let Err(rejected) = self.senders[executor_id].send(job) {
            barrier.fail(MemIndexError::executor(format!(
                "executor '{}-{}' is shut down",
                self.name, executor_id
            )));
            drop(rejected);
        }
    }
}

impl Drop for SequencedTaskExecutor {
    fn drop(&mut self) {
        // Closing the queues lets every worker finish its backlog and exit.
        self.senders.clear();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker of executor '{}' terminated abnormally", self.name);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
