//! Fixed-size worker pool with a drain barrier
//!
//! Producers `enqueue` boxed closures and block in `wait_for_tasks` until the
//! queue is empty and no worker is running anything. There are no per-task
//! futures; the barrier is the only completion signal.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    active: usize,
    stop: bool,
    /// Panic messages collected since the last drain
    panics: Vec<String>,
}

impl QueueState {
    #[inline]
    fn drained(&self) -> bool {
        self.tasks.is_empty() && self.active == 0
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when work is queued or shutdown starts
    work_available: Condvar,
    /// Signalled when the queue drains
    drained: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Tasks never run under this lock, so poisoning cannot leave it torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker thread pool
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    num_threads: usize,
}

impl TaskScheduler {
    /// Spawn `num_threads` workers (must be at least 1)
    pub fn new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(Error::invalid("task scheduler needs at least one worker"));
        }

        // If a later spawn fails, Drop joins the workers already started
        let mut pool = Self {
            shared: Arc::new(Shared::default()),
            workers: Vec::with_capacity(num_threads),
            num_threads,
        };
        for index in 0..num_threads {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("verlet-worker-{index}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.push(handle);
        }

        log::info!("Task scheduler started with {num_threads} worker(s)");
        Ok(pool)
    }

    /// Hardware concurrency minus one (the producer thread), at least 1
    pub fn default_thread_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Queue a task and wake one worker
    pub fn enqueue<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.lock();
            if state.stop {
                return Err(Error::SchedulerShutDown);
            }
            state.tasks.push_back(Box::new(task));
        }
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and every worker is idle.
    ///
    /// Reports any task panics since the previous call.
    pub fn wait_for_tasks(&self) -> Result<()> {
        let state = self.shared.lock();
        let mut state = self
            .shared
            .drained
            .wait_while(state, |s| !s.drained())
            .unwrap_or_else(PoisonError::into_inner);

        if state.panics.is_empty() {
            return Ok(());
        }
        let panics = std::mem::take(&mut state.panics);
        Err(Error::TaskPanicked {
            count: panics.len(),
            message: panics.into_iter().next().unwrap_or_default(),
        })
    }

    /// Stop accepting work, let workers finish the queue, join them.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.lock().stop = true;
        self.shared.work_available.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("Worker thread exited abnormally");
            }
        }
        log::info!("Task scheduler stopped");
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("num_threads", &self.num_threads)
            .finish_non_exhaustive()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let state = shared.lock();
            let mut state = shared
                .work_available
                .wait_while(state, |s| s.tasks.is_empty() && !s.stop)
                .unwrap_or_else(PoisonError::into_inner);

            // Queued work is drained before a stop takes effect
            let Some(task) = state.tasks.pop_front() else {
                return;
            };
            state.active += 1;
            task
        };

        let outcome = catch_unwind(AssertUnwindSafe(task));

        let mut state = shared.lock();
        state.active -= 1;
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            log::warn!("Task panicked: {message}");
            state.panics.push(message);
        }
        if state.drained() {
            shared.drained.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
