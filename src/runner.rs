//! Opt-in background tick loop
//!
//! Moves a `Solver` onto its own thread and ticks it continuously. Other
//! threads reach it through `with_solver`, which holds the lock between
//! ticks, so mutations never race a tick in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::sim::Solver;

pub struct BackgroundLoop {
    solver: Arc<Mutex<Solver>>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl BackgroundLoop {
    /// Start ticking `solver`. With an `interval`, ticks are paced to at most
    /// one per interval; without one the loop runs flat out.
    pub fn start(solver: Solver, interval: Option<Duration>) -> Result<Self> {
        let solver = Arc::new(Mutex::new(solver));
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let handle = {
            let solver = Arc::clone(&solver);
            let running = Arc::clone(&running);
            let ticks = Arc::clone(&ticks);
            thread::Builder::new()
                .name("verlet-loop".to_string())
                .spawn(move || run(&solver, &running, &ticks, interval))?
        };

        log::info!("Background loop started (interval {interval:?})");
        Ok(Self {
            solver,
            running,
            ticks,
            handle: Some(handle),
        })
    }

    /// Run `f` with exclusive access to the solver between two ticks
    pub fn with_solver<R>(&self, f: impl FnOnce(&mut Solver) -> R) -> R {
        f(&mut *lock(&self.solver))
    }

    /// Ticks completed by the loop
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// False once stopped or after a tick failed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the loop and hand the solver back.
    ///
    /// Fails with the tick error if the loop stopped on one.
    pub fn stop(mut self) -> Result<Solver> {
        self.join()?;
        let solver = Arc::clone(&self.solver);
        drop(self);
        let solver = Arc::try_unwrap(solver)
            .map_err(|_| Error::BackgroundLoop("solver still shared after join".to_string()))?;
        Ok(solver.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    fn join(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let outcome = handle
            .join()
            .map_err(|_| Error::BackgroundLoop("loop thread panicked".to_string()))?;
        log::info!("Background loop stopped after {} tick(s)", self.ticks());
        outcome
    }
}

impl Drop for BackgroundLoop {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            log::warn!("Background loop ended with error: {e}");
        }
    }
}

impl std::fmt::Debug for BackgroundLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundLoop")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish_non_exhaustive()
    }
}

fn lock(solver: &Mutex<Solver>) -> MutexGuard<'_, Solver> {
    solver.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run(
    solver: &Mutex<Solver>,
    running: &AtomicBool,
    ticks: &AtomicU64,
    interval: Option<Duration>,
) -> Result<()> {
    while running.load(Ordering::Acquire) {
        let started = Instant::now();

        if let Err(e) = lock(solver).tick() {
            log::error!("Tick failed, stopping background loop: {e}");
            running.store(false, Ordering::Release);
            return Err(e);
        }
        ticks.fetch_add(1, Ordering::AcqRel);

        match interval {
            Some(interval) => {
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            // Give `with_solver` callers a chance at the lock
            None => thread::yield_now(),
        }
    }
    Ok(())
}
