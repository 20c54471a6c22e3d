//! Bounded worker pool for independent units of work
//!
//! [`Threads::gather`] runs every task to completion on a fixed-size pool and
//! returns what succeeded alongside what failed. A failing task never cancels
//! its siblings, and a panicking one is caught and reported by its position.

use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

/// Unit of work; `Ok(None)` means "nothing to report"
pub type Task<T, E> = Box<dyn FnOnce() -> Result<Option<T>, E> + Send>;

/// A task that panicked instead of returning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panicked {
    /// Position of the task in the submitted batch
    pub index: usize,
    /// Panic payload, when it was a string
    pub message: String,
}

/// Results of a gather call, in task submission order
#[derive(Debug)]
pub struct Gathered<T, E> {
    /// Values returned by successful tasks
    pub results: Vec<T>,
    /// Errors returned by failed tasks
    pub errors: Vec<E>,
    /// Tasks that panicked
    pub panicked: Vec<Panicked>,
}

impl<T, E> Gathered<T, E> {
    /// Check if no task failed or panicked
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.panicked.is_empty()
    }
}

impl<T, E> Default for Gathered<T, E> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
            panicked: Vec::new(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}

/// Fixed-size worker pool
#[derive(Debug, Clone, Copy)]
pub struct Threads {
    num_threads: usize,
}

impl Threads {
    /// Pool with `num_threads` workers (at least one)
    #[inline]
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    /// Two workers per available core
    #[must_use]
    pub fn default_num_threads() -> usize {
        std::thread::available_parallelism().map_or(4, |n| n.get() * 2)
    }

    /// Configured worker count
    #[inline]
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run all `tasks` and collect their outcomes
    ///
    /// Progress is logged roughly every tenth of the batch.
    pub fn gather<T, E>(&self, name: &str, tasks: Vec<Task<T, E>>) -> Gathered<T, E>
    where
        T: Send,
        E: Send + std::fmt::Display,
    {
        let total = tasks.len();
        if total == 0 {
            info!(batch = name, "nothing to run");
            return Gathered::default();
        }
        info!(batch = name, total, workers = self.num_threads, "starting batch");

        let done = AtomicUsize::new(0);
        let step = (total / 10).max(1);
        let run = |task: Task<T, E>| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| panic_message(payload.as_ref()));
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % step == 0 || finished == total {
                info!(batch = name, finished, total, "batch progress");
            }
            outcome
        };

        let outcomes: Vec<Result<Result<Option<T>, E>, String>> = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("regroup-worker-{i}"))
            .build()
        {
            Ok(pool) => pool.install(|| tasks.into_par_iter().map(run).collect()),
            Err(e) => {
                warn!(batch = name, error = %e, "worker pool unavailable, running inline");
                tasks.into_iter().map(run).collect()
            }
        };

        let mut gathered = Gathered::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(Ok(Some(value))) => gathered.results.push(value),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(batch = name, error = %e, "task failed");
                    gathered.errors.push(e);
                }
                Err(message) => {
                    error!(batch = name, index, %message, "task panicked");
                    gathered.panicked.push(Panicked { index, message });
                }
            }
        }
        info!(
            batch = name,
            succeeded = gathered.results.len(),
            failed = gathered.errors.len(),
            panicked = gathered.panicked.len(),
            "batch finished"
        );
        gathered
    }
}

impl Default for Threads {
    fn default() -> Self {
        Self::new(Self::default_num_threads())
    }
}
