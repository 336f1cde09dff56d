//! core::parallel
//!
//! Process-wide bounded worker pool for engine operations.
//!
//! # Invariants
//!
//! - The cap is set exactly once per process and never changes.
//! - The cap is always positive.
//! - Engine code that fans out work acquires a [`WorkerPermit`] per job.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

static POOL: OnceLock<WorkerPool> = OnceLock::new();

/// Errors from worker pool setup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// A zero or negative cap was requested.
    #[error("maximum workers must be set to a positive number (got {0})")]
    NonPositive(i64),

    /// The process-wide pool was already initialized.
    #[error("worker pool already initialized with {0} workers")]
    AlreadySet(usize),

    /// The pool's semaphore was closed.
    #[error("worker pool closed")]
    Closed,
}

/// A bounded pool of worker slots.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// A held worker slot; released on drop.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// Create a standalone pool with `max` slots.
    pub fn new(max: i64) -> Result<Self, PoolError> {
        let max = validate_max_workers(max)?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        })
    }

    /// Maximum concurrent workers.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<WorkerPermit, PoolError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(WorkerPermit { _permit: permit })
    }
}

/// Default cap: three workers per CPU plus one.
pub fn default_max_workers() -> i64 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus as i64) * 3 + 1
}

/// Check that a requested cap is positive.
pub fn validate_max_workers(max: i64) -> Result<usize, PoolError> {
    if max <= 0 {
        return Err(PoolError::NonPositive(max));
    }
    usize::try_from(max).map_err(|_| PoolError::NonPositive(max))
}

/// Initialize the process-wide pool.
///
/// Requesting the cap that is already installed is a no-op; requesting a
/// different one fails.
pub fn set_max_workers(max: i64) -> Result<&'static WorkerPool, PoolError> {
    let pool = WorkerPool::new(max)?;
    let requested = pool.max;
    let current = POOL.get_or_init(|| {
        tracing::debug!("worker pool initialized with {} workers", requested);
        pool
    });

    if current.max == requested {
        Ok(current)
    } else {
        Err(PoolError::AlreadySet(current.max))
    }
}

/// The process-wide pool, if initialized.
pub fn global() -> Option<&'static WorkerPool> {
    POOL.get()
}
