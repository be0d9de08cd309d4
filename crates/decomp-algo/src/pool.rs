//! Fixed-size worker pool for independent sub solves.
//!
//! Every sub of one iteration touches only its own program, so a batch
//! fans out over a `rayon` pool, each task holding one instance mutably,
//! and the outcomes come back over a channel tagged with the instance
//! position. `run_batch` returns only once every task has reported, which
//! is the barrier between two master solves.

use crate::model::ProblemInstance;
use crate::solver::LpError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use thiserror::Error;
use tracing::debug;

/// Lock file marking a run directory as in use.
pub const LOCK_FILE: &str = "decomp.lock";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("run directory is locked by another run ({0}); remove the file if that run is gone")]
    StaleLock(PathBuf),

    #[error("failed to create lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start worker threads: {0}")]
    Threads(String),

    #[error("worker pool returned {received} of {expected} results")]
    Incomplete { expected: usize, received: usize },
}

/// Outcome of one task of a batch, by instance position.
pub type BatchResult = (usize, Result<(), LpError>);

pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
    lock: Option<PathBuf>,
}

impl WorkerPool {
    /// `threads == 0` uses one thread per CPU.
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("decomp-worker-{i}"))
            .build()
            .map_err(|e| PoolError::Threads(e.to_string()))?;
        Ok(Self {
            pool,
            threads,
            lock: None,
        })
    }

    /// Refuse to share `run_dir` with another run. The lock file is
    /// created atomically and released when the pool is dropped.
    pub fn with_run_dir(mut self, run_dir: &Path) -> Result<Self, PoolError> {
        let path = run_dir.join(LOCK_FILE);
        let lock_error = |source: io::Error| PoolError::Lock {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(run_dir).map_err(lock_error)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PoolError::StaleLock(path.clone()))
            }
            Err(e) => return Err(lock_error(e)),
        };
        self.lock = Some(path.clone());
        write!(file, "{}", std::process::id()).map_err(lock_error)?;
        Ok(self)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `task` on every instance and return the outcomes ordered by
    /// position.
    pub fn run_batch<F>(
        &self,
        instances: &mut [ProblemInstance],
        task: F,
    ) -> Result<Vec<BatchResult>, PoolError>
    where
        F: Fn(&mut ProblemInstance) -> Result<(), LpError> + Sync,
    {
        let expected = instances.len();
        let task = &task;
        let (tx, rx) = mpsc::channel();
        self.pool.scope(|scope| {
            for (id, instance) in instances.iter_mut().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = task(instance);
                    // the receiver outlives the scope
                    let _ = tx.send((id, result));
                });
            }
        });
        drop(tx);

        let mut results: Vec<BatchResult> = rx.into_iter().collect();
        if results.len() != expected {
            return Err(PoolError::Incomplete {
                expected,
                received: results.len(),
            });
        }
        results.sort_by_key(|(id, _)| *id);
        debug!(tasks = results.len(), threads = self.threads, "batch finished");
        Ok(results)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(path) = self.lock.take() {
            let _ = fs::remove_file(path);
        }
    }
}
