//! Bounded worker pool for per-file work.

use bagsmith_common::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tracing::debug;

/// Shared flag asking running work to stop scheduling new jobs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Results of a pool run.
#[derive(Debug)]
pub struct PoolOutcome<R> {
    /// Results of completed jobs, in job order.
    pub results: Vec<R>,
    /// True if cancellation left some jobs unstarted.
    pub cancelled: bool,
}

/// Runs independent jobs on a fixed number of scoped threads.
///
/// Workers pull jobs from a shared queue and send results over one
/// channel; only the calling thread assembles the output.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    cancel: CancelToken,
}

impl WorkerPool {
    pub fn new(workers: usize, cancel: CancelToken) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` over every job.
    ///
    /// The first error stops scheduling; jobs already running finish and
    /// the error is returned.
    pub fn run<J, R, F>(&self, jobs: Vec<J>, f: F) -> Result<PoolOutcome<R>>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> Result<R> + Sync,
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(PoolOutcome {
                results: Vec::new(),
                cancelled: self.cancel.is_cancelled(),
            });
        }

        let queue = Mutex::new(jobs.into_iter().enumerate());
        let abort = AtomicBool::new(false);
        let workers = self.workers.min(total);
        debug!("Running {} job(s) on {} worker(s)", total, workers);

        let (slots, first_error) = thread::scope(|s| {
            let (tx, rx) = mpsc::channel::<(usize, Result<R>)>();
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let abort = &abort;
                let cancel = &self.cancel;
                let f = &f;
                s.spawn(move || loop {
                    if cancel.is_cancelled() || abort.load(Ordering::SeqCst) {
                        break;
                    }
                    let next = match queue.lock() {
                        Ok(mut q) => q.next(),
                        Err(_) => None,
                    };
                    let Some((index, job)) = next else {
                        break;
                    };
                    let result = f(job);
                    if result.is_err() {
                        abort.store(true, Ordering::SeqCst);
                    }
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
            let mut first_error = None;
            for (index, result) in rx {
                match result {
                    Ok(value) => slots[index] = Some(value),
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
            (slots, first_error)
        });

        if let Some(e) = first_error {
            return Err(e);
        }

        let results: Vec<R> = slots.into_iter().flatten().collect();
        let cancelled = results.len() < total && self.cancel.is_cancelled();
        Ok(PoolOutcome { results, cancelled })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(default_workers(), CancelToken::new())
    }
}
