//! Worker Pool
//!
//! Runs store operations off the caller's thread.
//!
//! ## Responsibilities
//! - Fixed set of named worker threads fed by a crossbeam channel
//! - One-shot completion handle ([`Pending`]) per submitted job
//! - Graceful shutdown: queued jobs drain, then threads exit
//!
//! A job that panics is contained: its handle resolves to
//! `WorkerUnavailable` and the thread keeps serving the queue.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{FileKvError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    /// Job queue; `None` once shut down
    sender: Option<Sender<Job>>,

    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(FileKvError::Config(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("filekv-worker-{}", id))
                .spawn(move || Self::run(id, receiver))?;
            workers.push(handle);
        }

        tracing::debug!(threads, "Worker pool started");

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    fn run(id: usize, receiver: Receiver<Job>) {
        for job in receiver.iter() {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!(worker = id, "Job panicked");
            }
        }
        tracing::trace!(worker = id, "Worker exiting");
    }

    /// Queue `f` and return a handle to its result
    pub fn submit<T, F>(&self, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        let job: Job = Box::new(move || {
            // Receiver may be gone if the caller dropped the handle
            let _ = tx.send(f());
        });

        let queued = match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if queued {
            Pending { rx }
        } else {
            Pending::ready(Err(FileKvError::WorkerUnavailable))
        }
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs, finish the queued ones, and join all workers
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Worker thread terminated abnormally");
            }
        }
        tracing::debug!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Completion handle for an offloaded operation
///
/// Dropping the handle does not stop the job.
#[must_use = "a pending operation reports its outcome only through wait()"]
pub struct Pending<T> {
    rx: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// A handle that is already complete
    pub fn ready(result: Result<T>) -> Self {
        let (tx, rx) = channel::bounded(1);
        // Capacity 1 and a live receiver: cannot fail
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the operation finishes
    pub fn wait(self) -> Result<T> {
        self.rx
            .recv()
            .unwrap_or(Err(FileKvError::WorkerUnavailable))
    }

    /// Block for at most `timeout`; `None` if still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(FileKvError::WorkerUnavailable)),
        }
    }

    /// Poll without blocking; `None` if still running
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(FileKvError::WorkerUnavailable)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_zero_threads_rejected() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn test_submit_returns_result() {
        let pool = WorkerPool::new(2).unwrap();
        let pending = pool.submit(|| Ok(21 * 2));

        assert_eq!(pending.wait().unwrap(), 42);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_errors_propagate() {
        let pool = WorkerPool::new(1).unwrap();
        let pending = pool.submit::<(), _>(|| Err(FileKvError::Cancelled));

        assert!(pending.wait().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        for handle in handles {
            handle.wait().unwrap();
        }
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut pool = WorkerPool::new(1).unwrap();
        pool.shutdown();

        let err = pool.submit(|| Ok(())).wait().unwrap_err();
        assert!(matches!(err, FileKvError::WorkerUnavailable));
    }

    #[test]
    fn test_panicking_job_is_contained() {
        let pool = WorkerPool::new(1).unwrap();

        let crashed = pool.submit::<(), _>(|| panic!("boom"));
        assert!(matches!(
            crashed.wait(),
            Err(FileKvError::WorkerUnavailable)
        ));

        // Same single thread still serves work
        assert_eq!(pool.submit(|| Ok("alive")).wait().unwrap(), "alive");
    }

    #[test]
    fn test_try_wait_and_timeout() {
        let pool = WorkerPool::new(1).unwrap();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);

        let pending = pool.submit(move || {
            let _ = gate_rx.recv();
            Ok(5)
        });
        assert!(pending.try_wait().is_none());
        assert!(pending.wait_timeout(Duration::from_millis(10)).is_none());

        gate_tx.send(()).unwrap();
        let result = pending.wait_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), 5);
    }

    #[test]
    fn test_ready_handle() {
        assert_eq!(Pending::ready(Ok(3)).wait().unwrap(), 3);
    }
}
