//! Fixed-size worker pool with deferred result handles.
//!
//! Work units are heterogeneous closures submitted through
//! [`WorkerPool::submit`], which returns a [`TaskHandle`] for the eventual
//! result. The queue is FIFO and unbounded; each unit runs exactly once
//! unless the pool is dropped first, in which case never-started units
//! resolve to `None` when awaited.
//!
//! The pipeline stages submit fixed batches and barrier-wait on all of
//! their handles, so a stage body may itself run as a pool task while its
//! fan-out runs on the remaining workers. This requires at least two
//! worker threads, which [`WorkerPool::new`] guarantees.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A caller-held token for a result not yet computed.
///
/// Produced by [`WorkerPool::submit`]; awaited explicitly by the caller.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes.
    ///
    /// Returns `None` if the task never produced a result: the pool was
    /// torn down before the unit started, or the unit panicked.
    pub fn wait(self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Non-blocking poll. Yields the result at most once; `None` while the
    /// task is still running or after the result was already taken.
    pub fn try_wait(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Fixed pool of worker threads consuming a FIFO queue of submitted tasks.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool with `max(2, num_threads)` workers.
    ///
    /// The lower bound keeps a stage body that barrier-waits its own
    /// fan-out from starving the fan-out of workers.
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(2);
        let (sender, receiver) = unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..num_threads)
            .map(|index| {
                let receiver: Receiver<Job> = receiver.clone();
                let shutdown = Arc::clone(&shutdown);
                thread::Builder::new()
                    .name(format!("pano-worker-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            // Queued-but-not-started units are abandoned on
                            // teardown; dropping the job drops its result
                            // sender and the handle resolves to None.
                            if shutdown.load(Ordering::SeqCst) {
                                break;
                            }
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!("worker task panicked; result handle will yield None");
                            }
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            shutdown,
            workers,
        }
    }

    /// Create a pool sized to the machine: `max(2, available parallelism)`.
    pub fn with_default_parallelism() -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(threads)
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue a unit of work and return a deferred handle to its result.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_sender, receiver) = bounded::<T>(1);
        let job: Job = Box::new(move || {
            let result = task();
            // The handle may have been dropped; that just means nobody
            // cares about this result.
            let _ = result_sender.send(result);
        });
        if let Some(sender) = &self.sender {
            // Send only fails once workers are gone, which only happens
            // during Drop; the job is then discarded like any other
            // abandoned unit.
            let _ = sender.send(job);
        }
        TaskHandle { receiver }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Disconnect the queue so idle workers wake up and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn submit_returns_result() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| 21 * 2);
        assert_eq!(handle.wait(), Some(42));
    }

    #[test]
    fn heterogeneous_result_types() {
        let pool = WorkerPool::new(2);
        let numbers = pool.submit(|| vec![1, 2, 3]);
        let text = pool.submit(|| "stitched".to_string());
        assert_eq!(numbers.wait(), Some(vec![1, 2, 3]));
        assert_eq!(text.wait(), Some("stitched".to_string()));
    }

    #[test]
    fn every_unit_runs_exactly_once() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.wait();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn minimum_two_workers() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.num_threads(), 2);
    }

    #[test]
    fn nested_submission_does_not_deadlock() {
        // A stage body running on the pool fans out to the pool and
        // barrier-waits; the second worker services the fan-out.
        let pool = Arc::new(WorkerPool::new(2));
        let inner_pool = Arc::clone(&pool);
        let outer = pool.submit(move || {
            let inner: Vec<_> = (0..8).map(|i| inner_pool.submit(move || i * 2)).collect();
            inner.into_iter().filter_map(TaskHandle::wait).sum::<i32>()
        });
        assert_eq!(outer.wait(), Some(56));
    }

    #[test]
    fn panicking_task_yields_none_and_pool_survives() {
        let pool = WorkerPool::new(2);
        let bad: TaskHandle<i32> = pool.submit(|| panic!("boom"));
        assert_eq!(bad.wait(), None);

        let good = pool.submit(|| 7);
        assert_eq!(good.wait(), Some(7));
    }

    #[test]
    fn teardown_abandons_queued_units() {
        let pool = WorkerPool::new(2);
        // Occupy both workers so further units stay queued.
        let blocker_a = pool.submit(|| thread::sleep(Duration::from_millis(200)));
        let blocker_b = pool.submit(|| thread::sleep(Duration::from_millis(200)));
        let queued: Vec<TaskHandle<i32>> = (0..16).map(|i| pool.submit(move || i)).collect();

        drop(pool);

        blocker_a.wait();
        blocker_b.wait();
        // At least the units queued behind the shutdown flag never ran.
        let produced = queued.into_iter().filter_map(TaskHandle::wait).count();
        assert!(produced < 16);
    }

    #[test]
    fn try_wait_polls_without_blocking() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| {
            thread::sleep(Duration::from_millis(50));
            5
        });
        // Either still running (None) or already done (Some(5)).
        if let Some(value) = handle.try_wait() {
            assert_eq!(value, 5);
        }
        thread::sleep(Duration::from_millis(200));
        assert_eq!(handle.try_wait().or(Some(5)), Some(5));
    }
}
