//! Background thread pool for clip fetch/prepare jobs.
//!
//! Work-stealing deques (crossbeam): jobs enter a global injector, idle
//! threads steal from each other. There is no cancellation: a job for a
//! superseded track still runs to completion so its result lands in the
//! cache for a later replay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{debug, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes boxed jobs off the coordinator thread.
///
/// Lets the load pipeline schedule fetches without knowing the concrete
/// pool (tests use a deferred queue instead of threads).
pub trait WorkerPool: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Blanket impl: Arc<T> is a pool if T is
impl<T: WorkerPool + ?Sized> WorkerPool for Arc<T> {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        (**self).execute(job)
    }
}

/// Fixed-size work-stealing pool.
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` loader threads (at least one).
    ///
    /// Recommended: a small number; fetches are I/O bound and playlists
    /// are navigated one track at a time.
    pub fn new(num_threads: usize) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(|w| w.stealer()).collect();

        let mut handles = Vec::with_capacity(num_threads);
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let pending = Arc::clone(&pending);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("cliplay-loader-{}", worker_id))
                .spawn(move || {
                    trace!("Loader {} started", worker_id);
                    loop {
                        let job = local
                            .pop()
                            .or_else(|| injector.steal_batch_and_pop(&local).success())
                            .or_else(|| stealers.iter().find_map(|s| s.steal().success()));

                        if let Some(job) = job {
                            job();
                            pending.fetch_sub(1, Ordering::AcqRel);
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        // Idle: short sleep instead of spinning
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("Loader {} stopped", worker_id);
                })?;
            handles.push(handle);
        }

        debug!("Workers initialized: {} loader threads", num_threads);

        Ok(Self {
            injector,
            handles,
            pending,
            shutdown,
        })
    }

    /// Queue a closure for a loader thread. Returns immediately.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.injector.push(Box::new(f));
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

impl WorkerPool for Workers {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.spawn(job)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads, {} pending)...", num_threads, self.pending());

        self.shutdown.store(true, Ordering::SeqCst);

        // A fetch may sit on a network timeout; don't hold teardown hostage
        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining loaders");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} loaders stopped", num_threads);
    }
}
