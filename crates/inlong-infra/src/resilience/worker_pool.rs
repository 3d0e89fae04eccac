//! Fixed-size worker pool with caller-runs saturation
//!
//! Jobs go onto a queue drained by a fixed number of workers. The queue is
//! unbounded unless a capacity is configured; when it cannot accept a job
//! (full or closed) the submitter runs the job itself, so work is never
//! dropped and load is pushed back onto the caller instead.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, warn};

type Job = BoxFuture<'static, ()>;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Name of this pool (for logging)
    pub name: String,
    /// Number of workers
    pub workers: usize,
    /// Queue capacity; `None` for an unbounded queue
    pub queue_capacity: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            workers: 20,
            queue_capacity: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new pool config with a name and worker count
    pub fn new(name: &str, workers: usize) -> Self {
        Self {
            name: name.to_string(),
            workers,
            ..Default::default()
        }
    }

    /// Bound the queue
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Use an unbounded queue
    pub fn unbounded(mut self) -> Self {
        self.queue_capacity = None;
        self
    }
}

enum JobSender {
    Bounded(mpsc::Sender<Job>),
    Unbounded(mpsc::UnboundedSender<Job>),
}

impl JobSender {
    /// Hands the job back when the queue refuses it
    fn try_send(&self, job: Job) -> Result<(), Job> {
        match self {
            JobSender::Bounded(sender) => sender.try_send(job).map_err(|e| e.into_inner()),
            JobSender::Unbounded(sender) => sender.send(job).map_err(|e| e.0),
        }
    }
}

enum JobReceiver {
    Bounded(mpsc::Receiver<Job>),
    Unbounded(mpsc::UnboundedReceiver<Job>),
}

impl JobReceiver {
    async fn recv(&mut self) -> Option<Job> {
        match self {
            JobReceiver::Bounded(receiver) => receiver.recv().await,
            JobReceiver::Unbounded(receiver) => receiver.recv().await,
        }
    }
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed-size pool of async workers
///
/// Must be created inside a Tokio runtime. Workers stop once the pool is
/// dropped and the queue is drained.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: JobSender,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Create a new pool and spawn its workers
    pub fn new(config: WorkerPoolConfig) -> Self {
        let workers = config.workers.max(1);

        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (JobSender::Bounded(tx), JobReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (JobSender::Unbounded(tx), JobReceiver::Unbounded(rx))
            }
        };

        let receiver = Arc::new(Mutex::new(receiver));
        for index in 0..workers {
            let receiver = Arc::clone(&receiver);
            let name = config.name.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                debug!(pool = %name, worker = index, "Worker stopped");
            });
        }

        debug!(
            pool = %config.name,
            workers,
            queue_capacity = ?config.queue_capacity,
            "Worker pool started"
        );

        Self {
            config,
            sender,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Create with a worker count and an unbounded queue
    pub fn with_workers(name: &str, workers: usize) -> Self {
        Self::new(WorkerPoolConfig::new(name, workers))
    }

    /// Submit a job.
    ///
    /// Returns once the job is queued, or once it has run on the caller when
    /// the queue refused it. A panicking job is logged and does not take its
    /// worker down.
    pub async fn execute<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.start();

        let in_flight = Arc::clone(&self.in_flight);
        let name = self.config.name.clone();
        let tracked: Job = Box::pin(async move {
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                error!(pool = %name, "Worker pool job panicked");
            }
            in_flight.finish();
        });

        if let Err(job) = self.sender.try_send(tracked) {
            warn!(
                pool = %self.config.name,
                "Worker pool cannot accept job, running it on the caller"
            );
            job.await;
        }
    }

    /// Wait until every submitted job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Jobs submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Get the worker count
    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Get the pool name
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_worker_pool_runs_jobs() {
        let pool = WorkerPool::with_workers("test", 4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.execute(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_without_jobs() {
        let pool = WorkerPool::with_workers("idle", 2);
        pool.wait_idle().await;
        assert_eq!(pool.workers(), 2);
        assert_eq!(pool.name(), "idle");
    }

    #[tokio::test]
    async fn test_full_queue_runs_on_caller() {
        let pool = WorkerPool::new(WorkerPoolConfig::new("bounded", 1).with_queue_capacity(1));

        // Occupy the only worker
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        pool.execute(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .await;
        started_rx.await.unwrap();

        // Fills the queue
        let queued = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&queued);
        pool.execute(async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        // Queue is full, so this one runs before execute returns
        let inline = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&inline);
        pool.execute(async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(inline.load(Ordering::SeqCst));
        assert!(!queued.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        pool.wait_idle().await;
        assert!(queued.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::with_workers("panics", 1);
        let ran = Arc::new(AtomicBool::new(false));

        pool.execute(async {
            panic!("listener blew up");
        })
        .await;

        let flag = Arc::clone(&ran);
        pool.execute(async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        pool.wait_idle().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_worker_pool_limits_concurrency() {
        let pool = WorkerPool::with_workers("limited", 3);
        let current = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let current = Arc::clone(&current);
            let max_concurrent = Arc::clone(&max_concurrent);
            pool.execute(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            })
            .await;
        }

        pool.wait_idle().await;
        assert!(max_concurrent.load(Ordering::SeqCst) <= 3);
    }
}
