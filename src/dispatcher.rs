//! Job frontier and crawl dispatcher
//!
//! The frontier owns the visited set and the bounded job queue; the
//! dispatcher owns worker lifecycle. URLs enter through [`Frontier::add`]
//! exactly once per run: the visited check-and-insert is atomic, and a
//! full queue sheds load by dropping the job with a warning instead of
//! blocking the discovering worker.

use crate::config::Config;
use crate::fetcher::PageFetcher;
use crate::images::ImageProcessor;
use crate::metrics::CrawlMetrics;
use crate::worker::CrawlWorker;
use dashmap::DashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A unit of crawl work: one URL at one depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub url: String,
    pub depth: u32,
}

impl Job {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }

    pub fn seed(url: impl Into<String>) -> Self {
        Self::new(url, 0)
    }
}

/// Normalize a submitted URL the way the frontier keys it: trimmed, with
/// a scheme prefixed when absent.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("http://{trimmed}"))
    }
}

/// The set of URLs already scheduled plus the bounded intake queue.
pub struct Frontier {
    visited: DashSet<String>,
    intake: RwLock<Option<mpsc::Sender<Job>>>,
    capacity: usize,
    enqueued: AtomicUsize,
    dropped: AtomicUsize,
    metrics: Arc<CrawlMetrics>,
}

impl Frontier {
    pub fn bounded(capacity: usize, metrics: Arc<CrawlMetrics>) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                visited: DashSet::new(),
                intake: RwLock::new(Some(sender)),
                capacity,
                enqueued: AtomicUsize::new(0),
                dropped: AtomicUsize::new(0),
                metrics,
            },
            receiver,
        )
    }

    /// Submit a job. Returns whether it was enqueued; already-visited
    /// URLs, queue-full drops and a closed intake all return `false`
    /// without error.
    pub fn add(&self, job: Job) -> bool {
        let Some(url) = normalize_url(&job.url) else {
            return false;
        };

        // DashSet::insert is the atomic check-and-insert guarding the
        // at-most-once-enqueue invariant.
        if !self.visited.insert(url.clone()) {
            return false;
        }

        let intake = self.intake.read().unwrap();
        let Some(sender) = intake.as_ref() else {
            return false;
        };

        match sender.try_send(Job::new(url, job.depth)) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .set_queue_depth(self.capacity - sender.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!("job queue full, dropping {}", job.url);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_dropped_job();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Close the intake; no further jobs are accepted and workers drain
    /// out once the queue empties.
    pub fn close(&self) {
        self.intake.write().unwrap().take();
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn enqueued_count(&self) -> usize {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Totals for one finished crawl run.
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub pages_crawled: usize,
    pub pages_failed: usize,
    pub images_indexed: usize,
    pub images_failed: usize,
    pub urls_visited: usize,
    pub jobs_dropped: usize,
}

/// Orchestrates the worker pool over the shared job queue.
pub struct Dispatcher {
    config: Config,
    frontier: Arc<Frontier>,
    receiver: Mutex<Option<mpsc::Receiver<Job>>>,
    fetcher: Arc<PageFetcher>,
    processor: Arc<ImageProcessor>,
    budget: Arc<Semaphore>,
    shutdown: CancellationToken,
    metrics: Arc<CrawlMetrics>,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        fetcher: Arc<PageFetcher>,
        processor: Arc<ImageProcessor>,
        metrics: Arc<CrawlMetrics>,
    ) -> Self {
        let (frontier, receiver) = Frontier::bounded(config.queue_capacity, metrics.clone());
        let budget = Arc::new(Semaphore::new(config.max_concurrent_fetches));

        Self {
            config,
            frontier: Arc::new(frontier),
            receiver: Mutex::new(Some(receiver)),
            fetcher,
            processor,
            budget,
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    /// Submit a job to the frontier. Never fails; see [`Frontier::add`].
    pub fn add(&self, job: Job) -> bool {
        self.frontier.add(job)
    }

    /// Signal workers to stop dequeuing. In-flight jobs finish or fail on
    /// their own; nothing is forcibly interrupted.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    /// Start the worker pool and block until the run is stopped, then
    /// close the job intake and wait for every worker to drain.
    pub async fn run(&self) -> CrawlSummary {
        let receiver = self.receiver.lock().await.take();
        let Some(receiver) = receiver else {
            warn!("dispatcher run invoked twice, nothing to do");
            return self.summary(&[]);
        };

        info!(
            "dispatcher starting {} workers (concurrency budget {})",
            self.config.workers, self.config.max_concurrent_fetches
        );

        let shared_receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::new();
        let mut handles = Vec::new();

        for id in 0..self.config.workers {
            let worker = CrawlWorker::new(
                id,
                &self.config,
                self.frontier.clone(),
                self.fetcher.clone(),
                self.processor.clone(),
                self.budget.clone(),
                self.shutdown.clone(),
                self.metrics.clone(),
            );
            let task = worker.clone();
            let receiver = shared_receiver.clone();
            handles.push(tokio::spawn(async move {
                task.run(receiver).await;
            }));
            workers.push(worker);
        }

        self.shutdown.cancelled().await;

        info!("dispatcher stopping, closing job intake");
        self.frontier.close();
        for handle in handles {
            let _ = handle.await;
        }
        info!("dispatcher stopped, all workers drained");

        self.summary(&workers)
    }

    fn summary(&self, workers: &[CrawlWorker]) -> CrawlSummary {
        CrawlSummary {
            pages_crawled: workers.iter().map(CrawlWorker::pages_crawled).sum(),
            pages_failed: workers.iter().map(CrawlWorker::pages_failed).sum(),
            images_indexed: workers.iter().map(CrawlWorker::images_indexed).sum(),
            images_failed: workers.iter().map(CrawlWorker::images_failed).sum(),
            urls_visited: self.frontier.visited_count(),
            jobs_dropped: self.frontier.dropped_count(),
        }
    }
}
