//! Crawl workers
//!
//! Each worker loops over the shared job queue: acquire one unit of the
//! concurrency budget, fetch the page, extract links and images, feed
//! same-site links back to the frontier, and hand images to the
//! processor. Failures never propagate past the job or image they belong
//! to.

use crate::config::Config;
use crate::dispatcher::{Frontier, Job};
use crate::extractor::extract_content;
use crate::fetcher::PageFetcher;
use crate::images::ImageProcessor;
use crate::metrics::CrawlMetrics;
use crate::utils::same_site;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Clone)]
pub struct CrawlWorker {
    id: usize,
    frontier: Arc<Frontier>,
    fetcher: Arc<PageFetcher>,
    processor: Arc<ImageProcessor>,
    budget: Arc<Semaphore>,
    shutdown: CancellationToken,
    metrics: Arc<CrawlMetrics>,
    follow_external: bool,
    max_depth: Option<u32>,
    pages_crawled: Arc<AtomicUsize>,
    pages_failed: Arc<AtomicUsize>,
    images_indexed: Arc<AtomicUsize>,
    images_failed: Arc<AtomicUsize>,
}

impl CrawlWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        config: &Config,
        frontier: Arc<Frontier>,
        fetcher: Arc<PageFetcher>,
        processor: Arc<ImageProcessor>,
        budget: Arc<Semaphore>,
        shutdown: CancellationToken,
        metrics: Arc<CrawlMetrics>,
    ) -> Self {
        Self {
            id,
            frontier,
            fetcher,
            processor,
            budget,
            shutdown,
            metrics,
            follow_external: config.follow_external_links,
            max_depth: config.max_depth,
            pages_crawled: Arc::new(AtomicUsize::new(0)),
            pages_failed: Arc::new(AtomicUsize::new(0)),
            images_indexed: Arc::new(AtomicUsize::new(0)),
            images_failed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pull jobs from the shared receiver until the queue closes or the
    /// run is stopped.
    pub async fn run(&self, requests: Arc<Mutex<mpsc::Receiver<Job>>>) {
        info!("crawl worker {} started", self.id);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let job = {
                let mut receiver = requests.lock().await;
                tokio::select! {
                    _ = self.shutdown.cancelled() => None,
                    job = receiver.recv() => job,
                }
            };

            match job {
                Some(job) => self.process_job(job).await,
                None => break,
            }
        }

        info!("crawl worker {} stopped", self.id);
    }

    async fn process_job(&self, job: Job) {
        let _permit = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            permit = self.budget.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        debug!("worker {} crawling {} (depth {})", self.id, job.url, job.depth);

        let started = Instant::now();
        let page = match self.fetcher.fetch_page(&job.url, &self.shutdown).await {
            Ok(page) => {
                self.metrics.record_fetch(started.elapsed(), true);
                page
            }
            Err(e) => {
                self.metrics.record_fetch(started.elapsed(), false);
                self.pages_failed.fetch_add(1, Ordering::Relaxed);
                warn!("worker {} failed to fetch {}: {}", self.id, job.url, e);
                return;
            }
        };

        let content = extract_content(&page.html, &page.base_url);
        self.metrics.record_links(content.links.len());

        let scheduled = schedule_links(
            &self.frontier,
            &page.base_url,
            &content.links,
            job.depth,
            self.follow_external,
            self.max_depth,
        );
        debug!(
            "worker {} found {} links ({} scheduled) and {} images on {}",
            self.id,
            content.links.len(),
            scheduled,
            content.images.len(),
            job.url
        );

        for image in &content.images {
            match self.processor.process(image, &self.shutdown).await {
                Ok(record) => {
                    self.images_indexed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_image(true);
                    debug!("worker {} indexed {} as {}", self.id, image.src, record.filename);
                }
                Err(e) => {
                    self.images_failed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_image(false);
                    warn!("worker {} failed image {}: {}", self.id, image.src, e);
                }
            }
        }

        self.pages_crawled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_crawled(&self) -> usize {
        self.pages_crawled.load(Ordering::Relaxed)
    }

    pub fn pages_failed(&self) -> usize {
        self.pages_failed.load(Ordering::Relaxed)
    }

    pub fn images_indexed(&self) -> usize {
        self.images_indexed.load(Ordering::Relaxed)
    }

    pub fn images_failed(&self) -> usize {
        self.images_failed.load(Ordering::Relaxed)
    }
}

/// Apply the same-site policy and the optional depth bound to a page's
/// outbound links, submitting survivors to the frontier at `depth + 1`.
/// Returns how many were actually enqueued.
pub fn schedule_links(
    frontier: &Frontier,
    base: &Url,
    links: &[Url],
    depth: u32,
    follow_external: bool,
    max_depth: Option<u32>,
) -> usize {
    if matches!(max_depth, Some(limit) if depth >= limit) {
        return 0;
    }

    let mut scheduled = 0;
    for link in links {
        if !follow_external && !same_site(base, link) {
            continue;
        }
        if frontier.add(Job::new(link.to_string(), depth + 1)) {
            scheduled += 1;
        }
    }
    scheduled
}
