use metrics::{Counter, Gauge, Histogram};
use std::time::Duration;

/// Metric handles for the crawl pipeline.
///
/// Handles are created detached; wiring them to a recorder is the
/// embedding application's choice.
pub struct CrawlMetrics {
    pub pages_fetched: Counter,
    pub pages_failed: Counter,
    pub fetch_duration: Histogram,
    pub images_indexed: Counter,
    pub images_failed: Counter,
    pub links_discovered: Counter,
    pub jobs_dropped: Counter,
    pub render_fallbacks: Counter,
    pub queue_depth: Gauge,
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self {
            pages_fetched: Counter::noop(),
            pages_failed: Counter::noop(),
            fetch_duration: Histogram::noop(),
            images_indexed: Counter::noop(),
            images_failed: Counter::noop(),
            links_discovered: Counter::noop(),
            jobs_dropped: Counter::noop(),
            render_fallbacks: Counter::noop(),
            queue_depth: Gauge::noop(),
        }
    }

    pub fn record_fetch(&self, duration: Duration, success: bool) {
        if success {
            self.pages_fetched.increment(1);
        } else {
            self.pages_failed.increment(1);
        }
        self.fetch_duration.record(duration.as_secs_f64());
    }

    pub fn record_image(&self, success: bool) {
        if success {
            self.images_indexed.increment(1);
        } else {
            self.images_failed.increment(1);
        }
    }

    pub fn record_links(&self, count: usize) {
        self.links_discovered.increment(count as u64);
    }

    pub fn record_dropped_job(&self) {
        self.jobs_dropped.increment(1);
    }

    pub fn record_render_fallback(&self) {
        self.render_fallbacks.increment(1);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }
}

impl Default for CrawlMetrics {
    fn default() -> Self {
        Self::new()
    }
}
