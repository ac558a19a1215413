//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration structure for the crawler,
//! covering the worker pool, fetch strategies, image processing and the
//! metadata store, plus the Chrome launch settings used by the rendered
//! fetch strategy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the crawler
///
/// Controls worker-pool sizing, the global concurrency budget, fetch
/// strategy selection, timeouts, and the filesystem/database targets of
/// the image index.
///
/// # Examples
///
/// ```rust
/// use image_crawler::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     workers: 4,
///     max_concurrent_fetches: 50,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Number of crawl workers pulling from the shared job queue
    /// (default: one per CPU core)
    pub workers: usize,

    /// Maximum number of simultaneous fetch/process operations across all
    /// workers (default: 200)
    ///
    /// This budget is independent of the worker count and bounds total
    /// in-flight network activity.
    pub max_concurrent_fetches: usize,

    /// Capacity of the job queue (default: 1000)
    ///
    /// When the queue is full, newly discovered URLs are dropped with a
    /// warning rather than blocking the discovering worker.
    pub queue_capacity: usize,

    /// Follow links that leave the seed's registrable domain
    /// (default: false)
    pub follow_external_links: bool,

    /// Render pages with headless Chrome before extraction, so
    /// JavaScript-driven pages expose their real content (default: true)
    ///
    /// When rendering fails for a page the crawler falls back to a plain
    /// HTTP fetch of that page.
    pub render_js: bool,

    /// Maximum crawl depth, counted from the seeds at depth 0
    /// (default: unbounded)
    ///
    /// Links discovered on a page at the limit are not scheduled.
    pub max_depth: Option<u32>,

    /// Overall crawl duration; the run stops when it expires
    /// (default: 120 seconds)
    pub crawl_timeout: Duration,

    /// Timeout for a single plain-HTTP page fetch (default: 15 seconds)
    pub fetch_timeout: Duration,

    /// Timeout for a single rendered page fetch (default: 30 seconds)
    pub render_timeout: Duration,

    /// Settle delay after navigation before reading rendered markup
    /// (default: 500 ms)
    pub render_settle_delay: Duration,

    /// Timeout for a single image download (default: 20 seconds)
    pub image_timeout: Duration,

    /// Directory where downloaded images and thumbnails are written
    /// (default: `images`)
    pub image_dir: PathBuf,

    /// SQLite database file backing the image index
    /// (default: `images.db`)
    pub database_path: PathBuf,

    /// Maximum thumbnail width in pixels (default: 200)
    ///
    /// Wider images are scaled down proportionally; narrower images keep
    /// their dimensions.
    pub max_thumbnail_width: u32,

    /// External command template for rasterizing SVG images
    /// (default: none)
    ///
    /// The template is run through a shell with `{width}`, `{output}` and
    /// `{input}` substituted, e.g.
    /// `rsvg-convert -w {width} -o {output} {input}`.
    pub svg_rasterizer: Option<String>,

    /// Number of Chrome instances kept in the render pool (default: 2)
    pub browser_pool_size: usize,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// User-Agent header sent with every HTTP request
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            max_concurrent_fetches: 200,
            queue_capacity: 1000,
            follow_external_links: false,
            render_js: true,
            max_depth: None,
            crawl_timeout: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(30),
            render_settle_delay: Duration::from_millis(500),
            image_timeout: Duration::from_secs(20),
            image_dir: PathBuf::from("images"),
            database_path: PathBuf::from("images.db"),
            max_thumbnail_width: 200,
            svg_rasterizer: None,
            browser_pool_size: 2,
            chrome_path: None,
            user_agent: format!("image-crawler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Reject configurations that cannot run: zero-sized pools, budgets
    /// or queues. A zero crawl timeout is allowed and simply stops the
    /// run before any work starts.
    pub fn validate(&self) -> Result<(), crate::CrawlError> {
        use crate::CrawlError::ConfigurationError;

        if self.workers == 0 {
            return Err(ConfigurationError("workers must be greater than 0".into()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigurationError(
                "max_concurrent_fetches must be greater than 0".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigurationError(
                "queue_capacity must be greater than 0".into(),
            ));
        }
        if self.render_js && self.browser_pool_size == 0 {
            return Err(ConfigurationError(
                "browser_pool_size must be greater than 0 when render_js is enabled".into(),
            ));
        }
        if self.max_thumbnail_width == 0 {
            return Err(ConfigurationError(
                "max_thumbnail_width must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Generate Chrome command-line arguments for a pooled browser instance
///
/// Each instance gets its own user-data and temp directories plus a unique
/// debugging port so concurrent instances never collide on Chrome's
/// process singleton.
pub fn chrome_args(config: &Config, instance_id: usize) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), instance_id);

    vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--ignore-certificate-errors".to_string(),
        format!("--user-agent={}", config.user_agent),
        format!("--user-data-dir=/tmp/image-crawler-profile-{unique_id}"),
        format!("--temp-dir=/tmp/image-crawler-tmp-{unique_id}"),
        format!("--remote-debugging-port={}", 9222 + instance_id),
    ]
}

/// Build a chromiumoxide `BrowserConfig` for one pool instance
pub fn create_browser_config(
    config: &Config,
    instance_id: usize,
) -> Result<chromiumoxide::browser::BrowserConfig, crate::CrawlError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder().args(chrome_args(config, instance_id));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder
        .build()
        .map_err(crate::CrawlError::BrowserLaunchFailed)
}
