//! # Image Crawler
//!
//! A concurrent web crawler that discovers pages, extracts embedded
//! images, and builds a searchable image index. Pages are fetched either
//! with plain HTTP or rendered through a pool of headless Chrome
//! instances for JavaScript-driven sites; every discovered image is
//! downloaded, thumbnailed where possible, and recorded in a SQLite
//! index that a separate browsing surface can query.
//!
//! ## Architecture
//!
//! Seed URLs enter the [`Dispatcher`], which owns a deduplicating
//! frontier (a visited set plus a bounded job queue) and a fixed pool of
//! crawl workers. Each worker pulls a job, acquires one unit of the
//! global concurrency budget, fetches the page, extracts links and
//! images, feeds same-site links back to the frontier, and hands images
//! to the [`ImageProcessor`]. A single cancellation token stops the run
//! on timeout or signal; in-flight jobs drain before shutdown completes.
//!
//! Failures stay local: a failed fetch abandons its job, a failed image
//! skips that image, and a failed JS render falls back to a plain fetch.
//! Nothing short of cancellation ends the crawl.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image_crawler::{
//!     Config, CrawlMetrics, Dispatcher, ImageProcessor, Job, PageFetcher,
//!     SqliteMetadataStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(SqliteMetadataStore::open(&config.database_path).await?);
//!     let metrics = Arc::new(CrawlMetrics::new());
//!     let fetcher = Arc::new(PageFetcher::new(&config, metrics.clone()).await?);
//!     let processor = Arc::new(ImageProcessor::new(&config, store)?);
//!
//!     let dispatcher = Arc::new(Dispatcher::new(config, fetcher, processor, metrics));
//!     dispatcher.add(Job::seed("https://example.com"));
//!
//!     let stopper = dispatcher.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!         stopper.stop();
//!     });
//!
//!     let summary = dispatcher.run().await;
//!     println!("indexed {} images", summary.images_indexed);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Crawl two sites for up to two minutes
//! image-crawler --timeout 120 crawl https://example.com https://example.org
//!
//! # Search the resulting index
//! image-crawler query --format png --min-width 300 --filename logo
//! ```

/// Configuration and Chrome launch settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Browser pool management for the rendered fetch strategy
pub mod browser_pool;

/// Page fetch strategies (plain HTTP and rendered JS)
pub mod fetcher;

/// Link and image extraction from fetched markup
pub mod extractor;

/// Image download, decoding and thumbnail generation
pub mod images;

/// Persisted image metadata and the record-store contract
pub mod store;

/// Job frontier and crawl dispatcher
pub mod dispatcher;

/// Crawl worker loop
pub mod worker;

/// Command-line interface implementation
pub mod cli;

/// Crawl pipeline metric handles
pub mod metrics;

/// URL, filename and formatting helpers
pub mod utils;

#[cfg(test)]
mod tests;

pub use browser_pool::*;
pub use cli::*;
pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use extractor::*;
pub use fetcher::*;
pub use images::*;
pub use metrics::*;
pub use store::*;
pub use utils::*;
pub use worker::*;
