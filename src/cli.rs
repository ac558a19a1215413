use crate::{
    format_duration, Config, CrawlMetrics, Dispatcher, ImageProcessor, ImageQuery, Job,
    MetadataStore, PageFetcher, SqliteMetadataStore,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "image-crawler")]
#[command(about = "Concurrent web crawler that builds a searchable image index")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Number of crawl workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Maximum concurrent fetch/process operations")]
    pub max_concurrent: Option<usize>,

    #[arg(long, help = "Crawl timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl from seed URLs and index every image found
    Crawl {
        #[arg(required = true, help = "Seed URLs (http:// is assumed when no scheme is given)")]
        seeds: Vec<String>,

        #[arg(long, help = "Directory for downloaded images and thumbnails")]
        image_dir: Option<PathBuf>,

        #[arg(long, help = "SQLite database file backing the image index")]
        database: Option<PathBuf>,

        #[arg(long, help = "Follow links to other registrable domains")]
        follow_external: bool,

        #[arg(long, help = "Disable JS rendering and use plain HTTP fetches only")]
        no_render_js: bool,

        #[arg(long, help = "Maximum crawl depth (unbounded when omitted)")]
        max_depth: Option<u32>,

        #[arg(
            long,
            help = "SVG rasterizer command template with {width}, {output} and {input} placeholders"
        )]
        svg_rasterizer: Option<String>,
    },

    /// Search the image index
    Query {
        #[arg(long, help = "SQLite database file backing the image index")]
        database: Option<PathBuf>,

        #[arg(long, help = "Exact image format, e.g. png")]
        format: Option<String>,

        #[arg(long, help = "Filename substring")]
        filename: Option<String>,

        #[arg(long, help = "Minimum width in pixels")]
        min_width: Option<u32>,

        #[arg(long, help = "Minimum height in pixels")]
        min_height: Option<u32>,

        #[arg(long, help = "Maximum number of rows returned")]
        limit: Option<u32>,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Crawl {
                seeds,
                image_dir,
                database,
                follow_external,
                no_render_js,
                max_depth,
                svg_rasterizer,
            } => {
                let mut config = self.config.clone();
                if let Some(dir) = image_dir {
                    config.image_dir = dir;
                }
                if let Some(db) = database {
                    config.database_path = db;
                }
                if follow_external {
                    config.follow_external_links = true;
                }
                if no_render_js {
                    config.render_js = false;
                }
                if max_depth.is_some() {
                    config.max_depth = max_depth;
                }
                if svg_rasterizer.is_some() {
                    config.svg_rasterizer = svg_rasterizer;
                }
                self.run_crawl(config, seeds).await
            }
            Commands::Query {
                database,
                format,
                filename,
                min_width,
                min_height,
                limit,
            } => {
                let database = database.unwrap_or_else(|| self.config.database_path.clone());
                let query = ImageQuery {
                    format,
                    filename_contains: filename,
                    min_width,
                    min_height,
                    limit,
                };
                self.run_query(&database, &query).await
            }
            Commands::Validate { config } => self.validate_config(&config).await,
        }
    }

    async fn run_crawl(&self, mut config: Config, seeds: Vec<String>) -> Result<()> {
        config.validate()?;

        let store = Arc::new(SqliteMetadataStore::open(&config.database_path).await?);
        let metrics = Arc::new(CrawlMetrics::new());

        let fetcher = match PageFetcher::new(&config, metrics.clone()).await {
            Ok(fetcher) => fetcher,
            Err(e) if config.render_js => {
                warn!("browser pool unavailable ({}), falling back to plain fetches", e);
                config.render_js = false;
                PageFetcher::new(&config, metrics.clone()).await?
            }
            Err(e) => return Err(e.into()),
        };
        let fetcher = Arc::new(fetcher);

        let processor = Arc::new(ImageProcessor::new(&config, store.clone())?);
        let dispatcher = Arc::new(Dispatcher::new(
            config.clone(),
            fetcher.clone(),
            processor,
            metrics,
        ));

        for seed in &seeds {
            dispatcher.add(Job::seed(seed.clone()));
        }
        info!(
            "seeded {} start URLs, JS rendering {}",
            seeds.len(),
            if fetcher.render_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );

        let timeout_task = {
            let dispatcher = dispatcher.clone();
            let timeout = config.crawl_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                info!("crawl timeout of {:?} reached", timeout);
                dispatcher.stop();
            })
        };
        let signal_task = spawn_signal_handler(dispatcher.clone());

        let started = Instant::now();
        let summary = dispatcher.run().await;
        timeout_task.abort();
        signal_task.abort();

        if let Some(pool) = fetcher.browser_pool() {
            let stats = pool.stats().await;
            info!(
                "browser pool rendered {} pages with {} restarts",
                stats.total_pages_rendered, stats.restarts
            );
        }
        fetcher.shutdown().await;

        info!(
            "crawl finished in {}: {} pages crawled ({} failed), {} images indexed ({} failed), {} URLs seen, {} jobs dropped",
            format_duration(started.elapsed()),
            summary.pages_crawled,
            summary.pages_failed,
            summary.images_indexed,
            summary.images_failed,
            summary.urls_visited,
            summary.jobs_dropped,
        );

        Ok(())
    }

    async fn run_query(&self, database: &Path, query: &ImageQuery) -> Result<()> {
        let store = SqliteMetadataStore::open(database).await?;
        let records = store.query(query).await?;

        println!("{} images", records.len());
        for record in records {
            println!(
                "{}  {}x{}  {}  {}",
                record.filename,
                record.width,
                record.height,
                if record.format.is_empty() {
                    "?"
                } else {
                    record.format.as_str()
                },
                record.url
            );
            if let Some(thumbnail) = &record.thumbnail_path {
                println!("    thumbnail: {thumbnail}");
            }
        }

        Ok(())
    }

    async fn validate_config(&self, path: &Path) -> Result<()> {
        println!("Validating configuration: {}", path.display());

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;

        println!("Configuration is valid:");
        println!("  Workers: {}", config.workers);
        println!("  Max concurrent fetches: {}", config.max_concurrent_fetches);
        println!("  Queue capacity: {}", config.queue_capacity);
        println!("  Crawl timeout: {:?}", config.crawl_timeout);
        println!("  Render JS: {}", config.render_js);
        println!("  Image directory: {}", config.image_dir.display());
        println!("  Database: {}", config.database_path.display());

        Ok(())
    }
}

fn spawn_signal_handler(dispatcher: Arc<Dispatcher>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, stopping crawl"),
            _ = sigterm.recv() => info!("Received SIGTERM, stopping crawl"),
        }
        dispatcher.stop();
    })
}

pub fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
