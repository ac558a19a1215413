#[cfg(test)]
mod integration_tests {
    use crate::worker::schedule_links;
    use crate::{
        extract_content, Config, CrawlMetrics, Dispatcher, Frontier, ImageProcessor, Job,
        PageFetcher, SqliteMetadataStore,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use url::Url;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_fetches, 200);
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.max_thumbnail_width, 200);
        assert_eq!(config.crawl_timeout, Duration::from_secs(120));
        assert!(config.render_js);
        assert!(!config.follow_external_links);
        assert!(config.max_depth.is_none());
        assert!(config.workers > 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let config = Config {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_concurrent_fetches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            render_js: true,
            browser_pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // A zero crawl timeout is a valid way to ask for an immediate stop.
        let config = Config {
            crawl_timeout: Duration::from_secs(0),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config {
            workers: 7,
            follow_external_links: true,
            max_depth: Some(3),
            svg_rasterizer: Some("rsvg-convert -w {width} -o {output} {input}".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.workers, 7);
        assert!(parsed.follow_external_links);
        assert_eq!(parsed.max_depth, Some(3));
        assert_eq!(parsed.svg_rasterizer, config.svg_rasterizer);
        assert_eq!(parsed.crawl_timeout, config.crawl_timeout);
    }

    /// Build a full dispatcher wired for tests: no JS rendering, an
    /// in-memory store, and a throwaway image directory.
    async fn test_dispatcher(workers: usize) -> (Dispatcher, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = Config {
            workers,
            render_js: false,
            image_dir: dir.path().join("images"),
            ..Default::default()
        };

        let metrics = Arc::new(CrawlMetrics::new());
        let store = Arc::new(SqliteMetadataStore::in_memory().await.unwrap());
        let fetcher = Arc::new(PageFetcher::new(&config, metrics.clone()).await.unwrap());
        let processor = Arc::new(ImageProcessor::new(&config, store).unwrap());

        (
            Dispatcher::new(config, fetcher, processor, metrics),
            dir,
        )
    }

    #[tokio::test]
    async fn test_expired_run_starts_no_work() {
        let (dispatcher, _dir) = test_dispatcher(4).await;

        dispatcher.add(Job::seed("https://example.com"));
        dispatcher.add(Job::seed("https://example.org"));

        // The run-scope is already cancelled before workers start, as with
        // a crawl timeout of zero.
        dispatcher.stop();

        let summary = tokio::time::timeout(Duration::from_secs(5), dispatcher.run())
            .await
            .expect("dispatcher must return promptly with nothing in flight");

        assert_eq!(summary.pages_crawled, 0);
        assert_eq!(summary.pages_failed, 0);
        assert_eq!(summary.images_indexed, 0);
        assert_eq!(summary.urls_visited, 2);
    }

    #[tokio::test]
    async fn test_stop_mid_run_drains_and_closes_intake() {
        let (dispatcher, _dir) = test_dispatcher(2).await;
        let dispatcher = Arc::new(dispatcher);

        let run = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run().await })
        };

        // Workers are now parked on an empty queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        dispatcher.stop();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run must finish after stop")
            .unwrap();
        assert_eq!(summary.pages_crawled, 0);

        // The intake closed during shutdown; late submissions are refused.
        assert!(!dispatcher.add(Job::seed("https://example.com/late")));
    }

    #[test]
    fn test_duplicate_and_external_links_schedule_once() {
        let metrics = Arc::new(CrawlMetrics::new());
        let (frontier, mut receiver) = Frontier::bounded(16, metrics);

        let base = Url::parse("http://alpha-site.com/page").unwrap();
        let html = r#"
            <a href="/x">one</a>
            <a href="/x">duplicate</a>
            <a href="http://beta-site.org/y">external</a>
        "#;

        let content = extract_content(html, &base);
        // Extraction already collapsed the duplicate.
        assert_eq!(content.links.len(), 2);

        let scheduled = schedule_links(&frontier, &base, &content.links, 0, false, None);
        assert_eq!(scheduled, 1);

        let job = receiver.try_recv().unwrap();
        assert_eq!(job.url, "http://alpha-site.com/x");
        assert_eq!(job.depth, 1);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_external_links_scheduled_when_allowed() {
        let metrics = Arc::new(CrawlMetrics::new());
        let (frontier, _receiver) = Frontier::bounded(16, metrics);

        let base = Url::parse("http://alpha-site.com/page").unwrap();
        let links = [Url::parse("http://beta-site.org/y").unwrap()];

        let scheduled = schedule_links(&frontier, &base, &links, 0, true, None);
        assert_eq!(scheduled, 1);
    }

    #[test]
    fn test_depth_bound_stops_scheduling() {
        let metrics = Arc::new(CrawlMetrics::new());
        let (frontier, _receiver) = Frontier::bounded(16, metrics);

        let base = Url::parse("http://alpha-site.com/page").unwrap();
        let links = [Url::parse("http://alpha-site.com/deeper").unwrap()];

        // At the limit, links are no longer followed.
        assert_eq!(schedule_links(&frontier, &base, &links, 2, false, Some(2)), 0);
        // Below the limit they are.
        assert_eq!(schedule_links(&frontier, &base, &links, 1, false, Some(2)), 1);
    }

    #[test]
    fn test_error_classification() {
        use crate::{CrawlError, ErrorSeverity};

        assert!(CrawlError::FetchFailed("connection reset".into()).is_transient());
        assert!(CrawlError::DecodeFailed("bad header".into()).is_transient());
        assert!(!CrawlError::ConfigurationError("bad".into()).is_transient());
        assert!(!CrawlError::BrowserLaunchFailed("no chrome".into()).is_transient());

        assert!(matches!(
            CrawlError::InvalidUrl("x".into()).severity(),
            ErrorSeverity::Low
        ));
        assert!(matches!(
            CrawlError::FetchFailed("x".into()).severity(),
            ErrorSeverity::Medium
        ));
        assert!(matches!(
            CrawlError::ConfigurationError("x".into()).severity(),
            ErrorSeverity::High
        ));
    }

    #[test]
    fn test_subdomain_links_are_same_site() {
        let metrics = Arc::new(CrawlMetrics::new());
        let (frontier, mut receiver) = Frontier::bounded(16, metrics);

        let base = Url::parse("http://a.alpha-site.com/").unwrap();
        let links = [Url::parse("http://b.alpha-site.com/y").unwrap()];

        assert_eq!(schedule_links(&frontier, &base, &links, 0, false, None), 1);
        assert_eq!(receiver.try_recv().unwrap().url, "http://b.alpha-site.com/y");
    }
}
