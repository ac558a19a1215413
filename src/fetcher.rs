//! Page fetching strategies
//!
//! Two ways to obtain page markup: a plain HTTP GET, or a rendered fetch
//! through a pooled headless Chrome instance for JavaScript-driven pages.
//! A failed rendered fetch always degrades to the plain strategy rather
//! than failing the job.

use crate::browser_pool::BrowserPool;
use crate::config::Config;
use crate::error::CrawlError;
use crate::metrics::CrawlMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Fetched markup plus the base URL every relative reference on the page
/// resolves against (the final URL after redirects, when known).
#[derive(Debug)]
pub struct FetchedPage {
    pub html: String,
    pub base_url: Url,
}

pub struct PageFetcher {
    client: reqwest::Client,
    pool: Option<Arc<BrowserPool>>,
    render_timeout: Duration,
    settle_delay: Duration,
    metrics: Arc<CrawlMetrics>,
}

impl PageFetcher {
    /// Build the fetcher; launches the browser pool when JS rendering is
    /// enabled.
    pub async fn new(config: &Config, metrics: Arc<CrawlMetrics>) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let pool = if config.render_js {
            Some(BrowserPool::new(config.clone()).await?)
        } else {
            None
        };

        Ok(Self {
            client,
            pool,
            render_timeout: config.render_timeout,
            settle_delay: config.render_settle_delay,
            metrics,
        })
    }

    /// Fetch one page with the configured strategy.
    pub async fn fetch_page(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FetchedPage, CrawlError> {
        let requested = Url::parse(url)?;

        if let Some(pool) = &self.pool {
            match timeout(self.render_timeout, self.render(pool, &requested)).await {
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(e)) => {
                    self.metrics.record_render_fallback();
                    warn!("rendered fetch of {} failed: {}, using plain fetch", url, e);
                }
                Err(_) => {
                    self.metrics.record_render_fallback();
                    warn!(
                        "rendered fetch of {} timed out after {:?}, using plain fetch",
                        url, self.render_timeout
                    );
                }
            }
        }

        self.plain_fetch(&requested, token).await
    }

    async fn render(
        &self,
        pool: &Arc<BrowserPool>,
        url: &Url,
    ) -> Result<FetchedPage, CrawlError> {
        let lease = pool.checkout().await?;

        let page = {
            let browser = lease.browser().lock().await;
            browser
                .new_page(url.as_str())
                .await
                .map_err(|e| CrawlError::RenderFailed(e.to_string()))?
        };

        // Let scripts settle before reading the DOM.
        sleep(self.settle_delay).await;

        let html = page
            .content()
            .await
            .map_err(|e| CrawlError::RenderFailed(e.to_string()))?;

        let base_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        let _ = page.close().await;
        debug!("rendered {} ({} bytes of markup)", url, html.len());

        Ok(FetchedPage { html, base_url })
    }

    async fn plain_fetch(
        &self,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<FetchedPage, CrawlError> {
        let response = tokio::select! {
            _ = token.cancelled() => return Err(CrawlError::Cancelled),
            result = self.client.get(url.clone()).send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let base_url = response.url().clone();
        let html = tokio::select! {
            _ = token.cancelled() => return Err(CrawlError::Cancelled),
            result = response.text() => result?,
        };

        Ok(FetchedPage { html, base_url })
    }

    pub fn render_enabled(&self) -> bool {
        self.pool.is_some()
    }

    pub fn browser_pool(&self) -> Option<&Arc<BrowserPool>> {
        self.pool.as_ref()
    }

    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
    }
}
