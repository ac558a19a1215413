use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Unexpected status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Browser instance unavailable")]
    BrowserUnavailable,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Page render failed: {0}")]
    RenderFailed(String),

    #[error("Image decode failed: {0}")]
    DecodeFailed(String),

    #[error("Thumbnail generation failed: {0}")]
    ThumbnailFailed(String),

    #[error("SVG rasterizer failed: {0}")]
    RasterizerFailed(String),

    #[error("Metadata store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Semaphore acquire error: {0}")]
    SemaphoreError(String),
}

impl CrawlError {
    /// Whether this error is scoped to a single job or image, leaving the
    /// rest of the crawl unaffected.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            CrawlError::ConfigurationError(_) | CrawlError::BrowserLaunchFailed(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CrawlError::InvalidUrl(_) => ErrorSeverity::Low,
            CrawlError::Cancelled => ErrorSeverity::Low,
            CrawlError::ConfigurationError(_) => ErrorSeverity::High,
            CrawlError::BrowserLaunchFailed(_) => ErrorSeverity::High,
            CrawlError::StoreError(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl From<AcquireError> for CrawlError {
    fn from(err: AcquireError) -> Self {
        CrawlError::SemaphoreError(err.to_string())
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(err: std::io::Error) -> Self {
        CrawlError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        CrawlError::FetchFailed(err.to_string())
    }
}

impl From<url::ParseError> for CrawlError {
    fn from(err: url::ParseError) -> Self {
        CrawlError::InvalidUrl(err.to_string())
    }
}

impl From<sqlx::Error> for CrawlError {
    fn from(err: sqlx::Error) -> Self {
        CrawlError::StoreError(err.to_string())
    }
}

impl From<image::ImageError> for CrawlError {
    fn from(err: image::ImageError) -> Self {
        CrawlError::DecodeFailed(err.to_string())
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::ConfigurationError(err.to_string())
    }
}
