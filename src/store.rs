//! Persisted image metadata and the record-store contract
//!
//! The crawler only ever issues independent inserts and filtered queries;
//! everything else about storage stays behind the [`MetadataStore`]
//! trait. The shipped implementation is SQLite via sqlx.

use crate::error::CrawlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// One indexed image. Created once per successfully downloaded image,
/// never updated or deleted by the crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Opaque record identifier.
    pub id: String,
    /// Absolute URL the image was downloaded from.
    pub url: String,
    /// Filename within the image directory, unique at creation time.
    pub filename: String,
    /// Thumbnail path, when one could be generated.
    pub thumbnail_path: Option<String>,
    pub alt: String,
    pub title: String,
    /// Natural dimensions; zero when the image could not be decoded.
    pub width: u32,
    pub height: u32,
    /// Sniffed format (`png`, `jpg`, `svg`, ...); empty when unknown.
    pub format: String,
    pub crawled_at: DateTime<Utc>,
}

impl ImageMetadata {
    pub fn new(url: String, filename: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            filename,
            thumbnail_path: None,
            alt: String::new(),
            title: String::new(),
            width: 0,
            height: 0,
            format: String::new(),
            crawled_at: Utc::now(),
        }
    }
}

/// Filter for querying the image index. All fields are conjunctive;
/// results are ordered by crawl time descending.
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    /// Exact format match (`png`, `svg`, ...).
    pub format: Option<String>,
    /// Substring match on the stored filename.
    pub filename_contains: Option<String>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    /// Row limit; defaults to 500 when unset.
    pub limit: Option<u32>,
}

/// Insert/query contract the crawler holds against the record store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist one record. Each insert is independent; there is no
    /// cross-image transaction.
    async fn insert(&self, record: &ImageMetadata) -> Result<(), CrawlError>;

    /// Fetch records matching the filter, newest first.
    async fn query(&self, query: &ImageQuery) -> Result<Vec<ImageMetadata>, CrawlError>;
}

/// SQLite implementation of [`MetadataStore`].
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS images (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        filename TEXT NOT NULL,
        thumbnail_path TEXT,
        alt_text TEXT NOT NULL DEFAULT '',
        title_text TEXT NOT NULL DEFAULT '',
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        format TEXT NOT NULL DEFAULT '',
        crawled_at TEXT NOT NULL
    )
";

impl SqliteMetadataStore {
    /// Open (creating if missing) a database file and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, CrawlError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// In-memory database, handy for tests.
    pub async fn in_memory() -> Result<Self, CrawlError> {
        // A single connection so every query sees the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, CrawlError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    fn row_to_record(row: &SqliteRow) -> Result<ImageMetadata, CrawlError> {
        let crawled_at: String = row.try_get("crawled_at")?;
        let crawled_at = DateTime::parse_from_rfc3339(&crawled_at)
            .map_err(|e| CrawlError::StoreError(format!("bad crawled_at: {e}")))?
            .with_timezone(&Utc);

        Ok(ImageMetadata {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            filename: row.try_get("filename")?,
            thumbnail_path: row.try_get("thumbnail_path")?,
            alt: row.try_get("alt_text")?,
            title: row.try_get("title_text")?,
            width: row.try_get::<i64, _>("width")? as u32,
            height: row.try_get::<i64, _>("height")? as u32,
            format: row.try_get("format")?,
            crawled_at,
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert(&self, record: &ImageMetadata) -> Result<(), CrawlError> {
        sqlx::query(
            r"
            INSERT INTO images (
                id, url, filename, thumbnail_path, alt_text, title_text,
                width, height, format, crawled_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.filename)
        .bind(&record.thumbnail_path)
        .bind(&record.alt)
        .bind(&record.title)
        .bind(record.width as i64)
        .bind(record.height as i64)
        .bind(&record.format)
        .bind(record.crawled_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, query: &ImageQuery) -> Result<Vec<ImageMetadata>, CrawlError> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, url, filename, thumbnail_path, alt_text, title_text, \
             width, height, format, crawled_at FROM images WHERE 1=1",
        );

        if let Some(format) = &query.format {
            builder.push(" AND format = ").push_bind(format);
        }
        if let Some(fragment) = &query.filename_contains {
            builder
                .push(" AND filename LIKE ")
                .push_bind(format!("%{fragment}%"));
        }
        if let Some(min_width) = query.min_width {
            builder.push(" AND width >= ").push_bind(min_width as i64);
        }
        if let Some(min_height) = query.min_height {
            builder.push(" AND height >= ").push_bind(min_height as i64);
        }
        builder
            .push(" ORDER BY crawled_at DESC LIMIT ")
            .push_bind(query.limit.unwrap_or(500) as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}
