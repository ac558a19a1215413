//! Image download, decoding, thumbnailing and metadata emission
//!
//! One call to [`ImageProcessor::process`] takes an extracted image
//! reference all the way to a file on disk plus a persisted metadata
//! record. Decode and thumbnail failures degrade the record (zero
//! dimensions, no thumbnail) instead of failing it; only a failed
//! download or a failed store insert surfaces as an error.

use crate::config::Config;
use crate::error::CrawlError;
use crate::extractor::ImageRef;
use crate::store::{ImageMetadata, MetadataStore};
use crate::utils::filename_from_url;
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ImageProcessor {
    client: reqwest::Client,
    image_dir: PathBuf,
    store: Arc<dyn MetadataStore>,
    rasterizer: Option<String>,
    max_thumbnail_width: u32,
}

impl ImageProcessor {
    pub fn new(config: &Config, store: Arc<dyn MetadataStore>) -> Result<Self, CrawlError> {
        std::fs::create_dir_all(&config.image_dir)?;

        let client = reqwest::Client::builder()
            .timeout(config.image_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            image_dir: config.image_dir.clone(),
            store,
            rasterizer: config.svg_rasterizer.clone(),
            max_thumbnail_width: config.max_thumbnail_width,
        })
    }

    /// Download one image, write it to the image directory under a
    /// collision-free name, decode it, produce a thumbnail where possible,
    /// and persist the metadata record.
    pub async fn process(
        &self,
        image: &ImageRef,
        token: &CancellationToken,
    ) -> Result<ImageMetadata, CrawlError> {
        if !matches!(image.src.scheme(), "http" | "https") {
            return Err(CrawlError::InvalidUrl(image.src.to_string()));
        }

        let bytes = self.download(&image.src, token).await?;

        let desired = filename_from_url(&image.src);
        let (filename, mut file) = self.claim_filename(&desired).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        debug!(
            "saved {} as {} ({})",
            image.src,
            filename,
            crate::utils::format_bytes(bytes.len())
        );

        let mut record = ImageMetadata::new(image.src.to_string(), filename.clone());
        record.alt = image.alt.clone();
        record.title = image.title.clone();

        match image::load_from_memory(&bytes) {
            Ok(decoded) => {
                let (width, height) = decoded.dimensions();
                record.width = width;
                record.height = height;
                record.format = sniff_format(&bytes);

                let thumb_path = self.image_dir.join(format!("{filename}.thumb.png"));
                match write_thumbnail(&decoded, self.max_thumbnail_width, &thumb_path).await {
                    Ok(()) => record.thumbnail_path = Some(thumb_path.display().to_string()),
                    Err(e) => warn!("thumbnail for {} failed: {}", image.src, e),
                }
            }
            Err(_) if is_svg(&bytes) => {
                record.format = "svg".to_string();
                if let Some(template) = &self.rasterizer {
                    let thumb_path = self.image_dir.join(format!("{filename}.thumb.png"));
                    let input_path = self.image_dir.join(&filename);
                    match rasterize_svg(template, self.max_thumbnail_width, &thumb_path, &input_path)
                        .await
                    {
                        Ok(()) => record.thumbnail_path = Some(thumb_path.display().to_string()),
                        Err(e) => warn!("rasterizing {} failed: {}", image.src, e),
                    }
                }
            }
            Err(e) => {
                warn!("unknown image format for {}: {}", image.src, e);
            }
        }

        self.store.insert(&record).await?;
        Ok(record)
    }

    async fn download(
        &self,
        url: &url::Url,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, CrawlError> {
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

        let bytes = tokio::select! {
            _ = token.cancelled() => return Err(CrawlError::Cancelled),
            result = response.bytes() => result?,
        };
        Ok(bytes.to_vec())
    }

    /// Probe `name`, `name-1`, `name-2`, ... and claim the first unused
    /// one with an exclusive create, so concurrent workers can never pick
    /// the same name.
    async fn claim_filename(&self, desired: &str) -> Result<(String, tokio::fs::File), CrawlError> {
        let path = Path::new(desired);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(desired)
            .to_string();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        for attempt in 0..u32::MAX {
            let candidate = if attempt == 0 {
                desired.to_string()
            } else {
                format!("{stem}-{attempt}{ext}")
            };

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.image_dir.join(&candidate))
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(CrawlError::IoError(format!(
            "no free filename for {desired}"
        )))
    }
}

/// Scale an image down to at most `max_width`, preserving aspect ratio.
///
/// Images at or under the limit are returned unscaled. Uses
/// nearest-neighbor sampling: destination pixel (x, y) reads source pixel
/// (x * srcW / dstW, y * srcH / dstH).
pub fn scale_to_width(image: &DynamicImage, max_width: u32) -> DynamicImage {
    let (src_w, src_h) = image.dimensions();
    if src_w <= max_width {
        return image.clone();
    }

    let dst_w = max_width;
    let dst_h = ((dst_w as u64 * src_h as u64) / src_w as u64).max(1) as u32;

    let source = image.to_rgba8();
    let mut scaled = RgbaImage::new(dst_w, dst_h);
    for y in 0..dst_h {
        for x in 0..dst_w {
            let src_x = (x as u64 * src_w as u64 / dst_w as u64) as u32;
            let src_y = (y as u64 * src_h as u64 / dst_h as u64) as u32;
            scaled.put_pixel(x, y, *source.get_pixel(src_x, src_y));
        }
    }

    DynamicImage::ImageRgba8(scaled)
}

async fn write_thumbnail(
    image: &DynamicImage,
    max_width: u32,
    path: &Path,
) -> Result<(), CrawlError> {
    let thumbnail = scale_to_width(image, max_width);

    let mut png_data = Vec::new();
    thumbnail
        .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| CrawlError::ThumbnailFailed(e.to_string()))?;

    tokio::fs::write(path, png_data).await?;
    Ok(())
}

/// Sniff for SVG markup: a leading XML declaration or an `<svg` tag.
pub fn is_svg(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start();
    trimmed.starts_with("<?xml") || trimmed.contains("<svg")
}

fn sniff_format(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("")
        .to_string()
}

/// Run the configured rasterizer command with the width, output path and
/// input path substituted into the template. Success is the process exit
/// status; the call is not separately timed out.
async fn rasterize_svg(
    template: &str,
    width: u32,
    output: &Path,
    input: &Path,
) -> Result<(), CrawlError> {
    let command = template
        .replace("{width}", &width.to_string())
        .replace("{output}", &output.display().to_string())
        .replace("{input}", &input.display().to_string());

    let status = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(&command)
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(CrawlError::RasterizerFailed(format!(
            "`{command}` exited with {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ImageQuery, SqliteMetadataStore};
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.put_pixel(x, y, Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]));
            }
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_scale_wide_image_to_max_width() {
        let image = gradient(400, 300);
        let scaled = scale_to_width(&image, 200);
        assert_eq!(scaled.dimensions(), (200, 150));
    }

    #[test]
    fn test_scale_preserves_aspect_with_rounding() {
        let image = gradient(333, 100);
        let scaled = scale_to_width(&image, 200);
        // 200 * 100 / 333 = 60 with integer division
        assert_eq!(scaled.dimensions(), (200, 60));
    }

    #[test]
    fn test_no_scaling_at_or_under_max_width() {
        let image = gradient(200, 80);
        assert_eq!(scale_to_width(&image, 200).dimensions(), (200, 80));

        let image = gradient(120, 90);
        assert_eq!(scale_to_width(&image, 200).dimensions(), (120, 90));
    }

    #[test]
    fn test_scale_samples_nearest_source_pixel() {
        let image = gradient(100, 100);
        let scaled = scale_to_width(&image, 50).to_rgba8();
        // Destination (10, 10) must read source (10*100/50, 10*100/50) = (20, 20).
        assert_eq!(scaled.get_pixel(10, 10), &Rgba([20, 20, 0, 255]));
    }

    #[test]
    fn test_is_svg() {
        assert!(is_svg(b"<?xml version=\"1.0\"?><svg></svg>"));
        assert!(is_svg(b"  <svg xmlns=\"http://www.w3.org/2000/svg\"/>"));
        assert!(!is_svg(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_svg(b"plain text"));
    }

    #[test]
    fn test_sniff_format() {
        let mut png_data = Vec::new();
        gradient(4, 4)
            .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(sniff_format(&png_data), "png");
        assert_eq!(sniff_format(b"not an image"), "");
    }

    async fn test_processor(image_dir: &Path) -> ImageProcessor {
        let store = Arc::new(SqliteMetadataStore::in_memory().await.unwrap());
        let config = Config {
            image_dir: image_dir.to_path_buf(),
            render_js: false,
            ..Default::default()
        };
        ImageProcessor::new(&config, store).unwrap()
    }

    #[tokio::test]
    async fn test_claim_filename_suffixes_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let processor = test_processor(dir.path()).await;

        let (first, _f1) = processor.claim_filename("logo.png").await.unwrap();
        let (second, _f2) = processor.claim_filename("logo.png").await.unwrap();
        let (third, _f3) = processor.claim_filename("logo.png").await.unwrap();

        assert_eq!(first, "logo.png");
        assert_eq!(second, "logo-1.png");
        assert_eq!(third, "logo-2.png");
        assert!(dir.path().join("logo-2.png").exists());
    }

    #[tokio::test]
    async fn test_claim_filename_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let processor = test_processor(dir.path()).await;

        let (first, _f1) = processor.claim_filename("favicon").await.unwrap();
        let (second, _f2) = processor.claim_filename("favicon").await.unwrap();

        assert_eq!(first, "favicon");
        assert_eq!(second, "favicon-1");
    }

    #[tokio::test]
    async fn test_data_uri_is_rejected_without_download_or_record() {
        let dir = tempfile::tempdir().unwrap();
        let processor = test_processor(dir.path()).await;

        let image = ImageRef {
            src: url::Url::parse("data:image/png;base64,iVBORw0KGgo=").unwrap(),
            alt: String::new(),
            title: String::new(),
        };

        let token = CancellationToken::new();
        let result = processor.process(&image, &token).await;
        assert!(matches!(result, Err(CrawlError::InvalidUrl(_))));

        let records = processor.store.query(&ImageQuery::default()).await.unwrap();
        assert!(records.is_empty());
        // Nothing was written to the image directory either.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
