//! Link and image extraction from fetched markup
//!
//! Walks the parsed document once per tag kind: anchors contribute
//! outbound links, image tags contribute image references. Every raw
//! `href`/`src` goes through the URL sanitizer before it is kept.

use crate::utils::sanitize_url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// An `<img>` reference found in a page, already resolved to an absolute
/// URL.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub src: Url,
    pub alt: String,
    pub title: String,
}

/// Everything the crawler cares about on one page.
#[derive(Debug, Default)]
pub struct ExtractedContent {
    /// Outbound links, deduplicated preserving first-seen order.
    pub links: Vec<Url>,
    /// Image references in encounter order; duplicates are kept.
    pub images: Vec<ImageRef>,
}

/// Extract links and image references from HTML markup.
///
/// `base` is the resolved URL of the page itself and anchors every
/// relative reference.
pub fn extract_content(html: &str, base: &Url) -> ExtractedContent {
    let document = Html::parse_document(html);

    // Constant selectors, known valid.
    let anchor_selector = Selector::parse("a[href]").unwrap();
    let image_selector = Selector::parse("img[src]").unwrap();

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(url) = sanitize_url(href, base) {
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }
    }

    let mut images = Vec::new();
    for element in document.select(&image_selector) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        if let Some(src) = sanitize_url(src, base) {
            images.push(ImageRef {
                src,
                alt: element.value().attr("alt").unwrap_or("").to_string(),
                title: element.value().attr("title").unwrap_or("").to_string(),
            });
        }
    }

    ExtractedContent { links, images }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page/").unwrap()
    }

    #[test]
    fn test_extract_links_resolves_relative() {
        let html = r#"<a href="/docs">Docs</a> <a href="other.html">Other</a>"#;
        let content = extract_content(html, &base());
        let links: Vec<_> = content.links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://example.com/docs",
                "https://example.com/page/other.html"
            ]
        );
    }

    #[test]
    fn test_extract_links_dedup_preserves_order() {
        let html = r#"
            <a href="/b">B</a>
            <a href="/a">A</a>
            <a href="/b">B again</a>
        "#;
        let content = extract_content(html, &base());
        let links: Vec<_> = content.links.iter().map(Url::as_str).collect();
        assert_eq!(links, vec!["https://example.com/b", "https://example.com/a"]);
    }

    #[test]
    fn test_extract_links_skips_non_http() {
        let html = r#"
            <a href="mailto:x@example.com">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="/real">Real</a>
        "#;
        let content = extract_content(html, &base());
        assert_eq!(content.links.len(), 1);
        assert_eq!(content.links[0].as_str(), "https://example.com/real");
    }

    #[test]
    fn test_extract_images_with_attributes() {
        let html = r#"<img src="/logo.png" alt="Logo" title="The logo">"#;
        let content = extract_content(html, &base());
        assert_eq!(content.images.len(), 1);
        let image = &content.images[0];
        assert_eq!(image.src.as_str(), "https://example.com/logo.png");
        assert_eq!(image.alt, "Logo");
        assert_eq!(image.title, "The logo");
    }

    #[test]
    fn test_extract_images_keep_duplicates_in_order() {
        let html = r#"
            <img src="/one.png">
            <img src="/two.png">
            <img src="/one.png">
        "#;
        let content = extract_content(html, &base());
        let sources: Vec<_> = content.images.iter().map(|i| i.src.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                "https://example.com/one.png",
                "https://example.com/two.png",
                "https://example.com/one.png"
            ]
        );
    }

    #[test]
    fn test_extract_images_skips_data_uri() {
        let html = r#"<img src="data:image/gif;base64,R0lGOD"> <img src="/real.png">"#;
        let content = extract_content(html, &base());
        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].src.as_str(), "https://example.com/real.png");
    }

    #[test]
    fn test_extract_missing_attributes_default_empty() {
        let html = r#"<img src="/bare.png">"#;
        let content = extract_content(html, &base());
        assert_eq!(content.images[0].alt, "");
        assert_eq!(content.images[0].title, "");
    }
}
