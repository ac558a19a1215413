use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image_crawler::{extract_content, sanitize_url, scale_to_width, url_safe_filename, Config};
use std::time::Duration;
use url::Url;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_config_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let config = Config::default();
            black_box(config);
        });
    });

    group.finish();
}

fn benchmark_url_sanitization(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_sanitization");
    configure_fast_group(&mut group);

    let base = Url::parse("https://example.com/articles/page.html").unwrap();
    let candidates = vec![
        "https://example.com/absolute",
        "/relative/path.png",
        "data:image/png;base64,iVBORw0KGgo=",
        "mailto:someone@example.com",
        "  ../up/and/over.html  ",
    ];

    group.bench_function("sanitize", |b| {
        b.iter(|| {
            for candidate in &candidates {
                let result = sanitize_url(candidate, &base);
                let _ = black_box(result);
            }
        });
    });

    group.finish();
}

fn benchmark_filename_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename_derivation");
    configure_fast_group(&mut group);

    let urls = vec![
        "https://example.com/images/photo.png",
        "https://example.com/a/very/deep/path/with?query=strings&and=more",
        "https://example.com/",
    ];

    group.bench_function("url_safe", |b| {
        b.iter(|| {
            for url in &urls {
                let result = url_safe_filename(url);
                let _ = black_box(result);
            }
        });
    });

    group.finish();
}

fn benchmark_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    configure_fast_group(&mut group);

    let base = Url::parse("https://example.com/").unwrap();
    let mut html = String::from("<html><body>");
    for i in 0..100 {
        html.push_str(&format!(
            r#"<a href="/page-{i}">link</a><img src="/img-{i}.png" alt="pic {i}">"#
        ));
    }
    html.push_str("</body></html>");

    group.bench_function("links_and_images", |b| {
        b.iter(|| {
            let content = extract_content(&html, &base);
            black_box(content);
        });
    });

    group.finish();
}

fn benchmark_thumbnail_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thumbnail");
    configure_fast_group(&mut group);

    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        800,
        600,
        image::Rgba([64, 128, 192, 255]),
    ));

    group.bench_function("scale_to_width", |b| {
        b.iter(|| {
            let scaled = scale_to_width(&image, 200);
            black_box(scaled);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_config_creation,
    benchmark_url_sanitization,
    benchmark_filename_derivation,
    benchmark_extraction,
    benchmark_thumbnail_scaling
);
criterion_main!(benches);
