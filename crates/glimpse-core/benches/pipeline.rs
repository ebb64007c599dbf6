//! Benchmarks for the Glimpse image pipeline.
//!
//! Run with: cargo bench -p glimpse-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glimpse_core::pipeline::{ThumbnailGenerator, to_data_uri};
use glimpse_core::{CompressionPolicy, ImageNormalizer, ImageSource};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, format)
        .expect("encode benchmark image");
    buffer.into_inner()
}

fn benchmark_passthrough(c: &mut Criterion) {
    use base64::Engine as _;

    let png = encoded_image(1024, 768, ImageFormat::Png);
    let uri = to_data_uri(
        "image/png",
        &base64::engine::general_purpose::STANDARD.encode(&png),
    );
    let normalizer = ImageNormalizer::new(CompressionPolicy {
        auto_compress: false,
        max_size_bytes: 0,
    });

    c.bench_function("normalize_passthrough_data_uri", |b| {
        b.iter(|| normalizer.normalize(black_box(ImageSource::DataUri(uri.clone()))))
    });
}

fn benchmark_within_budget(c: &mut Criterion) {
    let jpeg = encoded_image(800, 600, ImageFormat::Jpeg);
    let normalizer = ImageNormalizer::new(CompressionPolicy {
        auto_compress: true,
        max_size_bytes: 10 * 1024 * 1024,
    });

    c.bench_function("normalize_within_budget", |b| {
        b.iter(|| normalizer.normalize(black_box(ImageSource::Bytes(jpeg.clone()))))
    });
}

fn benchmark_downscale(c: &mut Criterion) {
    let png = encoded_image(3000, 2000, ImageFormat::Png);
    let normalizer = ImageNormalizer::new(CompressionPolicy {
        auto_compress: true,
        max_size_bytes: 2048 * 1024,
    });

    let mut group = c.benchmark_group("normalize_downscale");
    group.sample_size(10);
    group.bench_function("3000x2000_png", |b| {
        b.iter(|| normalizer.normalize(black_box(ImageSource::Bytes(png.clone()))))
    });
    group.finish();
}

fn benchmark_thumbnail(c: &mut Criterion) {
    let jpeg = encoded_image(1920, 1080, ImageFormat::Jpeg);
    let generator = ThumbnailGenerator::default();

    c.bench_function("thumbnail_1920x1080", |b| {
        b.iter(|| generator.generate_bytes(black_box(ImageSource::Bytes(jpeg.clone()))))
    });
}

criterion_group!(
    benches,
    benchmark_passthrough,
    benchmark_within_budget,
    benchmark_downscale,
    benchmark_thumbnail
);
criterion_main!(benches);
