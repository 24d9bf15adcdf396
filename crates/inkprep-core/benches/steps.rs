//! Benchmarks for representative preprocessing steps.
//!
//! Run with: cargo bench -p inkprep-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use inkprep_core::steps::{
    AdaptiveThreshold, Deskew, MedianBlur, NlMeansDenoise, Skeletonize, Threshold,
};
use inkprep_core::{StepConfig, StepRegistry, Transform};

/// A synthetic text-like page: dark strokes on a light, slightly noisy page.
fn page(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        let stroke = (y / 6) % 4 == 0 && (x / 9) % 3 != 0;
        let noise = ((x * 7 + y * 13) % 11) as u8;
        Luma([if stroke { 20 + noise } else { 230 + noise }])
    }))
}

fn benchmark_threshold(c: &mut Criterion) {
    let img = page(1024, 1024);
    let step = Threshold::default();

    c.bench_function("threshold_otsu_1024", |b| {
        b.iter(|| {
            let _ = step.transform(black_box(&img));
        })
    });
}

fn benchmark_adaptive_threshold(c: &mut Criterion) {
    let img = page(1024, 1024);
    let step = AdaptiveThreshold::default();

    c.bench_function("adaptive_threshold_gaussian_1024", |b| {
        b.iter(|| {
            let _ = step.transform(black_box(&img));
        })
    });
}

fn benchmark_median_blur(c: &mut Criterion) {
    let img = page(1024, 1024);
    let step = MedianBlur::default();

    c.bench_function("median_blur_5_1024", |b| {
        b.iter(|| {
            let _ = step.transform(black_box(&img));
        })
    });
}

fn benchmark_deskew(c: &mut Criterion) {
    let img = page(800, 800);

    c.bench_function("deskew_800", |b| {
        b.iter(|| {
            let _ = Deskew {}.transform(black_box(&img));
        })
    });
}

fn benchmark_skeletonize(c: &mut Criterion) {
    let img = page(256, 256);

    c.bench_function("skeletonize_256", |b| {
        b.iter(|| {
            let _ = Skeletonize {}.transform(black_box(&img));
        })
    });
}

fn benchmark_nlmeans(c: &mut Criterion) {
    let img = page(128, 128);
    let step = NlMeansDenoise::default();

    let mut group = c.benchmark_group("nlmeans");
    group.sample_size(10);
    group.bench_function("nlmeans_default_128", |b| {
        b.iter(|| {
            let _ = step.transform(black_box(&img));
        })
    });
    group.finish();
}

fn benchmark_plan(c: &mut Criterion) {
    let registry = StepRegistry::with_builtin_steps();
    let steps: Vec<StepConfig> = registry.names().map(StepConfig::new).collect();

    c.bench_function("plan_all_builtin_steps", |b| {
        b.iter(|| {
            let _ = registry.plan(black_box(&steps));
        })
    });
}

criterion_group!(
    benches,
    benchmark_threshold,
    benchmark_adaptive_threshold,
    benchmark_median_blur,
    benchmark_deskew,
    benchmark_skeletonize,
    benchmark_nlmeans,
    benchmark_plan,
);
criterion_main!(benches);
