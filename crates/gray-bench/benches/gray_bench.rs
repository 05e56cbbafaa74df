//! Benchmarks for grayscale conversion.
//!
//! Run with: `cargo bench -p gray-bench` (add `--features wgpu` or
//! `--features cuda` to include GPU backends).

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use gray_compute::backend::{CpuPrimitives, DEFAULT_GROUP_SIZE};
use gray_compute::{Backend, Pixel, Processor, luma_bt601, run_grayscale};

fn test_pixels(n: usize) -> Vec<Pixel> {
    (0..n)
        .map(|i| Pixel::rgb((i * 7) as u8, (i * 13) as u8, (i * 31) as u8))
        .collect()
}

/// Benchmark the scalar luma function.
fn bench_luma(c: &mut Criterion) {
    let mut group = c.benchmark_group("luma");
    let pixels = test_pixels(100_000);
    group.throughput(Throughput::Elements(pixels.len() as u64));

    group.bench_function("bt601_scalar", |b| {
        b.iter(|| {
            pixels.iter()
                .map(|p| luma_bt601(black_box(p.r), black_box(p.g), black_box(p.b)))
                .fold(0u32, |acc, g| acc.wrapping_add(g as u32))
        })
    });

    group.finish();
}

/// Benchmark full orchestration (allocate, copy, launch, copy back) per backend.
fn bench_grayscale(c: &mut Criterion) {
    let mut group = c.benchmark_group("grayscale");

    let mut backends = vec![Backend::Cpu];
    for backend in [Backend::Wgpu, Backend::Cuda] {
        if backend.is_available() {
            backends.push(backend);
        }
    }

    for backend in backends {
        let proc = match Processor::new(backend) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("skipping {}: {e}", backend.name());
                continue;
            }
        };

        for size in [1_000usize, 100_000, 1920 * 1080] {
            let mut pixels = test_pixels(size);
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::new(proc.backend_name(), size),
                &size,
                |b, _| b.iter(|| proc.grayscale(black_box(&mut pixels))),
            );
        }
    }

    group.finish();
}

/// Benchmark CPU group sizes.
fn bench_group_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_size");
    let cpu = CpuPrimitives::new();
    let mut pixels = test_pixels(1920 * 1080);
    group.throughput(Throughput::Elements(pixels.len() as u64));

    for group_size in [64, DEFAULT_GROUP_SIZE, 4096, 65536] {
        group.bench_with_input(
            BenchmarkId::new("cpu", group_size),
            &group_size,
            |b, &gs| b.iter(|| run_grayscale(&cpu, black_box(&mut pixels), gs)),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_luma,
    bench_grayscale,
    bench_group_size,
);

criterion_main!(benches);
