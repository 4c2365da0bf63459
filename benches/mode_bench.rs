//! Benchmarks for dchmod
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dchmod::catalog::{Catalog, EntryType, FileEntry};
use dchmod::collective::SoloGroup;
use dchmod::mode::{compile, ModeBits};

fn benchmark_compile(c: &mut Criterion) {
    c.bench_function("compile_octal", |b| {
        b.iter(|| black_box(compile(black_box("2775")).unwrap()))
    });

    c.bench_function("compile_symbolic", |b| {
        b.iter(|| black_box(compile(black_box("ug+rwX,a-rwx,g=u")).unwrap()))
    });
}

fn benchmark_apply(c: &mut Criterion) {
    let spec = compile("ug+rwX,a-rwx,g=u").unwrap();
    let current = ModeBits::from_mode(0o2644);

    c.bench_function("apply_symbolic_file", |b| {
        b.iter(|| black_box(spec.apply(black_box(current), EntryType::Regular)))
    });

    c.bench_function("apply_symbolic_dir", |b| {
        b.iter(|| black_box(spec.apply(black_box(current), EntryType::Directory)))
    });
}

fn benchmark_array_by_depth(c: &mut Criterion) {
    let catalog: Catalog = (0..100_000u32)
        .map(|i| FileEntry {
            path: format!("/data/{i}").into(),
            uid: 1000,
            gid: 1000,
            mode: ModeBits::from_mode(0o644),
            entry_type: EntryType::Regular,
            depth: i % 16,
        })
        .collect();

    c.bench_function("array_by_depth_100k", |b| {
        b.iter(|| black_box(catalog.array_by_depth(&SoloGroup)))
    });
}

criterion_group!(benches, benchmark_compile, benchmark_apply, benchmark_array_by_depth);
criterion_main!(benches);
