//! Assignment kernel throughput benchmarks
//!
//! Measures strided execution of prebuilt kernels:
//! - Numeric conversion with and without checking
//! - Option composition at different NA densities
//! - Field-wise struct assignment
//! - Buffered expression evaluation at different chunk sizes

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use continuum_assign::{AssignEngine, ChunkConfig, EvalContext, KernelRequest};
use continuum_ndt::{ErrorMode, Type};

const POPULATION: usize = 10_000;

fn bench_numeric(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_i32_to_f64");
    group.throughput(Throughput::Elements(POPULATION as u64));

    let engine = AssignEngine::default();
    let src: Vec<i32> = (0..POPULATION as i32).collect();
    let mut dst = vec![0f64; POPULATION];

    for mode in [ErrorMode::NoCheck, ErrorMode::Inexact] {
        let kernel = engine
            .build(&Type::float64(), &Type::int32(), mode, KernelRequest::Strided)
            .unwrap();
        group.bench_function(BenchmarkId::from_parameter(mode), |b| {
            b.iter(|| kernel.assign_slice(black_box(&mut dst), black_box(&src)).unwrap())
        });
    }

    let narrowing = engine
        .build(&Type::int8(), &Type::int64(), ErrorMode::Overflow, KernelRequest::Strided)
        .unwrap();
    let wide: Vec<i64> = (0..POPULATION as i64).map(|i| i % 100).collect();
    let mut narrow = vec![0i8; POPULATION];
    group.bench_function("int64_to_int8_overflow", |b| {
        b.iter(|| narrowing.assign_slice(black_box(&mut narrow), black_box(&wide)).unwrap())
    });

    group.finish();
}

fn bench_option(c: &mut Criterion) {
    let mut group = c.benchmark_group("option_i32_to_f64");
    group.throughput(Throughput::Elements(POPULATION as u64));

    let engine = AssignEngine::default();
    let kernel = engine
        .build(
            &Type::option(Type::float64()),
            &Type::option(Type::int32()),
            ErrorMode::Fractional,
            KernelRequest::Strided,
        )
        .unwrap();
    let mut dst = vec![0f64; POPULATION];

    // NA every `period` elements
    for period in [0usize, 2, 16, 1024] {
        let src: Vec<i32> = (0..POPULATION)
            .map(|i| if period > 0 && i % period == 0 { i32::MIN } else { i as i32 })
            .collect();
        group.bench_with_input(BenchmarkId::new("na_period", period), &src, |b, src| {
            b.iter(|| unsafe {
                let src = black_box(src.as_ptr()).cast();
                kernel.strided(dst.as_mut_ptr().cast(), 8, src, 4, POPULATION).unwrap()
            })
        });
    }

    group.finish();
}

// Fields are only read through raw pointers by the kernel.
#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Sample {
    x: i32,
    y: f64,
    z: i16,
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Reordered {
    y: f32,
    z: i32,
    x: u8,
}

fn bench_struct(c: &mut Criterion) {
    let mut group = c.benchmark_group("struct_permutation");
    group.throughput(Throughput::Elements(POPULATION as u64));

    let src_tp = Type::structure([
        ("x", Type::int32()),
        ("y", Type::float64()),
        ("z", Type::int16()),
    ])
    .unwrap();
    let dst_tp = Type::structure([
        ("y", Type::float32()),
        ("z", Type::int32()),
        ("x", Type::uint8()),
    ])
    .unwrap();
    let kernel = AssignEngine::default()
        .build(&dst_tp, &src_tp, ErrorMode::NoCheck, KernelRequest::Strided)
        .unwrap();

    let src: Vec<Sample> = (0..POPULATION)
        .map(|i| Sample {
            x: (i % 200) as i32,
            y: i as f64 * 0.5,
            z: (i % 1000) as i16,
        })
        .collect();
    let mut dst = vec![Reordered::default(); POPULATION];

    group.bench_function("nocheck", |b| {
        b.iter(|| unsafe {
            kernel
                .strided(
                    dst.as_mut_ptr().cast(),
                    size_of::<Reordered>() as isize,
                    black_box(src.as_ptr()).cast(),
                    size_of::<Sample>() as isize,
                    POPULATION,
                )
                .unwrap()
        })
    });

    group.finish();
}

fn bench_buffered(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffered_byteswap");
    group.throughput(Throughput::Elements(POPULATION as u64));

    let src_tp = Type::byteswap(Type::int32()).unwrap();
    let src: Vec<i32> = (0..POPULATION as i32).map(i32::swap_bytes).collect();
    let mut dst = vec![0f64; POPULATION];

    for chunk_size in [16, 128, 1024, 4096] {
        let engine = AssignEngine::new(EvalContext {
            chunk: ChunkConfig::new(chunk_size),
            ..EvalContext::default()
        });
        let kernel = engine
            .build(&Type::float64(), &src_tp, ErrorMode::NoCheck, KernelRequest::Strided)
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, _| {
            b.iter(|| unsafe {
                let src = black_box(src.as_ptr()).cast();
                kernel.strided(dst.as_mut_ptr().cast(), 8, src, 4, POPULATION).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_numeric, bench_option, bench_struct, bench_buffered);
criterion_main!(benches);
