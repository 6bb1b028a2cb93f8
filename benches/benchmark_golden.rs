use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use snax_datagen::{
    golden::{block_gemm, conv2d, ConvShape, GemmOptions, GemmShape, Stationarity},
    quantize::{ChannelQuantization, ZeroShiftPolicy},
};

pub fn gemm_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockGemm");
    for blocks in [1usize, 2, 4, 8] {
        let shape = GemmShape {
            m: blocks,
            k: blocks,
            n: blocks,
            mesh_row: 8,
            tile_size: 8,
            mesh_col: 8,
        };
        let mut rng = fastrand::Rng::with_seed(0);
        let a: Vec<i8> = (0..shape.a_len()).map(|_| rng.i8(..)).collect();
        let b: Vec<i8> = (0..shape.b_len()).map(|_| rng.i8(..)).collect();
        let bias: Vec<i32> = (0..shape.c_len()).map(|_| rng.i32(..)).collect();
        let options = GemmOptions {
            subtraction_a: 0,
            subtraction_b: 0,
            transposed_a: false,
            transposed_b: false,
            stationarity: Stationarity::Output,
        };
        group.throughput(criterion::Throughput::Elements((blocks * blocks * blocks) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &blocks, |bench, _| {
            bench.iter(|| block_gemm(&shape, &a, &b, &bias, &options).unwrap())
        });
    }
    group.finish();
}

pub fn conv_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Conv2d");
    for size in [8usize, 16, 32] {
        let shape = ConvShape {
            nbatch: 1,
            cin: 16,
            h: size,
            w: size,
            cout: 16,
            kh: 3,
            kw: 3,
            stride_h: 1,
            stride_w: 1,
            pad_h: 1,
            pad_w: 1,
            mesh_row: 8,
            tile_size: 8,
            mesh_col: 8,
        };
        let mut rng = fastrand::Rng::with_seed(0);
        let input: Vec<i8> = (0..16 * size * size).map(|_| rng.i8(-10..10)).collect();
        let kernel: Vec<i8> = (0..16 * 16 * 9).map(|_| rng.i8(-10..10)).collect();
        group.throughput(criterion::Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bench, _| {
            bench.iter(|| conv2d(&shape, &input, &kernel).unwrap())
        });
    }
    group.finish();
}

pub fn requantize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Requantize");
    let quant = ChannelQuantization {
        input_zp: 3,
        output_zp: -5,
        min_int: i8::MIN as i32,
        max_int: i8::MAX as i32,
        double_round: true,
        shifts: vec![37; 8],
        multipliers: vec![1_140_768_826; 8],
    };
    for power in [8, 12, 16] {
        let size = 1usize << power;
        let mut rng = fastrand::Rng::with_seed(0);
        let data: Vec<i32> = (0..size).map(|_| rng.i32(..)).collect();
        group.throughput(criterion::Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bench, _| {
            bench.iter(|| quant.requantize(&data, ZeroShiftPolicy::NoBias).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, gemm_benchmark, conv_benchmark, requantize_benchmark);
criterion_main!(benches);
