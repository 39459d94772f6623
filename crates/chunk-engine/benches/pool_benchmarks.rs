//! Benchmarks for the chunk engine - serial vs pooled expression sweeps.
//!
//! Run with: cargo bench --package chunk-engine --bench pool_benchmarks

use std::sync::Arc;

use chunk_engine::{
    ChunkCollector, ChunkComputation, ChunkFormat, ChunkPosition, ChunkProducer, DataChunk,
    DataType, ExpressionFunction, GridChunkConsumer, GridChunkProducer, GridInfo, MemoryGrid,
    PackingScheme, PoolProcessor, SharedGrid,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grid_expression::{ExpressionParser, Grammar};
use rand::Rng;

const ROWS: usize = 1024;
const COLS: usize = 1024;

/// Temperature-like values in Kelvin with noise.
fn generate_temperature_grid(rows: usize, cols: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let lat_factor = (row as f64 / rows as f64 - 0.5) * 60.0;
            let lon_factor = ((col as f64 / cols as f64) * std::f64::consts::PI * 4.0).sin() * 5.0;
            data.push(273.15 + lat_factor + lon_factor + rng.gen_range(-3.0..3.0));
        }
    }
    data
}

fn packed_short() -> ChunkFormat {
    ChunkFormat::new(DataType::Short)
        .with_missing(Some(f64::from(i16::MIN)))
        .with_packing(PackingScheme::new(0.01, 0.0, DataType::Float).ok())
}

fn input_grids() -> (SharedGrid, SharedGrid) {
    let format = ChunkFormat::new(DataType::Float);
    let t = MemoryGrid::from_doubles(
        GridInfo::new("t", [ROWS, COLS], [256, 256], format),
        &generate_temperature_grid(ROWS, COLS),
    )
    .unwrap();
    let d = MemoryGrid::from_doubles(
        GridInfo::new("d", [ROWS, COLS], [256, 256], format),
        &generate_temperature_grid(ROWS, COLS),
    )
    .unwrap();
    (SharedGrid::new(t), SharedGrid::new(d))
}

fn run_sweep(t: &SharedGrid, d: &SharedGrid, tile: usize, threads: usize) {
    let output = SharedGrid::new(
        MemoryGrid::new(GridInfo::new("rh", [ROWS, COLS], [tile, tile], packed_short())).unwrap(),
    );
    let mut collector = ChunkCollector::new();
    let function = ExpressionFunction::compile(
        &ExpressionParser::new(Grammar::Modern),
        "rh = 100 * exp(17.625 * (d - 273.15) / (d - 30.11)) / exp(17.625 * (t - 273.15) / (t - 30.11))",
        &mut collector,
        |name| {
            let grid = match name {
                "t" => t,
                "d" => d,
                _ => return Ok(None),
            };
            Ok(Some(Arc::new(GridChunkProducer::new(grid.clone())) as Arc<dyn ChunkProducer>))
        },
        DataChunk::prototype(packed_short()),
        false,
    )
    .unwrap();
    let consumer = GridChunkConsumer::new(output.clone()).unwrap();
    let computation = ChunkComputation::new(collector, Arc::new(function), Arc::new(consumer));

    let mut processor = PoolProcessor::new();
    processor.set_max_operations(threads).unwrap();
    processor
        .init(output.native_scheme().unwrap().positions(), Arc::new(computation))
        .unwrap();
    black_box(processor.run().unwrap());
}

fn bench_thread_counts(c: &mut Criterion) {
    let (t, d) = input_grids();
    let mut group = c.benchmark_group("expression_sweep");
    group.throughput(Throughput::Elements((ROWS * COLS) as u64));
    group.sample_size(10);

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| run_sweep(&t, &d, 256, threads));
        });
    }
    group.finish();
}

fn bench_tile_sizes(c: &mut Criterion) {
    let (t, d) = input_grids();
    let mut group = c.benchmark_group("tile_size");
    group.throughput(Throughput::Elements((ROWS * COLS) as u64));
    group.sample_size(10);

    for tile in [64, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("pooled", tile), &tile, |b, &tile| {
            b.iter(|| run_sweep(&t, &d, tile, 4));
        });
    }
    group.finish();
}

fn bench_chunk_decode(c: &mut Criterion) {
    let values = generate_temperature_grid(256, 256);
    let chunk = DataChunk::from_doubles(packed_short(), &values).unwrap();
    let mut group = c.benchmark_group("chunk_codec");
    group.throughput(Throughput::Elements(values.len() as u64));

    group.bench_function("decode_packed_short", |b| {
        b.iter(|| black_box(chunk.to_double_array().unwrap()));
    });
    group.bench_function("encode_packed_short", |b| {
        b.iter(|| black_box(DataChunk::prototype(packed_short()).from_double_array(&values).unwrap()));
    });
    group.bench_function("read_tile", |b| {
        let grid = MemoryGrid::from_doubles(
            GridInfo::new("t", [256, 256], [64, 64], packed_short()),
            &values,
        )
        .unwrap();
        let grid = SharedGrid::new(grid);
        let position = ChunkPosition::new([64, 64], [64, 64]);
        b.iter(|| black_box(grid.read(&position).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_thread_counts, bench_tile_sizes, bench_chunk_decode);
criterion_main!(benches);
