//! Sweeps over Zarr arrays on disk.

use std::sync::Arc;

use chunk_engine::{
    ChunkCollector, ChunkComputation, ChunkFormat, ChunkPosition, ChunkProducer, DataType,
    ExpressionFunction, GridChunkConsumer, GridChunkProducer, GridInfo, PoolProcessor, SharedGrid,
    ZarrGrid,
};
use grid_expression::{ExpressionParser, Grammar};
use test_utils::{assert_approx_eq, formats, shapes, temperature_grid, zarr_grid, zarr_store};

#[test]
fn test_metadata_survives_reopen() {
    let store = zarr_store();
    let shape = shapes::RAGGED;
    let values = temperature_grid(shape.rows, shape.cols);
    zarr_grid(store.path(), "t2m", shape, formats::packed_short(), &values).unwrap();

    let reopened = ZarrGrid::open(store.path(), "t2m").unwrap();
    let info = chunk_engine::GridStorage::info(&reopened);
    assert_eq!(info.dims, shape.dims());
    assert_eq!(info.tile_dims, shape.tile());
    assert_eq!(info.format, formats::packed_short());
}

#[test]
fn test_unsigned_storage_round_trip() {
    let store = zarr_store();
    let shape = shapes::SINGLE_TILE;
    let mut values: Vec<f64> = (0..shape.size()).map(|i| (i * 7) as f64).collect();
    values[34] = 300.0;
    let grid = zarr_grid(store.path(), "mask", shape, formats::unsigned_byte(), &values).unwrap();
    let read = grid
        .read(&ChunkPosition::new([0, 0], shape.dims()))
        .unwrap()
        .to_double_array()
        .unwrap();
    assert_eq!(read[30], 210.0);
    assert!(read[34].is_nan());

    let reopened = ZarrGrid::open(store.path(), "mask").unwrap();
    assert!(chunk_engine::GridStorage::info(&reopened).format.unsigned);
}

#[test]
fn test_unsigned_long_survives_reopen() {
    let store = zarr_store();
    let shape = shapes::SINGLE_TILE;
    let format = ChunkFormat::new(DataType::Long).with_unsigned(true);
    let values: Vec<f64> = (0..shape.size()).map(|i| (i * 3) as f64).collect();
    zarr_grid(store.path(), "counts", shape, format, &values).unwrap();

    let reopened = SharedGrid::new(ZarrGrid::open(store.path(), "counts").unwrap());
    assert_eq!(reopened.format(), &format);
    let read = reopened
        .read(&ChunkPosition::new([0, 0], shape.dims()))
        .unwrap()
        .to_double_array()
        .unwrap();
    assert_eq!(read, values);
}

#[test]
fn test_expression_sweep_into_staging_array() {
    let store = zarr_store();
    let root = store.path();
    let shape = shapes::RAGGED;
    let kelvin = temperature_grid(shape.rows, shape.cols);
    let input = zarr_grid(root, "t2m", shape, formats::float(), &kelvin).unwrap();

    let info = GridInfo::new("celsius.partial", shape.dims(), shape.tile(), formats::packed_short());
    let output = SharedGrid::new(ZarrGrid::create(root, info).unwrap());

    let mut collector = ChunkCollector::new();
    let function = ExpressionFunction::compile(
        &ExpressionParser::new(Grammar::Modern),
        "celsius = t2m - 273.15",
        &mut collector,
        |name| {
            Ok((name == "t2m")
                .then(|| Arc::new(GridChunkProducer::new(input.clone())) as Arc<dyn ChunkProducer>))
        },
        output.info().prototype(),
        false,
    )
    .unwrap();
    let consumer = GridChunkConsumer::new(output.clone()).unwrap();
    let computation = ChunkComputation::new(collector, Arc::new(function), Arc::new(consumer));

    let mut processor = PoolProcessor::new();
    processor.set_max_operations(3).unwrap();
    processor
        .init(output.native_scheme().unwrap().positions(), Arc::new(computation))
        .unwrap();
    processor.run().unwrap();
    output.flush().unwrap();
    drop(output);

    ZarrGrid::rename(root, "celsius.partial", "celsius").unwrap();
    assert!(!ZarrGrid::exists(root, "celsius.partial"));
    assert_eq!(ZarrGrid::list(root).unwrap(), vec!["celsius", "t2m"]);

    let mut celsius = ZarrGrid::open(root, "celsius").unwrap();
    let whole = ChunkPosition::new([0, 0], shape.dims());
    let values = chunk_engine::GridStorage::read(&mut celsius, &whole)
        .unwrap()
        .to_double_array()
        .unwrap();
    for (c, k) in values.iter().zip(&kelvin) {
        assert_approx_eq!(*c, *k - 273.15, 0.006);
    }
}
