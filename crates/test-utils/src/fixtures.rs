//! Common grid fixtures for chunk engine tests.

use std::path::Path;

use chunk_engine::{
    ChunkFormat, ChunkPosition, GridInfo, GridStorage, MemoryGrid, Result, SharedGrid, ZarrGrid,
};
use tempfile::TempDir;

/// Grid shapes paired with a nominal tile size.
pub mod shapes {
    /// Dimensions and tile size of a test grid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GridShape {
        pub rows: usize,
        pub cols: usize,
        pub tile_rows: usize,
        pub tile_cols: usize,
    }

    impl GridShape {
        pub const fn dims(&self) -> [usize; 2] {
            [self.rows, self.cols]
        }

        pub const fn tile(&self) -> [usize; 2] {
            [self.tile_rows, self.tile_cols]
        }

        pub const fn size(&self) -> usize {
            self.rows * self.cols
        }
    }

    /// Tiles divide the grid exactly.
    pub const EVEN: GridShape = GridShape {
        rows: 64,
        cols: 64,
        tile_rows: 16,
        tile_cols: 16,
    };

    /// Last tile along each axis is short.
    pub const RAGGED: GridShape = GridShape {
        rows: 37,
        cols: 53,
        tile_rows: 16,
        tile_cols: 10,
    };

    /// One tile larger than the grid.
    pub const SINGLE_TILE: GridShape = GridShape {
        rows: 7,
        cols: 5,
        tile_rows: 32,
        tile_cols: 32,
    };

    /// One row of one-pixel tiles.
    pub const STRIP: GridShape = GridShape {
        rows: 1,
        cols: 40,
        tile_rows: 1,
        tile_cols: 1,
    };

    pub const ALL: [GridShape; 4] = [EVEN, RAGGED, SINGLE_TILE, STRIP];
}

/// Storage formats seen in real products.
pub mod formats {
    use chunk_engine::{ChunkFormat, DataType, PackingScheme};

    pub fn float() -> ChunkFormat {
        ChunkFormat::new(DataType::Float)
    }

    pub fn double() -> ChunkFormat {
        ChunkFormat::new(DataType::Double)
    }

    /// Signed short packed at 0.01, missing at `i16::MIN`.
    pub fn packed_short() -> ChunkFormat {
        ChunkFormat::new(DataType::Short)
            .with_missing(Some(f64::from(i16::MIN)))
            .with_packing(PackingScheme::new(0.01, 0.0, DataType::Float).ok())
    }

    /// Unsigned byte, missing at 255.
    pub fn unsigned_byte() -> ChunkFormat {
        ChunkFormat::new(DataType::Byte)
            .with_unsigned(true)
            .with_missing(Some(255.0))
    }

    /// Plain int with a sentinel missing value.
    pub fn int_with_missing() -> ChunkFormat {
        ChunkFormat::new(DataType::Int).with_missing(Some(-9999.0))
    }
}

/// In-memory grid holding `values`, shared for concurrent access.
pub fn memory_grid(
    name: &str,
    shape: shapes::GridShape,
    format: ChunkFormat,
    values: &[f64],
) -> Result<SharedGrid> {
    let info = GridInfo::new(name, shape.dims(), shape.tile(), format);
    Ok(SharedGrid::new(MemoryGrid::from_doubles(info, values)?))
}

/// Empty in-memory grid filled with the missing value.
pub fn empty_memory_grid(name: &str, shape: shapes::GridShape, format: ChunkFormat) -> Result<SharedGrid> {
    let info = GridInfo::new(name, shape.dims(), shape.tile(), format);
    Ok(SharedGrid::new(MemoryGrid::new(info)?))
}

/// Temporary directory for Zarr stores, removed on drop.
pub fn zarr_store() -> TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temporary Zarr store: {e}"),
    }
}

/// Zarr array under `root` holding `values`.
pub fn zarr_grid(
    root: &Path,
    name: &str,
    shape: shapes::GridShape,
    format: ChunkFormat,
    values: &[f64],
) -> Result<SharedGrid> {
    let info = GridInfo::new(name, shape.dims(), shape.tile(), format);
    let mut source = MemoryGrid::from_doubles(info.clone(), values)?;
    let mut zarr = ZarrGrid::create(root, info)?;
    let whole = ChunkPosition::new([0, 0], shape.dims());
    let chunk = source.read(&whole)?;
    zarr.write(&whole, &chunk)?;
    Ok(SharedGrid::new(zarr))
}
