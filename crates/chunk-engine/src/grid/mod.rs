//! Backing grid storage.
//!
//! The engine reads and writes grids only through [`GridStorage`]. Two
//! backends are provided: [`MemoryGrid`] for tests and small rasters, and
//! [`ZarrGrid`] for Zarr V3 arrays on the local filesystem. [`CachedGrid`]
//! adds an LRU cache of decoded tiles in front of either.
//!
//! Storage makes no concurrency guarantee. Grids shared between
//! producers, consumers or worker threads go through [`SharedGrid`], which
//! serializes every access.

mod cache;
mod memory;
mod zarr;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkFormat, DataChunk};
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;
use crate::scheme::ChunkingScheme;

pub use cache::{CacheStats, CachedGrid};
pub use memory::MemoryGrid;
pub use zarr::ZarrGrid;

/// Shape and storage metadata of one grid variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    pub name: String,
    /// `[rows, cols]`.
    pub dims: [usize; 2],
    /// Physical tile size of the backing store.
    pub tile_dims: [usize; 2],
    pub format: ChunkFormat,
}

impl GridInfo {
    pub fn new(
        name: impl Into<String>,
        dims: [usize; 2],
        tile_dims: [usize; 2],
        format: ChunkFormat,
    ) -> Self {
        Self {
            name: name.into(),
            dims,
            tile_dims,
            format,
        }
    }

    /// Tiling aligned with the store's physical layout.
    pub fn native_scheme(&self) -> Result<ChunkingScheme> {
        ChunkingScheme::new(self.dims, self.tile_dims)
    }

    pub fn prototype(&self) -> DataChunk {
        DataChunk::prototype(self.format)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dims.contains(&0) || self.tile_dims.contains(&0) {
            return Err(ChunkError::config(format!(
                "grid '{}' needs positive dimensions and tile size",
                self.name
            )));
        }
        self.format.validate()
    }

    fn check_position(&self, position: &ChunkPosition) -> Result<()> {
        if position.fits(self.dims) {
            Ok(())
        } else {
            Err(ChunkError::storage(format!(
                "position {position} lies outside {}x{} grid '{}'",
                self.dims[0], self.dims[1], self.name
            )))
        }
    }

    fn check_write(&self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        self.check_position(position)?;
        if chunk.format() != &self.format {
            return Err(ChunkError::type_mismatch(format!(
                "grid '{}' stores {}, chunk is {}",
                self.name,
                self.format,
                chunk.format()
            )));
        }
        if chunk.len() != position.values() {
            return Err(ChunkError::type_mismatch(format!(
                "chunk of {} values does not fill {position} in grid '{}'",
                chunk.len(),
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for GridInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, {})",
            self.name, self.dims[0], self.dims[1], self.format
        )
    }
}

/// A 2-D array store addressed by tile.
pub trait GridStorage: Send {
    fn info(&self) -> &GridInfo;

    /// Read the values covered by `position`, in storage format.
    fn read(&mut self, position: &ChunkPosition) -> Result<DataChunk>;

    /// Write a chunk in the grid's own format.
    fn write(&mut self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<G: GridStorage + ?Sized> GridStorage for Box<G> {
    fn info(&self) -> &GridInfo {
        (**self).info()
    }

    fn read(&mut self, position: &ChunkPosition) -> Result<DataChunk> {
        (**self).read(position)
    }

    fn write(&mut self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        (**self).write(position, chunk)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// A grid behind a mutex, cloneable across producers and threads.
#[derive(Clone)]
pub struct SharedGrid {
    inner: Arc<Mutex<Box<dyn GridStorage>>>,
    info: Arc<GridInfo>,
}

impl SharedGrid {
    pub fn new(storage: impl GridStorage + 'static) -> Self {
        let info = Arc::new(storage.info().clone());
        Self {
            inner: Arc::new(Mutex::new(Box::new(storage))),
            info,
        }
    }

    pub fn info(&self) -> &GridInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn dims(&self) -> [usize; 2] {
        self.info.dims
    }

    pub fn format(&self) -> &ChunkFormat {
        &self.info.format
    }

    pub fn native_scheme(&self) -> Result<ChunkingScheme> {
        self.info.native_scheme()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn GridStorage>>> {
        self.inner
            .lock()
            .map_err(|_| ChunkError::storage(format!("grid '{}' lock poisoned", self.info.name)))
    }

    pub fn read(&self, position: &ChunkPosition) -> Result<DataChunk> {
        self.lock()?.read(position)
    }

    pub fn write(&self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        self.lock()?.write(position, chunk)
    }

    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush()
    }

    /// Run `f` with exclusive access to the storage, for read-then-compute
    /// sequences that must not interleave with other threads.
    pub fn with_exclusive<R>(&self, f: impl FnOnce(&mut dyn GridStorage) -> Result<R>) -> Result<R> {
        let mut guard = self.lock()?;
        f(&mut **guard)
    }
}

impl fmt::Debug for SharedGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedGrid").field("info", &self.info).finish()
    }
}

/// Copy the tile at `position` out of a row-major grid `width` columns wide.
pub(crate) fn extract_region<T: Copy>(
    full: &[T],
    width: usize,
    position: &ChunkPosition,
) -> Result<Vec<T>> {
    let mut out = crate::chunk::allocate::<T>(position.values())?;
    for row in position.start[0]..position.end()[0] {
        let begin = row * width + position.start[1];
        out.extend_from_slice(&full[begin..begin + position.length[1]]);
    }
    Ok(out)
}

/// Copy a tile's values into a row-major grid `width` columns wide.
pub(crate) fn insert_region<T: Copy>(
    full: &mut [T],
    width: usize,
    position: &ChunkPosition,
    values: &[T],
) {
    for (i, row) in (position.start[0]..position.end()[0]).enumerate() {
        let begin = row * width + position.start[1];
        let src = &values[i * position.length[1]..(i + 1) * position.length[1]];
        full[begin..begin + position.length[1]].copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DataType;

    #[test]
    fn test_region_copy() {
        let full: Vec<i32> = (0..20).collect();
        let position = ChunkPosition::new([1, 2], [2, 3]);
        let tile = extract_region(&full, 5, &position).unwrap();
        assert_eq!(tile, vec![7, 8, 9, 12, 13, 14]);

        let mut target = vec![0; 20];
        insert_region(&mut target, 5, &position, &tile);
        assert_eq!(target[7..10], [7, 8, 9]);
        assert_eq!(target[12..15], [12, 13, 14]);
        assert_eq!(target.iter().filter(|v| **v != 0).count(), 6);
    }

    #[test]
    fn test_shared_grid_serializes_access() {
        let info = GridInfo::new("a", [4, 4], [2, 2], ChunkFormat::new(DataType::Int));
        let grid = SharedGrid::new(MemoryGrid::new(info).unwrap());
        let position = ChunkPosition::new([0, 0], [2, 2]);
        let chunk = DataChunk::from_values(*grid.format(), vec![1i32, 2, 3, 4]).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let grid = grid.clone();
                let chunk = chunk.clone();
                scope.spawn(move || grid.write(&position, &chunk).unwrap());
            }
        });
        assert_eq!(grid.read(&position).unwrap(), chunk);

        let total = grid
            .with_exclusive(|storage| {
                let chunk = storage.read(&position)?;
                Ok(chunk.to_double_array()?.iter().sum::<f64>())
            })
            .unwrap();
        assert_eq!(total, 10.0);
    }

    #[test]
    fn test_write_checks_format_and_size() {
        let info = GridInfo::new("a", [4, 4], [2, 2], ChunkFormat::new(DataType::Int));
        let mut grid = MemoryGrid::new(info).unwrap();
        let position = ChunkPosition::new([0, 0], [2, 2]);
        let wrong_type =
            DataChunk::from_values(ChunkFormat::new(DataType::Short), vec![1i16, 2, 3, 4]).unwrap();
        assert!(matches!(
            grid.write(&position, &wrong_type),
            Err(ChunkError::TypeMismatch(_))
        ));
        let short = DataChunk::from_values(ChunkFormat::new(DataType::Int), vec![1i32]).unwrap();
        assert!(grid.write(&position, &short).is_err());
        let outside = ChunkPosition::new([3, 3], [2, 2]);
        assert!(grid.read(&outside).is_err());
    }
}
