//! In-memory grid storage.

use super::{extract_region, insert_region, GridInfo, GridStorage};
use crate::chunk::{allocate, dispatch, with_primitive, ChunkData, Codec, DataChunk, Primitive};
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;

/// A whole grid held as one row-major buffer.
#[derive(Debug, Clone)]
pub struct MemoryGrid {
    info: GridInfo,
    data: ChunkData,
}

impl MemoryGrid {
    /// Create a grid filled with the missing value.
    pub fn new(info: GridInfo) -> Result<Self> {
        info.validate()?;
        let count = info.dims[0] * info.dims[1];
        let data = with_primitive!(info.format.storage, T => {
            let mut buffer = allocate::<T>(count)?;
            buffer.resize(count, Codec::<T>::new(&info.format).missing_fill());
            T::into_data(buffer)
        });
        Ok(Self { info, data })
    }

    /// Create a grid by encoding row-major external values.
    pub fn from_doubles(info: GridInfo, values: &[f64]) -> Result<Self> {
        info.validate()?;
        let expected = info.dims[0] * info.dims[1];
        if values.len() != expected {
            return Err(ChunkError::config(format!(
                "grid '{}' needs {expected} values, got {}",
                info.name,
                values.len()
            )));
        }
        let data = DataChunk::from_doubles(info.format, values)?.into_data();
        Ok(Self { info, data })
    }

    /// Create a grid from row-major storage values.
    pub fn from_values<T: Primitive>(info: GridInfo, values: Vec<T>) -> Result<Self> {
        info.validate()?;
        let chunk = DataChunk::from_values(info.format, values)?;
        if chunk.len() != info.dims[0] * info.dims[1] {
            return Err(ChunkError::config(format!(
                "grid '{}' needs {} values, got {}",
                info.name,
                info.dims[0] * info.dims[1],
                chunk.len()
            )));
        }
        Ok(Self {
            info,
            data: chunk.into_data(),
        })
    }

    pub fn data(&self) -> &ChunkData {
        &self.data
    }

    /// Every value decoded to double, row-major.
    pub fn to_double_array(&self) -> Result<Vec<f64>> {
        DataChunk::new(self.info.format, self.data.clone())?.to_double_array()
    }
}

impl GridStorage for MemoryGrid {
    fn info(&self) -> &GridInfo {
        &self.info
    }

    fn read(&mut self, position: &ChunkPosition) -> Result<DataChunk> {
        self.info.check_position(position)?;
        let width = self.info.dims[1];
        let data = dispatch!(&self.data, v => ChunkData::from(extract_region(v, width, position)?));
        DataChunk::new(self.info.format, data)
    }

    fn write(&mut self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        self.info.check_write(position, chunk)?;
        let width = self.info.dims[1];
        with_primitive!(self.info.format.storage, T => {
            let target = T::slice_mut(&mut self.data);
            let source = T::slice(chunk.data());
            match (target, source) {
                (Some(target), Some(source)) => {
                    insert_region(target, width, position, source);
                    Ok(())
                }
                _ => Err(ChunkError::type_mismatch(format!(
                    "grid '{}' buffer does not hold {} values",
                    self.info.name,
                    self.info.format.storage
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFormat, DataType};

    fn info(format: ChunkFormat) -> GridInfo {
        GridInfo::new("t", [3, 4], [2, 2], format)
    }

    #[test]
    fn test_new_grid_is_missing() {
        let grid = MemoryGrid::new(info(
            ChunkFormat::new(DataType::Short).with_missing(Some(-1.0)),
        ))
        .unwrap();
        assert_eq!(grid.data(), &ChunkData::Short(vec![-1; 12]));
        assert!(grid.to_double_array().unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_read_edge_tile() {
        let values: Vec<f64> = (0..12).map(f64::from).collect();
        let mut grid = MemoryGrid::from_doubles(info(ChunkFormat::new(DataType::Int)), &values).unwrap();
        let chunk = grid.read(&ChunkPosition::new([2, 2], [1, 2])).unwrap();
        assert_eq!(chunk.data(), &ChunkData::Int(vec![10, 11]));
    }

    #[test]
    fn test_write_then_read() {
        let format = ChunkFormat::new(DataType::Double);
        let mut grid = MemoryGrid::new(info(format)).unwrap();
        let position = ChunkPosition::new([0, 2], [2, 2]);
        let chunk = DataChunk::from_doubles(format, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        grid.write(&position, &chunk).unwrap();
        assert_eq!(grid.read(&position).unwrap(), chunk);
        let all = grid.to_double_array().unwrap();
        assert_eq!(&all[2..4], &[1.0, 2.0]);
        assert_eq!(&all[6..8], &[3.0, 4.0]);
        assert!(all[0].is_nan());
    }

    #[test]
    fn test_value_count_is_checked() {
        let err = MemoryGrid::from_doubles(info(ChunkFormat::new(DataType::Int)), &[1.0]);
        assert!(matches!(err, Err(ChunkError::Config(_))));
    }
}
