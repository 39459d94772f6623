//! Zarr V3 grid storage on the local filesystem.
//!
//! Each grid variable is one 2-D array `<root>/<name>` whose physical
//! chunk shape is the grid's tile size. Missing value, packing and
//! signedness are kept in the array attributes:
//!
//! ```json
//! { "missing_value": -32768, "scale_factor": 0.01, "add_offset": 0.0,
//!   "unpacked_type": "float" }
//! ```
//!
//! Unsigned storage uses the Zarr unsigned data types directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};
use zarrs::array::{Array, ArrayBuilder, DataType as ZarrDataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use super::{GridInfo, GridStorage};
use crate::chunk::{ChunkData, ChunkFormat, DataChunk, DataType, PackingScheme};
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;

const METADATA_FILE: &str = "zarr.json";

/// A grid variable stored as a Zarr array.
pub struct ZarrGrid {
    info: GridInfo,
    array: Array<FilesystemStore>,
}

impl ZarrGrid {
    /// Open an existing array `name` under `root`.
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        let store = FilesystemStore::new(root)
            .map_err(|e| ChunkError::storage(format!("cannot open store {}: {e}", root.display())))?;
        let array = Array::open(Arc::new(store), &array_path(name))
            .map_err(|e| ChunkError::storage(format!("cannot open grid '{name}': {e}")))?;

        let shape = array.shape();
        if shape.len() != 2 {
            return Err(ChunkError::storage(format!(
                "grid '{name}' has {} dimensions, expected 2",
                shape.len()
            )));
        }
        let dims = [shape[0] as usize, shape[1] as usize];
        let origin = vec![0u64; 2];
        let chunk_shape = array
            .chunk_grid()
            .chunk_shape(&origin, array.shape())
            .map_err(|e| ChunkError::storage(e.to_string()))?
            .ok_or_else(|| ChunkError::storage(format!("grid '{name}' has no chunk shape")))?;
        let tile_dims = [chunk_shape[0].get() as usize, chunk_shape[1].get() as usize];

        let (storage, unsigned) = storage_type(array.data_type())?;
        let format = format_from_attributes(array.attributes(), storage, unsigned)?;
        let info = GridInfo::new(name, dims, tile_dims, format);
        debug!(grid = %info, tile_rows = tile_dims[0], tile_cols = tile_dims[1], "Opened Zarr grid");
        Ok(Self { info, array })
    }

    /// Create a new array described by `info`, writing its metadata.
    pub fn create(root: &Path, info: GridInfo) -> Result<Self> {
        info.validate()?;
        std::fs::create_dir_all(root)?;
        let store = FilesystemStore::new(root)
            .map_err(|e| ChunkError::storage(format!("cannot open store {}: {e}", root.display())))?;

        let format = info.format;
        let chunk_grid: zarrs::array::ChunkGrid =
            vec![info.tile_dims[0] as u64, info.tile_dims[1] as u64]
                .try_into()
                .map_err(|e| ChunkError::config(format!("invalid tile size: {e:?}")))?;

        let mut builder = ArrayBuilder::new(
            vec![info.dims[0] as u64, info.dims[1] as u64],
            zarr_data_type(&format),
            chunk_grid,
            fill_value(&format),
        );
        builder.attributes(format_attributes(&format));
        let array = builder
            .build(Arc::new(store), &array_path(&info.name))
            .map_err(|e| ChunkError::storage(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| ChunkError::storage(e.to_string()))?;

        info!(grid = %info, root = %root.display(), "Created Zarr grid");
        Ok(Self { info, array })
    }

    /// Whether an array `name` exists under `root`.
    pub fn exists(root: &Path, name: &str) -> bool {
        root.join(name).join(METADATA_FILE).is_file()
    }

    /// Names of all arrays directly under `root`, sorted.
    pub fn list(root: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.path().join(METADATA_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Rename array `from` to `to`, replacing any existing `to`.
    pub fn rename(root: &Path, from: &str, to: &str) -> Result<()> {
        let target = array_dir(root, to);
        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        std::fs::rename(array_dir(root, from), &target)?;
        Ok(())
    }

    /// Delete array `name` if present.
    pub fn remove(root: &Path, name: &str) -> Result<()> {
        let dir = array_dir(root, name);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    fn subset(&self, position: &ChunkPosition) -> Result<ArraySubset> {
        self.info.check_position(position)?;
        ArraySubset::new_with_start_shape(
            vec![position.start[0] as u64, position.start[1] as u64],
            vec![position.length[0] as u64, position.length[1] as u64],
        )
        .map_err(|e| ChunkError::storage(e.to_string()))
    }

    fn read_err(&self, position: &ChunkPosition) -> impl Fn(zarrs::array::ArrayError) -> ChunkError + '_ {
        let position = *position;
        move |e| {
            ChunkError::storage(format!(
                "failed to read {position} of '{}': {e}",
                self.info.name
            ))
        }
    }

    fn write_err(&self, position: &ChunkPosition) -> impl Fn(zarrs::array::ArrayError) -> ChunkError + '_ {
        let position = *position;
        move |e| {
            ChunkError::storage(format!(
                "failed to write {position} of '{}': {e}",
                self.info.name
            ))
        }
    }
}

impl GridStorage for ZarrGrid {
    fn info(&self) -> &GridInfo {
        &self.info
    }

    fn read(&mut self, position: &ChunkPosition) -> Result<DataChunk> {
        let subset = self.subset(position)?;
        let array = &self.array;
        let err = self.read_err(position);
        let data = match (self.info.format.storage, self.info.format.unsigned) {
            (DataType::Byte, false) => {
                ChunkData::Byte(array.retrieve_array_subset_elements::<i8>(&subset).map_err(err)?)
            }
            (DataType::Byte, true) => ChunkData::Byte(
                array
                    .retrieve_array_subset_elements::<u8>(&subset)
                    .map_err(err)?
                    .into_iter()
                    .map(|v| v as i8)
                    .collect(),
            ),
            (DataType::Short, false) => {
                ChunkData::Short(array.retrieve_array_subset_elements::<i16>(&subset).map_err(err)?)
            }
            (DataType::Short, true) => ChunkData::Short(
                array
                    .retrieve_array_subset_elements::<u16>(&subset)
                    .map_err(err)?
                    .into_iter()
                    .map(|v| v as i16)
                    .collect(),
            ),
            (DataType::Int, false) => {
                ChunkData::Int(array.retrieve_array_subset_elements::<i32>(&subset).map_err(err)?)
            }
            (DataType::Int, true) => ChunkData::Int(
                array
                    .retrieve_array_subset_elements::<u32>(&subset)
                    .map_err(err)?
                    .into_iter()
                    .map(|v| v as i32)
                    .collect(),
            ),
            (DataType::Long, _) if matches!(array.data_type(), ZarrDataType::UInt64) => {
                ChunkData::Long(
                    array
                        .retrieve_array_subset_elements::<u64>(&subset)
                        .map_err(err)?
                        .into_iter()
                        .map(|v| v as i64)
                        .collect(),
                )
            }
            (DataType::Long, _) => {
                ChunkData::Long(array.retrieve_array_subset_elements::<i64>(&subset).map_err(err)?)
            }
            (DataType::Float, _) => {
                ChunkData::Float(array.retrieve_array_subset_elements::<f32>(&subset).map_err(err)?)
            }
            (DataType::Double, _) => {
                ChunkData::Double(array.retrieve_array_subset_elements::<f64>(&subset).map_err(err)?)
            }
        };
        DataChunk::new(self.info.format, data)
    }

    fn write(&mut self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        self.info.check_write(position, chunk)?;
        let subset = self.subset(position)?;
        let array = &self.array;
        let err = self.write_err(position);
        let unsigned = self.info.format.unsigned;
        match chunk.data() {
            ChunkData::Byte(v) if unsigned => {
                let v: Vec<u8> = v.iter().map(|x| *x as u8).collect();
                array.store_array_subset_elements(&subset, &v)
            }
            ChunkData::Byte(v) => array.store_array_subset_elements(&subset, v),
            ChunkData::Short(v) if unsigned => {
                let v: Vec<u16> = v.iter().map(|x| *x as u16).collect();
                array.store_array_subset_elements(&subset, &v)
            }
            ChunkData::Short(v) => array.store_array_subset_elements(&subset, v),
            ChunkData::Int(v) if unsigned => {
                let v: Vec<u32> = v.iter().map(|x| *x as u32).collect();
                array.store_array_subset_elements(&subset, &v)
            }
            ChunkData::Int(v) => array.store_array_subset_elements(&subset, v),
            ChunkData::Long(v) if matches!(array.data_type(), ZarrDataType::UInt64) => {
                let v: Vec<u64> = v.iter().map(|x| *x as u64).collect();
                array.store_array_subset_elements(&subset, &v)
            }
            ChunkData::Long(v) => array.store_array_subset_elements(&subset, v),
            ChunkData::Float(v) => array.store_array_subset_elements(&subset, v),
            ChunkData::Double(v) => array.store_array_subset_elements(&subset, v),
        }
        .map_err(err)
    }
}

fn array_path(name: &str) -> String {
    format!("/{name}")
}

fn array_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

fn storage_type(data_type: &ZarrDataType) -> Result<(DataType, bool)> {
    Ok(match data_type {
        ZarrDataType::Int8 => (DataType::Byte, false),
        ZarrDataType::UInt8 => (DataType::Byte, true),
        ZarrDataType::Int16 => (DataType::Short, false),
        ZarrDataType::UInt16 => (DataType::Short, true),
        ZarrDataType::Int32 => (DataType::Int, false),
        ZarrDataType::UInt32 => (DataType::Int, true),
        ZarrDataType::Int64 => (DataType::Long, false),
        // Same bits as a signed long; only the flag is kept.
        ZarrDataType::UInt64 => (DataType::Long, true),
        ZarrDataType::Float32 => (DataType::Float, false),
        ZarrDataType::Float64 => (DataType::Double, false),
        other => {
            return Err(ChunkError::type_mismatch(format!(
                "unsupported Zarr data type {other:?}"
            )))
        }
    })
}

fn zarr_data_type(format: &ChunkFormat) -> ZarrDataType {
    match (format.storage, format.unsigned) {
        (DataType::Byte, false) => ZarrDataType::Int8,
        (DataType::Byte, true) => ZarrDataType::UInt8,
        (DataType::Short, false) => ZarrDataType::Int16,
        (DataType::Short, true) => ZarrDataType::UInt16,
        (DataType::Int, false) => ZarrDataType::Int32,
        (DataType::Int, true) => ZarrDataType::UInt32,
        (DataType::Long, false) => ZarrDataType::Int64,
        (DataType::Long, true) => ZarrDataType::UInt64,
        (DataType::Float, _) => ZarrDataType::Float32,
        (DataType::Double, _) => ZarrDataType::Float64,
    }
}

fn fill_value(format: &ChunkFormat) -> FillValue {
    let missing = format.missing;
    match (format.storage, format.unsigned) {
        (DataType::Byte, false) => FillValue::from(missing.map_or(0, |m| m as i8)),
        (DataType::Byte, true) => FillValue::from(missing.map_or(0, |m| m as u8)),
        (DataType::Short, false) => FillValue::from(missing.map_or(0, |m| m as i16)),
        (DataType::Short, true) => FillValue::from(missing.map_or(0, |m| m as u16)),
        (DataType::Int, false) => FillValue::from(missing.map_or(0, |m| m as i32)),
        (DataType::Int, true) => FillValue::from(missing.map_or(0, |m| m as u32)),
        (DataType::Long, false) => FillValue::from(missing.map_or(0, |m| m as i64)),
        (DataType::Long, true) => FillValue::from(missing.map_or(0, |m| m as i64 as u64)),
        (DataType::Float, _) => FillValue::from(missing.map_or(f32::NAN, |m| m as f32)),
        (DataType::Double, _) => FillValue::from(missing.unwrap_or(f64::NAN)),
    }
}

fn format_attributes(format: &ChunkFormat) -> Map<String, JsonValue> {
    let mut attrs = Map::new();
    if let Some(missing) = format.missing {
        attrs.insert("missing_value".to_string(), json!(missing));
    }
    if let Some(packing) = &format.packing {
        attrs.insert("scale_factor".to_string(), json!(packing.scale));
        attrs.insert("add_offset".to_string(), json!(packing.offset));
        attrs.insert("unpacked_type".to_string(), json!(packing.unpacked));
    }
    attrs
}

fn format_from_attributes(
    attrs: &Map<String, JsonValue>,
    storage: DataType,
    unsigned: bool,
) -> Result<ChunkFormat> {
    let missing = attrs.get("missing_value").and_then(|v| v.as_f64());
    let scale = attrs.get("scale_factor").and_then(|v| v.as_f64());
    let offset = attrs.get("add_offset").and_then(|v| v.as_f64());
    let packing = match (scale, offset) {
        (None, None) => None,
        (scale, offset) => {
            let unpacked = match attrs.get("unpacked_type") {
                Some(value) => serde_json::from_value(value.clone())?,
                None => DataType::Float,
            };
            Some(PackingScheme::new(
                scale.unwrap_or(1.0),
                offset.unwrap_or(0.0),
                unpacked,
            )?)
        }
    };
    let format = ChunkFormat::new(storage)
        .with_unsigned(unsigned)
        .with_missing(missing)
        .with_packing(packing);
    format.validate()?;
    Ok(format)
}
