//! Typed tile buffers.
//!
//! A [`DataChunk`] holds the values of one tile in its storage type
//! together with a [`ChunkFormat`] describing how those values are
//! presented to computations: signedness, missing value and optional
//! scale/offset packing. The external type seen by functions can differ
//! from the storage type:
//!
//! | Storage        | Format                 | External type        |
//! |----------------|------------------------|----------------------|
//! | `short`        | plain                  | `short`              |
//! | `byte`         | unsigned               | `short`              |
//! | `short`        | packed, unpacked float | `float`              |
//! | `int`          | packed, unpacked double| `double`             |
//!
//! Conversions in both directions round to nearest, and values that do not
//! fit the storage type become the missing value.

mod accessor;
mod codec;
mod packing;
mod primitive;

use std::fmt;

use grid_expression::{Value, ValueType};
use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};

pub use accessor::ChunkAccessor;
pub(crate) use codec::Codec;
pub use packing::PackingScheme;
pub use primitive::Primitive;

/// Run `$body` with `$t` bound to the element type for a [`DataType`].
macro_rules! with_primitive {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            $crate::chunk::DataType::Byte => {
                type $t = i8;
                $body
            }
            $crate::chunk::DataType::Short => {
                type $t = i16;
                $body
            }
            $crate::chunk::DataType::Int => {
                type $t = i32;
                $body
            }
            $crate::chunk::DataType::Long => {
                type $t = i64;
                $body
            }
            $crate::chunk::DataType::Float => {
                type $t = f32;
                $body
            }
            $crate::chunk::DataType::Double => {
                type $t = f64;
                $body
            }
        }
    };
}

/// Run `$body` with `$v` bound to the typed buffer inside a [`ChunkData`].
macro_rules! dispatch {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::chunk::ChunkData::Byte($v) => $body,
            $crate::chunk::ChunkData::Short($v) => $body,
            $crate::chunk::ChunkData::Int($v) => $body,
            $crate::chunk::ChunkData::Long($v) => $body,
            $crate::chunk::ChunkData::Float($v) => $body,
            $crate::chunk::ChunkData::Double($v) => $body,
        }
    };
}

pub(crate) use dispatch;
pub(crate) use with_primitive;

/// Numeric element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl DataType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "byte" | "int8" | "i8" => Some(Self::Byte),
            "short" | "int16" | "i16" => Some(Self::Short),
            "int" | "int32" | "i32" => Some(Self::Int),
            "long" | "int64" | "i64" => Some(Self::Long),
            "float" | "float32" | "f32" => Some(Self::Float),
            "double" | "float64" | "f64" => Some(Self::Double),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    pub fn is_integral(&self) -> bool {
        !self.is_floating()
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
        }
    }

    /// Smallest and largest storable values.
    pub fn range(&self, unsigned: bool) -> (f64, f64) {
        match (self, unsigned) {
            (Self::Byte, false) => (i8::MIN as f64, i8::MAX as f64),
            (Self::Byte, true) => (0.0, u8::MAX as f64),
            (Self::Short, false) => (i16::MIN as f64, i16::MAX as f64),
            (Self::Short, true) => (0.0, u16::MAX as f64),
            (Self::Int, false) => (i32::MIN as f64, i32::MAX as f64),
            (Self::Int, true) => (0.0, u32::MAX as f64),
            (Self::Long, _) => (i64::MIN as f64, i64::MAX as f64),
            (Self::Float, _) => (f32::MIN as f64, f32::MAX as f64),
            (Self::Double, _) => (f64::MIN, f64::MAX),
        }
    }

    /// Conventional missing value: the minimum for signed integers, zero
    /// for unsigned integers and none (NaN) for floating point.
    pub fn default_missing(&self, unsigned: bool) -> Option<f64> {
        match (self, unsigned) {
            (Self::Float | Self::Double, _) => None,
            (Self::Long, _) => Some(i64::MIN as f64),
            (_, true) => Some(0.0),
            (other, false) => Some(other.range(false).0),
        }
    }

    /// Type under which storage values of this type are seen when unsigned.
    pub fn widened(&self) -> DataType {
        match self {
            Self::Byte => Self::Short,
            Self::Short => Self::Int,
            Self::Int => Self::Long,
            other => *other,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Byte => ValueType::Byte,
            Self::Short => ValueType::Short,
            Self::Int => ValueType::Int,
            Self::Long => ValueType::Long,
            Self::Float => ValueType::Float,
            Self::Double => ValueType::Double,
        }
    }

    pub fn from_value_type(value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::Boolean => None,
            ValueType::Byte => Some(Self::Byte),
            ValueType::Short => Some(Self::Short),
            ValueType::Int => Some(Self::Int),
            ValueType::Long => Some(Self::Long),
            ValueType::Float => Some(Self::Float),
            ValueType::Double => Some(Self::Double),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage description shared by every chunk of one grid variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkFormat {
    pub storage: DataType,
    /// Integer storage holds unsigned values.
    #[serde(default)]
    pub unsigned: bool,
    /// Stored value that marks a missing element. Never NaN: NaN is always
    /// missing in floating point storage.
    #[serde(default)]
    pub missing: Option<f64>,
    #[serde(default)]
    pub packing: Option<PackingScheme>,
}

impl ChunkFormat {
    pub fn new(storage: DataType) -> Self {
        Self {
            storage,
            unsigned: false,
            missing: None,
            packing: None,
        }
    }

    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    pub fn with_missing(mut self, missing: Option<f64>) -> Self {
        self.missing = missing.filter(|m| !m.is_nan());
        self
    }

    pub fn with_packing(mut self, packing: Option<PackingScheme>) -> Self {
        self.packing = packing;
        self
    }

    /// Type that computations see for values of this format.
    pub fn external_type(&self) -> DataType {
        match (&self.packing, self.unsigned) {
            (Some(packing), _) => packing.unpacked,
            (None, true) => self.storage.widened(),
            (None, false) => self.storage,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.unsigned && self.storage.is_floating() {
            return Err(ChunkError::config(format!(
                "{} storage cannot be unsigned",
                self.storage
            )));
        }
        if let Some(missing) = self.missing {
            let representable = with_primitive!(self.storage, T => {
                match T::from_f64(missing, self.unsigned) {
                    Some(_) if self.storage.is_floating() => true,
                    Some(v) => v.as_f64(self.unsigned) == missing,
                    None => false,
                }
            });
            if !representable {
                return Err(ChunkError::config(format!(
                    "missing value {missing} cannot be stored as {}",
                    self.describe_storage()
                )));
            }
        }
        Ok(())
    }

    fn describe_storage(&self) -> String {
        if self.unsigned {
            format!("unsigned {}", self.storage)
        } else {
            self.storage.to_string()
        }
    }
}

impl fmt::Display for ChunkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe_storage())?;
        if let Some(packing) = &self.packing {
            write!(f, " packed {packing} as {}", packing.unpacked)?;
        }
        if let Some(missing) = self.missing {
            write!(f, " missing {missing}")?;
        }
        Ok(())
    }
}

/// Flat row-major values of one tile, in storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl ChunkData {
    pub fn empty(data_type: DataType) -> Self {
        with_primitive!(data_type, T => T::into_data(Vec::new()))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Byte(_) => DataType::Byte,
            Self::Short(_) => DataType::Short,
            Self::Int(_) => DataType::Int,
            Self::Long(_) => DataType::Long,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
        }
    }

    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Primitive> From<Vec<T>> for ChunkData {
    fn from(values: Vec<T>) -> Self {
        T::into_data(values)
    }
}

/// Reserve a buffer for `count` elements, reporting allocation failure.
pub(crate) fn allocate<T>(count: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(count)
        .map_err(|_| ChunkError::exhausted(count, std::any::type_name::<T>()))?;
    Ok(buffer)
}

/// The values of one tile.
///
/// Chunks are values: operations never modify a chunk in place but build a
/// new one in the same format.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChunk {
    format: ChunkFormat,
    data: ChunkData,
}

impl DataChunk {
    /// Build a chunk from storage values.
    pub fn new(format: ChunkFormat, data: ChunkData) -> Result<Self> {
        if data.data_type() != format.storage {
            return Err(ChunkError::type_mismatch(format!(
                "{} values given for {} storage",
                data.data_type(),
                format.storage
            )));
        }
        Ok(Self { format, data })
    }

    /// Build a chunk from a typed storage buffer.
    pub fn from_values<T: Primitive>(format: ChunkFormat, values: Vec<T>) -> Result<Self> {
        Self::new(format, T::into_data(values))
    }

    /// Build a chunk by encoding external values given as doubles.
    pub fn from_doubles(format: ChunkFormat, values: &[f64]) -> Result<Self> {
        Self::prototype(format).from_double_array(values)
    }

    /// An empty chunk carrying only the format.
    pub fn prototype(format: ChunkFormat) -> Self {
        Self {
            data: ChunkData::empty(format.storage),
            format,
        }
    }

    pub fn format(&self) -> &ChunkFormat {
        &self.format
    }

    pub fn storage_type(&self) -> DataType {
        self.format.storage
    }

    pub fn external_type(&self) -> DataType {
        self.format.external_type()
    }

    pub fn is_unsigned(&self) -> bool {
        self.format.unsigned
    }

    pub fn missing(&self) -> Option<f64> {
        self.format.missing
    }

    pub fn packing(&self) -> Option<&PackingScheme> {
        self.format.packing.as_ref()
    }

    pub fn data(&self) -> &ChunkData {
        &self.data
    }

    pub fn into_data(self) -> ChunkData {
        self.data
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same format, so values can be copied without conversion.
    pub fn is_compatible(&self, other: &DataChunk) -> bool {
        self.format == other.format
    }

    pub fn is_missing(&self, index: usize) -> bool {
        dispatch!(&self.data, v => {
            let codec = Codec::new(&self.format);
            v.get(index).map_or(true, |x| codec.is_missing(*x))
        })
    }

    /// Decoded value at `index`, NaN when missing.
    pub fn get_f64(&self, index: usize) -> f64 {
        dispatch!(&self.data, v => {
            let codec = Codec::new(&self.format);
            v.get(index).map_or(f64::NAN, |x| codec.decode(*x))
        })
    }

    /// Whether any value differs from missing.
    pub fn has_valid_values(&self) -> bool {
        dispatch!(&self.data, v => {
            let codec = Codec::new(&self.format);
            v.iter().any(|x| !codec.is_missing(*x))
        })
    }

    /// A new chunk in this format holding `count` missing values.
    pub fn blank_copy_with_values(&self, count: usize) -> Result<DataChunk> {
        let data = with_primitive!(self.format.storage, T => {
            let mut buffer = allocate::<T>(count)?;
            buffer.resize(count, Codec::<T>::new(&self.format).missing_fill());
            T::into_data(buffer)
        });
        Ok(Self {
            format: self.format,
            data,
        })
    }

    /// Decode every value to double, with NaN for missing.
    pub fn to_double_array(&self) -> Result<Vec<f64>> {
        let mut out = allocate::<f64>(self.len())?;
        dispatch!(&self.data, v => {
            let codec = Codec::new(&self.format);
            out.extend(v.iter().map(|x| codec.decode(*x)));
        });
        Ok(out)
    }

    /// Decode every value to float, with NaN for missing.
    pub fn to_float_array(&self) -> Result<Vec<f32>> {
        let mut out = allocate::<f32>(self.len())?;
        dispatch!(&self.data, v => {
            let codec = Codec::new(&self.format);
            out.extend(v.iter().map(|x| codec.decode(*x) as f32));
        });
        Ok(out)
    }

    /// A new chunk in this format encoding `values`.
    pub fn from_double_array(&self, values: &[f64]) -> Result<DataChunk> {
        let data = with_primitive!(self.format.storage, T => {
            let codec = Codec::<T>::new(&self.format);
            let mut buffer = allocate::<T>(values.len())?;
            buffer.extend(values.iter().map(|v| codec.encode(*v)));
            T::into_data(buffer)
        });
        Ok(Self {
            format: self.format,
            data,
        })
    }

    /// A new chunk in this format encoding `values`.
    pub fn from_float_array(&self, values: &[f32]) -> Result<DataChunk> {
        let data = with_primitive!(self.format.storage, T => {
            let codec = Codec::<T>::new(&self.format);
            let mut buffer = allocate::<T>(values.len())?;
            buffer.extend(values.iter().map(|v| codec.encode(f64::from(*v))));
            T::into_data(buffer)
        });
        Ok(Self {
            format: self.format,
            data,
        })
    }

    /// A new chunk in this format from external values, storing the
    /// missing value wherever `missing` is set.
    pub fn with_values_flagged(&self, values: &[Value], missing: &[bool]) -> Result<DataChunk> {
        if values.len() != missing.len() {
            return Err(ChunkError::type_mismatch(format!(
                "{} values given with {} missing flags",
                values.len(),
                missing.len()
            )));
        }
        let data = with_primitive!(self.format.storage, T => {
            let codec = Codec::<T>::new(&self.format);
            let fill = codec.missing_fill();
            let mut buffer = allocate::<T>(values.len())?;
            buffer.extend(
                values
                    .iter()
                    .zip(missing)
                    .map(|(value, flagged)| if *flagged { fill } else { codec.encode_value(*value) }),
            );
            T::into_data(buffer)
        });
        Ok(Self {
            format: self.format,
            data,
        })
    }

    /// Convert to another format through decoded doubles.
    pub fn cast_to(&self, format: &ChunkFormat) -> Result<DataChunk> {
        if &self.format == format {
            return Ok(self.clone());
        }
        if self.format.packing.is_none()
            && format.packing.is_none()
            && self.format.storage.is_integral()
            && format.storage.is_integral()
        {
            let values: Vec<Value> = (0..self.len()).map(|i| self.accessor().value(i)).collect();
            let flags: Vec<bool> = (0..self.len()).map(|i| self.is_missing(i)).collect();
            return Self::prototype(*format).with_values_flagged(&values, &flags);
        }
        Self::prototype(*format).from_double_array(&self.to_double_array()?)
    }

    /// Per-element external view.
    pub fn accessor(&self) -> ChunkAccessor<'_> {
        ChunkAccessor::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_short() -> ChunkFormat {
        ChunkFormat::new(DataType::Short)
            .with_missing(Some(-32768.0))
            .with_packing(Some(PackingScheme::new(0.01, 0.0, DataType::Float).unwrap()))
    }

    #[test]
    fn test_external_types() {
        assert_eq!(ChunkFormat::new(DataType::Short).external_type(), DataType::Short);
        assert_eq!(
            ChunkFormat::new(DataType::Byte).with_unsigned(true).external_type(),
            DataType::Short
        );
        assert_eq!(
            ChunkFormat::new(DataType::Int).with_unsigned(true).external_type(),
            DataType::Long
        );
        assert_eq!(
            ChunkFormat::new(DataType::Long).with_unsigned(true).external_type(),
            DataType::Long
        );
        assert_eq!(packed_short().external_type(), DataType::Float);
    }

    #[test]
    fn test_default_missing() {
        assert_eq!(DataType::Short.default_missing(false), Some(-32768.0));
        assert_eq!(DataType::Byte.default_missing(true), Some(0.0));
        assert_eq!(DataType::Float.default_missing(false), None);
    }

    #[test]
    fn test_validate() {
        assert!(packed_short().validate().is_ok());
        assert!(ChunkFormat::new(DataType::Float).with_unsigned(true).validate().is_err());
        assert!(ChunkFormat::new(DataType::Byte)
            .with_missing(Some(300.0))
            .validate()
            .is_err());
        assert!(ChunkFormat::new(DataType::Byte)
            .with_unsigned(true)
            .with_missing(Some(255.0))
            .validate()
            .is_ok());
        assert!(ChunkFormat::new(DataType::Int)
            .with_missing(Some(1.5))
            .validate()
            .is_err());
    }

    #[test]
    fn test_out_of_range_becomes_missing() {
        let format = ChunkFormat::new(DataType::Byte).with_missing(Some(-128.0));
        let chunk = DataChunk::from_doubles(format, &[1.4, 126.6, 300.0, -129.0, f64::NAN]).unwrap();
        assert_eq!(chunk.data(), &ChunkData::Byte(vec![1, 127, -128, -128, -128]));
        let decoded = chunk.to_double_array().unwrap();
        assert_eq!(&decoded[..2], &[1.0, 127.0]);
        assert!(decoded[2..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_out_of_range_saturates_without_missing() {
        let format = ChunkFormat::new(DataType::Short);
        let chunk = DataChunk::from_doubles(format, &[40000.0, -40000.0]).unwrap();
        assert_eq!(chunk.data(), &ChunkData::Short(vec![i16::MAX, i16::MIN]));
    }

    #[test]
    fn test_packed_round_trip() {
        let chunk = DataChunk::from_doubles(packed_short(), &[12.34, -0.5, f64::INFINITY]).unwrap();
        assert_eq!(chunk.data(), &ChunkData::Short(vec![1234, -50, -32768]));
        let floats = chunk.to_float_array().unwrap();
        assert!((floats[0] - 12.34).abs() < 1e-5);
        assert_eq!(floats[1], -0.5);
        assert!(floats[2].is_nan());
        let again = chunk.from_float_array(&floats).unwrap();
        assert_eq!(again, chunk);
    }

    #[test]
    fn test_unsigned_storage() {
        let format = ChunkFormat::new(DataType::Byte)
            .with_unsigned(true)
            .with_missing(Some(0.0));
        let chunk = DataChunk::from_doubles(format, &[255.0, 128.0, 256.0, -3.0]).unwrap();
        assert_eq!(chunk.data(), &ChunkData::Byte(vec![-1, -128, 0, 0]));
        assert_eq!(chunk.get_f64(0), 255.0);
        assert_eq!(chunk.get_f64(1), 128.0);
        assert!(chunk.is_missing(2));
    }

    #[test]
    fn test_blank_copy_is_missing() {
        let chunk = DataChunk::from_doubles(packed_short(), &[1.0, 2.0]).unwrap();
        let blank = chunk.blank_copy_with_values(3).unwrap();
        assert_eq!(blank.len(), 3);
        assert!(blank.is_compatible(&chunk));
        assert!(!blank.has_valid_values());

        let blank = DataChunk::prototype(ChunkFormat::new(DataType::Float))
            .blank_copy_with_values(2)
            .unwrap();
        assert!(blank.get_f64(0).is_nan());
    }

    #[test]
    fn test_has_valid_values() {
        let format = ChunkFormat::new(DataType::Int).with_missing(Some(-1.0));
        assert!(!DataChunk::from_values(format, vec![-1i32, -1]).unwrap().has_valid_values());
        assert!(DataChunk::from_values(format, vec![-1i32, 0]).unwrap().has_valid_values());
        assert!(!DataChunk::prototype(format).has_valid_values());
    }

    #[test]
    fn test_from_values_checks_type() {
        let format = ChunkFormat::new(DataType::Int);
        assert!(DataChunk::from_values(format, vec![1i16]).is_err());
    }

    #[test]
    fn test_with_values_flagged() {
        let prototype = DataChunk::prototype(ChunkFormat::new(DataType::Long).with_missing(Some(0.0)));
        let values = [Value::Long(i64::MAX - 1), Value::Long(7), Value::Double(2.6)];
        let chunk = prototype
            .with_values_flagged(&values, &[false, true, false])
            .unwrap();
        assert_eq!(chunk.data(), &ChunkData::Long(vec![i64::MAX - 1, 0, 3]));
        assert!(prototype.with_values_flagged(&values, &[false]).is_err());
    }

    #[test]
    fn test_cast_between_formats() {
        let source = DataChunk::from_values(
            ChunkFormat::new(DataType::Short).with_missing(Some(-1.0)),
            vec![300i16, -1, 42],
        )
        .unwrap();
        let target = ChunkFormat::new(DataType::Byte).with_missing(Some(-128.0));
        let cast = source.cast_to(&target).unwrap();
        assert_eq!(cast.data(), &ChunkData::Byte(vec![-128, -128, 42]));

        let target = ChunkFormat::new(DataType::Double);
        let cast = source.cast_to(&target).unwrap();
        assert_eq!(cast.get_f64(0), 300.0);
        assert!(cast.get_f64(1).is_nan());
    }
}
