//! Element types that can back a chunk buffer.

use std::fmt::Debug;

use grid_expression::Value;
use num_traits::NumCast;

use super::{ChunkData, DataType};

/// A storage element type.
///
/// Integer conversions honour an `unsigned` flag: the stored bits are then
/// read as the unsigned type of the same width. Longs are always signed.
pub trait Primitive: Copy + Debug + PartialEq + Send + Sync + Default + 'static {
    const DATA_TYPE: DataType;

    fn as_f64(self, unsigned: bool) -> f64;

    /// Round and convert, or `None` if `value` is NaN or outside the range.
    fn from_f64(value: f64, unsigned: bool) -> Option<Self>;

    fn from_i64(value: i64, unsigned: bool) -> Option<Self>;

    /// Convert `value`, clamping out-of-range values to the type bounds.
    fn saturate(value: f64, unsigned: bool) -> Self;

    /// External view of a stored value.
    fn to_value(self, unsigned: bool) -> Value;

    fn is_nan(self) -> bool {
        false
    }

    fn into_data(values: Vec<Self>) -> ChunkData;

    fn slice(data: &ChunkData) -> Option<&[Self]>;

    fn slice_mut(data: &mut ChunkData) -> Option<&mut Vec<Self>>;
}

macro_rules! buffer_access {
    ($data_type:ident) => {
        fn into_data(values: Vec<Self>) -> ChunkData {
            ChunkData::$data_type(values)
        }

        fn slice(data: &ChunkData) -> Option<&[Self]> {
            match data {
                ChunkData::$data_type(values) => Some(values),
                _ => None,
            }
        }

        fn slice_mut(data: &mut ChunkData) -> Option<&mut Vec<Self>> {
            match data {
                ChunkData::$data_type(values) => Some(values),
                _ => None,
            }
        }
    };
}

macro_rules! integer_primitive {
    ($t:ty, $u:ty, $data_type:ident, $variant:ident, $wide:ident) => {
        impl Primitive for $t {
            const DATA_TYPE: DataType = DataType::$data_type;

            buffer_access!($data_type);

            fn as_f64(self, unsigned: bool) -> f64 {
                if unsigned {
                    (self as $u) as f64
                } else {
                    self as f64
                }
            }

            fn from_f64(value: f64, unsigned: bool) -> Option<Self> {
                if value.is_nan() {
                    return None;
                }
                let rounded = value.round();
                if unsigned {
                    <$u as NumCast>::from(rounded).map(|v| v as $t)
                } else {
                    <$t as NumCast>::from(rounded)
                }
            }

            fn from_i64(value: i64, unsigned: bool) -> Option<Self> {
                if unsigned {
                    <$u as NumCast>::from(value).map(|v| v as $t)
                } else {
                    <$t as NumCast>::from(value)
                }
            }

            fn saturate(value: f64, unsigned: bool) -> Self {
                if value.is_nan() {
                    return 0;
                }
                let (low, high) = if unsigned {
                    (<$u>::MIN as f64, <$u>::MAX as f64)
                } else {
                    (<$t>::MIN as f64, <$t>::MAX as f64)
                };
                let clamped = value.round().clamp(low, high);
                match (Self::from_f64(clamped, unsigned), unsigned) {
                    (Some(v), _) => v,
                    // The upper bound of a wide type rounds past its range.
                    (None, true) => <$u>::MAX as $t,
                    (None, false) => <$t>::MAX,
                }
            }

            fn to_value(self, unsigned: bool) -> Value {
                if unsigned {
                    Value::$wide((self as $u).into())
                } else {
                    Value::$variant(self)
                }
            }
        }
    };
}

integer_primitive!(i8, u8, Byte, Byte, Short);
integer_primitive!(i16, u16, Short, Short, Int);
integer_primitive!(i32, u32, Int, Int, Long);
integer_primitive!(i64, i64, Long, Long, Long);

macro_rules! float_primitive {
    ($t:ty, $data_type:ident, $variant:ident) => {
        impl Primitive for $t {
            const DATA_TYPE: DataType = DataType::$data_type;

            buffer_access!($data_type);

            fn as_f64(self, _unsigned: bool) -> f64 {
                self as f64
            }

            fn from_f64(value: f64, _unsigned: bool) -> Option<Self> {
                if value.is_nan() {
                    return None;
                }
                if value.is_finite() && value.abs() > <$t>::MAX as f64 {
                    return None;
                }
                Some(value as $t)
            }

            fn from_i64(value: i64, _unsigned: bool) -> Option<Self> {
                Some(value as $t)
            }

            fn saturate(value: f64, _unsigned: bool) -> Self {
                (value as $t).clamp(<$t>::MIN, <$t>::MAX)
            }

            fn to_value(self, _unsigned: bool) -> Value {
                Value::$variant(self)
            }

            fn is_nan(self) -> bool {
                <$t>::is_nan(self)
            }
        }
    };
}

float_primitive!(f32, Float, Float);
float_primitive!(f64, Double, Double);
