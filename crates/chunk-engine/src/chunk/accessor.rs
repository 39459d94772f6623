use grid_expression::Value;

use super::{dispatch, Codec, DataChunk, DataType};

/// Per-element external view of a chunk.
///
/// Unsigned storage is widened, packed storage is unpacked, and floating
/// point missing values read as NaN.
#[derive(Debug, Clone, Copy)]
pub struct ChunkAccessor<'a> {
    chunk: &'a DataChunk,
}

impl<'a> ChunkAccessor<'a> {
    pub fn new(chunk: &'a DataChunk) -> Self {
        Self { chunk }
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    pub fn external_type(&self) -> DataType {
        self.chunk.external_type()
    }

    pub fn is_missing(&self, index: usize) -> bool {
        self.chunk.is_missing(index)
    }

    /// Value at `index`. Out of range indexes read as missing.
    pub fn value(&self, index: usize) -> Value {
        let format = self.chunk.format();
        dispatch!(self.chunk.data(), v => {
            let codec = Codec::new(format);
            match v.get(index) {
                Some(stored) => codec.value(*stored),
                None => codec.value(codec.missing_fill()),
            }
        })
    }

    /// All values with their missing flags.
    pub fn values(&self) -> (Vec<Value>, Vec<bool>) {
        let format = self.chunk.format();
        dispatch!(self.chunk.data(), v => {
            let codec = Codec::new(format);
            v.iter()
                .map(|stored| (codec.value(*stored), codec.is_missing(*stored)))
                .unzip()
        })
    }

    pub fn f64(&self, index: usize) -> f64 {
        self.chunk.get_f64(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFormat, PackingScheme};

    #[test]
    fn test_unsigned_values_widen() {
        let format = ChunkFormat::new(DataType::Byte).with_unsigned(true);
        let chunk = DataChunk::from_values(format, vec![-1i8, 5]).unwrap();
        let accessor = chunk.accessor();
        assert_eq!(accessor.external_type(), DataType::Short);
        assert_eq!(accessor.value(0), Value::Short(255));
        assert_eq!(accessor.value(1), Value::Short(5));
    }

    #[test]
    fn test_packed_values_unpack() {
        let packing = PackingScheme::new(0.1, 0.0, DataType::Float).unwrap();
        let format = ChunkFormat::new(DataType::Short)
            .with_missing(Some(-32768.0))
            .with_packing(Some(packing));
        let chunk = DataChunk::from_values(format, vec![25i16, -32768]).unwrap();
        let (values, missing) = chunk.accessor().values();
        assert_eq!(values[0], Value::Float(2.5));
        assert!(matches!(values[1], Value::Float(v) if v.is_nan()));
        assert_eq!(missing, vec![false, true]);
    }
}
