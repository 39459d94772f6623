//! Conversion between external values and stored elements: packing,
//! range checks and missing-value substitution.

use grid_expression::Value;

use super::{ChunkFormat, DataType, PackingScheme, Primitive};

/// Element conversions for one format, with the missing sentinel resolved
/// to the storage type up front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Codec<T> {
    unsigned: bool,
    packing: Option<PackingScheme>,
    sentinel: Option<T>,
    external: DataType,
}

impl<T: Primitive> Codec<T> {
    pub fn new(format: &ChunkFormat) -> Self {
        Self {
            unsigned: format.unsigned,
            packing: format.packing,
            sentinel: format.missing.and_then(|m| T::from_f64(m, format.unsigned)),
            external: format.external_type(),
        }
    }

    pub fn is_missing(&self, stored: T) -> bool {
        stored.is_nan() || self.sentinel == Some(stored)
    }

    /// Stored value used for missing elements.
    pub fn missing_fill(&self) -> T {
        self.sentinel
            .unwrap_or_else(|| T::saturate(f64::NAN, self.unsigned))
    }

    pub fn decode(&self, stored: T) -> f64 {
        if self.is_missing(stored) {
            return f64::NAN;
        }
        let raw = stored.as_f64(self.unsigned);
        match &self.packing {
            Some(packing) => packing.unpack(raw),
            None => raw,
        }
    }

    pub fn encode(&self, value: f64) -> T {
        let value = match &self.packing {
            Some(packing) => packing.pack(value),
            None => value,
        };
        if value.is_nan() {
            return self.missing_fill();
        }
        T::from_f64(value, self.unsigned)
            .unwrap_or_else(|| self.sentinel.unwrap_or_else(|| T::saturate(value, self.unsigned)))
    }

    /// Encode an external value. Integers bypass doubles so that longs keep
    /// full precision.
    pub fn encode_value(&self, value: Value) -> T {
        let integral = matches!(
            value,
            Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::Boolean(_)
        );
        if !integral || self.packing.is_some() || T::DATA_TYPE.is_floating() {
            return self.encode(value.as_f64());
        }
        T::from_i64(value.as_i64(), self.unsigned).unwrap_or_else(|| {
            self.sentinel
                .unwrap_or_else(|| T::saturate(value.as_f64(), self.unsigned))
        })
    }

    /// External view of a stored value. Missing floating point values read
    /// as NaN; missing integers keep their stored value.
    pub fn value(&self, stored: T) -> Value {
        match (&self.packing, self.external) {
            (Some(_), DataType::Float) => Value::Float(self.decode(stored) as f32),
            (Some(_), _) => Value::Double(self.decode(stored)),
            (None, DataType::Float) if self.is_missing(stored) => Value::Float(f32::NAN),
            (None, DataType::Double) if self.is_missing(stored) => Value::Double(f64::NAN),
            (None, _) => stored.to_value(self.unsigned),
        }
    }
}
