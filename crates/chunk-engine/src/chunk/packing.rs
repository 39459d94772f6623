//! Scale/offset encoding of floating point values in integer storage.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::DataType;
use crate::error::{ChunkError, Result};

/// Linear packing: `stored = round(value / scale + offset)` and
/// `value = (stored - offset) * scale`.
///
/// All packing arithmetic in the engine goes through this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackingScheme {
    pub scale: f64,
    pub offset: f64,
    /// Type that packed values are presented as, `Float` or `Double`.
    pub unpacked: DataType,
}

impl PackingScheme {
    pub fn new(scale: f64, offset: f64, unpacked: DataType) -> Result<Self> {
        if !scale.is_finite() || scale == 0.0 {
            return Err(ChunkError::config(format!(
                "packing scale must be finite and non-zero, got {scale}"
            )));
        }
        if !offset.is_finite() {
            return Err(ChunkError::config(format!(
                "packing offset must be finite, got {offset}"
            )));
        }
        if !unpacked.is_floating() {
            return Err(ChunkError::config(format!(
                "packed values must unpack to float or double, not {unpacked}"
            )));
        }
        Ok(Self {
            scale,
            offset,
            unpacked,
        })
    }

    /// Parse `"scale/offset"`, e.g. `"0.01/0"`. A bare scale implies offset 0.
    pub fn parse(text: &str, unpacked: DataType) -> Result<Self> {
        let (scale, offset) = match text.split_once('/') {
            Some((scale, offset)) => (scale.trim(), offset.trim()),
            None => (text.trim(), "0"),
        };
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| ChunkError::config(format!("invalid packing '{text}'")))
        };
        Self::new(parse(scale)?, parse(offset)?, unpacked)
    }

    /// Packed value before rounding; NaN for non-finite input.
    pub fn pack(&self, value: f64) -> f64 {
        if value.is_finite() {
            value / self.scale + self.offset
        } else {
            f64::NAN
        }
    }

    pub fn unpack(&self, stored: f64) -> f64 {
        (stored - self.offset) * self.scale
    }

    /// Range of values representable in `storage` under this packing.
    pub fn unpacked_range(&self, storage: DataType, unsigned: bool) -> (f64, f64) {
        let (low, high) = storage.range(unsigned);
        let (a, b) = (self.unpack(low), self.unpack(high));
        (a.min(b), a.max(b))
    }
}

impl fmt::Display for PackingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scale, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let packing = PackingScheme::new(0.01, 0.0, DataType::Float).unwrap();
        assert_eq!(packing.pack(2.5).round(), 250.0);
        assert_eq!(packing.unpack(250.0), 2.5);
        assert!(packing.pack(f64::INFINITY).is_nan());

        let packing = PackingScheme::new(0.5, 100.0, DataType::Double).unwrap();
        assert_eq!(packing.pack(10.0), 120.0);
        assert_eq!(packing.unpack(120.0), 10.0);
    }

    #[test]
    fn test_parse() {
        let packing = PackingScheme::parse("0.01/0", DataType::Float).unwrap();
        assert_eq!(packing.scale, 0.01);
        assert_eq!(packing.offset, 0.0);
        let packing = PackingScheme::parse(" 2 / -10 ", DataType::Double).unwrap();
        assert_eq!((packing.scale, packing.offset), (2.0, -10.0));
        assert_eq!(PackingScheme::parse("4", DataType::Float).unwrap().offset, 0.0);
        assert!(PackingScheme::parse("x/1", DataType::Float).is_err());
        assert!(PackingScheme::parse("0/1", DataType::Float).is_err());
        assert!(PackingScheme::parse("1/0", DataType::Short).is_err());
    }

    #[test]
    fn test_unpacked_range() {
        let packing = PackingScheme::new(0.01, 0.0, DataType::Float).unwrap();
        let (low, high) = packing.unpacked_range(DataType::Short, false);
        assert!((low + 327.68).abs() < 1e-9);
        assert!((high - 327.67).abs() < 1e-9);
    }
}
