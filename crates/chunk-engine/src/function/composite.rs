use std::fmt;

use serde::{Deserialize, Serialize};

use super::ChunkFunction;
use crate::chunk::{allocate, DataChunk};
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;

/// Per-pixel reduction over a stack of inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMethod {
    Mean,
    Median,
    Min,
    Max,
    /// First valid value in input order.
    First,
    /// Last valid value in input order.
    Latest,
}

impl CompositeMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mean" | "average" => Some(Self::Mean),
            "median" => Some(Self::Median),
            "min" | "minimum" => Some(Self::Min),
            "max" | "maximum" => Some(Self::Max),
            "first" => Some(Self::First),
            "latest" | "last" => Some(Self::Latest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Latest => "latest",
        }
    }

    fn reduce(&self, valid: &mut [f64]) -> f64 {
        match self {
            Self::Mean => valid.iter().sum::<f64>() / valid.len() as f64,
            Self::Median => {
                valid.sort_by(f64::total_cmp);
                let mid = valid.len() / 2;
                if valid.len() % 2 == 0 {
                    (valid[mid - 1] + valid[mid]) / 2.0
                } else {
                    valid[mid]
                }
            }
            Self::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::First => valid[0],
            Self::Latest => valid[valid.len() - 1],
        }
    }
}

impl fmt::Display for CompositeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Combines aligned inputs into one chunk.
///
/// Inputs without any valid value are ignored. When fewer than
/// `min_valid` inputs remain the whole output is missing; otherwise a pixel
/// is missing when fewer than `min_valid` inputs are valid there.
#[derive(Debug, Clone)]
pub struct CompositeFunction {
    method: CompositeMethod,
    min_valid: usize,
    prototype: DataChunk,
}

impl CompositeFunction {
    pub fn new(method: CompositeMethod, min_valid: usize, prototype: DataChunk) -> Result<Self> {
        if min_valid == 0 {
            return Err(ChunkError::config("composite needs at least one valid input"));
        }
        Ok(Self {
            method,
            min_valid,
            prototype: DataChunk::prototype(*prototype.format()),
        })
    }

    pub fn method(&self) -> CompositeMethod {
        self.method
    }

    pub fn min_valid(&self) -> usize {
        self.min_valid
    }
}

impl ChunkFunction for CompositeFunction {
    fn apply(&self, position: &ChunkPosition, inputs: &[DataChunk]) -> Result<DataChunk> {
        let count = position.values();
        let stack = inputs
            .iter()
            .filter(|chunk| chunk.has_valid_values())
            .map(DataChunk::to_double_array)
            .collect::<Result<Vec<_>>>()?;
        if stack.len() < self.min_valid {
            return self.prototype.blank_copy_with_values(count);
        }

        let mut out = allocate::<f64>(count)?;
        let mut valid = Vec::with_capacity(stack.len());
        for pixel in 0..count {
            valid.clear();
            valid.extend(
                stack
                    .iter()
                    .filter_map(|layer| layer.get(pixel).copied())
                    .filter(|v| !v.is_nan()),
            );
            out.push(if valid.len() < self.min_valid {
                f64::NAN
            } else {
                self.method.reduce(&mut valid)
            });
        }
        self.prototype.from_double_array(&out)
    }
}
