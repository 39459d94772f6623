//! Work performed per chunk position.
//!
//! A [`ChunkFunction`] maps aligned input chunks to one output chunk. A
//! [`ChunkOperation`] is the unit the scheduler runs for each position;
//! [`ChunkComputation`] is the usual one, wiring a collector, a function
//! and a consumer together.

mod composite;
mod computation;
mod expression;

pub use composite::{CompositeFunction, CompositeMethod};
pub use computation::{ChunkComputation, ComputationTiming};
pub use expression::ExpressionFunction;

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::position::ChunkPosition;

/// Pure mapping from aligned input chunks to one output chunk.
pub trait ChunkFunction: Send + Sync {
    /// Compute the output for `position`. Inputs are not modified and the
    /// result holds `position.values()` values.
    fn apply(&self, position: &ChunkPosition, inputs: &[DataChunk]) -> Result<DataChunk>;

    /// Whether `apply` may run on several threads at once.
    fn is_thread_safe(&self) -> bool {
        true
    }
}

/// Self-contained work for one position.
pub trait ChunkOperation: Send + Sync {
    fn perform(&self, position: &ChunkPosition) -> Result<()>;

    fn is_thread_safe(&self) -> bool {
        true
    }
}

impl<F> ChunkOperation for F
where
    F: Fn(&ChunkPosition) -> Result<()> + Send + Sync,
{
    fn perform(&self, position: &ChunkPosition) -> Result<()> {
        self(position)
    }
}

/// Marks an operation as unsafe to run concurrently, forcing serial
/// scheduling.
#[derive(Debug, Clone)]
pub struct Serial<O>(pub O);

impl<O: ChunkOperation> ChunkOperation for Serial<O> {
    fn perform(&self, position: &ChunkPosition) -> Result<()> {
        self.0.perform(position)
    }

    fn is_thread_safe(&self) -> bool {
        false
    }
}
