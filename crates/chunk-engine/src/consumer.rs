//! Chunk sinks.

use tracing::{debug, trace};

use crate::chunk::DataChunk;
use crate::error::{ChunkError, Result};
use crate::grid::SharedGrid;
use crate::position::ChunkPosition;
use crate::scheme::ChunkingScheme;

/// Writes chunks of one grid variable.
pub trait ChunkConsumer: Send + Sync {
    fn name(&self) -> &str;

    /// Tiling aligned with the backing store.
    fn native_scheme(&self) -> Result<ChunkingScheme>;

    /// Empty chunk in the format that written chunks must have.
    fn prototype_chunk(&self) -> DataChunk;

    fn put_chunk(&self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Consumer over a [`SharedGrid`]. Chunks in another format are converted
/// before writing.
#[derive(Debug, Clone)]
pub struct GridChunkConsumer {
    grid: SharedGrid,
    scheme: ChunkingScheme,
}

impl GridChunkConsumer {
    pub fn new(grid: SharedGrid) -> Result<Self> {
        let scheme = grid.native_scheme()?;
        Ok(Self { grid, scheme })
    }

    pub fn grid(&self) -> &SharedGrid {
        &self.grid
    }
}

impl ChunkConsumer for GridChunkConsumer {
    fn name(&self) -> &str {
        self.grid.name()
    }

    fn native_scheme(&self) -> Result<ChunkingScheme> {
        Ok(self.scheme)
    }

    fn prototype_chunk(&self) -> DataChunk {
        self.grid.info().prototype()
    }

    fn put_chunk(&self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        if chunk.len() != position.values() {
            return Err(ChunkError::Alignment {
                producer: self.name().to_string(),
                position: *position,
                expected: format!("{} values", position.values()),
                found: format!("{} values", chunk.len()),
            });
        }
        if !self.scheme.is_native(position) {
            debug!(consumer = %self.name(), position = %position, "Writing across native tiles");
        }
        trace!(consumer = %self.name(), position = %position, "Writing chunk");
        if chunk.format() == self.grid.format() {
            self.grid.write(position, chunk)
        } else {
            let converted = chunk.cast_to(self.grid.format())?;
            self.grid.write(position, &converted)
        }
    }

    fn flush(&self) -> Result<()> {
        self.grid.flush()
    }
}
