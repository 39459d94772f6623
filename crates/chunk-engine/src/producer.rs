//! Chunk sources.

use tracing::trace;

use crate::chunk::{ChunkFormat, DataChunk, DataType};
use crate::error::Result;
use crate::grid::SharedGrid;
use crate::position::ChunkPosition;

/// Reads chunks of one grid variable.
pub trait ChunkProducer: Send + Sync {
    fn name(&self) -> &str;

    /// `[rows, cols]` of the underlying grid.
    fn dims(&self) -> [usize; 2];

    /// Format of the chunks returned by [`get_chunk`](Self::get_chunk).
    fn format(&self) -> ChunkFormat;

    fn external_type(&self) -> DataType {
        self.format().external_type()
    }

    /// Chunk covering `position`, with exactly `position.values()` values.
    fn get_chunk(&self, position: &ChunkPosition) -> Result<DataChunk>;
}

/// Producer over a [`SharedGrid`], optionally converting on read.
#[derive(Debug, Clone)]
pub struct GridChunkProducer {
    name: String,
    grid: SharedGrid,
    target: Option<ChunkFormat>,
}

impl GridChunkProducer {
    /// Chunks in the grid's own format.
    pub fn new(grid: SharedGrid) -> Self {
        Self {
            name: grid.name().to_string(),
            grid,
            target: None,
        }
    }

    /// Chunks converted to `format` as they are read.
    pub fn with_format(grid: SharedGrid, format: ChunkFormat) -> Self {
        let target = (grid.format() != &format).then_some(format);
        Self {
            name: grid.name().to_string(),
            grid,
            target,
        }
    }

    /// Bind under a different variable name than the grid's.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn grid(&self) -> &SharedGrid {
        &self.grid
    }
}

impl ChunkProducer for GridChunkProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> [usize; 2] {
        self.grid.dims()
    }

    fn format(&self) -> ChunkFormat {
        self.target.unwrap_or(*self.grid.format())
    }

    fn get_chunk(&self, position: &ChunkPosition) -> Result<DataChunk> {
        trace!(producer = %self.name, position = %position, "Reading chunk");
        let chunk = self.grid.read(position)?;
        match &self.target {
            Some(format) => chunk.cast_to(format),
            None => Ok(chunk),
        }
    }
}
