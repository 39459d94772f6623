//! Rectangular tile coordinates in grid space.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A tile within a 2-D grid. Axis 0 is rows, axis 1 is columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPosition {
    pub start: [usize; 2],
    pub length: [usize; 2],
}

impl ChunkPosition {
    pub fn new(start: [usize; 2], length: [usize; 2]) -> Self {
        Self { start, length }
    }

    /// Number of values in the tile.
    pub fn values(&self) -> usize {
        self.length[0] * self.length[1]
    }

    /// Exclusive end offsets.
    pub fn end(&self) -> [usize; 2] {
        [self.start[0] + self.length[0], self.start[1] + self.length[1]]
    }

    pub fn rows(&self) -> usize {
        self.length[0]
    }

    pub fn cols(&self) -> usize {
        self.length[1]
    }

    /// Whether the tile is non-empty and lies inside a grid of `dims`.
    pub fn fits(&self, dims: [usize; 2]) -> bool {
        let end = self.end();
        self.length[0] > 0 && self.length[1] > 0 && end[0] <= dims[0] && end[1] <= dims[1]
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        let end = self.end();
        (self.start[0]..end[0]).contains(&row) && (self.start[1]..end[1]).contains(&col)
    }

    /// Whether the two tiles share at least one cell.
    pub fn overlaps(&self, other: &ChunkPosition) -> bool {
        let (end, other_end) = (self.end(), other.end());
        (0..2).all(|axis| self.start[axis] < other_end[axis] && other.start[axis] < end[axis])
    }

    /// Row-major index of a grid cell within this tile.
    pub fn local_index(&self, row: usize, col: usize) -> Option<usize> {
        self.contains(row, col)
            .then(|| (row - self.start[0]) * self.length[1] + (col - self.start[1]))
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.end();
        write!(
            f,
            "[{}..{}, {}..{}]",
            self.start[0], end[0], self.start[1], end[1]
        )
    }
}
