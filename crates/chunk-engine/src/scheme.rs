//! Partitioning of a grid into tiles.

use std::fmt;
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;

/// Splits a grid into disjoint tiles of a nominal size.
///
/// Tiles are enumerated row-major. When a grid dimension is not a multiple
/// of the tile size, the last tile along that axis is truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkingScheme {
    dims: [usize; 2],
    chunk_size: [usize; 2],
}

impl ChunkingScheme {
    pub fn new(dims: [usize; 2], chunk_size: [usize; 2]) -> Result<Self> {
        if dims.contains(&0) {
            return Err(ChunkError::InvalidScheme(format!(
                "grid dimensions must be positive, got {}x{}",
                dims[0], dims[1]
            )));
        }
        if chunk_size.contains(&0) {
            return Err(ChunkError::InvalidScheme(format!(
                "tile size must be positive, got {}x{}",
                chunk_size[0], chunk_size[1]
            )));
        }
        Ok(Self { dims, chunk_size })
    }

    /// Square tiles.
    pub fn square(dims: [usize; 2], size: usize) -> Result<Self> {
        Self::new(dims, [size, size])
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn chunk_size(&self) -> [usize; 2] {
        self.chunk_size
    }

    /// Number of tiles along `axis`.
    pub fn chunk_count(&self, axis: usize) -> usize {
        self.dims[axis].div_ceil(self.chunk_size[axis])
    }

    pub fn total_chunks(&self) -> usize {
        self.chunk_count(0) * self.chunk_count(1)
    }

    /// The tile at grid-of-tiles coordinates `(row, col)`.
    pub fn position(&self, row: usize, col: usize) -> Option<ChunkPosition> {
        if row >= self.chunk_count(0) || col >= self.chunk_count(1) {
            return None;
        }
        let start = [row * self.chunk_size[0], col * self.chunk_size[1]];
        let length = [
            self.chunk_size[0].min(self.dims[0] - start[0]),
            self.chunk_size[1].min(self.dims[1] - start[1]),
        ];
        Some(ChunkPosition::new(start, length))
    }

    /// The tile with row-major index `index`.
    pub fn position_at(&self, index: usize) -> Option<ChunkPosition> {
        let cols = self.chunk_count(1);
        self.position(index / cols, index % cols)
    }

    /// The tile containing grid cell `(row, col)`.
    pub fn position_for(&self, row: usize, col: usize) -> Option<ChunkPosition> {
        if row >= self.dims[0] || col >= self.dims[1] {
            return None;
        }
        self.position(row / self.chunk_size[0], col / self.chunk_size[1])
    }

    /// Whether `position` is exactly one of this scheme's tiles.
    pub fn is_native(&self, position: &ChunkPosition) -> bool {
        position.start[0] % self.chunk_size[0] == 0
            && position.start[1] % self.chunk_size[1] == 0
            && self.position_for(position.start[0], position.start[1]) == Some(*position)
    }

    /// Schemes are compatible when they cover the same grid.
    pub fn is_compatible(&self, other: &ChunkingScheme) -> bool {
        self.dims == other.dims
    }

    /// All tiles, row-major. Each call starts a fresh pass.
    pub fn positions(&self) -> Positions {
        Positions {
            scheme: *self,
            next: 0,
            total: self.total_chunks(),
        }
    }
}

impl fmt::Display for ChunkingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} grid in {}x{} tiles",
            self.dims[0], self.dims[1], self.chunk_size[0], self.chunk_size[1]
        )
    }
}

impl IntoIterator for &ChunkingScheme {
    type Item = ChunkPosition;
    type IntoIter = Positions;

    fn into_iter(self) -> Positions {
        self.positions()
    }
}

/// Iterator over the tiles of a [`ChunkingScheme`].
#[derive(Debug, Clone)]
pub struct Positions {
    scheme: ChunkingScheme,
    next: usize,
    total: usize,
}

impl Iterator for Positions {
    type Item = ChunkPosition;

    fn next(&mut self) -> Option<ChunkPosition> {
        if self.next >= self.total {
            return None;
        }
        let position = self.scheme.position_at(self.next);
        self.next += 1;
        position
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Positions {}

impl FusedIterator for Positions {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousand_grid_in_256_tiles() {
        let scheme = ChunkingScheme::square([1000, 1000], 256).unwrap();
        assert_eq!(scheme.chunk_count(0), 4);
        assert_eq!(scheme.chunk_count(1), 4);
        let last = scheme.position(3, 3).unwrap();
        assert_eq!(last.start, [768, 768]);
        assert_eq!(last.length, [232, 232]);
    }

    #[test]
    fn test_edge_tile_length() {
        // 15 full tiles of 64, then a 40 wide remainder.
        let scheme = ChunkingScheme::square([1000, 1000], 64).unwrap();
        assert_eq!(scheme.chunk_count(0), 16);
        let positions: Vec<_> = scheme.positions().collect();
        assert_eq!(positions.len(), 256);
        assert_eq!(positions[15].length, [64, 40]);
        assert_eq!(positions[255].length, [40, 40]);
        assert_eq!(positions[255].start, [960, 960]);
    }

    #[test]
    fn test_positions_restart() {
        let scheme = ChunkingScheme::new([10, 7], [4, 3]).unwrap();
        let first: Vec<_> = scheme.positions().collect();
        let second: Vec<_> = (&scheme).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(scheme.positions().len(), 9);
    }

    #[test]
    fn test_tile_larger_than_grid() {
        let scheme = ChunkingScheme::square([5, 3], 512).unwrap();
        let positions: Vec<_> = scheme.positions().collect();
        assert_eq!(positions, vec![ChunkPosition::new([0, 0], [5, 3])]);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(matches!(
            ChunkingScheme::new([0, 10], [4, 4]),
            Err(ChunkError::InvalidScheme(_))
        ));
        assert!(ChunkingScheme::new([10, 10], [4, 0]).is_err());
    }

    #[test]
    fn test_native_positions() {
        let scheme = ChunkingScheme::square([100, 100], 32).unwrap();
        assert!(scheme.is_native(&ChunkPosition::new([96, 32], [4, 32])));
        assert!(!scheme.is_native(&ChunkPosition::new([96, 32], [4, 16])));
        assert!(!scheme.is_native(&ChunkPosition::new([10, 0], [32, 32])));
        assert_eq!(
            scheme.position_for(99, 99),
            Some(ChunkPosition::new([96, 96], [4, 4]))
        );
    }

    #[test]
    fn test_compatibility_ignores_tile_size() {
        let a = ChunkingScheme::square([100, 200], 32).unwrap();
        let b = ChunkingScheme::square([100, 200], 50).unwrap();
        let c = ChunkingScheme::square([200, 100], 32).unwrap();
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }
}
