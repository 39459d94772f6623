//! LRU cache of decoded tiles.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::Serialize;

use super::{GridInfo, GridStorage};
use crate::chunk::DataChunk;
use crate::error::Result;
use crate::position::ChunkPosition;
use crate::scheme::ChunkingScheme;

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A grid wrapper that keeps recently read tiles in memory.
///
/// Meant for auxiliary lookup grids that many positions sample at random,
/// typically shared through a [`SharedGrid`](super::SharedGrid). Writes go
/// through to the wrapped grid; every cached tile overlapping the written
/// region is dropped before the written chunk is remembered.
pub struct CachedGrid<G> {
    inner: G,
    scheme: ChunkingScheme,
    cache: LruCache<ChunkPosition, DataChunk>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<G: GridStorage> CachedGrid<G> {
    /// Wrap `inner`, keeping at most `capacity` tiles (minimum one).
    pub fn new(inner: G, capacity: usize) -> Result<Self> {
        let scheme = inner.info().native_scheme()?;
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            inner,
            scheme,
            cache: LruCache::new(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn into_inner(self) -> G {
        self.inner
    }

    /// Decoded value of one grid cell, NaN when missing or outside the grid.
    pub fn lookup(&mut self, row: usize, col: usize) -> Result<f64> {
        let Some(tile) = self.scheme.position_for(row, col) else {
            return Ok(f64::NAN);
        };
        let chunk = self.read(&tile)?;
        Ok(tile
            .local_index(row, col)
            .map_or(f64::NAN, |index| chunk.get_f64(index)))
    }

    fn invalidate(&mut self, written: &ChunkPosition) {
        let stale: Vec<ChunkPosition> = self
            .cache
            .iter()
            .map(|(position, _)| *position)
            .filter(|position| position.overlaps(written))
            .collect();
        for position in stale {
            self.cache.pop(&position);
        }
    }

    fn remember(&mut self, position: ChunkPosition, chunk: DataChunk) {
        if let Some((evicted, _)) = self.cache.push(position, chunk) {
            if evicted != position {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<G: GridStorage> GridStorage for CachedGrid<G> {
    fn info(&self) -> &GridInfo {
        self.inner.info()
    }

    fn read(&mut self, position: &ChunkPosition) -> Result<DataChunk> {
        if let Some(chunk) = self.cache.get(position) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(chunk.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let chunk = self.inner.read(position)?;
        self.remember(*position, chunk.clone());
        Ok(chunk)
    }

    fn write(&mut self, position: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        self.inner.write(position, chunk)?;
        self.invalidate(position);
        self.remember(*position, chunk.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}
