//! Ordered producer registry.
//!
//! A [`ChunkCollector`] owns every producer of one computation. Indexes
//! handed out by [`ChunkCollector::add_producer`] never change, so a
//! compiled expression can address its inputs as `chunks[index]`.

use std::sync::Arc;

use grid_expression::{ValueType, VariableResolver};
use tracing::debug;

use crate::chunk::DataChunk;
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;
use crate::producer::ChunkProducer;

#[derive(Default, Clone)]
pub struct ChunkCollector {
    entries: Vec<(String, Arc<dyn ChunkProducer>)>,
}

impl ChunkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer under its own name, returning its index.
    pub fn add_producer(&mut self, producer: Arc<dyn ChunkProducer>) -> usize {
        let name = producer.name().to_string();
        self.add_named(name, producer)
    }

    /// Register a producer under `name`, returning its index.
    pub fn add_named(&mut self, name: impl Into<String>, producer: Arc<dyn ChunkProducer>) -> usize {
        let name = name.into();
        debug!(variable = %name, index = self.entries.len(), "Registered producer");
        self.entries.push((name, producer));
        self.entries.len() - 1
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    pub fn producer(&self, index: usize) -> Option<&Arc<dyn ChunkProducer>> {
        self.entries.get(index).map(|(_, p)| p)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every producer covers a grid of `dims`.
    pub fn verify_dims(&self, dims: [usize; 2]) -> Result<()> {
        for (name, producer) in &self.entries {
            let found = producer.dims();
            if found != dims {
                return Err(ChunkError::Alignment {
                    producer: name.clone(),
                    position: ChunkPosition::new([0, 0], dims),
                    expected: format!("grid {}x{}", dims[0], dims[1]),
                    found: format!("grid {}x{}", found[0], found[1]),
                });
            }
        }
        Ok(())
    }

    /// Fetch the chunk at `position` from every producer, in registration
    /// order. Any failure fails the whole fetch.
    pub fn get_chunks(&self, position: &ChunkPosition) -> Result<Vec<DataChunk>> {
        let expected = position.values();
        let mut chunks = Vec::with_capacity(self.entries.len());
        for (name, producer) in &self.entries {
            let chunk = producer.get_chunk(position)?;
            if chunk.len() != expected {
                return Err(ChunkError::Alignment {
                    producer: name.clone(),
                    position: *position,
                    expected: format!("{expected} values"),
                    found: format!("{} values", chunk.len()),
                });
            }
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

impl std::fmt::Debug for ChunkCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

type Lookup<'a> = dyn FnMut(&str) -> Result<Option<Arc<dyn ChunkProducer>>> + 'a;

/// Resolves expression variables against a collector, registering
/// producers the first time a name is seen.
///
/// Lookup failures cannot travel through [`VariableResolver`], so the
/// first one is kept and returned by [`finish`](Self::finish).
pub struct CollectorBinder<'a> {
    collector: &'a mut ChunkCollector,
    lookup: Box<Lookup<'a>>,
    error: Option<ChunkError>,
}

impl<'a> CollectorBinder<'a> {
    pub fn new(
        collector: &'a mut ChunkCollector,
        lookup: impl FnMut(&str) -> Result<Option<Arc<dyn ChunkProducer>>> + 'a,
    ) -> Self {
        Self {
            collector,
            lookup: Box::new(lookup),
            error: None,
        }
    }

    /// Binder that only resolves names already registered.
    pub fn registered_only(collector: &'a mut ChunkCollector) -> Self {
        Self::new(collector, |_| Ok(None))
    }

    pub fn finish(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl VariableResolver for CollectorBinder<'_> {
    fn resolve(&mut self, name: &str) -> Option<(usize, ValueType)> {
        if let Some(index) = self.collector.index_of(name) {
            let producer = self.collector.producer(index)?;
            return Some((index, producer.external_type().value_type()));
        }
        if self.error.is_some() {
            return None;
        }
        match (self.lookup)(name) {
            Ok(Some(producer)) => {
                let value_type = producer.external_type().value_type();
                let index = self.collector.add_named(name, producer);
                Some((index, value_type))
            }
            Ok(None) => None,
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFormat, DataType};
    use crate::grid::{GridInfo, MemoryGrid, SharedGrid};
    use crate::producer::GridChunkProducer;

    fn producer(name: &str, dims: [usize; 2], value: f64) -> Arc<dyn ChunkProducer> {
        let info = GridInfo::new(name, dims, [2, 2], ChunkFormat::new(DataType::Float));
        let values = vec![value; dims[0] * dims[1]];
        let grid = MemoryGrid::from_doubles(info, &values).unwrap();
        Arc::new(GridChunkProducer::new(SharedGrid::new(grid)))
    }

    #[test]
    fn test_indexes_follow_registration_order() {
        let mut collector = ChunkCollector::new();
        assert_eq!(collector.add_producer(producer("a", [3, 3], 1.0)), 0);
        assert_eq!(collector.add_producer(producer("b", [3, 3], 2.0)), 1);
        assert_eq!(collector.index_of("b"), Some(1));
        assert_eq!(collector.index_of("c"), None);

        let chunks = collector
            .get_chunks(&ChunkPosition::new([2, 0], [1, 2]))
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].get_f64(0), 2.0);
    }

    #[test]
    fn test_verify_dims() {
        let mut collector = ChunkCollector::new();
        collector.add_producer(producer("a", [3, 3], 1.0));
        collector.add_producer(producer("b", [3, 4], 1.0));
        assert!(collector.verify_dims([3, 3]).is_err());
    }

    struct Truncating;

    impl ChunkProducer for Truncating {
        fn name(&self) -> &str {
            "short"
        }

        fn dims(&self) -> [usize; 2] {
            [4, 4]
        }

        fn format(&self) -> ChunkFormat {
            ChunkFormat::new(DataType::Float)
        }

        fn get_chunk(&self, position: &ChunkPosition) -> Result<DataChunk> {
            DataChunk::prototype(self.format()).blank_copy_with_values(position.values() - 1)
        }
    }

    #[test]
    fn test_misaligned_fetch_fails_whole_position() {
        let mut collector = ChunkCollector::new();
        collector.add_producer(producer("a", [4, 4], 1.0));
        collector.add_producer(Arc::new(Truncating));
        let err = collector
            .get_chunks(&ChunkPosition::new([2, 2], [2, 2]))
            .unwrap_err();
        assert!(matches!(err, ChunkError::Alignment { ref producer, .. } if producer == "short"));

        let mut collector = ChunkCollector::new();
        collector.add_producer(producer("a", [4, 4], 1.0));
        collector.add_producer(producer("b", [2, 2], 1.0));
        let err = collector
            .get_chunks(&ChunkPosition::new([2, 2], [2, 2]))
            .unwrap_err();
        assert!(matches!(err, ChunkError::Storage(_)));
    }

    #[test]
    fn test_binder_registers_lazily_once() {
        let mut collector = ChunkCollector::new();
        let mut lookups = 0;
        {
            let mut binder = CollectorBinder::new(&mut collector, |name| {
                lookups += 1;
                Ok((name != "missing").then(|| producer(name, [2, 2], 0.0)))
            });
            assert_eq!(binder.resolve("x"), Some((0, ValueType::Float)));
            assert_eq!(binder.resolve("x"), Some((0, ValueType::Float)));
            assert_eq!(binder.resolve("y"), Some((1, ValueType::Float)));
            assert_eq!(binder.resolve("missing"), None);
            binder.finish().unwrap();
        }
        assert_eq!(lookups, 3);
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn test_binder_keeps_lookup_error() {
        let mut collector = ChunkCollector::new();
        let mut binder =
            CollectorBinder::new(&mut collector, |_| Err(ChunkError::storage("unreadable")));
        assert_eq!(binder.resolve("x"), None);
        assert!(matches!(binder.finish(), Err(ChunkError::Storage(_))));
    }
}
