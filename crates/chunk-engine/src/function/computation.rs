use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::trace;

use super::{ChunkFunction, ChunkOperation};
use crate::collector::ChunkCollector;
use crate::consumer::ChunkConsumer;
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;

/// Accumulated wall time per stage, summed over all worker threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComputationTiming {
    pub read: Duration,
    pub compute: Duration,
    pub write: Duration,
    pub positions: u64,
}

impl ComputationTiming {
    pub fn total(&self) -> Duration {
        self.read + self.compute + self.write
    }
}

#[derive(Debug, Default)]
struct Counters {
    read: AtomicU64,
    compute: AtomicU64,
    write: AtomicU64,
    positions: AtomicU64,
}

fn add_elapsed(counter: &AtomicU64, since: Instant) {
    let nanos = u64::try_from(since.elapsed().as_nanos()).unwrap_or(u64::MAX);
    counter.fetch_add(nanos, Ordering::Relaxed);
}

/// Fetch, compute, write: one collector, one function, one consumer.
pub struct ChunkComputation {
    collector: ChunkCollector,
    function: Arc<dyn ChunkFunction>,
    consumer: Arc<dyn ChunkConsumer>,
    counters: Option<Counters>,
}

impl ChunkComputation {
    pub fn new(
        collector: ChunkCollector,
        function: Arc<dyn ChunkFunction>,
        consumer: Arc<dyn ChunkConsumer>,
    ) -> Self {
        Self {
            collector,
            function,
            consumer,
            counters: None,
        }
    }

    /// Record time spent in each stage.
    pub fn with_timing(mut self) -> Self {
        self.counters = Some(Counters::default());
        self
    }

    pub fn collector(&self) -> &ChunkCollector {
        &self.collector
    }

    pub fn consumer(&self) -> &Arc<dyn ChunkConsumer> {
        &self.consumer
    }

    /// Stage times so far, `None` unless built with [`with_timing`](Self::with_timing).
    pub fn timing(&self) -> Option<ComputationTiming> {
        self.counters.as_ref().map(|c| ComputationTiming {
            read: Duration::from_nanos(c.read.load(Ordering::Relaxed)),
            compute: Duration::from_nanos(c.compute.load(Ordering::Relaxed)),
            write: Duration::from_nanos(c.write.load(Ordering::Relaxed)),
            positions: c.positions.load(Ordering::Relaxed),
        })
    }
}

impl ChunkOperation for ChunkComputation {
    fn perform(&self, position: &ChunkPosition) -> Result<()> {
        trace!(position = %position, "Computing chunk");

        let started = Instant::now();
        let inputs = self.collector.get_chunks(position)?;
        if let Some(c) = &self.counters {
            add_elapsed(&c.read, started);
        }

        let started = Instant::now();
        let output = self.function.apply(position, &inputs)?;
        if let Some(c) = &self.counters {
            add_elapsed(&c.compute, started);
        }
        if output.len() != position.values() {
            return Err(ChunkError::function(format!(
                "produced {} values for {position}, expected {}",
                output.len(),
                position.values()
            )));
        }

        let started = Instant::now();
        self.consumer.put_chunk(position, &output)?;
        if let Some(c) = &self.counters {
            add_elapsed(&c.write, started);
            c.positions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn is_thread_safe(&self) -> bool {
        self.function.is_thread_safe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFormat, DataChunk, DataType};
    use crate::consumer::GridChunkConsumer;
    use crate::grid::{GridInfo, MemoryGrid, SharedGrid};
    use crate::producer::GridChunkProducer;

    struct Doubler;

    impl ChunkFunction for Doubler {
        fn apply(&self, _: &ChunkPosition, inputs: &[DataChunk]) -> Result<DataChunk> {
            let values: Vec<f64> = inputs[0]
                .to_double_array()?
                .into_iter()
                .map(|v| v * 2.0)
                .collect();
            DataChunk::from_doubles(ChunkFormat::new(DataType::Double), &values)
        }
    }

    struct Empty;

    impl ChunkFunction for Empty {
        fn apply(&self, _: &ChunkPosition, _: &[DataChunk]) -> Result<DataChunk> {
            Ok(DataChunk::prototype(ChunkFormat::new(DataType::Double)))
        }

        fn is_thread_safe(&self) -> bool {
            false
        }
    }

    fn setup(function: Arc<dyn ChunkFunction>) -> (ChunkComputation, SharedGrid) {
        let format = ChunkFormat::new(DataType::Float);
        let input = MemoryGrid::from_doubles(
            GridInfo::new("a", [2, 2], [2, 2], format),
            &[1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let output = SharedGrid::new(MemoryGrid::new(GridInfo::new("b", [2, 2], [2, 2], format)).unwrap());
        let mut collector = ChunkCollector::new();
        collector.add_producer(Arc::new(GridChunkProducer::new(SharedGrid::new(input))));
        let consumer = Arc::new(GridChunkConsumer::new(output.clone()).unwrap());
        (ChunkComputation::new(collector, function, consumer), output)
    }

    #[test]
    fn test_perform_writes_output() {
        let (computation, output) = setup(Arc::new(Doubler));
        let computation = computation.with_timing();
        let position = ChunkPosition::new([0, 0], [2, 2]);
        computation.perform(&position).unwrap();
        let written = output.read(&position).unwrap().to_double_array().unwrap();
        assert_eq!(written, vec![2.0, 4.0, 6.0, 8.0]);
        assert_eq!(computation.timing().unwrap().positions, 1);
    }

    #[test]
    fn test_wrong_output_length_fails() {
        let (computation, _) = setup(Arc::new(Empty));
        assert!(!computation.is_thread_safe());
        assert!(computation.timing().is_none());
        let err = computation
            .perform(&ChunkPosition::new([0, 0], [2, 2]))
            .unwrap_err();
        assert!(matches!(err, ChunkError::Function(_)));
    }
}
