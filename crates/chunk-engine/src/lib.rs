//! Tiled parallel computation over large 2-D grids.
//!
//! A grid is cut into rectangular tiles by a [`ChunkingScheme`]. For each
//! tile, a [`ChunkCollector`] fetches the aligned input chunks from every
//! registered [`ChunkProducer`], a [`ChunkFunction`] turns them into one
//! output chunk and a [`ChunkConsumer`] writes it back. The
//! [`PoolProcessor`] drives that sweep on a bounded thread pool.
//!
//! # Architecture
//!
//! ```text
//!  ChunkingScheme --positions--> PoolProcessor
//!                                     |
//!                                     v  (one ChunkOperation per position)
//!   GridStorage -> ChunkProducer -> ChunkCollector -> ChunkFunction
//!                                                          |
//!   GridStorage <- ChunkConsumer <-------------------------+
//! ```
//!
//! Chunks carry their storage format ([`ChunkFormat`]): a primitive type,
//! an optional missing value, optional packing and an unsigned flag. All
//! packing and range conversion happens inside [`DataChunk`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chunk_engine::{
//!     ChunkCollector, ChunkComputation, ChunkFormat, ChunkProducer, DataType,
//!     ExpressionFunction, GridChunkConsumer, GridChunkProducer, GridInfo,
//!     MemoryGrid, PoolProcessor, SharedGrid,
//! };
//! use grid_expression::{ExpressionParser, Grammar};
//!
//! let format = ChunkFormat::new(DataType::Float);
//! let a = SharedGrid::new(
//!     MemoryGrid::from_doubles(GridInfo::new("a", [4, 4], [2, 2], format), &[2.0; 16]).unwrap(),
//! );
//! let c = SharedGrid::new(MemoryGrid::new(GridInfo::new("c", [4, 4], [2, 2], format)).unwrap());
//!
//! let mut collector = ChunkCollector::new();
//! let consumer = GridChunkConsumer::new(c.clone()).unwrap();
//! let function = ExpressionFunction::compile(
//!     &ExpressionParser::new(Grammar::Modern),
//!     "c = a * 3",
//!     &mut collector,
//!     |name| {
//!         Ok((name == "a").then(|| Arc::new(GridChunkProducer::new(a.clone())) as Arc<dyn ChunkProducer>))
//!     },
//!     c.info().prototype(),
//!     false,
//! )
//! .unwrap();
//!
//! let scheme = c.native_scheme().unwrap();
//! let computation = ChunkComputation::new(collector, Arc::new(function), Arc::new(consumer));
//! let mut processor = PoolProcessor::new();
//! processor.init(scheme.positions(), Arc::new(computation)).unwrap();
//! processor.run().unwrap();
//! ```

pub mod chunk;
pub mod collector;
pub mod config;
pub mod consumer;
pub mod error;
pub mod function;
pub mod grid;
pub mod pool;
pub mod position;
pub mod producer;
pub mod scheme;

pub use chunk::{ChunkAccessor, ChunkData, ChunkFormat, DataChunk, DataType, PackingScheme, Primitive};
pub use collector::{ChunkCollector, CollectorBinder};
pub use config::{EngineConfig, FailurePolicy};
pub use consumer::{ChunkConsumer, GridChunkConsumer};
pub use error::{ChunkError, Result};
pub use function::{
    ChunkComputation, ChunkFunction, ChunkOperation, CompositeFunction, CompositeMethod,
    ComputationTiming, ExpressionFunction, Serial,
};
pub use grid::{CacheStats, CachedGrid, GridInfo, GridStorage, MemoryGrid, SharedGrid, ZarrGrid};
pub use pool::{CancellationToken, PoolProcessor, ProcessorState, RunReport};
pub use position::ChunkPosition;
pub use producer::{ChunkProducer, GridChunkProducer};
pub use scheme::ChunkingScheme;
