//! Parallel scheduler for chunk operations.
//!
//! A [`PoolProcessor`] runs one [`ChunkOperation`] for every position of a
//! sweep, either in position order on one thread or spread over a bounded
//! rayon pool. Each position runs start to finish on a single worker.
//!
//! The processor is single-use: `Idle -> Running -> Completed`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, trace, warn};

use crate::config::{available_threads, EngineConfig, FailurePolicy};
use crate::error::{ChunkError, Result};
use crate::function::ChunkOperation;
use crate::position::ChunkPosition;

/// Lifecycle of a [`PoolProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Running,
    Completed,
}

impl ProcessorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cooperative cancellation flag, checked before each position starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a finished sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub threads: usize,
}

enum Outcome {
    Done,
    Skipped,
    Failed(ChunkError),
}

struct Sweep {
    positions: Vec<ChunkPosition>,
    operation: Arc<dyn ChunkOperation>,
    threads: usize,
    policy: FailurePolicy,
    token: CancellationToken,
}

impl Sweep {
    fn execute(self) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        info!(
            positions = self.positions.len(),
            threads = self.threads,
            policy = %self.policy,
            "Starting chunk sweep"
        );

        let abort = AtomicBool::new(false);
        let outcomes: Vec<Outcome> = if self.threads <= 1 {
            self.positions
                .iter()
                .map(|position| self.run_one(position, &abort))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("chunk-worker-{i}"))
                .build()
                .map_err(|e| {
                    ChunkError::ResourceExhausted(format!("cannot build worker pool: {e}"))
                })?;
            pool.install(|| {
                self.positions
                    .par_iter()
                    .map(|position| self.run_one(position, &abort))
                    .collect()
            })
        };

        let mut report = RunReport {
            started_at,
            completed: 0,
            skipped: 0,
            failed: 0,
            elapsed: Duration::ZERO,
            threads: self.threads,
        };
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Done => report.completed += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(e) => failures.push(e),
            }
        }
        report.failed = failures.len();
        report.elapsed = started.elapsed();

        if !failures.is_empty() {
            error!(
                failed = report.failed,
                completed = report.completed,
                skipped = report.skipped,
                "Chunk sweep failed"
            );
            return Err(match self.policy {
                FailurePolicy::FailFast => failures.swap_remove(0),
                FailurePolicy::Aggregate => ChunkError::Aggregate(failures),
            });
        }
        if report.skipped > 0 {
            warn!(
                completed = report.completed,
                skipped = report.skipped,
                "Chunk sweep cancelled"
            );
            return Err(ChunkError::Cancelled);
        }

        info!(
            completed = report.completed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Chunk sweep finished"
        );
        Ok(report)
    }

    fn run_one(&self, position: &ChunkPosition, abort: &AtomicBool) -> Outcome {
        if self.token.is_cancelled() || abort.load(Ordering::SeqCst) {
            return Outcome::Skipped;
        }
        match self.operation.perform(position) {
            Ok(()) => {
                trace!(position = %position, "Position done");
                Outcome::Done
            }
            Err(e) => {
                if self.policy == FailurePolicy::FailFast {
                    abort.store(true, Ordering::SeqCst);
                }
                Outcome::Failed(e.at(*position))
            }
        }
    }
}

/// Runs one operation over a set of positions with a bounded thread pool.
pub struct PoolProcessor {
    state: ProcessorState,
    positions: Vec<ChunkPosition>,
    operation: Option<Arc<dyn ChunkOperation>>,
    max_operations: usize,
    policy: FailurePolicy,
    token: CancellationToken,
    handle: Option<JoinHandle<Result<RunReport>>>,
}

impl Default for PoolProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolProcessor {
    /// Processor using every hardware thread and failing fast.
    pub fn new() -> Self {
        Self {
            state: ProcessorState::Idle,
            positions: Vec::new(),
            operation: None,
            max_operations: available_threads(),
            policy: FailurePolicy::FailFast,
            token: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut processor = Self::new();
        processor.max_operations = config.thread_count().max(1);
        processor.policy = config.failure_policy;
        processor
    }

    /// Set the positions and the operation to run for each of them.
    pub fn init(
        &mut self,
        positions: impl IntoIterator<Item = ChunkPosition>,
        operation: Arc<dyn ChunkOperation>,
    ) -> Result<()> {
        self.expect_state(ProcessorState::Idle, "init")?;
        self.positions = positions.into_iter().collect();
        self.operation = Some(operation);
        Ok(())
    }

    /// Upper bound on concurrently running positions. 1 runs serially in
    /// position order.
    pub fn set_max_operations(&mut self, max: usize) -> Result<()> {
        self.expect_state(ProcessorState::Idle, "set_max_operations")?;
        if max == 0 {
            return Err(ChunkError::config("max operations must be > 0"));
        }
        self.max_operations = max;
        Ok(())
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    /// Use `token` to cancel the sweep from outside.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Worker threads the sweep will use.
    pub fn effective_threads(&self) -> usize {
        match &self.operation {
            Some(op) if !op.is_thread_safe() => 1,
            _ => self.max_operations.min(available_threads()).max(1),
        }
    }

    /// Begin the sweep on a coordinator thread.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(ProcessorState::Idle, "start")?;
        let operation = self
            .operation
            .clone()
            .ok_or_else(|| ChunkError::InvalidState("start called before init".to_string()))?;

        let threads = self.effective_threads();
        if threads == 1 && !operation.is_thread_safe() && self.max_operations > 1 {
            warn!(
                requested = self.max_operations,
                "Operation is not thread safe, running serially"
            );
        }

        let sweep = Sweep {
            positions: std::mem::take(&mut self.positions),
            operation,
            threads,
            policy: self.policy,
            token: self.token.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("chunk-pool".to_string())
            .spawn(move || sweep.execute())
            .map_err(|e| {
                ChunkError::ResourceExhausted(format!("cannot spawn scheduler thread: {e}"))
            })?;
        self.handle = Some(handle);
        self.state = ProcessorState::Running;
        Ok(())
    }

    /// Block until every position has finished or been skipped.
    pub fn wait_for_completion(&mut self) -> Result<RunReport> {
        self.expect_state(ProcessorState::Running, "wait_for_completion")?;
        let handle = self
            .handle
            .take()
            .ok_or_else(|| ChunkError::InvalidState("no sweep in progress".to_string()))?;
        self.state = ProcessorState::Completed;
        self.operation = None;
        handle
            .join()
            .map_err(|_| ChunkError::function("a chunk operation panicked"))?
    }

    /// `start` followed by `wait_for_completion`.
    pub fn run(&mut self) -> Result<RunReport> {
        self.start()?;
        self.wait_for_completion()
    }

    fn expect_state(&self, expected: ProcessorState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ChunkError::InvalidState(format!(
                "{action} requires a {expected} processor, this one is {}",
                self.state
            )))
        }
    }
}

impl fmt::Debug for PoolProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolProcessor")
            .field("state", &self.state)
            .field("positions", &self.positions.len())
            .field("max_operations", &self.max_operations)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Serial;
    use crate::scheme::ChunkingScheme;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn positions() -> Vec<ChunkPosition> {
        ChunkingScheme::square([10, 10], 3).unwrap().positions().collect()
    }

    #[test]
    fn test_runs_every_position_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut processor = PoolProcessor::new();
        processor
            .init(
                positions(),
                Arc::new(move |p: &ChunkPosition| -> Result<()> {
                    counter.fetch_add(p.values(), Ordering::Relaxed);
                    Ok(())
                }),
            )
            .unwrap();
        processor.set_max_operations(4).unwrap();
        let report = processor.run().unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 100);
        assert_eq!(report.completed, 16);
        assert_eq!(processor.state(), ProcessorState::Completed);
    }

    #[test]
    fn test_serial_runs_in_position_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = order.clone();
        let mut processor = PoolProcessor::new();
        processor
            .init(
                positions(),
                Arc::new(move |p: &ChunkPosition| -> Result<()> {
                    log.lock().unwrap().push(*p);
                    Ok(())
                }),
            )
            .unwrap();
        processor.set_max_operations(1).unwrap();
        assert_eq!(processor.effective_threads(), 1);
        processor.run().unwrap();
        assert_eq!(*order.lock().unwrap(), positions());
    }

    #[test]
    fn test_thread_unsafe_operation_forces_serial() {
        let mut processor = PoolProcessor::new();
        processor
            .init(positions(), Arc::new(Serial(|_: &ChunkPosition| -> Result<()> { Ok(()) })))
            .unwrap();
        processor.set_max_operations(8).unwrap();
        assert_eq!(processor.effective_threads(), 1);
        assert_eq!(processor.run().unwrap().threads, 1);
    }

    #[test]
    fn test_fail_fast_returns_first_error() {
        let mut processor = PoolProcessor::new();
        processor
            .init(
                positions(),
                Arc::new(|p: &ChunkPosition| -> Result<()> {
                    if p.start == [3, 3] {
                        Err(ChunkError::storage("tile unreadable"))
                    } else {
                        Ok(())
                    }
                }),
            )
            .unwrap();
        processor.set_max_operations(1).unwrap();
        let err = processor.run().unwrap_err();
        assert_eq!(err.position(), Some(ChunkPosition::new([3, 3], [3, 3])));
    }

    #[test]
    fn test_aggregate_collects_every_failure() {
        let mut processor = PoolProcessor::new();
        processor.set_failure_policy(FailurePolicy::Aggregate);
        processor
            .init(
                positions(),
                Arc::new(|p: &ChunkPosition| -> Result<()> {
                    if p.start[1] == 9 {
                        Err(ChunkError::storage("edge tile unreadable"))
                    } else {
                        Ok(())
                    }
                }),
            )
            .unwrap();
        match processor.run().unwrap_err() {
            ChunkError::Aggregate(errors) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        let mut processor = PoolProcessor::new().with_cancellation(token.clone());
        processor
            .init(positions(), Arc::new(|_: &ChunkPosition| -> Result<()> { Ok(()) }))
            .unwrap();
        token.cancel();
        assert!(matches!(processor.run(), Err(ChunkError::Cancelled)));
    }

    #[test]
    fn test_no_restart() {
        let mut processor = PoolProcessor::new();
        assert!(matches!(processor.start(), Err(ChunkError::InvalidState(_))));
        processor
            .init(Vec::new(), Arc::new(|_: &ChunkPosition| -> Result<()> { Ok(()) }))
            .unwrap();
        assert_eq!(processor.run().unwrap().completed, 0);
        assert!(matches!(processor.start(), Err(ChunkError::InvalidState(_))));
        assert!(processor.set_max_operations(2).is_err());
    }
}
