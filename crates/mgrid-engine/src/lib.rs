#![deny(missing_docs)]
//! Grid execution and scheduling engine for mgrid sweeps.
//!
//! The engine distributes an enumerated [`mgrid_grid::GridSpace`] across a
//! fixed pool of workers, runs one possibly-failing simulation per point
//! under an optional deadline, checkpoints buffered results through a
//! write discipline that keeps concurrent writers from corrupting shared
//! output, and reconciles prior output on restart so completed points are
//! never re-run.

/// Load-balance strategies and the shared assignment table.
pub mod balance;
/// Checkpoint flush ordering across workers.
pub mod checkpoint;
/// Collective-communication capability between workers.
pub mod comm;
/// Sweep configuration schema and defaults.
pub mod config;
/// Per-worker execution loop.
pub mod executor;
/// Canonical serialization and identity hashing helpers.
pub mod hash;
/// Restart reconciliation against prior output.
pub mod restart;
/// Simulator contract and deadline-bound invocation.
pub mod simulate;
/// On-disk result streams, logs, and markers.
pub mod store;
/// End-to-end sweep runner over a worker pool.
pub mod runner;

pub use balance::{assign, AssignmentTable, BalanceStrategy};
pub use checkpoint::{CheckpointCoordinator, WriteDiscipline};
pub use comm::{GroupChannel, ReduceOp, SoloChannel, ThreadGroup};
pub use config::{OutputConfig, SweepConfig};
pub use executor::{ExecutionLoop, Outcome, WorkerReport};
pub use restart::{reconcile, CompletionState};
pub use simulate::{Simulator, SimulatorError};
pub use store::{ChainRecord, FailRecord, InflightMarker, OutputStore, ParamInfo, TimeoutRecord};
pub use runner::{run_sweep, SweepSummary};
