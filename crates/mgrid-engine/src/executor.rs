//! Per-worker execution loop.
//!
//! Each worker walks the grid in ascending linear order, skipping points
//! owned by other workers or already done, and drives every remaining
//! point through `PENDING -> RUNNING -> {SUCCEEDED, TIMED_OUT, FAILED}`.
//! Timeouts and failures are contained: a blank sentinel record keeps the
//! result stream rectangular and the sweep moves on. Only memory
//! exhaustion and the all-failed guard abort the sweep.

use std::sync::Arc;

use chrono::Utc;
use mgrid_core::{ErrorInfo, GridError, Payload};
use mgrid_grid::{GridPoint, GridSpace};
use serde::{Deserialize, Serialize};

use crate::balance::AssignmentTable;
use crate::checkpoint::{CheckpointCoordinator, WriteDiscipline};
use crate::comm::GroupChannel;
use crate::config::SweepConfig;
use crate::restart::CompletionState;
use crate::simulate::{run_attempt, Attempt, Simulator};
use crate::store::{ChainRecord, FailRecord, InflightMarker, OutputStore, TimeoutRecord};

/// Terminal outcome of one attempted grid point.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The simulator produced a payload.
    Success(Payload),
    /// The deadline expired and the attempt was abandoned.
    TimedOut,
    /// The simulator failed; diagnostics go to the failure log.
    Failed {
        /// Coarse failure kind.
        kind: String,
        /// Diagnostic message.
        message: String,
    },
}

/// Attempt counters reported by one worker at the end of its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkerReport {
    /// Points attempted by this worker (successes + timeouts + failures).
    pub attempted: usize,
    /// Successful attempts.
    pub succeeded: usize,
    /// Attempts abandoned at the deadline.
    pub timed_out: usize,
    /// Failed attempts.
    pub failed: usize,
    /// Assigned points skipped because a prior run completed them.
    pub skipped_done: usize,
    /// Checkpoint flushes performed (shared discipline counts rounds).
    pub flushes: usize,
}

/// Per-worker execution state over the agreed assignment.
pub struct ExecutionLoop<'a> {
    space: &'a GridSpace,
    table: &'a AssignmentTable,
    completion: &'a CompletionState,
    config: &'a SweepConfig,
    store: &'a OutputStore,
    channel: &'a dyn GroupChannel,
    simulator: Arc<dyn Simulator>,
}

impl<'a> ExecutionLoop<'a> {
    /// Binds a worker to its share of the sweep.
    pub fn new(
        space: &'a GridSpace,
        table: &'a AssignmentTable,
        completion: &'a CompletionState,
        config: &'a SweepConfig,
        store: &'a OutputStore,
        channel: &'a dyn GroupChannel,
        simulator: Arc<dyn Simulator>,
    ) -> Self {
        Self {
            space,
            table,
            completion,
            config,
            store,
            channel,
            simulator,
        }
    }

    /// Number of collective checkpoint rounds every worker must join.
    ///
    /// Derived from the shared assignment and completion state, so all
    /// ranks agree without further communication: the busiest worker's
    /// round count bounds the ring.
    fn collective_rounds(&self) -> usize {
        let mut pending = vec![0usize; self.table.world_size()];
        for index in 0..self.space.size() {
            if !self.completion.is_done(index) {
                pending[self.table.worker_for(index)] += 1;
            }
        }
        pending
            .iter()
            .map(|count| count.div_ceil(self.config.save_freq))
            .max()
            .unwrap_or(0)
    }

    /// Runs the worker to completion, returning its attempt counters.
    pub fn run(self) -> Result<WorkerReport, GridError> {
        let rank = self.channel.rank();
        let deadline = self.config.timeout();
        let mut coordinator =
            CheckpointCoordinator::new(self.store, self.channel, self.config.discipline);
        let target_rounds = match self.config.discipline {
            WriteDiscipline::Shared => self.collective_rounds(),
            WriteDiscipline::Sharded => 0,
        };

        let mut report = WorkerReport::default();
        let mut buffer: Vec<ChainRecord> = Vec::with_capacity(self.config.save_freq);
        let mut fail_log: Vec<FailRecord> = Vec::new();
        let mut timeout_log: Vec<TimeoutRecord> = Vec::new();
        let mut rounds_done = 0usize;

        for point in self.space.points() {
            if self.table.worker_for(point.index) != rank {
                continue;
            }
            if self.completion.is_done(point.index) {
                report.skipped_done += 1;
                continue;
            }

            let mut marker = InflightMarker {
                params: point.stored.clone(),
                started_at: Utc::now().to_rfc3339(),
                finished_at: None,
            };
            self.store.write_inflight(&marker)?;

            let outcome = match run_attempt(&self.simulator, &point.params, deadline) {
                Attempt::Success(payload) => Outcome::Success(payload),
                Attempt::TimedOut => Outcome::TimedOut,
                Attempt::Failed { kind, message } => Outcome::Failed { kind, message },
                Attempt::Fatal(err) => return Err(err),
            };
            report.attempted += 1;
            self.record(&point, outcome, &mut report, &mut buffer, &mut fail_log, &mut timeout_log);

            marker.finished_at = Some(Utc::now().to_rfc3339());
            self.store.write_inflight(&marker)?;

            if buffer.len() == self.config.save_freq {
                self.guard_first_round(rounds_done, &report, &mut fail_log, &mut timeout_log)?;
                self.flush(&mut coordinator, &mut buffer, &mut fail_log, &mut timeout_log)?;
                rounds_done += 1;
                report.flushes += 1;
            }
        }

        // Remaining buffered results are flushed unconditionally; under the
        // shared discipline the worker also joins every outstanding
        // collective round with an empty buffer.
        while !buffer.is_empty() || rounds_done < target_rounds {
            self.guard_first_round(rounds_done, &report, &mut fail_log, &mut timeout_log)?;
            self.flush(&mut coordinator, &mut buffer, &mut fail_log, &mut timeout_log)?;
            rounds_done += 1;
            report.flushes += 1;
            if self.config.discipline == WriteDiscipline::Sharded {
                break;
            }
        }
        if !fail_log.is_empty() || !timeout_log.is_empty() {
            self.store.append_failures(&fail_log)?;
            self.store.append_timeouts(&timeout_log)?;
        }

        coordinator.finalize()?;
        Ok(report)
    }

    fn record(
        &self,
        point: &GridPoint,
        outcome: Outcome,
        report: &mut WorkerReport,
        buffer: &mut Vec<ChainRecord>,
        fail_log: &mut Vec<FailRecord>,
        timeout_log: &mut Vec<TimeoutRecord>,
    ) {
        match outcome {
            Outcome::Success(payload) => {
                report.succeeded += 1;
                buffer.push(ChainRecord {
                    params: point.stored.clone(),
                    payload: Some(payload.values),
                });
            }
            Outcome::TimedOut => {
                report.timed_out += 1;
                timeout_log.push(TimeoutRecord {
                    params: point.stored.clone(),
                });
                buffer.push(ChainRecord {
                    params: point.stored.clone(),
                    payload: None,
                });
            }
            Outcome::Failed { kind, message } => {
                report.failed += 1;
                fail_log.push(FailRecord {
                    params: point.stored.clone(),
                    kind,
                    message,
                });
                buffer.push(ChainRecord {
                    params: point.stored.clone(),
                    payload: None,
                });
            }
        }
    }

    /// Sanity guard against systemic misconfiguration: if nothing but
    /// failures reached the first checkpoint boundary, the shared
    /// dependency is almost certainly broken and the sweep aborts.
    fn guard_first_round(
        &self,
        rounds_done: usize,
        report: &WorkerReport,
        fail_log: &mut Vec<FailRecord>,
        timeout_log: &mut Vec<TimeoutRecord>,
    ) -> Result<(), GridError> {
        if rounds_done == 0 && report.attempted > 0 && report.failed == report.attempted {
            self.store.append_failures(fail_log)?;
            self.store.append_timeouts(timeout_log)?;
            fail_log.clear();
            timeout_log.clear();
            return Err(GridError::AllFailed(
                ErrorInfo::new(
                    "all-failed",
                    format!(
                        "all {} attempts up to the first checkpoint failed",
                        report.attempted
                    ),
                )
                .with_context("rank", self.channel.rank().to_string())
                .with_hint("check the failure log for the shared root cause"),
            ));
        }
        Ok(())
    }

    fn flush(
        &self,
        coordinator: &mut CheckpointCoordinator<'_>,
        buffer: &mut Vec<ChainRecord>,
        fail_log: &mut Vec<FailRecord>,
        timeout_log: &mut Vec<TimeoutRecord>,
    ) -> Result<(), GridError> {
        self.store.append_failures(fail_log)?;
        self.store.append_timeouts(timeout_log)?;
        fail_log.clear();
        timeout_log.clear();
        coordinator.flush(buffer)?;
        buffer.clear();
        Ok(())
    }
}
