//! Top-level sweep orchestration.
//!
//! `run_sweep` owns the whole lifecycle: validate the configuration, decide
//! between a fresh start and a resume, prepare the output directory, spawn
//! one worker thread per rank, and merge the per-worker reports into one
//! summary. Workers never touch the filesystem layout decision; by the time
//! they start, the directory either is freshly prepared or holds prior
//! output being resumed.

use std::sync::Arc;
use std::thread;

use mgrid_core::{ErrorInfo, GridError};
use mgrid_grid::GridSpace;
use serde::Serialize;

use crate::balance::assign;
use crate::comm::{GroupChannel, ReduceOp, ThreadGroup};
use crate::config::SweepConfig;
use crate::executor::ExecutionLoop;
use crate::restart::{reconcile, CompletionState};
use crate::simulate::Simulator;
use crate::store::OutputStore;

/// Merged counters for one finished sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Total points in the grid.
    pub grid_size: usize,
    /// Points a prior run had already completed.
    pub done_before: usize,
    /// Points attempted in this run, across all workers.
    pub attempted: usize,
    /// Successful attempts.
    pub succeeded: usize,
    /// Attempts abandoned at the deadline.
    pub timed_out: usize,
    /// Failed attempts.
    pub failed: usize,
    /// Checkpoint flushes performed, across all workers.
    pub flushes: usize,
}

impl SweepSummary {
    /// Whether every grid point now has a result record.
    pub fn is_complete(&self) -> bool {
        self.done_before + self.attempted >= self.grid_size
    }
}

/// Runs a full sweep over `space` with `config.workers` in-process workers.
///
/// `simulator_for` is invoked once per rank on the calling thread, so
/// factories may hand every rank the same shared instance or build
/// rank-local state. Returns once every worker has finished. When a rank
/// dies its dropped channels make the surviving ranks fail with generic
/// communication errors, so error selection prefers any other error kind
/// over `Comm` before falling back to the first error in rank order.
pub fn run_sweep<F>(
    space: &GridSpace,
    config: &SweepConfig,
    mut simulator_for: F,
) -> Result<SweepSummary, GridError>
where
    F: FnMut(usize) -> Arc<dyn Simulator>,
{
    config.validate()?;
    let world = config.workers;
    let store = OutputStore::new(
        &config.output.directory,
        &config.output.prefix,
        0,
        config.discipline,
    );
    let prior = store.has_prior_output();
    if prior && !config.restart && !config.overwrite {
        return Err(GridError::Config(
            ErrorInfo::new(
                "output-exists",
                format!(
                    "output prefix '{}' already exists in {}",
                    config.output.prefix,
                    config.output.directory.display()
                ),
            )
            .with_hint("set restart to resume it or overwrite to discard it"),
        ));
    }
    let resuming = config.restart && prior && !config.overwrite;
    if !resuming {
        store.prepare(space, world, config.overwrite)?;
    }

    let simulators: Vec<Arc<dyn Simulator>> = (0..world).map(&mut simulator_for).collect();
    let channels = ThreadGroup::create(world);
    let results: Vec<Result<Option<SweepSummary>, GridError>> = thread::scope(|scope| {
        let joins: Vec<_> = channels
            .into_iter()
            .zip(simulators)
            .map(|(channel, simulator)| {
                scope.spawn(move || worker(space, config, channel, simulator, resuming))
            })
            .collect();
        joins
            .into_iter()
            .map(|join| {
                join.join().unwrap_or_else(|_| {
                    Err(GridError::Comm(ErrorInfo::new(
                        "worker-panic",
                        "a worker thread panicked outside the simulator",
                    )))
                })
            })
            .collect()
    });

    let mut summary = None;
    let mut first_err: Option<GridError> = None;
    for outcome in results {
        match outcome {
            Ok(Some(merged)) => summary = Some(merged),
            Ok(None) => {}
            Err(err) => match &first_err {
                Some(GridError::Comm(_)) if !matches!(err, GridError::Comm(_)) => {
                    first_err = Some(err);
                }
                Some(_) => {}
                None => first_err = Some(err),
            },
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }
    summary.ok_or_else(|| {
        GridError::Comm(ErrorInfo::new(
            "summary-missing",
            "rank 0 finished without producing a summary",
        ))
    })
}

fn worker(
    space: &GridSpace,
    config: &SweepConfig,
    channel: ThreadGroup,
    simulator: Arc<dyn Simulator>,
    resuming: bool,
) -> Result<Option<SweepSummary>, GridError> {
    let store = OutputStore::new(
        &config.output.directory,
        &config.output.prefix,
        channel.rank(),
        config.discipline,
    );
    let table = assign(space, &config.strategy, &channel)?;
    if channel.rank() == 0 {
        store.append_load(&table)?;
    }
    let completion = if resuming {
        reconcile(&store, space, config.tolerance, &channel, config.discipline)?
    } else {
        CompletionState::all_pending(space)
    };

    // A fully-done grid still takes this path: the loop attempts nothing,
    // joins no checkpoint rounds, and exits through the final barrier.
    let report = ExecutionLoop::new(
        space,
        &table,
        &completion,
        config,
        &store,
        &channel,
        simulator,
    )
    .run()?;

    let local = [
        report.attempted as u64,
        report.succeeded as u64,
        report.timed_out as u64,
        report.failed as u64,
        report.flushes as u64,
    ];
    let totals = channel.all_reduce(&local, ReduceOp::Sum)?;
    if channel.rank() == 0 {
        Ok(Some(SweepSummary {
            grid_size: space.size(),
            done_before: completion.done_count(),
            attempted: totals[0] as usize,
            succeeded: totals[1] as usize,
            timed_out: totals[2] as usize,
            failed: totals[3] as usize,
            flushes: totals[4] as usize,
        }))
    } else {
        Ok(None)
    }
}
