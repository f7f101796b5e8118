//! Restart reconciliation against prior output.
//!
//! A restart rebuilds "already done" state from the chain streams of the
//! interrupted run. Axis count and identity must match the current grid;
//! axis *values* may have been pruned or reordered, which is why prior
//! records are mapped through tolerant coordinate lookup instead of being
//! reinterpreted index-for-index. Records that no longer exist in the grid
//! are skipped benignly.

use mgrid_core::{ErrorInfo, GridError};
use mgrid_grid::GridSpace;

use crate::checkpoint::WriteDiscipline;
use crate::comm::{GroupChannel, ReduceOp};
use crate::store::{OutputStore, ParamInfo};

/// Per-point completion snapshot, built once at restart and read-only
/// during execution.
///
/// Structured grids track a boolean per linear index. Unstructured grids
/// track a single resume count, since their points are not guaranteed
/// re-locatable after the fact; the first `resume_count` points in linear
/// order are treated as done.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionState {
    structured: bool,
    done: Vec<bool>,
    resume_count: usize,
    total: usize,
}

impl CompletionState {
    /// State with every point pending, used for fresh sweeps and for
    /// restarts whose prior log is empty.
    pub fn all_pending(space: &GridSpace) -> Self {
        Self {
            structured: space.is_structured(),
            done: vec![false; if space.is_structured() { space.size() } else { 0 }],
            resume_count: 0,
            total: space.size(),
        }
    }

    /// Whether the point at the given linear index is already done.
    pub fn is_done(&self, index: usize) -> bool {
        if self.structured {
            self.done[index]
        } else {
            index < self.resume_count
        }
    }

    /// Number of points marked done.
    pub fn done_count(&self) -> usize {
        if self.structured {
            self.done.iter().filter(|&&d| d).count()
        } else {
            self.resume_count.min(self.total)
        }
    }

    /// Number of points still pending.
    pub fn pending_count(&self) -> usize {
        self.total - self.done_count()
    }
}

/// Reconciles prior output against the current grid definition.
///
/// Sharded discipline: each rank scans its own chain stream and the masks
/// are merged with an all-reduce, so every worker ends up with the same
/// completion state. Shared discipline: rank 0 scans the single stream and
/// the merge distributes it.
pub fn reconcile(
    store: &OutputStore,
    space: &GridSpace,
    tolerance: f64,
    channel: &dyn GroupChannel,
    discipline: WriteDiscipline,
) -> Result<CompletionState, GridError> {
    let info = store.read_pinfo()?;
    check_compatibility(&info, space)?;
    if discipline == WriteDiscipline::Sharded {
        let beyond = store.chain_path_for(channel.world_size());
        if beyond.exists() {
            return Err(GridError::Restart(
                ErrorInfo::new(
                    "restart-worker-count",
                    "prior output was produced by a larger worker pool",
                )
                .with_context("path", beyond.display().to_string()),
            ));
        }
    }

    let local = match discipline {
        WriteDiscipline::Sharded => store.read_chain(&store.chain_path_for(channel.rank()))?,
        WriteDiscipline::Shared if channel.rank() == 0 => {
            store.read_chain(&store.chain_path())?
        }
        WriteDiscipline::Shared => Vec::new(),
    };

    if space.is_structured() {
        let mut mask = vec![0u64; space.size()];
        for record in &local {
            if record.params.len() != info.ndim {
                return Err(GridError::Restart(ErrorInfo::new(
                    "restart-record-width",
                    format!(
                        "prior record has {} parameters, grid has {}",
                        record.params.len(),
                        info.ndim
                    ),
                )));
            }
            // Benign skip: the value was pruned from the current grid.
            if let Some(coord) = space.locate_stored(&record.params, tolerance)? {
                mask[space.coord_to_index(&coord)] = 1;
            }
        }
        let merged = channel.all_reduce(&mask, ReduceOp::Max)?;
        Ok(CompletionState {
            structured: true,
            done: merged.into_iter().map(|bit| bit != 0).collect(),
            resume_count: 0,
            total: space.size(),
        })
    } else {
        let counts = channel.all_reduce(&[local.len() as u64], ReduceOp::Sum)?;
        Ok(CompletionState {
            structured: false,
            done: Vec::new(),
            resume_count: counts[0] as usize,
            total: space.size(),
        })
    }
}

fn check_compatibility(info: &ParamInfo, space: &GridSpace) -> Result<(), GridError> {
    let names = space.axis_names();
    if info.ndim != names.len() || info.structured != space.is_structured() {
        return Err(GridError::Restart(
            ErrorInfo::new("restart-dimensionality", "cannot change dimensionality on restart")
                .with_context("prior", info.ndim.to_string())
                .with_context("current", names.len().to_string()),
        ));
    }
    if space.is_structured() {
        if info.axis_names != names || info.log_flags != space.log_flags() {
            return Err(GridError::Restart(
                ErrorInfo::new("restart-axes", "cannot change axis variables on restart")
                    .with_context("prior", info.axis_names.join(","))
                    .with_context("current", names.join(",")),
            ));
        }
    } else {
        for prior in &info.axis_names {
            if !names.contains(prior) {
                return Err(GridError::Restart(
                    ErrorInfo::new("restart-axes", "cannot change axis variables on restart")
                        .with_context("missing", prior),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloChannel;
    use crate::store::ChainRecord;
    use mgrid_core::ParamSet;
    use mgrid_grid::GridAxis;
    use tempfile::tempdir;

    fn sample_space() -> GridSpace {
        GridSpace::build(vec![
            GridAxis::new("a", vec![1.0, 2.0], false).unwrap(),
            GridAxis::new("b", vec![10.0, 20.0], false).unwrap(),
        ])
        .unwrap()
    }

    fn prepared_store(dir: &std::path::Path) -> OutputStore {
        let store = OutputStore::new(dir, "run", 0, WriteDiscipline::Sharded);
        store.prepare(&sample_space(), 1, false).unwrap();
        store
    }

    #[test]
    fn empty_prior_log_leaves_everything_pending() {
        let dir = tempdir().unwrap();
        let store = prepared_store(dir.path());
        let space = sample_space();
        let state =
            reconcile(&store, &space, 1e-3, &SoloChannel, WriteDiscipline::Sharded).unwrap();
        assert_eq!(state.done_count(), 0);
        assert_eq!(state.pending_count(), 4);
    }

    #[test]
    fn prior_records_mark_points_done_and_reconcile_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = prepared_store(dir.path());
        let space = sample_space();
        store
            .append_chain(&[
                ChainRecord {
                    params: vec![1.0, 10.0],
                    payload: Some(vec![0.0]),
                },
                ChainRecord {
                    params: vec![2.0, 20.0],
                    payload: None,
                },
            ])
            .unwrap();
        let first =
            reconcile(&store, &space, 1e-3, &SoloChannel, WriteDiscipline::Sharded).unwrap();
        let second =
            reconcile(&store, &space, 1e-3, &SoloChannel, WriteDiscipline::Sharded).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.done_count(), 2);
        assert!(first.is_done(0));
        assert!(first.is_done(3));
        assert!(!first.is_done(1));
    }

    #[test]
    fn pruned_values_skip_benignly() {
        let dir = tempdir().unwrap();
        let store = prepared_store(dir.path());
        let space = sample_space();
        store
            .append_chain(&[ChainRecord {
                params: vec![3.0, 10.0], // a=3.0 no longer in the grid
                payload: Some(vec![0.0]),
            }])
            .unwrap();
        let state =
            reconcile(&store, &space, 1e-3, &SoloChannel, WriteDiscipline::Sharded).unwrap();
        assert_eq!(state.done_count(), 0);
    }

    #[test]
    fn axis_identity_change_is_incompatible() {
        let dir = tempdir().unwrap();
        let store = prepared_store(dir.path());
        let renamed = GridSpace::build(vec![
            GridAxis::new("a", vec![1.0, 2.0], false).unwrap(),
            GridAxis::new("c", vec![10.0, 20.0], false).unwrap(),
        ])
        .unwrap();
        assert!(matches!(
            reconcile(&store, &renamed, 1e-3, &SoloChannel, WriteDiscipline::Sharded),
            Err(GridError::Restart(_))
        ));
        let narrowed =
            GridSpace::build(vec![GridAxis::new("a", vec![1.0, 2.0], false).unwrap()]).unwrap();
        assert!(matches!(
            reconcile(&store, &narrowed, 1e-3, &SoloChannel, WriteDiscipline::Sharded),
            Err(GridError::Restart(_))
        ));
    }

    #[test]
    fn unstructured_resume_counts_records() {
        let dir = tempdir().unwrap();
        let mut points = Vec::new();
        for i in 0..3 {
            let mut params = ParamSet::new();
            params.insert("x".to_string(), i as f64);
            points.push(params);
        }
        let space = GridSpace::from_points(points).unwrap();
        let store = OutputStore::new(dir.path(), "run", 0, WriteDiscipline::Sharded);
        store.prepare(&space, 1, false).unwrap();
        store
            .append_chain(&[
                ChainRecord {
                    params: vec![0.0],
                    payload: Some(vec![0.0]),
                },
                ChainRecord {
                    params: vec![1.0],
                    payload: Some(vec![0.0]),
                },
            ])
            .unwrap();
        let state =
            reconcile(&store, &space, 1e-3, &SoloChannel, WriteDiscipline::Sharded).unwrap();
        assert_eq!(state.done_count(), 2);
        assert!(state.is_done(0));
        assert!(state.is_done(1));
        assert!(!state.is_done(2));
    }
}
