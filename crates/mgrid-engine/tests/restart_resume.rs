use std::sync::{Arc, Mutex};

use mgrid_core::{GridError, ParamSet, Payload};
use mgrid_engine::{
    run_sweep, ChainRecord, OutputStore, Simulator, SimulatorError, SweepConfig, WriteDiscipline,
};
use mgrid_grid::{GridAxis, GridSpace};
use tempfile::tempdir;

/// Records every parameter set it is asked to simulate.
struct RecordingSimulator {
    seen: Mutex<Vec<Vec<f64>>>,
}

impl RecordingSimulator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Vec<f64>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Simulator for RecordingSimulator {
    fn payload_len(&self) -> usize {
        1
    }

    fn simulate(&self, params: &ParamSet) -> Result<Payload, SimulatorError> {
        let values: Vec<f64> = params.values().copied().collect();
        self.seen.lock().unwrap().push(values);
        Ok(Payload::new(vec![0.0]))
    }
}

fn sample_space() -> GridSpace {
    GridSpace::build(vec![
        GridAxis::new("a", vec![1.0, 2.0], false).unwrap(),
        GridAxis::new("b", vec![10.0, 20.0], false).unwrap(),
    ])
    .unwrap()
}

fn restart_config(dir: &std::path::Path) -> SweepConfig {
    let mut config = SweepConfig::default();
    config.output.directory = dir.to_path_buf();
    config.restart = true;
    config
}

#[test]
fn restart_attempts_only_the_missing_point() {
    let dir = tempdir().unwrap();
    let space = sample_space();
    let store = OutputStore::new(dir.path(), "modelgrid", 0, WriteDiscipline::Sharded);
    store.prepare(&space, 1, false).unwrap();
    store
        .append_chain(&[
            ChainRecord { params: vec![1.0, 10.0], payload: Some(vec![0.0]) },
            ChainRecord { params: vec![1.0, 20.0], payload: Some(vec![0.0]) },
            ChainRecord { params: vec![2.0, 10.0], payload: None },
        ])
        .unwrap();

    let sim = RecordingSimulator::new();
    let summary = run_sweep(&space, &restart_config(dir.path()), |_| {
        sim.clone() as Arc<dyn Simulator>
    })
    .unwrap();
    assert_eq!(summary.done_before, 3);
    assert_eq!(summary.attempted, 1);
    assert!(summary.is_complete());
    // Blank (failed) records count as done; only a=2, b=20 was pending.
    assert_eq!(sim.seen(), vec![vec![2.0, 20.0]]);

    let records = store.read_chain(&store.chain_path()).unwrap();
    assert_eq!(records.len(), 4);
}

#[test]
fn restart_with_empty_prior_log_runs_everything() {
    let dir = tempdir().unwrap();
    let space = sample_space();
    let store = OutputStore::new(dir.path(), "modelgrid", 0, WriteDiscipline::Sharded);
    store.prepare(&space, 1, false).unwrap();

    let sim = RecordingSimulator::new();
    let summary = run_sweep(&space, &restart_config(dir.path()), |_| {
        sim.clone() as Arc<dyn Simulator>
    })
    .unwrap();
    assert_eq!(summary.done_before, 0);
    assert_eq!(summary.attempted, 4);
    assert_eq!(sim.seen().len(), 4);
}

#[test]
fn restart_refuses_changed_axis_identity() {
    let dir = tempdir().unwrap();
    let store = OutputStore::new(dir.path(), "modelgrid", 0, WriteDiscipline::Sharded);
    store.prepare(&sample_space(), 1, false).unwrap();

    let renamed = GridSpace::build(vec![
        GridAxis::new("a", vec![1.0, 2.0], false).unwrap(),
        GridAxis::new("c", vec![10.0, 20.0], false).unwrap(),
    ])
    .unwrap();
    let sim = RecordingSimulator::new();
    let result = run_sweep(&renamed, &restart_config(dir.path()), |_| {
        sim.clone() as Arc<dyn Simulator>
    });
    assert!(matches!(result, Err(GridError::Restart(_))));
    assert!(sim.seen().is_empty());
}

#[test]
fn restart_refuses_a_smaller_worker_pool_over_sharded_output() {
    let dir = tempdir().unwrap();
    let space = sample_space();
    let store = OutputStore::new(dir.path(), "modelgrid", 0, WriteDiscipline::Sharded);
    store.prepare(&space, 2, false).unwrap();

    let sim = RecordingSimulator::new();
    let result = run_sweep(&space, &restart_config(dir.path()), |_| {
        sim.clone() as Arc<dyn Simulator>
    });
    assert!(matches!(result, Err(GridError::Restart(_))));
}

#[test]
fn restart_after_overwrite_ignores_the_earlier_larger_pool() {
    let dir = tempdir().unwrap();
    let space = sample_space();

    // A two-worker run, then an overwriting single-worker run. The
    // overwrite must clear shards 001+ so the later restart sees only the
    // single-worker layout.
    let mut first = SweepConfig::default();
    first.output.directory = dir.path().to_path_buf();
    first.workers = 2;
    let sim = RecordingSimulator::new();
    run_sweep(&space, &first, |_| sim.clone() as Arc<dyn Simulator>).unwrap();

    let mut second = SweepConfig::default();
    second.output.directory = dir.path().to_path_buf();
    second.overwrite = true;
    run_sweep(&space, &second, |_| sim.clone() as Arc<dyn Simulator>).unwrap();

    let resumed = run_sweep(&space, &restart_config(dir.path()), |_| {
        sim.clone() as Arc<dyn Simulator>
    })
    .unwrap();
    assert_eq!(resumed.done_before, 4);
    assert_eq!(resumed.attempted, 0);
}

#[test]
fn pruned_axis_values_are_dropped_without_blocking_the_rest() {
    let dir = tempdir().unwrap();
    let wide = GridSpace::build(vec![
        GridAxis::new("a", vec![1.0, 2.0, 3.0], false).unwrap(),
        GridAxis::new("b", vec![10.0, 20.0], false).unwrap(),
    ])
    .unwrap();
    let store = OutputStore::new(dir.path(), "modelgrid", 0, WriteDiscipline::Sharded);
    store.prepare(&wide, 1, false).unwrap();
    store
        .append_chain(&[
            ChainRecord { params: vec![1.0, 10.0], payload: Some(vec![0.0]) },
            ChainRecord { params: vec![3.0, 10.0], payload: Some(vec![0.0]) },
        ])
        .unwrap();

    // a=3.0 was pruned from the grid; its record is skipped benignly.
    let narrowed = sample_space();
    let sim = RecordingSimulator::new();
    let summary = run_sweep(&narrowed, &restart_config(dir.path()), |_| {
        sim.clone() as Arc<dyn Simulator>
    })
    .unwrap();
    assert_eq!(summary.done_before, 1);
    assert_eq!(summary.attempted, 3);
}
