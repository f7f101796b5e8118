//! Work assignment across the fixed worker pool.
//!
//! Every strategy produces an [`AssignmentTable`] that partitions the grid
//! exactly: each point belongs to one worker and every worker sees the same
//! table. Rank 0 computes the table and broadcasts it, so even the random
//! strategy ends up byte-identical everywhere.

use mgrid_core::{derive_substream_seed, ErrorInfo, GridError, RngHandle};
use mgrid_grid::GridSpace;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::comm::GroupChannel;

/// Substream id reserved for the random load-balance realization.
const BALANCE_SUBSTREAM: u64 = 0xBA1A;

/// Supported load-balance strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BalanceStrategy {
    /// Round-robin by linear index modulo worker count.
    Even,
    /// Colocate all points sharing a value of the designated axis on one
    /// worker, cycling workers over axis values. Lets a worker reuse an
    /// expensive per-value intermediate across the rest of the grid.
    GroupedByAxis {
        /// Name of the expensive axis.
        axis: String,
    },
    /// Spread each value of the designated axis evenly over all workers,
    /// balancing wall-clock load when cost grows along the axis.
    StripedByAxis {
        /// Name of the cost-driving axis.
        axis: String,
    },
    /// Uniformly random assignment generated by rank 0 and agreed by all.
    RandomAgreed {
        /// Master seed; the realization is derived from a dedicated
        /// substream so it never collides with simulator seeding.
        #[serde(default)]
        seed: u64,
    },
}

impl BalanceStrategy {
    /// Maps the legacy integer method ids onto strategies.
    ///
    /// `0` even, `1` grouped, `2` striped, `3` random; anything else is an
    /// unsupported-strategy error.
    pub fn from_method_id(
        id: u8,
        axis: Option<&str>,
        seed: u64,
    ) -> Result<Self, GridError> {
        let need_axis = || {
            axis.map(str::to_string).ok_or_else(|| {
                GridError::Config(ErrorInfo::new(
                    "balance-axis-missing",
                    format!("method {id} needs a load-balance axis"),
                ))
            })
        };
        match id {
            0 => Ok(BalanceStrategy::Even),
            1 => Ok(BalanceStrategy::GroupedByAxis { axis: need_axis()? }),
            2 => Ok(BalanceStrategy::StripedByAxis { axis: need_axis()? }),
            3 => Ok(BalanceStrategy::RandomAgreed { seed }),
            other => Err(GridError::Strategy(ErrorInfo::new(
                "balance-unknown-method",
                format!("unrecognized load-balancing method {other}"),
            ))),
        }
    }
}

impl Default for BalanceStrategy {
    fn default() -> Self {
        BalanceStrategy::Even
    }
}

/// Mapping from grid point index to owning worker, identical on all ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentTable {
    workers: Vec<usize>,
    world: usize,
}

impl AssignmentTable {
    /// Worker id owning the given linear index.
    pub fn worker_for(&self, index: usize) -> usize {
        self.workers[index]
    }

    /// Number of grid points covered by the table.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when the table covers an empty grid; never holds in practice.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Worker pool size the table was built for.
    pub fn world_size(&self) -> usize {
        self.world
    }

    /// Number of points assigned to each worker.
    pub fn load(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.world];
        for &worker in &self.workers {
            counts[worker] += 1;
        }
        counts
    }
}

/// Builds the assignment table and distributes it to every rank.
pub fn assign(
    space: &GridSpace,
    strategy: &BalanceStrategy,
    channel: &dyn GroupChannel,
) -> Result<AssignmentTable, GridError> {
    let world = channel.world_size();
    if channel.rank() == 0 {
        let table = compute(space, strategy, world)?;
        if world > 1 {
            let bytes = bincode::serialize(&table)
                .map_err(|err| GridError::Comm(ErrorInfo::new("assign-encode", err.to_string())))?;
            channel.broadcast(0, Some(bytes))?;
        }
        Ok(table)
    } else {
        let bytes = channel.broadcast(0, None)?;
        bincode::deserialize(&bytes)
            .map_err(|err| GridError::Comm(ErrorInfo::new("assign-decode", err.to_string())))
    }
}

fn compute(
    space: &GridSpace,
    strategy: &BalanceStrategy,
    world: usize,
) -> Result<AssignmentTable, GridError> {
    let size = space.size();
    let workers = match strategy {
        BalanceStrategy::Even => (0..size).map(|index| index % world).collect(),
        BalanceStrategy::GroupedByAxis { axis } => {
            let axis_pos = structured_axis(space, axis)?;
            let axis_len = space.shape()[axis_pos];
            if axis_len < world {
                // Fewer distinct values than workers: grouping would idle
                // part of the pool, fall back to the even partition.
                (0..size).map(|index| index % world).collect()
            } else {
                (0..size)
                    .map(|index| {
                        let coord = space.index_to_coord(index).unwrap_or_default();
                        coord[axis_pos] % world
                    })
                    .collect()
            }
        }
        BalanceStrategy::StripedByAxis { axis } => {
            let axis_pos = structured_axis(space, axis)?;
            let axis_len = space.shape()[axis_pos];
            let mut seen = vec![0usize; axis_len];
            let mut workers = Vec::with_capacity(size);
            for index in 0..size {
                let coord = space.index_to_coord(index).unwrap_or_default();
                let value = coord[axis_pos];
                workers.push(seen[value] % world);
                seen[value] += 1;
            }
            workers
        }
        BalanceStrategy::RandomAgreed { seed } => {
            let mut rng = RngHandle::from_seed(derive_substream_seed(*seed, BALANCE_SUBSTREAM));
            (0..size).map(|_| rng.inner_mut().gen_range(0..world)).collect()
        }
    };
    Ok(AssignmentTable { workers, world })
}

fn structured_axis(space: &GridSpace, axis: &str) -> Result<usize, GridError> {
    if !space.is_structured() {
        return Err(GridError::Config(
            ErrorInfo::new(
                "balance-unstructured",
                "axis-driven balancing requires a structured grid",
            )
            .with_context("axis", axis),
        ));
    }
    space.axis_index(axis).ok_or_else(|| {
        GridError::Config(
            ErrorInfo::new("balance-axis-unknown", "load-balance axis not in grid")
                .with_context("axis", axis),
        )
    })
}
