use mgrid_core::{ErrorInfo, GridError, ParamSet};
use serde::{Deserialize, Serialize};

use crate::axis::GridAxis;

/// One evaluation unit of a sweep.
///
/// `stored` holds the persisted value vector in axis order (log space for
/// log axes); `params` is the resolved map handed to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    /// Stable linear index within the grid.
    pub index: usize,
    /// N-d coordinate for structured grids, `None` for unstructured ones.
    pub coord: Option<Vec<usize>>,
    /// Stored (pre-expansion) values in axis order.
    pub stored: Vec<f64>,
    /// Resolved parameter assignment.
    pub params: ParamSet,
}

/// Enumerable parameter space of a sweep.
///
/// The dimensionality and axis identity are fixed for the lifetime of a
/// sweep; restart reconciliation rejects prior output that disagrees on
/// either.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSpace {
    /// Cartesian product of named axes, row-major linear order
    /// (last axis fastest).
    Structured {
        /// Ordered axis collection.
        axes: Vec<GridAxis>,
    },
    /// Explicit ordered list of parameter sets sharing one key set.
    Unstructured {
        /// Sorted parameter names common to every entry.
        names: Vec<String>,
        /// The enumerated parameter sets.
        points: Vec<ParamSet>,
    },
}

impl GridSpace {
    /// Constructs a structured space from an ordered axis collection.
    pub fn build(axes: Vec<GridAxis>) -> Result<Self, GridError> {
        if axes.is_empty() {
            return Err(GridError::Config(ErrorInfo::new(
                "grid-no-axes",
                "a structured grid needs at least one axis",
            )));
        }
        for (i, axis) in axes.iter().enumerate() {
            for other in axes.iter().skip(i + 1) {
                if axis.name() == other.name() {
                    return Err(GridError::Config(
                        ErrorInfo::new("grid-axis-clash", "axis name used twice")
                            .with_context("axis", axis.name()),
                    ));
                }
            }
        }
        Ok(GridSpace::Structured { axes })
    }

    /// Constructs an unstructured space from an explicit point list.
    pub fn from_points(points: Vec<ParamSet>) -> Result<Self, GridError> {
        let first = points.first().ok_or_else(|| {
            GridError::Config(ErrorInfo::new(
                "grid-no-points",
                "an unstructured grid needs at least one point",
            ))
        })?;
        let names: Vec<String> = first.keys().cloned().collect();
        for (index, point) in points.iter().enumerate() {
            let keys: Vec<&String> = point.keys().collect();
            if keys.len() != names.len() || keys.iter().zip(&names).any(|(a, b)| *a != b) {
                return Err(GridError::Config(
                    ErrorInfo::new("grid-key-mismatch", "point key set differs from first entry")
                        .with_context("index", index.to_string()),
                ));
            }
            for (name, value) in point {
                if !value.is_finite() {
                    return Err(GridError::Config(
                        ErrorInfo::new("grid-non-finite", format!("value {value} is not finite"))
                            .with_context("index", index.to_string())
                            .with_context("param", name),
                    ));
                }
            }
        }
        Ok(GridSpace::Unstructured { names, points })
    }

    /// True for structured (Cartesian) grids.
    pub fn is_structured(&self) -> bool {
        matches!(self, GridSpace::Structured { .. })
    }

    /// Total number of grid points.
    pub fn size(&self) -> usize {
        match self {
            GridSpace::Structured { axes } => axes.iter().map(GridAxis::len).product(),
            GridSpace::Unstructured { points, .. } => points.len(),
        }
    }

    /// Axis sizes for structured grids, `[len]` for unstructured ones.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            GridSpace::Structured { axes } => axes.iter().map(GridAxis::len).collect(),
            GridSpace::Unstructured { points, .. } => vec![points.len()],
        }
    }

    /// Number of parameter dimensions.
    pub fn ndim(&self) -> usize {
        match self {
            GridSpace::Structured { axes } => axes.len(),
            GridSpace::Unstructured { names, .. } => names.len(),
        }
    }

    /// Parameter names in axis order (structured) or sorted order
    /// (unstructured).
    pub fn axis_names(&self) -> Vec<String> {
        match self {
            GridSpace::Structured { axes } => {
                axes.iter().map(|axis| axis.name().to_string()).collect()
            }
            GridSpace::Unstructured { names, .. } => names.clone(),
        }
    }

    /// Log-space flags in axis order; all false for unstructured grids.
    pub fn log_flags(&self) -> Vec<bool> {
        match self {
            GridSpace::Structured { axes } => axes.iter().map(GridAxis::is_log).collect(),
            GridSpace::Unstructured { names, .. } => vec![false; names.len()],
        }
    }

    /// Structured axis collection, if any.
    pub fn axes(&self) -> Option<&[GridAxis]> {
        match self {
            GridSpace::Structured { axes } => Some(axes),
            GridSpace::Unstructured { .. } => None,
        }
    }

    /// Position of the named axis within a structured grid.
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.axes()?.iter().position(|axis| axis.name() == name)
    }

    /// Converts an N-d coordinate to the linear index.
    pub fn coord_to_index(&self, coord: &[usize]) -> usize {
        match self {
            GridSpace::Structured { axes } => {
                debug_assert_eq!(coord.len(), axes.len());
                let mut index = 0;
                for (axis, &c) in axes.iter().zip(coord) {
                    index = index * axis.len() + c;
                }
                index
            }
            GridSpace::Unstructured { .. } => coord[0],
        }
    }

    /// Converts a linear index to the N-d coordinate of a structured grid.
    pub fn index_to_coord(&self, index: usize) -> Option<Vec<usize>> {
        let axes = self.axes()?;
        let mut rem = index;
        let mut coord = vec![0usize; axes.len()];
        for (slot, axis) in coord.iter_mut().zip(axes.iter()).rev() {
            *slot = rem % axis.len();
            rem /= axis.len();
        }
        Some(coord)
    }

    /// Materializes the grid point at the given linear index.
    pub fn point(&self, index: usize) -> GridPoint {
        match self {
            GridSpace::Structured { axes } => {
                let coord = self.index_to_coord(index).unwrap_or_default();
                let mut stored = Vec::with_capacity(axes.len());
                let mut params = ParamSet::new();
                for (axis, &c) in axes.iter().zip(&coord) {
                    stored.push(axis.stored(c));
                    params.insert(axis.name().to_string(), axis.resolve(c));
                }
                GridPoint {
                    index,
                    coord: Some(coord),
                    stored,
                    params,
                }
            }
            GridSpace::Unstructured { names, points } => {
                let params = points[index].clone();
                let stored = names.iter().map(|name| params[name]).collect();
                GridPoint {
                    index,
                    coord: None,
                    stored,
                    params,
                }
            }
        }
    }

    /// Iterates over all grid points in ascending linear order.
    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        (0..self.size()).map(move |index| self.point(index))
    }

    /// Maps a stored value vector (axis order) into the current grid.
    ///
    /// Returns `Ok(None)` when any dimension has no value within `tol`;
    /// callers must treat that as "this point does not exist in the current
    /// grid". Ambiguous per-axis matches propagate as errors.
    pub fn locate_stored(&self, values: &[f64], tol: f64) -> Result<Option<Vec<usize>>, GridError> {
        let axes = match self {
            GridSpace::Structured { axes } => axes,
            GridSpace::Unstructured { .. } => {
                return Err(GridError::Config(ErrorInfo::new(
                    "grid-unstructured-locate",
                    "coordinate lookup requires a structured grid",
                )))
            }
        };
        if values.len() != axes.len() {
            return Ok(None);
        }
        let mut coord = Vec::with_capacity(axes.len());
        for (axis, &value) in axes.iter().zip(values) {
            match axis.locate(value, tol)? {
                Some(c) => coord.push(c),
                None => return Ok(None),
            }
        }
        Ok(Some(coord))
    }

    /// Maps a named parameter set into the current grid (stored space).
    pub fn locate_entry(
        &self,
        params: &ParamSet,
        tol: f64,
    ) -> Result<Option<Vec<usize>>, GridError> {
        let names = self.axis_names();
        let mut values = Vec::with_capacity(names.len());
        for name in &names {
            match params.get(name) {
                Some(&value) => values.push(value),
                None => return Ok(None),
            }
        }
        self.locate_stored(&values, tol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> GridSpace {
        GridSpace::build(vec![
            GridAxis::new("a", vec![1.0, 2.0], false).unwrap(),
            GridAxis::new("b", vec![10.0, 20.0], false).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn structured_indexing_round_trips() {
        let space = two_by_two();
        assert_eq!(space.size(), 4);
        assert_eq!(space.shape(), vec![2, 2]);
        for index in 0..space.size() {
            let coord = space.index_to_coord(index).unwrap();
            assert_eq!(space.coord_to_index(&coord), index);
        }
        // Row-major: last axis fastest.
        let p1 = space.point(1);
        assert_eq!(p1.coord.as_deref(), Some(&[0, 1][..]));
        assert_eq!(p1.params["a"], 1.0);
        assert_eq!(p1.params["b"], 20.0);
    }

    #[test]
    fn locate_entry_finds_and_misses() {
        let space = two_by_two();
        let mut params = ParamSet::new();
        params.insert("a".to_string(), 2.0);
        params.insert("b".to_string(), 10.0);
        assert_eq!(
            space.locate_entry(&params, 1e-3).unwrap(),
            Some(vec![1, 0])
        );
        params.insert("b".to_string(), 15.0);
        assert_eq!(space.locate_entry(&params, 1e-3).unwrap(), None);
    }

    #[test]
    fn unstructured_requires_consistent_keys() {
        let mut p0 = ParamSet::new();
        p0.insert("x".to_string(), 1.0);
        let mut p1 = ParamSet::new();
        p1.insert("y".to_string(), 2.0);
        assert!(matches!(
            GridSpace::from_points(vec![p0.clone(), p1]),
            Err(GridError::Config(_))
        ));
        assert!(matches!(
            GridSpace::from_points(vec![]),
            Err(GridError::Config(_))
        ));
        let space = GridSpace::from_points(vec![p0]).unwrap();
        assert!(!space.is_structured());
        assert_eq!(space.size(), 1);
        assert_eq!(space.point(0).coord, None);
    }

    #[test]
    fn log_axes_expand_only_in_params() {
        let space = GridSpace::build(vec![
            GridAxis::new("fstar", vec![-1.0, 0.0], true).unwrap(),
        ])
        .unwrap();
        let point = space.point(0);
        assert_eq!(point.stored, vec![-1.0]);
        assert!((point.params["fstar"] - 0.1).abs() < 1e-12);
    }
}
