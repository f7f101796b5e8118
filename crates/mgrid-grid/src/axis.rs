use mgrid_core::{ErrorInfo, GridError};
use serde::{Deserialize, Serialize};

/// One named parameter dimension of a structured grid.
///
/// Log-spaced axes store their values in log10 space; the raw value is
/// expanded (`10^x`) only when a grid point is resolved for the simulator,
/// so persisted records and coordinate lookups always operate on the
/// stored representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    name: String,
    values: Vec<f64>,
    log10: bool,
}

impl GridAxis {
    /// Builds an axis, validating that it has at least one finite value and
    /// no duplicates.
    pub fn new(
        name: impl Into<String>,
        values: Vec<f64>,
        log10: bool,
    ) -> Result<Self, GridError> {
        let name = name.into();
        if values.is_empty() {
            return Err(GridError::Config(
                ErrorInfo::new("axis-empty", "axis has no values").with_context("axis", &name),
            ));
        }
        for value in &values {
            if !value.is_finite() {
                return Err(GridError::Config(
                    ErrorInfo::new("axis-non-finite", format!("axis value {value} is not finite"))
                        .with_context("axis", &name),
                ));
            }
        }
        for (i, a) in values.iter().enumerate() {
            for b in values.iter().skip(i + 1) {
                if a == b {
                    return Err(GridError::Config(
                        ErrorInfo::new("axis-duplicate", format!("duplicate axis value {a}"))
                            .with_context("axis", &name),
                    ));
                }
            }
        }
        Ok(Self {
            name,
            values,
            log10,
        })
    }

    /// Axis name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored values (log10 space for log axes).
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of values along this axis.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the axis has no values; never holds for a built axis.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the axis is log-spaced.
    pub fn is_log(&self) -> bool {
        self.log10
    }

    /// Stored value at the given index.
    pub fn stored(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Value at the given index, expanded out of log space if needed.
    pub fn resolve(&self, index: usize) -> f64 {
        let stored = self.values[index];
        if self.log10 {
            10f64.powf(stored)
        } else {
            stored
        }
    }

    /// Finds the index whose stored value matches `value` within `tol`.
    ///
    /// Returns `Ok(None)` when no value matches. Two matches inside the
    /// tolerance window are reported as [`GridError::Ambiguous`] rather than
    /// silently picking one.
    pub fn locate(&self, value: f64, tol: f64) -> Result<Option<usize>, GridError> {
        let mut found: Option<usize> = None;
        for (index, stored) in self.values.iter().enumerate() {
            if (stored - value).abs() <= tol {
                if let Some(prev) = found {
                    return Err(GridError::Ambiguous(
                        ErrorInfo::new(
                            "axis-ambiguous",
                            format!("value {value} matches two axis entries within tolerance"),
                        )
                        .with_context("axis", &self.name)
                        .with_context("first", prev.to_string())
                        .with_context("second", index.to_string())
                        .with_hint("shrink the restart tolerance or the axis spacing"),
                    ));
                }
                found = Some(index);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_duplicate_values() {
        assert!(matches!(
            GridAxis::new("fX", vec![], false),
            Err(GridError::Config(_))
        ));
        assert!(matches!(
            GridAxis::new("fX", vec![0.1, 0.1], false),
            Err(GridError::Config(_))
        ));
        assert!(matches!(
            GridAxis::new("fX", vec![f64::NAN], false),
            Err(GridError::Config(_))
        ));
    }

    #[test]
    fn log_axes_resolve_out_of_log_space() {
        let axis = GridAxis::new("fstar", vec![-1.0, -0.5], true).unwrap();
        assert_eq!(axis.stored(0), -1.0);
        assert!((axis.resolve(0) - 0.1).abs() < 1e-12);
        assert!((axis.resolve(1) - 10f64.powf(-0.5)).abs() < 1e-12);
    }

    #[test]
    fn locate_respects_tolerance() {
        let axis = GridAxis::new("fX", vec![0.1, 0.2, 0.3], false).unwrap();
        assert_eq!(axis.locate(0.2004, 1e-3).unwrap(), Some(1));
        assert_eq!(axis.locate(0.25, 1e-3).unwrap(), None);
    }

    #[test]
    fn locate_reports_ambiguity() {
        let axis = GridAxis::new("fX", vec![0.100, 0.101], false).unwrap();
        assert!(matches!(
            axis.locate(0.1005, 1e-3),
            Err(GridError::Ambiguous(_))
        ));
    }
}
