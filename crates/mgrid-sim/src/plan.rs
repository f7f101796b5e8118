//! YAML sweep plan: grid definition, built-in simulator, and sweep options.

use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use mgrid_core::{ErrorInfo, GridError, ParamSet, Payload};
use mgrid_engine::{Simulator, SimulatorError, SweepConfig};
use mgrid_grid::{GridAxis, GridSpace};
use serde::Deserialize;

/// Top-level plan document.
///
/// Either `axes` (a structured grid, axis order as written) or `points`
/// (an explicit unstructured list) must be present, never both.
#[derive(Debug, Deserialize)]
pub struct SweepPlan {
    #[serde(default)]
    pub axes: IndexMap<String, Vec<f64>>,
    /// Axis names whose values are base-10 exponents.
    #[serde(default)]
    pub log_axes: Vec<String>,
    #[serde(default)]
    pub points: Vec<IndexMap<String, f64>>,
    #[serde(default)]
    pub simulator: AnalyticConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl SweepPlan {
    /// Builds the grid the plan describes.
    pub fn space(&self) -> Result<GridSpace, GridError> {
        match (self.axes.is_empty(), self.points.is_empty()) {
            (false, false) => Err(GridError::Config(ErrorInfo::new(
                "plan-ambiguous",
                "a plan defines either axes or points, not both",
            ))),
            (true, true) => Err(GridError::Config(ErrorInfo::new(
                "plan-empty",
                "a plan needs an axes table or a points list",
            ))),
            (false, true) => {
                let mut axes = Vec::with_capacity(self.axes.len());
                for (name, values) in &self.axes {
                    let log10 = self.log_axes.iter().any(|log| log == name);
                    axes.push(GridAxis::new(name.clone(), values.clone(), log10)?);
                }
                GridSpace::build(axes)
            }
            (true, false) => {
                let points = self
                    .points
                    .iter()
                    .map(|point| point.iter().map(|(k, v)| (k.clone(), *v)).collect())
                    .collect();
                GridSpace::from_points(points)
            }
        }
    }
}

/// Built-in analytic response surface, useful for demos and smoke runs.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticConfig {
    /// Peak location per parameter; parameters without a center peak at 0.
    #[serde(default)]
    pub centers: IndexMap<String, f64>,
    /// Shared Gaussian width of the peak.
    #[serde(default = "default_width")]
    pub width: f64,
    /// Report a failure when the response falls below this floor.
    #[serde(default)]
    pub fail_below: Option<f64>,
    /// Artificial per-point delay, for exercising deadlines.
    #[serde(default)]
    pub sleep_ms: Option<u64>,
}

fn default_width() -> f64 {
    1.0
}

impl Default for AnalyticConfig {
    fn default() -> Self {
        Self {
            centers: IndexMap::new(),
            width: default_width(),
            fail_below: None,
            sleep_ms: None,
        }
    }
}

/// Gaussian peak over the resolved parameter values.
pub struct AnalyticSimulator {
    config: AnalyticConfig,
}

impl AnalyticSimulator {
    pub fn new(config: AnalyticConfig) -> Result<Self, GridError> {
        if !(config.width.is_finite() && config.width > 0.0) {
            return Err(GridError::Config(ErrorInfo::new(
                "plan-width",
                format!("simulator width {} must be finite and positive", config.width),
            )));
        }
        Ok(Self { config })
    }
}

impl Simulator for AnalyticSimulator {
    fn payload_len(&self) -> usize {
        1
    }

    fn simulate(&self, params: &ParamSet) -> Result<Payload, SimulatorError> {
        if let Some(ms) = self.config.sleep_ms {
            thread::sleep(Duration::from_millis(ms));
        }
        let mut chi2 = 0.0;
        for (name, value) in params {
            let center = self.config.centers.get(name).copied().unwrap_or(0.0);
            let pull = (value - center) / self.config.width;
            chi2 += pull * pull;
        }
        let response = (-0.5 * chi2).exp();
        if let Some(floor) = self.config.fail_below {
            if response < floor {
                return Err(SimulatorError::Failure {
                    kind: "underflow".to_string(),
                    message: format!("response {response:e} below floor {floor:e}"),
                });
            }
        }
        Ok(Payload::new(vec![response]))
    }
}
