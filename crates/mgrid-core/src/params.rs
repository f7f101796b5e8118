//! Parameter and payload value types shared by the grid and the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One full parameter assignment handed to the simulator.
///
/// Keys are parameter names; ordering is the map's lexicographic order,
/// which keeps serialized forms canonical without extra bookkeeping.
pub type ParamSet = BTreeMap<String, f64>;

/// Numeric result vector produced by one successful simulation.
///
/// The field layout is declared by the simulator (`payload_len`); the engine
/// treats the payload as opaque and only requires a fixed width so the
/// persisted output stays rectangular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Raw field values in the simulator's declared order.
    pub values: Vec<f64>,
}

impl Payload {
    /// Wraps a raw value vector.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of fields in the payload.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the payload carries no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
