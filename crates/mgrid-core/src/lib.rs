#![deny(missing_docs)]
//! Core error taxonomy and shared value types for the mgrid sweep engine.

pub mod errors;
pub mod params;
pub mod rng;

pub use errors::{ErrorInfo, GridError};
pub use params::{ParamSet, Payload};
pub use rng::{derive_substream_seed, RngHandle};
