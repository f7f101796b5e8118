#![deny(missing_docs)]
//! Grid enumeration for mgrid sweeps.
//!
//! A [`GridSpace`] is either *structured* (the Cartesian product of named
//! [`GridAxis`] dimensions, addressable by N-d coordinate) or *unstructured*
//! (an explicit list of parameter sets with a flat index). Both provide the
//! stable linear ordering the scheduler relies on.

mod axis;
mod space;

pub use axis::GridAxis;
pub use space::{GridPoint, GridSpace};
