#![warn(missing_docs)]

//! Geometry primitives for the vmill octree.
//!
//! - [`ShiftedBox`]: axis-aligned box in min/max form with the fixed
//!   8-corner numbering every other module relies on
//! - [`adjacency`]: corner/octant neighbor table and the up/down path walk
//!   used to find neighbors across octree branches
//! - [`sat`]: oriented boxes and the separating-axis overlap test

pub mod adjacency;
pub mod sat;
mod shifted_box;

pub use adjacency::{
    get_adjacent, get_adjacent_down, get_adjacent_up, Adjacency, DescentStep, NeighborPath,
};
pub use sat::{is_intersecting, OrientedBox};
pub use shifted_box::{Axis, Corner, Direction, ShiftedBox, CORNER_TABLE};

use thiserror::Error;

/// Errors from geometric construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeomError {
    /// A box extent is zero, negative or NaN.
    #[error("non-positive extent {extent} on axis {axis}")]
    NonPositiveExtent {
        /// Axis index (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// Offending extent.
        extent: f64,
    },

    /// A bound is infinite or NaN.
    #[error("non-finite box bound: {0}")]
    NonFinite(f64),

    /// No points were supplied to build a bounding box.
    #[error("cannot bound an empty point set")]
    EmptyPointSet,
}
