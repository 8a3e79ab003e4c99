#![warn(missing_docs)]

//! Cutting tools for the vmill stock simulator.
//!
//! A [`Cutter`] is an immutable, validated tool: a closed set of shapes with
//! an implicit distance function (non-negative inside the tool) and a
//! bounding box used for broad-phase tests against the stock octree.
//!
//! # Example
//!
//! ```
//! use vmill_kernel_cutter::{Cutter, ToolSpec};
//! use vmill_kernel_math::Point3;
//!
//! let spec = ToolSpec::Cylinder { diameter: 6.0, length: 20.0, color: None };
//! let cutter = Cutter::from_spec(&spec).unwrap();
//!
//! // on the tool axis, half way up the flutes
//! assert!(cutter.distance(&Point3::new(0.0, 0.0, 10.0)) > 0.0);
//! ```

mod tool;

pub use tool::{BoundingBox, Cutter, CutterShape, ToolSpec, DEFAULT_COLOR};

use thiserror::Error;

/// Errors from tool construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CutterError {
    /// A tool dimension is zero, negative or not finite.
    #[error("invalid tool {name}: {value}")]
    InvalidDimension {
        /// Dimension name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// The tool kind is recognized but cannot be simulated.
    #[error("unsupported tool kind: {0}")]
    Unsupported(String),
}
