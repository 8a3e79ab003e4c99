#![warn(missing_docs)]

//! Octree stock simulation for CNC material removal.
//!
//! The stock is an octree of axis-aligned boxes. Every cutter pose is
//! intersected with the tree: leaves the cutter touches record which of
//! their corners were removed, partially cut leaves are refined down to the
//! configured depth, and fully consumed leaves are purged. Each step returns
//! its statistics together with the voxel delta a renderer needs.
//!
//! # Features
//!
//! - Arena octree with stable node keys and per-node change versions
//! - Cutter vs. box broad phase (separating axes near the root, AABB deeper)
//! - Versioned snapshot handoff between a miller and a reader thread
//! - Milling driver and threaded session with a frame-paced consumer queue
//!
//! # Example
//!
//! ```
//! use vmill_kernel_cutter::Cutter;
//! use vmill_kernel_math::Point3;
//! use vmill_kernel_stocksim::{linear_path, MillingDriver, Stock};
//!
//! let stock = Stock::from_bounds([0.0, 0.0, 0.0, 40.0, 40.0, 20.0], 5).unwrap();
//! let cutter = Cutter::cylinder(3.0, 30.0).unwrap();
//! let path = linear_path(Point3::new(5.0, 20.0, 15.0), Point3::new(35.0, 20.0, 15.0), 2.0);
//!
//! let mut driver = MillingDriver::new(stock, cutter, path);
//! let totals = driver.run();
//! assert!(totals.waste > 0.0);
//! ```

mod config;
mod driver;
mod octree;
mod session;
mod stock;
mod versioner;
mod voxel;

pub use config::{ConfigError, SimConfig, StockSpec};
pub use driver::{
    arc_path, linear_path, polyline_path, with_stock_pose, ArcDir, MillingDriver, StepOutput,
};
pub use octree::{IdAllocator, NodeKey, NodeKind, Octree, OctreeError, OctreeNode, VersionInfo};
pub use session::{Drain, Handoff, MillingOutcome, MillingSession, SessionOptions, StockSnapshot};
pub use stock::{
    DeleteReason, DeletedVoxel, IntersectionResult, Occupancy, Stock, StoredData, ToolPose,
    VoxelUpdate, DEFAULT_DEPTH_SWITCH,
};
pub use versioner::{PtrVersioner, VersionerError, VersionerState};
pub use voxel::VoxelInfo;

use thiserror::Error;
use vmill_kernel_cutter::CutterError;
use vmill_kernel_geom::GeomError;

/// Errors from stock simulation operations.
#[derive(Debug, Error)]
pub enum StockSimError {
    /// Invalid stock bounds (zero or negative dimensions).
    #[error("invalid stock bounds: {0}")]
    InvalidBounds(#[from] GeomError),

    /// The tree needs at least two levels below the root.
    #[error("max depth must be greater than 1, got {0}")]
    MaxDepthTooSmall(u32),

    /// Resolution too small.
    #[error("resolution too small: {0}")]
    ResolutionTooSmall(f64),

    /// Tool rejected at construction.
    #[error("invalid tool: {0}")]
    Tool(#[from] CutterError),

    /// Octree query failed.
    #[error(transparent)]
    Octree(#[from] OctreeError),

    /// The miller thread could not be started.
    #[error("failed to spawn miller thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The miller thread panicked before returning the stock.
    #[error("miller thread panicked")]
    MillerPanicked,
}
