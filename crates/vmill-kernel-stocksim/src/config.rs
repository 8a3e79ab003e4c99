//! Simulation setup loaded from TOML or JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vmill_kernel_cutter::{Cutter, CutterError, ToolSpec};
use vmill_kernel_geom::ShiftedBox;
use vmill_kernel_math::Point3;

use crate::session::SessionOptions;
use crate::stock::{Stock, DEFAULT_DEPTH_SWITCH};
use crate::StockSimError;

/// Errors from loading or validating a [`SimConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is neither `.toml` nor `.json`.
    #[error("unknown config format: {}", .0.display())]
    UnknownFormat(PathBuf),

    /// Frame rate must be positive and finite.
    #[error("consumer_frame_rate must be positive, got {0}")]
    InvalidFrameRate(f64),

    /// Stock description rejected.
    #[error(transparent)]
    Stock(#[from] StockSimError),

    /// Tool description rejected.
    #[error(transparent)]
    Tool(#[from] CutterError),
}

/// Stock block in its own frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockSpec {
    /// Minimum corner.
    pub min: [f64; 3],
    /// Maximum corner.
    pub max: [f64; 3],
}

impl StockSpec {
    /// The block as a box.
    pub fn bbox(&self) -> Result<ShiftedBox, StockSimError> {
        let [x0, y0, z0] = self.min;
        let [x1, y1, z1] = self.max;
        Ok(ShiftedBox::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1))?)
    }
}

/// Everything needed to set up a milling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Stock block.
    pub stock: StockSpec,
    /// Deepest octree level.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Depth at which the broad phase switches to AABB tests.
    #[serde(default = "default_depth_switch")]
    pub depth_switch: u32,
    /// Cutting tool.
    pub tool: ToolSpec,
    /// Consumer frame rate in Hz.
    #[serde(default = "default_frame_rate")]
    pub consumer_frame_rate: f64,
    /// Steps between published snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,
}

fn default_max_depth() -> u32 {
    6
}

fn default_depth_switch() -> u32 {
    DEFAULT_DEPTH_SWITCH
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_snapshot_interval() -> u64 {
    16
}

impl SimConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(ConfigError::UnknownFormat(path.to_path_buf())),
        }
    }

    /// Check stock extents, depth, frame rate and tool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stock.bbox()?;
        if self.max_depth <= 1 {
            return Err(StockSimError::MaxDepthTooSmall(self.max_depth).into());
        }
        if !(self.consumer_frame_rate.is_finite() && self.consumer_frame_rate > 0.0) {
            return Err(ConfigError::InvalidFrameRate(self.consumer_frame_rate));
        }
        Cutter::from_spec(&self.tool)?;
        Ok(())
    }

    /// Fresh stock for this configuration.
    pub fn build_stock(&self) -> Result<Stock, ConfigError> {
        let stock = Stock::new(self.stock.bbox()?, self.max_depth)?;
        Ok(stock.with_depth_switch(self.depth_switch))
    }

    /// The configured tool.
    pub fn build_cutter(&self) -> Result<Cutter, ConfigError> {
        Ok(Cutter::from_spec(&self.tool)?)
    }

    /// Session pacing from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            snapshot_interval: self.snapshot_interval,
            frame_rate: self.consumer_frame_rate,
        }
    }

    /// Drain timeout for one consumer frame.
    pub fn frame_timeout(&self) -> Duration {
        self.session_options().frame_timeout()
    }
}
