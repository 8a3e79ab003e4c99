//! Per-leaf record of which corners the cutter has reached.

use serde::Serialize;
use vmill_kernel_geom::Corner;

/// Eight corner bits, one per [`Corner`]. A set bit means the corner lies
/// inside a cutter for at least one past pose, so the material there is gone.
///
/// Bits are only ever set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct VoxelInfo {
    mask: u8,
}

impl VoxelInfo {
    /// No corner removed.
    pub const UNTOUCHED: Self = Self { mask: 0 };

    /// Every corner removed.
    pub const CONSUMED: Self = Self { mask: 0xFF };

    /// A fresh voxel with all corners still in material.
    pub fn new() -> Self {
        Self::UNTOUCHED
    }

    /// A voxel with the given corner bits already set.
    pub fn from_mask(mask: u8) -> Self {
        Self { mask }
    }

    /// Seed the voxel of octant `corner` from its parent.
    ///
    /// Only the octant's corner `corner` coincides with a parent corner, so
    /// that is the only bit that can be inherited.
    pub fn inherited(parent: &VoxelInfo, corner: Corner) -> Self {
        Self {
            mask: parent.mask & corner.bit(),
        }
    }

    /// Record the cutter distance observed at `corner`.
    ///
    /// Zero distance counts as inside. Returns true if the corner was not
    /// already removed.
    #[inline]
    pub fn update_insideness(&mut self, corner: Corner, distance: f64) -> bool {
        if distance >= -0.0 && self.mask & corner.bit() == 0 {
            self.mask |= corner.bit();
            true
        } else {
            false
        }
    }

    /// Raw corner bits.
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// At least one corner removed.
    pub fn is_intersecting(&self) -> bool {
        self.mask != 0
    }

    /// Every corner removed.
    pub fn is_contained(&self) -> bool {
        self.mask == 0xFF
    }

    /// Whether `corner` has been reached by the cutter.
    pub fn is_corner_inside(&self, corner: Corner) -> bool {
        self.mask & corner.bit() != 0
    }

    /// Number of removed corners.
    pub fn removed_corners(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Removed corners as a fraction of eight; the per-leaf waste estimate.
    pub fn removed_fraction(&self) -> f64 {
        f64::from(self.removed_corners()) / 8.0
    }
}
