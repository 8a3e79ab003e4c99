//! Stock material and the per-pose intersection step.

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, trace};
use vmill_kernel_cutter::Cutter;
use vmill_kernel_geom::{is_intersecting, Corner, OrientedBox, ShiftedBox};
use vmill_kernel_math::{Point3, Pose, Vec3};

use crate::octree::{IdAllocator, NodeKey, NodeKind, Octree};
use crate::voxel::VoxelInfo;
use crate::StockSimError;

/// Depth from which the broad phase switches from separating axes to a
/// plain AABB test.
pub const DEFAULT_DEPTH_SWITCH: u32 = 4;

/// Deepest tree [`Stock::from_resolution`] will build.
const MAX_RESOLUTION_DEPTH: u32 = 16;

/// Placement of stock and cutter for one simulation step, both in world
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToolPose {
    /// Stock frame in the world.
    pub stock: Pose,
    /// Cutter frame (tool tip at the origin) in the world.
    pub cutter: Pose,
}

impl ToolPose {
    /// Stock and cutter poses.
    pub fn new(stock: Pose, cutter: Pose) -> Self {
        Self { stock, cutter }
    }

    /// Unrotated cutter with its tip at `p`, stock at the world origin.
    pub fn cutter_at(p: Point3) -> Self {
        Self::new(Pose::identity(), Pose::at(&p))
    }

    /// Cutter pose expressed in the stock frame.
    pub fn cutter_in_stock(&self) -> Pose {
        self.stock.inverse().then(&self.cutter)
    }
}

/// Statistics for one or more intersection steps.
///
/// Results accumulate with `+`, `+=` and [`Sum`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IntersectionResult {
    /// Leaves whose corners were evaluated.
    pub analyzed_leaves: u64,
    /// Leaves deleted because every corner was removed.
    pub purged_leaves: u64,
    /// Leaves refined into eight children.
    pub pushed_leaves: u64,
    /// Leaves reported in the update list.
    pub updated_data_leaves: u64,
    /// Branches deleted after losing all children.
    pub lazy_purged_leaves: u64,
    /// Leaves that passed the AABB test but had no corner inside.
    pub intersection_approx_errors: u64,
    /// Subtrees rejected by the AABB test.
    pub intersection_approx_skips: u64,
    /// Change in the removed-volume estimate.
    pub waste: f64,
    /// Wall time spent.
    pub elapsed: Duration,
}

impl IntersectionResult {
    /// True when the step touched nothing.
    pub fn is_noop(&self) -> bool {
        self.analyzed_leaves == 0
            && self.purged_leaves == 0
            && self.pushed_leaves == 0
            && self.updated_data_leaves == 0
            && self.lazy_purged_leaves == 0
            && self.intersection_approx_errors == 0
            && self.intersection_approx_skips == 0
            && self.waste == 0.0
    }
}

impl AddAssign for IntersectionResult {
    fn add_assign(&mut self, rhs: Self) {
        self.analyzed_leaves += rhs.analyzed_leaves;
        self.purged_leaves += rhs.purged_leaves;
        self.pushed_leaves += rhs.pushed_leaves;
        self.updated_data_leaves += rhs.updated_data_leaves;
        self.lazy_purged_leaves += rhs.lazy_purged_leaves;
        self.intersection_approx_errors += rhs.intersection_approx_errors;
        self.intersection_approx_skips += rhs.intersection_approx_skips;
        self.waste += rhs.waste;
        self.elapsed += rhs.elapsed;
    }
}

impl Add for IntersectionResult {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for IntersectionResult {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a IntersectionResult> for IntersectionResult {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// A leaf that is new or whose cut state changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelUpdate {
    /// Node key.
    pub node: NodeKey,
    /// Node id.
    pub id: u64,
    /// Leaf region.
    pub bbox: ShiftedBox,
    /// Current cut state.
    pub voxel: VoxelInfo,
}

/// Why a leaf left the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteReason {
    /// Fully consumed by the cutter.
    Purged,
    /// Replaced by eight children. The key now names the branch.
    Refined,
}

/// A leaf that was removed or refined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletedVoxel {
    /// Key the leaf had.
    pub node: NodeKey,
    /// Id the leaf had.
    pub id: u64,
    /// Leaf region.
    pub bbox: ShiftedBox,
    /// Last cut state.
    pub voxel: VoxelInfo,
    /// Purged or refined.
    pub reason: DeleteReason,
}

/// Voxel delta for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredData {
    /// New or changed leaves.
    pub updated: Vec<VoxelUpdate>,
    /// Removed or refined leaves.
    pub deleted: Vec<DeletedVoxel>,
}

impl StoredData {
    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Number of entries in both lists.
    pub fn len(&self) -> usize {
        self.updated.len() + self.deleted.len()
    }

    /// Append another delta after this one.
    pub fn append(&mut self, other: &mut StoredData) {
        self.updated.append(&mut other.updated);
        self.deleted.append(&mut other.deleted);
    }
}

/// Material state at a point of the stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// Inside a leaf the cutter has not reached.
    Solid,
    /// Inside a partially cut leaf.
    Boundary,
    /// The region was machined away.
    Removed,
    /// Not part of the stock volume.
    Outside,
}

/// Stock material represented as an octree.
#[derive(Debug, Clone)]
pub struct Stock {
    tree: Octree,
    depth_switch: u32,
}

impl Stock {
    /// Create stock over `bbox`, refining down to `max_depth` levels.
    pub fn new(bbox: ShiftedBox, max_depth: u32) -> Result<Self, StockSimError> {
        Self::with_ids(bbox, max_depth, IdAllocator::new())
    }

    /// Like [`new`](Self::new), drawing node ids from `ids`.
    pub fn with_ids(
        bbox: ShiftedBox,
        max_depth: u32,
        ids: IdAllocator,
    ) -> Result<Self, StockSimError> {
        Ok(Self {
            tree: Octree::new(bbox, max_depth, ids)?,
            depth_switch: DEFAULT_DEPTH_SWITCH,
        })
    }

    /// Create stock from `[min_x, min_y, min_z, max_x, max_y, max_z]`.
    pub fn from_bounds(bounds: [f64; 6], max_depth: u32) -> Result<Self, StockSimError> {
        let bbox = ShiftedBox::new(
            Point3::new(bounds[0], bounds[1], bounds[2]),
            Point3::new(bounds[3], bounds[4], bounds[5]),
        )?;
        Self::new(bbox, max_depth)
    }

    /// Create stock whose finest leaves are at most `resolution` mm along
    /// the longest axis.
    pub fn from_resolution(bounds: [f64; 6], resolution: f64) -> Result<Self, StockSimError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(StockSimError::ResolutionTooSmall(resolution));
        }
        let bbox = ShiftedBox::new(
            Point3::new(bounds[0], bounds[1], bounds[2]),
            Point3::new(bounds[3], bounds[4], bounds[5]),
        )?;
        let max_dim = bbox.extents().max();
        let max_depth =
            ((max_dim / resolution).log2().ceil() as u32).clamp(2, MAX_RESOLUTION_DEPTH);
        Self::new(bbox, max_depth)
    }

    /// Set the depth at which the broad phase switches to AABB tests.
    pub fn with_depth_switch(mut self, depth_switch: u32) -> Self {
        self.depth_switch = depth_switch;
        self
    }

    /// Effective switch depth, capped at the tree depth.
    pub fn depth_switch(&self) -> u32 {
        self.depth_switch.min(self.tree.max_depth())
    }

    /// The underlying octree.
    pub fn octree(&self) -> &Octree {
        &self.tree
    }

    /// Stock volume in the stock frame.
    pub fn bounds(&self) -> &ShiftedBox {
        self.tree.node(self.tree.root()).bbox()
    }

    /// Maximum octree depth.
    pub fn max_depth(&self) -> u32 {
        self.tree.max_depth()
    }

    /// Global version; one per intersection step.
    pub fn version(&self) -> u64 {
        self.tree.version()
    }

    /// Size of a leaf at the maximum depth.
    pub fn resolution(&self) -> Vec3 {
        self.bounds().extents() / f64::from(1u32 << self.max_depth().min(31))
    }

    /// Material left according to the per-leaf corner estimate.
    pub fn remaining_volume(&self) -> f64 {
        self.tree
            .leaves()
            .map(|(_, n)| {
                let removed = n.voxel().map_or(0.0, VoxelInfo::removed_fraction);
                n.bbox().volume() * (1.0 - removed)
            })
            .sum()
    }

    /// Every live leaf, for a consumer starting from scratch.
    pub fn leaf_snapshot(&self) -> Vec<VoxelUpdate> {
        self.tree
            .leaves()
            .filter_map(|(key, n)| {
                n.voxel().map(|voxel| VoxelUpdate {
                    node: key,
                    id: n.id(),
                    bbox: *n.bbox(),
                    voxel: *voxel,
                })
            })
            .collect()
    }

    /// Classify a stock-frame point.
    pub fn occupancy(&self, p: &Point3) -> Occupancy {
        let Ok(key) = self.tree.locate_point(p) else {
            return Occupancy::Outside;
        };
        match self.tree.node(key).kind() {
            NodeKind::Leaf { voxel } if voxel.is_intersecting() => Occupancy::Boundary,
            NodeKind::Leaf { .. } => Occupancy::Solid,
            NodeKind::Branch { .. } => Occupancy::Removed,
        }
    }

    /// Remove the material `cutter` occupies at `pose`.
    ///
    /// Returns the step statistics and the leaves that changed, in the
    /// order they were visited.
    pub fn intersect(
        &mut self,
        cutter: &Cutter,
        pose: &ToolPose,
    ) -> (IntersectionResult, StoredData) {
        let start = Instant::now();
        let version = self.tree.advance_version();

        let cutter_in_stock = pose.cutter_in_stock();
        let cutter_box = cutter.oriented_bounds(&cutter_in_stock);
        let local = cutter_box.local;
        let half_axis = Vec3::new(0.0, 0.0, local.extents().z / 2.0);
        let axis_points = [
            local.center() - half_axis,
            local.center(),
            local.center() + half_axis,
        ]
        .map(|p| cutter_box.pose.apply_point(&p));

        let mut step = Step {
            cutter,
            stock_to_cutter: cutter_in_stock.inverse(),
            cutter_aabb: cutter_box.aabb(),
            cutter_box,
            axis_points,
            depth_switch: self.depth_switch(),
            max_depth: self.tree.max_depth(),
            result: IntersectionResult::default(),
            data: StoredData::default(),
        };
        let root = self.tree.root();
        step.visit(&mut self.tree, root);

        let mut result = step.result;
        result.elapsed = start.elapsed();
        debug!(
            version,
            analyzed = result.analyzed_leaves,
            purged = result.purged_leaves,
            pushed = result.pushed_leaves,
            updated = result.updated_data_leaves,
            collapsed = result.lazy_purged_leaves,
            waste = result.waste,
            "intersection step"
        );
        (result, step.data)
    }
}

/// Traversal state for one intersection step. All geometry is in the
/// stock frame.
struct Step<'a> {
    cutter: &'a Cutter,
    stock_to_cutter: Pose,
    cutter_box: OrientedBox,
    cutter_aabb: ShiftedBox,
    // tip, centroid and far end of the tool axis; all inside the tool
    axis_points: [Point3; 3],
    depth_switch: u32,
    max_depth: u32,
    result: IntersectionResult,
    data: StoredData,
}

impl Step<'_> {
    fn overlaps(&mut self, bbox: &ShiftedBox, depth: u32) -> bool {
        if depth < self.depth_switch {
            is_intersecting(&OrientedBox::axis_aligned(*bbox), &self.cutter_box, true)
        } else if bbox.overlaps(&self.cutter_aabb) {
            true
        } else {
            self.result.intersection_approx_skips += 1;
            false
        }
    }

    #[inline]
    fn distance(&self, p: &Point3) -> f64 {
        self.cutter.distance(&self.stock_to_cutter.apply_point(p))
    }

    /// Catches a tool that enters a leaf without reaching any of its corners.
    fn probe(&self, bbox: &ShiftedBox) -> bool {
        self.axis_points.iter().any(|p| bbox.contains_point(p))
            || self.distance(&bbox.center()) >= 0.0
    }

    fn visit(&mut self, tree: &mut Octree, key: NodeKey) {
        let node = tree.node(key);
        let (bbox, depth) = (*node.bbox(), node.depth());
        let children = node.children().copied();
        if !self.overlaps(&bbox, depth) {
            return;
        }
        match children {
            Some(children) => {
                for child in children.into_iter().flatten() {
                    self.visit(tree, child);
                }
                self.collapse_if_empty(tree, key);
            }
            None => self.visit_leaf(tree, key, false),
        }
    }

    fn visit_leaf(&mut self, tree: &mut Octree, key: NodeKey, fresh: bool) {
        self.result.analyzed_leaves += 1;
        let node = tree.node(key);
        let (bbox, depth, id) = (*node.bbox(), node.depth(), node.id());
        let distances = bbox.corners().map(|p| self.distance(&p));

        let voxel = tree.voxel_mut(key);
        let mut removed = 0u32;
        for (corner, d) in Corner::ALL.into_iter().zip(distances) {
            if voxel.update_insideness(corner, d) {
                removed += 1;
            }
        }
        let voxel = *voxel;
        self.result.waste += f64::from(removed) / 8.0 * bbox.volume();

        if voxel.is_contained() {
            tree.delete_leaf(key);
            trace!(id, depth, "purge leaf");
            self.data.deleted.push(DeletedVoxel {
                node: key,
                id,
                bbox,
                voxel,
                reason: DeleteReason::Purged,
            });
            self.result.purged_leaves += 1;
            return;
        }

        if depth < self.max_depth && (voxel.is_intersecting() || self.probe(&bbox)) {
            self.refine(tree, key, voxel);
            return;
        }

        if removed > 0 || fresh {
            self.record_update(tree, key);
        }
        if depth >= self.depth_switch && !voxel.is_intersecting() {
            self.result.intersection_approx_errors += 1;
        }
    }

    fn refine(&mut self, tree: &mut Octree, key: NodeKey, voxel: VoxelInfo) {
        let node = tree.node(key);
        let (bbox, id) = (*node.bbox(), node.id());
        self.result.waste -= voxel.removed_fraction() * bbox.volume();

        let children = tree.push_leaf(key);
        self.data.deleted.push(DeletedVoxel {
            node: key,
            id,
            bbox,
            voxel,
            reason: DeleteReason::Refined,
        });
        self.result.pushed_leaves += 1;

        for child in children {
            let node = tree.node(child);
            let (child_box, depth) = (*node.bbox(), node.depth());
            let seeded = node.voxel().map_or(0.0, VoxelInfo::removed_fraction);
            self.result.waste += seeded * child_box.volume();
            if self.overlaps(&child_box, depth) {
                self.visit_leaf(tree, child, true);
            } else {
                self.record_update(tree, child);
            }
        }
        self.collapse_if_empty(tree, key);
    }

    fn record_update(&mut self, tree: &mut Octree, key: NodeKey) {
        tree.update_data(key);
        let node = tree.node(key);
        if let Some(voxel) = node.voxel() {
            self.data.updated.push(VoxelUpdate {
                node: key,
                id: node.id(),
                bbox: *node.bbox(),
                voxel: *voxel,
            });
            self.result.updated_data_leaves += 1;
        }
    }

    fn collapse_if_empty(&mut self, tree: &mut Octree, key: NodeKey) {
        if key != tree.root() && tree.node(key).child_mask() == 0 {
            let branch = tree.delete_branch(key);
            trace!(id = branch.id(), depth = branch.depth(), "collapse empty branch");
            self.result.lazy_purged_leaves += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn cube_stock(size: f64, max_depth: u32) -> Stock {
        Stock::from_bounds([0.0, 0.0, 0.0, size, size, size], max_depth).unwrap()
    }

    fn masks(stock: &Stock) -> HashMap<NodeKey, u8> {
        stock
            .octree()
            .leaves()
            .filter_map(|(k, n)| n.voxel().map(|v| (k, v.mask())))
            .collect()
    }

    #[test]
    fn test_corner_sphere_cuts_one_octant() {
        let mut stock = cube_stock(10.0, 3);
        let cutter = Cutter::sphere(2.0).unwrap();
        let (result, data) = stock.intersect(&cutter, &ToolPose::cutter_at(Point3::origin()));

        assert!(result.pushed_leaves >= 1);
        assert!(result.waste > 0.0);

        // the depth-1 octant at the origin is the only one refined from the root level
        let octants: Vec<_> = data
            .deleted
            .iter()
            .filter(|d| d.reason == DeleteReason::Refined && d.bbox.volume() == 125.0)
            .collect();
        assert_eq!(octants.len(), 1);
        assert_eq!(octants[0].voxel.mask(), Corner::BottomFrontLeft.bit());
        assert!(octants[0].voxel.is_intersecting() && !octants[0].voxel.is_contained());

        for b in data.updated.iter().map(|u| u.bbox).chain(data.deleted.iter().map(|d| d.bbox)) {
            assert!(b.max().iter().all(|&v| v <= 5.0));
        }
        assert_eq!(stock.octree().max_leaf_depth(), 3);
        assert_eq!(stock.occupancy(&Point3::origin()), Occupancy::Boundary);
        assert_eq!(stock.occupancy(&Point3::new(9.0, 9.0, 9.0)), Occupancy::Solid);
        assert_eq!(stock.occupancy(&Point3::new(11.0, 0.0, 0.0)), Occupancy::Outside);
    }

    #[test]
    fn test_enclosing_cutter_purges_everything() {
        let mut stock = cube_stock(10.0, 4);
        let cutter = Cutter::sphere(20.0).unwrap();
        let pose = ToolPose::cutter_at(Point3::new(5.0, 5.0, 5.0));
        let (result, data) = stock.intersect(&cutter, &pose);

        assert_eq!(result.purged_leaves, 8);
        assert_eq!(result.pushed_leaves, 0);
        assert_relative_eq!(result.waste, 1000.0);
        assert_eq!(data.deleted.len(), 8);
        assert!(data.deleted.iter().all(|d| d.reason == DeleteReason::Purged));
        assert_eq!(stock.octree().leaf_count(), 0);
        // the root stays behind as an empty branch
        assert_eq!(stock.octree().node_count(), 1);
        assert_eq!(stock.occupancy(&Point3::new(5.0, 5.0, 5.0)), Occupancy::Removed);
    }

    #[test]
    fn test_disjoint_cutter_is_noop() {
        let mut stock = cube_stock(10.0, 4);
        let cutter = Cutter::cylinder(1.0, 5.0).unwrap();
        let pose = ToolPose::cutter_at(Point3::new(20.0, 20.0, 20.0));
        let (result, data) = stock.intersect(&cutter, &pose);
        assert!(result.is_noop());
        assert!(data.is_empty());
        assert_eq!(stock.version(), 1);
        assert_eq!(stock.octree().leaf_count(), 8);
    }

    #[test]
    fn test_repeat_pose_is_idempotent() {
        let mut stock = cube_stock(10.0, 4);
        let cutter = Cutter::cylinder(1.5, 20.0).unwrap();
        let pose = ToolPose::cutter_at(Point3::new(3.0, 4.0, 6.0));

        let (first, data) = stock.intersect(&cutter, &pose);
        assert!(first.waste > 0.0);
        assert!(!data.is_empty());
        let leaves = stock.octree().leaf_count();

        let (second, data) = stock.intersect(&cutter, &pose);
        assert!(data.is_empty());
        assert_eq!(second.pushed_leaves, 0);
        assert_eq!(second.purged_leaves, 0);
        assert_eq!(second.updated_data_leaves, 0);
        assert_eq!(second.waste, 0.0);
        assert_eq!(stock.octree().leaf_count(), leaves);
        // nothing was stamped with the second version
        let info = stock.octree().version_info(1);
        assert!(stock.octree().changed_leaves(&info).is_empty());
    }

    #[test]
    fn test_masks_are_monotonic() {
        let mut stock = cube_stock(10.0, 4);
        let cutter = Cutter::sphere(2.5).unwrap();
        stock.intersect(&cutter, &ToolPose::cutter_at(Point3::new(4.0, 4.0, 4.0)));
        let before = masks(&stock);
        stock.intersect(&cutter, &ToolPose::cutter_at(Point3::new(5.5, 4.5, 4.0)));
        let after = masks(&stock);
        for (key, old) in before {
            if let Some(new) = after.get(&key) {
                assert_eq!(new & old, old);
            }
        }
    }

    #[test]
    fn test_volume_is_conserved_along_a_path() {
        let mut stock = cube_stock(10.0, 4);
        let cutter = Cutter::cylinder(2.0, 20.0).unwrap();
        let mut totals = IntersectionResult::default();
        let mut purged_volume = 0.0;
        for i in 0..12 {
            let x = 1.0 + 0.75 * f64::from(i);
            let pose = ToolPose::cutter_at(Point3::new(x, 5.0, 6.5));
            let (result, data) = stock.intersect(&cutter, &pose);
            totals += result;
            purged_volume += data
                .deleted
                .iter()
                .filter(|d| d.reason == DeleteReason::Purged)
                .map(|d| d.bbox.volume())
                .sum::<f64>();
        }
        let tree = stock.octree();
        assert!(tree.max_leaf_depth() <= 4);
        assert!(totals.purged_leaves > 0);
        assert_relative_eq!(tree.live_volume() + purged_volume, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(totals.waste, 1000.0 - stock.remaining_volume(), epsilon = 1e-9);
    }

    #[test]
    fn test_small_tool_inside_large_leaf() {
        let mut stock = cube_stock(10.0, 5);
        let cutter = Cutter::sphere(0.3).unwrap();
        let pose = ToolPose::cutter_at(Point3::new(2.6, 2.6, 2.6));
        let (result, _) = stock.intersect(&cutter, &pose);
        assert!(result.pushed_leaves >= 3);
        assert!(result.waste > 0.0);
        assert_eq!(stock.occupancy(&Point3::new(2.5, 2.5, 2.5)), Occupancy::Boundary);
    }

    #[test]
    fn test_stock_pose_moves_the_frame() {
        let cutter = Cutter::sphere(2.0).unwrap();
        let mut reference = cube_stock(10.0, 3);
        let (expected, _) = reference.intersect(&cutter, &ToolPose::cutter_at(Point3::origin()));

        let mut moved = cube_stock(10.0, 3);
        let shift = Pose::translation(100.0, 0.0, 0.0);
        let pose = ToolPose::new(shift, shift);
        let (result, _) = moved.intersect(&cutter, &pose);
        assert_eq!(result.pushed_leaves, expected.pushed_leaves);
        assert_eq!(result.updated_data_leaves, expected.updated_data_leaves);
        assert_relative_eq!(result.waste, expected.waste);
    }

    #[test]
    fn test_tilted_cutter_conserves_volume() {
        let mut stock = cube_stock(10.0, 5);
        let cutter = Cutter::cylinder(1.5, 20.0).unwrap();
        // axis leans from +z toward -y
        let tilted = Pose::translation(5.0, 5.0, 6.0).then(&Pose::rotation_x(0.7));
        let pose = ToolPose::new(Pose::identity(), tilted);

        let (first, data) = stock.intersect(&cutter, &pose);
        assert!(first.waste > 0.0);
        assert!(first.pushed_leaves > 0);
        let purged_volume: f64 = data
            .deleted
            .iter()
            .filter(|d| d.reason == DeleteReason::Purged)
            .map(|d| d.bbox.volume())
            .sum();
        assert_relative_eq!(
            stock.octree().live_volume() + purged_volume,
            1000.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(first.waste, 1000.0 - stock.remaining_volume(), epsilon = 1e-9);

        // on the tilted axis near the top face, and where an upright tool would be
        assert!(matches!(
            stock.occupancy(&Point3::new(5.0, 1.72, 9.9)),
            Occupancy::Removed | Occupancy::Boundary
        ));
        assert_eq!(stock.occupancy(&Point3::new(5.0, 5.0, 9.9)), Occupancy::Solid);
        assert_eq!(stock.occupancy(&Point3::new(0.5, 9.5, 0.5)), Occupancy::Solid);

        let leaves = stock.octree().leaf_count();
        let (second, data) = stock.intersect(&cutter, &pose);
        assert!(data.is_empty());
        assert_eq!(second.waste, 0.0);
        assert_eq!(second.pushed_leaves, 0);
        assert_eq!(stock.octree().leaf_count(), leaves);
    }

    #[test]
    fn test_ids_continue_from_allocator() {
        let bbox = ShiftedBox::new(Point3::origin(), Point3::new(10.0, 10.0, 10.0)).unwrap();
        let stock = Stock::with_ids(bbox, 3, IdAllocator::starting_at(100)).unwrap();
        let tree = stock.octree();
        assert_eq!(tree.node(tree.root()).id(), 109);
        let mut ids: Vec<u64> = tree.leaves().map(|(_, n)| n.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (101..=108).collect::<Vec<_>>());
        assert_eq!(tree.ids().peek(), 110);
    }

    #[test]
    fn test_aabb_phase_counts_skips() {
        let cutter = Cutter::sphere(2.0).unwrap();
        let pose = ToolPose::cutter_at(Point3::origin());

        let (accurate, _) = cube_stock(10.0, 3).intersect(&cutter, &pose);
        assert_eq!(accurate.intersection_approx_skips, 0);

        let mut stock = cube_stock(10.0, 3).with_depth_switch(1);
        assert_eq!(stock.depth_switch(), 1);
        let (cheap, _) = stock.intersect(&cutter, &pose);
        // the seven root octants away from the origin
        assert!(cheap.intersection_approx_skips >= 7);
    }

    #[test]
    fn test_result_accumulates() {
        let a = IntersectionResult {
            analyzed_leaves: 3,
            purged_leaves: 1,
            waste: 2.5,
            elapsed: Duration::from_millis(2),
            ..Default::default()
        };
        let b = IntersectionResult {
            analyzed_leaves: 4,
            pushed_leaves: 2,
            waste: 0.5,
            elapsed: Duration::from_millis(3),
            ..Default::default()
        };
        let total: IntersectionResult = [a, b].iter().sum();
        assert_eq!(total, a + b);
        assert_eq!(total, b + a);
        assert_eq!(total.analyzed_leaves, 7);
        assert_eq!(total.pushed_leaves, 2);
        assert_eq!(total.elapsed, Duration::from_millis(5));
        assert!(!total.is_noop());
        assert!(IntersectionResult::default().is_noop());
    }

    #[test]
    fn test_from_resolution() {
        let stock = Stock::from_resolution([0.0, 0.0, 0.0, 100.0, 100.0, 50.0], 2.0).unwrap();
        assert_eq!(stock.max_depth(), 6);
        assert!(stock.resolution().x <= 2.0);
        assert!(matches!(
            Stock::from_resolution([0.0; 6], 1.0),
            Err(StockSimError::InvalidBounds(_))
        ));
        assert!(matches!(
            Stock::from_resolution([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], 0.0),
            Err(StockSimError::ResolutionTooSmall(_))
        ));
    }
}
