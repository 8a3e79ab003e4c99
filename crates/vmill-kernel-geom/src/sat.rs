//! Oriented boxes and the separating-axis overlap test.

use vmill_kernel_math::{Point3, Pose, Vec3};

use crate::shifted_box::{Corner, ShiftedBox};

/// Cross products shorter than this are treated as parallel edges.
const PARALLEL_EPS: f64 = 1e-12;

/// A [`ShiftedBox`] placed in a parent frame by a rigid pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// Box in its own frame. It need not be centered on the frame origin.
    pub local: ShiftedBox,
    /// Placement of the box frame.
    pub pose: Pose,
}

impl OrientedBox {
    /// Place `local` with `pose`.
    pub fn new(local: ShiftedBox, pose: Pose) -> Self {
        Self { local, pose }
    }

    /// An axis-aligned box in the parent frame.
    pub fn axis_aligned(local: ShiftedBox) -> Self {
        Self::new(local, Pose::identity())
    }

    /// The same box seen from another frame: `frame` is applied after the
    /// box's own pose.
    pub fn transformed(&self, frame: &Pose) -> Self {
        Self::new(self.local, frame.then(&self.pose))
    }

    /// Box center in the parent frame.
    pub fn center(&self) -> Point3 {
        self.pose.apply_point(&self.local.center())
    }

    /// Half extents along the box axes.
    pub fn half_extents(&self) -> Vec3 {
        self.local.extents() * 0.5
    }

    /// Box axes (unit vectors) in the parent frame.
    pub fn axes(&self) -> [Vec3; 3] {
        let m = self.pose.rotation_matrix();
        [
            m.column(0).into_owned(),
            m.column(1).into_owned(),
            m.column(2).into_owned(),
        ]
    }

    /// Corner position in the parent frame.
    pub fn corner(&self, corner: Corner) -> Point3 {
        self.pose.apply_point(&self.local.corner(corner))
    }

    /// All corners in the parent frame, indexed by [`Corner`].
    pub fn corners(&self) -> [Point3; 8] {
        Corner::ALL.map(|c| self.corner(c))
    }

    /// Axis-aligned bounds in the parent frame.
    pub fn aabb(&self) -> ShiftedBox {
        let center = self.center();
        let half = self.half_extents();
        let m = self.pose.rotation_matrix().abs();
        let reach = m * half;
        // positive extents are preserved: reach >= half of the smallest extent
        ShiftedBox::new(center - reach, center + reach)
            .unwrap_or_else(|_| unreachable!("rotated box lost a positive extent"))
    }

    fn projected_radius(&self, axes: &[Vec3; 3], l: &Vec3) -> f64 {
        let h = self.half_extents();
        h.x * axes[0].dot(l).abs() + h.y * axes[1].dot(l).abs() + h.z * axes[2].dot(l).abs()
    }
}

/// Separating-axis overlap test between two oriented boxes.
///
/// The three face normals of each box are always tested. With `accurate`
/// the nine edge-edge cross axes are tested as well; without it the test
/// may report overlap for boxes that are separated only along an edge axis,
/// but never misses a real overlap. Touching boxes overlap.
///
/// The result does not depend on argument order.
pub fn is_intersecting(a: &OrientedBox, b: &OrientedBox, accurate: bool) -> bool {
    let d = b.center() - a.center();
    let axes_a = a.axes();
    let axes_b = b.axes();

    let separated = |l: &Vec3| {
        let ra = a.projected_radius(&axes_a, l);
        let rb = b.projected_radius(&axes_b, l);
        d.dot(l).abs() > ra + rb
    };

    if axes_a.iter().chain(axes_b.iter()).any(|l| separated(l)) {
        return false;
    }

    if accurate {
        for ea in &axes_a {
            for eb in &axes_b {
                let l = ea.cross(eb);
                if l.norm_squared() < PARALLEL_EPS {
                    continue;
                }
                if separated(&l) {
                    return false;
                }
            }
        }
    }

    true
}
