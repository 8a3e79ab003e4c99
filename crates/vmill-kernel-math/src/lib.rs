#![warn(missing_docs)]

//! Math types for the vmill stock simulator.
//!
//! Thin wrappers around nalgebra providing the domain types used by the
//! machining kernel: points, vectors and rigid poses.

use nalgebra::{Isometry3, Matrix3, Translation3, Unit, UnitQuaternion, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A rigid transformation (rotation followed by translation).
///
/// Stock and cutter placements are always rigid, which keeps box axes
/// orthonormal for the separating-axis test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// The underlying isometry.
    pub iso: Isometry3<f64>,
}

impl Pose {
    /// Identity pose.
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            iso: Isometry3::translation(dx, dy, dz),
        }
    }

    /// Translation to a point.
    pub fn at(p: &Point3) -> Self {
        Self::translation(p.x, p.y, p.z)
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        Self::rotation_about_axis(&Vec3::x_axis(), angle)
    }

    /// Rotation about the Y axis by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        Self::rotation_about_axis(&Vec3::y_axis(), angle)
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        Self::rotation_about_axis(&Vec3::z_axis(), angle)
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        Self {
            iso: Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(axis, angle),
            ),
        }
    }

    /// Pose from a position and roll/pitch/yaw angles in radians.
    pub fn from_position_euler(position: &Point3, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            iso: Isometry3::from_parts(
                Translation3::new(position.x, position.y, position.z),
                UnitQuaternion::from_euler_angles(roll, pitch, yaw),
            ),
        }
    }

    /// Compose: `self` then `other` (self * other), so `other` applies first.
    pub fn then(&self, other: &Pose) -> Self {
        Self {
            iso: self.iso * other.iso,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        self.iso.transform_point(p)
    }

    /// Transform a direction vector (rotation only).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        self.iso.transform_vector(v)
    }

    /// Inverse pose. Rigid transforms are always invertible.
    pub fn inverse(&self) -> Self {
        Self {
            iso: self.iso.inverse(),
        }
    }

    /// Rotation part as a 3x3 matrix whose columns are the local axes.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.iso.rotation.to_rotation_matrix().matrix()
    }

    /// Translation part.
    pub fn origin(&self) -> Point3 {
        Point3::from(self.iso.translation.vector)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Isometry3<f64>> for Pose {
    fn from(iso: Isometry3<f64>) -> Self {
        Self { iso }
    }
}
