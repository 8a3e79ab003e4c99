//! Tool definitions and implicit distance functions.

use serde::{Deserialize, Serialize};
use vmill_kernel_geom::{OrientedBox, ShiftedBox};
use vmill_kernel_math::{Point3, Pose, Vec3};

use crate::CutterError;

/// Display color used when a tool description does not set one.
pub const DEFAULT_COLOR: [f32; 4] = [0.8, 0.8, 0.85, 1.0];

/// Serializable tool description, as found in job files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    /// Flat end mill along local +Z, tip at the origin.
    Cylinder {
        /// Tool diameter in mm.
        diameter: f64,
        /// Flute length in mm.
        length: f64,
        /// Display color (RGBA).
        #[serde(default)]
        color: Option<[f32; 4]>,
    },
    /// Spherical tool centered at the origin.
    Sphere {
        /// Sphere diameter in mm.
        diameter: f64,
        /// Display color (RGBA).
        #[serde(default)]
        color: Option<[f32; 4]>,
    },
    /// Tool given as a triangle mesh. Not supported by the simulator.
    Mesh {
        /// Path of the mesh file.
        path: String,
    },
}

/// Closed set of simulated tool shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CutterShape {
    /// Flat end mill: radius `radius`, spanning `z` in `[0, length]`.
    Cylinder {
        /// Radius in mm.
        radius: f64,
        /// Length in mm.
        length: f64,
    },
    /// Sphere of radius `radius` centered at the origin.
    Sphere {
        /// Radius in mm.
        radius: f64,
    },
}

/// Tool bounding box: full extents, plus the transform from the tool origin
/// to the box centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Size along each tool axis.
    pub extents: Vec3,
    /// Tool origin to bounding-box centroid.
    pub origin_transform: Pose,
}

impl BoundingBox {
    /// The box centered on its own frame origin.
    pub fn local_box(&self) -> ShiftedBox {
        ShiftedBox::from_center_extents(Point3::origin(), self.extents)
            .unwrap_or_else(|_| unreachable!("tool extents are validated positive"))
    }

    /// The box placed in the frame where the tool origin sits at `tool_pose`.
    pub fn placed(&self, tool_pose: &Pose) -> OrientedBox {
        OrientedBox::new(self.local_box(), tool_pose.then(&self.origin_transform))
    }
}

/// An immutable, validated cutting tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutter {
    shape: CutterShape,
    color: [f32; 4],
    bounding_box: BoundingBox,
}

fn positive(name: &'static str, value: f64) -> Result<f64, CutterError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CutterError::InvalidDimension { name, value })
    }
}

impl Cutter {
    /// Flat end mill of the given radius and length.
    pub fn cylinder(radius: f64, length: f64) -> Result<Self, CutterError> {
        let radius = positive("radius", radius)?;
        let length = positive("length", length)?;
        Ok(Self::from_shape(CutterShape::Cylinder { radius, length }))
    }

    /// Sphere of the given radius.
    pub fn sphere(radius: f64) -> Result<Self, CutterError> {
        let radius = positive("radius", radius)?;
        Ok(Self::from_shape(CutterShape::Sphere { radius }))
    }

    /// Build a cutter from a job-file description.
    ///
    /// Mesh tools are rejected here, before any simulation starts.
    pub fn from_spec(spec: &ToolSpec) -> Result<Self, CutterError> {
        let (cutter, color) = match spec {
            ToolSpec::Cylinder {
                diameter,
                length,
                color,
            } => (
                Self::cylinder(positive("diameter", *diameter)? / 2.0, *length)?,
                color,
            ),
            ToolSpec::Sphere { diameter, color } => {
                (Self::sphere(positive("diameter", *diameter)? / 2.0)?, color)
            }
            ToolSpec::Mesh { path } => {
                return Err(CutterError::Unsupported(format!("mesh tool '{path}'")));
            }
        };
        Ok(match color {
            Some(c) => cutter.with_color(*c),
            None => cutter,
        })
    }

    fn from_shape(shape: CutterShape) -> Self {
        let bounding_box = match shape {
            CutterShape::Cylinder { radius, length } => BoundingBox {
                extents: Vec3::new(2.0 * radius, 2.0 * radius, length),
                origin_transform: Pose::translation(0.0, 0.0, length / 2.0),
            },
            CutterShape::Sphere { radius } => BoundingBox {
                extents: Vec3::new(2.0 * radius, 2.0 * radius, 2.0 * radius),
                origin_transform: Pose::identity(),
            },
        };
        Self {
            shape,
            color: DEFAULT_COLOR,
            bounding_box,
        }
    }

    /// Replace the display color.
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Tool shape.
    pub fn shape(&self) -> &CutterShape {
        &self.shape
    }

    /// Display color. Not used by the simulation.
    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    /// Bounding box descriptor.
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Largest tool dimension, useful for sizing broad-phase margins.
    pub fn max_extent(&self) -> f64 {
        self.bounding_box.extents.max()
    }

    /// Implicit distance at a point in the tool frame.
    ///
    /// Non-negative inside the tool (material there is removed), negative
    /// outside. The magnitude is not a Euclidean distance.
    #[inline]
    pub fn distance(&self, p: &Point3) -> f64 {
        match self.shape {
            CutterShape::Cylinder { radius, length } => {
                let half = length / 2.0;
                let axial = (p.z - half).abs() - half;
                let radial = p.x * p.x + p.y * p.y - radius * radius;
                -axial.max(radial)
            }
            CutterShape::Sphere { radius } => radius * radius - p.coords.norm_squared(),
        }
    }

    /// World-frame oriented bounding box for a tool placed at `tool_pose`.
    pub fn oriented_bounds(&self, tool_pose: &Pose) -> OrientedBox {
        self.bounding_box.placed(tool_pose)
    }
}

impl TryFrom<&ToolSpec> for Cutter {
    type Error = CutterError;

    fn try_from(spec: &ToolSpec) -> Result<Self, Self::Error> {
        Cutter::from_spec(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vmill_kernel_geom::Corner;

    #[test]
    fn test_cylinder_distance_sign() {
        let c = Cutter::cylinder(3.0, 20.0).unwrap();
        assert!(c.distance(&Point3::new(0.0, 0.0, 10.0)) > 0.0);
        assert!(c.distance(&Point3::new(2.9, 0.0, 1.0)) > 0.0);
        assert!(c.distance(&Point3::new(3.1, 0.0, 10.0)) < 0.0);
        assert!(c.distance(&Point3::new(0.0, 0.0, -0.1)) < 0.0);
        assert!(c.distance(&Point3::new(0.0, 0.0, 20.1)) < 0.0);
    }

    #[test]
    fn test_cylinder_surface_is_zero() {
        let c = Cutter::cylinder(2.0, 4.0).unwrap();
        // on the tip face; -0.0 still counts as zero
        assert_eq!(c.distance(&Point3::new(0.0, 0.0, 0.0)), 0.0);
        assert_eq!(c.distance(&Point3::new(1.0, 0.0, 0.0)), 0.0);
        // on the mantle
        assert_eq!(c.distance(&Point3::new(2.0, 0.0, 2.0)), 0.0);
    }

    #[test]
    fn test_sphere_distance() {
        let s = Cutter::sphere(2.0).unwrap();
        assert_relative_eq!(s.distance(&Point3::origin()), 4.0);
        assert_eq!(s.distance(&Point3::new(2.0, 0.0, 0.0)), 0.0);
        assert!(s.distance(&Point3::new(1.5, 1.5, 0.0)) < 0.0);
    }

    #[test]
    fn test_bounding_boxes() {
        let c = Cutter::cylinder(3.0, 20.0).unwrap();
        let bb = c.bounding_box();
        assert_eq!(bb.extents, Vec3::new(6.0, 6.0, 20.0));
        let placed = c.oriented_bounds(&Pose::translation(10.0, 0.0, 5.0));
        assert_relative_eq!(placed.center(), Point3::new(10.0, 0.0, 15.0));
        assert_relative_eq!(
            placed.corner(Corner::BottomFrontLeft),
            Point3::new(7.0, -3.0, 5.0)
        );

        let s = Cutter::sphere(1.5).unwrap();
        let placed = s.oriented_bounds(&Pose::translation(1.0, 2.0, 3.0));
        assert_relative_eq!(placed.center(), Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(s.max_extent(), 3.0);
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert_eq!(
            Cutter::cylinder(0.0, 10.0),
            Err(CutterError::InvalidDimension {
                name: "radius",
                value: 0.0
            })
        );
        assert!(Cutter::cylinder(1.0, -1.0).is_err());
        assert!(Cutter::sphere(f64::INFINITY).is_err());
    }

    #[test]
    fn test_spec_roundtrip_and_mesh_rejected() {
        let json = r#"{"type":"cylinder","diameter":6.0,"length":20.0}"#;
        let spec: ToolSpec = serde_json::from_str(json).unwrap();
        let cutter = Cutter::try_from(&spec).unwrap();
        assert_eq!(
            *cutter.shape(),
            CutterShape::Cylinder {
                radius: 3.0,
                length: 20.0
            }
        );
        assert_eq!(cutter.color(), DEFAULT_COLOR);

        let colored = ToolSpec::Sphere {
            diameter: 4.0,
            color: Some([1.0, 0.0, 0.0, 1.0]),
        };
        assert_eq!(Cutter::from_spec(&colored).unwrap().color(), [1.0, 0.0, 0.0, 1.0]);

        let mesh: ToolSpec = serde_json::from_str(r#"{"type":"mesh","path":"tool.stl"}"#).unwrap();
        assert!(matches!(
            Cutter::from_spec(&mesh),
            Err(CutterError::Unsupported(_))
        ));
    }
}
