//! Axis-aligned boxes in min/max form and the corner numbering convention.

use nalgebra::Matrix3x2;
use vmill_kernel_math::{Point3, Vec3};

use crate::GeomError;

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// X axis (left/right).
    X = 0,
    /// Y axis (front/rear).
    Y = 1,
    /// Z axis (bottom/upper).
    Z = 2,
}

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of the axis (0, 1, 2).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Direction of travel along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards the min side.
    Negative = 0,
    /// Towards the max side.
    Positive = 1,
}

impl Direction {
    /// Both directions, negative first.
    pub const ALL: [Direction; 2] = [Direction::Negative, Direction::Positive];

    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Direction::Negative => Direction::Positive,
            Direction::Positive => Direction::Negative,
        }
    }
}

/// The eight corners of a box.
///
/// Bit 0 of the discriminant selects x (Left = min, Right = max), bit 1
/// selects y (Front = min, Rear = max), bit 2 selects z (Bottom = min,
/// Upper = max). Octant `i` of a split box is the child touching corner `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Corner {
    /// (min, min, min)
    BottomFrontLeft = 0,
    /// (max, min, min)
    BottomFrontRight = 1,
    /// (min, max, min)
    BottomRearLeft = 2,
    /// (max, max, min)
    BottomRearRight = 3,
    /// (min, min, max)
    UpperFrontLeft = 4,
    /// (max, min, max)
    UpperFrontRight = 5,
    /// (min, max, max)
    UpperRearLeft = 6,
    /// (max, max, max)
    UpperRearRight = 7,
}

/// Column of the min/max matrix (0 = min, 1 = max) picked by each corner
/// on each axis.
pub const CORNER_TABLE: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

impl Corner {
    /// All corners in index order.
    pub const ALL: [Corner; 8] = [
        Corner::BottomFrontLeft,
        Corner::BottomFrontRight,
        Corner::BottomRearLeft,
        Corner::BottomRearRight,
        Corner::UpperFrontLeft,
        Corner::UpperFrontRight,
        Corner::UpperRearLeft,
        Corner::UpperRearRight,
    ];

    /// Corner for an index in `0..8`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Index of the corner (0..8).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-bit mask for this corner in an 8-bit corner set.
    #[inline]
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Column choice (0 = min, 1 = max) on `axis`.
    #[inline]
    pub fn side(self, axis: Axis) -> usize {
        CORNER_TABLE[self.index()][axis.index()]
    }

    /// Diagonally opposite corner.
    pub fn opposite(self) -> Self {
        Self::ALL[7 - self.index()]
    }

    /// Corner with the side on `axis` flipped.
    pub fn flipped(self, axis: Axis) -> Self {
        Self::ALL[self.index() ^ (1 << axis.index())]
    }
}

/// Axis-aligned box stored as a 3x2 min/max matrix.
///
/// Column 0 holds the minimum, column 1 the maximum. Extents are strictly
/// positive on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftedBox {
    bounds: Matrix3x2<f64>,
    extents: Vec3,
    volume: f64,
}

impl ShiftedBox {
    /// Create a box from its min and max corners.
    pub fn new(min: Point3, max: Point3) -> Result<Self, GeomError> {
        Self::from_bounds(Matrix3x2::new(min.x, max.x, min.y, max.y, min.z, max.z))
    }

    /// Create a box from a min/max matrix (column 0 = min, column 1 = max).
    pub fn from_bounds(bounds: Matrix3x2<f64>) -> Result<Self, GeomError> {
        for v in bounds.iter() {
            if !v.is_finite() {
                return Err(GeomError::NonFinite(*v));
            }
        }
        let extents = bounds.column(1) - bounds.column(0);
        for axis in 0..3 {
            // `!(e > 0)` also rejects NaN
            if !(extents[axis] > 0.0) {
                return Err(GeomError::NonPositiveExtent {
                    axis,
                    extent: extents[axis],
                });
            }
        }
        Ok(Self {
            bounds,
            extents,
            volume: extents.x * extents.y * extents.z,
        })
    }

    /// Create a box from its center and full extents.
    pub fn from_center_extents(center: Point3, extents: Vec3) -> Result<Self, GeomError> {
        let half = extents * 0.5;
        Self::new(center - half, center + half)
    }

    /// Smallest box containing every point.
    pub fn bounding(points: impl IntoIterator<Item = Point3>) -> Result<Self, GeomError> {
        let mut iter = points.into_iter();
        let first = iter.next().ok_or(GeomError::EmptyPointSet)?;
        let (mut lo, mut hi) = (first, first);
        for p in iter {
            lo = lo.inf(&p);
            hi = hi.sup(&p);
        }
        Self::new(lo, hi)
    }

    /// Rebuild a box from its eight corners, indexed by [`Corner`].
    pub fn from_corners(corners: &[Point3; 8]) -> Result<Self, GeomError> {
        Self::new(
            corners[Corner::BottomFrontLeft.index()],
            corners[Corner::UpperRearRight.index()],
        )
    }

    /// Min/max matrix.
    #[inline]
    pub fn bounds(&self) -> &Matrix3x2<f64> {
        &self.bounds
    }

    /// Minimum corner.
    #[inline]
    pub fn min(&self) -> Point3 {
        Point3::from(self.bounds.column(0).into_owned())
    }

    /// Maximum corner.
    #[inline]
    pub fn max(&self) -> Point3 {
        Point3::from(self.bounds.column(1).into_owned())
    }

    /// Size along each axis (max - min).
    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.extents
    }

    /// Product of the extents.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Geometric center.
    #[inline]
    pub fn center(&self) -> Point3 {
        Point3::from((self.bounds.column(0) + self.bounds.column(1)) * 0.5)
    }

    /// Corner position in the box frame.
    #[inline]
    pub fn corner(&self, corner: Corner) -> Point3 {
        let row = &CORNER_TABLE[corner.index()];
        Point3::new(
            self.bounds[(0, row[0])],
            self.bounds[(1, row[1])],
            self.bounds[(2, row[2])],
        )
    }

    /// All eight corners indexed by [`Corner`].
    pub fn corners(&self) -> [Point3; 8] {
        Corner::ALL.map(|c| self.corner(c))
    }

    /// Sub-box touching `corner`, obtained by splitting at the center.
    ///
    /// Split planes are shared bit-for-bit between neighboring octants so
    /// the eight octants tile the parent without gaps.
    pub fn octant(&self, corner: Corner) -> ShiftedBox {
        let center = self.center();
        let mut bounds = self.bounds;
        for axis in Axis::ALL {
            let a = axis.index();
            if corner.side(axis) == 0 {
                bounds[(a, 1)] = center[a];
            } else {
                bounds[(a, 0)] = center[a];
            }
        }
        let extents = bounds.column(1) - bounds.column(0);
        ShiftedBox {
            bounds,
            extents,
            volume: extents.x * extents.y * extents.z,
        }
    }

    /// The eight octants indexed by [`Corner`].
    pub fn split(&self) -> [ShiftedBox; 8] {
        Corner::ALL.map(|c| self.octant(c))
    }

    /// Inclusive point containment.
    #[inline]
    pub fn contains_point(&self, p: &Point3) -> bool {
        (0..3).all(|a| p[a] >= self.bounds[(a, 0)] && p[a] <= self.bounds[(a, 1)])
    }

    /// Inclusive box containment.
    #[inline]
    pub fn contains_box(&self, other: &ShiftedBox) -> bool {
        (0..3).all(|a| {
            other.bounds[(a, 0)] >= self.bounds[(a, 0)]
                && other.bounds[(a, 1)] <= self.bounds[(a, 1)]
        })
    }

    /// Min/max overlap test. Touching faces count as overlapping.
    #[inline]
    pub fn overlaps(&self, other: &ShiftedBox) -> bool {
        (0..3).all(|a| {
            self.bounds[(a, 0)] <= other.bounds[(a, 1)]
                && self.bounds[(a, 1)] >= other.bounds[(a, 0)]
        })
    }
}
