//! Geometry primitives: points, energy deposits, vertices, bounding boxes.
//!
//! Units of `x`, `y`, `z` are not fixed here (application specific, cm in the
//! usual detector convention); times are whatever the upstream simulation
//! uses. "Not set" coordinates carry [`INVALID_DOUBLE`].

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

use crate::INVALID_DOUBLE;

// ============================================================================
// Point3D
// ============================================================================

/// Simple 3D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Default for Point3D {
    fn default() -> Self {
        Self { x: INVALID_DOUBLE, y: INVALID_DOUBLE, z: INVALID_DOUBLE }
    }
}

impl Point3D {
    /// Construct from coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    #[inline]
    pub fn dot(&self, rhs: &Point3D) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Squared Euclidean distance to `pt`.
    #[inline]
    pub fn squared_distance(&self, pt: &Point3D) -> f64 {
        (self.x - pt.x).powi(2) + (self.y - pt.y).powi(2) + (self.z - pt.z).powi(2)
    }

    /// Euclidean distance to `pt`.
    #[inline]
    pub fn distance(&self, pt: &Point3D) -> f64 {
        self.squared_distance(pt).sqrt()
    }

    /// Direction vector from `self` to `pt` (not normalized).
    #[inline]
    pub fn direction(&self, pt: &Point3D) -> Point3D {
        Point3D::new(pt.x - self.x, pt.y - self.y, pt.z - self.z)
    }
}

impl Add for Point3D {
    type Output = Point3D;
    fn add(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3D {
    type Output = Point3D;
    fn sub(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3D {
    type Output = Point3D;
    fn mul(self, rhs: f64) -> Point3D {
        Point3D::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Point3D {
    type Output = Point3D;
    fn div(self, rhs: f64) -> Point3D {
        Point3D::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl AddAssign for Point3D {
    fn add_assign(&mut self, rhs: Point3D) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl SubAssign for Point3D {
    fn sub_assign(&mut self, rhs: Point3D) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl MulAssign<f64> for Point3D {
    fn mul_assign(&mut self, rhs: f64) {
        self.x *= rhs;
        self.y *= rhs;
        self.z *= rhs;
    }
}

impl DivAssign<f64> for Point3D {
    fn div_assign(&mut self, rhs: f64) {
        self.x /= rhs;
        self.y /= rhs;
        self.z /= rhs;
    }
}

// ============================================================================
// EDep
// ============================================================================

/// A voxelized energy-deposition segment, not a geometric point.
///
/// `(x,y,z,t)` is the mid-point of the segment (the track portion within one
/// pixel), `dedx` [MeV/cm] the mean dE/dX over the segment, and `e` [MeV] the
/// total energy deposited within the pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EDep {
    /// Mid-point x coordinate.
    pub x: f64,
    /// Mid-point y coordinate.
    pub y: f64,
    /// Mid-point z coordinate.
    pub z: f64,
    /// Deposition time.
    pub t: f64,
    /// Total energy deposited within the pixel [MeV].
    pub e: f64,
    /// Mean dE/dX over the segment [MeV/cm].
    pub dedx: f64,
}

impl Default for EDep {
    fn default() -> Self {
        Self {
            x: INVALID_DOUBLE,
            y: INVALID_DOUBLE,
            z: INVALID_DOUBLE,
            t: INVALID_DOUBLE,
            e: INVALID_DOUBLE,
            dedx: INVALID_DOUBLE,
        }
    }
}

impl EDep {
    /// The segment mid-point as a bare point.
    #[inline]
    pub fn point(&self) -> Point3D {
        Point3D::new(self.x, self.y, self.z)
    }
}

// ============================================================================
// Vertex
// ============================================================================

/// A 3+1D `(x,y,z,t)` point: particle start/end, or an interaction vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Spatial position.
    pub pos: Point3D,
    /// Time component.
    pub time: f64,
}

impl Default for Vertex {
    fn default() -> Self {
        Self { pos: Point3D::default(), time: INVALID_DOUBLE }
    }
}

impl Vertex {
    /// Construct from coordinates and a time.
    pub fn new(x: f64, y: f64, z: f64, t: f64) -> Self {
        Self { pos: Point3D::new(x, y, z), time: t }
    }

    /// Reset all four components to the unset sentinel.
    pub fn reset(&mut self) {
        *self = Vertex::default();
    }
}

impl PartialOrd for Vertex {
    /// Lexicographic `(x, y, z, t)` ordering.
    fn partial_cmp(&self, rhs: &Vertex) -> Option<std::cmp::Ordering> {
        match self.pos.x.partial_cmp(&rhs.pos.x) {
            Some(std::cmp::Ordering::Equal) => {}
            ord => return ord,
        }
        match self.pos.y.partial_cmp(&rhs.pos.y) {
            Some(std::cmp::Ordering::Equal) => {}
            ord => return ord,
        }
        match self.pos.z.partial_cmp(&rhs.pos.z) {
            Some(std::cmp::Ordering::Equal) => {}
            ord => return ord,
        }
        self.time.partial_cmp(&rhs.time)
    }
}

// ============================================================================
// BBox3D
// ============================================================================

/// Axis-aligned, inclusive 3D bounding box with `p1 <= p2` componentwise.
///
/// Used both for image boundaries and for world-envelope clipping. The
/// default box is a degenerate (empty) box at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox3D {
    p1: Point3D,
    p2: Point3D,
}

impl Default for BBox3D {
    fn default() -> Self {
        Self {
            p1: Point3D::new(0., 0., 0.),
            p2: Point3D::new(0., 0., 0.),
        }
    }
}

impl BBox3D {
    /// Construct from per-axis bounds. `min` must not exceed `max` on any
    /// axis.
    pub fn new(
        xmin: f64,
        ymin: f64,
        zmin: f64,
        xmax: f64,
        ymax: f64,
        zmax: f64,
    ) -> crate::Result<Self> {
        if xmin > xmax || ymin > ymax || zmin > zmax {
            return Err(crate::Error::Config(format!(
                "bounding box min exceeds max: ({xmin},{ymin},{zmin}) > ({xmax},{ymax},{zmax})"
            )));
        }
        Ok(Self {
            p1: Point3D::new(xmin, ymin, zmin),
            p2: Point3D::new(xmax, ymax, zmax),
        })
    }

    /// Construct from two corner points, ordering each axis.
    pub fn from_corners(a: Point3D, b: Point3D) -> Self {
        Self {
            p1: Point3D::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            p2: Point3D::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Whether the box is degenerate (both corners coincide).
    #[inline]
    pub fn empty(&self) -> bool {
        self.p1 == self.p2
    }

    /// The bottom-left corner.
    #[inline]
    pub fn origin(&self) -> &Point3D {
        &self.p1
    }

    /// The bottom-left corner.
    #[inline]
    pub fn bottom_left(&self) -> &Point3D {
        &self.p1
    }

    /// The top-right corner.
    #[inline]
    pub fn top_right(&self) -> &Point3D {
        &self.p2
    }

    /// The geometric center.
    pub fn center(&self) -> Point3D {
        Point3D::new(
            self.p1.x + 0.5 * (self.p2.x - self.p1.x),
            self.p1.y + 0.5 * (self.p2.y - self.p1.y),
            self.p1.z + 0.5 * (self.p2.z - self.p1.z),
        )
    }

    /// Lower x bound.
    #[inline]
    pub fn min_x(&self) -> f64 {
        self.p1.x
    }
    /// Lower y bound.
    #[inline]
    pub fn min_y(&self) -> f64 {
        self.p1.y
    }
    /// Lower z bound.
    #[inline]
    pub fn min_z(&self) -> f64 {
        self.p1.z
    }
    /// Upper x bound.
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.p2.x
    }
    /// Upper y bound.
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.p2.y
    }
    /// Upper z bound.
    #[inline]
    pub fn max_z(&self) -> f64 {
        self.p2.z
    }

    /// Extent along x.
    #[inline]
    pub fn width(&self) -> f64 {
        self.p2.x - self.p1.x
    }
    /// Extent along y.
    #[inline]
    pub fn height(&self) -> f64 {
        self.p2.y - self.p1.y
    }
    /// Extent along z.
    #[inline]
    pub fn depth(&self) -> f64 {
        self.p2.z - self.p1.z
    }

    /// Enclosed volume.
    pub fn volume(&self) -> f64 {
        self.width() * self.height() * self.depth()
    }

    /// The intersection of two boxes; degenerate (clamped to the nearest
    /// face) when they do not overlap.
    pub fn overlap(&self, other: &BBox3D) -> BBox3D {
        let xmin = self.p1.x.max(other.p1.x);
        let ymin = self.p1.y.max(other.p1.y);
        let zmin = self.p1.z.max(other.p1.z);
        let xmax = self.p2.x.min(other.p2.x).max(xmin);
        let ymax = self.p2.y.min(other.p2.y).max(ymin);
        let zmax = self.p2.z.min(other.p2.z).max(zmin);
        BBox3D {
            p1: Point3D::new(xmin, ymin, zmin),
            p2: Point3D::new(xmax, ymax, zmax),
        }
    }

    /// The smallest box containing both `self` and `other`.
    pub fn inclusive(&self, other: &BBox3D) -> BBox3D {
        BBox3D {
            p1: Point3D::new(
                self.p1.x.min(other.p1.x),
                self.p1.y.min(other.p1.y),
                self.p1.z.min(other.p1.z),
            ),
            p2: Point3D::new(
                self.p2.x.max(other.p2.x),
                self.p2.y.max(other.p2.y),
                self.p2.z.max(other.p2.z),
            ),
        }
    }

    /// Whether `(x, y, z)` lies inside the box, boundary included.
    #[inline]
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        self.p1.x <= x
            && x <= self.p2.x
            && self.p1.y <= y
            && y <= self.p2.y
            && self.p1.z <= z
            && z <= self.p2.z
    }

    /// Whether `pt` lies inside the box, boundary included.
    #[inline]
    pub fn contains_point(&self, pt: &Point3D) -> bool {
        self.contains(pt.x, pt.y, pt.z)
    }
}

// ============================================================================
// Tests
// ============================================================================
