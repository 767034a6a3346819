//! The 3D voxel grid: a bounding box with per-axis voxel counts.
//!
//! `ImageMeta3D` owns the only id convention in the crate: ids are row-major
//! with Z slowest, `id = z*(xnum*ynum) + y*xnum + x`. Points outside the box
//! map to [`INVALID_VOXELID`]; a point exactly on a max face is clamped onto
//! the last index of that axis rather than dropped.

use serde::Serialize;
use tracing::trace;

use crate::geom::{BBox3D, EDep, Point3D};
use crate::voxel::VoxelSet;
use crate::{Error, Result, VoxelId, INVALID_VOXELID};

/// A validated voxel-grid definition.
///
/// Construction checks the invariants once (`num > 0` per axis, non-empty
/// box), so every instance can serve id queries without re-validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMeta3D {
    bbox: BBox3D,
    xnum: usize,
    ynum: usize,
    znum: usize,
    xlen: f64,
    ylen: f64,
    zlen: f64,
    num_element: u64,
}

impl ImageMeta3D {
    /// Define a grid over `bbox` with the given per-axis voxel counts.
    pub fn new(bbox: BBox3D, xnum: usize, ynum: usize, znum: usize) -> Result<Self> {
        if bbox.empty() {
            return Err(Error::Config(
                "empty voxel volume cannot define an image".to_string(),
            ));
        }
        if xnum == 0 || ynum == 0 || znum == 0 {
            return Err(Error::Config(format!(
                "voxel counts must be positive (got {xnum} x {ynum} x {znum})"
            )));
        }
        let meta = Self {
            bbox,
            xnum,
            ynum,
            znum,
            xlen: (bbox.max_x() - bbox.min_x()) / (xnum as f64),
            ylen: (bbox.max_y() - bbox.min_y()) / (ynum as f64),
            zlen: (bbox.max_z() - bbox.min_z()) / (znum as f64),
            num_element: (xnum as u64) * (ynum as u64) * (znum as u64),
        };
        trace!(
            "image meta: x {}..{} ({} bins), y {}..{} ({} bins), z {}..{} ({} bins)",
            meta.bbox.min_x(),
            meta.bbox.max_x(),
            xnum,
            meta.bbox.min_y(),
            meta.bbox.max_y(),
            ynum,
            meta.bbox.min_z(),
            meta.bbox.max_z(),
            znum
        );
        Ok(meta)
    }

    /// The spatial extent of the grid.
    #[inline]
    pub fn bbox(&self) -> &BBox3D {
        &self.bbox
    }

    /// Voxel count along x.
    #[inline]
    pub fn num_voxel_x(&self) -> usize {
        self.xnum
    }
    /// Voxel count along y.
    #[inline]
    pub fn num_voxel_y(&self) -> usize {
        self.ynum
    }
    /// Voxel count along z.
    #[inline]
    pub fn num_voxel_z(&self) -> usize {
        self.znum
    }

    /// Voxel edge length along x.
    #[inline]
    pub fn size_voxel_x(&self) -> f64 {
        self.xlen
    }
    /// Voxel edge length along y.
    #[inline]
    pub fn size_voxel_y(&self) -> f64 {
        self.ylen
    }
    /// Voxel edge length along z.
    #[inline]
    pub fn size_voxel_z(&self) -> f64 {
        self.zlen
    }

    /// Total number of voxels in the grid.
    #[inline]
    pub fn total_voxels(&self) -> u64 {
        self.num_element
    }

    /// Map a position to its voxel id; [`INVALID_VOXELID`] outside the box.
    pub fn id(&self, x: f64, y: f64, z: f64) -> VoxelId {
        if x > self.bbox.max_x() || x < self.bbox.min_x() {
            return INVALID_VOXELID;
        }
        if y > self.bbox.max_y() || y < self.bbox.min_y() {
            return INVALID_VOXELID;
        }
        if z > self.bbox.max_z() || z < self.bbox.min_z() {
            return INVALID_VOXELID;
        }

        let mut xindex = ((x - self.bbox.min_x()) / self.xlen) as usize;
        let mut yindex = ((y - self.bbox.min_y()) / self.ylen) as usize;
        let mut zindex = ((z - self.bbox.min_z()) / self.zlen) as usize;

        // Points exactly on a max face land on the last bin of that axis.
        if xindex == self.xnum {
            xindex -= 1;
        }
        if yindex == self.ynum {
            yindex -= 1;
        }
        if zindex == self.znum {
            zindex -= 1;
        }

        (zindex as u64) * (self.xnum as u64) * (self.ynum as u64)
            + (yindex as u64) * (self.xnum as u64)
            + (xindex as u64)
    }

    /// Map a point to its voxel id.
    #[inline]
    pub fn id_point(&self, pt: &Point3D) -> VoxelId {
        self.id(pt.x, pt.y, pt.z)
    }

    /// Map integer per-axis indices to a voxel id; [`INVALID_VOXELID`] when
    /// any index is out of range.
    pub fn index(&self, i_x: usize, i_y: usize, i_z: usize) -> VoxelId {
        if i_x >= self.xnum || i_y >= self.ynum || i_z >= self.znum {
            return INVALID_VOXELID;
        }
        (i_z as u64) * (self.xnum as u64) * (self.ynum as u64)
            + (i_y as u64) * (self.xnum as u64)
            + (i_x as u64)
    }

    /// The center position of a voxel.
    pub fn position(&self, id: VoxelId) -> Result<Point3D> {
        let (xid, yid, zid) = self.id_to_xyz_index(id)?;
        Ok(Point3D::new(
            self.bbox.min_x() + (xid as f64 + 0.5) * self.xlen,
            self.bbox.min_y() + (yid as f64 + 0.5) * self.ylen,
            self.bbox.min_z() + (zid as f64 + 0.5) * self.zlen,
        ))
    }

    /// Decompose a voxel id into per-axis integer indices.
    pub fn id_to_xyz_index(&self, id: VoxelId) -> Result<(usize, usize, usize)> {
        if id >= self.num_element {
            return Err(Error::Logic(format!(
                "voxel id {id} out of range (grid holds {} voxels)",
                self.num_element
            )));
        }
        let plane = (self.xnum as u64) * (self.ynum as u64);
        let zid = id / plane;
        let rest = id - zid * plane;
        let yid = rest / (self.xnum as u64);
        let xid = rest - yid * (self.xnum as u64);
        Ok((xid as usize, yid as usize, zid as usize))
    }

    /// Voxelize a batch of energy deposits, accumulating on shared voxels and
    /// skipping deposits outside the box.
    pub fn edep2voxelset(&self, edeps: &[EDep]) -> VoxelSet {
        let mut result = VoxelSet::with_capacity(edeps.len());
        for edep in edeps {
            let vox_id = self.id(edep.x, edep.y, edep.z);
            if vox_id == INVALID_VOXELID {
                continue;
            }
            result.emplace(vox_id, edep.e as f32, true);
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_4x3x2() -> ImageMeta3D {
        let bbox = BBox3D::new(0., 0., 0., 4., 3., 2.).unwrap();
        ImageMeta3D::new(bbox, 4, 3, 2).unwrap()
    }

    #[test]
    fn id_is_row_major_z_slowest() {
        let meta = meta_4x3x2();
        assert_eq!(meta.id(0.5, 0.5, 0.5), 0);
        assert_eq!(meta.id(1.5, 0.5, 0.5), 1);
        assert_eq!(meta.id(0.5, 1.5, 0.5), 4);
        assert_eq!(meta.id(0.5, 0.5, 1.5), 12);
        assert_eq!(meta.index(3, 2, 1), 23);
        assert_eq!(meta.total_voxels(), 24);
    }

    #[test]
    fn id_position_round_trip() {
        let meta = meta_4x3x2();
        for id in 0..meta.total_voxels() {
            let pos = meta.position(id).unwrap();
            assert_eq!(meta.id(pos.x, pos.y, pos.z), id);
        }
    }

    #[test]
    fn outside_points_are_invalid() {
        let meta = meta_4x3x2();
        assert_eq!(meta.id(-0.1, 0.5, 0.5), INVALID_VOXELID);
        assert_eq!(meta.id(0.5, 3.1, 0.5), INVALID_VOXELID);
        assert_eq!(meta.id(0.5, 0.5, 2.5), INVALID_VOXELID);
        assert_eq!(meta.index(4, 0, 0), INVALID_VOXELID);
    }

    #[test]
    fn max_face_clamps_to_last_bin() {
        let meta = meta_4x3x2();
        assert_eq!(meta.id(4.0, 3.0, 2.0), 23);
        assert_eq!(meta.id(4.0, 0.0, 0.0), 3);
    }

    #[test]
    fn id_to_xyz_index_decomposes() {
        let meta = meta_4x3x2();
        assert_eq!(meta.id_to_xyz_index(23).unwrap(), (3, 2, 1));
        assert_eq!(meta.id_to_xyz_index(5).unwrap(), (1, 1, 0));
        assert!(meta.id_to_xyz_index(24).is_err());
    }

    #[test]
    fn rejects_degenerate_definitions() {
        let bbox = BBox3D::new(0., 0., 0., 4., 3., 2.).unwrap();
        assert!(ImageMeta3D::new(bbox, 0, 3, 2).is_err());
        assert!(ImageMeta3D::new(BBox3D::default(), 1, 1, 1).is_err());
    }

    #[test]
    fn edep2voxelset_accumulates_and_drops_outside() {
        let meta = meta_4x3x2();
        let e1 = EDep { x: 0.5, y: 0.5, z: 0.5, e: 1.0, ..EDep::default() };
        let e2 = EDep { e: 0.5, ..e1 };
        let e3 = EDep { x: -5.0, ..e1 };
        let vs = meta.edep2voxelset(&[e1, e2, e3]);
        assert_eq!(vs.len(), 1);
        assert_eq!(vs.find(0), Some(1.5));
    }
}
