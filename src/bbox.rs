//! Image-meta selection: choose the event's voxel grid placement.
//!
//! The box either comes fixed from the configuration (`BBoxBottom`) or is
//! derived per event: the active region (extent of all energy deposits) is
//! clipped to the world envelope, the box is centered on that overlap, and on
//! any axis where the overlap is larger than the box the center is jittered
//! by a uniform draw so that training crops sample the full active volume.
//!
//! The draw order is fixed (x, then y, then z) and the generator is re-seeded
//! from the configured seed on every call, so a given configuration always
//! produces the same box for the same event.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::BBoxConfig;
use crate::event::EventInput;
use crate::geom::{BBox3D, Point3D};
use crate::meta::ImageMeta3D;
use crate::{Error, Result};

/// The interaction-centered box selector.
#[derive(Debug, Clone)]
pub struct BBoxInteraction {
    xlen: f64,
    ylen: f64,
    zlen: f64,
    xvox: f64,
    yvox: f64,
    zvox: f64,
    bbox_bottom: Option<Point3D>,
    world_min: Point3D,
    world_max: Point3D,
    seed: u64,
}

/// Wall-clock fallback seed with sub-second resolution.
fn wall_clock_seed() -> u64 {
    let now = chrono::Utc::now();
    let secs = now.timestamp().max(0) as u64;
    secs.wrapping_mul(100) + u64::from(now.timestamp_subsec_micros()) / 100
}

impl BBoxInteraction {
    /// Validate the configuration and capture the selector parameters.
    pub fn configure(cfg: &BBoxConfig) -> Result<Self> {
        let [xlen, ylen, zlen] = cfg.bbox_size;
        if !(xlen > 0. && ylen > 0. && zlen > 0.) {
            return Err(Error::Config(format!(
                "BBoxSize must be positive on every axis (got {xlen}, {ylen}, {zlen})"
            )));
        }
        let [xvox, yvox, zvox] = cfg.voxel_size;
        if !(xvox > 0. && yvox > 0. && zvox > 0.) {
            return Err(Error::Config(format!(
                "VoxelSize must be positive on every axis (got {xvox}, {yvox}, {zvox})"
            )));
        }

        let seed = match cfg.seed {
            Some(seed) if seed >= 0 => seed as u64,
            _ => wall_clock_seed(),
        };

        let world_min = cfg
            .world_bound_min
            .map(|[x, y, z]| Point3D::new(x, y, z))
            .unwrap_or_else(|| Point3D::new(f64::MIN, f64::MIN, f64::MIN));
        let world_max = cfg
            .world_bound_max
            .map(|[x, y, z]| Point3D::new(x, y, z))
            .unwrap_or_else(|| Point3D::new(f64::MAX, f64::MAX, f64::MAX));

        Ok(Self {
            xlen,
            ylen,
            zlen,
            xvox,
            yvox,
            zvox,
            bbox_bottom: cfg.bbox_bottom.map(|[x, y, z]| Point3D::new(x, y, z)),
            world_min,
            world_max,
            seed,
        })
    }

    /// Choose the event's image meta.
    pub fn generate(&self, data: &EventInput) -> Result<ImageMeta3D> {
        debug!("deriving image meta");

        let xnum = (self.xlen / self.xvox) as usize;
        let ynum = (self.ylen / self.yvox) as usize;
        let znum = (self.zlen / self.zvox) as usize;

        // Fixed placement requested: data plays no role.
        if let Some(bottom) = self.bbox_bottom {
            debug!(
                "fixed box at ({}, {}, {})",
                bottom.x, bottom.y, bottom.z
            );
            let bbox = BBox3D::new(
                bottom.x,
                bottom.y,
                bottom.z,
                bottom.x + self.xlen,
                bottom.y + self.ylen,
                bottom.z + self.zlen,
            )?;
            return ImageMeta3D::new(bbox, xnum, ynum, znum);
        }

        // Step 1: the active region spanned by every energy deposit.
        let mut active_min = Point3D::new(f64::MAX, f64::MAX, f64::MAX);
        let mut active_max = Point3D::new(f64::MIN, f64::MIN, f64::MIN);
        let mut npoints = 0usize;
        for input in &data.particles {
            for pt in &input.pcloud {
                active_min.x = active_min.x.min(pt.x);
                active_min.y = active_min.y.min(pt.y);
                active_min.z = active_min.z.min(pt.z);
                active_max.x = active_max.x.max(pt.x);
                active_max.y = active_max.y.max(pt.y);
                active_max.z = active_max.z.max(pt.z);
                npoints += 1;
            }
        }
        if npoints == 0 {
            return Err(Error::NoData(
                "no energy deposition to define a bounding box".to_string(),
            ));
        }

        // Step 2: clip to the world envelope.
        let min_pt = Point3D::new(
            self.world_min.x.max(active_min.x),
            self.world_min.y.max(active_min.y),
            self.world_min.z.max(active_min.z),
        );
        let max_pt = Point3D::new(
            self.world_max.x.min(active_max.x),
            self.world_max.y.min(active_max.y),
            self.world_max.z.min(active_max.z),
        );
        if min_pt.x > max_pt.x || min_pt.y > max_pt.y || min_pt.z > max_pt.z {
            return Err(Error::NoData(format!(
                "active region does not overlap the world envelope \
                 (overlap min ({}, {}, {}) vs max ({}, {}, {}))",
                min_pt.x, min_pt.y, min_pt.z, max_pt.x, max_pt.y, max_pt.z
            )));
        }

        // Step 3: center on the overlap; jitter any axis with room to spare.
        let mut center = Point3D::new(
            min_pt.x + (max_pt.x - min_pt.x) / 2.,
            min_pt.y + (max_pt.y - min_pt.y) / 2.,
            min_pt.z + (max_pt.z - min_pt.z) / 2.,
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        if (max_pt.x - min_pt.x) > self.xlen {
            let offset = (max_pt.x - min_pt.x) / 2.;
            center.x += rng.gen_range(-offset..offset);
        }
        if (max_pt.y - min_pt.y) > self.ylen {
            let offset = (max_pt.y - min_pt.y) / 2.;
            center.y += rng.gen_range(-offset..offset);
        }
        if (max_pt.z - min_pt.z) > self.zlen {
            let offset = (max_pt.z - min_pt.z) / 2.;
            center.z += rng.gen_range(-offset..offset);
        }

        debug!(
            "box center ({}, {}, {}), extents {} x {} x {}, {} x {} x {} voxels",
            center.x, center.y, center.z, self.xlen, self.ylen, self.zlen, xnum, ynum, znum
        );

        let bbox = BBox3D::new(
            center.x - self.xlen / 2.,
            center.y - self.ylen / 2.,
            center.z - self.zlen / 2.,
            center.x + self.xlen / 2.,
            center.y + self.ylen / 2.,
            center.z + self.zlen / 2.,
        )?;
        ImageMeta3D::new(bbox, xnum, ynum, znum)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::EDep;
    use crate::particle::{Particle, ParticleInput};
    use approx::assert_relative_eq;

    fn config(seed: Option<i64>) -> BBoxConfig {
        BBoxConfig {
            bbox_size: [10., 10., 10.],
            voxel_size: [1., 1., 1.],
            bbox_bottom: None,
            world_bound_min: None,
            world_bound_max: None,
            seed,
        }
    }

    fn event_with_points(points: &[(f64, f64, f64)]) -> EventInput {
        let pcloud = points
            .iter()
            .map(|&(x, y, z)| EDep { x, y, z, t: 0., e: 1., dedx: 1. })
            .collect();
        let mut part = Particle::default();
        part.trackid = 1;
        part.parent_trackid = 1;
        EventInput {
            particles: vec![ParticleInput::new(part, pcloud)],
            unassociated_edeps: Vec::new(),
        }
    }

    #[test]
    fn fixed_bottom_ignores_data() {
        let mut cfg = config(Some(1));
        cfg.bbox_bottom = Some([5., 6., 7.]);
        let algo = BBoxInteraction::configure(&cfg).unwrap();
        let meta = algo.generate(&EventInput::default()).unwrap();
        assert_relative_eq!(meta.bbox().min_x(), 5.);
        assert_relative_eq!(meta.bbox().max_z(), 17.);
        assert_eq!(meta.num_voxel_x(), 10);
    }

    #[test]
    fn small_overlap_centers_the_box() {
        let algo = BBoxInteraction::configure(&config(Some(1))).unwrap();
        // active region 2 units wide around (1, 1, 1): smaller than the box
        let data = event_with_points(&[(0., 0., 0.), (2., 2., 2.)]);
        let meta = algo.generate(&data).unwrap();
        assert_relative_eq!(meta.bbox().min_x(), 1. - 5.);
        assert_relative_eq!(meta.bbox().max_x(), 1. + 5.);
        assert_eq!(meta.num_voxel_x(), 10);
    }

    #[test]
    fn wide_overlap_jitters_deterministically() {
        let algo = BBoxInteraction::configure(&config(Some(7))).unwrap();
        let data = event_with_points(&[(0., 0., 0.), (100., 0., 0.)]);
        let meta_a = algo.generate(&data).unwrap();
        let meta_b = algo.generate(&data).unwrap();
        // identical seed, identical box
        assert_eq!(meta_a.bbox(), meta_b.bbox());
        // the box still spans 10 units in x
        assert_relative_eq!(meta_a.bbox().max_x() - meta_a.bbox().min_x(), 10.);
        // y and z had no room to jitter: centered at 0
        assert_relative_eq!(meta_a.bbox().min_y(), -5.);
        assert_relative_eq!(meta_a.bbox().min_z(), -5.);
    }

    #[test]
    fn distinct_seeds_move_the_box() {
        let data = event_with_points(&[(0., 0., 0.), (100., 0., 0.)]);
        let meta_a = BBoxInteraction::configure(&config(Some(1)))
            .unwrap()
            .generate(&data)
            .unwrap();
        let meta_b = BBoxInteraction::configure(&config(Some(2)))
            .unwrap()
            .generate(&data)
            .unwrap();
        assert_ne!(meta_a.bbox().min_x(), meta_b.bbox().min_x());
    }

    #[test]
    fn no_deposits_is_a_no_data_error() {
        let algo = BBoxInteraction::configure(&config(Some(1))).unwrap();
        let err = algo.generate(&EventInput::default()).unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
    }

    #[test]
    fn disjoint_world_envelope_is_a_no_data_error() {
        let mut cfg = config(Some(1));
        cfg.world_bound_min = Some([50., 50., 50.]);
        cfg.world_bound_max = Some([60., 60., 60.]);
        let algo = BBoxInteraction::configure(&cfg).unwrap();
        let data = event_with_points(&[(0., 0., 0.), (2., 2., 2.)]);
        assert!(matches!(algo.generate(&data), Err(Error::NoData(_))));
    }

    #[test]
    fn invalid_sizes_are_config_errors() {
        let mut cfg = config(Some(1));
        cfg.bbox_size = [10., -10., 10.];
        assert!(matches!(
            BBoxInteraction::configure(&cfg),
            Err(Error::Config(_))
        ));

        let mut cfg = config(Some(1));
        cfg.voxel_size = [0., 1., 1.];
        assert!(matches!(
            BBoxInteraction::configure(&cfg),
            Err(Error::Config(_))
        ));
    }
}
