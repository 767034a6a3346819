//! Particle truth records and the working labels of the grouping engine.
//!
//! A [`Particle`] corresponds to one simulated track plus derived output
//! identifiers; a [`ParticleInput`] pairs it with its raw energy-deposit
//! cloud; a [`ParticleLabel`] is the mutable working record the labeling
//! engine merges and finally emits.

use serde::{Deserialize, Serialize};

use crate::geom::{EDep, Vertex};
use crate::voxel::VoxelSet;
use crate::{
    Error, InstanceId, PdgCode, Result, TrackId, INVALID_DOUBLE, INVALID_INSTANCEID, INVALID_PDG,
    INVALID_TRACKID,
};

// ============================================================================
// Enumerations (closed sets with stable numeric codes)
// ============================================================================

/// Creation-process class of a particle.
///
/// The numeric codes are stable: they are shared with the upstream readers
/// and the on-disk training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProcessType {
    /// Track-like particle.
    Track = 0,
    /// Neutron secondary.
    Neutron = 1,
    /// Nuclear fragment.
    Nucleus = 2,
    /// Photon.
    Photon = 3,
    /// Generator-level primary.
    Primary = 4,
    /// Compton-scattered electron.
    Compton = 5,
    /// Knocked-off electron.
    Delta = 6,
    /// Gamma pair production.
    Conversion = 7,
    /// Ionization electron; like a delta ray but too low-energy to stand on
    /// its own.
    Ionization = 8,
    /// Photo-electric electron.
    PhotoElectron = 9,
    /// Decay product.
    Decay = 10,
    /// Any other shower-producing process.
    OtherShower = 11,
    /// Unset or unrecognized process.
    InvalidProcess = 12,
}

impl ProcessType {
    /// The stable numeric code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Object appearance class in the detector, used as the per-voxel semantic
/// label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SemanticType {
    /// Electromagnetic shower.
    Shower = 0,
    /// Track.
    Track = 1,
    /// Michel electron.
    Michel = 2,
    /// Delta ray.
    Delta = 3,
    /// Low-energy scattering (e.g. a low-E Compton); catch-all for
    /// sub-threshold fragments.
    LEScatter = 4,
    /// Ghost 3D point.
    Ghost = 5,
    /// Not (yet) classified.
    Unknown = 6,
}

impl SemanticType {
    /// The stable numeric code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a stable numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => SemanticType::Shower,
            1 => SemanticType::Track,
            2 => SemanticType::Michel,
            3 => SemanticType::Delta,
            4 => SemanticType::LEScatter,
            5 => SemanticType::Ghost,
            6 => SemanticType::Unknown,
            _ => return None,
        })
    }
}

// ============================================================================
// Particle
// ============================================================================

/// Truth information for one simulated particle, with genealogy and the
/// derived output identifiers filled in by the labeling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Particle {
    /// Dense id of this particle in the output collection.
    pub id: InstanceId,
    /// Creation process class.
    pub process_type: ProcessType,
    /// Semantic class.
    pub shape: SemanticType,
    /// Simulation track id.
    pub trackid: TrackId,
    /// Original generator id, when different from the simulation track id.
    pub genid: TrackId,
    /// PDG code.
    pub pdg: PdgCode,
    /// Initial momentum, x component.
    pub px: f64,
    /// Initial momentum, y component.
    pub py: f64,
    /// Initial momentum, z component.
    pub pz: f64,
    /// Final momentum, x component.
    pub end_px: f64,
    /// Final momentum, y component.
    pub end_py: f64,
    /// Final momentum, z component.
    pub end_pz: f64,
    /// Creation vertex.
    pub vtx: Vertex,
    /// Point at which the particle left the simulated world.
    pub end_pt: Vertex,
    /// First energy-deposition point inside the detector.
    pub first_step: Vertex,
    /// Last energy-deposition point inside the detector.
    pub last_step: Vertex,
    /// Distance measured along the trajectory, when known.
    pub dist_travel: f64,
    /// Initial energy.
    pub energy_init: f64,
    /// Total deposited energy inside the image.
    pub energy_deposit: f64,
    /// Simulation name of the creation process.
    pub process: String,

    /// Simulation track id of the parent.
    pub parent_trackid: TrackId,
    /// PDG code of the parent.
    pub parent_pdg: PdgCode,
    /// Creation vertex of the parent.
    pub parent_vtx: Vertex,
    /// Simulation name of the parent's creation process.
    pub parent_process: String,
    /// Dense id of the parent in the output collection.
    pub parent_id: InstanceId,

    /// Track id of the ancestor: the primary at the top of the hierarchy
    /// containing this particle (a primary is its own ancestor).
    pub ancestor_trackid: TrackId,
    /// PDG code of the ancestor.
    pub ancestor_pdg: PdgCode,
    /// Creation vertex of the ancestor.
    pub ancestor_vtx: Vertex,
    /// Simulation name of the ancestor's creation process.
    pub ancestor_process: String,
    /// Dense id of the ancestor in the output collection.
    pub ancestor_id: InstanceId,

    /// Dense ids of the children in the output collection.
    pub children_id: Vec<InstanceId>,
    /// Id grouping particles to be reconstructed as one object.
    pub group_id: InstanceId,
    /// Id grouping particles per interaction (shared ancestor vertex).
    pub interaction_id: InstanceId,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            id: INVALID_INSTANCEID,
            process_type: ProcessType::InvalidProcess,
            shape: SemanticType::Unknown,
            trackid: INVALID_TRACKID,
            genid: INVALID_TRACKID,
            pdg: INVALID_PDG,
            px: 0.,
            py: 0.,
            pz: 0.,
            end_px: INVALID_DOUBLE,
            end_py: INVALID_DOUBLE,
            end_pz: INVALID_DOUBLE,
            vtx: Vertex::default(),
            end_pt: Vertex::default(),
            first_step: Vertex::default(),
            last_step: Vertex::default(),
            dist_travel: -1.,
            energy_init: 0.,
            energy_deposit: 0.,
            process: String::new(),
            parent_trackid: INVALID_TRACKID,
            parent_pdg: INVALID_PDG,
            parent_vtx: Vertex::default(),
            parent_process: String::new(),
            parent_id: INVALID_INSTANCEID,
            ancestor_trackid: INVALID_TRACKID,
            ancestor_pdg: INVALID_PDG,
            ancestor_vtx: Vertex::default(),
            ancestor_process: String::new(),
            ancestor_id: INVALID_INSTANCEID,
            children_id: Vec::new(),
            group_id: INVALID_INSTANCEID,
            interaction_id: INVALID_INSTANCEID,
        }
    }
}

impl Particle {
    /// Initial momentum magnitude.
    pub fn p(&self) -> f64 {
        (self.px.powi(2) + self.py.powi(2) + self.pz.powi(2)).sqrt()
    }

    /// Final momentum magnitude.
    pub fn end_p(&self) -> f64 {
        (self.end_px.powi(2) + self.end_py.powi(2) + self.end_pz.powi(2)).sqrt()
    }
}

// ============================================================================
// ParticleInput
// ============================================================================

/// One particle's truth record plus its raw energy-deposit cloud, as
/// delivered by the upstream simulation reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleInput {
    /// The particle's truth record.
    pub part: Particle,
    /// 3D energy depositions associated to this particle.
    pub pcloud: Vec<EDep>,
    /// Whether the upstream reader considers this record usable.
    pub valid: bool,
}

impl Default for ParticleInput {
    fn default() -> Self {
        Self { part: Particle::default(), pcloud: Vec::new(), valid: true }
    }
}

impl ParticleInput {
    /// Pair a truth record with its point cloud.
    pub fn new(part: Particle, pcloud: Vec<EDep>) -> Self {
        Self { part, pcloud, valid: true }
    }
}

// ============================================================================
// ParticleLabel
// ============================================================================

/// Working record of the labeling engine for one input particle: its voxels,
/// time extremes, and merge bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleLabel {
    /// The particle's truth record, with output ids filled in as the engine
    /// progresses.
    pub part: Particle,
    /// Whether this record still stands on its own (false once absorbed).
    pub valid: bool,
    /// Track ids of descendants merged into this record.
    pub merged_v: Vec<TrackId>,
    /// Track id of the record this one was merged into, when absorbed.
    pub merge_id: TrackId,
    /// Voxelized energy deposition.
    pub energy: VoxelSet,
    /// Voxelized dE/dX.
    pub dedx: VoxelSet,
    /// First energy deposition by time (a point, not a voxel).
    pub first_pt: EDep,
    /// Last energy deposition by time (a point, not a voxel).
    pub last_pt: EDep,
}

impl Default for ParticleLabel {
    fn default() -> Self {
        Self {
            part: Particle::default(),
            valid: false,
            merged_v: Vec::new(),
            merge_id: INVALID_TRACKID,
            energy: VoxelSet::new(),
            dedx: VoxelSet::new(),
            first_pt: EDep::default(),
            last_pt: EDep::default(),
        }
    }
}

impl ParticleLabel {
    /// Track the earliest deposition point. Points with an unset position
    /// are ignored.
    pub fn update_first_point(&mut self, pt: &EDep) {
        if pt.x == INVALID_DOUBLE {
            return;
        }
        if self.first_pt.t == INVALID_DOUBLE || pt.t < self.first_pt.t {
            self.first_pt = *pt;
        }
    }

    /// Track the latest deposition point. Points with an unset position are
    /// ignored.
    pub fn update_last_point(&mut self, pt: &EDep) {
        if pt.x == INVALID_DOUBLE {
            return;
        }
        if self.last_pt.t == INVALID_DOUBLE || pt.t > self.last_pt.t {
            self.last_pt = *pt;
        }
    }

    /// Number of voxels carrying energy, after checking the energy/dE-dX
    /// pairing invariant.
    pub fn size(&self) -> Result<usize> {
        self.size_check()?;
        Ok(self.energy.len())
    }

    /// Energy and dE/dX voxel sets must pair up one-to-one.
    pub fn size_check(&self) -> Result<()> {
        if !self.dedx.is_empty() && self.energy.len() != self.dedx.len() {
            return Err(Error::Logic(format!(
                "voxel count mismatch: {} energy vs {} dE/dX",
                self.energy.len(),
                self.dedx.len()
            )));
        }
        Ok(())
    }

    /// Absorb `child` into this record: voxels accumulate, the time extremes
    /// widen, and the child's merge lineage is re-pointed here. The child is
    /// left empty and invalid.
    pub fn merge(&mut self, child: &mut ParticleLabel) {
        self.energy.emplace_set(&child.energy, true);
        self.dedx.emplace_set(&child.dedx, true);

        let last = child.last_pt;
        let first = child.first_pt;
        self.update_first_point(&last);
        self.update_last_point(&last);
        self.update_first_point(&first);
        self.update_last_point(&first);

        self.merged_v.push(child.part.trackid);
        self.merged_v.extend_from_slice(&child.merged_v);

        child.merge_id = self.part.trackid;
        child.energy.clear();
        child.dedx.clear();
        child.valid = false;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn edep(x: f64, t: f64, e: f64) -> EDep {
        EDep { x, y: 0., z: 0., t, e, dedx: 1.0 }
    }

    #[test]
    fn first_and_last_points_track_time_extremes() {
        let mut label = ParticleLabel::default();
        label.update_first_point(&edep(1., 5., 0.1));
        label.update_last_point(&edep(1., 5., 0.1));
        assert_eq!(label.first_pt.t, 5.);
        assert_eq!(label.last_pt.t, 5.);

        label.update_first_point(&edep(2., 3., 0.1));
        label.update_last_point(&edep(2., 3., 0.1));
        assert_eq!(label.first_pt.t, 3.);
        assert_eq!(label.last_pt.t, 5.);

        // unset positions are ignored
        label.update_first_point(&EDep::default());
        assert_eq!(label.first_pt.t, 3.);
    }

    #[test]
    fn merge_moves_voxels_and_lineage() {
        let mut parent = ParticleLabel::default();
        parent.part.trackid = 1;
        parent.valid = true;
        parent.energy.emplace(10, 1.0, true);
        parent.dedx.emplace(10, 2.0, true);
        parent.update_first_point(&edep(0., 1., 1.0));
        parent.update_last_point(&edep(0., 1., 1.0));

        let mut child = ParticleLabel::default();
        child.part.trackid = 2;
        child.valid = true;
        child.merged_v.push(7);
        child.energy.emplace(10, 0.5, true);
        child.energy.emplace(11, 0.25, true);
        child.dedx.emplace(10, 1.0, true);
        child.dedx.emplace(11, 1.0, true);
        child.update_first_point(&edep(0., 0.5, 1.0));
        child.update_last_point(&edep(0., 4., 1.0));

        parent.merge(&mut child);

        assert_eq!(parent.energy.len(), 2);
        assert_eq!(parent.energy.find(10), Some(1.5));
        assert_eq!(parent.energy.find(11), Some(0.25));
        assert_eq!(parent.merged_v, vec![2, 7]);
        assert_eq!(parent.first_pt.t, 0.5);
        assert_eq!(parent.last_pt.t, 4.);

        assert!(!child.valid);
        assert!(child.energy.is_empty());
        assert_eq!(child.merge_id, 1);
    }

    #[test]
    fn size_check_catches_unpaired_sets() {
        let mut label = ParticleLabel::default();
        label.energy.emplace(1, 1.0, true);
        label.dedx.emplace(1, 1.0, true);
        label.dedx.emplace(2, 1.0, true);
        assert!(label.size_check().is_err());
        label.energy.emplace(2, 1.0, true);
        assert_eq!(label.size().unwrap(), 2);
    }

    #[test]
    fn semantic_codes_are_stable() {
        assert_eq!(SemanticType::Shower.code(), 0);
        assert_eq!(SemanticType::Track.code(), 1);
        assert_eq!(SemanticType::Michel.code(), 2);
        assert_eq!(SemanticType::Delta.code(), 3);
        assert_eq!(SemanticType::LEScatter.code(), 4);
        assert_eq!(SemanticType::Ghost.code(), 5);
        assert_eq!(SemanticType::Unknown.code(), 6);
        assert_eq!(SemanticType::from_code(3), Some(SemanticType::Delta));
        assert_eq!(SemanticType::from_code(7), None);
    }
}
