//! Event-level carrier types: the particle list going in, the labeled
//! particles and voxel tensors coming out.

use serde::{Deserialize, Serialize};

use crate::geom::EDep;
use crate::particle::{ParticleInput, ParticleLabel};
use crate::voxel::VoxelSet;

/// One event's worth of input: the ordered particle list plus energy
/// depositions not associated to any particle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventInput {
    /// The ordered particle list.
    pub particles: Vec<ParticleInput>,
    /// 3D energy depositions unassociated to any input particle.
    pub unassociated_edeps: Vec<EDep>,
}

impl EventInput {
    /// Number of input particles.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Whether the event carries no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// The labeled particles of one event and their voxel-level tensors.
///
/// `energies` and `semantic_labels` cover every voxel with energy in it;
/// `unassociated_voxels` is the subset that has no contributing particle
/// (those carry the low-energy-scatter semantic class).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventOutput {
    /// One label per kept particle, in output-id order.
    pub particles: Vec<ParticleLabel>,
    /// Total deposited energy per voxel, over all contributors.
    pub energies: VoxelSet,
    /// Winning semantic class per voxel (stored as its numeric code).
    pub semantic_labels: VoxelSet,
    /// Voxels carrying energy but no associated particle.
    pub unassociated_voxels: VoxelSet,
}

impl EventOutput {
    /// Energy-weighted mean dE/dX per voxel over the stored particles.
    ///
    /// Voxels whose particle-summed energy is zero are omitted (the weight
    /// would be undefined).
    pub fn voxel_dedxs(&self) -> VoxelSet {
        // particle-summed energies; the stored `energies` tensor also counts
        // unassociated deposits, which carry no dE/dX
        let mut energies = VoxelSet::new();
        for part in &self.particles {
            energies.emplace_set(&part.energy, true);
        }

        let mut weighted = VoxelSet::new();
        for part in &self.particles {
            for (id, dedx) in part.dedx.iter() {
                if let Some(e) = energies.find(id) {
                    weighted.emplace(id, dedx * e, true);
                }
            }
        }

        let mut result = VoxelSet::with_capacity(weighted.len());
        for (id, value) in weighted.iter() {
            let e = energies.find(id).unwrap_or(0.);
            if e > 0. {
                result.emplace(id, value / e, false);
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
