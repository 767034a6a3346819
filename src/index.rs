//! Parentage and ancestry working arrays for one event's particle list.
//!
//! All arrays are indexed by input position; `trackid_to_index` is the only
//! sparse structure (a vector indexed by track id with [`INVALID_INDEX`]
//! holes). Every track-id resolution in the crate goes through that map,
//! the parent-history lookup included, so sparse track ids behave the same
//! as dense ones.
//!
//! Assumptions:
//! - track and parent track ids are set for all particles;
//! - a primary particle carries its own track id as its parent track id.

use tracing::{debug, error};

use crate::event::EventInput;
use crate::{
    Error, Index, PdgCode, Result, TrackId, INVALID_INDEX, INVALID_PDG, INVALID_TRACKID,
};

/// Genealogy lookup tables for one event.
#[derive(Debug, Clone, Default)]
pub struct ParticleIndex {
    trackid_v: Vec<TrackId>,
    pdgcode_v: Vec<PdgCode>,
    parent_index_v: Vec<Index>,
    parent_trackid_v: Vec<TrackId>,
    parent_pdg_v: Vec<PdgCode>,
    ancestor_index_v: Vec<Index>,
    ancestor_trackid_v: Vec<TrackId>,
    ancestor_pdg_v: Vec<PdgCode>,
    trackid2index: Vec<Index>,
    parent_history_v: Vec<Vec<TrackId>>,
    empty_trackid_v: Vec<TrackId>,
}

impl ParticleIndex {
    /// Rebuild every lookup table from one event's particle list.
    pub fn infer_parentage(&mut self, data: &EventInput) -> Result<()> {
        let n = data.particles.len();
        self.trackid_v = vec![INVALID_TRACKID; n];
        self.pdgcode_v = vec![INVALID_PDG; n];
        self.parent_index_v = vec![INVALID_INDEX; n];
        self.parent_trackid_v = vec![INVALID_TRACKID; n];
        self.parent_pdg_v = vec![INVALID_PDG; n];
        self.ancestor_index_v = vec![INVALID_INDEX; n];
        self.ancestor_trackid_v = vec![INVALID_TRACKID; n];
        self.ancestor_pdg_v = vec![INVALID_PDG; n];
        self.parent_history_v = vec![Vec::new(); n];
        self.trackid2index = vec![INVALID_INDEX; n];

        // First pass: the track id <-> input index mapping.
        for (index, input) in data.particles.iter().enumerate() {
            let part = &input.part;
            if part.trackid == INVALID_TRACKID {
                error!("particle at input index {index} has no track id");
                return Err(Error::Data(format!(
                    "track id cannot be invalid (input index {index})"
                )));
            }
            self.trackid_v[index] = part.trackid;
            self.pdgcode_v[index] = part.pdg.abs();
            self.parent_trackid_v[index] = part.parent_trackid;
            if part.trackid >= self.trackid2index.len() {
                self.trackid2index.resize(part.trackid + 1, INVALID_INDEX);
            }
            self.trackid2index[part.trackid] = index;
        }

        // Second pass: parent and ancestor resolution. The ancestor is the
        // *primary* particle at the top of the hierarchy containing this
        // particle; a primary is its own ancestor.
        for (index, input) in data.particles.iter().enumerate() {
            let part = &input.part;

            if part.parent_trackid == INVALID_TRACKID {
                error!(
                    "particle track id {} has no parent track id",
                    part.trackid
                );
                return Err(Error::Data(format!(
                    "parent track id cannot be invalid (track id {})",
                    part.trackid
                )));
            }

            if let Some(&mother_index) = self.trackid2index.get(part.parent_trackid) {
                if mother_index != INVALID_INDEX {
                    self.parent_pdg_v[index] = data.particles[mother_index].part.pdg;
                    self.parent_index_v[index] = mother_index;
                }
            }

            let mut subject_trackid = part.trackid;
            let mut parent_trackid = part.parent_trackid;
            let mut ancestor_index = INVALID_INDEX;
            let mut ancestor_trackid = INVALID_TRACKID;
            while parent_trackid < self.trackid2index.len() {
                if parent_trackid == subject_trackid {
                    // self-loop: a primary, its own ancestor
                    ancestor_index = self.trackid2index[subject_trackid];
                    ancestor_trackid = subject_trackid;
                    break;
                }
                if self.parent_history_v[index].contains(&parent_trackid) {
                    // a cycle that is not a self-loop; stop at first repeat
                    debug!(
                        "parentage cycle detected at track id {parent_trackid} \
                         (walking from track id {})",
                        part.trackid
                    );
                    break;
                }
                self.parent_history_v[index].push(parent_trackid);
                let parent_index = self.trackid2index[parent_trackid];
                if parent_index == INVALID_INDEX {
                    break;
                }
                let parent = &data.particles[parent_index].part;
                subject_trackid = parent.trackid;
                parent_trackid = parent.parent_trackid;
            }

            self.ancestor_index_v[index] = ancestor_index;
            self.ancestor_trackid_v[index] = ancestor_trackid;
            if ancestor_index < data.particles.len() {
                self.ancestor_pdg_v[index] = data.particles[ancestor_index].part.pdg;
            }
        }
        Ok(())
    }

    /// Copy the resolved parent/ancestor ids back onto the input particles.
    pub fn set_parent_info(&mut self, data: &mut EventInput) -> Result<()> {
        self.infer_parentage(data)?;
        for (idx, input) in data.particles.iter_mut().enumerate() {
            let part = &mut input.part;
            part.parent_pdg = self.parent_pdg_v[idx];
            part.parent_trackid = self.parent_trackid_v[idx];
            part.ancestor_pdg = self.ancestor_pdg_v[idx];
            part.ancestor_trackid = self.ancestor_trackid_v[idx];
        }
        Ok(())
    }

    /// Ordered ancestor track ids for one particle, nearest parent first.
    /// Unknown track ids resolve to an empty list.
    pub fn parent_history(&self, trackid: TrackId) -> &[TrackId] {
        let index = self.index_of(trackid);
        if index == INVALID_INDEX {
            error!("track id {trackid} is not indexed; returning an empty history");
            return &self.empty_trackid_v;
        }
        &self.parent_history_v[index]
    }

    /// Input index of a track id; [`INVALID_INDEX`] for unknown ids.
    #[inline]
    pub fn index_of(&self, trackid: TrackId) -> Index {
        match self.trackid2index.get(trackid) {
            Some(&index) => index,
            None => INVALID_INDEX,
        }
    }

    /// Absolute PDG code per input index.
    pub fn pdg_code(&self) -> &[PdgCode] {
        &self.pdgcode_v
    }
    /// Parent input index per input index.
    pub fn parent_index(&self) -> &[Index] {
        &self.parent_index_v
    }
    /// Parent track id per input index.
    pub fn parent_track_id(&self) -> &[TrackId] {
        &self.parent_trackid_v
    }
    /// Parent PDG code per input index.
    pub fn parent_pdg_code(&self) -> &[PdgCode] {
        &self.parent_pdg_v
    }
    /// Ancestor input index per input index.
    pub fn ancestor_index(&self) -> &[Index] {
        &self.ancestor_index_v
    }
    /// Ancestor track id per input index.
    pub fn ancestor_track_id(&self) -> &[TrackId] {
        &self.ancestor_trackid_v
    }
    /// Ancestor PDG code per input index.
    pub fn ancestor_pdg_code(&self) -> &[PdgCode] {
        &self.ancestor_pdg_v
    }
    /// The sparse track id to input index map.
    pub fn trackid_to_index(&self) -> &[Index] {
        &self.trackid2index
    }
}

// ============================================================================
// Tests
// ============================================================================
