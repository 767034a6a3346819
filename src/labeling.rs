//! The labeling engine: from raw particle truth to training labels.
//!
//! ## Overview
//! One `generate` call runs a fixed sequence of phases over the event:
//!
//! 1. **Initialize** — copy particle records, voxelize their point clouds
//!    into the image, track first/last deposition times.
//! 2. **Pre-classification merges** — small electrons produced by
//!    photo-electric/ionization/Compton/conversion processes are absorbed
//!    into a touching ancestor.
//! 3. **Energy threshold** — sub-threshold voxels are dropped (energy and
//!    dE/dX stay paired).
//! 4. **Semantic classification** — each particle gets its appearance class
//!    from (process, pdg, parent pdg, voxel count).
//! 5. **Post-classification merges** — conversions onto their parents,
//!    family-touching shower fragments, same-family touching showers,
//!    absorbed low-energy scatters, and undersized delta rays; each merge
//!    pass repeats until a full sweep changes nothing, visiting labels in
//!    input order so results are reproducible.
//! 6. **Output registration** — surviving particles receive dense output
//!    ids; merged descendants map onto their absorber.
//! 7. **Group & interaction ids** — per-shape grouping rules and sequential
//!    interaction numbering by ancestor vertex.
//! 8. **Tensor emission** — per-voxel energy and semantic tensors, the
//!    semantic tie-break following the configured priority list (earlier
//!    entries win); unassociated deposits come last as low-energy scatter.
//!
//! A malformed event aborts with a precise error; no partial output leaves
//! this module.

use std::collections::BTreeSet;

use tracing::{debug, info, trace, warn};

use crate::config::LabelConfig;
use crate::event::{EventInput, EventOutput};
use crate::geom::{BBox3D, Vertex};
use crate::index::ParticleIndex;
use crate::meta::ImageMeta3D;
use crate::particle::{ParticleLabel, ProcessType, SemanticType};
use crate::voxel::VoxelSet;
use crate::{
    Error, Index, InstanceId, Result, TrackId, INVALID_DOUBLE, INVALID_INDEX,
    INVALID_INSTANCEID, INVALID_PDG, INVALID_TRACKID, INVALID_VOXELID,
};

/// Semantic classes that may appear in the output tensors, in code order.
const STORABLE_SEMANTICS: [SemanticType; 6] = [
    SemanticType::Shower,
    SemanticType::Track,
    SemanticType::Michel,
    SemanticType::Delta,
    SemanticType::LEScatter,
    SemanticType::Ghost,
];

/// Labeler for the lartpc_mlreco3d reconstruction chain.
pub struct LArTPCMLReco3D {
    semantic_priority: Vec<SemanticType>,
    touch_distance: usize,
    edep_threshold: f64,
    delta_size: usize,
    compton_size: usize,
    lescatter_size: usize,
    store_lescatter: bool,
    rewrite_interaction_id: bool,
    world_bounds: BBox3D,
    mcpl: ParticleIndex,
}

impl LArTPCMLReco3D {
    /// Validate the configuration and build a ready-to-run engine.
    pub fn configure(cfg: &LabelConfig) -> Result<Self> {
        let semantic_priority = build_semantic_priority(&cfg.semantic_priority)?;

        let [xmin, ymin, zmin] = cfg.world_bound_min.unwrap_or([f64::MIN; 3]);
        let [xmax, ymax, zmax] = cfg.world_bound_max.unwrap_or([f64::MAX; 3]);
        let world_bounds = BBox3D::new(xmin, ymin, zmin, xmax, ymax, zmax)?;

        Ok(Self {
            semantic_priority,
            touch_distance: cfg.touch_distance,
            edep_threshold: cfg.energy_deposit_threshold,
            delta_size: cfg.delta_size,
            compton_size: cfg.compton_size,
            lescatter_size: cfg.lescatter_size,
            store_lescatter: cfg.store_lescatter,
            rewrite_interaction_id: cfg.rewrite_interaction_id,
            world_bounds,
            mcpl: ParticleIndex::default(),
        })
    }

    /// Run every phase over one event and emit the labeled output.
    pub fn generate(&mut self, data: &EventInput, meta: &ImageMeta3D) -> Result<EventOutput> {
        debug!("labeling event with {} input particles", data.len());

        self.mcpl.infer_parentage(data)?;

        let mut labels = self.initialize_labels(data, meta);

        // group sub-particles into the particle a reconstruction should see
        self.merge_shower_touching_electron(meta, &mut labels)?;
        self.apply_energy_threshold(&mut labels)?;
        self.set_semantic_type(&mut labels)?;

        self.merge_shower_conversion(&mut labels)?;
        self.merge_shower_family_touching(meta, &mut labels)?;
        self.merge_shower_touching(meta, &mut labels)?;
        self.merge_shower_touching_lescatter(meta, &mut labels)?;
        self.merge_deltas(&mut labels)?;

        // photons reduced below the Compton cutoff by the merges above are
        // no longer showers
        for label in labels.iter_mut() {
            if !label.valid {
                continue;
            }
            if label.part.process_type != ProcessType::Photon {
                continue;
            }
            if label.energy.len() < self.compton_size {
                label.part.shape = SemanticType::LEScatter;
            }
        }

        let mut trackid2output: Vec<InstanceId> =
            vec![INVALID_INSTANCEID; self.mcpl.trackid_to_index().len()];
        let mut output2trackid: Vec<TrackId> =
            Vec::with_capacity(self.mcpl.trackid_to_index().len());
        self.register_output_particles(&mut labels, &mut output2trackid, &mut trackid2output)?;

        self.set_group_id(&mut labels)?;
        self.set_ancestor_attributes(&mut labels)?;

        // the upstream reader may have set these already (e.g. ND-LAr)
        if self.rewrite_interaction_id {
            self.set_interaction_id(&mut labels);
        }

        if tracing::enabled!(tracing::Level::TRACE) {
            for label in &labels {
                if label.valid {
                    self.dump_hierarchy(label.part.trackid, &labels);
                }
            }
        }

        // unassociated deposits become their own voxel set
        let mut unass = VoxelSet::with_capacity(data.unassociated_edeps.len());
        let mut invalid_unass_ctr = 0usize;
        for edep in &data.unassociated_edeps {
            let vox_id = meta.id(edep.x, edep.y, edep.z);
            if vox_id == INVALID_VOXELID {
                invalid_unass_ctr += 1;
                continue;
            }
            unass.emplace(vox_id, edep.e as f32, true);
        }
        if invalid_unass_ctr > 0 {
            warn!(
                "{invalid_unass_ctr}/{} unassociated deposits ignored (outside the image)",
                data.unassociated_edeps.len()
            );
        }

        self.build_output_labels(labels, &output2trackid, unass)
    }

    // ========================================================================
    // Phase 1 — initialization
    // ========================================================================

    fn initialize_labels(&self, data: &EventInput, meta: &ImageMeta3D) -> Vec<ParticleLabel> {
        debug!("initializing labels");
        let mut labels: Vec<ParticleLabel> = Vec::with_capacity(data.len());
        for (idx, input) in data.particles.iter().enumerate() {
            let mut label = ParticleLabel::default();
            label.part = input.part.clone();
            label.part.parent_pdg = self.mcpl.parent_pdg_code()[idx];
            if label.part.parent_pdg != INVALID_PDG {
                label.valid = true;
            }

            for edep in &input.pcloud {
                let vox_id = meta.id(edep.x, edep.y, edep.z);
                if vox_id == INVALID_VOXELID || !self.world_bounds.contains(edep.x, edep.y, edep.z)
                {
                    trace!(
                        "skipping deposit of track id {} (E={}, pos=({}, {}, {}))",
                        label.part.trackid,
                        edep.e,
                        edep.x,
                        edep.y,
                        edep.z
                    );
                    continue;
                }
                label.energy.emplace(vox_id, edep.e as f32, true);
                label.dedx.emplace(vox_id, edep.dedx as f32, true);
                label.update_first_point(edep);
                label.update_last_point(edep);
            }
            labels.push(label);
        }
        labels
    }

    // ========================================================================
    // Phase 2 — pre-classification merges
    // ========================================================================

    /// Absorb small electrons (photo-electric, ionization, Compton,
    /// conversion) into the nearest touching ancestor. Fixed point.
    fn merge_shower_touching_electron(
        &self,
        meta: &ImageMeta3D,
        labels: &mut [ParticleLabel],
    ) -> Result<()> {
        debug!("merging touching electrons");
        let mut merge_ctr = 1usize;
        while merge_ctr > 0 {
            merge_ctr = 0;
            for i in 0..labels.len() {
                {
                    let label = &labels[i];
                    if !label.valid
                        || label.energy.is_empty()
                        || label.energy.len() > self.compton_size
                        || label.part.pdg.abs() != 11
                    {
                        continue;
                    }
                    if !matches!(
                        label.part.process_type,
                        ProcessType::PhotoElectron
                            | ProcessType::Ionization
                            | ProcessType::Compton
                            | ProcessType::Conversion
                    ) {
                        continue;
                    }
                }

                let trackid = labels[i].part.trackid;
                let parents = self.mcpl.parent_history(trackid).to_vec();
                for parent_trackid in parents {
                    let parent_index = self.mcpl.index_of(parent_trackid);
                    if parent_index == INVALID_INDEX {
                        continue;
                    }
                    let touching = {
                        let parent = &labels[parent_index];
                        if !parent.valid || parent.energy.is_empty() {
                            continue;
                        }
                        self.is_touching(meta, &labels[i].energy, &parent.energy)?
                    };
                    if touching {
                        trace!(
                            "merging electron track id {trackid} into touching parent \
                             track id {parent_trackid}"
                        );
                        self.merge_particle_label(labels, parent_trackid, trackid)?;
                        merge_ctr += 1;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Phase 3 — energy threshold
    // ========================================================================

    fn apply_energy_threshold(&self, labels: &mut [ParticleLabel]) -> Result<()> {
        debug!("applying energy threshold {}", self.edep_threshold);
        for label in labels.iter_mut() {
            let mut energies = VoxelSet::with_capacity(label.energy.len());
            let mut dedxs = VoxelSet::with_capacity(label.dedx.len());

            for idx in 0..label.energy.len() {
                let id = label.energy.ids()[idx];
                let value = label.energy.values()[idx];
                if f64::from(value) < self.edep_threshold {
                    continue;
                }
                if label.dedx.ids().get(idx).copied() != Some(id) {
                    return Err(Error::Logic(format!(
                        "unmatched voxel id between dE/dX and energy on track id {}",
                        label.part.trackid
                    )));
                }
                energies.emplace(id, value, true);
                dedxs.emplace(id, label.dedx.values()[idx], true);
            }
            label.energy = energies;
            label.dedx = dedxs;
        }
        Ok(())
    }

    // ========================================================================
    // Phase 4 — semantic classification
    // ========================================================================

    fn set_semantic_type(&self, labels: &mut [ParticleLabel]) -> Result<()> {
        debug!("classifying semantics");
        for label in labels.iter_mut() {
            if !label.valid {
                continue;
            }
            let pdg = label.part.pdg;
            let size = label.energy.len();
            label.part.shape = match label.part.process_type {
                ProcessType::InvalidProcess => {
                    return Err(Error::Data(format!(
                        "invalid creation process on track id {}",
                        label.part.trackid
                    )));
                }
                ProcessType::Track => SemanticType::Track,
                ProcessType::Primary => {
                    if pdg.abs() != 11 && pdg != 22 {
                        SemanticType::Track
                    } else {
                        SemanticType::Shower
                    }
                }
                ProcessType::Delta => {
                    if size < self.delta_size {
                        SemanticType::LEScatter
                    } else {
                        SemanticType::Delta
                    }
                }
                ProcessType::Decay => {
                    if pdg.abs() == 11 && label.part.parent_pdg.abs() == 13 {
                        SemanticType::Michel
                    } else if pdg.abs() == 11 || pdg == 22 {
                        if size > self.compton_size {
                            SemanticType::Shower
                        } else {
                            SemanticType::LEScatter
                        }
                    } else {
                        SemanticType::Track
                    }
                }
                ProcessType::Ionization | ProcessType::PhotoElectron | ProcessType::Neutron => {
                    SemanticType::LEScatter
                }
                ProcessType::Photon => SemanticType::Shower,
                ProcessType::Conversion | ProcessType::Compton | ProcessType::OtherShower => {
                    if pdg.abs() == 11 || pdg == 22 {
                        if size > self.compton_size {
                            SemanticType::Shower
                        } else {
                            SemanticType::LEScatter
                        }
                    } else {
                        SemanticType::Track
                    }
                }
                ProcessType::Nucleus => {
                    if size > self.compton_size {
                        SemanticType::Track
                    } else {
                        SemanticType::LEScatter
                    }
                }
            };
        }
        Ok(())
    }

    // ========================================================================
    // Phase 5 — post-classification merges
    // ========================================================================

    /// Pair-production electrons always join their parent photon. Fixed
    /// point.
    fn merge_shower_conversion(&self, labels: &mut [ParticleLabel]) -> Result<()> {
        debug!("merging conversions");
        loop {
            let mut merge_ctr = 0usize;
            for i in 0..labels.len() {
                if !labels[i].valid {
                    continue;
                }
                if labels[i].part.process_type != ProcessType::Conversion {
                    continue;
                }
                if labels[i].part.pdg.abs() != 11 {
                    return Err(Error::Data(format!(
                        "conversion particle that is not an electron (track id {}, pdg {})",
                        labels[i].part.trackid, labels[i].part.pdg
                    )));
                }

                let trackid = labels[i].part.trackid;
                let mut found_trackid = INVALID_TRACKID;
                for &parent_trackid in self.mcpl.parent_history(trackid) {
                    let parent_index = self.mcpl.index_of(parent_trackid);
                    if parent_index == INVALID_INDEX || !labels[parent_index].valid {
                        trace!(
                            "no valid parent record at track id {parent_trackid} \
                             for conversion track id {trackid}"
                        );
                        continue;
                    }
                    found_trackid = parent_trackid;
                    break;
                }
                if found_trackid != INVALID_TRACKID {
                    self.merge_particle_label(labels, found_trackid, trackid)?;
                    merge_ctr += 1;
                }
            }
            debug!("conversion merge counter: {merge_ctr}");
            if merge_ctr == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Merge shower fragments onto a touching direct parent of
    /// shower/delta/Michel shape. Fixed point.
    fn merge_shower_family_touching(
        &self,
        meta: &ImageMeta3D,
        labels: &mut [ParticleLabel],
    ) -> Result<()> {
        debug!("merging family-touching showers");
        loop {
            let mut merge_ctr = 0usize;
            for i in 0..labels.len() {
                if !labels[i].valid || labels[i].part.shape != SemanticType::Shower {
                    continue;
                }
                // primaries carry no parent to merge into
                if labels[i].part.parent_trackid == INVALID_TRACKID {
                    continue;
                }
                let trackid = labels[i].part.trackid;
                let wanted_parent = labels[i].part.parent_trackid;

                // the alleged parent directly, or the record that absorbed it
                let mut parent_trackid = INVALID_TRACKID;
                let direct_index = self.mcpl.index_of(wanted_parent);
                if direct_index != INVALID_INDEX && labels[direct_index].valid {
                    parent_trackid = wanted_parent;
                } else {
                    for candidate in labels.iter() {
                        if candidate.part.trackid == wanted_parent || !candidate.valid {
                            continue;
                        }
                        if candidate.merged_v.contains(&wanted_parent) {
                            parent_trackid = candidate.part.trackid;
                            break;
                        }
                    }
                }
                if parent_trackid == INVALID_TRACKID || parent_trackid == trackid {
                    continue;
                }
                let parent_index = self.mcpl.index_of(parent_trackid);
                if parent_index == INVALID_INDEX {
                    continue;
                }

                let do_merge = {
                    let parent = &labels[parent_index];
                    matches!(
                        parent.part.shape,
                        SemanticType::Shower | SemanticType::Delta | SemanticType::Michel
                    ) && parent.valid
                        && self.is_touching(meta, &labels[i].energy, &parent.energy)?
                };
                if do_merge {
                    self.merge_particle_label(labels, parent_trackid, trackid)?;
                    trace!("merged shower track id {trackid} into track id {parent_trackid}");
                    merge_ctr += 1;
                }
            }
            debug!("family-touching merge counter: {merge_ctr}");
            if merge_ctr == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Merge every touching pair of showers that shares a member of its
    /// shower ancestry (smaller into larger). Fixed point.
    fn merge_shower_touching(
        &self,
        meta: &ImageMeta3D,
        labels: &mut [ParticleLabel],
    ) -> Result<()> {
        debug!("merging same-family touching showers");
        loop {
            let mut merge_ctr = 0usize;
            for i in 0..labels.len() {
                if !labels[i].valid || labels[i].part.shape != SemanticType::Shower {
                    continue;
                }
                for j in 0..labels.len() {
                    if i == j {
                        continue;
                    }
                    if !labels[j].valid || labels[j].part.shape != SemanticType::Shower {
                        continue;
                    }

                    let trackid_a = labels[i].part.trackid;
                    let trackid_b = labels[j].part.trackid;

                    let mut parent_list_a: BTreeSet<TrackId> = self
                        .parent_shower_trackids(trackid_a, labels, false)
                        .into_iter()
                        .collect();
                    parent_list_a.insert(trackid_a);
                    let mut parent_list_b: BTreeSet<TrackId> = self
                        .parent_shower_trackids(trackid_b, labels, false)
                        .into_iter()
                        .collect();
                    parent_list_b.insert(trackid_b);

                    let same_family =
                        parent_list_a.intersection(&parent_list_b).next().is_some();
                    if !same_family {
                        continue;
                    }
                    if !self.is_touching(meta, &labels[i].energy, &labels[j].energy)? {
                        continue;
                    }

                    if labels[i].energy.len() > labels[j].energy.len() {
                        self.merge_particle_label(labels, trackid_a, trackid_b)?;
                    } else {
                        self.merge_particle_label(labels, trackid_b, trackid_a)?;
                    }
                    merge_ctr += 1;
                }
            }
            info!("shower-touching merge counter: {merge_ctr}");
            if merge_ctr == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Absorb small low-energy scatters into any touching non-LEScatter
    /// label. Fixed point.
    fn merge_shower_touching_lescatter(
        &self,
        meta: &ImageMeta3D,
        labels: &mut [ParticleLabel],
    ) -> Result<()> {
        debug!("merging touching low-energy scatters");
        let mut merge_ctr = 1usize;
        while merge_ctr > 0 {
            merge_ctr = 0;
            for i in 0..labels.len() {
                {
                    let label = &labels[i];
                    if !label.valid
                        || label.energy.is_empty()
                        || label.energy.len() > self.lescatter_size
                        || label.part.shape != SemanticType::LEScatter
                    {
                        continue;
                    }
                    // neutron/nucleus fragments are genuinely detached
                    if matches!(
                        label.part.process_type,
                        ProcessType::Neutron | ProcessType::Nucleus
                    ) {
                        continue;
                    }
                }

                let trackid = labels[i].part.trackid;
                for j in 0..labels.len() {
                    let touching = {
                        let dest = &labels[j];
                        if !dest.valid || dest.part.shape == SemanticType::LEScatter {
                            continue;
                        }
                        self.is_touching(meta, &labels[i].energy, &dest.energy)?
                    };
                    if touching {
                        let dest_trackid = labels[j].part.trackid;
                        trace!(
                            "merging low-energy scatter track id {trackid} into touching \
                             track id {dest_trackid}"
                        );
                        self.merge_particle_label(labels, dest_trackid, trackid)?;
                        merge_ctr += 1;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Merge delta rays that are too small, or that add too few voxels
    /// beyond their parent, back into the parent. Single pass.
    fn merge_deltas(&self, labels: &mut [ParticleLabel]) -> Result<()> {
        debug!("merging undersized deltas");
        for i in 0..labels.len() {
            if labels[i].part.shape != SemanticType::Delta {
                continue;
            }
            let trackid = labels[i].part.trackid;
            let parent_trackid = labels[i].part.parent_trackid;
            let parent_index = self.mcpl.index_of(parent_trackid);
            if parent_index == INVALID_INDEX {
                continue;
            }
            if !labels[parent_index].valid {
                continue;
            }

            let unique_voxels = labels[i]
                .energy
                .ids()
                .iter()
                .filter(|&&id| !labels[parent_index].energy.contains(id))
                .count();

            if labels[i].energy.len() < self.delta_size || unique_voxels < self.delta_size {
                info!(
                    "merging delta track id {trackid} ({} voxels, {unique_voxels} unique) \
                     into parent track id {parent_trackid}",
                    labels[i].energy.len()
                );
                self.merge_particle_label(labels, parent_trackid, trackid)?;
            } else {
                info!(
                    "keeping delta track id {trackid} ({} voxels, {unique_voxels} unique)",
                    labels[i].energy.len()
                );
            }
        }
        Ok(())
    }

    // ========================================================================
    // Phase 6 — output registration
    // ========================================================================

    fn register_output_particles(
        &self,
        labels: &mut [ParticleLabel],
        output2trackid: &mut Vec<TrackId>,
        trackid2output: &mut [InstanceId],
    ) -> Result<()> {
        debug!("registering output particles");
        let mut lescatter_index_v: Vec<Index> = Vec::with_capacity(labels.len());

        for label_index in 0..labels.len() {
            let label = &mut labels[label_index];
            label.part.energy_deposit =
                if label.energy.is_empty() { 0. } else { label.energy.sum() };

            if !label.valid {
                trace!("skipping merged particle (track id {})", label.part.trackid);
                continue;
            }
            if label.part.trackid == INVALID_TRACKID {
                continue;
            }
            if label.part.shape == SemanticType::LEScatter {
                lescatter_index_v.push(label_index);
                continue;
            }
            if label.part.shape == SemanticType::Unknown {
                return Err(Error::Logic(format!(
                    "valid particle with unknown shape at registration (track id {})",
                    label.part.trackid
                )));
            }
            assign_output_id(label, output2trackid, trackid2output);
        }

        if self.store_lescatter {
            for &label_index in &lescatter_index_v {
                assign_output_id(&mut labels[label_index], output2trackid, trackid2output);
            }
        }

        // parent output ids, resolvable or not
        for i in 0..labels.len() {
            let parent_index = self.mcpl.index_of(labels[i].part.parent_trackid);
            let parent_id = if parent_index == INVALID_INDEX {
                INVALID_INSTANCEID
            } else {
                labels[parent_index].part.id
            };
            labels[i].part.parent_id = parent_id;
        }
        Ok(())
    }

    // ========================================================================
    // Phase 7 — group and interaction identifiers
    // ========================================================================

    fn set_group_id(&self, labels: &mut [ParticleLabel]) -> Result<()> {
        debug!("assigning group ids");
        for i in 0..labels.len() {
            if !labels[i].valid {
                continue;
            }
            // primaries group with themselves
            if labels[i].part.trackid == labels[i].part.parent_trackid {
                labels[i].part.group_id = labels[i].part.id;
                continue;
            }
            match labels[i].part.shape {
                SemanticType::Track | SemanticType::Michel => {
                    labels[i].part.group_id = labels[i].part.id;
                }
                SemanticType::Delta => {
                    let parent_index = self.mcpl.index_of(labels[i].part.parent_trackid);
                    if parent_index == INVALID_INDEX || !labels[parent_index].valid {
                        return Err(Error::Data(format!(
                            "delta ray with an invalid parent (track id {})",
                            labels[i].part.trackid
                        )));
                    }
                    labels[i].part.group_id = labels[parent_index].part.id;
                }
                SemanticType::Shower => {
                    // follow shower parents upward; a non-shower stops the
                    // walk, so the topmost connected shower ancestor wins
                    let mut group_id = labels[i].part.id;
                    let trackid = labels[i].part.trackid;
                    for &parent_trackid in self.mcpl.parent_history(trackid) {
                        let parent_index = self.mcpl.index_of(parent_trackid);
                        if parent_index == INVALID_INDEX {
                            continue;
                        }
                        let parent = &labels[parent_index];
                        if !parent.valid {
                            continue;
                        }
                        if parent.part.shape == SemanticType::LEScatter {
                            continue;
                        }
                        if parent.part.shape != SemanticType::Shower {
                            break;
                        }
                        if parent.part.id == INVALID_INSTANCEID {
                            continue;
                        }
                        group_id = parent.part.id;
                    }
                    labels[i].part.group_id = group_id;
                }
                SemanticType::LEScatter => {}
                other => {
                    return Err(Error::Logic(format!(
                        "unexpected shape {other:?} while grouping (track id {})",
                        labels[i].part.trackid
                    )));
                }
            }
        }
        Ok(())
    }

    /// Reconcile parent/ancestor track ids against the walked history and
    /// copy the resolved records' attributes.
    fn set_ancestor_attributes(&self, labels: &mut [ParticleLabel]) -> Result<()> {
        debug!("filling ancestor attributes");
        for i in 0..labels.len() {
            if !labels[i].valid {
                continue;
            }
            let trackid = labels[i].part.trackid;
            let mut parent_trackid = labels[i].part.parent_trackid;
            let mut ancestor_trackid = labels[i].part.ancestor_trackid;
            let history = self.mcpl.parent_history(trackid);

            if parent_trackid == INVALID_TRACKID {
                if let Some(&first) = history.first() {
                    parent_trackid = first;
                }
            }
            if ancestor_trackid == INVALID_TRACKID {
                if let Some(&last) = history.last() {
                    ancestor_trackid = last;
                }
            }

            if let Some(&first) = history.first() {
                if first != parent_trackid {
                    return Err(Error::Data(format!(
                        "parent track id {parent_trackid} of track id {trackid} does not \
                         match the first ancestry entry {first}"
                    )));
                }
            }
            if let Some(&last) = history.last() {
                if last != ancestor_trackid {
                    return Err(Error::Data(format!(
                        "ancestor track id {ancestor_trackid} of track id {trackid} does \
                         not match the most distant ancestry entry {last}"
                    )));
                }
            }

            if parent_trackid == INVALID_TRACKID {
                return Err(Error::Data(format!(
                    "parent track id missing for track id {trackid}"
                )));
            }
            if ancestor_trackid == INVALID_TRACKID {
                info!(
                    "ancestor track id not set for track id {trackid}; \
                     using the parent track id {parent_trackid}"
                );
                ancestor_trackid = parent_trackid;
            }

            let parent_index = self.mcpl.index_of(parent_trackid);
            if parent_index != INVALID_INDEX {
                let (p_trackid, p_id, p_pdg, p_vtx, p_process) = {
                    let parent = &labels[parent_index].part;
                    (
                        parent.trackid,
                        parent.id,
                        parent.pdg,
                        parent.vtx,
                        parent.process.clone(),
                    )
                };
                let part = &mut labels[i].part;
                part.parent_trackid = p_trackid;
                part.parent_id = p_id;
                part.parent_pdg = p_pdg;
                part.parent_vtx = p_vtx;
                part.parent_process = p_process;
            }

            let ancestor_index = self.mcpl.index_of(ancestor_trackid);
            if ancestor_index != INVALID_INDEX {
                let (a_trackid, a_id, a_pdg, a_vtx, a_process) = {
                    let ancestor = &labels[ancestor_index].part;
                    (
                        ancestor.trackid,
                        ancestor.id,
                        ancestor.pdg,
                        ancestor.vtx,
                        ancestor.process.clone(),
                    )
                };
                let part = &mut labels[i].part;
                part.ancestor_trackid = a_trackid;
                part.ancestor_id = a_id;
                part.ancestor_pdg = a_pdg;
                part.ancestor_vtx = a_vtx;
                part.ancestor_process = a_process;
            }
        }
        Ok(())
    }

    /// Number interactions sequentially by distinct ancestor vertex in
    /// first-seen order.
    fn set_interaction_id(&self, labels: &mut [ParticleLabel]) {
        debug!("assigning interaction ids");
        let mut int2vtx: Vec<Vertex> = Vec::new();
        for label in labels.iter_mut() {
            if !label.valid {
                continue;
            }
            let vtx = label.part.ancestor_vtx;
            let iid = match int2vtx.iter().position(|known| *known == vtx) {
                Some(pos) => pos as InstanceId,
                None => {
                    int2vtx.push(vtx);
                    (int2vtx.len() - 1) as InstanceId
                }
            };
            label.part.interaction_id = iid;
        }
    }

    // ========================================================================
    // Phase 8 — tensor emission
    // ========================================================================

    fn build_output_labels(
        &self,
        mut labels: Vec<ParticleLabel>,
        output2trackid: &[TrackId],
        unass: VoxelSet,
    ) -> Result<EventOutput> {
        debug!("building output tensors for {} particles", output2trackid.len());

        let mut output_particles: Vec<ParticleLabel> =
            Vec::with_capacity(output2trackid.len());
        for &trackid in output2trackid {
            let index = self.mcpl.index_of(trackid);
            if index == INVALID_INDEX {
                return Err(Error::Logic(format!(
                    "registered track id {trackid} is not indexed"
                )));
            }
            // leaves an invalid placeholder behind
            output_particles.push(std::mem::take(&mut labels[index]));
        }

        let mut result = EventOutput::default();

        // unassociated deposits first; particles overwrite their labels below
        result.energies.reserve(unass.len());
        result.semantic_labels.reserve(unass.len());
        for (id, value) in unass.iter() {
            result.energies.emplace(id, value, true);
            result
                .semantic_labels
                .emplace(id, f32::from(SemanticType::LEScatter.code()), false);
        }

        // reversed priority order, so earlier-listed classes land last and win
        for &stype in self.semantic_priority.iter().rev() {
            for label in &output_particles {
                if label.part.shape != stype {
                    continue;
                }
                if label.energy.len() != label.dedx.len() {
                    return Err(Error::Logic(format!(
                        "energy/dE-dX voxel mismatch on output track id {}",
                        label.part.trackid
                    )));
                }
                emit_label_voxels(label, stype, &mut result)?;
            }

            // low-energy scatters dropped from the particle list still label
            // their voxels
            if stype == SemanticType::LEScatter && !self.store_lescatter {
                for label in &labels {
                    if !label.valid {
                        continue;
                    }
                    if label.part.shape != SemanticType::LEScatter {
                        return Err(Error::Logic(format!(
                            "unregistered particle of shape {:?} left over \
                             (track id {})",
                            label.part.shape, label.part.trackid
                        )));
                    }
                    emit_label_voxels(label, stype, &mut result)?;
                }
            }
        }

        result.particles = output_particles;
        result.unassociated_voxels = unass;
        Ok(result)
    }

    // ========================================================================
    // Shared predicates & helpers
    // ========================================================================

    /// Two voxel sets touch when they overlap, or when any pair of voxels
    /// sits within the configured index-space distance on every axis.
    fn is_touching(&self, meta: &ImageMeta3D, vs1: &VoxelSet, vs2: &VoxelSet) -> Result<bool> {
        if vs1.is_empty() || vs2.is_empty() {
            return Ok(false);
        }

        // overlap: probe the smaller set against the larger
        let (small, large) = if vs1.len() < vs2.len() { (vs1, vs2) } else { (vs2, vs1) };
        for &id in small.ids() {
            if large.contains(id) {
                return Ok(true);
            }
        }

        // proximity in integer index space
        for &id1 in vs1.ids() {
            let (ix1, iy1, iz1) = meta.id_to_xyz_index(id1)?;
            for &id2 in vs2.ids() {
                let (ix2, iy2, iz2) = meta.id_to_xyz_index(id2)?;
                if ix1.abs_diff(ix2) <= self.touch_distance
                    && iy1.abs_diff(iy2) <= self.touch_distance
                    && iz1.abs_diff(iz2) <= self.touch_distance
                {
                    trace!(
                        "touching ({ix1},{iy1},{iz1}) vs ({ix2},{iy2},{iz2})"
                    );
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Walk the shower ancestry of a particle: Michel/shower/delta parents
    /// are collected, invalid or unindexed parents are skipped, and the
    /// first track-like or unclassified parent ends the walk.
    fn parent_shower_trackids(
        &self,
        trackid: TrackId,
        labels: &[ParticleLabel],
        include_lescatter: bool,
    ) -> Vec<TrackId> {
        let mut result = Vec::new();
        if self.mcpl.index_of(trackid) == INVALID_INDEX {
            return result;
        }
        let parents = self.mcpl.parent_history(trackid);
        result.reserve(parents.len());

        for &parent_trackid in parents {
            let parent_index = self.mcpl.index_of(parent_trackid);
            if parent_index == INVALID_INDEX {
                continue;
            }
            let label = &labels[parent_index];
            if label.part.shape == SemanticType::Track || label.part.shape == SemanticType::Unknown
            {
                break;
            }
            if !label.valid {
                continue;
            }
            match label.part.shape {
                SemanticType::Michel | SemanticType::Shower | SemanticType::Delta => {
                    result.push(parent_trackid);
                }
                SemanticType::LEScatter if include_lescatter => {
                    result.push(parent_trackid);
                }
                _ => {}
            }
        }
        result
    }

    /// Merge the record of `target_trackid` into that of `dest_trackid` and
    /// re-point every previously absorbed descendant.
    fn merge_particle_label(
        &self,
        labels: &mut [ParticleLabel],
        dest_trackid: TrackId,
        target_trackid: TrackId,
    ) -> Result<()> {
        let dest_index = self.mcpl.index_of(dest_trackid);
        let target_index = self.mcpl.index_of(target_trackid);
        if dest_index == INVALID_INDEX
            || target_index == INVALID_INDEX
            || dest_index == target_index
        {
            return Err(Error::Logic(format!(
                "cannot merge track id {target_trackid} into track id {dest_trackid}"
            )));
        }

        let moved = {
            let (dest, target) = pair_mut(labels, dest_index, target_index);
            dest.merge(target);
            target.merged_v.clone()
        };
        for moved_trackid in moved {
            let moved_index = self.mcpl.index_of(moved_trackid);
            if moved_index == INVALID_INDEX {
                return Err(Error::Logic(format!(
                    "absorbed track id {moved_trackid} is not indexed"
                )));
            }
            labels[moved_index].merge_id = dest_trackid;
        }
        Ok(())
    }

    /// Trace the stored record and parent chain of one particle.
    fn dump_hierarchy(&self, trackid: TrackId, labels: &[ParticleLabel]) {
        let index = self.mcpl.index_of(trackid);
        if index == INVALID_INDEX {
            return;
        }
        let label = &labels[index];
        trace!(
            "track id {trackid}: id {} parent id {} shape {:?} group {} voxels {}",
            label.part.id,
            label.part.parent_id,
            label.part.shape,
            label.part.group_id,
            label.energy.len()
        );
        let mut parent_trackid = label.part.parent_trackid;
        let mut hops = 0usize;
        while parent_trackid != INVALID_TRACKID {
            let parent_index = self.mcpl.index_of(parent_trackid);
            if parent_index == INVALID_INDEX {
                break;
            }
            let parent = &labels[parent_index];
            trace!(
                "  parent track id {parent_trackid}: group {} valid {}",
                parent.part.group_id,
                parent.valid
            );
            if parent_trackid == parent.part.parent_trackid {
                break;
            }
            parent_trackid = parent.part.parent_trackid;
            hops += 1;
            if hops > labels.len() {
                break;
            }
        }
    }
}

/// Append one label's voxels to the event tensors under `stype`.
fn emit_label_voxels(
    label: &ParticleLabel,
    stype: SemanticType,
    result: &mut EventOutput,
) -> Result<()> {
    result.energies.reserve(label.energy.len());
    result.semantic_labels.reserve(label.energy.len());
    for (id, value) in label.energy.iter() {
        if value.is_nan() {
            return Err(Error::Data(format!(
                "NaN energy deposit on track id {} (voxel {id})",
                label.part.trackid
            )));
        }
        result.energies.emplace(id, value, true);
        result.semantic_labels.emplace(id, f32::from(stype.code()), false);
    }
    Ok(())
}

/// Assign the next dense output id to a surviving particle and point every
/// absorbed descendant at it.
fn assign_output_id(
    label: &mut ParticleLabel,
    output2trackid: &mut Vec<TrackId>,
    trackid2output: &mut [InstanceId],
) {
    let part = &mut label.part;
    part.id = output2trackid.len() as InstanceId;
    trackid2output[part.trackid] = part.id;
    for &child_trackid in &label.merged_v {
        trackid2output[child_trackid] = part.id;
    }
    output2trackid.push(part.trackid);

    if label.first_pt.t != INVALID_DOUBLE {
        part.first_step =
            Vertex::new(label.first_pt.x, label.first_pt.y, label.first_pt.z, label.first_pt.t);
    }
    if label.last_pt.t != INVALID_DOUBLE {
        part.last_step =
            Vertex::new(label.last_pt.x, label.last_pt.y, label.last_pt.z, label.last_pt.t);
    }
}

/// Validate a configured priority list and complete it with the remaining
/// storable classes in code order.
fn build_semantic_priority(order: &[u8]) -> Result<Vec<SemanticType>> {
    let mut result: Vec<SemanticType> = Vec::with_capacity(STORABLE_SEMANTICS.len());
    for &code in order {
        let semantic = match SemanticType::from_code(code) {
            Some(semantic) if semantic != SemanticType::Unknown => semantic,
            _ => {
                return Err(Error::Config(format!(
                    "SemanticPriority received an unsupported semantic code {code}"
                )));
            }
        };
        if result.contains(&semantic) {
            return Err(Error::Config(format!(
                "duplicate SemanticPriority entry for code {code}"
            )));
        }
        result.push(semantic);
    }
    for semantic in STORABLE_SEMANTICS {
        if !result.contains(&semantic) {
            result.push(semantic);
        }
    }
    if result.len() != STORABLE_SEMANTICS.len() {
        return Err(Error::Logic(
            "semantic priority completion produced a wrong-sized list".to_string(),
        ));
    }
    Ok(result)
}

/// Distinct mutable references to two slice elements.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = slice.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = slice.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
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
    use crate::{PdgCode, INVALID_INSTANCEID};
    use approx::assert_relative_eq;

    fn test_meta() -> ImageMeta3D {
        ImageMeta3D::new(BBox3D::new(0., 0., 0., 10., 10., 10.).unwrap(), 10, 10, 10).unwrap()
    }

    fn engine() -> LArTPCMLReco3D {
        LArTPCMLReco3D::configure(&LabelConfig::default()).unwrap()
    }

    fn edep(x: f64, y: f64, z: f64, t: f64, e: f64) -> EDep {
        EDep { x, y, z, t, e, dedx: 1.0 }
    }

    /// A row of unit deposits along x at fixed (y, z), one per voxel.
    fn row(y: f64, z: f64, xs: std::ops::Range<usize>, t0: f64) -> Vec<EDep> {
        xs.map(|k| edep(0.5 + k as f64, y, z, t0 + k as f64, 1.0)).collect()
    }

    fn input(
        trackid: TrackId,
        parent: TrackId,
        pdg: PdgCode,
        process_type: ProcessType,
        pcloud: Vec<EDep>,
    ) -> ParticleInput {
        let mut part = Particle::default();
        part.trackid = trackid;
        part.parent_trackid = parent;
        part.pdg = pdg;
        part.process_type = process_type;
        ParticleInput::new(part, pcloud)
    }

    fn event(particles: Vec<ParticleInput>) -> EventInput {
        EventInput { particles, unassociated_edeps: Vec::new() }
    }

    fn muon_row() -> ParticleInput {
        input(1, 1, 13, ProcessType::Primary, row(0.5, 0.5, 0..5, 0.))
    }

    // ------------------------------------------------------------------
    // end-to-end scenarios
    // ------------------------------------------------------------------

    #[test]
    fn single_primary_muon_becomes_one_track() {
        let pcloud: Vec<EDep> =
            (0..11).map(|k| edep(0.2, 0.2, 0.2, k as f64, 0.1)).collect();
        let data = event(vec![input(1, 1, 13, ProcessType::Primary, pcloud)]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles.len(), 1);
        let label = &out.particles[0];
        assert_eq!(label.part.shape, SemanticType::Track);
        assert_eq!(label.part.id, 0);
        assert_eq!(label.part.group_id, 0);
        assert_eq!(label.part.interaction_id, 0);
        assert_eq!(label.energy.len(), 1);
        assert_relative_eq!(label.part.energy_deposit, 1.1, epsilon = 1e-5);
        assert_eq!(label.part.first_step.time, 0.);
        assert_eq!(label.part.last_step.time, 10.);
        // the lone voxel carries the track label
        assert_eq!(out.semantic_labels.find(0), Some(1.0));
        assert_relative_eq!(out.energies.find(0).unwrap(), 1.1, epsilon = 1e-5);
    }

    #[test]
    fn small_touching_compton_merges_into_the_muon() {
        let compton = input(
            2,
            1,
            11,
            ProcessType::Compton,
            vec![edep(2.5, 1.5, 0.5, 10., 0.5)],
        );
        let data = event(vec![muon_row(), compton]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles.len(), 1);
        let muon = &out.particles[0];
        assert_eq!(muon.part.trackid, 1);
        assert!(muon.merged_v.contains(&2));
        assert_eq!(out.energies.len(), 6);
        // absorbed voxels carry the absorber's label
        let vox = test_meta().id(2.5, 1.5, 0.5);
        assert_eq!(out.semantic_labels.find(vox), Some(1.0));
    }

    #[test]
    fn sibling_showers_sharing_ancestry_merge_into_the_larger() {
        let muon = input(1, 1, 13, ProcessType::Primary, row(9.5, 9.5, 0..3, 0.));
        let mut big = row(0.5, 0.5, 0..10, 0.);
        big.extend(row(1.5, 0.5, 0..2, 20.));
        let shower_a = input(2, 1, 11, ProcessType::Compton, big); // 12 voxels
        let gamma = input(4, 2, 22, ProcessType::Photon, Vec::new());
        let shower_b = input(3, 4, 11, ProcessType::Compton, row(2.5, 0.5, 0..11, 40.));

        let data = event(vec![muon, shower_a, gamma, shower_b]);
        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        // muon, the surviving shower, and the voxel-less photon (demoted to
        // low-energy scatter)
        assert_eq!(out.particles.len(), 3);
        let survivor = &out.particles[1];
        assert_eq!(survivor.part.trackid, 2);
        assert!(survivor.merged_v.contains(&3));
        assert_eq!(survivor.energy.len(), 23);
        // the survivor heads its own group
        assert_eq!(survivor.part.group_id, survivor.part.id);
        let demoted = &out.particles[2];
        assert_eq!(demoted.part.trackid, 4);
        assert_eq!(demoted.part.shape, SemanticType::LEScatter);
    }

    #[test]
    fn undersized_delta_merges_into_its_parent() {
        let delta = input(
            2,
            1,
            11,
            ProcessType::Delta,
            vec![
                edep(1.5, 0.5, 0.5, 10., 1.0),
                edep(2.5, 0.5, 0.5, 11., 1.0),
                edep(1.5, 1.5, 0.5, 12., 1.0),
            ],
        );
        let data = event(vec![muon_row(), delta]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        // 3 voxels but only 1 unique beyond the muon: absorbed
        assert_eq!(out.particles.len(), 1);
        assert!(out.particles[0].merged_v.contains(&2));
        assert_eq!(out.energies.len(), 6);
    }

    #[test]
    fn standalone_delta_groups_with_its_parent() {
        let delta = input(
            2,
            1,
            11,
            ProcessType::Delta,
            vec![
                edep(1.5, 2.5, 0.5, 10., 1.0),
                edep(2.5, 2.5, 0.5, 11., 1.0),
                edep(3.5, 2.5, 0.5, 12., 1.0),
            ],
        );
        let data = event(vec![muon_row(), delta]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles.len(), 2);
        let delta_out = &out.particles[1];
        assert_eq!(delta_out.part.shape, SemanticType::Delta);
        assert_eq!(delta_out.part.id, 1);
        assert_eq!(delta_out.part.group_id, out.particles[0].part.id);
    }

    #[test]
    fn out_of_image_unassociated_deposits_are_dropped() {
        let mut data = event(vec![muon_row()]);
        data.unassociated_edeps = vec![
            edep(8.5, 8.5, 8.5, 0., 0.7),
            edep(-5., 0., 0., 0., 1.0),
            edep(15., 0., 0., 0., 1.0),
        ];

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.unassociated_voxels.len(), 1);
        let vox = test_meta().id(8.5, 8.5, 8.5);
        assert_relative_eq!(out.energies.find(vox).unwrap(), 0.7);
        assert_eq!(out.semantic_labels.find(vox), Some(4.0));
    }

    #[test]
    fn unstored_lescatter_still_labels_its_voxels() {
        let scatter = input(
            2,
            1,
            11,
            ProcessType::Ionization,
            vec![edep(8.5, 8.5, 8.5, 0., 0.5)],
        );
        let data = event(vec![muon_row(), scatter]);

        let cfg = LabelConfig { store_lescatter: false, ..Default::default() };
        let mut eng = LArTPCMLReco3D::configure(&cfg).unwrap();
        let out = eng.generate(&data, &test_meta()).unwrap();

        // the scatter is gone from the particle list but not from the tensors
        assert_eq!(out.particles.len(), 1);
        assert_eq!(out.particles[0].part.trackid, 1);
        let vox = test_meta().id(8.5, 8.5, 8.5);
        assert_eq!(out.semantic_labels.find(vox), Some(4.0));
        assert_relative_eq!(out.energies.find(vox).unwrap(), 0.5);
    }

    #[test]
    fn stored_lescatter_registers_after_everything_else() {
        let scatter = input(
            2,
            1,
            11,
            ProcessType::Ionization,
            vec![edep(8.5, 8.5, 8.5, 0., 0.5)],
        );
        let data = event(vec![muon_row(), scatter]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles.len(), 2);
        let scatter_out = &out.particles[1];
        assert_eq!(scatter_out.part.shape, SemanticType::LEScatter);
        assert_eq!(scatter_out.part.id, 1);
        // low-energy scatters stay ungrouped
        assert_eq!(scatter_out.part.group_id, INVALID_INSTANCEID);
    }

    #[test]
    fn conversion_always_joins_its_parent() {
        let gamma = input(1, 1, 22, ProcessType::Photon, row(0.5, 0.5, 0..12, 0.));
        let electron = input(2, 1, 11, ProcessType::Conversion, row(7.5, 7.5, 0..11, 50.));
        let data = event(vec![gamma, electron]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        // no touching required for conversions
        assert_eq!(out.particles.len(), 1);
        assert_eq!(out.particles[0].part.trackid, 1);
        assert!(out.particles[0].merged_v.contains(&2));
        assert_eq!(out.particles[0].energy.len(), 23);
    }

    #[test]
    fn shower_descending_from_a_shower_takes_the_ancestor_group() {
        let gamma = input(1, 1, 22, ProcessType::Photon, row(0.5, 0.5, 0..12, 0.));
        let electron = input(2, 1, 11, ProcessType::Compton, row(5.5, 5.5, 0..12, 50.));
        let data = event(vec![gamma, electron]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        // detached, so no merge; but the group follows the shower ancestor
        assert_eq!(out.particles.len(), 2);
        let gamma_out = &out.particles[0];
        let electron_out = &out.particles[1];
        assert_eq!(gamma_out.part.group_id, gamma_out.part.id);
        assert_eq!(electron_out.part.group_id, gamma_out.part.id);
    }

    #[test]
    fn michel_heads_its_own_group() {
        let michel = input(2, 1, 11, ProcessType::Decay, row(2.5, 2.5, 0..12, 60.));
        let data = event(vec![muon_row(), michel]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles.len(), 2);
        let michel_out = &out.particles[1];
        assert_eq!(michel_out.part.shape, SemanticType::Michel);
        assert_eq!(michel_out.part.group_id, michel_out.part.id);
    }

    #[test]
    fn empty_point_cloud_particle_is_still_registered() {
        let data = event(vec![input(1, 1, 13, ProcessType::Primary, Vec::new())]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles.len(), 1);
        let label = &out.particles[0];
        assert_eq!(label.part.id, 0);
        assert!(label.energy.is_empty());
        assert_eq!(label.part.energy_deposit, 0.);
        // no deposits, so the step points stay unset
        assert_eq!(label.part.first_step.time, INVALID_DOUBLE);
    }

    // ------------------------------------------------------------------
    // semantic priority and tensors
    // ------------------------------------------------------------------

    #[test]
    fn priority_order_decides_shared_voxels() {
        let shared = vec![edep(0.5, 0.5, 0.5, 0., 1.0)];
        let muon = muon_row();
        let electron = input(2, 2, 11, ProcessType::Primary, shared);

        // default order puts showers above tracks
        let mut eng = engine();
        let out = eng
            .generate(&event(vec![muon.clone(), electron.clone()]), &test_meta())
            .unwrap();
        assert_eq!(out.semantic_labels.find(0), Some(0.0));
        assert_relative_eq!(out.energies.find(0).unwrap(), 2.0);

        // tracks first inverts the tie-break
        let cfg = LabelConfig { semantic_priority: vec![1, 0], ..Default::default() };
        let mut eng = LArTPCMLReco3D::configure(&cfg).unwrap();
        let out = eng.generate(&event(vec![muon, electron]), &test_meta()).unwrap();
        assert_eq!(out.semantic_labels.find(0), Some(1.0));
    }

    #[test]
    fn interaction_ids_follow_ancestor_vertices() {
        let mut muon_a = muon_row();
        muon_a.part.vtx = Vertex::new(0., 0., 0., 0.);
        let mut muon_b = input(2, 2, 13, ProcessType::Primary, row(3.5, 3.5, 0..5, 0.));
        muon_b.part.vtx = Vertex::new(5., 5., 5., 0.);
        let mut proton = input(3, 3, 2212, ProcessType::Primary, row(6.5, 6.5, 0..5, 0.));
        proton.part.vtx = Vertex::new(0., 0., 0., 0.);

        let data = event(vec![muon_a, muon_b, proton]);
        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();

        assert_eq!(out.particles[0].part.interaction_id, 0);
        assert_eq!(out.particles[1].part.interaction_id, 1);
        assert_eq!(out.particles[2].part.interaction_id, 0);
    }

    #[test]
    fn interaction_ids_untouched_when_rewrite_is_off() {
        let cfg = LabelConfig { rewrite_interaction_id: false, ..Default::default() };
        let mut eng = LArTPCMLReco3D::configure(&cfg).unwrap();
        let out = eng.generate(&event(vec![muon_row()]), &test_meta()).unwrap();
        assert_eq!(out.particles[0].part.interaction_id, INVALID_INSTANCEID);
    }

    #[test]
    fn energy_threshold_prunes_voxels() {
        let mut pcloud = row(0.5, 0.5, 0..3, 0.);
        pcloud.push(edep(5.5, 5.5, 5.5, 10., 0.001)); // below the 0.01 cut
        let data = event(vec![input(1, 1, 13, ProcessType::Primary, pcloud)]);

        let mut eng = engine();
        let out = eng.generate(&data, &test_meta()).unwrap();
        assert_eq!(out.particles[0].energy.len(), 3);
        assert!(out.energies.find(test_meta().id(5.5, 5.5, 5.5)).is_none());
    }

    #[test]
    fn nan_energy_is_fatal() {
        let data = event(vec![input(
            1,
            1,
            13,
            ProcessType::Primary,
            vec![edep(0.5, 0.5, 0.5, 0., f64::NAN)],
        )]);
        let mut eng = engine();
        assert!(matches!(
            eng.generate(&data, &test_meta()),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn invalid_process_is_fatal() {
        let data = event(vec![input(
            1,
            1,
            13,
            ProcessType::InvalidProcess,
            row(0.5, 0.5, 0..3, 0.),
        )]);
        let mut eng = engine();
        assert!(matches!(
            eng.generate(&data, &test_meta()),
            Err(Error::Data(_))
        ));
    }

    // ------------------------------------------------------------------
    // classification table
    // ------------------------------------------------------------------

    fn classified(
        process_type: ProcessType,
        pdg: PdgCode,
        parent_pdg: PdgCode,
        nvox: usize,
    ) -> SemanticType {
        let mut label = ParticleLabel::default();
        label.valid = true;
        label.part.trackid = 1;
        label.part.pdg = pdg;
        label.part.parent_pdg = parent_pdg;
        label.part.process_type = process_type;
        for id in 0..nvox {
            label.energy.emplace(id as u64, 1.0, true);
        }
        let mut labels = vec![label];
        engine().set_semantic_type(&mut labels).unwrap();
        labels[0].part.shape
    }

    #[test]
    fn classification_follows_the_table() {
        use ProcessType as P;
        use SemanticType as S;

        assert_eq!(classified(P::Track, 211, 0, 5), S::Track);
        assert_eq!(classified(P::Primary, 13, 0, 5), S::Track);
        assert_eq!(classified(P::Primary, 11, 0, 5), S::Shower);
        assert_eq!(classified(P::Primary, 22, 0, 5), S::Shower);
        assert_eq!(classified(P::Delta, 11, 13, 2), S::LEScatter);
        assert_eq!(classified(P::Delta, 11, 13, 5), S::Delta);
        assert_eq!(classified(P::Decay, 11, 13, 5), S::Michel);
        assert_eq!(classified(P::Decay, 11, -13, 5), S::Michel);
        assert_eq!(classified(P::Decay, 22, 2212, 15), S::Shower);
        assert_eq!(classified(P::Decay, 11, 211, 3), S::LEScatter);
        assert_eq!(classified(P::Decay, 211, 321, 5), S::Track);
        assert_eq!(classified(P::Ionization, 11, 13, 3), S::LEScatter);
        assert_eq!(classified(P::PhotoElectron, 11, 22, 3), S::LEScatter);
        assert_eq!(classified(P::Neutron, 2112, 2212, 30), S::LEScatter);
        assert_eq!(classified(P::Photon, 22, 111, 3), S::Shower);
        assert_eq!(classified(P::Compton, 11, 22, 15), S::Shower);
        assert_eq!(classified(P::Compton, 11, 22, 5), S::LEScatter);
        assert_eq!(classified(P::Conversion, 11, 22, 15), S::Shower);
        assert_eq!(classified(P::OtherShower, 2212, 22, 15), S::Track);
        assert_eq!(classified(P::Nucleus, 1000180400, 0, 15), S::Track);
        assert_eq!(classified(P::Nucleus, 1000180400, 0, 5), S::LEScatter);
    }

    // ------------------------------------------------------------------
    // touching predicate
    // ------------------------------------------------------------------

    #[test]
    fn touching_within_the_default_distance() {
        let eng = engine();
        let meta = test_meta();

        let mut a = VoxelSet::new();
        a.emplace(meta.index(1, 1, 1), 1.0, true);
        let mut b = VoxelSet::new();
        b.emplace(meta.index(2, 2, 2), 1.0, true);
        assert!(eng.is_touching(&meta, &a, &b).unwrap());

        let mut c = VoxelSet::new();
        c.emplace(meta.index(3, 1, 1), 1.0, true);
        assert!(!eng.is_touching(&meta, &a, &c).unwrap());

        // empty sets never touch
        assert!(!eng.is_touching(&meta, &a, &VoxelSet::new()).unwrap());
    }

    #[test]
    fn touch_distance_zero_reduces_to_overlap() {
        let cfg = LabelConfig { touch_distance: 0, ..Default::default() };
        let eng = LArTPCMLReco3D::configure(&cfg).unwrap();
        let meta = test_meta();

        let mut a = VoxelSet::new();
        a.emplace(meta.index(1, 1, 1), 1.0, true);
        let mut b = VoxelSet::new();
        b.emplace(meta.index(2, 1, 1), 1.0, true);
        assert!(!eng.is_touching(&meta, &a, &b).unwrap());

        b.emplace(meta.index(1, 1, 1), 1.0, true);
        assert!(eng.is_touching(&meta, &a, &b).unwrap());
    }

    // ------------------------------------------------------------------
    // priority list validation
    // ------------------------------------------------------------------

    #[test]
    fn priority_list_is_completed_in_code_order() {
        use SemanticType as S;
        let full = build_semantic_priority(&[]).unwrap();
        assert_eq!(
            full,
            vec![S::Shower, S::Track, S::Michel, S::Delta, S::LEScatter, S::Ghost]
        );

        let custom = build_semantic_priority(&[2, 3]).unwrap();
        assert_eq!(
            custom,
            vec![S::Michel, S::Delta, S::Shower, S::Track, S::LEScatter, S::Ghost]
        );
    }

    #[test]
    fn bad_priority_lists_are_config_errors() {
        assert!(matches!(
            build_semantic_priority(&[1, 1]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            build_semantic_priority(&[6]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            build_semantic_priority(&[9]),
            Err(Error::Config(_))
        ));
    }
}
