//! Crate root: public surface, core aliases, and pipeline-wide invariants
//!
//! This module is the **single canonical entry-point** for downstream users of
//! the library. It centralizes the identifier aliases and their invalid-value
//! sentinels, the shared error sum type, and re-exports the main submodules
//! that implement the truth-labeling pipeline.
//!
//! ## Invariants (pipeline-wide)
//!
//! - **Voxel ids.** A voxel id is a row-major, Z-major integer:
//!   `id = z*(xnum*ynum) + y*xnum + x`. Downstream consumers depend on this
//!   convention; it is fixed by [`meta::ImageMeta3D`] and never re-derived
//!   elsewhere.
//! - **Sentinels.** "Not set" is encoded with the maximum value of the
//!   respective type (`INVALID_TRACKID`, `INVALID_VOXELID`, ...), matching the
//!   on-disk conventions of the upstream simulation chain. Code never treats a
//!   sentinel as a real id.
//! - **Per-event isolation.** Every event is processed start-to-finish by a
//!   single thread; a malformed event surfaces as a **precise error** and no
//!   partial output is emitted.
//! - **Stable iteration.** All fixed-point merge passes visit labels in input
//!   index order, so identical input produces identical output.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Geometry primitives (points, energy deposits, vertices, boxes).
pub mod geom;
/// Ordered voxel-id/value set with accumulate-or-replace insertion.
pub mod voxel;
/// The 3D voxel grid definition (bounding box + per-axis counts).
pub mod meta;
/// Particle truth records, process/semantic enumerations, working labels.
pub mod particle;
/// Event-level carrier types (input particle list, labeled output).
pub mod event;
/// Configuration document types and validation.
pub mod config;
/// Track-id indexed parentage/ancestry working arrays.
pub mod index;
/// Image-meta selection from energy-deposit extents and a world envelope.
pub mod bbox;
/// The labeling engine: classification, hierarchical merging, tensor output.
pub mod labeling;
/// Per-event orchestration and algorithm selection by configuration name.
pub mod driver;

// ============================================================================
// Canonical aliases and sentinels (centralization)
// ============================================================================

/// PDG particle code (signed; the sign distinguishes antiparticles).
pub type PdgCode = i32;
/// Simulation-engine track identifier. Dense or sparse.
pub type TrackId = usize;
/// Position of a particle in the input array of one event.
pub type Index = usize;
/// Row-major voxel identifier within an [`meta::ImageMeta3D`].
pub type VoxelId = u64;
/// Dense output identifier (particle id / group id / interaction id).
pub type InstanceId = u64;

/// Sentinel for an unset floating-point quantity.
pub const INVALID_DOUBLE: f64 = f64::MAX;
/// Sentinel for an unset PDG code.
pub const INVALID_PDG: PdgCode = PdgCode::MAX;
/// Sentinel for an unset track id.
pub const INVALID_TRACKID: TrackId = TrackId::MAX;
/// Sentinel for an unset input-array index.
pub const INVALID_INDEX: Index = Index::MAX;
/// Sentinel for a point outside the voxel grid.
pub const INVALID_VOXELID: VoxelId = VoxelId::MAX;
/// Sentinel for an unset output identifier.
pub const INVALID_INSTANCEID: InstanceId = InstanceId::MAX;

// ============================================================================
// Shared error surface
// ============================================================================

/// Error sum type shared by the whole pipeline.
///
/// Every fatal condition in the core maps onto exactly one of these kinds and
/// aborts the current event; out-of-bounds energy deposits are the only
/// non-fatal anomaly (counted and logged, never an error).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, malformed, or inconsistent configuration value.
    #[error("configuration error: {0}")]
    Config(String),
    /// Invalid event input (unset track ids, broken genealogy, NaN energy).
    #[error("data error: {0}")]
    Data(String),
    /// Internal invariant broken; indicates a bug, not bad input.
    #[error("logic error: {0}")]
    Logic(String),
    /// Bounding-box derivation requested with neither an active region nor a
    /// usable world envelope.
    #[error("no data: {0}")]
    NoData(String),
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Root-level re-exports
// ============================================================================

pub use crate::bbox::BBoxInteraction;
pub use crate::config::{BBoxConfig, DriverConfig, LabelConfig};
pub use crate::driver::Driver;
pub use crate::event::{EventInput, EventOutput};
pub use crate::geom::{BBox3D, EDep, Point3D, Vertex};
pub use crate::labeling::LArTPCMLReco3D;
pub use crate::meta::ImageMeta3D;
pub use crate::particle::{
    Particle, ParticleInput, ParticleLabel, ProcessType, SemanticType,
};
pub use crate::voxel::{Voxel, VoxelSet};
