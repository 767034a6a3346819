//! Ordered voxel set: (id, value) pairs kept in ascending-id order.
//!
//! Implemented as a pair of parallel id-sorted vectors with binary-search
//! point lookup and a linear-merge batch insert, matching the expected access
//! pattern: iterate in order, occasional point lookups, frequent whole-set
//! merges during particle grouping.
//!
//! ## Invariants
//!
//! - `ids` is strictly increasing; `ids.len() == values.len()`.
//! - `emplace(id, v, add)` either accumulates onto (`add=true`) or replaces
//!   (`add=false`) an existing entry; there are never duplicate ids.

use serde::{Deserialize, Serialize};

use crate::VoxelId;

/// A single (id, value) pair of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Voxel {
    /// Row-major voxel id.
    pub id: VoxelId,
    /// Stored value (energy, dE/dX, or a semantic code).
    pub value: f32,
}

/// Id-sorted sparse set of voxel values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoxelSet {
    ids: Vec<VoxelId>,
    values: Vec<f32>,
}

impl VoxelSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set with room for `cap` entries.
    pub fn with_capacity(cap: usize) -> Self {
        Self { ids: Vec::with_capacity(cap), values: Vec::with_capacity(cap) }
    }

    /// Number of stored voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set holds no voxels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Reserve room for `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.ids.reserve(additional);
        self.values.reserve(additional);
    }

    /// Drop every stored voxel.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.values.clear();
    }

    /// Insert one value: accumulate onto an existing entry when `add`,
    /// replace it otherwise. New ids keep the set sorted.
    pub fn emplace(&mut self, id: VoxelId, value: f32, add: bool) {
        match self.ids.binary_search(&id) {
            Ok(pos) => {
                if add {
                    self.values[pos] += value;
                } else {
                    self.values[pos] = value;
                }
            }
            Err(pos) => {
                self.ids.insert(pos, id);
                self.values.insert(pos, value);
            }
        }
    }

    /// Merge a whole set in one linear pass over both sorted id sequences.
    pub fn emplace_set(&mut self, other: &VoxelSet, add: bool) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.ids = other.ids.clone();
            self.values = other.values.clone();
            return;
        }
        let mut ids = Vec::with_capacity(self.len() + other.len());
        let mut values = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.len() && j < other.len() {
            if self.ids[i] < other.ids[j] {
                ids.push(self.ids[i]);
                values.push(self.values[i]);
                i += 1;
            } else if self.ids[i] > other.ids[j] {
                ids.push(other.ids[j]);
                values.push(other.values[j]);
                j += 1;
            } else {
                ids.push(self.ids[i]);
                values.push(if add {
                    self.values[i] + other.values[j]
                } else {
                    other.values[j]
                });
                i += 1;
                j += 1;
            }
        }
        ids.extend_from_slice(&self.ids[i..]);
        values.extend_from_slice(&self.values[i..]);
        ids.extend_from_slice(&other.ids[j..]);
        values.extend_from_slice(&other.values[j..]);
        self.ids = ids;
        self.values = values;
    }

    /// Point lookup; `None` when the id is not in the set.
    #[inline]
    pub fn find(&self, id: VoxelId) -> Option<f32> {
        self.ids.binary_search(&id).ok().map(|pos| self.values[pos])
    }

    /// Whether `id` is in the set.
    #[inline]
    pub fn contains(&self, id: VoxelId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Sum of all stored values.
    pub fn sum(&self) -> f64 {
        self.values.iter().map(|&v| f64::from(v)).sum()
    }

    /// The sorted ids.
    #[inline]
    pub fn ids(&self) -> &[VoxelId] {
        &self.ids
    }

    /// The values, parallel to [`VoxelSet::ids`].
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Iterate (id, value) pairs in ascending-id order.
    pub fn iter(&self) -> impl Iterator<Item = (VoxelId, f32)> + '_ {
        self.ids.iter().copied().zip(self.values.iter().copied())
    }

    /// Iterate as [`Voxel`] records in ascending-id order.
    pub fn voxels(&self) -> impl Iterator<Item = Voxel> + '_ {
        self.iter().map(|(id, value)| Voxel { id, value })
    }
}

// ============================================================================
// Tests
// ============================================================================
