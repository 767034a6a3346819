//! Configuration document types.
//!
//! One document configures one run. The key names below are the stable
//! external contract; any serde-compatible front end (JSON here, YAML
//! upstream) can produce these types. Every optional key carries a default.

use serde::Deserialize;
use tracing::Level;

use crate::{Error, Result};

// ============================================================================
// Driver-level document
// ============================================================================

/// Top-level configuration: algorithm names plus their config sections.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Log threshold: VERBOSE, DEBUG, INFO, WARNING, ERROR or FATAL.
    #[serde(rename = "LogLevel", default)]
    pub log_level: Option<String>,
    /// Name of the image-meta selector, currently `"BBoxInteraction"`.
    #[serde(rename = "BBoxAlgorithm")]
    pub bbox_algorithm: String,
    /// Configuration section of the image-meta selector.
    #[serde(rename = "BBoxConfig")]
    pub bbox_config: BBoxConfig,
    /// Name of the labeler, currently `"LArTPCMLReco3D"`.
    #[serde(rename = "LabelAlgorithm")]
    pub label_algorithm: String,
    /// Configuration section of the labeler.
    #[serde(rename = "LabelConfig")]
    pub label_config: LabelConfig,
}

/// Map a configured log-level string onto a tracing level.
///
/// FATAL has no tracing equivalent and collapses onto ERROR.
pub fn parse_log_level(threshold: &str) -> Result<Level> {
    match threshold.to_ascii_uppercase().as_str() {
        "VERBOSE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARNING" => Ok(Level::WARN),
        "ERROR" | "FATAL" => Ok(Level::ERROR),
        other => Err(Error::Config(format!("unrecognized log threshold: {other}"))),
    }
}

// ============================================================================
// BBox selector section
// ============================================================================

/// Configuration of the image-meta selector.
#[derive(Debug, Clone, Deserialize)]
pub struct BBoxConfig {
    /// Box extents per axis. Required, positive.
    #[serde(rename = "BBoxSize")]
    pub bbox_size: [f64; 3],
    /// Voxel edge lengths per axis. Required, positive; the per-axis voxel
    /// count is `floor(size/voxel)`.
    #[serde(rename = "VoxelSize")]
    pub voxel_size: [f64; 3],
    /// When set, the box is exactly `[bottom, bottom + size]` and the event
    /// data is ignored.
    #[serde(rename = "BBoxBottom", default)]
    pub bbox_bottom: Option<[f64; 3]>,
    /// Lower clipping envelope; unbounded when absent.
    #[serde(rename = "WorldBoundMin", default)]
    pub world_bound_min: Option<[f64; 3]>,
    /// Upper clipping envelope; unbounded when absent.
    #[serde(rename = "WorldBoundMax", default)]
    pub world_bound_max: Option<[f64; 3]>,
    /// RNG seed for the box jitter; absent or negative derives a seed from
    /// the wall clock with sub-second resolution.
    #[serde(rename = "Seed", default)]
    pub seed: Option<i64>,
}

// ============================================================================
// Labeler section
// ============================================================================

fn default_touch_distance() -> usize {
    1
}
fn default_edep_threshold() -> f64 {
    0.01
}
fn default_delta_size() -> usize {
    3
}
fn default_compton_size() -> usize {
    10
}
fn default_lescatter_size() -> usize {
    2
}
fn default_true() -> bool {
    true
}

/// Configuration of the labeling engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Semantic codes in decreasing priority for the label-tensor
    /// tie-break; types left out are appended in code order.
    #[serde(rename = "SemanticPriority")]
    pub semantic_priority: Vec<u8>,
    /// Index-space radius of the touching test.
    #[serde(rename = "TouchDistance")]
    pub touch_distance: usize,
    /// Voxels below this energy are dropped from every particle.
    #[serde(rename = "EnergyDepositThreshold")]
    pub energy_deposit_threshold: f64,
    /// Minimum voxel count for a delta ray to stand on its own.
    #[serde(rename = "DeltaSize")]
    pub delta_size: usize,
    /// Shower vs low-energy-scatter voxel-count cutoff.
    #[serde(rename = "ComptonSize")]
    pub compton_size: usize,
    /// Maximum size absorbed by the low-energy-scatter touch merge.
    #[serde(rename = "LEScatterSize")]
    pub lescatter_size: usize,
    /// Keep low-energy-scatter particles in the output particle list.
    #[serde(rename = "StoreLEScatter")]
    pub store_lescatter: bool,
    /// Recompute interaction ids from ancestor vertices.
    #[serde(rename = "RewriteInteractionID")]
    pub rewrite_interaction_id: bool,
    /// Voxel-level lower world clipping; unbounded when absent.
    #[serde(rename = "WorldBoundMin")]
    pub world_bound_min: Option<[f64; 3]>,
    /// Voxel-level upper world clipping; unbounded when absent.
    #[serde(rename = "WorldBoundMax")]
    pub world_bound_max: Option<[f64; 3]>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            semantic_priority: Vec::new(),
            touch_distance: default_touch_distance(),
            energy_deposit_threshold: default_edep_threshold(),
            delta_size: default_delta_size(),
            compton_size: default_compton_size(),
            lescatter_size: default_lescatter_size(),
            store_lescatter: default_true(),
            rewrite_interaction_id: default_true(),
            world_bound_min: None,
            world_bound_max: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_defaults_are_applied() {
        let cfg: LabelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.touch_distance, 1);
        assert_eq!(cfg.energy_deposit_threshold, 0.01);
        assert_eq!(cfg.delta_size, 3);
        assert_eq!(cfg.compton_size, 10);
        assert_eq!(cfg.lescatter_size, 2);
        assert!(cfg.store_lescatter);
        assert!(cfg.rewrite_interaction_id);
        assert!(cfg.semantic_priority.is_empty());
        assert!(cfg.world_bound_min.is_none());
    }

    #[test]
    fn full_document_parses() {
        let doc = r#"{
            "LogLevel": "DEBUG",
            "BBoxAlgorithm": "BBoxInteraction",
            "BBoxConfig": {
                "BBoxSize": [100.0, 100.0, 100.0],
                "VoxelSize": [0.5, 0.5, 0.5],
                "WorldBoundMin": [-500.0, -500.0, -500.0],
                "WorldBoundMax": [500.0, 500.0, 500.0],
                "Seed": 42
            },
            "LabelAlgorithm": "LArTPCMLReco3D",
            "LabelConfig": {
                "SemanticPriority": [2, 3, 0, 1, 4],
                "TouchDistance": 2,
                "StoreLEScatter": false
            }
        }"#;
        let cfg: DriverConfig = serde_json::from_str(doc).unwrap();
        assert_eq!(cfg.bbox_algorithm, "BBoxInteraction");
        assert_eq!(cfg.bbox_config.seed, Some(42));
        assert_eq!(cfg.bbox_config.bbox_size, [100.0; 3]);
        assert_eq!(cfg.label_config.touch_distance, 2);
        assert!(!cfg.label_config.store_lescatter);
        assert_eq!(cfg.label_config.semantic_priority, vec![2, 3, 0, 1, 4]);
        // untouched keys keep their defaults
        assert_eq!(cfg.label_config.delta_size, 3);
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!(parse_log_level("verbose").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("Fatal").unwrap(), Level::ERROR);
        assert!(parse_log_level("LOUD").is_err());
    }
}
