//! Per-event orchestration: configure concrete algorithms by name, then run
//! image-meta selection followed by labeling for each event.
//!
//! Algorithms are capability interfaces with a `configure`/`generate` pair;
//! the concrete implementations are tagged variants chosen by the
//! configuration's name strings. There is no dynamic plugin loading.

use tracing::{debug, info};

use crate::bbox::BBoxInteraction;
use crate::config::DriverConfig;
use crate::event::{EventInput, EventOutput};
use crate::labeling::LArTPCMLReco3D;
use crate::meta::ImageMeta3D;
use crate::{Error, Result};

/// The configured image-meta selector.
#[derive(Debug, Clone)]
pub enum BBoxAlgorithm {
    /// Interaction-centered box selection.
    Interaction(BBoxInteraction),
}

impl BBoxAlgorithm {
    /// Choose the image meta for one event.
    pub fn generate(&self, data: &EventInput) -> Result<ImageMeta3D> {
        match self {
            BBoxAlgorithm::Interaction(algo) => algo.generate(data),
        }
    }
}

/// The configured labeler.
pub enum LabelAlgorithm {
    /// Labeler for the lartpc_mlreco3d reconstruction chain.
    LArTPCMLReco3D(Box<LArTPCMLReco3D>),
}

impl LabelAlgorithm {
    /// Label one event against an already-derived meta.
    pub fn generate(&mut self, data: &EventInput, meta: &ImageMeta3D) -> Result<EventOutput> {
        match self {
            LabelAlgorithm::LArTPCMLReco3D(algo) => algo.generate(data, meta),
        }
    }
}

/// Event-by-event pipeline front end.
#[derive(Default)]
pub struct Driver {
    algo_bbox: Option<BBoxAlgorithm>,
    algo_label: Option<LabelAlgorithm>,
}

impl Driver {
    /// An unconfigured driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select and configure both algorithms from one document.
    pub fn configure(&mut self, cfg: &DriverConfig) -> Result<()> {
        debug!("configuring bbox algorithm {}", cfg.bbox_algorithm);
        self.algo_bbox = match cfg.bbox_algorithm.as_str() {
            "BBoxInteraction" => Some(BBoxAlgorithm::Interaction(BBoxInteraction::configure(
                &cfg.bbox_config,
            )?)),
            other => {
                return Err(Error::Config(format!(
                    "unknown bbox algorithm \"{other}\""
                )));
            }
        };

        debug!("configuring label algorithm {}", cfg.label_algorithm);
        self.algo_label = match cfg.label_algorithm.as_str() {
            "LArTPCMLReco3D" => Some(LabelAlgorithm::LArTPCMLReco3D(Box::new(
                LArTPCMLReco3D::configure(&cfg.label_config)?,
            ))),
            other => {
                return Err(Error::Config(format!(
                    "unknown label algorithm \"{other}\""
                )));
            }
        };

        info!(
            "configured {} + {}",
            cfg.bbox_algorithm, cfg.label_algorithm
        );
        Ok(())
    }

    /// Derive the image meta for one event.
    pub fn generate_image_meta(&self, data: &EventInput) -> Result<ImageMeta3D> {
        let algo = self
            .algo_bbox
            .as_ref()
            .ok_or_else(|| Error::Config("bbox algorithm is not configured yet".to_string()))?;
        algo.generate(data)
    }

    /// Label one event against an already-derived meta.
    pub fn generate_label(
        &mut self,
        data: &EventInput,
        meta: &ImageMeta3D,
    ) -> Result<EventOutput> {
        let algo = self
            .algo_label
            .as_mut()
            .ok_or_else(|| Error::Config("label algorithm is not configured yet".to_string()))?;
        algo.generate(data, meta)
    }

    /// Full pipeline for one event: meta selection, then labeling.
    pub fn generate(&mut self, data: &EventInput) -> Result<(ImageMeta3D, EventOutput)> {
        let meta = self.generate_image_meta(data)?;
        let output = self.generate_label(data, &meta)?;
        Ok((meta, output))
    }
}

// ============================================================================
// Tests
// ============================================================================
