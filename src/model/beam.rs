use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Pmc;

/// Beam position projected onto one image
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeamLocationProj {
    /// Image column coordinate
    pub i: f32,
    /// Image row coordinate
    pub j: f32,
}

/// 3-D beam aim point of a shot plus its projections onto context images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeamLocation {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Z position
    pub z: f32,
    /// Geometric correction factor, 0 when the file had none
    pub geom_corr: f32,
    /// Projections keyed by the PMC of the image they were projected onto
    pub ij: BTreeMap<Pmc, BeamLocationProj>,
}

impl BeamLocation {
    /// Image PMCs this shot was projected onto, ascending
    pub fn image_pmcs(&self) -> Vec<Pmc> {
        self.ij.keys().copied().collect()
    }
}

/// Beam locations by shot id
pub type BeamLocationByPmc = BTreeMap<Pmc, BeamLocation>;
