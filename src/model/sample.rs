use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::meta::{
    DetectorId, MetaData, MetaValue, ReadType, META_DETECTOR_ID, META_PMC, META_READTYPE,
};
use super::Pmc;

/// One detector's spectrum at one shot, plus its metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorSample {
    /// Metadata; must include `PMC`, `DETECTOR_ID` and `READTYPE`
    pub meta: MetaData,
    /// Photon counts per channel
    pub spectrum: Vec<i64>,
}

impl DetectorSample {
    /// Create a sample from metadata and counts
    pub fn new(meta: MetaData, spectrum: Vec<i64>) -> Self {
        Self { meta, spectrum }
    }

    /// Set a meta value, replacing any existing one
    pub fn set_meta(&mut self, label: &str, value: impl Into<MetaValue>) {
        self.meta.insert(label.to_string(), value.into());
    }

    /// String meta value by label
    pub fn meta_str(&self, label: &str) -> Option<&str> {
        self.meta.get(label).and_then(MetaValue::as_str)
    }

    /// Shot id from `PMC` meta
    pub fn pmc(&self) -> Option<Pmc> {
        self.meta.get(META_PMC).and_then(MetaValue::as_int)
    }

    /// Parsed `READTYPE`
    pub fn read_type(&self) -> Option<ReadType> {
        self.meta_str(META_READTYPE).and_then(|s| s.parse().ok())
    }

    /// Parsed `DETECTOR_ID`
    pub fn detector_id(&self) -> Option<DetectorId> {
        self.meta_str(META_DETECTOR_ID).and_then(|s| s.parse().ok())
    }

    /// Largest channel value, 0 for an empty spectrum
    pub fn spectrum_max(&self) -> i64 {
        self.spectrum.iter().copied().max().unwrap_or(0)
    }
}

/// Samples grouped by shot id
pub type DetectorSampleByPmc = BTreeMap<Pmc, Vec<DetectorSample>>;
