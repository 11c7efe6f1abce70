//! In-memory data model of a scan.
//!
//! Parsers produce the per-role containers ([`BeamLocationByPmc`],
//! [`DetectorSampleByPmc`], [`HousekeepingData`], ...). The assembler merges
//! them into one [`CanonicalScan`], which the serializer consumes read-only.

mod beam;
mod meta;
mod sample;
mod scan;

pub use beam::{BeamLocation, BeamLocationByPmc, BeamLocationProj};
pub use meta::{
    DetectorId, MetaData, MetaType, MetaValue, ReadType, META_DETECTOR_ID, META_LIVETIME,
    META_OFFSET, META_PMC, META_READTYPE, META_REALTIME, META_SCLK, META_SOURCEFILE,
    META_XPERCHAN, META_XPOSITION, META_YPOSITION, META_ZPOSITION,
};
pub use sample::{DetectorSample, DetectorSampleByPmc};
pub use scan::{
    AlignedImage, CanonicalScan, FileMetaData, HousekeepingData, ImageMeta, MatchedAlignedImage,
    PseudoIntensities, PseudoIntensityRange, ScanInstrument, ShotRecord, SpectrumCounts,
};

/// Shot identifier within one scan
pub type Pmc = i32;
