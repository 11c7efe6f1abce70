use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::beam::BeamLocation;
use super::meta::MetaValue;
use super::sample::DetectorSample;
use super::Pmc;

/// Provenance metadata derived from the housekeeping file name (or import params)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetaData {
    /// Scan run identifier
    pub rtt: String,
    /// Spacecraft clock
    pub sclk: i32,
    /// Martian day
    pub sol: String,
    /// Decoded site number
    pub site_id: i32,
    /// Site name
    pub site: String,
    /// Decoded drive number
    pub drive_id: i32,
    /// Target identifier
    pub target_id: String,
    /// Target name
    pub target: String,
    /// Scan title
    pub title: String,
}

/// Housekeeping table: header (without `PMC`) plus typed rows by shot id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HousekeepingData {
    /// Column labels, `PMC` excluded
    pub header: Vec<String>,
    /// Row values in header order
    pub data: BTreeMap<Pmc, Vec<MetaValue>>,
}

/// Named channel window used to compute a pseudo-intensity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoIntensityRange {
    /// Element or line name
    pub name: String,
    /// First channel
    pub start: i32,
    /// Last channel
    pub end: i32,
}

/// Pseudo-intensity values by shot id, ordered like the range list
pub type PseudoIntensities = BTreeMap<Pmc, Vec<f32>>;

/// A camera image that is not beam-aligned by its own PMC (RGBU, disco)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Path relative to the import directory
    pub file_name: String,
    /// PMC the image was taken at
    pub pmc: Pmc,
    /// LED / colour filter code
    pub leds: String,
    /// GDS product type
    pub prod_type: String,
}

/// Sidecar manifest describing an image transformed to match a beam-aligned image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedAlignedImage {
    /// PMC of the beam-aligned image this one is matched to
    #[serde(rename = "aligned-beam-pmc")]
    pub aligned_beam_pmc: Pmc,
    /// Image file name
    #[serde(rename = "matched-image")]
    pub matched_image_name: String,
    /// X offset in aligned-image pixels
    #[serde(rename = "x-offset")]
    pub x_offset: f32,
    /// Y offset in aligned-image pixels
    #[serde(rename = "y-offset")]
    pub y_offset: f32,
    /// X scale factor
    #[serde(rename = "x-scale")]
    pub x_scale: f32,
    /// Y scale factor
    #[serde(rename = "y-scale")]
    pub y_scale: f32,
    /// Resolved on-disk location of the image
    #[serde(skip)]
    pub matched_image_full_path: PathBuf,
}

/// Everything known about one shot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotRecord {
    /// Housekeeping values, ordered like [`CanonicalScan::housekeeping_headers`]
    pub housekeeping: Vec<MetaValue>,
    /// Beam location, if the beam file had this shot
    pub beam: Option<BeamLocation>,
    /// Detector samples
    pub detectors: Vec<DetectorSample>,
    /// Context image source path, relative to the image source dir
    pub context_image_src: String,
    /// Context image output file name
    pub context_image_dst: String,
    /// Pseudo-intensity values
    pub pseudo_intensities: Vec<f32>,
    /// RTT of the bundle this shot came from, for merged bundles
    pub source_rtt: String,
}

/// Instrument that produced a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanInstrument {
    /// PIXL flight model
    #[serde(rename = "PIXL_FM")]
    PixlFm,
    /// PIXL engineering model
    #[serde(rename = "PIXL_EM")]
    PixlEm,
    /// JPL breadboard
    #[serde(rename = "JPL_BREADBOARD")]
    JplBreadboard,
    /// Stony Brook breadboard
    #[serde(rename = "SBU_BREADBOARD")]
    SbuBreadboard,
    /// Not determined
    #[default]
    #[serde(rename = "UNKNOWN_INSTRUMENT")]
    Unknown,
}

impl ScanInstrument {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanInstrument::PixlFm => "PIXL_FM",
            ScanInstrument::PixlEm => "PIXL_EM",
            ScanInstrument::JplBreadboard => "JPL_BREADBOARD",
            ScanInstrument::SbuBreadboard => "SBU_BREADBOARD",
            ScanInstrument::Unknown => "UNKNOWN_INSTRUMENT",
        }
    }
}

impl fmt::Display for ScanInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanInstrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PIXL_FM" => Ok(ScanInstrument::PixlFm),
            "PIXL_EM" => Ok(ScanInstrument::PixlEm),
            "JPL_BREADBOARD" => Ok(ScanInstrument::JplBreadboard),
            "SBU_BREADBOARD" => Ok(ScanInstrument::SbuBreadboard),
            "UNKNOWN_INSTRUMENT" => Ok(ScanInstrument::Unknown),
            other => Err(format!("Unknown instrument: {other}")),
        }
    }
}

/// A context image whose PMC is referenced by the beam projections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedImage {
    /// Output file name
    pub image: String,
    /// PMC the image was taken at
    pub pmc: Pmc,
}

/// Spectrum and pseudo-intensity counts by role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumCounts {
    /// Normal spectra
    pub normal: u32,
    /// Dwell spectra
    pub dwell: u32,
    /// Bulk-sum spectra
    pub bulk: u32,
    /// Max-value spectra
    pub max: u32,
    /// Shots with pseudo-intensities
    pub pseudo_intensities: u32,
}

/// The frozen, fully cross-referenced model of one scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalScan {
    /// Scan identifier
    pub dataset_id: String,
    /// Owning group
    pub group: String,
    /// Instrument kind
    pub instrument: ScanInstrument,
    /// Detector configuration name
    pub detector_config: String,
    /// Provenance metadata
    pub meta: FileMetaData,
    /// Pseudo-intensity channel windows
    pub pseudo_ranges: Vec<PseudoIntensityRange>,
    /// Housekeeping column labels
    pub housekeeping_headers: Vec<String>,
    /// Per-shot records
    pub shots: BTreeMap<Pmc, ShotRecord>,
    /// RGBU multispectral images
    pub rgbu_images: Vec<ImageMeta>,
    /// Disco LED images
    pub disco_images: Vec<ImageMeta>,
    /// Images matched against an aligned image
    pub matched_aligned_images: Vec<MatchedAlignedImage>,
    /// Context images referenced by beam projections, ordered like `beam_ij_order`
    pub aligned_images: Vec<AlignedImage>,
    /// All other images
    pub unaligned_images: Vec<String>,
    /// Ascending image PMCs shared by every shot's beam projections
    pub beam_ij_order: Vec<Pmc>,
    /// File name of the default image, empty if none
    pub default_context_image: String,
    /// Role counts
    pub counts: SpectrumCounts,
    /// Beam geometry version
    pub beam_version: u32,
    /// User that started the import, empty for automated imports
    pub creator_user_id: String,
    /// Bulk quantification file (tactical breadboard scans)
    pub bulk_quant_file: String,
}

impl CanonicalScan {
    /// PMC → context image output name, for shots that have one
    pub fn context_images_by_pmc(&self) -> BTreeMap<Pmc, &str> {
        self.shots
            .iter()
            .filter(|(_, shot)| !shot.context_image_dst.is_empty())
            .map(|(pmc, shot)| (*pmc, shot.context_image_dst.as_str()))
            .collect()
    }
}
