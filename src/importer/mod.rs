//! # Importers
//!
//! [`detect_format`] inspects an unpacked input directory and names the
//! layout it follows. [`select_importer`] returns the [`Importer`] for that
//! layout, which reads every role it knows about and hands the results to a
//! [`ScanAssembler`](crate::assembly::ScanAssembler).
//!
//! | Layout | Recognised by | Importer |
//! |--------|---------------|----------|
//! | PIXL flight model, data drive | `RSI/` | [`PixlFmImporter`] |
//! | PIXL flight model, pre data drive | `drift_corr_x_ray_beam_location/` | [`PixlFmImporter`] |
//! | SOFF | exactly one `*.xml` descriptor | [`SoffImporter`] |
//! | Breadboard | `detector.json` naming a `*-breadboard` detector | [`BreadboardImporter`] |
//! | PIXL engineering model | `detector.json` naming `pixl-em` | [`PixlEmImporter`] |

mod breadboard;
mod common;
mod pixlem;
mod pixlfm;
mod soff;


use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::model::CanonicalScan;

pub use breadboard::{
    BreadboardImportParams, BreadboardImporter, IMPORT_PARAMS_FILE_NAME, JPL_BREADBOARD_GROUP,
};
pub use common::file_meta_from_name;
pub use pixlem::{PixlEmImporter, IMAGE_LIST_FILE_NAME, MSA_LIST_FILE_NAME};
pub use pixlfm::{PixlFmImporter, PixlFmLayout};
pub use soff::{
    parse_soff_descriptor, read_soff_descriptor, SoffDescriptor, SoffFileArea, SoffImporter,
    SoffOffset, SoffTable,
};

/// Name of the file that tells manually uploaded scans apart
pub const DETECTOR_FILE_NAME: &str = "detector.json";

/// Contents of `detector.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorChoice {
    /// Detector the scan was taken with, e.g. `jpl-breadboard` or `pixl-em`
    pub detector: String,
}

/// Input directory layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// PIXL flight model product directories
    PixlFm(PixlFmLayout),
    /// SOFF descriptor plus the files it lists
    Soff,
    /// Breadboard MSA directory
    Breadboard,
    /// PIXL engineering model file lists
    PixlEm,
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportFormat::PixlFm(PixlFmLayout::DataDrive) => f.write_str("PIXL FM (data drive)"),
            ImportFormat::PixlFm(PixlFmLayout::PreDataDrive) => {
                f.write_str("PIXL FM (pre data drive)")
            }
            ImportFormat::Soff => f.write_str("SOFF"),
            ImportFormat::Breadboard => f.write_str("Breadboard"),
            ImportFormat::PixlEm => f.write_str("PIXL EM"),
        }
    }
}

/// Work out which importer handles `dir`
pub fn detect_format(dir: &Path) -> Result<ImportFormat> {
    info!("Checking path \"{}\" for dataset type...", dir.display());

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| {
        IngestError::MissingInput(format!(
            "Failed to list files in import path {}: {e}",
            dir.display()
        ))
    })? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    entries.sort();

    if entries.iter().any(|(name, is_dir)| *is_dir && name == "RSI") {
        return Ok(ImportFormat::PixlFm(PixlFmLayout::DataDrive));
    }
    if entries
        .iter()
        .any(|(name, is_dir)| *is_dir && name == "drift_corr_x_ray_beam_location")
    {
        return Ok(ImportFormat::PixlFm(PixlFmLayout::PreDataDrive));
    }

    let xml_files: Vec<&str> = entries
        .iter()
        .filter(|(name, is_dir)| !is_dir && name.to_lowercase().ends_with(".xml"))
        .map(|(name, _)| name.as_str())
        .collect();
    match xml_files.len() {
        0 => {}
        1 => return Ok(ImportFormat::Soff),
        n => {
            return Err(IngestError::UnknownFormat(format!(
                "Found {n} XML files, expected a single SOFF descriptor: {}",
                xml_files.join(", ")
            )))
        }
    }

    let det_path = dir.join(DETECTOR_FILE_NAME);
    match read_detector_choice(&det_path) {
        Ok(choice) if choice.detector.ends_with("-breadboard") => {
            return Ok(ImportFormat::Breadboard)
        }
        Ok(choice) if choice.detector == "pixl-em" => return Ok(ImportFormat::PixlEm),
        Ok(choice) => warn!("Unrecognised detector \"{}\" in {}", choice.detector, det_path.display()),
        Err(e) => warn!(
            "Failed to open {DETECTOR_FILE_NAME} when determining dataset type. Error: {e}"
        ),
    }

    let listing: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    info!("Import path listing: {}", listing.join(", "));

    Err(IngestError::UnknownFormat(
        "Failed to determine dataset type to import.".to_string(),
    ))
}

/// Read a `detector.json`
pub fn read_detector_choice(path: &Path) -> Result<DetectorChoice> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// What an importer needs to know beyond the input directory itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    /// Unpacked input directory
    pub import_dir: PathBuf,
    /// Pseudo-intensity ranges CSV, required when the scan has pseudo-intensities
    pub pseudo_intensity_ranges: Option<PathBuf>,
    /// Scan id the import was requested for
    pub expected_id: String,
    /// Scratch space owned by the caller, for extracted or generated files
    pub scratch_dir: PathBuf,
}

impl ImportContext {
    /// Context with no pseudo-intensity ranges, using the import directory as scratch
    pub fn new(import_dir: impl Into<PathBuf>, expected_id: impl Into<String>) -> Self {
        let import_dir = import_dir.into();
        Self {
            scratch_dir: import_dir.clone(),
            import_dir,
            pseudo_intensity_ranges: None,
            expected_id: expected_id.into(),
        }
    }

    /// Set the pseudo-intensity ranges file
    pub fn with_pseudo_intensity_ranges(mut self, path: impl Into<PathBuf>) -> Self {
        self.pseudo_intensity_ranges = Some(path.into());
        self
    }

    /// Set the scratch directory
    pub fn with_scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_dir = path.into();
        self
    }
}

/// An importer's result
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedScan {
    /// The assembled scan
    pub scan: CanonicalScan,
    /// Directory the scan's context, RGBU and disco image paths are relative to
    pub image_dir: PathBuf,
}

/// Reads one input layout into a [`CanonicalScan`]
pub trait Importer {
    /// Read everything under `ctx.import_dir`
    fn import(&self, ctx: &ImportContext) -> Result<ImportedScan>;
}

/// Importer for a detected layout
pub fn select_importer(format: ImportFormat) -> Box<dyn Importer> {
    match format {
        ImportFormat::PixlFm(_) => Box::new(PixlFmImporter::new()),
        ImportFormat::Soff => Box::new(SoffImporter::new()),
        ImportFormat::Breadboard => Box::new(BreadboardImporter::new()),
        ImportFormat::PixlEm => Box::new(PixlEmImporter::new()),
    }
}

/// Detect the layout of `ctx.import_dir` and import it
pub fn import_dir(ctx: &ImportContext) -> Result<(ImportFormat, ImportedScan)> {
    let format = detect_format(&ctx.import_dir)?;
    info!("Importing {} as {format}", ctx.import_dir.display());
    let imported = select_importer(format).import(ctx)?;
    Ok((format, imported))
}
