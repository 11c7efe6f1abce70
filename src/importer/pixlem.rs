use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::assembly::{ScanAssembler, EM_DETECTOR_CONFIG, EM_GROUP};
use crate::error::{IngestError, Result, ResultExt};
use crate::gds::FileNameMeta;
use crate::model::{DetectorSampleByPmc, Pmc, ReadType, ScanInstrument};
use crate::parsers::msa_dir::{
    make_bulk_max, make_spectra_lookup, spectra_read_type, EvCalibration, MsaReadOptions,
};
use crate::parsers::{read_beam_locations, read_matched_images};
use crate::readers::read_file_lines;

use super::common::file_meta_from_name;
use super::pixlfm::DRIFT_COLUMNS;
use super::{ImportContext, ImportedScan, Importer};

/// Relative paths of every MSA in the bundle
pub const MSA_LIST_FILE_NAME: &str = "msas.txt";
/// Relative paths of every image in the bundle
pub const IMAGE_LIST_FILE_NAME: &str = "images.txt";

fn read_list(path: &Path) -> Result<Vec<String>> {
    let lines = read_file_lines(path).with_context(|| path.display().to_string())?;
    Ok(lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Beam file names the scan could have been written under: the id in
/// decimal, then in uppercase hex
fn beam_file_candidates(scan_id: &str) -> Vec<String> {
    let mut names = vec![format!("beamLocation-{scan_id}.csv")];
    if let Ok(rtt) = scan_id.parse::<u64>() {
        names.push(format!("beamLocation-{rtt:X}.csv"));
    }
    names
}

/// Substring identifying the scan's files in the bundle lists
fn rtt_marker(scan_id: &str) -> String {
    match scan_id.parse::<u64>() {
        Ok(rtt) => format!("{rtt:09}"),
        Err(_) => scan_id.to_string(),
    }
}

/// Imports engineering-model bundles holding several scans side by side
#[derive(Debug, Clone, Copy, Default)]
pub struct PixlEmImporter;

impl PixlEmImporter {
    /// Create the importer
    pub fn new() -> Self {
        Self
    }

    fn find_beam_file(dir: &Path, scan_id: &str) -> Result<PathBuf> {
        let candidates = beam_file_candidates(scan_id);
        candidates
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                IngestError::MissingInput(format!(
                    "No beam location file found for scan {scan_id}, looked for: {}",
                    candidates.join(", ")
                ))
            })
    }

    fn read_spectra(dir: &Path, files: &[String]) -> Result<DetectorSampleByPmc> {
        let mut spectra = DetectorSampleByPmc::new();
        for file in files {
            let read_type = spectra_read_type(file).unwrap_or(ReadType::Normal);
            let options = MsaReadOptions {
                read_type_override: Some(read_type),
                ..Default::default()
            };
            let lookup = make_spectra_lookup(dir, std::slice::from_ref(file), &options)?;
            for (pmc, samples) in lookup {
                spectra.entry(pmc).or_default().extend(samples);
            }
        }
        Ok(spectra)
    }
}

impl Importer for PixlEmImporter {
    fn import(&self, ctx: &ImportContext) -> Result<ImportedScan> {
        let dir = &ctx.import_dir;
        let marker = rtt_marker(&ctx.expected_id);

        let images: Vec<String> = read_list(&dir.join(IMAGE_LIST_FILE_NAME))
            .context("images")?
            .into_iter()
            .filter(|f| f.contains(&marker))
            .collect();
        let msas: Vec<String> = read_list(&dir.join(MSA_LIST_FILE_NAME))
            .context("spectra")?
            .into_iter()
            .filter(|f| f.contains(&marker))
            .collect();
        info!(
            "Scan {} has {} images and {} MSA files in this bundle",
            ctx.expected_id,
            images.len(),
            msas.len()
        );

        let mut context_images: BTreeMap<Pmc, String> = BTreeMap::new();
        let mut image_names: BTreeMap<Pmc, FileNameMeta> = BTreeMap::new();
        for image in &images {
            let parsed = FileNameMeta::parse(image).and_then(|meta| Ok((meta.pmc()?, meta)));
            match parsed {
                Ok((pmc, meta)) => {
                    context_images.insert(pmc, image.clone());
                    image_names.insert(pmc, meta);
                }
                Err(e) => warn!("Ignoring image {image}: {e}"),
            }
        }

        let beam_path = Self::find_beam_file(dir, &ctx.expected_id).context("beam")?;
        let (beams, _) =
            read_beam_locations(&beam_path, true, 1, &DRIFT_COLUMNS).context("beam")?;

        let matched = read_matched_images(&dir.join("MATCHED"), &beams).context("matched")?;

        let mut spectra = Self::read_spectra(dir, &msas).context("spectra")?;
        let (bulk_pmc, bulk_max) = make_bulk_max(&spectra, &EvCalibration::default())?;
        spectra.insert(bulk_pmc, bulk_max);

        let mut housekeeping_name = image_names.into_values().next().ok_or_else(|| {
            IngestError::MissingInput(format!(
                "No images found for scan {}, cannot read dataset metadata",
                ctx.expected_id
            ))
        })?;
        housekeeping_name.prod_type = "RSI".to_string();
        housekeeping_name.extension = "CSV".to_string();
        info!("Metadata from synthetic housekeeping name: {}", housekeeping_name.to_file_name());

        let scan = ScanAssembler::new(&ctx.expected_id, ScanInstrument::PixlEm, EM_DETECTOR_CONFIG)
            .group(EM_GROUP)
            .meta(file_meta_from_name(&housekeeping_name))
            .beams(beams)
            .spectra(spectra)
            .context_images(context_images)
            .matched(matched)
            .finish(&ctx.expected_id)?;

        Ok(ImportedScan {
            scan,
            image_dir: dir.clone(),
        })
    }
}
