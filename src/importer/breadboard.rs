use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::assembly::ScanAssembler;
use crate::error::{IngestError, Result, ResultExt};
use crate::gds::FileNameMeta;
use crate::model::{
    BeamLocationByPmc, FileMetaData, HousekeepingData, Pmc, PseudoIntensities, ReadType,
    ScanInstrument,
};
use crate::parsers::msa_dir::{
    apply_ev_calibration, beam_from_spectra, list_msa_files, make_bulk_max, make_spectra_lookup,
    select_spectra_files, BeamParams, EvCalibration, MsaReadOptions,
};
use crate::parsers::{
    read_beam_locations, read_housekeeping, read_matched_images, read_pseudo_intensity_file,
};
use crate::readers::extract_zip;

use super::common::required_pseudo_ranges;
use super::{ImportContext, ImportedScan, Importer};

/// Parameter file name in a breadboard upload
pub const IMPORT_PARAMS_FILE_NAME: &str = "import.json";

/// Group of scans taken on the JPL breadboard
pub const JPL_BREADBOARD_GROUP: &str = "JPL Breadboard";

const SPECTRA_ZIP: &str = "spectra.zip";
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "tif", "tiff"];

/// `import.json` of a breadboard upload. Absent keys take zero values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreadboardImportParams {
    /// Scan id; must match the requested id
    #[serde(rename = "datasetid")]
    pub dataset_id: String,
    /// Scan title
    pub title: String,
    /// Target identifier
    #[serde(rename = "targetid")]
    pub target_id: String,
    /// Target name
    pub target: String,
    /// Site number
    #[serde(rename = "siteid")]
    pub site_id: i32,
    /// Site name
    pub site: String,
    /// Group the scan belongs to
    pub group: String,
    /// Beam location CSV, used when `beamparams` is empty
    #[serde(rename = "beamfile")]
    pub beam_file: String,
    /// `xscale,xbias,yscale,ybias` for beams synthesized from MSA positions
    #[serde(rename = "beamparams")]
    pub beam_params: String,
    /// Housekeeping CSV
    #[serde(rename = "housekeeping")]
    pub housekeeping_file: String,
    /// Directory holding context images
    #[serde(rename = "contextimgdir")]
    pub context_image_dir: String,
    /// Directory holding MSA files
    #[serde(rename = "msadir")]
    pub msa_dir: String,
    /// Pseudo-intensity CSV
    #[serde(rename = "pseudointensitycsv")]
    pub pseudo_intensity_csv: String,
    /// Comma separated file name suffixes to skip
    #[serde(rename = "ignoremsa")]
    pub ignore_msa: String,
    /// MSA files hold a single detector
    #[serde(rename = "singledetectormsa")]
    pub single_detector_msa: bool,
    /// Number shots in file order instead of reading their PMC
    #[serde(rename = "genpmcs")]
    pub gen_pmcs: bool,
    /// Read type for every MSA, instead of the file name prefix
    #[serde(rename = "readtype")]
    pub read_type: String,
    /// Copy detector A as detector B
    #[serde(rename = "detaduplicate")]
    pub detector_a_duplicate: bool,
    /// Synthesize bulk-sum and max-value spectra
    #[serde(rename = "genbulkmax")]
    pub gen_bulk_max: bool,
    /// Detector configuration the scan was taken with
    #[serde(rename = "detectorconfig")]
    pub detector_config: String,
    /// Bulk quantification file
    #[serde(rename = "bulkquantfile")]
    pub bulk_quant_file: String,
    /// eV per channel override, detector A
    pub ev_xperchan_a: f32,
    /// eV offset override, detector A
    pub ev_offset_a: f32,
    /// eV per channel override, detector B
    pub ev_xperchan_b: f32,
    /// eV offset override, detector B
    pub ev_offset_b: f32,
    /// Keep only the synthesized bulk/max spectra
    pub exclude_normal_dwell: bool,
    /// Sol the scan was taken on
    pub sol: String,
}

impl BreadboardImportParams {
    /// Parameters used when an upload has no `import.json`
    pub fn defaults_for(scan_id: &str) -> Self {
        Self {
            dataset_id: scan_id.to_string(),
            title: scan_id.to_string(),
            target_id: "0".to_string(),
            group: JPL_BREADBOARD_GROUP.to_string(),
            beam_params: "10,0,10,0".to_string(),
            msa_dir: "spectra".to_string(),
            gen_pmcs: true,
            read_type: "Normal".to_string(),
            gen_bulk_max: true,
            detector_config: "Breadboard".to_string(),
            ..Default::default()
        }
    }

    /// Read `import.json` from `dir`, falling back to [`Self::defaults_for`]
    pub fn load(dir: &Path, expected_id: &str) -> Result<Self> {
        let path = dir.join(IMPORT_PARAMS_FILE_NAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                info!("Warning: No {IMPORT_PARAMS_FILE_NAME} found ({e}), defaults will be used");
                return Ok(Self::defaults_for(expected_id));
            }
        };

        let params: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid {}", path.display()))?;
        if params.dataset_id.is_empty() {
            return Err(IngestError::Schema(
                "Import parameter file did not specify a DatasetID".to_string(),
            ));
        }
        if params.group.is_empty() {
            return Err(IngestError::Schema(
                "Import parameter file did not specify a Group".to_string(),
            ));
        }
        if params.dataset_id != expected_id {
            return Err(IngestError::Integrity(format!(
                "Expected dataset ID {expected_id}, read {}",
                params.dataset_id
            )));
        }
        Ok(params)
    }

    fn instrument(&self) -> ScanInstrument {
        if self.group == JPL_BREADBOARD_GROUP {
            ScanInstrument::JplBreadboard
        } else {
            ScanInstrument::SbuBreadboard
        }
    }

    fn calibration(&self) -> EvCalibration {
        EvCalibration {
            xperchan_a: self.ev_xperchan_a,
            offset_a: self.ev_offset_a,
            xperchan_b: self.ev_xperchan_b,
            offset_b: self.ev_offset_b,
        }
    }

    fn read_options(&self) -> Result<MsaReadOptions> {
        let read_type_override = if self.read_type.is_empty() {
            None
        } else {
            Some(ReadType::from_str(&self.read_type).map_err(IngestError::Parse)?)
        };
        Ok(MsaReadOptions {
            single_detector: self.single_detector_msa,
            gen_pmcs: self.gen_pmcs,
            read_type_override,
            duplicate_a_as_b: self.detector_a_duplicate,
        })
    }

    fn ignored_msa_files(&self) -> Vec<String> {
        self.ignore_msa
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// PMC of a context image: from a GDS file name, else the integer after the
/// last `_`
fn context_image_pmc(name: &str) -> Option<Pmc> {
    if let Ok(meta) = FileNameMeta::parse(&name.to_uppercase()) {
        if let Ok(pmc) = meta.pmc() {
            return Some(pmc);
        }
    }
    let stem = Path::new(name).file_stem()?.to_str()?;
    let (_, last) = stem.rsplit_once('_')?;
    last.parse::<Pmc>().ok()
}

/// Context images in `dir` by PMC
pub(crate) fn read_context_images(dir: &Path) -> Result<BTreeMap<Pmc, String>> {
    let mut images = BTreeMap::new();
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| dir.display().to_string())? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    for name in names {
        let is_image = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if !is_image {
            continue;
        }
        match context_image_pmc(&name) {
            Some(pmc) => {
                images.insert(pmc, name);
            }
            None => warn!("Ignoring context image without a PMC: {name}"),
        }
    }
    Ok(images)
}

/// Imports breadboard uploads: a directory of MSA files plus `import.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadboardImporter;

impl BreadboardImporter {
    /// Create the importer
    pub fn new() -> Self {
        Self
    }

    /// MSA directory, unpacking `spectra.zip` into scratch space when the
    /// directory itself wasn't uploaded
    fn msa_dir(ctx: &ImportContext, params: &BreadboardImportParams) -> Result<PathBuf> {
        let dir = ctx.import_dir.join(&params.msa_dir);
        if dir.is_dir() {
            return Ok(dir);
        }

        let zip_path = ctx.import_dir.join(SPECTRA_ZIP);
        if !zip_path.is_file() {
            return Err(IngestError::MissingInput(format!(
                "No MSA directory {} or {SPECTRA_ZIP} found",
                dir.display()
            )));
        }
        let dest = ctx.scratch_dir.join(&params.msa_dir);
        let files = extract_zip(&zip_path, &dest)?;
        info!("Extracted {} files from {SPECTRA_ZIP} to {}", files.len(), dest.display());
        Ok(dest)
    }
}

impl Importer for BreadboardImporter {
    fn import(&self, ctx: &ImportContext) -> Result<ImportedScan> {
        let dir = &ctx.import_dir;
        let params = BreadboardImportParams::load(dir, &ctx.expected_id)?;

        let (image_dir, context_images) = if params.context_image_dir.is_empty() {
            (dir.clone(), BTreeMap::new())
        } else {
            let image_dir = dir.join(&params.context_image_dir);
            let images = read_context_images(&image_dir).context("images")?;
            (image_dir, images)
        };
        let min_context_pmc = context_images.keys().next().copied().unwrap_or(1);

        let mut beams = BeamLocationByPmc::new();
        if params.beam_params.is_empty() && !params.beam_file.is_empty() {
            info!(
                "  Reading Beam Locations: \"{}\", using minimum context image PMC detected: {min_context_pmc}",
                params.beam_file
            );
            let (read, _) =
                read_beam_locations(&dir.join(&params.beam_file), false, min_context_pmc, &[])
                    .context("beam")?;
            beams = read;
        }

        let mut housekeeping = HousekeepingData::default();
        if !params.housekeeping_file.is_empty() {
            info!("  Reading Housekeeping: {}", params.housekeeping_file);
            housekeeping = read_housekeeping(&dir.join(&params.housekeeping_file), 0)
                .context("housekeeping")?;
        }

        let mut pseudo_ranges = Vec::new();
        let mut pseudo = PseudoIntensities::new();
        if !params.pseudo_intensity_csv.is_empty() {
            pseudo_ranges = required_pseudo_ranges(ctx.pseudo_intensity_ranges.as_deref())
                .context("pseudo-intensity")?;
            pseudo = read_pseudo_intensity_file(&dir.join(&params.pseudo_intensity_csv), false)
                .context("pseudo-intensity")?;
        }

        let msa_dir = Self::msa_dir(ctx, &params).context("spectra")?;
        let options = params.read_options()?;
        let all_files = list_msa_files(&msa_dir, &params.ignored_msa_files())?;
        info!("  Reading {} files from spectrum directory...", all_files.len());
        let files = select_spectra_files(&all_files, options.read_type_override.is_none());
        info!("  Found {} usable spectrum files...", files.len());

        let calibration = params.calibration();
        let mut spectra = make_spectra_lookup(&msa_dir, &files, &options).context("spectra")?;
        apply_ev_calibration(&mut spectra, &calibration)?;

        if !params.beam_params.is_empty() {
            let beam_params = BeamParams::from_str(&params.beam_params)?;
            beams = beam_from_spectra(&spectra, &beam_params, min_context_pmc).context("beam")?;
        }

        if params.gen_bulk_max {
            let (pmc, samples) = make_bulk_max(&spectra, &calibration)?;
            if params.exclude_normal_dwell {
                spectra.clear();
            }
            spectra.insert(pmc, samples);
        }

        let matched = read_matched_images(&dir.join("MATCHED"), &beams).context("matched")?;

        let instrument = params.instrument();
        let creator = match instrument {
            ScanInstrument::JplBreadboard => "jpl-import",
            _ => "sbu-import",
        };

        let meta = FileMetaData {
            sol: params.sol.clone(),
            site_id: params.site_id,
            site: params.site.clone(),
            target_id: params.target_id.clone(),
            target: params.target.clone(),
            title: params.title.clone(),
            ..Default::default()
        };

        let scan = ScanAssembler::new(&params.dataset_id, instrument, &params.detector_config)
            .group(&params.group)
            .meta(meta)
            .beams(beams)
            .spectra(spectra)
            .housekeeping(housekeeping)
            .pseudo(pseudo_ranges, pseudo)
            .context_images(context_images)
            .matched(matched)
            .creator_user_id(creator)
            .bulk_quant_file(&params.bulk_quant_file)
            .finish(&ctx.expected_id)?;

        Ok(ImportedScan { scan, image_dir })
    }
}
