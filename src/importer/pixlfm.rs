use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::assembly::ScanAssembler;
use crate::error::{IngestError, Result, ResultExt};
use crate::gds::{latest_file_versions, lowest_sclk, FileNameMeta};
use crate::model::{
    BeamLocationByPmc, DetectorSampleByPmc, HousekeepingData, ImageMeta, Pmc, PseudoIntensities,
    PseudoIntensityRange, ScanInstrument,
};
use crate::parsers::{
    read_beam_locations, read_bulk_max_spectra, read_housekeeping, read_matched_images,
    read_pseudo_intensity_file, read_spectra_csv,
};

use super::common::{file_meta_from_name, list_role_files, required_pseudo_ranges};
use super::{ImportContext, ImportedScan, Importer};

/// Beam CSV columns that carry drift corrections, not image projections
pub(super) const DRIFT_COLUMNS: [&str; 3] = ["drift_x", "drift_y", "drift_z"];

/// Directory layouts of flight model deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixlFmLayout {
    /// Product-type directories (`RSI/`, `RFS/`, ...) as delivered from Mars
    DataDrive,
    /// Early descriptive directory names (`drift_corr_x_ray_beam_location/`, ...)
    PreDataDrive,
}

impl PixlFmLayout {
    /// Layout of `dir`, if it is a flight model delivery
    pub fn detect(dir: &Path) -> Option<Self> {
        if dir.join("RSI").is_dir() {
            Some(PixlFmLayout::DataDrive)
        } else if dir.join("drift_corr_x_ray_beam_location").is_dir() {
            Some(PixlFmLayout::PreDataDrive)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Beam,
    Spectra,
    BulkMax,
    Context,
    Housekeeping,
    PseudoIntensity,
    Rgbu,
    Disco,
}

impl Role {
    const ALL: [Role; 8] = [
        Role::Beam,
        Role::Spectra,
        Role::BulkMax,
        Role::Context,
        Role::Housekeeping,
        Role::PseudoIntensity,
        Role::Rgbu,
        Role::Disco,
    ];

    fn name(self) -> &'static str {
        match self {
            Role::Beam => "beam",
            Role::Spectra => "spectra",
            Role::BulkMax => "bulk",
            Role::Context => "images",
            Role::Housekeeping => "housekeeping",
            Role::PseudoIntensity => "pseudo-intensity",
            Role::Rgbu => "rgbu",
            Role::Disco => "disco",
        }
    }
}

/// Where a role's files live and how many are expected
#[derive(Debug, Clone, Copy)]
struct RoleFiles {
    dirs: &'static [&'static str],
    ext: &'static str,
    expected: Option<usize>,
}

fn role_files(layout: PixlFmLayout, role: Role) -> Option<RoleFiles> {
    let files = |dirs, ext, expected| {
        Some(RoleFiles {
            dirs,
            ext,
            expected,
        })
    };

    match layout {
        PixlFmLayout::DataDrive => match role {
            Role::Beam => files(&["RXL"], "csv", Some(1)),
            Role::Spectra => files(&["RFS"], "csv", Some(1)),
            Role::BulkMax => files(&["RBS", "RMS"], "msa", Some(2)),
            Role::Context => files(&["RCM"], "tif", None),
            Role::Housekeeping => files(&["RSI"], "csv", Some(1)),
            Role::PseudoIntensity => files(&["RPM"], "csv", Some(1)),
            Role::Rgbu => files(&["RGBU"], "tif", None),
            Role::Disco => files(&["DISCO"], "png", None),
        },
        PixlFmLayout::PreDataDrive => match role {
            Role::Beam => files(&["drift_corr_x_ray_beam_location"], "csv", Some(2)),
            Role::Spectra => files(&["localized_full_spectra"], "csv", Some(1)),
            Role::BulkMax => files(&["bulk_histogram_inputs"], "msa", Some(2)),
            Role::Context => files(&["image_mark_up"], "tif", None),
            Role::Housekeeping => files(&["spatial_inputs"], "csv", Some(1)),
            Role::PseudoIntensity => files(&["pseudointensity_maps"], "csv", Some(1)),
            Role::Rgbu | Role::Disco => None,
        },
    }
}

/// Latest-version files for a role, narrowed to one by lowest SCLK when only
/// one is expected
fn find_role_files(import_dir: &Path, files: RoleFiles) -> Result<BTreeMap<String, FileNameMeta>> {
    let mut all = Vec::new();
    for dir in files.dirs {
        all.extend(list_role_files(import_dir, dir, files.ext)?);
    }

    let mut latest = latest_file_versions(&all)?;
    for path in &all {
        if !latest.contains_key(path) {
            info!("  IGNORED: \"{path}\", due to being older version");
        }
    }

    let dirs = files.dirs.join(",");
    match files.expected {
        Some(expected) if latest.len() < expected => warn!(
            "Not enough {} files found in {dirs}, only found {}!",
            files.ext,
            latest.len()
        ),
        Some(expected) if latest.len() > expected => warn!(
            "Unexpected {} file count {} in {dirs}. Check that we read the right one!",
            files.ext,
            latest.len()
        ),
        _ => {}
    }
    for path in latest.keys() {
        info!("  FOUND: \"{path}\"");
    }

    if files.expected == Some(1) && latest.len() > 1 {
        if let Some(chosen) = lowest_sclk(&latest) {
            info!("  CHOOSING: \"{chosen}\"");
            latest.retain(|path, _| *path == chosen);
        }
    }

    Ok(latest)
}

/// Everything read from a flight model delivery
#[derive(Debug, Default)]
struct FmParts {
    beams: BeamLocationByPmc,
    spectra: DetectorSampleByPmc,
    bulk_max: DetectorSampleByPmc,
    context_images: BTreeMap<Pmc, String>,
    housekeeping: HousekeepingData,
    housekeeping_name: Option<FileNameMeta>,
    pseudo: PseudoIntensities,
    pseudo_ranges: Vec<PseudoIntensityRange>,
    rgbu: Vec<ImageMeta>,
    disco: Vec<ImageMeta>,
}

fn image_meta(path: &str, meta: &FileNameMeta, kind: &str) -> ImageMeta {
    let pmc = meta.pmc().unwrap_or_else(|e| {
        info!("{kind} image file name \"{path}\" did not contain PMC: {e}");
        0
    });
    ImageMeta {
        file_name: path.to_string(),
        pmc,
        leds: meta.colour_filter.clone(),
        prod_type: meta.prod_type.clone(),
    }
}

/// Imports PIXL flight model deliveries in either directory layout
#[derive(Debug, Clone, Copy, Default)]
pub struct PixlFmImporter;

impl PixlFmImporter {
    /// Create the importer
    pub fn new() -> Self {
        Self
    }

    fn read_role(
        &self,
        parts: &mut FmParts,
        role: Role,
        files: &BTreeMap<String, FileNameMeta>,
        ctx: &ImportContext,
    ) -> Result<()> {
        let dir = &ctx.import_dir;
        let path_of = |file: &str| -> PathBuf { dir.join(file) };

        match role {
            Role::Beam => {
                if let Some((file, _)) = files.iter().find(|(_, meta)| meta.prod_type == "RXL") {
                    let (beams, image_pmcs) =
                        read_beam_locations(&path_of(file), true, 1, &DRIFT_COLUMNS)?;
                    info!("  Read {} beam locations projected onto {image_pmcs:?}", beams.len());
                    parts.beams = beams;
                }
                if parts.beams.is_empty() {
                    info!("No beam location found, continuing in case it's a disco dataset");
                }
            }
            Role::Spectra => {
                if let Some(file) = files.keys().next() {
                    parts.spectra = read_spectra_csv(&path_of(file))?;
                }
            }
            Role::BulkMax => {
                let paths: Vec<PathBuf> = files.keys().map(|f| path_of(f)).collect();
                if !paths.is_empty() {
                    parts.bulk_max = read_bulk_max_spectra(&paths)?;
                }
            }
            Role::Context => {
                for (file, meta) in files {
                    match meta.pmc() {
                        Ok(pmc) => {
                            parts.context_images.insert(pmc, file.clone());
                        }
                        Err(_) => warn!("No PMC in context image file name: \"{file}\""),
                    }
                }
            }
            Role::Housekeeping => {
                if let Some((file, meta)) = files.iter().next() {
                    parts.housekeeping = read_housekeeping(&path_of(file), 1)?;
                    parts.housekeeping_name = Some(meta.clone());
                }
            }
            Role::PseudoIntensity => {
                if let Some(file) = files.keys().next() {
                    parts.pseudo_ranges =
                        required_pseudo_ranges(ctx.pseudo_intensity_ranges.as_deref())?;
                    parts.pseudo = read_pseudo_intensity_file(&path_of(file), false)?;
                }
            }
            Role::Rgbu => {
                parts.rgbu = files
                    .iter()
                    .map(|(file, meta)| image_meta(file, meta, "RGBU"))
                    .collect();
            }
            Role::Disco => {
                parts.disco = files
                    .iter()
                    .map(|(file, meta)| image_meta(file, meta, "DISCO"))
                    .collect();
            }
        }
        Ok(())
    }
}

impl Importer for PixlFmImporter {
    fn import(&self, ctx: &ImportContext) -> Result<ImportedScan> {
        let dir = &ctx.import_dir;
        info!("Checking path \"{}\" for FM dataset type", dir.display());
        let layout = PixlFmLayout::detect(dir).ok_or_else(|| {
            IngestError::UnknownFormat(format!(
                "{} is not a PIXL FM dataset: unknown data source type",
                dir.display()
            ))
        })?;
        info!("Found path \"{}\" is of type {layout:?}", dir.display());

        let mut parts = FmParts::default();
        for role in Role::ALL {
            let Some(files) = role_files(layout, role) else {
                continue;
            };
            info!(
                "READING {} from \"{}\", subdirs: \"{}\"...",
                role.name(),
                dir.display(),
                files.dirs.join(",")
            );
            let found = find_role_files(dir, files).context(role.name())?;
            self.read_role(&mut parts, role, &found, ctx).context(role.name())?;
        }

        let matched = read_matched_images(&dir.join("MATCHED"), &parts.beams).context("matched")?;

        let housekeeping_name = parts.housekeeping_name.ok_or_else(|| {
            IngestError::MissingInput(
                "No housekeeping file found, cannot read dataset metadata".to_string(),
            )
        })?;

        let scan = ScanAssembler::new(&ctx.expected_id, ScanInstrument::PixlFm, "PIXL")
            .group("PIXL-FM")
            .meta(file_meta_from_name(&housekeeping_name))
            .beams(parts.beams)
            .spectra(parts.spectra)
            .bulk_max(parts.bulk_max)
            .housekeeping(parts.housekeeping)
            .pseudo(parts.pseudo_ranges, parts.pseudo)
            .context_images(parts.context_images)
            .rgbu(parts.rgbu)
            .disco(parts.disco)
            .matched(matched)
            .finish(&ctx.expected_id)?;

        Ok(ImportedScan {
            scan,
            image_dir: dir.clone(),
        })
    }
}
