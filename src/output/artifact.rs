use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::assembly::base_name;
use crate::error::{IngestError, Result};
use crate::model::{
    CanonicalScan, DetectorSample, MetaType, MetaValue, Pmc, PseudoIntensityRange, ReadType,
    ShotRecord, SpectrumCounts, META_DETECTOR_ID, META_LIVETIME, META_OFFSET, META_PMC,
    META_READTYPE, META_REALTIME, META_SCLK, META_XPERCHAN, META_XPOSITION, META_YPOSITION,
    META_ZPOSITION,
};

use super::zero_run;

/// Labels that must always be stored as integers
const INT_LABELS: [&str; 3] = [META_PMC, META_SCLK, "RTT"];

/// Labels that must always be stored as floats
const FLOAT_LABELS: [&str; 7] = [
    META_XPERCHAN,
    META_OFFSET,
    META_LIVETIME,
    META_REALTIME,
    META_XPOSITION,
    META_YPOSITION,
    META_ZPOSITION,
];

/// A meta value referencing the artifact's label dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct MetaItem {
    /// Index into [`ScanArtifact::meta_labels`]
    pub label_idx: u32,
    /// Value, typed like [`ScanArtifact::meta_types`] at `label_idx`
    pub value: MetaValue,
}

/// One detector's spectrum, compressed
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSpectrum {
    /// Sample metadata, alphabetical by label
    pub meta: Vec<MetaItem>,
    /// Largest channel value of the uncompressed spectrum
    pub spectrum_max: i64,
    /// ZERO-RUN encoded counts
    pub spectrum: Vec<i64>,
}

/// A projected beam position on an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate2D {
    /// Column
    pub i: f32,
    /// Row
    pub j: f32,
}

/// Beam location of one shot
#[derive(Debug, Clone, PartialEq)]
pub struct LocationBeam {
    /// Physical X
    pub x: f32,
    /// Physical Y
    pub y: f32,
    /// Physical Z
    pub z: f32,
    /// Geometric correction, present only when the beam file had a non-zero value
    pub geom_corr: Option<f32>,
    /// Projection onto the first aligned image
    pub image_i: f32,
    /// Projection onto the first aligned image
    pub image_j: f32,
    /// Projections onto the remaining aligned images, in beam image order
    pub context_locations: Vec<Coordinate2D>,
}

/// Pseudo-intensity values of one shot
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoIntensityData {
    /// Detector the values came from, empty for combined values
    pub detector_id: String,
    /// One value per pseudo-intensity range
    pub element_intensities: Vec<f32>,
}

/// Everything stored for one shot
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Shot id
    pub pmc: Pmc,
    /// Context image taken at this shot, empty if none
    pub context_image: String,
    /// Beam location, if known
    pub beam: Option<LocationBeam>,
    /// Spectra sorted by `READTYPE|DETECTOR_ID`
    pub detectors: Vec<DetectorSpectrum>,
    /// Pseudo-intensities
    pub pseudo_intensities: Vec<PseudoIntensityData>,
    /// Housekeeping values
    pub meta: Vec<MetaItem>,
}

/// A context image the beam was projected onto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextImageCoordinateInfo {
    /// Image file name
    pub image: String,
    /// PMC the image was taken at
    pub pmc: Pmc,
    /// Whether trapezoid correction was applied
    pub trapezoid_corrected: bool,
}

/// An image transformed to overlay an aligned image
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedContextImageInfo {
    /// Image file name
    pub image: String,
    /// Index into [`ScanArtifact::aligned_context_images`]
    pub aligned_index: u32,
    /// X offset
    pub x_offset: f32,
    /// Y offset
    pub y_offset: f32,
    /// X scale
    pub x_scale: f32,
    /// Y scale
    pub y_scale: f32,
}

/// Immutable, serializable form of a scan (the contents of `dataset.bin`)
#[derive(Debug, Clone, PartialEq)]
pub struct ScanArtifact {
    /// Scan id
    pub scan_id: String,
    /// Owning group
    pub group: String,
    /// Instrument name
    pub instrument: String,
    /// Detector configuration name
    pub detector_config: String,
    /// Title
    pub title: String,
    /// Target id
    pub target_id: String,
    /// Target name
    pub target: String,
    /// Site number
    pub site_id: i32,
    /// Site name
    pub site: String,
    /// Drive number
    pub drive_id: i32,
    /// SOL
    pub sol: String,
    /// RTT, an Int when it is numeric
    pub rtt: MetaValue,
    /// Spacecraft clock
    pub sclk: i32,
    /// Bulk quantification file
    pub bulk_sum_quant_file: String,
    /// Default image file name
    pub default_context_image: String,
    /// Meta label dictionary
    pub meta_labels: Vec<String>,
    /// Type of each label in [`Self::meta_labels`]
    pub meta_types: Vec<MetaType>,
    /// Shots in ascending PMC order
    pub locations: Vec<Location>,
    /// Images the beam was projected onto, in beam image order
    pub aligned_context_images: Vec<ContextImageCoordinateInfo>,
    /// All other images
    pub unaligned_context_images: Vec<String>,
    /// Matched images
    pub matched_aligned_context_images: Vec<MatchedContextImageInfo>,
    /// Pseudo-intensity ranges
    pub pseudo_intensity_ranges: Vec<PseudoIntensityRange>,
    /// Spectrum counts of the stored locations
    pub counts: SpectrumCounts,
}

impl ScanArtifact {
    /// Label name of a meta item
    pub fn label(&self, item: &MetaItem) -> Option<&str> {
        self.meta_labels.get(item.label_idx as usize).map(String::as_str)
    }
}

/// Builds a [`ScanArtifact`] from a [`CanonicalScan`].
///
/// Owns the meta label dictionary: labels receive ascending indices on first
/// sight and keep the type they were first seen with.
#[derive(Debug, Default)]
pub struct ArtifactBuilder {
    lookup: BTreeMap<String, (u32, MetaType)>,
    labels: Vec<String>,
    types: Vec<MetaType>,
}

impl ArtifactBuilder {
    /// Create a builder with an empty label dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `label`, registering it on first sight.
    pub fn meta_index(&mut self, label: &str, ty: MetaType) -> Result<u32> {
        if let Some((idx, existing)) = self.lookup.get(label) {
            if *existing != ty {
                return Err(IngestError::MetaTypeDrift {
                    label: label.to_string(),
                    existing: *existing,
                    got: ty,
                });
            }
            return Ok(*idx);
        }

        let idx = self.labels.len() as u32;
        self.lookup.insert(label.to_string(), (idx, ty));
        self.labels.push(label.to_string());
        self.types.push(ty);
        Ok(idx)
    }

    fn meta_item(&mut self, label: &str, value: &MetaValue) -> Result<MetaItem> {
        Ok(MetaItem {
            label_idx: self.meta_index(label, value.meta_type())?,
            value: value.clone(),
        })
    }

    /// Convert the scan. Consumes the builder, so each artifact gets a fresh dictionary.
    pub fn build(mut self, scan: &CanonicalScan) -> Result<ScanArtifact> {
        info!("Serializing scan {}...", scan.dataset_id);

        if let Some((first, _)) = scan.shots.first_key_value() {
            if *first < 0 {
                return Err(IngestError::Integrity(format!(
                    "Lowest PMC detected was {first}"
                )));
            }
        }

        let mut locations = Vec::with_capacity(scan.shots.len());
        for (pmc, shot) in &scan.shots {
            let location = self
                .location(*pmc, shot, scan)
                .map_err(|e| e.context(format!("Error saving PMC {pmc}")))?;
            locations.push(location);
        }

        self.check_label_types()?;
        debug!("Stored {} meta labels", self.labels.len());

        let aligned_context_images: Vec<ContextImageCoordinateInfo> = scan
            .aligned_images
            .iter()
            .map(|img| ContextImageCoordinateInfo {
                image: img.image.clone(),
                pmc: img.pmc,
                trapezoid_corrected: false,
            })
            .collect();

        let matched_aligned_context_images = scan
            .matched_aligned_images
            .iter()
            .map(|matched| {
                // A scan may carry only matched images, with nothing to index into
                let aligned_index = if aligned_context_images.is_empty() {
                    0
                } else {
                    aligned_context_images
                        .iter()
                        .position(|a| a.pmc == matched.aligned_beam_pmc)
                        .ok_or_else(|| {
                            IngestError::Integrity(format!(
                                "Failed to find index of aligned image {} for PMC {}",
                                matched.matched_image_name, matched.aligned_beam_pmc
                            ))
                        })?
                };
                Ok(MatchedContextImageInfo {
                    image: base_name(&matched.matched_image_name).to_string(),
                    aligned_index: aligned_index as u32,
                    x_offset: matched.x_offset,
                    y_offset: matched.y_offset,
                    x_scale: matched.x_scale,
                    y_scale: matched.y_scale,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let counts = count_locations(&locations, &self.labels);
        if counts.bulk < 2 || counts.max < 2 {
            warn!(
                "Not enough bulk/max spectra defined. Bulk: {}, Max: {}",
                counts.bulk, counts.max
            );
        }

        let rtt = match scan.meta.rtt.parse::<i32>() {
            Ok(n) => MetaValue::Int(n),
            Err(_) => MetaValue::String(scan.meta.rtt.clone()),
        };

        Ok(ScanArtifact {
            scan_id: scan.dataset_id.clone(),
            group: scan.group.clone(),
            instrument: scan.instrument.as_str().to_string(),
            detector_config: scan.detector_config.clone(),
            title: scan.meta.title.clone(),
            target_id: scan.meta.target_id.clone(),
            target: scan.meta.target.clone(),
            site_id: scan.meta.site_id,
            site: scan.meta.site.clone(),
            drive_id: scan.meta.drive_id,
            sol: scan.meta.sol.clone(),
            rtt,
            sclk: scan.meta.sclk,
            bulk_sum_quant_file: scan.bulk_quant_file.clone(),
            default_context_image: scan.default_context_image.clone(),
            meta_labels: self.labels,
            meta_types: self.types,
            locations,
            aligned_context_images,
            unaligned_context_images: scan.unaligned_images.clone(),
            matched_aligned_context_images,
            pseudo_intensity_ranges: scan.pseudo_ranges.clone(),
            counts,
        })
    }

    fn location(&mut self, pmc: Pmc, shot: &ShotRecord, scan: &CanonicalScan) -> Result<Location> {
        let mut detectors = Vec::new();
        for sample in sorted_detectors(pmc, &shot.detectors) {
            let meta = sample
                .meta
                .iter()
                .map(|(label, value)| self.meta_item(label, value))
                .collect::<Result<Vec<_>>>()?;
            detectors.push(DetectorSpectrum {
                meta,
                spectrum_max: sample.spectrum_max(),
                spectrum: zero_run::encode(&sample.spectrum),
            });
        }

        let beam = match &shot.beam {
            Some(beam) => {
                let order = &scan.beam_ij_order;
                if order.len() != beam.ij.len() || order.is_empty() {
                    return Err(IngestError::Integrity(
                        "PMC order for beam locations mismatched with beam IJs stored".to_string(),
                    ));
                }
                let coords = order
                    .iter()
                    .map(|image_pmc| {
                        beam.ij
                            .get(image_pmc)
                            .map(|p| Coordinate2D { i: p.i, j: p.j })
                            .ok_or_else(|| {
                                IngestError::Integrity(format!(
                                    "Beam location has no coordinates for image PMC {image_pmc}"
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(LocationBeam {
                    x: beam.x,
                    y: beam.y,
                    z: beam.z,
                    geom_corr: (beam.geom_corr > 0.0).then_some(beam.geom_corr),
                    image_i: coords[0].i,
                    image_j: coords[0].j,
                    context_locations: coords[1..].to_vec(),
                })
            }
            None => None,
        };

        let pseudo_intensities = if shot.pseudo_intensities.is_empty() {
            Vec::new()
        } else {
            vec![PseudoIntensityData {
                detector_id: String::new(),
                element_intensities: shot.pseudo_intensities.clone(),
            }]
        };

        let meta = scan
            .housekeeping_headers
            .iter()
            .zip(&shot.housekeeping)
            .map(|(label, value)| self.meta_item(label, value))
            .collect::<Result<Vec<_>>>()?;

        Ok(Location {
            pmc,
            context_image: shot.context_image_dst.clone(),
            beam,
            detectors,
            pseudo_intensities,
            meta,
        })
    }

    fn check_label_types(&self) -> Result<()> {
        for (label, ty) in self.labels.iter().zip(&self.types) {
            if INT_LABELS.contains(&label.as_str()) && *ty != MetaType::Int {
                return Err(IngestError::Integrity(format!(
                    "Failed to save metadata. {label} expected as int, got: {ty}"
                )));
            }
            if FLOAT_LABELS.contains(&label.as_str()) && *ty != MetaType::Float {
                return Err(IngestError::Integrity(format!(
                    "Failed to save metadata. {label} expected as float, got: {ty}"
                )));
            }
        }
        Ok(())
    }
}

/// Samples keyed and sorted by `READTYPE|DETECTOR_ID`. Samples with a missing
/// or invalid key, and duplicates, are skipped.
fn sorted_detectors(pmc: Pmc, samples: &[DetectorSample]) -> Vec<&DetectorSample> {
    let mut by_key: BTreeMap<String, &DetectorSample> = BTreeMap::new();

    for sample in samples {
        let Some(read_type) = sample.meta_str(META_READTYPE) else {
            warn!("Not saving spectrum for PMC {pmc}, READTYPE not found");
            continue;
        };
        if read_type.parse::<ReadType>().is_err() {
            warn!("Not saving spectrum for PMC {pmc}, READTYPE \"{read_type}\" is not valid");
            continue;
        }
        let Some(detector) = sample.meta_str(META_DETECTOR_ID) else {
            warn!("Not saving spectrum for PMC {pmc}, DETECTOR_ID not found");
            continue;
        };

        let key = format!("{read_type}|{detector}");
        if by_key.contains_key(&key) {
            warn!(
                "Found duplicate spectrum for PMC {pmc}: DETECTOR_ID=\"{detector}\", READTYPE=\"{read_type}\""
            );
            continue;
        }
        by_key.insert(key, sample);
    }

    by_key.into_values().collect()
}

fn count_locations(locations: &[Location], labels: &[String]) -> SpectrumCounts {
    let mut counts = SpectrumCounts::default();
    let read_type_idx = labels.iter().position(|l| l == META_READTYPE);

    for location in locations {
        for detector in &location.detectors {
            let read_type = detector
                .meta
                .iter()
                .find(|m| Some(m.label_idx as usize) == read_type_idx)
                .and_then(|m| m.value.as_str())
                .and_then(|s| s.parse::<ReadType>().ok());
            match read_type {
                Some(ReadType::Normal) => counts.normal += 1,
                Some(ReadType::Dwell) => counts.dwell += 1,
                Some(ReadType::BulkSum) => counts.bulk += 1,
                Some(ReadType::MaxValue) => counts.max += 1,
                None => {}
            }
        }
        if !location.pseudo_intensities.is_empty() {
            counts.pseudo_intensities += 1;
        }
    }

    counts
}
