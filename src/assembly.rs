//! # Canonical Assembly
//!
//! [`ScanAssembler`] collects the per-role parse results of one import and
//! freezes them into a [`CanonicalScan`]: one [`ShotRecord`] per PMC seen in
//! any role, the beam image order shared by every shot, the aligned/unaligned
//! image partition, the default image and the spectrum counts.
//!
//! ```rust
//! use pixl_ingest::assembly::ScanAssembler;
//! use pixl_ingest::model::{FileMetaData, ScanInstrument};
//!
//! let scan = ScanAssembler::new("demo", ScanInstrument::JplBreadboard, "Breadboard")
//!     .group("JPL Breadboard")
//!     .meta(FileMetaData { title: "demo".to_string(), ..Default::default() })
//!     .finish("demo")?;
//! assert!(scan.shots.is_empty());
//! # Ok::<(), pixl_ingest::IngestError>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};

use crate::error::{IngestError, Result};
use crate::model::{
    AlignedImage, BeamLocationByPmc, CanonicalScan, DetectorSampleByPmc, FileMetaData,
    HousekeepingData, ImageMeta, MatchedAlignedImage, Pmc, PseudoIntensities,
    PseudoIntensityRange, ReadType, ScanInstrument, ShotRecord, SpectrumCounts,
};

/// RTTs the engineering model writes into every bundle it produces
const EM_BUNDLE_RTTS: [&str; 2] = ["000000453", "000000454"];

/// Detector configuration used by engineering-model scans
pub const EM_DETECTOR_CONFIG: &str = "PIXL-EM-E2E";

/// Group owning engineering-model scans
pub const EM_GROUP: &str = "PIXL-EM";

/// Output file name for an input image: base name with a lowercased
/// extension, TIFFs becoming PNGs.
pub fn output_image_name(src: &str) -> String {
    let base = base_name(src);
    match base.rsplit_once('.') {
        Some((stem, ext)) => {
            let ext = ext.to_lowercase();
            let ext = if ext == "tif" { "png".to_string() } else { ext };
            format!("{stem}.{ext}")
        }
        None => base.to_string(),
    }
}

/// Last path component of `path`, or `path` itself if it has none
pub fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Builder that merges everything an importer read into a [`CanonicalScan`]
#[derive(Debug, Clone, Default)]
pub struct ScanAssembler {
    dataset_id: String,
    instrument: ScanInstrument,
    detector_config: String,
    group: String,
    meta: FileMetaData,
    beams: BeamLocationByPmc,
    spectra: DetectorSampleByPmc,
    bulk_max: DetectorSampleByPmc,
    housekeeping: HousekeepingData,
    pseudo_ranges: Vec<PseudoIntensityRange>,
    pseudo: PseudoIntensities,
    context_images: BTreeMap<Pmc, String>,
    rgbu: Vec<ImageMeta>,
    disco: Vec<ImageMeta>,
    matched: Vec<MatchedAlignedImage>,
    beam_version: u32,
    creator_user_id: String,
    bulk_quant_file: String,
}

impl ScanAssembler {
    /// Start assembling a scan
    pub fn new(
        dataset_id: impl Into<String>,
        instrument: ScanInstrument,
        detector_config: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            instrument,
            detector_config: detector_config.into(),
            beam_version: 1,
            ..Default::default()
        }
    }

    /// Owning group
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Provenance metadata. An empty title defaults to the RTT.
    pub fn meta(mut self, meta: FileMetaData) -> Self {
        self.meta = meta;
        self
    }

    /// Beam locations by PMC
    pub fn beams(mut self, beams: BeamLocationByPmc) -> Self {
        self.beams = beams;
        self
    }

    /// Normal and dwell spectra
    pub fn spectra(mut self, spectra: DetectorSampleByPmc) -> Self {
        self.spectra = spectra;
        self
    }

    /// Bulk-sum and max-value spectra
    pub fn bulk_max(mut self, bulk_max: DetectorSampleByPmc) -> Self {
        self.bulk_max = bulk_max;
        self
    }

    /// Housekeeping table
    pub fn housekeeping(mut self, housekeeping: HousekeepingData) -> Self {
        self.housekeeping = housekeeping;
        self
    }

    /// Pseudo-intensity ranges and values
    pub fn pseudo(mut self, ranges: Vec<PseudoIntensityRange>, values: PseudoIntensities) -> Self {
        self.pseudo_ranges = ranges;
        self.pseudo = values;
        self
    }

    /// Context images by PMC, as paths relative to the image source directory
    pub fn context_images(mut self, images: BTreeMap<Pmc, String>) -> Self {
        self.context_images = images;
        self
    }

    /// RGBU multispectral images
    pub fn rgbu(mut self, images: Vec<ImageMeta>) -> Self {
        self.rgbu = images;
        self
    }

    /// Disco LED images
    pub fn disco(mut self, images: Vec<ImageMeta>) -> Self {
        self.disco = images;
        self
    }

    /// Matched-image manifests
    pub fn matched(mut self, images: Vec<MatchedAlignedImage>) -> Self {
        self.matched = images;
        self
    }

    /// Beam geometry version (defaults to 1)
    pub fn beam_version(mut self, version: u32) -> Self {
        self.beam_version = version;
        self
    }

    /// User that started the import
    pub fn creator_user_id(mut self, id: impl Into<String>) -> Self {
        self.creator_user_id = id.into();
        self
    }

    /// Bulk quantification file name
    pub fn bulk_quant_file(mut self, file: impl Into<String>) -> Self {
        self.bulk_quant_file = file.into();
        self
    }

    /// Merge, cross-check and freeze the scan.
    ///
    /// `expected_id` is the scan id the import was requested for. Flight model
    /// scans must carry a matching RTT, except for engineering-model bundles,
    /// whose fixed RTT is replaced by it.
    pub fn finish(mut self, expected_id: &str) -> Result<CanonicalScan> {
        let mut detector_config = std::mem::take(&mut self.detector_config);
        let mut instrument = self.instrument;
        let mut group = std::mem::take(&mut self.group);

        if instrument == ScanInstrument::PixlFm {
            let em_bundle = resolve_flight_rtt(&mut self.meta, expected_id)?;
            let ground_sol = self.meta.sol.starts_with('C') || self.meta.sol.starts_with('D');
            if em_bundle || ground_sol {
                detector_config = EM_DETECTOR_CONFIG.to_string();
                group = EM_GROUP.to_string();
                instrument = ScanInstrument::PixlEm;
            }
        }
        if self.meta.title.is_empty() {
            self.meta.title = self.meta.rtt.clone();
        }

        for (pmc, samples) in std::mem::take(&mut self.bulk_max) {
            self.spectra.entry(pmc).or_default().extend(samples);
        }

        let shots = self.build_shots();
        check_channel_counts(&shots)?;
        let beam_ij_order = beam_image_order(&shots)?;
        let (aligned_images, unaligned_images) = self.partition_images(&shots, &beam_ij_order);
        let default_context_image = self.default_image();
        let counts = count_spectra(&shots);
        debug!(
            "Assembled {} shots, {} aligned and {} unaligned images",
            shots.len(),
            aligned_images.len(),
            unaligned_images.len()
        );

        Ok(CanonicalScan {
            dataset_id: self.dataset_id,
            group,
            instrument,
            detector_config,
            meta: self.meta,
            pseudo_ranges: self.pseudo_ranges,
            housekeeping_headers: self.housekeeping.header,
            shots,
            rgbu_images: self.rgbu,
            disco_images: self.disco,
            matched_aligned_images: self.matched,
            aligned_images,
            unaligned_images,
            beam_ij_order,
            default_context_image,
            counts,
            beam_version: self.beam_version,
            creator_user_id: self.creator_user_id,
            bulk_quant_file: self.bulk_quant_file,
        })
    }

    fn build_shots(&mut self) -> BTreeMap<Pmc, ShotRecord> {
        let mut shots: BTreeMap<Pmc, ShotRecord> = BTreeMap::new();

        for (pmc, beam) in std::mem::take(&mut self.beams) {
            shots.entry(pmc).or_default().beam = Some(beam);
        }
        for (pmc, values) in std::mem::take(&mut self.housekeeping.data) {
            shots.entry(pmc).or_default().housekeeping = values;
        }
        for (pmc, samples) in std::mem::take(&mut self.spectra) {
            shots.entry(pmc).or_default().detectors = samples;
        }
        for (pmc, src) in &self.context_images {
            let shot = shots.entry(*pmc).or_default();
            shot.context_image_dst = output_image_name(src);
            shot.context_image_src = src.clone();
        }
        for (pmc, values) in std::mem::take(&mut self.pseudo) {
            shots.entry(pmc).or_default().pseudo_intensities = values;
        }

        shots
    }

    fn partition_images(
        &self,
        shots: &BTreeMap<Pmc, ShotRecord>,
        order: &[Pmc],
    ) -> (Vec<AlignedImage>, Vec<String>) {
        let mut aligned = Vec::new();
        for pmc in order {
            match shots.get(pmc).filter(|s| !s.context_image_dst.is_empty()) {
                Some(shot) => aligned.push(AlignedImage {
                    image: shot.context_image_dst.clone(),
                    pmc: *pmc,
                }),
                None => warn!("No context image found for beam image PMC {pmc}"),
            }
        }

        let mut unaligned: Vec<String> = shots
            .iter()
            .filter(|(pmc, shot)| !shot.context_image_dst.is_empty() && !order.contains(pmc))
            .map(|(_, shot)| shot.context_image_dst.clone())
            .collect();
        unaligned.extend(self.rgbu.iter().map(|i| base_name(&i.file_name).to_string()));
        unaligned.extend(self.disco.iter().map(|i| base_name(&i.file_name).to_string()));

        (aligned, unaligned)
    }

    fn default_image(&self) -> String {
        if let Some(src) = self.context_images.values().next() {
            return output_image_name(src);
        }
        self.disco
            .iter()
            .find(|i| i.leds == "W")
            .or_else(|| self.disco.first())
            .map(|i| base_name(&i.file_name).to_string())
            .unwrap_or_default()
    }
}

/// Check the RTT read from the housekeeping file name against the requested
/// id. Returns true for engineering-model bundles, whose RTT is rewritten.
fn resolve_flight_rtt(meta: &mut FileMetaData, expected_id: &str) -> Result<bool> {
    if meta.rtt.is_empty() {
        return Err(IngestError::Integrity(
            "Failed to determine dataset RTT".to_string(),
        ));
    }

    if EM_BUNDLE_RTTS.contains(&meta.rtt.as_str()) {
        if expected_id == meta.rtt {
            return Err(IngestError::Integrity(format!(
                "Read RTT {}, need expected dataset ID to be different",
                meta.rtt
            )));
        }
        warn!("Engineering model bundle RTT {} replaced by {expected_id}", meta.rtt);
        meta.rtt = expected_id.to_string();
        return Ok(true);
    }

    if meta.rtt != expected_id && meta.rtt != format!("0{expected_id}") {
        return Err(IngestError::Integrity(format!(
            "Expected dataset ID {expected_id}, read {}",
            meta.rtt
        )));
    }
    Ok(false)
}

/// Spectra within a shot must share a channel count
fn check_channel_counts(shots: &BTreeMap<Pmc, ShotRecord>) -> Result<()> {
    for (pmc, shot) in shots {
        let mut lengths = shot.detectors.iter().map(|s| s.spectrum.len());
        let Some(first) = lengths.next() else { continue };
        if let Some(other) = lengths.find(|len| *len != first) {
            return Err(IngestError::Integrity(format!(
                "PMC {pmc} has spectra of differing channel count: {first} and {other}"
            )));
        }
    }
    Ok(())
}

fn beam_image_order(shots: &BTreeMap<Pmc, ShotRecord>) -> Result<Vec<Pmc>> {
    let mut order: Option<Vec<Pmc>> = None;
    for (pmc, shot) in shots {
        let Some(beam) = &shot.beam else { continue };
        let keys = beam.image_pmcs();
        match &order {
            None => order = Some(keys),
            Some(expected) if *expected != keys => {
                return Err(IngestError::InconsistentBeamImageSet {
                    pmc: *pmc,
                    expected: expected.clone(),
                    found: keys,
                })
            }
            Some(_) => {}
        }
    }
    Ok(order.unwrap_or_default())
}

fn count_spectra(shots: &BTreeMap<Pmc, ShotRecord>) -> SpectrumCounts {
    let mut counts = SpectrumCounts::default();
    for shot in shots.values() {
        for sample in &shot.detectors {
            match sample.read_type() {
                Some(ReadType::Normal) => counts.normal += 1,
                Some(ReadType::Dwell) => counts.dwell += 1,
                Some(ReadType::BulkSum) => counts.bulk += 1,
                Some(ReadType::MaxValue) => counts.max += 1,
                None => {}
            }
        }
        if !shot.pseudo_intensities.is_empty() {
            counts.pseudo_intensities += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{
        BeamLocation, BeamLocationProj, DetectorSample, MetaData, MetaValue, META_DETECTOR_ID,
        META_PMC, META_READTYPE,
    };

    fn beam(image_pmcs: &[Pmc]) -> BeamLocation {
        BeamLocation {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            geom_corr: 0.0,
            ij: image_pmcs
                .iter()
                .map(|p| (*p, BeamLocationProj { i: 10.0, j: 20.0 }))
                .collect(),
        }
    }

    fn sample(pmc: Pmc, read_type: ReadType, detector: &str) -> DetectorSample {
        let mut meta = MetaData::new();
        meta.insert(META_PMC.to_string(), MetaValue::Int(pmc));
        meta.insert(META_READTYPE.to_string(), read_type.as_str().into());
        meta.insert(META_DETECTOR_ID.to_string(), detector.into());
        DetectorSample::new(meta, vec![0, 1, 2])
    }

    fn flight_meta(rtt: &str, sol: &str) -> FileMetaData {
        FileMetaData {
            rtt: rtt.to_string(),
            sol: sol.to_string(),
            ..Default::default()
        }
    }

    fn flight(rtt: &str) -> ScanAssembler {
        ScanAssembler::new("208536069", ScanInstrument::PixlFm, "PIXL")
            .group("PIXL-FM")
            .meta(flight_meta(rtt, "0125"))
    }

    // ==================== Image Names ====================

    #[test]
    fn test_output_image_name() {
        assert_eq!(
            output_image_name("RCM/PCCR0577_0718181212_000RCM_N029000020853606900000000J01.TIF"),
            "PCCR0577_0718181212_000RCM_N029000020853606900000000J01.png"
        );
        assert_eq!(output_image_name("a/b/photo.JPG"), "photo.jpg");
        assert_eq!(output_image_name("noext"), "noext");
    }

    // ==================== Shots ====================

    #[test]
    fn test_every_role_allocates_a_shot() {
        let mut spectra = DetectorSampleByPmc::new();
        spectra.insert(5, vec![sample(5, ReadType::Normal, "A")]);
        let mut hk = HousekeepingData {
            header: vec!["temp".to_string()],
            ..Default::default()
        };
        hk.data.insert(6, vec![MetaValue::Float(1.5)]);
        let mut pseudo = PseudoIntensities::new();
        pseudo.insert(7, vec![1.0, 2.0]);

        let scan = flight("208536069")
            .spectra(spectra)
            .housekeeping(hk)
            .pseudo(Vec::new(), pseudo)
            .context_images(BTreeMap::from([(8, "img_8.tif".to_string())]))
            .beams(BTreeMap::from([(9, beam(&[8]))]))
            .finish("208536069")
            .unwrap();

        assert_eq!(scan.shots.keys().copied().collect::<Vec<_>>(), vec![5, 6, 7, 8, 9]);
        assert_eq!(scan.shots[&8].context_image_dst, "img_8.png");
        assert_eq!(scan.shots[&8].context_image_src, "img_8.tif");
        assert_eq!(scan.housekeeping_headers, vec!["temp".to_string()]);
        assert_eq!(scan.counts.normal, 1);
        assert_eq!(scan.counts.pseudo_intensities, 1);
    }

    #[test]
    fn test_bulk_max_merged_and_counted() {
        let mut spectra = DetectorSampleByPmc::new();
        spectra.insert(
            1,
            vec![
                sample(1, ReadType::Normal, "A"),
                sample(1, ReadType::Normal, "B"),
                sample(1, ReadType::Dwell, "A"),
            ],
        );
        let mut bulk_max = DetectorSampleByPmc::new();
        bulk_max.insert(
            2,
            vec![
                sample(2, ReadType::BulkSum, "A"),
                sample(2, ReadType::BulkSum, "B"),
                sample(2, ReadType::MaxValue, "A"),
                sample(2, ReadType::MaxValue, "B"),
            ],
        );

        let scan = flight("208536069")
            .spectra(spectra)
            .bulk_max(bulk_max)
            .finish("208536069")
            .unwrap();

        assert_eq!(
            scan.counts,
            SpectrumCounts {
                normal: 2,
                dwell: 1,
                bulk: 2,
                max: 2,
                pseudo_intensities: 0
            }
        );
        assert_eq!(scan.shots[&2].detectors.len(), 4);
    }

    #[test]
    fn test_shot_channel_count_mismatch_rejected() {
        let mut short_b = sample(5, ReadType::Normal, "B");
        short_b.spectrum.truncate(2);
        let mut spectra = DetectorSampleByPmc::new();
        spectra.insert(5, vec![sample(5, ReadType::Normal, "A"), short_b]);

        let err = flight("208536069").spectra(spectra).finish("208536069").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(
            err.to_string(),
            "PMC 5 has spectra of differing channel count: 3 and 2"
        );
    }

    // ==================== Beam Image Order ====================

    #[test]
    fn test_inconsistent_beam_image_set() {
        let beams = BTreeMap::from([(1, beam(&[10, 20])), (2, beam(&[10]))]);
        let err = flight("208536069").beams(beams).finish("208536069").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(matches!(
            err,
            IngestError::InconsistentBeamImageSet { pmc: 2, .. }
        ));
    }

    #[test]
    fn test_aligned_unaligned_partition() {
        let beams = BTreeMap::from([(1, beam(&[30, 10])), (2, beam(&[10, 30]))]);
        let context = BTreeMap::from([
            (10, "ctx_10.tif".to_string()),
            (20, "ctx_20.jpg".to_string()),
        ]);
        let rgbu = vec![ImageMeta {
            file_name: "RGBU/rgbu_5.tif".to_string(),
            pmc: 5,
            leds: "R".to_string(),
            prod_type: "VIS".to_string(),
        }];
        let disco = vec![ImageMeta {
            file_name: "DISCO/disco_6.png".to_string(),
            pmc: 6,
            leds: "G".to_string(),
            prod_type: "MCC".to_string(),
        }];

        let scan = flight("208536069")
            .beams(beams)
            .context_images(context)
            .rgbu(rgbu)
            .disco(disco)
            .finish("208536069")
            .unwrap();

        assert_eq!(scan.beam_ij_order, vec![10, 30]);
        assert_eq!(
            scan.aligned_images,
            vec![AlignedImage {
                image: "ctx_10.png".to_string(),
                pmc: 10
            }]
        );
        assert_eq!(
            scan.unaligned_images,
            vec!["ctx_20.jpg", "rgbu_5.tif", "disco_6.png"]
        );
        assert_eq!(scan.default_context_image, "ctx_10.png");
    }

    // ==================== Default Image ====================

    #[test]
    fn test_default_image_prefers_white_disco() {
        let disco = ["G", "W"]
            .iter()
            .enumerate()
            .map(|(idx, leds)| ImageMeta {
                file_name: format!("DISCO/disco_{idx}.png"),
                pmc: idx as Pmc,
                leds: leds.to_string(),
                prod_type: "MCC".to_string(),
            })
            .collect();
        let scan = flight("208536069").disco(disco).finish("208536069").unwrap();
        assert_eq!(scan.default_context_image, "disco_1.png");
    }

    #[test]
    fn test_default_image_empty_without_images() {
        let scan = flight("208536069").finish("208536069").unwrap();
        assert_eq!(scan.default_context_image, "");
        assert!(scan.aligned_images.is_empty());
    }

    // ==================== RTT Handling ====================

    #[test]
    fn test_rtt_with_leading_zero_accepted() {
        let scan = flight("098765432").finish("98765432").unwrap();
        assert_eq!(scan.meta.title, "098765432");
        assert_eq!(scan.instrument, ScanInstrument::PixlFm);
        assert_eq!(scan.detector_config, "PIXL");
    }

    #[test]
    fn test_rtt_mismatch_rejected() {
        let err = flight("208536069").finish("123").unwrap_err();
        assert_eq!(err.to_string(), "Expected dataset ID 123, read 208536069");
    }

    #[test]
    fn test_empty_rtt_rejected() {
        let err = flight("").finish("123").unwrap_err();
        assert_eq!(err.to_string(), "Failed to determine dataset RTT");
    }

    #[test]
    fn test_engineering_bundle_takes_expected_id() {
        let scan = flight("000000453").finish("222").unwrap();
        assert_eq!(scan.meta.rtt, "222");
        assert_eq!(scan.meta.title, "222");
        assert_eq!(scan.instrument, ScanInstrument::PixlEm);
        assert_eq!(scan.detector_config, EM_DETECTOR_CONFIG);
        assert_eq!(scan.group, EM_GROUP);

        let err = flight("000000454").finish("000000454").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Read RTT 000000454, need expected dataset ID to be different"
        );
    }

    #[test]
    fn test_ground_sol_marks_engineering_model() {
        let scan = ScanAssembler::new("77", ScanInstrument::PixlFm, "PIXL")
            .meta(flight_meta("77", "D077"))
            .finish("77")
            .unwrap();
        assert_eq!(scan.instrument, ScanInstrument::PixlEm);
    }

    #[test]
    fn test_breadboard_skips_rtt_check() {
        let scan = ScanAssembler::new("bb", ScanInstrument::JplBreadboard, "Breadboard")
            .meta(FileMetaData {
                title: "Breadboard scan".to_string(),
                ..Default::default()
            })
            .finish("something-else")
            .unwrap();
        assert_eq!(scan.dataset_id, "bb");
        assert_eq!(scan.meta.title, "Breadboard scan");
        assert_eq!(scan.beam_version, 1);
    }
}
