//! Directory-of-MSA spectra, as produced by breadboard and engineering-model runs.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::error::{IngestError, Result, ResultExt};
use crate::model::{
    BeamLocation, BeamLocationByPmc, BeamLocationProj, DetectorId, DetectorSample,
    DetectorSampleByPmc, MetaData, MetaValue, Pmc, ReadType, META_DETECTOR_ID, META_LIVETIME,
    META_OFFSET, META_PMC, META_READTYPE, META_SOURCEFILE, META_XPERCHAN, META_XPOSITION,
    META_YPOSITION, META_ZPOSITION,
};
use crate::readers::{read_file_lines, read_msa_lines};

/// `SOURCEFILE` of spectra synthesized by [`make_bulk_max`]
pub const GENERATED_SOURCE_FILE: &str = "GeneratedByPIXLISEConverter";

/// List file names in `dir`, minus any whose name ends with an entry of
/// `ignore`. Names are returned sorted.
pub fn list_msa_files(dir: &Path, ignore: &[String]) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| IngestError::MissingInput(format!("MSA directory {}: {e}", dir.display())))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignore.iter().any(|i| !i.is_empty() && name.ends_with(i.as_str())) {
            debug!("Ignoring MSA file: {name}");
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Read type encoded as the first `_` part of a five-part MSA file name,
/// eg `Normal_A_0612673072_000001C5_000013.msa`.
pub fn spectra_read_type(file_name: &str) -> Result<ReadType> {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    let parts: Vec<&str> = base.split('_').collect();
    if parts.len() != 5 {
        return Err(IngestError::Parse(
            "unexpected MSA filename when detecting read type".to_string(),
        ));
    }
    ReadType::from_str(parts[0])
        .map_err(|_| IngestError::Parse("unexpected MSA read type".to_string()))
}

/// Sequence number from the last `_` part of an MSA file name.
pub fn msa_sequence_number(file_name: &str) -> Result<i64> {
    let path = Path::new(file_name);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !ext.eq_ignore_ascii_case("msa") {
        return Err(IngestError::Parse(format!(
            "Unexpected file extension when reading MSA: .{ext}"
        )));
    }

    let Some((_, last)) = file_name.rsplit_once('_') else {
        return Err(IngestError::Parse(format!("Invalid MSA file name: {file_name}")));
    };
    let digits = &last[..last.len() - ext.len() - 1];
    match digits.parse::<i64>() {
        Ok(seq) if seq > 0 => Ok(seq),
        _ => Err(IngestError::Parse(format!(
            "Invalid MSA sequence number in: {file_name}"
        ))),
    }
}

/// Keep `.msa` files (with a valid read-type prefix when `verify_read_type`)
/// that carry a sequence number, stably sorted by it.
pub fn select_spectra_files(files: &[String], verify_read_type: bool) -> Vec<String> {
    let mut selected: Vec<(i64, String)> = Vec::new();

    for file in files {
        let ext = Path::new(file).extension().and_then(|e| e.to_str());
        if !ext.is_some_and(|e| e.eq_ignore_ascii_case("msa")) {
            debug!("Ignoring extension {ext:?} in: {file}");
            continue;
        }
        if verify_read_type {
            if let Err(e) = spectra_read_type(file) {
                warn!("Ignoring {file}: {e}");
                continue;
            }
        }
        match msa_sequence_number(file) {
            Ok(seq) => selected.push((seq, file.clone())),
            Err(e) => warn!("Ignoring {file}: {e}"),
        }
    }

    selected.sort_by_key(|(seq, _)| *seq);
    selected.into_iter().map(|(_, f)| f).collect()
}

/// How MSA files in a directory are interpreted.
#[derive(Debug, Clone, Default)]
pub struct MsaReadOptions {
    /// Files hold one detector (`DATATYPE Y`)
    pub single_detector: bool,
    /// Assign PMCs 1, 2, ... in file order instead of reading `PMC` meta
    pub gen_pmcs: bool,
    /// Read type for every file; when unset, taken from the file name
    pub read_type_override: Option<ReadType>,
    /// Files only have detector A, copy it as B
    pub duplicate_a_as_b: bool,
}

/// Read every file in `files` (relative to `dir`) and group samples by PMC.
pub fn make_spectra_lookup(
    dir: &Path,
    files: &[String],
    options: &MsaReadOptions,
) -> Result<DetectorSampleByPmc> {
    let mut lookup = DetectorSampleByPmc::new();
    info!("  Reading {} spectrum files...", files.len());

    for (idx, file) in files.iter().enumerate() {
        let path = dir.join(file);
        let lines = read_file_lines(&path)?;
        let samples = read_msa_lines(
            &lines,
            options.single_detector,
            !options.gen_pmcs,
            options.duplicate_a_as_b,
        )
        .with_context(|| format!("Error in {}", path.display()))?;

        let read_type = match options.read_type_override {
            Some(rt) => rt,
            None => spectra_read_type(file).with_context(|| format!("Error in {}", path.display()))?,
        };

        for mut sample in samples {
            if options.gen_pmcs {
                sample.set_meta(META_PMC, (idx + 1) as Pmc);
            }
            if sample.meta.contains_key(META_SOURCEFILE) {
                return Err(IngestError::Parse(format!(
                    "Unexpected SOURCEFILE metadata already defined in {}",
                    path.display()
                )));
            }
            sample.set_meta(META_SOURCEFILE, file.as_str());
            sample.set_meta(META_READTYPE, read_type.as_str());

            let pmc = sample.pmc().ok_or_else(|| {
                IngestError::Parse(format!("No PMC for spectrum in {}", path.display()))
            })?;
            lookup.entry(pmc).or_default().push(sample);
        }
    }

    Ok(lookup)
}

/// Per-detector eV calibration. Zero values mean "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvCalibration {
    /// eV per channel, detector A
    pub xperchan_a: f32,
    /// eV start offset, detector A
    pub offset_a: f32,
    /// eV per channel, detector B
    pub xperchan_b: f32,
    /// eV start offset, detector B
    pub offset_b: f32,
}

impl EvCalibration {
    fn for_detector(&self, detector: DetectorId) -> (f32, f32) {
        match detector {
            DetectorId::A => (self.xperchan_a, self.offset_a),
            DetectorId::B => (self.xperchan_b, self.offset_b),
        }
    }
}

/// Overwrite `XPERCHAN`/`OFFSET` with the non-zero calibration values.
pub fn apply_ev_calibration(lookup: &mut DetectorSampleByPmc, calibration: &EvCalibration) -> Result<()> {
    for (pmc, samples) in lookup.iter_mut() {
        for sample in samples.iter_mut() {
            let detector = sample.detector_id().ok_or_else(|| {
                IngestError::Integrity(format!("Failed to determine detector ID for PMC: {pmc}"))
            })?;
            let (xperchan, offset) = calibration.for_detector(detector);
            if xperchan != 0.0 {
                sample.set_meta(META_XPERCHAN, xperchan);
            }
            if offset != 0.0 {
                sample.set_meta(META_OFFSET, offset);
            }
        }
    }
    Ok(())
}

#[derive(Default)]
struct Accumulator {
    bulk: Vec<i64>,
    max: Vec<i64>,
    xperchan: (f32, u32),
    offset: (f32, u32),
    live_time: (f32, u32),
}

impl Accumulator {
    fn add(&mut self, pmc: Pmc, sample: &DetectorSample) -> Result<()> {
        if self.bulk.is_empty() {
            self.bulk = vec![0; sample.spectrum.len()];
            self.max = vec![0; sample.spectrum.len()];
        } else if sample.spectrum.len() != self.bulk.len() {
            return Err(IngestError::Integrity(format!(
                "PMC {pmc} has {} channels, expected {} when summing spectra",
                sample.spectrum.len(),
                self.bulk.len()
            )));
        }

        let float = |label: &str| sample.meta.get(label).and_then(MetaValue::as_f32);
        if let Some(v) = float(META_XPERCHAN) {
            self.xperchan.0 += v;
            self.xperchan.1 += 1;
        }
        if let Some(v) = float(META_OFFSET) {
            self.offset.0 += v;
            self.offset.1 += 1;
        }
        if let Some(v) = float(META_LIVETIME) {
            self.live_time.0 += v;
            self.live_time.1 += 1;
        }

        for (i, &count) in sample.spectrum.iter().enumerate() {
            self.bulk[i] += count;
            self.max[i] = self.max[i].max(count);
        }
        Ok(())
    }

    fn samples(self, pmc: Pmc, detector: DetectorId, calibration: (f32, f32)) -> [DetectorSample; 2] {
        let mut meta = MetaData::new();
        meta.insert(META_PMC.to_string(), MetaValue::Int(pmc));
        meta.insert(META_DETECTOR_ID.to_string(), detector.as_str().into());
        meta.insert(META_SOURCEFILE.to_string(), GENERATED_SOURCE_FILE.into());

        let averaged = |(sum, count): (f32, u32), fallback: f32| {
            if count > 0 {
                Some(sum / count as f32)
            } else if fallback != 0.0 {
                Some(fallback)
            } else {
                None
            }
        };
        if let Some(x) = averaged(self.xperchan, calibration.0) {
            meta.insert(META_XPERCHAN.to_string(), MetaValue::Float(x));
        }
        if let Some(x) = averaged(self.offset, calibration.1) {
            meta.insert(META_OFFSET.to_string(), MetaValue::Float(x));
        }

        let mut bulk_meta = meta.clone();
        bulk_meta.insert(META_READTYPE.to_string(), ReadType::BulkSum.as_str().into());
        bulk_meta.insert(META_LIVETIME.to_string(), MetaValue::Float(self.live_time.0));

        let mut max_meta = meta;
        max_meta.insert(META_READTYPE.to_string(), ReadType::MaxValue.as_str().into());
        max_meta.insert(
            META_LIVETIME.to_string(),
            MetaValue::Float(self.live_time.0 / self.live_time.1.max(1) as f32),
        );

        [
            DetectorSample::new(bulk_meta, self.bulk),
            DetectorSample::new(max_meta, self.max),
        ]
    }
}

/// Synthesize bulk-sum and max-value spectra over every sample in `lookup`.
///
/// Returns the synthetic PMC (one past the shot count) and the samples in
/// the order bulk A, bulk B, max A, max B. Fails when a detector's spectra
/// differ in channel count, or when the synthetic PMC is already a shot.
pub fn make_bulk_max(
    lookup: &DetectorSampleByPmc,
    calibration: &EvCalibration,
) -> Result<(Pmc, Vec<DetectorSample>)> {
    let pmc = lookup.len() as Pmc + 1;
    if lookup.contains_key(&pmc) {
        return Err(IngestError::Integrity(format!(
            "Bulk/max PMC {pmc} collides with an existing shot"
        )));
    }

    let mut a = Accumulator::default();
    let mut b = Accumulator::default();

    for (&shot, samples) in lookup {
        for sample in samples {
            match sample.detector_id() {
                Some(DetectorId::A) => a.add(shot, sample)?,
                Some(DetectorId::B) => b.add(shot, sample)?,
                None => {}
            }
        }
    }

    let [bulk_a, max_a] = a.samples(pmc, DetectorId::A, calibration.for_detector(DetectorId::A));
    let [bulk_b, max_b] = b.samples(pmc, DetectorId::B, calibration.for_detector(DetectorId::B));
    Ok((pmc, vec![bulk_a, bulk_b, max_a, max_b]))
}

/// Linear mapping of stage X/Y to image i/j, parsed from
/// `"xscale,xbias,yscale,ybias"`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BeamParams {
    /// Multiplier applied to X
    pub x_scale: f32,
    /// Added to scaled X
    pub x_bias: f32,
    /// Multiplier applied to Y
    pub y_scale: f32,
    /// Added to scaled Y
    pub y_bias: f32,
}

impl FromStr for BeamParams {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f32>()
                    .map_err(|_| IngestError::Parse(format!("Invalid beam params: {s}")))
            })
            .collect::<Result<Vec<f32>>>()?;
        match values.as_slice() {
            [x_scale, x_bias, y_scale, y_bias] => Ok(Self {
                x_scale: *x_scale,
                x_bias: *x_bias,
                y_scale: *y_scale,
                y_bias: *y_bias,
            }),
            _ => Err(IngestError::Parse(format!(
                "Expected 4 beam params, got {}: {s}",
                values.len()
            ))),
        }
    }
}

/// Generate beam locations from each shot's first sample `X/Y/ZPOSITION`,
/// projected onto `image_pmc`.
pub fn beam_from_spectra(
    lookup: &DetectorSampleByPmc,
    params: &BeamParams,
    image_pmc: Pmc,
) -> Result<BeamLocationByPmc> {
    let mut beams = BeamLocationByPmc::new();

    for (pmc, samples) in lookup {
        let Some(first) = samples.first() else {
            continue;
        };
        let position = |label: &str| match first.meta.get(label) {
            Some(MetaValue::Float(v)) => Ok(*v),
            _ => Err(IngestError::Parse(format!(
                "Error generating beam location, pmc: {pmc} x/y/z position was not float"
            ))),
        };
        let (x, y, z) = (
            position(META_XPOSITION)?,
            position(META_YPOSITION)?,
            position(META_ZPOSITION)?,
        );

        let mut beam = BeamLocation {
            x,
            y,
            z,
            ..Default::default()
        };
        beam.ij.insert(
            image_pmc,
            BeamLocationProj {
                i: x * params.x_scale + params.x_bias,
                j: y * params.y_scale + params.y_bias,
            },
        );
        beams.insert(*pmc, beam);
    }

    Ok(beams)
}
