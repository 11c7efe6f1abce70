use std::path::{Path, PathBuf};

use log::info;

use crate::error::{IngestError, Result, ResultExt};
use crate::gds::FileNameMeta;
use crate::model::{
    DetectorSample, DetectorSampleByPmc, MetaData, MetaValue, Pmc, ReadType, META_DETECTOR_ID,
    META_PMC, META_READTYPE,
};
use crate::readers::{read_csv, read_csv_from_offset, read_file_lines, read_msa_lines};

const META_HEADER: [&str; 12] = [
    "SCLK_A",
    "SCLK_B",
    "PMC",
    "real_time_A",
    "real_time_B",
    "live_time_A",
    "live_time_B",
    "yellow_piece_temp",
    "XPERCHAN_A",
    "XPERCHAN_B",
    "OFFSET_A",
    "OFFSET_B",
];
const META_HEADER_NO_YELLOW: [&str; 11] = [
    "SCLK_A",
    "SCLK_B",
    "PMC",
    "real_time_A",
    "real_time_B",
    "live_time_A",
    "live_time_B",
    "XPERCHAN_A",
    "XPERCHAN_B",
    "OFFSET_A",
    "OFFSET_B",
];
const POSITION_HEADER: [&str; 4] = ["PMC", "x", "y", "z"];
const A_TABLE_START: [&str; 5] = ["A_1", "A_2", "A_3", "A_4", "A_5"];
const B_TABLE_START: [&str; 5] = ["B_1", "B_2", "B_3", "B_4", "B_5"];

/// Read a stacked-table spectra CSV (metadata, positions, A and B channel
/// tables, optionally repeated for dwell spectra).
pub fn read_spectra_csv(path: &Path) -> Result<DetectorSampleByPmc> {
    let rows = read_csv(path, 0, b',')?;
    parse_spectra_rows(&rows).with_context(|| format!("Spectra CSV: {}", path.display()))
}

/// Like [`read_spectra_csv`], for a table embedded at a byte offset.
pub fn read_spectra_csv_from_offset(path: &Path, byte_offset: u64) -> Result<DetectorSampleByPmc> {
    let rows = read_csv_from_offset(path, byte_offset, b',')?;
    parse_spectra_rows(&rows).with_context(|| format!("Spectra CSV: {}", path.display()))
}

fn is_meta_header(row: &[String]) -> bool {
    row_equals(row, &META_HEADER) || row_equals(row, &META_HEADER_NO_YELLOW)
}

fn row_equals(row: &[String], expected: &[&str]) -> bool {
    row.len() == expected.len() && row.iter().zip(expected).all(|(a, b)| a == b)
}

fn row_starts_with(row: &[String], expected: &[&str]) -> bool {
    row.len() > expected.len() && row.iter().zip(expected).all(|(a, b)| a == b)
}

/// Parse rows of a spectra CSV. Dwell samples are appended after the normal
/// samples of the same shot.
pub fn parse_spectra_rows(rows: &[Vec<String>]) -> Result<DetectorSampleByPmc> {
    let dwell_start = rows
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| is_meta_header(row))
        .map(|(idx, _)| idx);

    let (normal_rows, dwell_rows) = match dwell_start {
        Some(idx) => rows.split_at(idx),
        None => (rows, &rows[rows.len()..]),
    };

    let mut result = parse_spectra_half(normal_rows, ReadType::Normal)?;
    if dwell_rows.is_empty() {
        return Ok(result);
    }

    let dwell = parse_spectra_half(dwell_rows, ReadType::Dwell)?;
    for (pmc, samples) in dwell {
        match result.get_mut(&pmc) {
            Some(existing) => existing.extend(samples),
            None => return Err(IngestError::UnmatchedDwell(pmc)),
        }
    }
    Ok(result)
}

enum ChannelTable {
    A,
    B,
}

fn parse_spectra_half(rows: &[Vec<String>], read_type: ReadType) -> Result<DetectorSampleByPmc> {
    let Some((header, body)) = rows.split_first() else {
        return Err(IngestError::Schema("Spectra CSV is empty".to_string()));
    };
    if !is_meta_header(header) {
        return Err(IngestError::Schema(format!(
            "Unexpected columns in metadata table: {}",
            header.join(",")
        )));
    }

    let mut result = DetectorSampleByPmc::new();
    let mut row_pmcs: Vec<Pmc> = Vec::new();

    let mut table: Option<(ChannelTable, usize)> = None;
    let mut channel_count = 0;
    let mut reading_positions = false;
    let mut found_a = false;
    let mut found_b = false;
    let mut a_rows = 0;
    let mut b_rows = 0;

    for (idx, row) in body.iter().enumerate() {
        let row_no = idx + 1;

        if row_starts_with(row, &A_TABLE_START) {
            found_a = true;
            reading_positions = false;
            channel_count = row.len();
            table = Some((ChannelTable::A, idx + 1));
        } else if row_starts_with(row, &B_TABLE_START) {
            if !found_a {
                return Err(IngestError::Schema(format!(
                    "row {row_no} - Found B table without seeing A table first"
                )));
            }
            if row.len() != channel_count {
                return Err(IngestError::Schema(format!(
                    "row {row_no} - differing channel count found, A was {channel_count}, B is {}",
                    row.len()
                )));
            }
            found_b = true;
            reading_positions = false;
            table = Some((ChannelTable::B, idx + 1));
        } else if let Some((which, first_row)) = &table {
            if row.len() != channel_count {
                return Err(IngestError::Schema(format!(
                    "row {row_no} - expected {channel_count} channel values, found {}",
                    row.len()
                )));
            }

            let pmc = *row_pmcs.get(idx - first_row).ok_or_else(|| {
                IngestError::Schema(format!(
                    "row {row_no} - more channel rows than metadata rows"
                ))
            })?;

            let detector_idx = match which {
                ChannelTable::A => {
                    a_rows += 1;
                    0
                }
                ChannelTable::B => {
                    b_rows += 1;
                    1
                }
            };

            let spectrum = row
                .iter()
                .enumerate()
                .map(|(col, value)| {
                    value.parse::<i32>().map(i64::from).map_err(|_| {
                        IngestError::Parse(format!(
                            "row {row_no}, col {} - failed to read value, got: {value}",
                            col + 1
                        ))
                    })
                })
                .collect::<Result<Vec<i64>>>()?;

            if let Some(sample) = result.get_mut(&pmc).and_then(|s| s.get_mut(detector_idx)) {
                sample.spectrum = spectrum;
            }
        } else if reading_positions {
            continue;
        } else if row_equals(row, &POSITION_HEADER) {
            reading_positions = true;
        } else {
            let (pmc, samples) = parse_meta_row(header, row, read_type)
                .with_context(|| format!("row {row_no}"))?;
            if result.contains_key(&pmc) {
                return Err(IngestError::DuplicateShotId(pmc).context("metadata table"));
            }
            row_pmcs.push(pmc);
            result.insert(pmc, samples);
        }
    }

    if !found_a || !found_b {
        return Err(IngestError::Schema("Did not find both A and B tables".to_string()));
    }
    if a_rows == 0 || a_rows != b_rows {
        return Err(IngestError::Schema(format!(
            "A table had {a_rows} rows, B had {b_rows}"
        )));
    }
    Ok(result)
}

fn parse_meta_row(
    header: &[String],
    row: &[String],
    read_type: ReadType,
) -> Result<(Pmc, Vec<DetectorSample>)> {
    if row.len() != header.len() {
        return Err(IngestError::Schema(format!(
            "expected {} metadata items in row, got: {}",
            header.len(),
            row.len()
        )));
    }

    let mut meta_a = MetaData::new();
    let mut meta_b = MetaData::new();
    meta_a.insert(META_DETECTOR_ID.to_string(), MetaValue::from("A"));
    meta_b.insert(META_DETECTOR_ID.to_string(), MetaValue::from("B"));
    meta_a.insert(META_READTYPE.to_string(), MetaValue::from(read_type.as_str()));
    meta_b.insert(META_READTYPE.to_string(), MetaValue::from(read_type.as_str()));

    let mut pmc = 0;
    for (name, value) in header.iter().zip(row) {
        let name = name.as_str();
        if name == META_PMC {
            pmc = value
                .parse::<Pmc>()
                .map_err(|_| IngestError::Parse(format!("expected PMC, got: {value}")))?;
            meta_a.insert(META_PMC.to_string(), MetaValue::Int(pmc));
            meta_b.insert(META_PMC.to_string(), MetaValue::Int(pmc));
            continue;
        }
        if name == "yellow_piece_temp" {
            continue;
        }

        let (label, target) = match name.rsplit_once('_') {
            Some((base, "A")) => (base, &mut meta_a),
            Some((base, "B")) => (base, &mut meta_b),
            _ => {
                return Err(IngestError::Schema(format!(
                    "Unexpected meta column name: {name}"
                )))
            }
        };

        let (label, typed) = match label {
            "SCLK" => (
                "SCLK",
                MetaValue::Int(value.parse().map_err(|_| {
                    IngestError::Parse(format!("expected SCLK, got: {value}"))
                })?),
            ),
            "real_time" | "live_time" | "XPERCHAN" | "OFFSET" => {
                let renamed = match label {
                    "real_time" => "REALTIME",
                    "live_time" => "LIVETIME",
                    other => other,
                };
                let v: f32 = value.parse().map_err(|_| {
                    IngestError::Parse(format!("{name} expected float, got: {value}"))
                })?;
                (renamed, MetaValue::Float(v))
            }
            _ => {
                return Err(IngestError::Schema(format!(
                    "Unexpected meta column name: {name}"
                )))
            }
        };
        target.insert(label.to_string(), typed);
    }

    Ok((
        pmc,
        vec![
            DetectorSample::new(meta_a, Vec::new()),
            DetectorSample::new(meta_b, Vec::new()),
        ],
    ))
}

/// Read the bulk-sum (`RBS`) and max-value (`RMS`) MSA files. Each yields an
/// A and a B sample stamped with the PMC from its file name.
pub fn read_bulk_max_spectra(paths: &[PathBuf]) -> Result<DetectorSampleByPmc> {
    let mut result = DetectorSampleByPmc::new();

    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let file_meta = FileNameMeta::parse(name).with_context(|| path.display().to_string())?;

        let read_type = match file_meta.prod_type.as_str() {
            "RBS" => ReadType::BulkSum,
            "RMS" => ReadType::MaxValue,
            other => {
                return Err(IngestError::Parse(format!(
                    "Unexpected bulk/max MSA product type: {other}"
                )))
            }
        };
        let pmc = file_meta.pmc()?;

        info!("  Reading {} MSA: {}", read_type, path.display());
        let lines = read_file_lines(path)?;
        let mut samples = read_msa_lines(&lines, false, false, false)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        for (idx, sample) in samples.iter_mut().enumerate() {
            sample.set_meta(META_READTYPE, read_type.as_str());
            sample.set_meta(META_DETECTOR_ID, if idx == 0 { "A" } else { "B" });
            sample.set_meta(META_PMC, pmc);
        }

        result.entry(pmc).or_default().extend(samples);
    }

    Ok(result)
}
