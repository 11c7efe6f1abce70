//! Reader for EMSA/MAS spectrum files (`*.msa`).
//!
//! ```text
//! #FORMAT      : EMSA/MAS Spectral Data File
//! #NPOINTS     : 4096
//! #NCOLUMNS    : 2       Number of data columns
//! #XPERCHAN    :  10.0, 10.0    eV per channel
//! #DATATYPE    : YY
//! #SPECTRUM    :
//! 0, 0
//! 12, 9
//! #ENDOFDATA   :
//! ```
//!
//! A single-detector file carries one column (`DATATYPE: Y`) and its own
//! `DETECTOR_ID`. A dual-detector file carries two columns and per-detector
//! values such as `XPERCHAN` written as `a, b`, which are split into two samples.

use crate::model::{
    DetectorSample, MetaData, MetaValue, META_DETECTOR_ID, META_LIVETIME, META_OFFSET, META_PMC,
    META_REALTIME, META_XPERCHAN,
};

const SPECTRUM_START: &str = "#SPECTRUM";
const SPECTRUM_END: &str = "#ENDOFDATA";

const INT_LABELS: [&str; 3] = ["PMC", "SCLK", "RTT"];
const FLOAT_LABELS: [&str; 7] = [
    "XPERCHAN",
    "OFFSET",
    "LIVETIME",
    "REALTIME",
    "XPOSITION",
    "YPOSITION",
    "ZPOSITION",
];
const PER_DETECTOR_LABELS: [&str; 13] = [
    "XPERCHAN",
    "OFFSET",
    "LIVETIME",
    "REALTIME",
    "TRIGGERS",
    "EVENTS",
    "KETEK_ICR",
    "KETEK_OCR",
    "OVERFLOWS",
    "UNDERFLOWS",
    "BASE_EVENTS",
    "RESETS",
    "OVER_ADCMAX",
];

/// Errors reading an MSA file
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MsaError {
    /// A non-comment key appeared twice
    #[error("Duplicate meta data lines found for: {0}")]
    DuplicateMeta(String),

    /// `DATATYPE` did not match the detector mode
    #[error("Expected DATATYPE \"{0}\" in MSA metadata")]
    DatatypeMismatch(&'static str),

    /// Column count did not match the detector mode
    #[error("Expected {expected} columns, got {found} at line {line}")]
    NColumnsMismatch {
        /// Column count the mode requires
        expected: usize,
        /// Column count found
        found: usize,
        /// 1-based line number
        line: usize,
    },

    /// `PMC` header present in a file that should not carry one
    #[error("PMC NOT expected, but was found in MSA")]
    UnexpectedPmc,

    /// `PMC` header missing from a file that must carry one
    #[error("PMC expected, but not found in MSA")]
    MissingPmc,

    /// Number of data rows differs from `NPOINTS`
    #[error("Expected {expected} spectra, got {found}")]
    WrongPointCount {
        /// `NPOINTS` value
        expected: usize,
        /// Rows read
        found: usize,
    },

    /// Data row before `#SPECTRUM`
    #[error("Unexpected potential spectra found at line {line}: {text}")]
    UnexpectedSpectra {
        /// 1-based line number
        line: usize,
        /// Offending line
        text: String,
    },

    /// A required header key is missing
    #[error("Failed to find {0} in metadata")]
    MissingRequiredMeta(&'static str),

    /// No data rows
    #[error("No spectra data found to be read")]
    EmptyInput,

    /// Header line without `#` or `:`, or a header inside the data block
    #[error("Failed to parse metadata line: {0}")]
    BadMetaLine(String),

    /// `DETECTOR_ID` header in a dual-detector file
    #[error("Unexpected DETECTOR_ID in multi-detector MSA")]
    UnexpectedDetectorId,

    /// `#SPECTRUM` seen twice
    #[error("Unexpected spectrum start marker at line {0}")]
    DuplicateSpectrumStart(usize),

    /// `#ENDOFDATA` before `#SPECTRUM`
    #[error("Unexpected end of data marker at line {0}")]
    UnexpectedEndOfData(usize),

    /// Per-detector value did not hold two comma-separated parts
    #[error("Metadata row {0} cannot be split for 2 detectors due to commas")]
    CannotSplitMeta(String),

    /// Value failed to convert to the type its key requires
    #[error("Failed to read {what}, got: {value}")]
    BadValue {
        /// What was being read
        what: String,
        /// Offending text
        value: String,
    },
}

type MsaResult<T> = std::result::Result<T, MsaError>;

/// Parse MSA lines into one sample (single-detector) or two (A, B).
///
/// With `duplicate_a_as_b`, a dual-mode file may carry a single column which is
/// copied to detector B.
pub fn read_msa_lines<S: AsRef<str>>(
    lines: &[S],
    single_detector: bool,
    expect_pmc: bool,
    duplicate_a_as_b: bool,
) -> MsaResult<Vec<DetectorSample>> {
    let mut meta = MetaData::new();
    let mut spectrum_a: Vec<i64> = Vec::new();
    let mut spectrum_b: Vec<i64> = Vec::new();

    let dual_columns = if duplicate_a_as_b { 1 } else { 2 };
    let mut columns = 1;
    let mut reading = false;
    let mut line_no = 0;

    for raw in lines {
        let line = raw.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        line_no += 1;

        if line.starts_with(SPECTRUM_START) {
            if reading {
                return Err(MsaError::DuplicateSpectrumStart(line_no));
            }
            reading = true;

            if single_detector {
                verify_meta(&meta, &["DETECTOR_ID", "NPOINTS", "DATATYPE", "NCOLUMNS"], "Y", 1, line_no)?;
            } else {
                verify_meta(&meta, &["NPOINTS", "DATATYPE", "NCOLUMNS"], "YY", dual_columns, line_no)?;
                if meta.contains_key(META_DETECTOR_ID) {
                    return Err(MsaError::UnexpectedDetectorId);
                }
                columns = dual_columns;
            }
        } else if line.starts_with(SPECTRUM_END) {
            if !reading {
                return Err(MsaError::UnexpectedEndOfData(line_no));
            }
            break;
        } else if line.starts_with('#') {
            if reading {
                return Err(MsaError::BadMetaLine(line.to_string()));
            }

            let (key, value) = parse_meta_line(line)?;
            if let Some(existing) = meta.get_mut(&key) {
                match existing {
                    MetaValue::String(s) if key == "COMMENT" => {
                        s.push(' ');
                        s.push_str(&value);
                    }
                    _ => return Err(MsaError::DuplicateMeta(key)),
                }
            } else if !value.is_empty() {
                let keep_as_string = !single_detector
                    && [META_XPERCHAN, META_OFFSET, META_LIVETIME, META_REALTIME]
                        .contains(&key.as_str());
                let typed = if keep_as_string {
                    MetaValue::String(value)
                } else {
                    make_meta_value(&key, &value)?
                };
                meta.insert(key, typed);
            }
        } else {
            if !reading {
                return Err(MsaError::UnexpectedSpectra {
                    line: line_no,
                    text: line.to_string(),
                });
            }

            let row = parse_spectrum_line(line, line_no, columns)?;
            spectrum_a.push(row[0]);
            if !single_detector {
                spectrum_b.push(if duplicate_a_as_b { row[0] } else { row[1] });
            }
        }
    }

    if spectrum_a.is_empty() {
        return Err(MsaError::EmptyInput);
    }

    let npoints_text = meta_text(&meta, "NPOINTS");
    let npoints: usize = npoints_text.parse().map_err(|_| MsaError::BadValue {
        what: "NPOINTS".to_string(),
        value: npoints_text.clone(),
    })?;

    if spectrum_a.len() != npoints {
        return Err(MsaError::WrongPointCount {
            expected: npoints,
            found: spectrum_a.len(),
        });
    }
    if !single_detector && spectrum_b.len() != npoints {
        return Err(MsaError::WrongPointCount {
            expected: npoints,
            found: spectrum_b.len(),
        });
    }

    match (meta.contains_key(META_PMC), expect_pmc) {
        (true, false) => return Err(MsaError::UnexpectedPmc),
        (false, true) => return Err(MsaError::MissingPmc),
        _ => {}
    }

    if single_detector {
        return Ok(vec![DetectorSample::new(meta, spectrum_a)]);
    }

    let (meta_a, meta_b) = split_for_two_detectors(meta, duplicate_a_as_b)?;
    Ok(vec![
        DetectorSample::new(meta_a, spectrum_a),
        DetectorSample::new(meta_b, spectrum_b),
    ])
}

/// Split a `#KEY : value  trailing text` line into key and value.
pub(super) fn parse_meta_line(line: &str) -> MsaResult<(String, String)> {
    let colon = line
        .find(':')
        .ok_or_else(|| MsaError::BadMetaLine(line.to_string()))?;

    let key = line[..colon].trim();
    let key = key.strip_prefix('#').unwrap_or(key);
    let key = key.strip_prefix('#').unwrap_or(key).to_string();

    let raw = &line[colon + 1..];

    if let Some(pair) = float_pair(raw) {
        return Ok((key, pair));
    }

    let value = if raw.len() > 5 && raw.starts_with("     ") {
        ""
    } else {
        let v = raw.trim_start_matches(' ');
        match v.find("  ") {
            Some(pos) if pos > 0 => &v[..pos],
            _ => v,
        }
    };

    Ok((key, value.trim().to_string()))
}

/// `"10.0,   10.0    eV per channel"` → `"10.0, 10.0"`
fn float_pair(raw: &str) -> Option<String> {
    let mut bits = raw.split(',');
    let first = bits.next()?.trim_matches(' ');
    let second = bits.next()?.trim_matches(' ').split(' ').next()?;

    if first.parse::<f32>().is_ok() && second.parse::<f32>().is_ok() {
        Some(format!("{first}, {second}"))
    } else {
        None
    }
}

fn parse_spectrum_line(line: &str, line_no: usize, columns: usize) -> MsaResult<Vec<i64>> {
    let items: Vec<&str> = line.split(',').collect();
    if items.len() != columns {
        return Err(MsaError::NColumnsMismatch {
            expected: columns,
            found: items.len(),
            line: line_no,
        });
    }

    items
        .iter()
        .map(|item| {
            let item = item.trim();
            match item.parse::<i64>() {
                Ok(v) if v >= 0 => Ok(v),
                _ => Err(MsaError::BadValue {
                    what: format!("spectrum value on line {line_no}"),
                    value: item.to_string(),
                }),
            }
        })
        .collect()
}

fn meta_text(meta: &MetaData, key: &str) -> String {
    match meta.get(key) {
        Some(MetaValue::String(s)) => s.clone(),
        Some(MetaValue::Int(v)) => v.to_string(),
        Some(MetaValue::Float(v)) => v.to_string(),
        None => String::new(),
    }
}

fn verify_meta(
    meta: &MetaData,
    required: &[&'static str],
    datatype: &'static str,
    ncolumns: usize,
    line_no: usize,
) -> MsaResult<()> {
    for key in required {
        if !meta.contains_key(*key) {
            return Err(MsaError::MissingRequiredMeta(key));
        }
    }

    if meta_text(meta, "DATATYPE") != datatype {
        return Err(MsaError::DatatypeMismatch(datatype));
    }

    let ncolumns_text = meta_text(meta, "NCOLUMNS");
    let found: usize = ncolumns_text.parse().map_err(|_| MsaError::BadValue {
        what: "NCOLUMNS".to_string(),
        value: ncolumns_text.clone(),
    })?;
    if found != ncolumns {
        return Err(MsaError::NColumnsMismatch {
            expected: ncolumns,
            found,
            line: line_no,
        });
    }
    Ok(())
}

/// Type a header value by its key: a few keys are integers, a few floats,
/// everything else stays a string.
pub(crate) fn make_meta_value(key: &str, value: &str) -> MsaResult<MetaValue> {
    if INT_LABELS.contains(&key) {
        return parse_int_auto_base(value)
            .map(MetaValue::Int)
            .ok_or_else(|| MsaError::BadValue {
                what: format!("integer for: {key}"),
                value: value.to_string(),
            });
    }
    if FLOAT_LABELS.contains(&key) {
        return value
            .parse::<f32>()
            .map(MetaValue::Float)
            .map_err(|_| MsaError::BadValue {
                what: format!("float for: {key}"),
                value: value.to_string(),
            });
    }
    Ok(MetaValue::String(value.to_string()))
}

/// Integer with its base taken from the prefix: `0x` hex, `0o` or a leading
/// `0` octal, `0b` binary, otherwise decimal.
fn parse_int_auto_base(value: &str) -> Option<i32> {
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest.to_string())
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, lower[1..].to_string())
    } else {
        (10, lower)
    };

    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i64::from_str_radix(&body, radix).ok()?;
    let signed = if negative { -magnitude } else { magnitude };
    i32::try_from(signed).ok()
}

fn split_for_two_detectors(meta: MetaData, duplicate_a_as_b: bool) -> MsaResult<(MetaData, MetaData)> {
    let mut meta_a = MetaData::new();
    let mut meta_b = MetaData::new();
    meta_a.insert(META_DETECTOR_ID.to_string(), MetaValue::from("A"));
    meta_b.insert(META_DETECTOR_ID.to_string(), MetaValue::from("B"));

    for (key, value) in meta {
        match value {
            MetaValue::String(s) if PER_DETECTOR_LABELS.contains(&key.as_str()) => {
                let parts: Vec<&str> = s.trim().split(", ").collect();
                if parts.len() != 2 && !duplicate_a_as_b {
                    return Err(MsaError::CannotSplitMeta(key));
                }
                let b_part = if duplicate_a_as_b { parts[0] } else { parts[1] };
                meta_a.insert(key.clone(), make_meta_value(&key, parts[0].trim())?);
                meta_b.insert(key.clone(), make_meta_value(&key, b_part.trim())?);
            }
            MetaValue::String(s) => {
                let trimmed = MetaValue::String(s.trim().to_string());
                meta_a.insert(key.clone(), trimmed.clone());
                meta_b.insert(key, trimmed);
            }
            other => {
                meta_a.insert(key.clone(), other.clone());
                meta_b.insert(key, other);
            }
        }
    }

    Ok((meta_a, meta_b))
}
