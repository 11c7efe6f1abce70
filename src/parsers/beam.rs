use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::error::{IngestError, Result, ResultExt};
use crate::model::{BeamLocation, BeamLocationByPmc, BeamLocationProj, Pmc};
use crate::readers::read_csv;

/// Lines of preamble allowed before the `PMC,` header row
const MAX_PREAMBLE_LINES: usize = 4;

const GEOM_CORR: &str = "geom_corr";

/// Column layout of a beam location CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamHeader {
    /// `(image PMC, i column, j column)` for every recorded projection, in header order
    pub ij_columns: Vec<(Pmc, usize, usize)>,
    /// Index of the `geom_corr` column, if present
    pub geom_corr_col: Option<usize>,
}

impl BeamHeader {
    /// Parse a header row.
    ///
    /// In legacy mode the columns are exactly `PMC,x,y,z,image_i,image_j` and the
    /// projection is attributed to `main_image_pmc`. In multi mode the first
    /// four columns are `PMC,x,y,z`, followed by `PMC_<N>_<MCC|corr>_<i|j>` pairs
    /// with `geom_corr` and any of `ignore_columns` mixed in.
    pub fn parse(
        header: &[String],
        expect_multiple_ij: bool,
        main_image_pmc: Pmc,
        ignore_columns: &[&str],
    ) -> Result<Self> {
        let mut expected = vec!["PMC", "x", "y", "z"];
        let mut geom_corr_col = None;
        let is_skipped = |name: &str| name == GEOM_CORR || ignore_columns.contains(&name);

        if !expect_multiple_ij {
            expected.extend(["image_i", "image_j"]);
        } else {
            let mut remaining = header.len() as i64 - expected.len() as i64;
            for (idx, name) in header.iter().enumerate() {
                if name == GEOM_CORR {
                    geom_corr_col = Some(idx);
                }
                if is_skipped(name.as_str()) {
                    remaining -= 1;
                }
            }
            if remaining <= 0 || remaining % 2 != 0 {
                return Err(IngestError::UnexpectedIJColumnCount(remaining.max(0) as usize));
            }
        }

        for (idx, exp) in expected.iter().enumerate() {
            let got = header.get(idx).map(String::as_str).unwrap_or("");
            if got != *exp {
                return Err(IngestError::Schema(format!(
                    "Expected column {exp}, got: {got}"
                )));
            }
        }

        if !expect_multiple_ij {
            return Ok(Self {
                ij_columns: vec![(main_image_pmc, 4, 5)],
                geom_corr_col: None,
            });
        }

        let mut ij_columns = Vec::new();
        let mut idx = expected.len();
        while idx < header.len() {
            if is_skipped(header[idx].as_str()) {
                idx += 1;
                continue;
            }

            let (pmc, kind, coord) = split_ij_column(&header[idx])?;
            let next = header.get(idx + 1).map(String::as_str).unwrap_or("");
            let (pmc2, kind2, coord2) = split_ij_column(next).map_err(|_| {
                IngestError::UnexpectedColumnOrder {
                    current: header[idx].clone(),
                    next: next.to_string(),
                }
            })?;

            if pmc != pmc2 || kind != kind2 || coord != "i" || coord2 != "j" {
                return Err(IngestError::UnexpectedColumnOrder {
                    current: header[idx].clone(),
                    next: next.to_string(),
                });
            }

            if kind == "MCC" {
                ij_columns.push((pmc, idx, idx + 1));
            }
            idx += 2;
        }

        Ok(Self {
            ij_columns,
            geom_corr_col,
        })
    }

    /// Image PMCs in header order
    pub fn image_pmcs(&self) -> Vec<Pmc> {
        self.ij_columns.iter().map(|(pmc, _, _)| *pmc).collect()
    }
}

/// `PMC_<N>_<MCC|corr>_<i|j>` → `(N, kind, coord)`
fn split_ij_column(name: &str) -> Result<(Pmc, &str, &str)> {
    let bits: Vec<&str> = name.split('_').collect();
    if bits.len() == 4
        && bits[0] == "PMC"
        && matches!(bits[2], "MCC" | "corr")
        && matches!(bits[3], "i" | "j")
    {
        if let Ok(pmc) = bits[1].parse::<Pmc>() {
            return Ok((pmc, bits[2], bits[3]));
        }
    }
    Err(IngestError::Schema(format!("Unexpected column: {name}")))
}

/// Read a beam location CSV.
///
/// Returns the locations by shot and the image PMCs the projections refer to,
/// in header order.
pub fn read_beam_locations(
    path: &Path,
    expect_multiple_ij: bool,
    main_image_pmc: Pmc,
    ignore_columns: &[&str],
) -> Result<(BeamLocationByPmc, Vec<Pmc>)> {
    let preamble = find_header_line(path).with_context(|| path.display().to_string())?;
    let rows = read_csv(path, preamble, b',')?;

    parse_beam_rows(&rows, expect_multiple_ij, main_image_pmc, ignore_columns)
        .with_context(|| path.display().to_string())
}

fn find_header_line(path: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    for (idx, line) in reader.lines().enumerate() {
        if line?.starts_with("PMC,") {
            return Ok(idx);
        }
        if idx >= MAX_PREAMBLE_LINES {
            break;
        }
    }
    Err(IngestError::Schema(
        "Failed to find header row of beam location data".to_string(),
    ))
}

/// Parse beam rows, the first of which is the header.
pub fn parse_beam_rows(
    rows: &[Vec<String>],
    expect_multiple_ij: bool,
    main_image_pmc: Pmc,
    ignore_columns: &[&str],
) -> Result<(BeamLocationByPmc, Vec<Pmc>)> {
    let Some((header, body)) = rows.split_first() else {
        return Err(IngestError::Schema("Beam location file has no header".to_string()));
    };
    let header = BeamHeader::parse(header, expect_multiple_ij, main_image_pmc, ignore_columns)?;
    debug!("Beam location header has {} image projections", header.ij_columns.len());

    let mut result = BeamLocationByPmc::new();
    for (idx, row) in body.iter().enumerate() {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }

        let (pmc, loc) = parse_beam_row(row, &header).with_context(|| format!("row {}", idx + 1))?;
        if result.insert(pmc, loc).is_some() {
            return Err(IngestError::DuplicateShotId(pmc).context(format!("row {}", idx + 1)));
        }
    }

    Ok((result, header.image_pmcs()))
}

fn parse_beam_row(row: &[String], header: &BeamHeader) -> Result<(Pmc, BeamLocation)> {
    let pmc_text = cell(row, 0)?;
    let pmc: Pmc = pmc_text
        .parse()
        .map_err(|_| IngestError::Parse(format!("Failed to read PMC: {pmc_text}")))?;

    let mut loc = BeamLocation {
        x: float_cell(row, 1, "x")?,
        y: float_cell(row, 2, "y")?,
        z: float_cell(row, 3, "z")?,
        ..Default::default()
    };

    if let Some(col) = header.geom_corr_col {
        loc.geom_corr = float_cell(row, col, GEOM_CORR)?;
    }

    for (image_pmc, i_col, j_col) in &header.ij_columns {
        loc.ij.insert(
            *image_pmc,
            BeamLocationProj {
                i: float_cell(row, *i_col, "i")?,
                j: float_cell(row, *j_col, "j")?,
            },
        );
    }

    Ok((pmc, loc))
}

fn cell(row: &[String], idx: usize) -> Result<&str> {
    row.get(idx)
        .map(String::as_str)
        .ok_or_else(|| IngestError::Parse(format!("Missing column {} in beam location row", idx + 1)))
}

fn float_cell(row: &[String], idx: usize, what: &str) -> Result<f32> {
    let text = cell(row, idx)?;
    text.parse::<f32>()
        .map_err(|_| IngestError::Parse(format!("Failed to read {what} value: {text}")))
}
