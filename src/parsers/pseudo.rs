use std::path::Path;

use crate::error::{IngestError, Result, ResultExt};
use crate::model::{PseudoIntensities, PseudoIntensityRange, Pmc, META_PMC};
use crate::readers::read_csv;

const RANGE_HEADER: [&str; 3] = ["Name", "StartChannel", "EndChannel"];
const DATA_TABLE_START: [&str; 4] = ["pi1", "pi2", "pi3", "pi4"];

/// Read the pseudo-intensity channel window configuration.
pub fn read_pseudo_intensity_ranges(path: &Path) -> Result<Vec<PseudoIntensityRange>> {
    let rows = read_csv(path, 0, b',')?;
    parse_pseudo_intensity_ranges(&rows)
}

/// Parse range rows. The header must be exactly `Name,StartChannel,EndChannel`.
pub fn parse_pseudo_intensity_ranges(rows: &[Vec<String>]) -> Result<Vec<PseudoIntensityRange>> {
    let header_ok = rows.first().is_some_and(|header| {
        header.len() == RANGE_HEADER.len()
            && header.iter().zip(RANGE_HEADER).all(|(a, b)| a.trim() == b)
    });
    if !header_ok {
        return Err(IngestError::UnexpectedHeaders(
            "Pseudo-intensity ranges".to_string(),
        ));
    }

    rows[1..]
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let channel = |col: usize, what: &str| -> Result<i32> {
                row.get(col)
                    .and_then(|v| v.trim().parse().ok())
                    .ok_or_else(|| {
                        IngestError::Parse(format!(
                            "Failed to read {what} value from row {} of pseudo-intensity range file. Got: \"{}\"",
                            idx + 1,
                            row.join(",")
                        ))
                    })
            };
            Ok(PseudoIntensityRange {
                name: row.first().map(|n| n.trim().to_string()).unwrap_or_default(),
                start: channel(1, "start")?,
                end: channel(2, "end")?,
            })
        })
        .collect()
}

/// Read a pseudo-intensity map. The first physical line is a title and is
/// skipped when `skip_title` is set.
pub fn read_pseudo_intensity_file(path: &Path, skip_title: bool) -> Result<PseudoIntensities> {
    let rows = read_csv(path, usize::from(skip_title), b',')?;
    parse_pseudo_intensity_rows(&rows)
        .with_context(|| format!("Pseudo-intensity CSV: {}", path.display()))
}

/// Parse a two-table map: a `PMC` table, then a `pi1,pi2,pi3,pi4,...` table
/// whose rows correspond in order to the PMC rows.
pub fn parse_pseudo_intensity_rows(rows: &[Vec<String>]) -> Result<PseudoIntensities> {
    let first = rows.first().and_then(|r| r.first()).map(String::as_str);
    if first != Some(META_PMC) {
        return Err(IngestError::Schema(format!(
            "expected first table to contain PMCs in first column, found: {}",
            first.unwrap_or_default()
        )));
    }

    let mut pmcs: Vec<Pmc> = Vec::new();
    let mut result = PseudoIntensities::new();
    let mut data_first_row: Option<usize> = None;

    for (idx, row) in rows[1..].iter().enumerate() {
        let row_no = idx + 1;
        if let Some(first_row) = data_first_row {
            let values = row
                .iter()
                .enumerate()
                .map(|(col, v)| {
                    v.parse::<f32>().map_err(|_| {
                        IngestError::Parse(format!(
                            "row {row_no}, col {} - expected pseudointensity value, got: {v}",
                            col + 1
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            let pmc = pmcs.get(idx - first_row).ok_or_else(|| {
                IngestError::Schema(format!(
                    "row {row_no} - more pseudo-intensity rows than PMCs ({})",
                    pmcs.len()
                ))
            })?;
            result.insert(*pmc, values);
        } else if row.len() > DATA_TABLE_START.len()
            && row.iter().zip(DATA_TABLE_START).all(|(a, b)| a == b)
        {
            data_first_row = Some(idx + 1);
        } else {
            let cell = row.first().map(String::as_str).unwrap_or_default();
            let pmc = cell.parse::<Pmc>().map_err(|_| {
                IngestError::Parse(format!("row {row_no} - expected PMC, got: {cell}"))
            })?;
            pmcs.push(pmc);
        }
    }

    if data_first_row.is_none() {
        return Err(IngestError::Schema(
            "Did not find pseudo-intensity data table".to_string(),
        ));
    }
    if result.len() != pmcs.len() {
        return Err(IngestError::Schema(format!(
            "Pseudo-intensity table had {} rows, expected {}",
            result.len(),
            pmcs.len()
        )));
    }
    Ok(result)
}
