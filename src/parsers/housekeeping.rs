use std::path::Path;

use crate::error::{IngestError, Result, ResultExt};
use crate::model::{HousekeepingData, MetaType, MetaValue, Pmc, META_PMC};
use crate::readers::read_csv;

/// Shape of the leading housekeeping table, found by scanning rows until the
/// column count changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HousekeepingLayout {
    /// Column labels, `PMC` excluded
    pub headers: Vec<String>,
    /// Index of the `PMC` column in the raw rows
    pub pmc_col: Option<usize>,
    /// Inferred type of every raw column, `PMC` included
    pub types: Vec<MetaType>,
    /// Rows belonging to the table, header row included
    pub row_count: usize,
}

/// Read a housekeeping CSV, skipping `header_skip_lines` physical lines first.
pub fn read_housekeeping(path: &Path, header_skip_lines: usize) -> Result<HousekeepingData> {
    let rows = read_csv(path, header_skip_lines, b',')?;
    parse_housekeeping_rows(&rows).with_context(|| format!("Housekeeping: {}", path.display()))
}

/// Scan and convert rows already split into cells.
pub fn parse_housekeeping_rows(rows: &[Vec<String>]) -> Result<HousekeepingData> {
    let layout = scan_housekeeping(rows);
    convert_housekeeping(&layout, &rows[1.min(rows.len())..layout.row_count])
}

/// Infer header, `PMC` column and per-column types.
///
/// The first data row fixes each column's type; later rows may only widen
/// it (Int to Float, anything to String).
pub fn scan_housekeeping(rows: &[Vec<String>]) -> HousekeepingLayout {
    let mut layout = HousekeepingLayout {
        headers: Vec::new(),
        pmc_col: None,
        types: Vec::new(),
        row_count: rows.len(),
    };
    let Some(first) = rows.first() else {
        return layout;
    };
    let width = first.len();

    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            layout.row_count = row_idx;
            break;
        }

        for (col, value) in row.iter().enumerate() {
            if row_idx == 0 {
                if value == META_PMC {
                    layout.pmc_col = Some(col);
                } else {
                    layout.headers.push(value.clone());
                }
                continue;
            }

            let found = infer_type(value);
            if row_idx == 1 {
                layout.types.push(found);
            } else {
                let current = &mut layout.types[col];
                let widens = matches!(
                    (*current, found),
                    (MetaType::Int, MetaType::Float) | (_, MetaType::String)
                );
                if widens {
                    *current = found;
                }
            }
        }
    }

    layout
}

fn infer_type(value: &str) -> MetaType {
    if value.parse::<i32>().is_ok() {
        MetaType::Int
    } else if value.parse::<f64>().is_ok() {
        MetaType::Float
    } else {
        MetaType::String
    }
}

/// Convert data rows to typed values using a scanned layout.
pub fn convert_housekeeping(layout: &HousekeepingLayout, data: &[Vec<String>]) -> Result<HousekeepingData> {
    let pmc_col = layout.pmc_col.ok_or_else(|| {
        IngestError::Schema("PMC column is missing from housekeeping table".to_string())
    })?;

    match layout.types.get(pmc_col) {
        Some(MetaType::Int) => {}
        Some(other) => {
            return Err(IngestError::Integrity(format!(
                "PMC column ({pmc_col}) did not parse as integers, got: {other}"
            )))
        }
        None => {
            return Err(IngestError::Schema(
                "Housekeeping table has no data rows".to_string(),
            ))
        }
    }

    let mut result = HousekeepingData {
        header: layout.headers.clone(),
        ..Default::default()
    };

    for (idx, row) in data.iter().enumerate() {
        let row_no = idx + 1;
        if row.len() != layout.types.len() {
            return Err(IngestError::Schema(format!(
                "Row {row_no}: Invalid row item count, expected {}, got {}",
                layout.types.len(),
                row.len()
            )));
        }

        let mut pmc: Pmc = -1;
        let mut values = Vec::with_capacity(row.len().saturating_sub(1));
        for (col, (value, ty)) in row.iter().zip(&layout.types).enumerate() {
            if col == pmc_col {
                pmc = value.parse().unwrap_or(0);
                continue;
            }
            values.push(match ty {
                MetaType::String => MetaValue::String(value.clone()),
                MetaType::Int => MetaValue::Int(value.parse().unwrap_or(0)),
                MetaType::Float => MetaValue::Float(value.parse::<f64>().unwrap_or(0.0) as f32),
            });
        }

        if pmc < 0 {
            return Err(IngestError::Parse(format!("Row {row_no}: Invalid PMC: {pmc}")));
        }
        result.data.insert(pmc, values);
    }

    Ok(result)
}
