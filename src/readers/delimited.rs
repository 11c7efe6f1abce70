use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{IngestError, Result, ResultExt};

/// Rows of a delimited file, every field left-trimmed
pub type CsvRows = Vec<Vec<String>>;

/// Read a delimited file that may hold several stacked tables.
///
/// The first `header_skip_lines` physical lines are dropped before parsing.
/// Rows may differ in width. A file that yields no rows is an error.
pub fn read_csv(path: &Path, header_skip_lines: usize, separator: u8) -> Result<CsvRows> {
    let file = File::open(path).with_context(|| path.display().to_string())?;
    let mut reader = BufReader::new(file);

    let mut skipped = Vec::new();
    for _ in 0..header_skip_lines {
        skipped.clear();
        if reader.read_until(b'\n', &mut skipped)? == 0 {
            break;
        }
    }

    let rows = read_csv_rows(reader, separator).with_context(|| path.display().to_string())?;
    if rows.is_empty() {
        return Err(IngestError::EmptyFile(path.display().to_string()));
    }
    Ok(rows)
}

/// Like [`read_csv`], but starts at a byte offset into the file. The offset is
/// turned into a line skip, so it must point at the start of a line.
pub fn read_csv_from_offset(path: &Path, byte_offset: u64, separator: u8) -> Result<CsvRows> {
    let file = File::open(path).with_context(|| path.display().to_string())?;
    let mut prefix = Vec::new();
    file.take(byte_offset).read_to_end(&mut prefix)?;

    let skip = prefix.iter().filter(|b| **b == b'\n').count();
    read_csv(path, skip, separator)
}

/// Parse delimited rows from any reader.
pub fn read_csv_rows<R: Read>(reader: R, separator: u8) -> Result<CsvRows> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), csv::ErrorKind::UnequalLengths { .. }) => continue,
            Err(e) => return Err(e.into()),
        };
        rows.push(record.iter().map(|f| f.trim_start().to_string()).collect());
    }
    Ok(rows)
}

/// All lines of a text file. Invalid UTF-8 is replaced rather than rejected.
pub fn read_file_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| path.display().to_string())?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}
