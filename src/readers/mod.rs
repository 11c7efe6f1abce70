//! # Primitive Readers
//!
//! Low-level readers shared by every parser:
//!
//! - [`read_csv`]: delimited files that stack several tables of differing
//!   widths, optionally skipping leading lines or starting at a byte offset
//! - [`read_msa_lines`]: EMSA/MAS spectrum files, single or dual detector
//! - [`extract_zip`]: unpacking zipped deliveries

mod archive;
mod delimited;
mod msa;

#[cfg(test)]
mod tests;

pub use archive::extract_zip;
pub use delimited::{read_csv, read_csv_from_offset, read_csv_rows, read_file_lines, CsvRows};
pub(crate) use msa::make_meta_value;
#[cfg(test)]
use msa::parse_meta_line;
pub use msa::{read_msa_lines, MsaError};
