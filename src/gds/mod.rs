//! # Instrument File Names
//!
//! Every PIXL product file name is a fixed 58-character record. This module
//! splits it into fields, decodes the compact site/drive/version encodings,
//! and picks the latest version among sibling products.
//!
//! ```rust
//! use pixl_ingest::gds::FileNameMeta;
//!
//! let meta = FileNameMeta::parse("PS__D077T0637741109_000RPM_N001003600098356100640__J01.CSV")?;
//! assert_eq!(meta.pmc()?, 64);
//! assert_eq!(meta.sclk()?, 637741109);
//! assert_eq!(meta.sol(), "D077");
//! # Ok::<(), pixl_ingest::gds::FileNameError>(())
//! ```

mod error;
mod filename;
mod ids;
mod versions;

#[cfg(test)]
mod tests;

pub use error::FileNameError;
pub use filename::{make_comparable_name, FileNameMeta, GDS_FILE_NAME_LENGTH};
pub use ids::{decode_drive_id, decode_site_id, decode_version};
pub use versions::{latest_file_versions, lowest_sclk};
