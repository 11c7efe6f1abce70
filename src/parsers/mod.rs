//! # Role Parsers
//!
//! One parser per input role. Each reads a file (or directory) through the
//! primitive readers and returns the model container for that role:
//!
//! | Role | Function | Returns |
//! |------|----------|---------|
//! | beam | [`read_beam_locations`] | [`BeamLocationByPmc`](crate::model::BeamLocationByPmc) |
//! | spectra | [`read_spectra_csv`] | [`DetectorSampleByPmc`](crate::model::DetectorSampleByPmc) |
//! | bulk/max | [`read_bulk_max_spectra`] | [`DetectorSampleByPmc`](crate::model::DetectorSampleByPmc) |
//! | housekeeping | [`read_housekeeping`] | [`HousekeepingData`](crate::model::HousekeepingData) |
//! | pseudo-intensity | [`read_pseudo_intensity_file`] | [`PseudoIntensities`](crate::model::PseudoIntensities) |
//! | matched images | [`read_matched_images`] | `Vec<MatchedAlignedImage>` |
//!
//! [`msa_dir`] handles directories of individual MSA files and the
//! synthesized spectra and beams that go with them.

mod beam;
mod housekeeping;
mod matched;
pub mod msa_dir;
mod pseudo;
mod spectra;


pub use beam::{parse_beam_rows, read_beam_locations, BeamHeader};
pub use housekeeping::{
    convert_housekeeping, parse_housekeeping_rows, read_housekeeping, scan_housekeeping,
    HousekeepingLayout,
};
pub use matched::read_matched_images;
pub use pseudo::{
    parse_pseudo_intensity_ranges, parse_pseudo_intensity_rows, read_pseudo_intensity_file,
    read_pseudo_intensity_ranges,
};
pub use spectra::{
    parse_spectra_rows, read_bulk_max_spectra, read_spectra_csv, read_spectra_csv_from_offset,
};
