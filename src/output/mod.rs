//! # Output
//!
//! Turns a [`CanonicalScan`](crate::model::CanonicalScan) into published
//! outputs:
//!
//! 1. [`ArtifactBuilder`] flattens the scan into a [`ScanArtifact`] with a
//!    local meta label dictionary and [`zero_run`]-compressed spectra.
//! 2. [`codec`] writes the artifact as `dataset.bin`, a little-endian
//!    length-prefixed binary layout.
//! 3. [`publish_images`] copies or converts the scan's images.
//! 4. A [`CatalogStore`] receives image records, per-image beam locations,
//!    the [`ScanRecord`] summary, ownership and the default image.
//!
//! [`ScanSaver::stage`] runs steps 1 to 3 and [`StagedScan::commit`] runs
//! step 4, so files can be moved into place before the catalog sees them.
//! [`ScanSaver::save`] runs both.

mod artifact;
mod catalog;
pub mod codec;
mod error;
mod images;
mod saver;
mod summary;
pub mod zero_run;


pub use artifact::{
    ArtifactBuilder, ContextImageCoordinateInfo, Coordinate2D, DetectorSpectrum, Location,
    LocationBeam, MatchedContextImageInfo, MetaItem, PseudoIntensityData, ScanArtifact,
};
pub use catalog::{
    AutoShareEntry, BeamCoordinate, CatalogStore, ImageBeamLocations, ImageLocationsForScan,
    InsertOutcome, JsonFileCatalog, MemoryCatalog, OwnershipRecord, UserGroupList,
};
pub use error::CodecError;
pub use images::{
    publish_images, CommandImageConverter, ImageConverter, ImageMatchTransform, ImagePurpose,
    ImageRecord, ImageSource, PublishedImages,
};
pub use saver::{SaveReport, ScanSaver, StagedScan, DATASET_FILE_NAME};
pub use summary::{make_scan_summary, ScanDataType, ScanRecord, ScanTypeCount};
