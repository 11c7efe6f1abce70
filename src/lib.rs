//! # pixl-ingest - PIXL XRF Scan Ingestion
//!
//! `pixl_ingest` turns raw deliveries from the PIXL X-ray fluorescence
//! instrument into a compact `dataset.bin` artifact, a published image
//! directory and catalog rows describing the scan.
//!
//! ## Key Features
//!
//! - **Four input layouts**: flight model deliveries (data drive and the early
//!   descriptive layout), SOFF/iSDS descriptor bundles, JPL/SBU breadboard
//!   uploads and engineering-model bundles, detected automatically.
//!
//! - **Strict validation**: beam, spectra, housekeeping and pseudo-intensity
//!   files are checked for header layout, duplicate shots, unmatched dwell
//!   spectra and meta type drift before anything is written.
//!
//! - **Compact artifact**: spectra are ZERO-RUN encoded and serialized into a
//!   deterministic little-endian binary layout.
//!
//! - **Staged publishing**: outputs are built in a scratch directory and only
//!   moved into place once complete.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixl_ingest::output::{CommandImageConverter, JsonFileCatalog};
//! use pixl_ingest::pipeline::{ingest, IngestRequest};
//!
//! let request = IngestRequest::new("delivery/", "208601602", "out/")
//!     .with_pseudo_intensity_ranges("ranges.csv");
//! let mut catalog = JsonFileCatalog::open("out/catalog.json")?;
//! let converter = CommandImageConverter::default();
//!
//! let report = ingest(&request, &mut catalog, &converter, 1_700_000_000)?;
//! println!("Wrote {} ({})", report.dataset_path.display(), report.format);
//! # Ok::<(), pixl_ingest::IngestError>(())
//! ```
//!
//! This creates:
//! ```text
//! out/
//! ├── datasets/208601602/dataset.bin
//! ├── images/208601602/*.png
//! └── catalog.json
//! ```
//!
//! ## Architecture
//!
//! - [`gds`]: PIXL product file name codec and version selection
//! - [`readers`]: CSV, MSA and zip primitives
//! - [`parsers`]: beam, spectra, housekeeping, pseudo-intensity and matched image parsers
//! - [`importer`]: format detection and one importer per input layout
//! - [`assembly`]: validation and assembly of a [`model::CanonicalScan`]
//! - [`output`]: artifact building, binary codec, image publishing and catalog
//! - [`pipeline`]: end-to-end ingestion of one scan

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::too_many_arguments)]

pub mod assembly;
pub mod error;
pub mod gds;
pub mod importer;
pub mod model;
pub mod output;
pub mod parsers;
pub mod pipeline;
pub mod readers;

pub use error::{ErrorKind, IngestError, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::assembly::ScanAssembler;
    pub use crate::error::{ErrorKind, IngestError, Result, ResultExt};
    pub use crate::gds::{FileNameError, FileNameMeta};
    pub use crate::importer::{
        detect_format, import_dir, ImportContext, ImportFormat, ImportedScan, Importer,
    };
    pub use crate::model::{CanonicalScan, Pmc, ScanInstrument};
    pub use crate::output::{
        codec, ArtifactBuilder, CatalogStore, CommandImageConverter, ImageConverter,
        JsonFileCatalog, MemoryCatalog, ScanArtifact, ScanSaver,
    };
    pub use crate::pipeline::{ingest, IngestReport, IngestRequest, ScanOverrides};
}
