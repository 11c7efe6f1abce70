//! # Ingestion pipeline
//!
//! Runs one scan from an input directory (or `.zip`) through to published
//! outputs:
//!
//! ```text
//! <input> ──unpack──► scratch/input ──import──► CanonicalScan
//!                                                  │ overrides
//!                                                  ▼
//!                      scratch/staged ◄──stage── ScanSaver
//!                            │ move
//!                            ▼
//! <output>/datasets/<scanId>/dataset.bin
//! <output>/images/<scanId>/*
//!                            │ commit
//!                            ▼
//!                         catalog
//! ```
//!
//! Catalog rows are written only once both directories are in place, so a
//! failed move leaves the catalog as it was.
//!
//! The scratch directory is a [`tempfile::TempDir`] created inside the output
//! directory, so publishing is a rename and the scratch space is removed
//! whether the run succeeds or fails.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::TempDir;

use crate::error::{IngestError, Result, ResultExt};
use crate::importer::{import_dir, ImportContext, ImportFormat};
use crate::model::CanonicalScan;
use crate::output::{
    CatalogStore, ImageConverter, InsertOutcome, ScanRecord, ScanSaver, DATASET_FILE_NAME,
};
use crate::readers::extract_zip;

/// Directory under the output root holding one `dataset.bin` directory per scan
pub const DATASETS_DIR: &str = "datasets";
/// Directory under the output root holding one image directory per scan
pub const IMAGES_DIR: &str = "images";

/// Values replacing what the importer read, applied before saving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOverrides {
    /// Scan title
    pub title: Option<String>,
    /// Scan description, stored on the catalog summary
    pub description: Option<String>,
    /// Default context image (destination file name)
    pub default_image: Option<String>,
    /// Detector configuration name
    pub detector_config: Option<String>,
    /// User credited with the import
    pub creator_user_id: Option<String>,
}

impl ScanOverrides {
    /// True if nothing is overridden
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(&self, scan: &mut CanonicalScan) {
        if let Some(title) = &self.title {
            info!("Overriding title: {title}");
            scan.meta.title = title.clone();
        }
        if let Some(image) = &self.default_image {
            info!("Overriding default image: {image}");
            scan.default_context_image = image.clone();
        }
        if let Some(config) = &self.detector_config {
            info!("Overriding detector config: {config}");
            scan.detector_config = config.clone();
        }
        if let Some(creator) = &self.creator_user_id {
            info!("Overriding creator: {creator}");
            scan.creator_user_id = creator.clone();
        }
    }
}

/// One scan to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Input directory or `.zip` archive
    pub input: PathBuf,
    /// Scan id the input is expected to hold
    pub scan_id: String,
    /// Root of the published outputs
    pub output_dir: PathBuf,
    /// Pseudo-intensity ranges CSV
    pub pseudo_intensity_ranges: Option<PathBuf>,
    /// Values applied on top of the imported scan
    pub overrides: ScanOverrides,
}

impl IngestRequest {
    /// Request with no ranges file and no overrides
    pub fn new(
        input: impl Into<PathBuf>,
        scan_id: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            scan_id: scan_id.into(),
            output_dir: output_dir.into(),
            pseudo_intensity_ranges: None,
            overrides: ScanOverrides::default(),
        }
    }

    /// Set the pseudo-intensity ranges file
    pub fn with_pseudo_intensity_ranges(mut self, path: impl Into<PathBuf>) -> Self {
        self.pseudo_intensity_ranges = Some(path.into());
        self
    }

    /// Set the overrides
    pub fn with_overrides(mut self, overrides: ScanOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Final location of the scan's `dataset.bin` directory
    pub fn dataset_dir(&self) -> PathBuf {
        self.output_dir.join(DATASETS_DIR).join(&self.scan_id)
    }

    /// Final location of the scan's image directory
    pub fn image_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_DIR).join(&self.scan_id)
    }
}

/// What a successful ingest produced
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Detected input format
    pub format: ImportFormat,
    /// Published `dataset.bin`
    pub dataset_path: PathBuf,
    /// Published image directory
    pub image_dir: PathBuf,
    /// Size of `dataset.bin`
    pub dataset_bytes: usize,
    /// Number of images published
    pub image_count: usize,
    /// Summary stored in the catalog
    pub summary: ScanRecord,
    /// Whether this run set the default image
    pub default_image: InsertOutcome,
}

/// Directory the importer should read: the input itself, or the extracted
/// archive. An archive holding a single top-level directory is descended into.
fn unpack_input(input: &Path, scratch: &Path) -> Result<PathBuf> {
    if input.is_dir() {
        return Ok(input.to_path_buf());
    }
    if !input.is_file() {
        return Err(IngestError::MissingInput(format!(
            "Input {} does not exist",
            input.display()
        )));
    }

    let is_zip = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(IngestError::UnknownFormat(format!(
            "Input {} is neither a directory nor a zip archive",
            input.display()
        )));
    }

    let dest = scratch.join("input");
    let files = extract_zip(input, &dest)?;
    info!("Extracted {} files from {}", files.len(), input.display());

    let entries: Vec<PathBuf> = fs::read_dir(&dest)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    match entries.as_slice() {
        [only] if only.is_dir() => {
            debug!("Archive has a single root directory {}", only.display());
            Ok(only.clone())
        }
        _ => Ok(dest),
    }
}

/// Move a staged directory over `dst`, replacing any previous contents
fn publish_dir(staged: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if dst.exists() {
        debug!("Replacing {}", dst.display());
        fs::remove_dir_all(dst).with_context(|| format!("Failed to remove {}", dst.display()))?;
    }
    fs::rename(staged, dst).map_err(|e| {
        IngestError::SideEffect(format!(
            "Failed to move {} to {}: {e}",
            staged.display(),
            dst.display()
        ))
    })
}

/// Import, save and publish one scan
///
/// Nothing appears under `request.output_dir/datasets` or `.../images` unless
/// the artifact and every image were written.
pub fn ingest(
    request: &IngestRequest,
    catalog: &mut dyn CatalogStore,
    converter: &dyn ImageConverter,
    now_unix_sec: i64,
) -> Result<IngestReport> {
    fs::create_dir_all(&request.output_dir).with_context(|| {
        format!("Failed to create output directory {}", request.output_dir.display())
    })?;
    let scratch = tempfile::Builder::new()
        .prefix(".pixl-ingest-")
        .tempdir_in(&request.output_dir)
        .context("Failed to create scratch directory")?;
    run(request, &scratch, catalog, converter, now_unix_sec)
}

fn run(
    request: &IngestRequest,
    scratch: &TempDir,
    catalog: &mut dyn CatalogStore,
    converter: &dyn ImageConverter,
    now_unix_sec: i64,
) -> Result<IngestReport> {
    info!("Ingesting scan {} from {}", request.scan_id, request.input.display());

    let input_dir = unpack_input(&request.input, scratch.path())?;
    let work_dir = scratch.path().join("work");
    fs::create_dir_all(&work_dir)?;

    let mut ctx = ImportContext::new(&input_dir, &request.scan_id).with_scratch_dir(&work_dir);
    if let Some(ranges) = &request.pseudo_intensity_ranges {
        ctx = ctx.with_pseudo_intensity_ranges(ranges);
    }

    let (format, mut imported) = import_dir(&ctx)?;
    request.overrides.apply(&mut imported.scan);

    let staged_datasets = scratch.path().join("staged").join(DATASETS_DIR);
    let staged_images = scratch.path().join("staged").join(IMAGES_DIR);
    let mut staged = ScanSaver::stage(
        &imported.scan,
        &imported.image_dir,
        &staged_datasets,
        &staged_images,
        &*catalog,
        converter,
        now_unix_sec,
    )?;

    let dataset_dir = request.dataset_dir();
    let image_dir = request.image_dir();
    // Images are optional, the saver may not have created the directory
    fs::create_dir_all(&staged_images)?;
    publish_dir(&staged_datasets, &dataset_dir)?;
    publish_dir(&staged_images, &image_dir)?;
    staged.relocate(dataset_dir.join(DATASET_FILE_NAME));
    info!(
        "Published scan {} to {} and {}",
        request.scan_id,
        dataset_dir.display(),
        image_dir.display()
    );

    let mut report = staged.commit(catalog)?;
    if let Some(description) = &request.overrides.description {
        info!("Overriding description: {description}");
        report.summary.description = description.clone();
        catalog.upsert_scan(report.summary.clone())?;
    }

    Ok(IngestReport {
        format,
        dataset_path: report.dataset_path,
        image_dir,
        dataset_bytes: report.dataset_bytes,
        image_count: report.images.records.len(),
        summary: report.summary,
        default_image: report.default_image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let mut scan = CanonicalScan::default();
        scan.meta.title = "Imported".to_string();
        scan.detector_config = "PIXL".to_string();

        let overrides = ScanOverrides {
            title: Some("Renamed".to_string()),
            detector_config: Some("PIXL-EM-E2E".to_string()),
            ..Default::default()
        };
        assert!(!overrides.is_empty());
        overrides.apply(&mut scan);

        assert_eq!(scan.meta.title, "Renamed");
        assert_eq!(scan.detector_config, "PIXL-EM-E2E");
        assert!(scan.creator_user_id.is_empty());
        assert!(ScanOverrides::default().is_empty());
    }

    #[test]
    fn test_output_locations() {
        let request = IngestRequest::new("/in", "123", "/out");
        assert_eq!(request.dataset_dir(), PathBuf::from("/out/datasets/123"));
        assert_eq!(request.image_dir(), PathBuf::from("/out/images/123"));
    }

    #[test]
    fn test_unpack_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_input(&dir.path().join("nope"), dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingInput);
    }

    #[test]
    fn test_unpack_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scan.tar");
        fs::write(&file, b"not a zip").unwrap();
        let err = unpack_input(&file, dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnknownFormat);
    }

    #[test]
    fn test_unpack_descends_into_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("scan.zip");
        {
            let file = fs::File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("scan/RSI/a.csv", options).unwrap();
            std::io::Write::write_all(&mut zip, b"x").unwrap();
            zip.finish().unwrap();
        }
        let scratch = tempfile::tempdir().unwrap();
        let root = unpack_input(&archive, scratch.path()).unwrap();
        assert!(root.ends_with("scan"));
        assert!(root.join("RSI").join("a.csv").is_file());
    }

    #[test]
    fn test_publish_dir_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        let dst = dir.path().join("out").join("123");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("new.txt"), b"new").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("old.txt"), b"old").unwrap();

        publish_dir(&staged, &dst).unwrap();
        assert!(dst.join("new.txt").is_file());
        assert!(!dst.join("old.txt").exists());
        assert!(!staged.exists());
    }
}
