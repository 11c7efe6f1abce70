use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{IngestError, Result, ResultExt};
use crate::model::CanonicalScan;

use super::artifact::{ArtifactBuilder, ScanArtifact};
use super::catalog::{
    BeamCoordinate, CatalogStore, ImageBeamLocations, ImageLocationsForScan, InsertOutcome,
    OwnershipRecord, UserGroupList,
};
use super::codec;
use super::images::{publish_images, ImageConverter, PublishedImages};
use super::summary::{make_scan_summary, ScanRecord};

/// Name of the serialized scan inside its dataset directory
pub const DATASET_FILE_NAME: &str = "dataset.bin";

/// What a save produced
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    /// Path of the written `dataset.bin`
    pub dataset_path: PathBuf,
    /// Encoded size
    pub dataset_bytes: usize,
    /// Images written to the image directory
    pub images: PublishedImages,
    /// Summary stored in the catalog
    pub summary: ScanRecord,
    /// Whether this save set the scan's default image
    pub default_image: InsertOutcome,
}

/// Writes a [`CanonicalScan`] out as `dataset.bin`, images and catalog rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSaver;

impl ScanSaver {
    /// Serialize `scan` and publish everything derived from it.
    ///
    /// `images_src_dir` is where the scan's image paths are relative to.
    /// `now_unix_sec` stamps the summary and a newly created ownership record.
    #[allow(clippy::too_many_arguments)]
    pub fn save(
        scan: &CanonicalScan,
        images_src_dir: &Path,
        out_dataset_dir: &Path,
        out_images_dir: &Path,
        catalog: &mut dyn CatalogStore,
        converter: &dyn ImageConverter,
        now_unix_sec: i64,
    ) -> Result<SaveReport> {
        Self::stage(
            scan,
            images_src_dir,
            out_dataset_dir,
            out_images_dir,
            &*catalog,
            converter,
            now_unix_sec,
        )?
        .commit(catalog)
    }

    /// Write `dataset.bin` and the images without touching the catalog.
    ///
    /// The catalog is only read, to resolve ownership. Nothing is recorded
    /// until [`StagedScan::commit`].
    #[allow(clippy::too_many_arguments)]
    pub fn stage<'a>(
        scan: &'a CanonicalScan,
        images_src_dir: &Path,
        out_dataset_dir: &Path,
        out_images_dir: &Path,
        catalog: &dyn CatalogStore,
        converter: &dyn ImageConverter,
        now_unix_sec: i64,
    ) -> Result<StagedScan<'a>> {
        let artifact = ArtifactBuilder::new().build(scan)?;
        let encoded = codec::encode(&artifact);

        let ownership = resolve_ownership(scan, catalog, now_unix_sec)?;

        let images = publish_images(scan, images_src_dir, out_images_dir, converter)
            .context("Failed to publish images")?;

        fs::create_dir_all(out_dataset_dir).with_context(|| {
            format!("Failed to create dataset directory {}", out_dataset_dir.display())
        })?;
        let dataset_path = out_dataset_dir.join(DATASET_FILE_NAME);
        fs::write(&dataset_path, &encoded)
            .with_context(|| format!("Failed to write {}", dataset_path.display()))?;
        info!(
            "Wrote {} ({} bytes, {} locations)",
            dataset_path.display(),
            encoded.len(),
            artifact.locations.len()
        );

        Ok(StagedScan {
            scan,
            artifact,
            ownership,
            now_unix_sec,
            dataset_path,
            dataset_bytes: encoded.len(),
            images,
        })
    }
}

/// A scan whose files are written but not yet recorded in the catalog
#[derive(Debug)]
pub struct StagedScan<'a> {
    scan: &'a CanonicalScan,
    artifact: ScanArtifact,
    ownership: OwnershipRecord,
    now_unix_sec: i64,
    /// Path of the written `dataset.bin`
    pub dataset_path: PathBuf,
    /// Encoded size
    pub dataset_bytes: usize,
    /// Images written to the image directory
    pub images: PublishedImages,
}

impl StagedScan<'_> {
    /// Point the report at `dataset_path` after the staged files were moved.
    pub fn relocate(&mut self, dataset_path: PathBuf) {
        self.dataset_path = dataset_path;
    }

    /// Record images, beam locations, summary, ownership and the default
    /// image in `catalog`.
    pub fn commit(self, catalog: &mut dyn CatalogStore) -> Result<SaveReport> {
        let scan = self.scan;
        for record in &self.images.records {
            catalog.upsert_image(record.clone())?;
        }

        save_beam_locations(scan, &self.artifact, catalog)?;

        let previous = catalog.get_scan(&scan.dataset_id)?;
        let summary = make_scan_summary(scan, &self.artifact, previous.as_ref(), self.now_unix_sec);
        catalog.upsert_scan(summary.clone())?;

        catalog.upsert_ownership(self.ownership)?;

        let default_image = insert_default_image(scan, &self.images.default_image, catalog)?;

        Ok(SaveReport {
            dataset_path: self.dataset_path,
            dataset_bytes: self.dataset_bytes,
            images: self.images,
            summary,
            default_image,
        })
    }
}

/// Access list for a new scan, from the auto-share entry of its creator or
/// instrument. An existing record keeps its creation time.
fn resolve_ownership(
    scan: &CanonicalScan,
    catalog: &dyn CatalogStore,
    now_unix_sec: i64,
) -> Result<OwnershipRecord> {
    let sharer = if scan.creator_user_id.is_empty() {
        scan.instrument.as_str()
    } else {
        scan.creator_user_id.as_str()
    };

    let (viewers, editors) = match catalog.get_auto_share(sharer)? {
        Some(entry) => (entry.viewers, entry.editors),
        None if !scan.creator_user_id.is_empty() => {
            warn!(
                "No auto-share entry for {sharer}, sharing with creator only"
            );
            (UserGroupList::default(), UserGroupList::user(&scan.creator_user_id))
        }
        None => {
            return Err(IngestError::SideEffect(format!(
                "Cannot work out groups to auto-share imported dataset with (sharer: {sharer})"
            )))
        }
    };

    let created_unix_sec = catalog
        .get_ownership(&scan.dataset_id)?
        .map(|existing| existing.created_unix_sec)
        .unwrap_or(now_unix_sec);

    Ok(OwnershipRecord {
        id: scan.dataset_id.clone(),
        viewers,
        editors,
        created_unix_sec,
    })
}

/// Store, for each aligned image, where every location's beam falls on it
fn save_beam_locations(
    scan: &CanonicalScan,
    artifact: &ScanArtifact,
    catalog: &mut dyn CatalogStore,
) -> Result<()> {
    let beam_version = scan.beam_version.max(1);

    for (idx, aligned) in artifact.aligned_context_images.iter().enumerate() {
        let locations = artifact
            .locations
            .iter()
            .map(|loc| {
                loc.beam.as_ref().and_then(|beam| {
                    if idx == 0 {
                        Some(BeamCoordinate {
                            i: beam.image_i,
                            j: beam.image_j,
                        })
                    } else {
                        beam.context_locations
                            .get(idx - 1)
                            .map(|c| BeamCoordinate { i: c.i, j: c.j })
                    }
                })
            })
            .collect();

        let mut record = catalog
            .get_image_beam_locations(&aligned.image)?
            .unwrap_or_else(|| ImageBeamLocations {
                image_name: aligned.image.clone(),
                location_per_scan: Vec::new(),
            });
        record.merge(ImageLocationsForScan {
            scan_id: scan.dataset_id.clone(),
            beam_version,
            instrument: scan.instrument,
            locations,
        });
        catalog
            .upsert_image_beam_locations(record)
            .with_context(|| format!("Failed to save beam locations for {}", aligned.image))?;
    }
    Ok(())
}

fn insert_default_image(
    scan: &CanonicalScan,
    image: &str,
    catalog: &mut dyn CatalogStore,
) -> Result<InsertOutcome> {
    if scan.dataset_id.is_empty() || image.is_empty() {
        info!("No default image to set for scan \"{}\"", scan.dataset_id);
        return Ok(InsertOutcome::AlreadyPresent);
    }

    let outcome = catalog.insert_default_image(&scan.dataset_id, image)?;
    match outcome {
        InsertOutcome::Inserted => info!("Default image for {} set to {image}", scan.dataset_id),
        InsertOutcome::AlreadyPresent => {
            info!("Default image for {} already set, left unchanged", scan.dataset_id)
        }
    }
    Ok(outcome)
}
