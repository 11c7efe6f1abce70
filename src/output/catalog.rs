use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{IngestError, Result, ResultExt};
use crate::model::ScanInstrument;

use super::images::ImageRecord;
use super::summary::ScanRecord;

/// Users and groups granted one access level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupList {
    /// User ids
    #[serde(default)]
    pub user_ids: Vec<String>,
    /// Group ids
    #[serde(default)]
    pub group_ids: Vec<String>,
}

impl UserGroupList {
    /// List holding a single user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_ids: vec![user_id.into()],
            group_ids: Vec::new(),
        }
    }
}

/// Who new scans from a sharer get shared with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoShareEntry {
    /// Sharer: a creator user id or an instrument name
    pub id: String,
    /// Read access
    pub viewers: UserGroupList,
    /// Write access
    pub editors: UserGroupList,
}

/// Access list of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    /// Scan id
    pub id: String,
    /// Read access
    pub viewers: UserGroupList,
    /// Write access
    pub editors: UserGroupList,
    /// When the record was created
    pub created_unix_sec: i64,
}

/// Beam position on an image, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamCoordinate {
    /// Column
    pub i: f32,
    /// Row
    pub j: f32,
}

/// Beam positions of one scan on one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLocationsForScan {
    /// Scan id
    pub scan_id: String,
    /// Beam geometry version
    pub beam_version: u32,
    /// Instrument of the scan
    pub instrument: ScanInstrument,
    /// One entry per location, `None` where the location has no beam
    pub locations: Vec<Option<BeamCoordinate>>,
}

/// Beam positions of every scan drawn on an image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBeamLocations {
    /// Image file name
    pub image_name: String,
    /// Per scan and beam version
    pub location_per_scan: Vec<ImageLocationsForScan>,
}

impl ImageBeamLocations {
    /// Replace the entry with the same scan and beam version, keeping all others
    pub fn merge(&mut self, incoming: ImageLocationsForScan) {
        self.location_per_scan.retain(|existing| {
            existing.scan_id != incoming.scan_id || existing.beam_version != incoming.beam_version
        });
        self.location_per_scan.push(incoming);
    }
}

/// Result of an insert-only write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Written
    Inserted,
    /// A value already existed and was left alone
    AlreadyPresent,
}

/// Keyed record storage the pipeline publishes into
pub trait CatalogStore {
    /// Scan summary by id
    fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>>;
    /// Insert or replace a scan summary
    fn upsert_scan(&mut self, record: ScanRecord) -> Result<()>;

    /// Image record by path
    fn get_image(&self, path: &str) -> Result<Option<ImageRecord>>;
    /// Insert or replace an image record
    fn upsert_image(&mut self, record: ImageRecord) -> Result<()>;

    /// Beam locations drawn on an image
    fn get_image_beam_locations(&self, image_name: &str) -> Result<Option<ImageBeamLocations>>;
    /// Insert or replace the beam locations of an image
    fn upsert_image_beam_locations(&mut self, record: ImageBeamLocations) -> Result<()>;

    /// Access list of a scan
    fn get_ownership(&self, scan_id: &str) -> Result<Option<OwnershipRecord>>;
    /// Insert or replace an access list
    fn upsert_ownership(&mut self, record: OwnershipRecord) -> Result<()>;

    /// Set the default image of a scan unless one is set
    fn insert_default_image(&mut self, scan_id: &str, image: &str) -> Result<InsertOutcome>;
    /// Default image of a scan
    fn get_default_image(&self, scan_id: &str) -> Result<Option<String>>;

    /// Auto-share entry by sharer id
    fn get_auto_share(&self, sharer: &str) -> Result<Option<AutoShareEntry>>;
    /// Insert or replace an auto-share entry
    fn upsert_auto_share(&mut self, entry: AutoShareEntry) -> Result<()>;
}

/// In-memory catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCatalog {
    #[serde(default)]
    scans: BTreeMap<String, ScanRecord>,
    #[serde(default)]
    images: BTreeMap<String, ImageRecord>,
    #[serde(default)]
    image_beam_locations: BTreeMap<String, ImageBeamLocations>,
    #[serde(default)]
    ownership: BTreeMap<String, OwnershipRecord>,
    #[serde(default)]
    default_images: BTreeMap<String, String>,
    #[serde(default)]
    auto_share: BTreeMap<String, AutoShareEntry>,
}

impl MemoryCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scan summaries stored
    pub fn scan_count(&self) -> usize {
        self.scans.len()
    }

    /// Number of image records stored
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl CatalogStore for MemoryCatalog {
    fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>> {
        Ok(self.scans.get(scan_id).cloned())
    }

    fn upsert_scan(&mut self, record: ScanRecord) -> Result<()> {
        self.scans.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_image(&self, path: &str) -> Result<Option<ImageRecord>> {
        Ok(self.images.get(path).cloned())
    }

    fn upsert_image(&mut self, record: ImageRecord) -> Result<()> {
        self.images.insert(record.path.clone(), record);
        Ok(())
    }

    fn get_image_beam_locations(&self, image_name: &str) -> Result<Option<ImageBeamLocations>> {
        Ok(self.image_beam_locations.get(image_name).cloned())
    }

    fn upsert_image_beam_locations(&mut self, record: ImageBeamLocations) -> Result<()> {
        self.image_beam_locations
            .insert(record.image_name.clone(), record);
        Ok(())
    }

    fn get_ownership(&self, scan_id: &str) -> Result<Option<OwnershipRecord>> {
        Ok(self.ownership.get(scan_id).cloned())
    }

    fn upsert_ownership(&mut self, record: OwnershipRecord) -> Result<()> {
        self.ownership.insert(record.id.clone(), record);
        Ok(())
    }

    fn insert_default_image(&mut self, scan_id: &str, image: &str) -> Result<InsertOutcome> {
        if self.default_images.contains_key(scan_id) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.default_images
            .insert(scan_id.to_string(), image.to_string());
        Ok(InsertOutcome::Inserted)
    }

    fn get_default_image(&self, scan_id: &str) -> Result<Option<String>> {
        Ok(self.default_images.get(scan_id).cloned())
    }

    fn get_auto_share(&self, sharer: &str) -> Result<Option<AutoShareEntry>> {
        Ok(self.auto_share.get(sharer).cloned())
    }

    fn upsert_auto_share(&mut self, entry: AutoShareEntry) -> Result<()> {
        self.auto_share.insert(entry.id.clone(), entry);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    rev: String,
    #[serde(flatten)]
    data: MemoryCatalog,
}

/// Catalog persisted as one JSON document.
///
/// Every mutation rewrites the file through a temporary sibling that is
/// renamed into place, so a reader never sees a half-written catalog. Each
/// write stamps a fresh `rev`.
#[derive(Debug)]
pub struct JsonFileCatalog {
    path: PathBuf,
    rev: String,
    data: MemoryCatalog,
}

impl JsonFileCatalog {
    /// Open the catalog at `path`, starting empty if the file does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            debug!("Catalog {} not found, starting empty", path.display());
            return Ok(Self {
                path,
                rev: String::new(),
                data: MemoryCatalog::default(),
            });
        }

        let file = File::open(&path)
            .with_context(|| format!("Failed to open catalog {}", path.display()))?;
        let parsed: CatalogFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid catalog {}", path.display()))?;

        Ok(Self {
            path,
            rev: parsed.rev,
            data: parsed.data,
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision of the last write, empty before the first
    pub fn rev(&self) -> &str {
        &self.rev
    }

    /// Current contents
    pub fn data(&self) -> &MemoryCatalog {
        &self.data
    }

    fn persist(&mut self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create catalog directory {}", dir.display()))?;

        let rev = Uuid::new_v4().to_string();
        let doc = CatalogFile {
            rev: rev.clone(),
            data: self.data.clone(),
        };

        let temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &doc).context("Failed to serialize catalog")?;
            std::io::Write::flush(&mut writer).context("Failed to flush catalog")?;
        }
        temp.persist(&self.path).map_err(|e| {
            IngestError::SideEffect(format!(
                "Failed to write catalog {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        debug!("Catalog {} now at rev {rev}", self.path.display());
        self.rev = rev;
        Ok(())
    }
}

impl CatalogStore for JsonFileCatalog {
    fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>> {
        self.data.get_scan(scan_id)
    }

    fn upsert_scan(&mut self, record: ScanRecord) -> Result<()> {
        self.data.upsert_scan(record)?;
        self.persist()
    }

    fn get_image(&self, path: &str) -> Result<Option<ImageRecord>> {
        self.data.get_image(path)
    }

    fn upsert_image(&mut self, record: ImageRecord) -> Result<()> {
        self.data.upsert_image(record)?;
        self.persist()
    }

    fn get_image_beam_locations(&self, image_name: &str) -> Result<Option<ImageBeamLocations>> {
        self.data.get_image_beam_locations(image_name)
    }

    fn upsert_image_beam_locations(&mut self, record: ImageBeamLocations) -> Result<()> {
        self.data.upsert_image_beam_locations(record)?;
        self.persist()
    }

    fn get_ownership(&self, scan_id: &str) -> Result<Option<OwnershipRecord>> {
        self.data.get_ownership(scan_id)
    }

    fn upsert_ownership(&mut self, record: OwnershipRecord) -> Result<()> {
        self.data.upsert_ownership(record)?;
        self.persist()
    }

    fn insert_default_image(&mut self, scan_id: &str, image: &str) -> Result<InsertOutcome> {
        let outcome = self.data.insert_default_image(scan_id, image)?;
        if outcome == InsertOutcome::Inserted {
            self.persist()?;
        }
        Ok(outcome)
    }

    fn get_default_image(&self, scan_id: &str) -> Result<Option<String>> {
        self.data.get_default_image(scan_id)
    }

    fn get_auto_share(&self, sharer: &str) -> Result<Option<AutoShareEntry>> {
        self.data.get_auto_share(sharer)
    }

    fn upsert_auto_share(&mut self, entry: AutoShareEntry) -> Result<()> {
        self.data.upsert_auto_share(entry)?;
        self.persist()
    }
}
