use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::model::{CanonicalScan, ScanInstrument};

use super::artifact::ScanArtifact;

/// Kinds of data a scan carries, as listed in its summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDataType {
    /// Context images of any kind
    Image,
    /// Multispectral TIFFs
    #[serde(rename = "RGBU")]
    Rgbu,
    /// XRF spectra
    #[serde(rename = "XRF")]
    Xrf,
}

/// Count of one data kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTypeCount {
    /// Data kind
    pub data_type: ScanDataType,
    /// How many
    pub count: u32,
}

/// Catalog summary of a scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// Scan id
    pub id: String,
    /// Title
    pub title: String,
    /// User-entered description
    #[serde(default)]
    pub description: String,
    /// Data kinds present
    pub data_types: Vec<ScanTypeCount>,
    /// Instrument
    pub instrument: ScanInstrument,
    /// Detector configuration
    pub instrument_config: String,
    /// Import time
    pub timestamp_unix_sec: i64,
    /// Provenance fields
    pub meta: BTreeMap<String, String>,
    /// Spectrum and pseudo-intensity counts
    pub content_counts: BTreeMap<String, u32>,
    /// User that started the import
    #[serde(default)]
    pub creator_user_id: String,
    /// Times of earlier imports of this scan, oldest first
    #[serde(default)]
    pub previous_import_times_unix_sec: Vec<i64>,
    /// Time the scan first became complete, 0 while incomplete
    #[serde(default)]
    pub complete_time_stamp_unix_sec: i64,
    /// User-entered tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ScanRecord {
    /// Content count by name, 0 if absent
    pub fn content_count(&self, name: &str) -> u32 {
        self.content_counts.get(name).copied().unwrap_or(0)
    }
}

/// Build the catalog summary for a freshly serialized scan.
///
/// `previous` is the record stored by an earlier import, if any. Its timestamp
/// joins the import history, a completion time is kept once set, and
/// user-edited description and tags survive. The title survives only when the
/// user has written a description.
pub fn make_scan_summary(
    scan: &CanonicalScan,
    artifact: &ScanArtifact,
    previous: Option<&ScanRecord>,
    now_unix_sec: i64,
) -> ScanRecord {
    let image_count = artifact.aligned_context_images.len()
        + artifact.unaligned_context_images.len()
        + artifact.matched_aligned_context_images.len();

    let is_tif = |name: &str| name.ends_with(".tif");
    let tif_count = artifact
        .aligned_context_images
        .iter()
        .filter(|i| is_tif(&i.image))
        .count()
        + artifact
            .unaligned_context_images
            .iter()
            .filter(|i| is_tif(i))
            .count()
        + artifact
            .matched_aligned_context_images
            .iter()
            .filter(|i| is_tif(&i.image))
            .count();

    let counts = artifact.counts;
    let mut data_types = Vec::new();
    if image_count > 0 {
        data_types.push(ScanTypeCount {
            data_type: ScanDataType::Image,
            count: image_count as u32,
        });
    }
    if tif_count > 0 {
        data_types.push(ScanTypeCount {
            data_type: ScanDataType::Rgbu,
            count: tif_count as u32,
        });
    }
    if counts.normal > 0 {
        data_types.push(ScanTypeCount {
            data_type: ScanDataType::Xrf,
            count: counts.normal,
        });
    }

    let meta = &scan.meta;
    let meta_map = BTreeMap::from([
        ("TargetId".to_string(), meta.target_id.clone()),
        ("SiteId".to_string(), meta.site_id.to_string()),
        ("DriveId".to_string(), meta.drive_id.to_string()),
        ("Target".to_string(), meta.target.clone()),
        ("Site".to_string(), meta.site.clone()),
        ("Sol".to_string(), meta.sol.clone()),
        ("RTT".to_string(), meta.rtt.clone()),
        ("SCLK".to_string(), meta.sclk.to_string()),
    ]);

    let content_counts = BTreeMap::from([
        ("NormalSpectra".to_string(), counts.normal),
        ("DwellSpectra".to_string(), counts.dwell),
        ("BulkSpectra".to_string(), counts.bulk),
        ("MaxSpectra".to_string(), counts.max),
        ("PseudoIntensities".to_string(), counts.pseudo_intensities),
    ]);

    let mut record = ScanRecord {
        id: scan.dataset_id.clone(),
        title: meta.title.clone(),
        description: String::new(),
        data_types,
        instrument: scan.instrument,
        instrument_config: scan.detector_config.clone(),
        timestamp_unix_sec: now_unix_sec,
        meta: meta_map,
        content_counts,
        creator_user_id: scan.creator_user_id.clone(),
        previous_import_times_unix_sec: Vec::new(),
        complete_time_stamp_unix_sec: 0,
        tags: Vec::new(),
    };

    if let Some(prev) = previous {
        record.previous_import_times_unix_sec = prev.previous_import_times_unix_sec.clone();
        record
            .previous_import_times_unix_sec
            .push(prev.timestamp_unix_sec);
        info!(
            " Added previous import time {}, {} in total",
            prev.timestamp_unix_sec,
            record.previous_import_times_unix_sec.len()
        );
    }

    let complete = counts.pseudo_intensities > 0 && counts.normal == counts.pseudo_intensities * 2;
    if complete {
        record.complete_time_stamp_unix_sec = match previous {
            Some(prev) if prev.complete_time_stamp_unix_sec > 0 => prev.complete_time_stamp_unix_sec,
            _ => now_unix_sec,
        };
        info!(" Scan complete as of {}", record.complete_time_stamp_unix_sec);
    }

    if let Some(prev) = previous {
        record.tags = prev.tags.clone();
        record.description = prev.description.clone();
        if !prev.description.is_empty() {
            record.title = prev.title.clone();
            info!(" Preserved previous title \"{}\"", record.title);
        }
    }

    record
}
