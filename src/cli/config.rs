//! TOML configuration for repeated ingests.
//!
//! Settings that rarely change between runs live in a config file instead of
//! on the command line:
//!
//! ```toml
//! # pixl-ingest.toml
//! [ingest]
//! output_dir = "/data/pixl"
//! catalog = "/data/pixl/catalog.json"
//! pseudo_intensity_ranges = "/data/pixl/ranges.csv"
//! converter = "magick"
//!
//! [overrides]
//! title = "Bellegarde"
//!
//! [[auto_share]]
//! id = "PIXL-FM"
//! viewers = ["alice"]
//! editor_groups = ["pixl-science"]
//! ```
//!
//! Command line flags win over values read here.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use pixl_ingest::output::{AutoShareEntry, UserGroupList};
use pixl_ingest::pipeline::ScanOverrides;

/// Root configuration structure for pixl-ingest.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where outputs go and which tools to use.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Values replacing what the importer reads.
    #[serde(default)]
    pub overrides: OverridesConfig,

    /// Auto-share entries seeded into the catalog before saving.
    #[serde(default)]
    pub auto_share: Vec<AutoShareConfig>,
}

/// Configuration for the ingest command.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Root of the published outputs.
    pub output_dir: Option<PathBuf>,

    /// JSON catalog file, defaults to `catalog.json` in the output directory.
    pub catalog: Option<PathBuf>,

    /// Pseudo-intensity ranges CSV.
    pub pseudo_intensity_ranges: Option<PathBuf>,

    /// User credited with the import.
    pub creator_user_id: Option<String>,

    /// Program converting TIFF context images to PNG.
    pub converter: Option<String>,
}

/// Per-scan overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverridesConfig {
    /// Scan title.
    pub title: Option<String>,
    /// Scan description.
    pub description: Option<String>,
    /// Default context image file name.
    pub default_image: Option<String>,
    /// Detector configuration name.
    pub detector_config: Option<String>,
}

/// Who scans from one sharer get shared with.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoShareConfig {
    /// Creator user id or instrument name.
    pub id: String,
    /// Viewer user ids.
    #[serde(default)]
    pub viewers: Vec<String>,
    /// Viewer group ids.
    #[serde(default)]
    pub viewer_groups: Vec<String>,
    /// Editor user ids.
    #[serde(default)]
    pub editors: Vec<String>,
    /// Editor group ids.
    #[serde(default)]
    pub editor_groups: Vec<String>,
}

impl From<&AutoShareConfig> for AutoShareEntry {
    fn from(config: &AutoShareConfig) -> Self {
        AutoShareEntry {
            id: config.id.clone(),
            viewers: UserGroupList {
                user_ids: config.viewers.clone(),
                group_ids: config.viewer_groups.clone(),
            },
            editors: UserGroupList {
                user_ids: config.editors.clone(),
                group_ids: config.editor_groups.clone(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Overrides from the `[overrides]` table plus the configured creator.
    pub fn scan_overrides(&self) -> ScanOverrides {
        ScanOverrides {
            title: self.overrides.title.clone(),
            description: self.overrides.description.clone(),
            default_image: self.overrides.default_image.clone(),
            detector_config: self.overrides.detector_config.clone(),
            creator_user_id: self.ingest.creator_user_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [ingest]
            output_dir = "/data/pixl"
            catalog = "/data/pixl/catalog.json"
            pseudo_intensity_ranges = "ranges.csv"
            creator_user_id = "jpl-import"
            converter = "magick"

            [overrides]
            title = "Bellegarde"
            detector_config = "PIXL-EM-E2E"

            [[auto_share]]
            id = "PIXL-FM"
            viewers = ["alice"]
            editor_groups = ["pixl-science"]

            [[auto_share]]
            id = "jpl-import"
            editors = ["bob"]
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.ingest.output_dir, Some(PathBuf::from("/data/pixl")));
        assert_eq!(config.ingest.converter.as_deref(), Some("magick"));
        assert_eq!(config.overrides.title.as_deref(), Some("Bellegarde"));
        assert_eq!(config.auto_share.len(), 2);

        let entry = AutoShareEntry::from(&config.auto_share[0]);
        assert_eq!(entry.id, "PIXL-FM");
        assert_eq!(entry.viewers.user_ids, vec!["alice"]);
        assert_eq!(entry.editors.group_ids, vec!["pixl-science"]);
        assert!(entry.editors.user_ids.is_empty());

        let overrides = config.scan_overrides();
        assert_eq!(overrides.creator_user_id.as_deref(), Some("jpl-import"));
        assert_eq!(overrides.detector_config.as_deref(), Some("PIXL-EM-E2E"));
        assert_eq!(overrides.description, None);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [overrides]
            description = "Abrasion patch"
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.overrides.description.as_deref(), Some("Abrasion patch"));
        assert_eq!(config.ingest.output_dir, None);
        assert!(config.auto_share.is_empty());
    }

    #[test]
    fn test_empty_config() {
        let config = Config::from_str("").unwrap();
        assert!(config.scan_overrides().is_empty());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_str("[ingest]\ncompression_level = 3\n").is_err());
    }
}
