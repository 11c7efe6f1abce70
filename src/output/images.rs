use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::info;
use serde::{Deserialize, Serialize};

use crate::assembly::base_name;
use crate::error::{IngestError, Result, ResultExt};
use crate::gds::FileNameMeta;
use crate::model::{CanonicalScan, Pmc};

/// Converts instrument TIFFs into PNGs for viewing
pub trait ImageConverter {
    /// Write `src` as a PNG to `dst`
    fn convert_to_png(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// Runs an external program as `program <src> <dst>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandImageConverter {
    program: String,
}

impl CommandImageConverter {
    /// Use `program` for conversions
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Configured program
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandImageConverter {
    fn default() -> Self {
        Self::new("convert")
    }
}

impl ImageConverter for CommandImageConverter {
    fn convert_to_png(&self, src: &Path, dst: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .arg(src)
            .arg(dst)
            .output()
            .map_err(|e| {
                IngestError::SideEffect(format!("Failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(IngestError::SideEffect(format!(
                "{} failed converting {}: {}",
                self.program,
                src.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Where an image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    /// Produced by the instrument pipeline
    Instrument,
    /// Supplied alongside the scan
    Upload,
}

/// What an image is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePurpose {
    /// Shown as a context image
    Viewing,
    /// One channel of a multi-channel set
    Multichannel,
}

/// Transform placing a matched image over the beam-aligned image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMatchTransform {
    /// Aligned image the transform is relative to
    pub beam_image_file_name: String,
    /// X offset
    pub x_offset: f32,
    /// Y offset
    pub y_offset: f32,
    /// X scale
    pub x_scale: f32,
    /// Y scale
    pub y_scale: f32,
}

/// Catalog entry for one published image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// `<scanId>/<file name>`
    pub path: String,
    /// File size
    pub bytes: u64,
    /// Origin
    pub source: ImageSource,
    /// Use
    pub purpose: ImagePurpose,
    /// Scans this image belongs to
    pub associated_scan_ids: Vec<String>,
    /// Scan that first imported this image
    pub origin_scan_id: String,
    /// Name to look the image up by in external viewers, for flight images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_image_url: Option<String>,
    /// Transform for matched images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_info: Option<ImageMatchTransform>,
}

/// Images written to the output directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedImages {
    /// One record per written image
    pub records: Vec<ImageRecord>,
    /// Output name of the default image, empty if the scan has none
    pub default_image: String,
}

/// Flight images (a real SOL) are looked up by name in external viewers
fn origin_image_url(file_name: &str) -> Option<String> {
    let meta = FileNameMeta::parse(file_name).ok()?;
    let sol: i32 = meta.sol().parse().ok()?;
    (sol > 1).then(|| file_name.to_string())
}

struct Publisher<'a> {
    scan: &'a CanonicalScan,
    out_dir: &'a Path,
    records: Vec<ImageRecord>,
}

impl Publisher<'_> {
    fn record(
        &mut self,
        dst: &Path,
        source: ImageSource,
        purpose: ImagePurpose,
        origin_image_url: Option<String>,
        match_info: Option<ImageMatchTransform>,
    ) -> Result<()> {
        let bytes = fs::metadata(dst)
            .with_context(|| format!("Failed to stat {}", dst.display()))?
            .len();
        let name = dst
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        self.records.push(ImageRecord {
            path: format!("{}/{name}", self.scan.dataset_id),
            bytes,
            source,
            purpose,
            associated_scan_ids: vec![self.scan.dataset_id.clone()],
            origin_scan_id: self.scan.dataset_id.clone(),
            origin_image_url,
            match_info,
        });
        Ok(())
    }

    fn copy(&self, src: &Path, name: &str) -> Result<PathBuf> {
        let dst = self.out_dir.join(name);
        info!("  Copy img {} -> {}", src.display(), dst.display());
        fs::copy(src, &dst)
            .with_context(|| format!("Failed to copy image {}", src.display()))?;
        Ok(dst)
    }
}

/// Copy or convert every image of `scan` from `src_dir` into `out_dir`.
///
/// Context images become `<dst name>` (TIFFs converted through `converter`),
/// RGBU, disco and matched images keep their base names. Fails if the
/// scan's default image is not among the written context or disco images.
pub fn publish_images(
    scan: &CanonicalScan,
    src_dir: &Path,
    out_dir: &Path,
    converter: &dyn ImageConverter,
) -> Result<PublishedImages> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create image output directory {}", out_dir.display()))?;

    let mut publisher = Publisher {
        scan,
        out_dir,
        records: Vec::new(),
    };
    let mut default_image = String::new();
    let mut pmc_to_image: BTreeMap<Pmc, String> = BTreeMap::new();

    for (pmc, shot) in &scan.shots {
        if shot.context_image_src.is_empty() {
            continue;
        }
        let src = src_dir.join(&shot.context_image_src);
        let is_tif = src
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tif"));

        let dst = if is_tif {
            let dst = out_dir.join(&shot.context_image_dst);
            info!("  Convert img PMC[{pmc}] {} -> {}", src.display(), dst.display());
            converter
                .convert_to_png(&src, &dst)
                .with_context(|| format!("Converting context image for PMC {pmc}"))?;
            dst
        } else {
            publisher.copy(&src, &shot.context_image_dst)?
        };

        let url = origin_image_url(&shot.context_image_dst);
        publisher.record(&dst, ImageSource::Instrument, ImagePurpose::Viewing, url, None)?;
        pmc_to_image.insert(*pmc, shot.context_image_dst.clone());

        if scan.default_context_image == shot.context_image_dst {
            default_image = shot.context_image_dst.clone();
        }
    }

    for img in &scan.rgbu_images {
        let dst = publisher.copy(&src_dir.join(&img.file_name), base_name(&img.file_name))?;
        publisher.record(&dst, ImageSource::Upload, ImagePurpose::Multichannel, None, None)?;
    }

    for img in &scan.disco_images {
        let name = base_name(&img.file_name);
        let dst = publisher.copy(&src_dir.join(&img.file_name), name)?;
        publisher.record(&dst, ImageSource::Upload, ImagePurpose::Multichannel, None, None)?;

        if scan.default_context_image == name {
            default_image = name.to_string();
        }
    }

    for matched in &scan.matched_aligned_images {
        let dst = publisher.copy(
            &matched.matched_image_full_path,
            base_name(&matched.matched_image_name),
        )?;
        let beam_image = pmc_to_image.get(&matched.aligned_beam_pmc).ok_or_else(|| {
            IngestError::Integrity(format!(
                "Matched image for PMC: {} - image not found",
                matched.aligned_beam_pmc
            ))
        })?;
        let transform = ImageMatchTransform {
            beam_image_file_name: beam_image.clone(),
            x_offset: matched.x_offset,
            y_offset: matched.y_offset,
            x_scale: matched.x_scale,
            y_scale: matched.y_scale,
        };
        publisher.record(&dst, ImageSource::Upload, ImagePurpose::Viewing, None, Some(transform))?;
    }

    if !scan.default_context_image.is_empty() && default_image.is_empty() {
        return Err(IngestError::Integrity(format!(
            "Main context image \"{}\" was not found when copying to output directory",
            scan.default_context_image
        )));
    }

    Ok(PublishedImages {
        records: publisher.records,
        default_image,
    })
}
