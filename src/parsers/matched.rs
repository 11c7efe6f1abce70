use std::fs;
use std::path::Path;

use log::info;

use crate::error::{IngestError, Result, ResultExt};
use crate::model::{BeamLocationByPmc, MatchedAlignedImage};

const MAX_OFFSET: f32 = 10000.0;
const MAX_SCALE: f32 = 100.0;

/// Read every `*.json` matched-image manifest in `dir`, ordered by manifest
/// file name. A missing directory yields an empty list.
///
/// When `beams` is non-empty, each manifest's `aligned-beam-pmc` must be one
/// of its shots. The referenced image must exist next to the manifest.
pub fn read_matched_images(dir: &Path, beams: &BeamLocationByPmc) -> Result<Vec<MatchedAlignedImage>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            info!("Matched image directory {} not found, skipping", dir.display());
            return Ok(Vec::new());
        }
    };

    let mut manifests = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json && path.is_file() {
            manifests.push(path);
        }
    }
    manifests.sort();

    let mut result = Vec::with_capacity(manifests.len());
    for path in manifests {
        let bytes = fs::read(&path)?;
        let mut meta: MatchedAlignedImage =
            serde_json::from_slice(&bytes).with_context(|| path.display().to_string())?;

        if !beams.is_empty() && !beams.contains_key(&meta.aligned_beam_pmc) {
            return Err(IngestError::Integrity(format!(
                "Matched image {} references beam locations for PMC which cannot be found: {}",
                path.display(),
                meta.aligned_beam_pmc
            )));
        }

        meta.matched_image_full_path = dir.join(&meta.matched_image_name);
        if !meta.matched_image_full_path.is_file() {
            return Err(IngestError::MissingInput(format!(
                "Matched image {} references image which cannot be found: {}",
                path.display(),
                meta.matched_image_name
            )));
        }

        let offset_ok = |v: f32| (-MAX_OFFSET..=MAX_OFFSET).contains(&v);
        if !offset_ok(meta.x_offset) || !offset_ok(meta.y_offset) {
            return Err(IngestError::Parse(format!(
                "{} x/y offsets invalid",
                path.display()
            )));
        }

        let scale_ok = |v: f32| (1.0 / MAX_SCALE..=MAX_SCALE).contains(&v);
        if !scale_ok(meta.x_scale) || !scale_ok(meta.y_scale) {
            return Err(IngestError::Parse(format!(
                "{} x/y scales invalid",
                path.display()
            )));
        }

        result.push(meta);
    }

    Ok(result)
}
