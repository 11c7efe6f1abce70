use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use zip::ZipArchive;

use crate::error::{Result, ResultExt};

/// Unpack every file of the zip at `archive` under `dest`, returning the
/// extracted paths. Entries that would land outside `dest` are skipped.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).with_context(|| archive.display().to_string())?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to open zip {}", archive.display()))?;
    fs::create_dir_all(dest)?;

    let mut extracted = Vec::with_capacity(zip.len());
    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry: {}", entry.name());
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path).with_context(|| out_path.display().to_string())?;
        io::copy(&mut entry, &mut out)?;
        debug!("Extracted {}", out_path.display());
        extracted.push(out_path);
    }

    Ok(extracted)
}
