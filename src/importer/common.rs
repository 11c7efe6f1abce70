use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::{IngestError, Result, ResultExt};
use crate::gds::FileNameMeta;
use crate::model::{FileMetaData, PseudoIntensityRange};
use crate::parsers::read_pseudo_intensity_ranges;

/// Scan metadata encoded in an instrument file name.
///
/// A name whose RTT, site or drive can't be decoded yields empty metadata,
/// which assembly then rejects for its missing RTT. Target id is unknown and
/// the title defaults to the RTT.
pub fn file_meta_from_name(meta: &FileNameMeta) -> FileMetaData {
    let sclk = meta.sclk().unwrap_or_else(|e| {
        info!("Dataset metadata did not contain SCLK: {e}");
        0
    });
    let (Ok(site_id), Ok(drive_id)) = (meta.site_id(), meta.drive_id()) else {
        info!("Dataset metadata has undecodable site or drive: {meta}");
        return FileMetaData::default();
    };
    if meta.rtt_number().is_err() {
        info!("Dataset metadata has undecodable RTT: {meta}");
        return FileMetaData::default();
    }

    FileMetaData {
        rtt: meta.rtt().to_string(),
        sclk,
        sol: meta.sol().to_string(),
        site_id,
        site: String::new(),
        drive_id,
        target_id: "?".to_string(),
        target: String::new(),
        title: meta.rtt().to_string(),
    }
}

/// Files in `import_dir/sub_dir` whose extension matches `ext` (any case),
/// as `sub_dir/<name>` paths sorted by name. A missing directory is empty.
pub(crate) fn list_role_files(import_dir: &Path, sub_dir: &str, ext: &str) -> Result<Vec<String>> {
    let dir = import_dir.join(sub_dir);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read dir \"{}\". SKIPPING. Error was: \"{e}\"", dir.display());
            return Ok(Vec::new());
        }
    };

    let mut result = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| dir.display().to_string())?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let matches = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches {
            result.push(format!("{sub_dir}/{name}"));
        }
    }

    if result.is_empty() {
        warn!("No {ext} files read from dir \"{}\"", dir.display());
    }
    result.sort();
    Ok(result)
}

/// Ranges for a scan that carries pseudo-intensities
pub(crate) fn required_pseudo_ranges(path: Option<&Path>) -> Result<Vec<PseudoIntensityRange>> {
    let path = path.ok_or_else(|| {
        IngestError::MissingInput(
            "Dataset contains pseudo-intensity CSV file, but no pseudo-intensity ranges file specified"
                .to_string(),
        )
    })?;
    read_pseudo_intensity_ranges(path)
        .with_context(|| format!("Pseudo-intensity ranges: {}", path.display()))
}
