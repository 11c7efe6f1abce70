use std::collections::BTreeMap;

use log::{debug, warn};

use super::FileNameMeta;
use crate::error::{IngestError, Result};

/// Among candidate paths, keep only the latest version of each product.
///
/// Files are grouped by [`FileNameMeta::identity_key`]. Within a group the
/// highest version wins, ties broken by lowest SCLK. Names that don't follow
/// the file-name grammar are dropped with a warning. The result maps each
/// chosen path to its parsed name, ordered by path.
pub fn latest_file_versions<S: AsRef<str>>(paths: &[S]) -> Result<BTreeMap<String, FileNameMeta>> {
    let mut groups: BTreeMap<String, Vec<(String, FileNameMeta)>> = BTreeMap::new();
    let mut parsed = 0usize;

    for path in paths {
        let path = path.as_ref();
        match FileNameMeta::parse(path) {
            Ok(meta) => {
                parsed += 1;
                groups
                    .entry(meta.identity_key())
                    .or_default()
                    .push((path.to_string(), meta));
            }
            Err(e) => warn!("Ignoring file with unexpected name {}: {}", path, e),
        }
    }

    if !paths.is_empty() && parsed == 0 {
        return Err(IngestError::VersionAmbiguity(format!(
            "None of {} candidate files had a parseable name",
            paths.len()
        )));
    }

    let mut result = BTreeMap::new();
    for (key, candidates) in groups {
        let mut best: Option<(i32, i32, String, FileNameMeta)> = None;
        for (path, meta) in candidates {
            let version = meta.version().unwrap_or_else(|e| {
                warn!("{}: {}, treating version as 0", path, e);
                0
            });
            let sclk = meta.sclk().unwrap_or_else(|e| {
                warn!("{}: {}, treating SCLK as 0", path, e);
                0
            });

            let better = match &best {
                None => true,
                Some((best_version, best_sclk, _, _)) => {
                    version > *best_version || (version == *best_version && sclk < *best_sclk)
                }
            };
            if better {
                best = Some((version, sclk, path, meta));
            }
        }

        if let Some((version, _, path, meta)) = best {
            debug!("Latest of {} is {} (version {})", key, path, version);
            result.insert(path, meta);
        }
    }

    Ok(result)
}

/// Path with the lowest SCLK among already-selected files. Unparseable SCLKs
/// sort last; ties keep the first path in order.
pub fn lowest_sclk(files: &BTreeMap<String, FileNameMeta>) -> Option<String> {
    files
        .iter()
        .min_by_key(|(_, meta)| meta.sclk().unwrap_or(i32::MAX))
        .map(|(path, _)| path.clone())
}
