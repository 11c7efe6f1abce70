use anyhow::{Context, Result};
use std::path::PathBuf;

use pixl_ingest::importer::detect_format;

/// Print the format an input directory would be imported as
pub fn run(input: PathBuf) -> Result<()> {
    if !input.is_dir() {
        anyhow::bail!("Not a directory: {}", input.display());
    }

    let format = detect_format(&input)
        .with_context(|| format!("Failed to detect format of {}", input.display()))?;
    println!("{}: {format}", input.display());

    Ok(())
}
