use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

use pixl_ingest::output::codec;

/// Display information about a dataset.bin file
pub fn run(file: PathBuf) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let bytes = std::fs::read(&file).context("Failed to read file")?;
    let artifact = codec::decode(&bytes).context("Failed to decode dataset")?;

    println!("PIXL Scan Information");
    println!("=====================");
    println!("File: {} ({} bytes)", file.display(), bytes.len());
    println!();

    println!("Scan:");
    println!("  Id:              {}", artifact.scan_id);
    println!("  Title:           {}", artifact.title);
    println!("  Group:           {}", artifact.group);
    println!("  Instrument:      {}", artifact.instrument);
    println!("  Detector config: {}", artifact.detector_config);
    println!("  Target:          {} ({})", artifact.target, artifact.target_id);
    println!("  Site/drive:      {} ({}) / {}", artifact.site, artifact.site_id, artifact.drive_id);
    println!("  SOL:             {}", artifact.sol);
    println!("  RTT:             {:?}", artifact.rtt);
    println!("  SCLK:            {}", artifact.sclk);
    println!();

    let counts = &artifact.counts;
    println!("Spectra:");
    println!("  Locations:         {}", artifact.locations.len());
    println!(
        "  With beam:         {}",
        artifact.locations.iter().filter(|l| l.beam.is_some()).count()
    );
    println!("  Normal:            {}", counts.normal);
    println!("  Dwell:             {}", counts.dwell);
    println!("  Bulk sum:          {}", counts.bulk);
    println!("  Max value:         {}", counts.max);
    println!("  Pseudo-intensities: {}", counts.pseudo_intensities);
    if !artifact.pseudo_intensity_ranges.is_empty() {
        let names: Vec<&str> = artifact
            .pseudo_intensity_ranges
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        println!("  Ranges:            {}", names.join(", "));
    }
    println!();

    // How many locations carry each label
    let mut label_use: BTreeMap<&str, usize> = BTreeMap::new();
    for location in &artifact.locations {
        for item in &location.meta {
            if let Some(label) = artifact.label(item) {
                *label_use.entry(label).or_default() += 1;
            }
        }
    }
    println!("Meta Labels:");
    for (i, (label, ty)) in artifact.meta_labels.iter().zip(&artifact.meta_types).enumerate() {
        let used = label_use.get(label.as_str()).copied().unwrap_or(0);
        println!("  {:3}. {label} ({ty}), {used} locations", i + 1);
    }
    println!();

    println!("Images:");
    if artifact.default_context_image.is_empty() {
        println!("  Default: <none>");
    } else {
        println!("  Default: {}", artifact.default_context_image);
    }
    for image in &artifact.aligned_context_images {
        println!("  Aligned:   {} (PMC {})", image.image, image.pmc);
    }
    for image in &artifact.matched_aligned_context_images {
        println!("  Matched:   {}", image.image);
    }
    for image in &artifact.unaligned_context_images {
        println!("  Unaligned: {image}");
    }

    Ok(())
}
