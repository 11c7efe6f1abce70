use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use pixl_ingest::output::{
    AutoShareEntry, CatalogStore, CommandImageConverter, InsertOutcome, JsonFileCatalog,
};
use pixl_ingest::pipeline::{ingest, IngestRequest};

use super::config::Config;

const DEFAULT_CATALOG_FILE: &str = "catalog.json";

/// Command line values for `ingest`, before merging with the config file
pub struct IngestArgs {
    pub input: PathBuf,
    pub scan_id: String,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub ranges: Option<PathBuf>,
    pub title: Option<String>,
    pub default_image: Option<String>,
}

/// Import one scan and publish it
pub fn run(args: IngestArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };

    let output_dir = args
        .output
        .or_else(|| config.ingest.output_dir.clone())
        .context("No output directory: pass --output or set ingest.output_dir")?;
    let catalog_path = args
        .catalog
        .or_else(|| config.ingest.catalog.clone())
        .unwrap_or_else(|| output_dir.join(DEFAULT_CATALOG_FILE));

    let mut overrides = config.scan_overrides();
    if args.title.is_some() {
        overrides.title = args.title;
    }
    if args.default_image.is_some() {
        overrides.default_image = args.default_image;
    }

    let mut request =
        IngestRequest::new(&args.input, &args.scan_id, &output_dir).with_overrides(overrides);
    if let Some(ranges) = args.ranges.or_else(|| config.ingest.pseudo_intensity_ranges.clone()) {
        request = request.with_pseudo_intensity_ranges(ranges);
    }

    let mut catalog = JsonFileCatalog::open(&catalog_path)
        .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;
    for entry in &config.auto_share {
        catalog
            .upsert_auto_share(AutoShareEntry::from(entry))
            .with_context(|| format!("Failed to store auto-share entry {}", entry.id))?;
    }

    let converter = config
        .ingest
        .converter
        .as_deref()
        .map(CommandImageConverter::new)
        .unwrap_or_default();

    let now = chrono::Utc::now().timestamp();
    let report = ingest(&request, &mut catalog, &converter, now)
        .with_context(|| format!("Failed to ingest scan {}", args.scan_id))?;

    println!("Ingested scan {} ({})", args.scan_id, report.format);
    println!("  Dataset: {} ({} bytes)", report.dataset_path.display(), report.dataset_bytes);
    println!("  Images:  {} in {}", report.image_count, report.image_dir.display());
    println!("  Title:   {}", report.summary.title);
    if report.default_image == InsertOutcome::AlreadyPresent {
        println!("  Default image was already set, left unchanged");
    }
    println!("  Catalog: {} (rev {})", catalog.path().display(), catalog.rev());

    Ok(())
}
