//! # pixl-ingest
//!
//! Command-line front end for the PIXL scan ingestion pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Import a delivery and publish it under out/
//! pixl-ingest ingest delivery/ --scan-id 208601602 --output out/ --ranges ranges.csv
//!
//! # Which importer would handle a directory?
//! pixl-ingest detect delivery/
//!
//! # Inspect an artifact
//! pixl-ingest info out/datasets/208601602/dataset.bin
//!
//! # Decode a product file name
//! pixl-ingest filename PS__0125_0678031418_000RFS_N00100362086016020066000J01.CSV
//! ```

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
