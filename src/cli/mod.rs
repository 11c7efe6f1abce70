use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod detect;
mod filename;
mod info;
mod ingest;

/// pixl-ingest - PIXL XRF scan ingestion
#[derive(Parser)]
#[command(name = "pixl-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a scan and publish its dataset.bin, images and catalog rows
    Ingest {
        /// Input directory or .zip archive
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Scan id the input holds
        #[arg(short, long)]
        scan_id: String,

        /// Output root (datasets/ and images/ are created below it)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// JSON catalog file (default: <output>/catalog.json)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Pseudo-intensity ranges CSV
        #[arg(long, value_name = "FILE")]
        ranges: Option<PathBuf>,

        /// Override the scan title
        #[arg(long)]
        title: Option<String>,

        /// Override the default context image
        #[arg(long, value_name = "FILE_NAME")]
        default_image: Option<String>,
    },

    /// Report which importer would handle an input directory
    Detect {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Display the contents of a dataset.bin file
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Decode the fields of a PIXL product file name
    Filename {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            input,
            scan_id,
            output,
            config,
            catalog,
            ranges,
            title,
            default_image,
        } => ingest::run(ingest::IngestArgs {
            input,
            scan_id,
            output,
            config,
            catalog,
            ranges,
            title,
            default_image,
        }),
        Commands::Detect { input } => detect::run(input),
        Commands::Info { file } => info::run(file),
        Commands::Filename { name } => filename::run(&name),
    }
}
