use anyhow::{Context, Result};

use pixl_ingest::gds::FileNameMeta;

fn show<T: std::fmt::Display, E: std::fmt::Display>(value: Result<T, E>) -> String {
    match value {
        Ok(v) => v.to_string(),
        Err(e) => format!("<{e}>"),
    }
}

/// Print the decoded fields of a product file name
pub fn run(name: &str) -> Result<()> {
    let meta =
        FileNameMeta::parse(name).with_context(|| format!("Not a PIXL product file name: {name}"))?;

    println!("{}", meta.to_file_name());
    println!("  Instrument:      {}", meta.instrument);
    println!("  Colour filter:   {}", meta.colour_filter);
    println!("  Special:         {}", meta.special);
    println!("  SOL:             {}", meta.sol());
    println!("  Venue:           {}", meta.venue);
    println!("  SCLK:            {}", show(meta.sclk()));
    println!("  Product type:    {}", meta.prod_type);
    println!("  Site:            {} ({})", meta.site, show(meta.site_id()));
    println!("  Drive:           {} ({})", meta.drive, show(meta.drive_id()));
    println!("  RTT:             {}", meta.rtt());
    println!("  PMC:             {}", show(meta.pmc()));
    println!("  Producer:        {}", meta.producer);
    println!("  Version:         {} ({})", meta.version_str, show(meta.version()));
    println!("  Extension:       {}", meta.extension);

    Ok(())
}
