use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::assembly::ScanAssembler;
use crate::error::{IngestError, Result, ResultExt};
use crate::gds::FileNameMeta;
use crate::model::{Pmc, ScanInstrument};
use crate::parsers::{
    read_beam_locations, read_bulk_max_spectra, read_housekeeping, read_matched_images,
    read_pseudo_intensity_file, read_spectra_csv_from_offset,
};

use super::common::{file_meta_from_name, required_pseudo_ranges};
use super::pixlfm::DRIFT_COLUMNS;
use super::{ImportContext, ImportedScan, Importer};

const HOUSEKEEPING_FRAME: &str = "housekeeping_frame";
const BEAM_POSITIONS: &str = "Xray_beam_positions";
const BULK_SUM: &str = "bulk_sum_histogram";
const MAX_VALUE: &str = "max_value_histogram";
const HISTOGRAM_HOUSEKEEPING: &str = "histogram_housekeeping";
const HISTOGRAM_POSITION: &str = "histogram_position";
const HISTOGRAM_A: &str = "histogram_A";
const HISTOGRAM_B: &str = "histogram_B";
const PSEUDO_METADATA: &str = "pseudointensity_map_metadata";
const PSEUDO_MAP: &str = "pseudointensity_map";

/// Every table a descriptor must list, exactly once
const REQUIRED_TABLES: [&str; 10] = [
    HOUSEKEEPING_FRAME,
    BEAM_POSITIONS,
    BULK_SUM,
    MAX_VALUE,
    HISTOGRAM_HOUSEKEEPING,
    HISTOGRAM_POSITION,
    HISTOGRAM_A,
    HISTOGRAM_B,
    PSEUDO_METADATA,
    PSEUDO_MAP,
];

/// Histogram tables in the order they must appear in their shared file
const HISTOGRAM_ORDER: [&str; 4] = [
    HISTOGRAM_HOUSEKEEPING,
    HISTOGRAM_POSITION,
    HISTOGRAM_A,
    HISTOGRAM_B,
];

/// An `offset` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoffOffset {
    /// `unit` attribute, e.g. `byte`
    pub unit: String,
    /// Element text
    pub value: u64,
}

/// A `Table_Delimited` entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoffTable {
    /// Table name, e.g. `histogram_A`
    pub local_identifier: String,
    /// Where the table starts in its file
    pub offset: SoffOffset,
}

/// A `File_Area_Observational` entry: one file and what it holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoffFileArea {
    /// File name relative to the descriptor
    pub file_name: String,
    /// Delimited tables stored in the file
    pub tables: Vec<SoffTable>,
    /// Set when the file is an encoded image
    pub image_offset: Option<SoffOffset>,
}

/// The parts of a SOFF descriptor the importer reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoffDescriptor {
    /// `Identification_Area/title`
    pub title: String,
    /// File areas in document order
    pub files: Vec<SoffFileArea>,
}

impl SoffDescriptor {
    /// Check every required table is listed once, against a named file
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeMap<&str, usize> = REQUIRED_TABLES.iter().map(|t| (*t, 0)).collect();

        for file in &self.files {
            for table in &file.tables {
                let id = table.local_identifier.as_str();
                let Some(count) = seen.get_mut(id) else {
                    return Err(IngestError::Schema(format!("Did not include table: {id}")));
                };
                if *count > 0 {
                    return Err(IngestError::Schema(format!("Duplicate table: {id}")));
                }
                if file.file_name.is_empty() {
                    return Err(IngestError::Schema(format!("No file for table: {id}")));
                }
                *count += 1;
            }
        }

        for table in REQUIRED_TABLES {
            if seen.get(table).copied().unwrap_or(0) < 1 {
                return Err(IngestError::Schema(format!("Missing table: {table}")));
            }
        }
        Ok(())
    }

    /// File and offset of each table, by identifier
    pub fn table_locations(&self) -> BTreeMap<&str, (&str, u64)> {
        self.files
            .iter()
            .flat_map(|file| {
                file.tables.iter().map(move |table| {
                    (
                        table.local_identifier.as_str(),
                        (file.file_name.as_str(), table.offset.value),
                    )
                })
            })
            .collect()
    }

    /// Names of the encoded image files. Images must start at byte 0.
    pub fn image_files(&self) -> Result<Vec<&str>> {
        let mut images = Vec::new();
        for file in &self.files {
            let Some(offset) = &file.image_offset else {
                continue;
            };
            if offset.unit == "byte" {
                if offset.value != 0 {
                    return Err(IngestError::Schema(format!(
                        "Image {} expected offset to be 0",
                        file.file_name
                    )));
                }
                images.push(file.file_name.as_str());
            } else if !offset.unit.is_empty() {
                return Err(IngestError::Schema(format!(
                    "Unexpected image units: {}",
                    offset.unit
                )));
            }
        }
        Ok(images)
    }
}

fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| IngestError::Xml(quick_xml::Error::from(e)))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn parse_offset(unit: &str, text: &str) -> Result<SoffOffset> {
    let value = text
        .trim()
        .parse::<u64>()
        .map_err(|e| IngestError::Parse(format!("Invalid offset \"{text}\": {e}")))?;
    Ok(SoffOffset {
        unit: unit.to_string(),
        value,
    })
}

/// Parse a SOFF descriptor without validating its table list
pub fn parse_soff_descriptor<R: BufRead>(input: R) -> Result<SoffDescriptor> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut descriptor = SoffDescriptor::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut area: Option<SoffFileArea> = None;
    let mut table: Option<SoffTable> = None;
    let mut offset_unit = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                match e.name().as_ref() {
                    b"File_Area_Observational" => area = Some(SoffFileArea::default()),
                    b"Table_Delimited" if area.is_some() => table = Some(SoffTable::default()),
                    b"offset" => offset_unit = get_attribute(e, "unit")?.unwrap_or_default(),
                    _ => {}
                }
                path.push(e.name().as_ref().to_vec());
            }
            Ok(Event::Text(ref e)) if path.len() >= 2 => {
                let text = e.unescape()?;
                let parent = path[path.len() - 2].as_slice();
                let element = path[path.len() - 1].as_slice();
                match (parent, element) {
                    (b"Identification_Area", b"title") => descriptor.title = text.into_owned(),
                    (b"File", b"file_name") => {
                        if let Some(area) = area.as_mut() {
                            area.file_name = text.trim().to_string();
                        }
                    }
                    (b"Table_Delimited", b"local_identifier") => {
                        if let Some(table) = table.as_mut() {
                            table.local_identifier = text.trim().to_string();
                        }
                    }
                    (b"Table_Delimited", b"offset") => {
                        if let Some(table) = table.as_mut() {
                            table.offset = parse_offset(&offset_unit, &text)?;
                        }
                    }
                    (b"Encoded_Image", b"offset") => {
                        if let Some(area) = area.as_mut() {
                            area.image_offset = Some(parse_offset(&offset_unit, &text)?);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                path.pop();
                match e.name().as_ref() {
                    b"Table_Delimited" => {
                        if let (Some(table), Some(area)) = (table.take(), area.as_mut()) {
                            area.tables.push(table);
                        }
                    }
                    b"File_Area_Observational" => {
                        if let Some(area) = area.take() {
                            descriptor.files.push(area);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IngestError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(descriptor)
}

/// Read and validate a SOFF descriptor file
pub fn read_soff_descriptor(path: &Path) -> Result<SoffDescriptor> {
    let file = File::open(path).with_context(|| path.display().to_string())?;
    let descriptor = parse_soff_descriptor(BufReader::new(file))
        .with_context(|| format!("SOFF descriptor: {}", path.display()))?;
    descriptor.validate()?;
    Ok(descriptor)
}

fn find_descriptor(dir: &Path) -> Result<PathBuf> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| dir.display().to_string())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file() && name.to_lowercase().ends_with(".xml") {
            names.push(name);
        }
    }
    names.sort();
    names.first().map(|name| dir.join(name)).ok_or_else(|| {
        IngestError::MissingInput(format!(
            "No SOFF description file found in path: {}",
            dir.display()
        ))
    })
}

/// Check the histogram tables share a file and appear in order, returning
/// that file and where the first table starts
fn histogram_location<'a>(tables: &BTreeMap<&str, (&'a str, u64)>) -> Result<(&'a str, u64)> {
    let mut located = Vec::with_capacity(HISTOGRAM_ORDER.len());
    for name in HISTOGRAM_ORDER {
        let location = tables
            .get(name)
            .copied()
            .ok_or_else(|| IngestError::Schema(format!("Missing table: {name}")))?;
        located.push(location);
    }

    let (file, first_offset) = located[0];
    if located.iter().any(|(f, _)| *f != file) {
        return Err(IngestError::Schema(
            "This parser only supports the histogram file containing all tables as per iSDS generated CSV files"
                .to_string(),
        ));
    }
    if located.windows(2).any(|pair| pair[0].1 >= pair[1].1) {
        return Err(IngestError::Schema(
            "This parser expects the tables in the histogram file to be in order: housekeeping, position, A, B"
                .to_string(),
        ));
    }
    Ok((file, first_offset))
}

/// Imports a scan described by a SOFF XML descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct SoffImporter;

impl SoffImporter {
    /// Create the importer
    pub fn new() -> Self {
        Self
    }
}

impl Importer for SoffImporter {
    fn import(&self, ctx: &ImportContext) -> Result<ImportedScan> {
        let dir = &ctx.import_dir;
        let descriptor_path = find_descriptor(dir)?;
        info!("Reading SOFF descriptor: {}", descriptor_path.display());
        let descriptor = read_soff_descriptor(&descriptor_path)?;

        let tables = descriptor.table_locations();
        let image_files = descriptor.image_files()?;
        let file_of = |name: &str| -> Result<PathBuf> {
            tables
                .get(name)
                .map(|(file, _)| dir.join(file))
                .ok_or_else(|| IngestError::Schema(format!("Missing table: {name}")))
        };

        let (beams, _) = read_beam_locations(&file_of(BEAM_POSITIONS)?, true, 1, &DRIFT_COLUMNS)
            .context("beam")?;

        let (histogram_file, histogram_offset) = histogram_location(&tables)?;
        let spectra = read_spectra_csv_from_offset(&dir.join(histogram_file), histogram_offset)
            .context("spectra")?;

        let bulk_max = read_bulk_max_spectra(&[file_of(BULK_SUM)?, file_of(MAX_VALUE)?])
            .context("bulk")?;

        let housekeeping =
            read_housekeeping(&file_of(HOUSEKEEPING_FRAME)?, 1).context("housekeeping")?;

        let pseudo_ranges = required_pseudo_ranges(ctx.pseudo_intensity_ranges.as_deref())
            .context("pseudo-intensity")?;
        let pseudo = read_pseudo_intensity_file(&file_of(PSEUDO_MAP)?, false)
            .context("pseudo-intensity")?;

        let mut context_images: BTreeMap<Pmc, String> = BTreeMap::new();
        for image in image_files {
            match FileNameMeta::parse(&image.to_uppercase()) {
                Ok(meta) => match meta.pmc() {
                    Ok(pmc) => {
                        context_images.insert(pmc, image.to_string());
                    }
                    Err(_) => warn!("No PMC in context image file name: \"{image}\""),
                },
                Err(_) => error!("Failed to parse image file name: \"{image}\". Ignored."),
            }
        }

        let matched = read_matched_images(&dir.join("MATCHED"), &beams).context("matched")?;

        let housekeeping_name = tables
            .get(HOUSEKEEPING_FRAME)
            .map(|(file, _)| file.to_uppercase())
            .unwrap_or_default();
        let housekeeping_meta = FileNameMeta::parse(&housekeeping_name).map_err(|e| {
            IngestError::Parse(format!(
                "Failed to parse housekeeping file name: {housekeeping_name}. Error: {e}"
            ))
        })?;

        let scan = ScanAssembler::new(&ctx.expected_id, ScanInstrument::PixlFm, "PIXL")
            .group("PIXL-FM")
            .meta(file_meta_from_name(&housekeeping_meta))
            .beams(beams)
            .spectra(spectra)
            .bulk_max(bulk_max)
            .housekeeping(housekeeping)
            .pseudo(pseudo_ranges, pseudo)
            .context_images(context_images)
            .matched(matched)
            .finish(&ctx.expected_id)?;

        Ok(ImportedScan {
            scan,
            image_dir: dir.clone(),
        })
    }
}
