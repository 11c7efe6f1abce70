use std::fmt;
use std::path::Path;

use super::ids::{decode_drive_id, decode_site_id, decode_version};
use super::FileNameError;

/// Length of every instrument file name, extension included
pub const GDS_FILE_NAME_LENGTH: usize = 58;

/// Instrument file name split into its fixed-width fields
///
/// ```text
/// PS__D077T0637741109_000RFS_N001003600098356100640__J01.CSV
/// ^^                                                           instrument
///   ^                                                          colour filter
///    ^                                                         special
///     ^^^^                                                     primary timestamp (SOL)
///         ^                                                    venue
///          ^^^^^^^^^^                                          secondary timestamp (SCLK)
///                     ^^^                                      ternary timestamp
///                        ^^^                                   product type
///                           ^^                                 geometry, thumbnail
///                             ^^^^^^^                          site, drive
///                                    ^^^^^^^^^                 sequence / RTT
///                                             ^^^^             camera specific (PMC)
///                                                 ^^^^         downsample, compression, producer
///                                                     ^^ ^^^   version, extension
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileNameMeta {
    /// Instrument code, e.g. `PS`, `PC`, `PE`
    pub instrument: String,
    /// Colour filter, `W` for white LEDs
    pub colour_filter: String,
    /// Special processing flag
    pub special: String,
    /// SOL, or a `D`/`C` prefixed ground test day
    pub primary_timestamp: String,
    /// Venue code
    pub venue: String,
    /// SCLK
    pub secondary_timestamp: String,
    /// Ternary timestamp
    pub ternary_timestamp: String,
    /// Product type, e.g. `RFS`, `RXL`
    pub prod_type: String,
    /// Geometry flag
    pub geometry: String,
    /// Thumbnail flag
    pub thumbnail: String,
    /// Encoded site
    pub site: String,
    /// Encoded drive
    pub drive: String,
    /// Sequence number / RTT
    pub seq_rtt: String,
    /// Camera specific field, holds the PMC for PIXL products
    pub cam_specific: String,
    /// Downsample flag
    pub downsample: String,
    /// Compression code
    pub compression: String,
    /// Producer code
    pub producer: String,
    /// Encoded version
    pub version_str: String,
    /// File extension, as written
    pub extension: String,
}

impl FileNameMeta {
    /// Parse the base name of `path` as an instrument file name.
    pub fn parse(path: &str) -> Result<Self, FileNameError> {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);

        if name.len() != GDS_FILE_NAME_LENGTH || !name.is_ascii() {
            return Err(FileNameError::ParseFail {
                field: "file name",
                value: name.to_string(),
            });
        }

        let f = |from: usize, to: usize| name[from..to].to_string();

        Ok(Self {
            instrument: f(0, 2),
            colour_filter: f(2, 3),
            special: f(3, 4),
            primary_timestamp: f(4, 8),
            venue: f(8, 9),
            secondary_timestamp: f(9, 19),
            ternary_timestamp: f(20, 23),
            prod_type: f(23, 26),
            geometry: f(26, 27),
            thumbnail: f(27, 28),
            site: f(28, 31),
            drive: f(31, 35),
            seq_rtt: f(35, 44),
            cam_specific: f(44, 48),
            downsample: f(48, 49),
            compression: f(49, 51),
            producer: f(51, 52),
            version_str: f(52, 54),
            extension: f(55, 58),
        })
    }

    /// PMC held in the camera-specific field. Only PIXL instruments carry one.
    pub fn pmc(&self) -> Result<i32, FileNameError> {
        if !matches!(self.instrument.as_str(), "PC" | "PE" | "PS") {
            return Err(FileNameError::ParseFail {
                field: "PMC",
                value: self.instrument.clone(),
            });
        }
        parse_int("PMC", &self.cam_specific)
    }

    /// SOL (primary timestamp) as written
    pub fn sol(&self) -> &str {
        &self.primary_timestamp
    }

    /// SCLK (secondary timestamp) as an integer
    pub fn sclk(&self) -> Result<i32, FileNameError> {
        parse_int("SCLK", &self.secondary_timestamp)
    }

    /// RTT as written, zero padded to 9 digits
    pub fn rtt(&self) -> &str {
        &self.seq_rtt
    }

    /// RTT as an integer
    pub fn rtt_number(&self) -> Result<i32, FileNameError> {
        parse_int("RTT", &self.seq_rtt)
    }

    /// Decoded site number
    pub fn site_id(&self) -> Result<i32, FileNameError> {
        decode_site_id(&self.site)
    }

    /// Decoded drive number
    pub fn drive_id(&self) -> Result<i32, FileNameError> {
        decode_drive_id(&self.drive)
    }

    /// Decoded version number
    pub fn version(&self) -> Result<i32, FileNameError> {
        decode_version(&self.version_str)
    }

    /// File name without the extension
    pub fn stem(&self) -> String {
        format!(
            "{}{}{}{}{}{}_{}{}{}{}{}{}{}{}{}{}{}{}",
            self.instrument,
            self.colour_filter,
            self.special,
            self.primary_timestamp,
            self.venue,
            self.secondary_timestamp,
            self.ternary_timestamp,
            self.prod_type,
            self.geometry,
            self.thumbnail,
            self.site,
            self.drive,
            self.seq_rtt,
            self.cam_specific,
            self.downsample,
            self.compression,
            self.producer,
            self.version_str,
        )
    }

    /// Full file name, extension included
    pub fn to_file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.extension)
    }

    /// Grouping key for "latest version" selection: everything except version,
    /// timestamps, geometry, thumbnail and special flag.
    pub fn identity_key(&self) -> String {
        format!(
            "{}{}{}{}{}{}{}{}{}{}{}",
            self.extension.to_uppercase(),
            self.instrument,
            self.colour_filter,
            self.prod_type,
            self.site,
            self.drive,
            self.seq_rtt,
            self.cam_specific,
            self.downsample,
            self.compression,
            self.producer,
        )
    }
}

impl fmt::Display for FileNameMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Mask the product type, downsample, compression, version and extension of a
/// file name so sibling products of one observation compare equal.
///
/// Returns `None` unless the name has the instrument file name length and a
/// `_` after the SCLK.
pub fn make_comparable_name(name: &str) -> Option<String> {
    if name.len() != GDS_FILE_NAME_LENGTH || !name.is_ascii() || name.as_bytes()[19] != b'_' {
        return None;
    }
    Some(format!(
        "{}___{}___{}__.___",
        &name[0..23],
        &name[26..48],
        &name[51..52]
    ))
}

fn parse_int(field: &'static str, value: &str) -> Result<i32, FileNameError> {
    value.parse::<i32>().map_err(|_| FileNameError::ParseFail {
        field,
        value: value.to_string(),
    })
}
