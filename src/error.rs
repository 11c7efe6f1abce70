//! Error types shared by every ingestion stage.
//!
//! Parsers return the specific failure; importers and the driver wrap it with
//! file, row or role context via [`ResultExt`]. [`IngestError::kind`] classifies
//! any error (including wrapped ones) into one of the [`ErrorKind`] groups.

use std::fmt;

use crate::gds::FileNameError;
use crate::model::MetaType;
use crate::output::CodecError;
use crate::readers::MsaError;

/// Coarse classification of ingestion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad row, bad column value, bad header line or bad file name grammar
    Parse,
    /// Unexpected or missing columns, duplicate tables, wrong table order
    Schema,
    /// Cross-record invariant violated (duplicate shots, inconsistent beams, type drift)
    Integrity,
    /// A file, directory or required role was not present
    MissingInput,
    /// The dispatcher could not match the input directory to an importer
    UnknownFormat,
    /// No "latest version" could be selected among candidate files
    VersionAmbiguity,
    /// Image conversion, catalog or output write failed
    SideEffect,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::MissingInput => "MissingInput",
            ErrorKind::UnknownFormat => "UnknownFormat",
            ErrorKind::VersionAmbiguity => "VersionAmbiguity",
            ErrorKind::SideEffect => "SideEffectError",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while ingesting a scan
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error reading inputs or writing outputs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV tokenizer error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML error in a SOFF descriptor
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP extraction error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// MSA spectrum file error
    #[error("MSA error: {0}")]
    Msa(#[from] MsaError),

    /// Scan artifact or ZERO-RUN stream could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Instrument file name did not follow the GDS grammar
    #[error("File name error: {0}")]
    FileName(#[from] FileNameError),

    /// Delimited file produced no rows
    #[error("Read 0 rows from: {0}")]
    EmptyFile(String),

    /// Generic value-level parse failure
    #[error("{0}")]
    Parse(String),

    /// Generic schema failure (columns, tables)
    #[error("{0}")]
    Schema(String),

    /// Header row did not match the expected literal
    #[error("{0} has unexpected headers")]
    UnexpectedHeaders(String),

    /// Beam CSV `_i`/`_j` column pair out of order
    #[error("Unexpected column header {next} after {current}")]
    UnexpectedColumnOrder {
        /// The `_i` column that opened the pair
        current: String,
        /// The column found where its `_j` partner was expected
        next: String,
    },

    /// Beam CSV image-coordinate region did not hold a positive even column count
    #[error("Unexpected count of i/j columns: {0}")]
    UnexpectedIJColumnCount(usize),

    /// Generic cross-record invariant failure
    #[error("{0}")]
    Integrity(String),

    /// Same shot id seen twice within one file
    #[error("Duplicate PMC: {0}")]
    DuplicateShotId(i32),

    /// Dwell spectrum without a normal spectrum for the same shot
    #[error("Found dwell spectrum PMC: {0} which has no corresponding normal spectrum")]
    UnmatchedDwell(i32),

    /// Shots in a scan disagree about which images their beam projects onto
    #[error("Beam location image PMCs differ between shots: PMC {pmc} has {found:?}, expected {expected:?}")]
    InconsistentBeamImageSet {
        /// Shot whose key set differed
        pmc: i32,
        /// Key set of the first shot with a beam
        expected: Vec<i32>,
        /// Key set of the offending shot
        found: Vec<i32>,
    },

    /// A meta label was stored with two different types
    #[error("Metadata \"{label}\" already stored as type \"{existing}\", got \"{got}\"")]
    MetaTypeDrift {
        /// Label name
        label: String,
        /// Type on first sight
        existing: MetaType,
        /// Conflicting type
        got: MetaType,
    },

    /// Required file, directory or role not present
    #[error("{0}")]
    MissingInput(String),

    /// Dispatcher found no matching importer
    #[error("{0}")]
    UnknownFormat(String),

    /// All version candidates failed to parse
    #[error("{0}")]
    VersionAmbiguity(String),

    /// Output side effect failed
    #[error("{0}")]
    SideEffect(String),

    /// Error annotated with file, row or role context
    #[error("{context}: {source}")]
    Context {
        /// Annotation, e.g. a role name or file path
        context: String,
        /// Underlying error
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Classify this error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::MissingInput
            }
            IngestError::Io(_) | IngestError::Zip(_) | IngestError::SideEffect(_) => {
                ErrorKind::SideEffect
            }
            IngestError::Csv(_)
            | IngestError::Json(_)
            | IngestError::Xml(_)
            | IngestError::Msa(_)
            | IngestError::Codec(_)
            | IngestError::FileName(_)
            | IngestError::EmptyFile(_)
            | IngestError::Parse(_) => ErrorKind::Parse,
            IngestError::Schema(_)
            | IngestError::UnexpectedHeaders(_)
            | IngestError::UnexpectedColumnOrder { .. }
            | IngestError::UnexpectedIJColumnCount(_) => ErrorKind::Schema,
            IngestError::Integrity(_)
            | IngestError::DuplicateShotId(_)
            | IngestError::UnmatchedDwell(_)
            | IngestError::InconsistentBeamImageSet { .. }
            | IngestError::MetaTypeDrift { .. } => ErrorKind::Integrity,
            IngestError::MissingInput(_) => ErrorKind::MissingInput,
            IngestError::UnknownFormat(_) => ErrorKind::UnknownFormat,
            IngestError::VersionAmbiguity(_) => ErrorKind::VersionAmbiguity,
            IngestError::Context { source, .. } => source.kind(),
        }
    }

    /// Innermost error beneath any context wrappers.
    pub fn root(&self) -> &IngestError {
        match self {
            IngestError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Wrap with a context annotation.
    pub fn context(self, context: impl Into<String>) -> Self {
        IngestError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Context annotation for results carrying an error convertible to [`IngestError`].
pub trait ResultExt<T> {
    /// Annotate the error with a fixed context string.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Annotate the error with a lazily built context string.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: Into<IngestError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_context() {
        let err = IngestError::DuplicateShotId(12)
            .context("beam.csv")
            .context("beam");
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(matches!(err.root(), IngestError::DuplicateShotId(12)));
        assert_eq!(err.to_string(), "beam: beam.csv: Duplicate PMC: 12");
    }

    #[test]
    fn test_io_not_found_is_missing_input() {
        let err = IngestError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        assert_eq!(err.kind(), ErrorKind::MissingInput);

        let err = IngestError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "nope",
        ));
        assert_eq!(err.kind(), ErrorKind::SideEffect);
    }

    #[test]
    fn test_result_ext_annotates() {
        let res: std::result::Result<(), IngestError> =
            Err(IngestError::Schema("Missing table: histogram_A".to_string()));
        let err = res.context("soff").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.to_string(), "soff: Missing table: histogram_A");
    }
}
