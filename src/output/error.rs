/// Errors decoding `dataset.bin` or a ZERO-RUN stream
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input ended early or could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File did not start with the artifact magic
    #[error("Not a scan artifact: bad magic")]
    BadMagic,

    /// Format version this build cannot read
    #[error("Unsupported scan artifact version: {0}")]
    UnsupportedVersion(u16),

    /// Type or option tag out of range
    #[error("Invalid tag: {0}")]
    InvalidTag(u8),

    /// Length prefix larger than the remaining input
    #[error("Invalid length prefix: {0}")]
    InvalidLength(usize),

    /// String field was not UTF-8
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Bytes left over after the last field
    #[error("{0} trailing bytes after scan artifact")]
    TrailingBytes(u64),

    /// ZERO-RUN stream ended on a zero with no run length
    #[error("Zero at index {0} has no run length")]
    TruncatedZeroRun(usize),

    /// ZERO-RUN run length was not positive
    #[error("Zero at index {index} has invalid run length {run}")]
    InvalidZeroRun {
        /// Index of the zero marker
        index: usize,
        /// Run length found
        run: i64,
    },
}
