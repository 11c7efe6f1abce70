/// Errors decoding an instrument file name or one of its encoded fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileNameError {
    /// Value did not follow the expected grammar
    #[error("Failed to convert: {value} to {field}")]
    ParseFail {
        /// Field being decoded
        field: &'static str,
        /// Offending text
        value: String,
    },

    /// Value followed the grammar but decoded out of range
    #[error("{field} code {value} decodes out of range")]
    RangeFail {
        /// Field being decoded
        field: &'static str,
        /// Offending text
        value: String,
    },
}
