//! Codec error types

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while decoding or encoding an item
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not valid JSON for the target type
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Strict decoding found a key the target type does not declare
    #[error("unknown field '{path}'")]
    UnknownField {
        /// Dotted path of the offending key
        path: String,
    },

    /// Payload is not valid UTF-8
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl CodecError {
    /// Create an UnknownField error
    pub fn unknown_field(path: impl Into<String>) -> Self {
        Self::UnknownField { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_display() {
        let err = CodecError::unknown_field("person.age");
        assert_eq!(err.to_string(), "unknown field 'person.age'");
    }

    #[test]
    fn test_utf8_conversion() {
        let bytes = [0xff, 0xfe];
        let err: CodecError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(matches!(err, CodecError::Utf8(_)));
        assert!(err.to_string().starts_with("invalid utf-8"));
    }
}
