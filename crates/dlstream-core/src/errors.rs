//! Codec error types.

use thiserror::Error;

/// Reasons an inbound text frame is rejected by the envelope codec.
///
/// A rejected frame is dropped at the transport boundary and never reaches
/// a subscription handler.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame parsed, but is not a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The object has no string `type` field.
    #[error("frame has no string `type` field")]
    MissingType,
    /// The frame exceeds the configured size limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    TooLarge {
        /// Frame length in bytes.
        len: usize,
        /// Configured limit in bytes.
        max: usize,
    },
}

impl CodecError {
    /// Short machine-readable reason, used as a structured log field.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::TooLarge { .. } => "too_large",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_json_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err = CodecError::from(json_err);
        assert!(err.to_string().starts_with("invalid JSON"));
        assert_eq!(err.reason(), "invalid_json");
    }

    #[test]
    fn too_large_display() {
        let err = CodecError::TooLarge { len: 10, max: 4 };
        assert_eq!(err.to_string(), "frame of 10 bytes exceeds limit of 4 bytes");
        assert_eq!(err.reason(), "too_large");
    }
}
