//! Error types for slide text extraction and reintegration.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or rewriting a presentation container.
///
/// Only container-wide failures abort an operation. Errors scoped to one slide
/// or one media asset are recovered by the caller and surfaced through reports.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or write a file on disk.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The input is missing, has the wrong suffix, or is not a ZIP container.
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// One XML part could not be parsed.
    #[error("Malformed part '{part}': {reason}")]
    MalformedPart { part: String, reason: String },

    /// The content-type manifest could not be patched.
    #[error("Failed to patch content types: {0}")]
    ManifestPatchFailed(String),

    /// ZIP archive error while reading or repackaging.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or serialization error.
    #[error("XML parsing error: {0}")]
    XmlError(String),
}

impl Error {
    /// Attach a part name to an XML error, turning it into [`Error::MalformedPart`].
    pub fn in_part(self, part: &str) -> Self {
        match self {
            Error::XmlError(reason) => Error::MalformedPart {
                part: part.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Whether this error only affects a single part and can be recovered from.
    pub fn is_part_scoped(&self) -> bool {
        matches!(self, Error::MalformedPart { .. } | Error::XmlError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_part_wraps_xml_errors() {
        let err = Error::XmlError("unexpected end".to_string()).in_part("ppt/slides/slide2.xml");
        assert!(matches!(err, Error::MalformedPart { .. }));
        assert_eq!(
            err.to_string(),
            "Malformed part 'ppt/slides/slide2.xml': unexpected end"
        );
    }

    #[test]
    fn test_in_part_keeps_other_errors() {
        let err = Error::InvalidContainer("deck.txt".to_string()).in_part("x");
        assert!(matches!(err, Error::InvalidContainer(_)));
        assert!(!err.is_part_scoped());
    }
}
