//! Error types for document access

use std::path::PathBuf;

/// Errors raised while loading or querying a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// IO error while reading or writing
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File did not decode into a structured document
    #[error("malformed document {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// File name carries no recognised document extension
    #[error("unknown document extension for '{0}'")]
    UnknownExtension(PathBuf),

    /// Selector matched nothing
    #[error("no node matches '{selector}' in {path}")]
    MissingNode { path: PathBuf, selector: String },

    /// Node exists but lacks the attribute
    #[error("node '{selector}' has no attribute '{attribute}' in {path}")]
    MissingAttribute {
        path: PathBuf,
        selector: String,
        attribute: String,
    },

    /// Attribute is present but not a number
    #[error("attribute '{attribute}' of '{selector}' is not numeric in {path}")]
    NotNumeric {
        path: PathBuf,
        selector: String,
        attribute: String,
    },

    /// Selector text could not be parsed
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
}

impl DocumentError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create decode error for path
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}
