//! Structured documents on disk
//!
//! Documents are JSON trees. A `.gz` suffix selects gzip compression for
//! both reading and writing; any other recognised name is plain JSON.

use crate::error::DocumentError;
use crate::selector::Selector;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// On-disk compression of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain `.json`
    None,
    /// Gzip-compressed `.json.gz`
    Gzip,
}

impl Compression {
    /// Infer compression from a file name
    ///
    /// # Errors
    /// `UnknownExtension` unless the name ends in `.json` or `.json.gz`
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DocumentError::UnknownExtension(path.to_path_buf()))?;
        if name.ends_with(".json.gz") {
            Ok(Self::Gzip)
        } else if name.ends_with(".json") {
            Ok(Self::None)
        } else {
            Err(DocumentError::UnknownExtension(path.to_path_buf()))
        }
    }

    /// File extension (without leading dot)
    #[inline]
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::None => "json",
            Self::Gzip => "json.gz",
        }
    }
}

/// A loaded document tree
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    root: Value,
}

impl Document {
    /// Load a document, decompressing if needed
    ///
    /// # Errors
    /// IO failures, unknown extensions and malformed content
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let compression = Compression::from_path(path)?;
        let file = File::open(path).map_err(|e| DocumentError::io(path, e))?;

        let mut bytes = Vec::new();
        let read = match compression {
            Compression::Gzip => GzDecoder::new(BufReader::new(file)).read_to_end(&mut bytes),
            Compression::None => BufReader::new(file).read_to_end(&mut bytes),
        };
        read.map_err(|e| DocumentError::decode(path, e.to_string()))?;

        let root =
            serde_json::from_slice(&bytes).map_err(|e| DocumentError::decode(path, e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    /// Wrap an in-memory tree
    #[inline]
    #[must_use]
    pub fn from_value(path: impl Into<PathBuf>, root: Value) -> Self {
        Self {
            path: path.into(),
            root,
        }
    }

    /// Write the tree to `path`, compressing per its extension
    ///
    /// # Errors
    /// IO failures and unknown extensions
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        write_value(path.as_ref(), &self.root)
    }

    /// Source path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// First node matching `selector`
    ///
    /// # Errors
    /// `InvalidSelector` if the selector does not parse
    pub fn find(&self, selector: &str) -> Result<Option<&Value>, DocumentError> {
        Ok(Selector::parse(selector)?.select(&self.root))
    }

    /// All nodes matching `selector`
    ///
    /// # Errors
    /// `InvalidSelector` if the selector does not parse
    pub fn find_all(&self, selector: &str) -> Result<Vec<&Value>, DocumentError> {
        Ok(Selector::parse(selector)?.select_all(&self.root))
    }

    /// Numeric attribute of the first node matching `selector`
    ///
    /// Returns `Ok(None)` when the node or the attribute is absent. Numeric
    /// strings are accepted.
    ///
    /// # Errors
    /// `NotNumeric` when the attribute exists but is not a number
    pub fn attribute_f64(
        &self,
        selector: &Selector,
        attribute: &str,
    ) -> Result<Option<f64>, DocumentError> {
        let Some(raw) = selector.select(&self.root).and_then(|node| node.get(attribute)) else {
            return Ok(None);
        };
        as_f64(raw).map(Some).ok_or_else(|| DocumentError::NotNumeric {
            path: self.path.clone(),
            selector: selector.to_string(),
            attribute: attribute.to_string(),
        })
    }

    /// Like [`attribute_f64`](Self::attribute_f64) but absence is an error
    ///
    /// # Errors
    /// `MissingNode`, `MissingAttribute` or `NotNumeric`
    pub fn require_f64(&self, selector: &str, attribute: &str) -> Result<f64, DocumentError> {
        let parsed = Selector::parse(selector)?;
        let node = parsed
            .select(&self.root)
            .ok_or_else(|| DocumentError::MissingNode {
                path: self.path.clone(),
                selector: selector.to_string(),
            })?;
        if node.get(attribute).is_none() {
            return Err(DocumentError::MissingAttribute {
                path: self.path.clone(),
                selector: selector.to_string(),
                attribute: attribute.to_string(),
            });
        }
        self.attribute_f64(&parsed, attribute)?
            .ok_or_else(|| DocumentError::MissingNode {
                path: self.path.clone(),
                selector: selector.to_string(),
            })
    }
}

/// Numeric view of a JSON scalar
#[must_use]
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Serialise `value` to `path`, compressing per its extension
///
/// # Errors
/// IO failures and unknown extensions
pub fn write_value(path: &Path, value: &Value) -> Result<(), DocumentError> {
    let compression = Compression::from_path(path)?;
    let file = File::create(path).map_err(|e| DocumentError::io(path, e))?;
    let io_err = |e: std::io::Error| DocumentError::io(path, e);

    match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(BufWriter::new(file), flate2::Compression::default());
            serde_json::to_writer(&mut encoder, value)
                .map_err(|e| DocumentError::decode(path, e.to_string()))?;
            encoder.finish().map_err(io_err)?.flush().map_err(io_err)?;
        }
        Compression::None => {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, value)
                .map_err(|e| DocumentError::decode(path, e.to_string()))?;
            writer.flush().map_err(io_err)?;
        }
    }
    Ok(())
}

/// `true` if `path` exists, decompresses and parses as a document
#[must_use]
pub fn validate(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if !path.is_file() {
        return false;
    }
    match Document::open(path) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("invalid document {}: {}", path.display(), e);
            false
        }
    }
}
