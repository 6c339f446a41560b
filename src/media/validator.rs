//! Declared-type and size checks run before anything touches disk.

use thiserror::Error;

use crate::media::mimetype;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("file type {0} is not allowed")]
    UnsupportedType(String),

    #[error("file is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("file is empty")]
    Empty,

    #[error("declared size {declared} does not match received {actual} bytes")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("invalid category {0:?}")]
    InvalidCategory(String),
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed_mime_types: Vec<String>,
    max_bytes: u64,
}

impl UploadPolicy {
    pub fn new<I, S>(allowed_mime_types: I, max_bytes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_mime_types: allowed_mime_types
                .into_iter()
                .map(|m| mimetype::normalize(m.as_ref()))
                .collect(),
            max_bytes,
        }
    }

    /// Pure check of the declared MIME type and byte size. The file name and
    /// its extension play no part here.
    pub fn validate(&self, declared_mime_type: &str, byte_size: u64) -> Result<(), Rejection> {
        let mime = mimetype::normalize(declared_mime_type);
        if !self.allowed_mime_types.iter().any(|allowed| *allowed == mime) {
            return Err(Rejection::UnsupportedType(declared_mime_type.to_string()));
        }
        if byte_size == 0 {
            return Err(Rejection::Empty);
        }
        if byte_size > self.max_bytes {
            return Err(Rejection::TooLarge {
                size: byte_size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(mimetype::DEFAULT_ALLOWED, DEFAULT_MAX_BYTES)
    }
}

pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Categories double as directory names under the upload root.
pub fn validate_category(category: &str) -> Result<(), Rejection> {
    let well_formed = !category.is_empty()
        && category.len() <= 64
        && category
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !well_formed || category == crate::assets::THUMBNAIL_DIR {
        return Err(Rejection::InvalidCategory(category.to_string()));
    }
    Ok(())
}
