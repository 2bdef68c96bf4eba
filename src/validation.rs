//! Upload validation: extension allow-list, size ceiling, label length.
//!
//! Checks only look at what the client declared. The bytes are never sniffed,
//! so a renamed non-image with an allowed extension passes.

use crate::models::upload::UploadedFile;
use thiserror::Error;

pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("only image files ({allowed}) are allowed")]
    UnsupportedExtension { allowed: String },
    /// `size` is `None` when the body was cut off before it was fully read.
    #[error("image exceeds the {limit} limit")]
    FileTooLarge { size: Option<u64>, limit: String },
    #[error("label cannot be longer than {max} characters")]
    LabelTooLong { max: usize },
    #[error("missing multipart field `{0}`")]
    MissingField(&'static str),
    #[error("malformed upload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct FileValidator {
    allowed_extensions: Vec<String>,
    max_size_bytes: u64,
    max_size_display: String,
    max_label_len: usize,
}

impl FileValidator {
    pub fn new(
        allowed_extensions: impl IntoIterator<Item = impl Into<String>>,
        max_size_bytes: u64,
        max_size_display: impl Into<String>,
        max_label_len: usize,
    ) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_size_bytes,
            max_size_display: max_size_display.into(),
            max_label_len,
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Extension first, then size; the first failure is reported.
    pub fn validate(&self, file: &UploadedFile) -> Result<(), ValidationError> {
        self.validate_name(&file.name)?;
        if file.size_bytes > self.max_size_bytes {
            return Err(self.too_large(Some(file.size_bytes)));
        }
        Ok(())
    }

    /// Ceiling error for a payload of `size` bytes, if known.
    pub fn too_large(&self, size: Option<u64>) -> ValidationError {
        ValidationError::FileTooLarge {
            size,
            limit: self.max_size_display.clone(),
        }
    }

    /// Extension check alone, usable before the bytes have arrived.
    pub fn validate_name(&self, name: &str) -> Result<(), ValidationError> {
        let allowed = crate::models::upload::extension_of(name)
            .map(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedExtension {
                allowed: self.allowed_extensions.join(", "),
            })
        }
    }

    /// Length is counted in characters, not bytes.
    pub fn validate_label(&self, label: &str) -> Result<(), ValidationError> {
        if label.chars().count() > self.max_label_len {
            Err(ValidationError::LabelTooLong {
                max: self.max_label_len,
            })
        } else {
            Ok(())
        }
    }
}
