//! File sources
//!
//! Turn a request's `file_pointer` into a byte stream for upload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::providers::ByteReader;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid file pointer: {0}")]
    InvalidPointer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves file pointers to readable streams
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn open(&self, pointer: &str) -> Result<ByteReader, SourceError>;
}

/// Reads file pointers as filesystem paths, optionally confined to a root
pub struct LocalFileSource {
    root: Option<PathBuf>,
}

impl LocalFileSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, pointer: &str) -> Result<PathBuf, SourceError> {
        let pointer = pointer.strip_prefix("file://").unwrap_or(pointer);
        if pointer.is_empty() {
            return Err(SourceError::InvalidPointer(pointer.to_string()));
        }

        let Some(root) = &self.root else {
            return Ok(PathBuf::from(pointer));
        };

        // Under a root, pointers are relative and may not climb out of it
        let path = Path::new(pointer.trim_start_matches('/'));
        let escapes = path
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir));
        if escapes {
            return Err(SourceError::InvalidPointer(pointer.to_string()));
        }

        Ok(root.join(path))
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn open(&self, pointer: &str) -> Result<ByteReader, SourceError> {
        let path = self.resolve(pointer)?;

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
