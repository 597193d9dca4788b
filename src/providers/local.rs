//! Local filesystem provider
//!
//! Copies uploads into a directory on disk. Handles are paths relative to
//! that directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{string_option, ByteReader, Capabilities, FileInfo, Provider, ProviderError, Remover};
use crate::types::ProviderOptions;

/// Stores objects under a base directory
pub struct LocalProvider {
    base_path: PathBuf,
}

impl LocalProvider {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Resolve a handle to a path inside the base directory
    fn resolve(&self, handle: &str) -> Option<PathBuf> {
        relative_path(handle).map(|p| self.base_path.join(p))
    }
}

/// Accept only plain relative paths, so handles and options cannot escape
/// the base directory
fn relative_path(value: &str) -> Option<&Path> {
    let path = Path::new(value);
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)));

    if value.is_empty() || !plain {
        None
    } else {
        Some(path)
    }
}

/// Copy `reader` into `tmp_path`, sync it and move it to `path`
async fn write_object(
    reader: &mut ByteReader,
    tmp_path: &Path,
    path: &Path,
) -> std::io::Result<u64> {
    let mut file = fs::File::create(tmp_path).await?;
    let written = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp_path, path).await?;
    Ok(written)
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            removal: true,
            geofencing: false,
        }
    }

    async fn upload(
        &self,
        mut reader: ByteReader,
        options: &ProviderOptions,
    ) -> Result<String, ProviderError> {
        let subdir = match string_option(options, "subdir")? {
            Some(dir) => Some(relative_path(dir).ok_or_else(|| {
                ProviderError::BadOptions(format!("subdir must be a relative path: {}", dir))
            })?),
            None => None,
        };

        let object_name = Uuid::new_v4().simple().to_string();
        let handle = match subdir {
            Some(dir) => dir.join(&object_name),
            None => PathBuf::from(&object_name),
        };

        let path = self.base_path.join(&handle);
        let parent = path.parent().unwrap_or(self.base_path.as_path());
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Failed to create {}: {}", parent.display(), e)))?;

        // Write to a temporary name first so a partial copy never looks like an object
        let tmp_path = path.with_extension("partial");
        let written = match write_object(&mut reader, &tmp_path, &path).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ProviderError::Upload(format!("Failed to store upload: {}", e)));
            }
        };

        let handle = handle.to_string_lossy().into_owned();
        tracing::debug!(handle = %handle, bytes = written, "Stored local object");

        Ok(handle)
    }

    async fn file_info(&self, handle: &str) -> Result<FileInfo, ProviderError> {
        let Some(path) = self.resolve(handle) else {
            return Ok(FileInfo::missing());
        };

        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                let mut custom = serde_json::Map::new();
                custom.insert("size".to_string(), metadata.len().into());
                custom.insert(
                    "path".to_string(),
                    path.to_string_lossy().into_owned().into(),
                );

                Ok(FileInfo {
                    exists: true,
                    done_processing: true,
                    custom,
                })
            }
            Ok(_) => Ok(FileInfo::missing()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileInfo::missing()),
            Err(e) => Err(ProviderError::Unavailable(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Remover for LocalProvider {
    async fn remove(&self, handle: &str) -> Result<(), ProviderError> {
        let path = self
            .resolve(handle)
            .ok_or_else(|| ProviderError::BadOptions(format!("Invalid handle: {}", handle)))?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
