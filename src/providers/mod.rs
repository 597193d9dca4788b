//! Storage providers
//!
//! Every archival backend implements [`Provider`]. Workers drive providers
//! through the [`ProviderRegistry`]; the queue only ever sees provider names.
//!
//! Supported backends:
//! - Local filesystem directory (`local`)
//! - S3-compatible object storage (`s3`)

mod local;
mod registry;
mod s3;

pub use local::LocalProvider;
pub use registry::{ProviderRegistry, RegistryBuilder, RegistryError};
pub use s3::S3Provider;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::types::ProviderOptions;

/// Readable byte stream handed to [`Provider::upload`]
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Optional features a provider declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Uploaded objects can be deleted through [`Remover`]
    pub removal: bool,
    /// Objects can be pinned to a geographic region
    pub geofencing: bool,
}

/// What a provider knows about a previously uploaded object
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileInfo {
    /// Object is known by the provider
    pub exists: bool,
    /// Object is past the provider's processing stage
    pub done_processing: bool,
    /// Provider-specific details
    pub custom: serde_json::Map<String, serde_json::Value>,
}

impl FileInfo {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Errors raised by provider implementations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Options are invalid or unrecognized: {0}")]
    BadOptions(String),

    #[error("Provider {provider} does not support {capability}")]
    InvalidCapability {
        provider: String,
        capability: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage provider contract
#[async_trait]
pub trait Provider: Send + Sync {
    /// Lowercase ASCII name with no spaces, unique within a registry
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Store the bytes from `reader` and return the access handle for them.
    /// The options are provider-specific.
    async fn upload(
        &self,
        reader: ByteReader,
        options: &ProviderOptions,
    ) -> Result<String, ProviderError>;

    /// Look up an access handle.
    ///
    /// Fails only when the provider itself cannot be reached; an unknown
    /// handle is reported as `exists: false`.
    async fn file_info(&self, handle: &str) -> Result<FileInfo, ProviderError>;

    /// The removal half of the contract, for providers declaring
    /// [`Capabilities::removal`]
    fn remover(&self) -> Option<&dyn Remover> {
        None
    }
}

/// A provider that can delete content it stored
#[async_trait]
pub trait Remover: Provider {
    async fn remove(&self, handle: &str) -> Result<(), ProviderError>;
}

/// Remove `handle` from `provider` after checking it declares removal support
pub async fn remove(provider: &dyn Provider, handle: &str) -> Result<(), ProviderError> {
    let unsupported = || ProviderError::InvalidCapability {
        provider: provider.name().to_string(),
        capability: "removal",
    };

    if !provider.capabilities().removal {
        return Err(unsupported());
    }

    provider.remover().ok_or_else(unsupported)?.remove(handle).await
}

/// Read a string option, rejecting values of any other type
pub(crate) fn string_option<'a>(
    options: &'a ProviderOptions,
    key: &str,
) -> Result<Option<&'a str>, ProviderError> {
    match options.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ProviderError::BadOptions(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

/// Mock provider for testing
#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::AsyncReadExt;

    use super::*;

    pub struct MockProvider {
        pub name: String,
        pub handle: Option<String>,
        pub uploads: AtomicUsize,
    }

    impl MockProvider {
        /// A provider whose uploads succeed with `handle`
        pub fn succeeding(name: &str, handle: &str) -> Self {
            Self {
                name: name.to_string(),
                handle: Some(handle.to_string()),
                uploads: AtomicUsize::new(0),
            }
        }

        /// A provider whose uploads always fail
        pub fn failing(name: &str) -> Self {
            Self {
                name: name.to_string(),
                handle: None,
                uploads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        async fn upload(
            &self,
            mut reader: ByteReader,
            _options: &ProviderOptions,
        ) -> Result<String, ProviderError> {
            let mut data = Vec::new();
            reader.read_to_end(&mut data).await?;
            self.uploads.fetch_add(1, Ordering::SeqCst);

            self.handle
                .clone()
                .ok_or_else(|| ProviderError::Upload("backend rejected upload".to_string()))
        }

        async fn file_info(&self, handle: &str) -> Result<FileInfo, ProviderError> {
            Ok(FileInfo {
                exists: self.handle.as_deref() == Some(handle),
                done_processing: true,
                custom: Default::default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProvider;
    use super::*;

    #[tokio::test]
    async fn test_remove_requires_capability() {
        let provider = MockProvider::succeeding("ipfs", "cid:xyz");

        let err = remove(&provider, "cid:xyz").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::InvalidCapability { capability: "removal", .. }
        ));
    }

    #[test]
    fn test_string_option() {
        let options: ProviderOptions = serde_json::from_str(r#"{"key": "a/b", "n": 3}"#).unwrap();

        assert_eq!(string_option(&options, "key").unwrap(), Some("a/b"));
        assert_eq!(string_option(&options, "missing").unwrap(), None);
        assert!(matches!(
            string_option(&options, "n"),
            Err(ProviderError::BadOptions(_))
        ));
    }
}
