//! Provider registry
//!
//! Built once at startup and read-only afterwards. Provider names double as
//! column names in the `files` table, so they are validated here before any
//! SQL ever sees them.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::{Provider, ProviderError};

/// Columns of `files` that a provider name may not shadow
const RESERVED_NAMES: &[&str] = &["file_id", "storage_request", "time"];

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Invalid provider name {0:?}: expected lowercase ASCII letters, digits or '_', starting with a letter")]
    InvalidName(String),

    #[error("Provider name {0:?} is reserved")]
    ReservedName(String),

    #[error("Provider {0:?} is already registered")]
    Duplicate(String),
}

/// Collects providers before the queue starts serving claims
#[derive(Default)]
pub struct RegistryBuilder {
    providers: Vec<Arc<dyn Provider>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, rejecting names that are unsafe as column identifiers
    pub fn register(mut self, provider: Arc<dyn Provider>) -> Result<Self, RegistryError> {
        let name = provider.name();
        validate_name(name)?;

        if self.providers.iter().any(|p| p.name() == name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        self.providers.push(provider);
        Ok(self)
    }

    pub fn build(self) -> ProviderRegistry {
        let index = self
            .providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name().to_string(), i))
            .collect();

        ProviderRegistry {
            providers: self.providers,
            index,
        }
    }
}

/// Name to provider mapping shared by the queue store and the workers
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.index.get(name).map(|&i| Arc::clone(&self.providers[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Column of `files` that stores access handles for `name`.
    ///
    /// Only registered (and therefore validated) names resolve.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .map(|&i| self.providers[i].name())
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Remove an uploaded object, checking the provider's capabilities first
    pub async fn remove(&self, name: &str, handle: &str) -> Result<(), ProviderError> {
        let provider = self
            .get(name)
            .ok_or_else(|| ProviderError::Unavailable(format!("unknown provider {}", name)))?;

        super::remove(provider.as_ref(), handle).await
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_valid = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !starts_with_letter || !rest_valid {
        return Err(RegistryError::InvalidName(name.to_string()));
    }

    if RESERVED_NAMES.contains(&name) {
        return Err(RegistryError::ReservedName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    fn mock(name: &str) -> Arc<dyn Provider> {
        Arc::new(MockProvider::succeeding(name, "handle"))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ProviderRegistry::builder()
            .register(mock("ipfs"))
            .unwrap()
            .register(mock("s3"))
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("ipfs"));
        assert_eq!(registry.get("s3").unwrap().name(), "s3");
        assert_eq!(registry.column("ipfs"), Some("ipfs"));
        assert_eq!(registry.column("filecoin"), None);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["ipfs", "s3"]);
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = ProviderRegistry::builder()
            .register(mock("s3"))
            .unwrap()
            .register(mock("s3"));

        assert!(matches!(result, Err(RegistryError::Duplicate(name)) if name == "s3"));
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in ["", "S3", "9lives", "drop table", "s3\"; --", "web-3"] {
            let result = ProviderRegistry::builder().register(mock(name));
            assert!(
                matches!(result, Err(RegistryError::InvalidName(_))),
                "{:?} should be rejected",
                name
            );
        }

        let result = ProviderRegistry::builder().register(mock("file_id"));
        assert!(matches!(result, Err(RegistryError::ReservedName(_))));
    }
}
