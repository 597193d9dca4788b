//! Shared request and status types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provider-specific option bag. Only the provider interprets it.
pub type ProviderOptions = serde_json::Map<String, serde_json::Value>;

/// A client's request to archive one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRequest {
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOptions>,
    pub hash: String,
    pub file_pointer: String,
}

impl StorageRequest {
    /// Options submitted for one provider, empty if none were given
    pub fn options_for(&self, provider: &str) -> ProviderOptions {
        self.providers.get(provider).cloned().unwrap_or_default()
    }

    /// Destination providers named by this request, in name order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// Upload state of a single queue task
///
/// Persisted as an integer; the discriminants are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending = 0,
    InProgress = 1,
    Success = 2,
    Failed = 3,
}

impl UploadStatus {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::InProgress),
            2 => Some(Self::Success),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Success is the only terminal state
    pub fn is_terminal(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        for status in [
            UploadStatus::Pending,
            UploadStatus::InProgress,
            UploadStatus::Success,
            UploadStatus::Failed,
        ] {
            assert_eq!(UploadStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(UploadStatus::Success.code(), 2);
        assert_eq!(UploadStatus::from_code(7), None);
    }

    #[test]
    fn test_only_success_is_terminal() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::InProgress.is_terminal());
        assert!(!UploadStatus::Failed.is_terminal());
        assert!(UploadStatus::Success.is_terminal());
    }

    #[test]
    fn test_storage_request_wire_shape() {
        let json = r#"{
            "requirements": ["geofenced"],
            "providers": {"s3": {"key": "abc"}, "local": {}},
            "hash": "abc123",
            "file_pointer": "uploads/abc123.bin"
        }"#;

        let request: StorageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.hash, "abc123");
        assert_eq!(request.provider_names(), vec!["local", "s3"]);
        assert_eq!(
            request.options_for("s3").get("key"),
            Some(&serde_json::json!("abc"))
        );
        assert!(request.options_for("ipfs").is_empty());
    }
}
