use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BlobError;

/// Opaque bytes keyed by path, used for payload offload between stages and
/// for run checkpoints.
///
/// Keys are `/`-separated relative paths. Lifecycle policy (expiry of old
/// payload prefixes) is owned by the backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at a key, overwriting any previous value.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError>;

    /// Retrieve the bytes at a key. Returns `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BlobError>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, BlobError>;

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// Validate a blob key: non-empty, relative, no parent traversal.
pub(crate) fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() {
        return Err(BlobError::InvalidKey("empty key".into()));
    }
    if key.starts_with('/') {
        return Err(BlobError::InvalidKey(format!("absolute key: {key}")));
    }
    if key.split('/').any(|part| part == "..") {
        return Err(BlobError::InvalidKey(format!("parent traversal in key: {key}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys_pass() {
        assert!(validate_key("payloads/2024-06-01/abc/fetch-1.json").is_ok());
        assert!(validate_key("a").is_ok());
    }

    #[test]
    fn invalid_keys_fail() {
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs/path").is_err());
        assert!(validate_key("a/../b").is_err());
    }
}
