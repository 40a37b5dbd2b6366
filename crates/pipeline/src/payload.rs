use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use mailbrief_blob::{BlobError, BlobStore};
use mailbrief_core::{ErrorCode, INLINE_PAYLOAD_LIMIT, PayloadReference, ServiceError, Stage, now_ms};

/// Errors raised while storing or retrieving stage payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("payload serialization error: {0}")]
    Serialization(String),

    /// An offloaded payload key that no longer resolves.
    #[error("offloaded payload missing: {0}")]
    Missing(String),
}

impl ServiceError for PayloadError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Blob(e) => e.error_code(),
            Self::Serialization(_) | Self::Missing(_) => ErrorCode::Fatal,
        }
    }
}

/// Decides inline-vs-offloaded for stage payloads.
///
/// Payloads at or under the inline limit travel in the envelope; larger
/// ones are written to blob storage under
/// `payloads/YYYY-MM-DD/{correlation_id}/{stage}-{unix_ms}.json`.
#[derive(Clone)]
pub struct PayloadManager {
    blobs: Arc<dyn BlobStore>,
    inline_limit: usize,
}

impl std::fmt::Debug for PayloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadManager")
            .field("inline_limit", &self.inline_limit)
            .finish_non_exhaustive()
    }
}

impl PayloadManager {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            inline_limit: INLINE_PAYLOAD_LIMIT,
        }
    }

    /// Override the inline threshold (tests force the offload path).
    #[must_use]
    pub fn with_inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    /// Store a payload, offloading when it exceeds the inline limit.
    pub async fn store(
        &self,
        value: &serde_json::Value,
        correlation_id: Uuid,
        stage: Stage,
    ) -> Result<PayloadReference, PayloadError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| PayloadError::Serialization(e.to_string()))?;
        let size_bytes = bytes.len() as u64;

        if bytes.len() <= self.inline_limit {
            return Ok(PayloadReference::Inline {
                data: value.clone(),
                size_bytes,
            });
        }

        let key = format!(
            "payloads/{}/{correlation_id}/{stage}-{}.json",
            Utc::now().format("%Y-%m-%d"),
            now_ms(),
        );
        self.blobs.put(&key, Bytes::from(bytes)).await?;
        debug!(%key, size_bytes, "payload offloaded to blob storage");
        Ok(PayloadReference::S3 { key, size_bytes })
    }

    /// Load a payload back into memory.
    pub async fn retrieve(
        &self,
        reference: &PayloadReference,
    ) -> Result<serde_json::Value, PayloadError> {
        match reference {
            PayloadReference::Inline { data, .. } => Ok(data.clone()),
            PayloadReference::S3 { key, .. } => {
                let bytes = self
                    .blobs
                    .get(key)
                    .await?
                    .ok_or_else(|| PayloadError::Missing(key.clone()))?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| PayloadError::Serialization(e.to_string()))
            }
        }
    }

    /// Best-effort deletion of an offloaded payload.
    pub async fn delete(&self, reference: &PayloadReference) {
        if let PayloadReference::S3 { key, .. } = reference {
            if let Err(e) = self.blobs.delete(key).await {
                warn!(%key, error = %e, "failed to delete offloaded payload");
            }
        }
    }

    /// Persist a run checkpoint, best-effort.
    pub async fn write_checkpoint(
        &self,
        correlation_id: Uuid,
        stage: Stage,
        checkpoint: &serde_json::Value,
    ) {
        let key = format!("pipeline_state/{correlation_id}/{stage}.json");
        let bytes = match serde_json::to_vec(checkpoint) {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                warn!(error = %e, "failed to serialize checkpoint");
                return;
            }
        };
        if let Err(e) = self.blobs.put(&key, bytes).await {
            warn!(%key, error = %e, "failed to write checkpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbrief_blob::MemoryBlobStore;
    use serde_json::json;

    fn manager() -> (Arc<MemoryBlobStore>, PayloadManager) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let manager = PayloadManager::new(blobs.clone() as Arc<dyn BlobStore>);
        (blobs, manager)
    }

    #[tokio::test]
    async fn small_payloads_stay_inline() {
        let (blobs, manager) = manager();
        let value = json!({"emails": ["a", "b"]});
        let reference = manager
            .store(&value, Uuid::new_v4(), Stage::Fetch)
            .await
            .unwrap();
        assert!(reference.is_inline());
        assert!(blobs.is_empty());

        let restored = manager.retrieve(&reference).await.unwrap();
        assert_eq!(restored, value);
    }

    #[tokio::test]
    async fn large_payloads_offload_and_roundtrip() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let manager =
            PayloadManager::new(blobs.clone() as Arc<dyn BlobStore>).with_inline_limit(64);
        let value = json!({"body": "x".repeat(500)});
        let correlation_id = Uuid::new_v4();

        let reference = manager
            .store(&value, correlation_id, Stage::Extract)
            .await
            .unwrap();
        assert!(!reference.is_inline());
        assert_eq!(blobs.len(), 1);

        if let PayloadReference::S3 { ref key, size_bytes } = reference {
            assert!(key.starts_with("payloads/"));
            assert!(key.contains(&correlation_id.to_string()));
            assert!(key.contains("extract-"));
            assert!(key.ends_with(".json"));
            assert!(size_bytes > 64);
        }

        // Byte-for-byte equal after the JSON round-trip.
        let restored = manager.retrieve(&reference).await.unwrap();
        assert_eq!(restored, value);
    }

    #[tokio::test]
    async fn threshold_is_exact() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let value = json!("xxxxxxxx");
        let exact = serde_json::to_vec(&value).unwrap().len();

        let at_limit =
            PayloadManager::new(blobs.clone() as Arc<dyn BlobStore>).with_inline_limit(exact);
        assert!(
            at_limit
                .store(&value, Uuid::new_v4(), Stage::Fetch)
                .await
                .unwrap()
                .is_inline()
        );

        let below_limit =
            PayloadManager::new(blobs as Arc<dyn BlobStore>).with_inline_limit(exact - 1);
        assert!(
            !below_limit
                .store(&value, Uuid::new_v4(), Stage::Fetch)
                .await
                .unwrap()
                .is_inline()
        );
    }

    #[tokio::test]
    async fn missing_offloaded_payload_errors() {
        let (_, manager) = manager();
        let reference = PayloadReference::S3 {
            key: "payloads/2024-06-01/gone/fetch-1.json".into(),
            size_bytes: 10,
        };
        assert!(matches!(
            manager.retrieve(&reference).await.unwrap_err(),
            PayloadError::Missing(_)
        ));
    }

    #[tokio::test]
    async fn delete_is_best_effort() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let manager =
            PayloadManager::new(blobs.clone() as Arc<dyn BlobStore>).with_inline_limit(1);
        let reference = manager
            .store(&json!({"k": "v"}), Uuid::new_v4(), Stage::Send)
            .await
            .unwrap();
        assert_eq!(blobs.len(), 1);
        manager.delete(&reference).await;
        assert!(blobs.is_empty());
        // Deleting again must not panic or error.
        manager.delete(&reference).await;
    }

    #[tokio::test]
    async fn checkpoints_land_under_pipeline_state() {
        let (blobs, manager) = manager();
        let correlation_id = Uuid::new_v4();
        manager
            .write_checkpoint(correlation_id, Stage::Classify, &json!({"ok": true}))
            .await;
        let keys = blobs.list("pipeline_state/").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].contains(&correlation_id.to_string()));
        assert!(keys[0].ends_with("classify.json"));
    }
}
