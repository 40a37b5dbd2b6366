//! Conformance suites for store backends.
//!
//! Call these from a backend's test module with a fresh store instance.

use chrono::Utc;

use mailbrief_core::{ProcessedRecord, SenderClass, SenderRecord, TokenRecord, now_ms};

use crate::error::StateError;
use crate::store::{ProcessedStore, SenderStore, TokenStore};

/// Run the full processed-store conformance suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_processed_store_conformance(store: &dyn ProcessedStore) -> Result<(), StateError> {
    test_missing_is_unprocessed(store).await?;
    test_mark_and_read(store).await?;
    test_batch_mark(store).await?;
    test_expired_records_read_as_absent(store).await?;
    test_cleanup_expired(store).await?;
    Ok(())
}

async fn test_missing_is_unprocessed(store: &dyn ProcessedStore) -> Result<(), StateError> {
    assert!(!store.is_processed("conf-missing").await?);
    assert!(store.get("conf-missing").await?.is_none());
    Ok(())
}

async fn test_mark_and_read(store: &dyn ProcessedStore) -> Result<(), StateError> {
    let record = ProcessedRecord::new("conf-mark-1", "A subject", Utc::now());
    store.mark_processed(std::slice::from_ref(&record)).await?;
    assert!(store.is_processed("conf-mark-1").await?);
    let read = store.get("conf-mark-1").await?.expect("record should exist");
    assert_eq!(read.subject, "A subject");
    Ok(())
}

async fn test_batch_mark(store: &dyn ProcessedStore) -> Result<(), StateError> {
    let now = Utc::now();
    let records: Vec<ProcessedRecord> = (0..25)
        .map(|i| ProcessedRecord::new(format!("conf-batch-{i}"), "s", now))
        .collect();
    store.mark_processed(&records).await?;
    for i in 0..25 {
        assert!(store.is_processed(&format!("conf-batch-{i}")).await?);
    }
    Ok(())
}

async fn test_expired_records_read_as_absent(store: &dyn ProcessedStore) -> Result<(), StateError> {
    let mut record = ProcessedRecord::new("conf-expired", "old", Utc::now());
    record.expires_at_ms = now_ms() - 1_000;
    store.mark_processed(std::slice::from_ref(&record)).await?;
    assert!(!store.is_processed("conf-expired").await?);
    assert!(store.get("conf-expired").await?.is_none());
    Ok(())
}

async fn test_cleanup_expired(store: &dyn ProcessedStore) -> Result<(), StateError> {
    let mut stale = ProcessedRecord::new("conf-cleanup-stale", "old", Utc::now());
    stale.expires_at_ms = now_ms() - 1_000;
    let fresh = ProcessedRecord::new("conf-cleanup-fresh", "new", Utc::now());
    store.mark_processed(&[stale, fresh]).await?;

    let removed = store.cleanup_expired(now_ms()).await?;
    assert!(removed >= 1, "expired record should be reaped");
    assert!(store.is_processed("conf-cleanup-fresh").await?);
    Ok(())
}

/// Run the full sender-store conformance suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_sender_store_conformance(store: &dyn SenderStore) -> Result<(), StateError> {
    test_sender_missing(store).await?;
    test_sender_upsert_and_get(store).await?;
    test_sender_population_exclusivity(store).await?;
    test_sender_remove(store).await?;
    test_sender_list(store).await?;
    Ok(())
}

async fn test_sender_missing(store: &dyn SenderStore) -> Result<(), StateError> {
    assert!(store.get("conf-nobody@example.com").await?.is_none());
    Ok(())
}

async fn test_sender_upsert_and_get(store: &dyn SenderStore) -> Result<(), StateError> {
    let record = SenderRecord::new("conf-ai@example.com", SenderClass::Ai, 85.0, now_ms());
    store.upsert(record).await?;
    let read = store
        .get("conf-ai@example.com")
        .await?
        .expect("record should exist");
    assert_eq!(read.class, SenderClass::Ai);
    assert!((read.confidence - 85.0).abs() < f64::EPSILON);
    Ok(())
}

async fn test_sender_population_exclusivity(store: &dyn SenderStore) -> Result<(), StateError> {
    let addr = "conf-flip@example.com";
    store
        .upsert(SenderRecord::new(addr, SenderClass::Ai, 80.0, now_ms()))
        .await?;
    // Reclassify to the other population; the AI entry must disappear.
    store
        .upsert(SenderRecord::new(addr, SenderClass::NonAi, 90.0, now_ms()))
        .await?;

    let read = store.get(addr).await?.expect("record should exist");
    assert_eq!(read.class, SenderClass::NonAi);

    let ai = store.list(SenderClass::Ai).await?;
    assert!(
        ai.iter().all(|r| r.sender_email != addr),
        "address must not remain in the AI population"
    );
    Ok(())
}

async fn test_sender_remove(store: &dyn SenderStore) -> Result<(), StateError> {
    let addr = "conf-remove@example.com";
    store
        .upsert(SenderRecord::new(addr, SenderClass::NonAi, 75.0, now_ms()))
        .await?;
    assert!(store.remove(addr).await?);
    assert!(store.get(addr).await?.is_none());
    assert!(!store.remove(addr).await?);
    Ok(())
}

async fn test_sender_list(store: &dyn SenderStore) -> Result<(), StateError> {
    store
        .upsert(SenderRecord::new(
            "conf-list-a@example.com",
            SenderClass::Ai,
            70.0,
            now_ms(),
        ))
        .await?;
    store
        .upsert(SenderRecord::new(
            "conf-list-b@example.com",
            SenderClass::Ai,
            71.0,
            now_ms(),
        ))
        .await?;
    let ai = store.list(SenderClass::Ai).await?;
    assert!(ai.iter().any(|r| r.sender_email == "conf-list-a@example.com"));
    assert!(ai.iter().any(|r| r.sender_email == "conf-list-b@example.com"));

    let by_domain = store.list_by_domain("example.com").await?;
    assert!(by_domain.len() >= 2, "domain lookup should span the population");
    assert!(store.list_by_domain("absent.example").await?.is_empty());
    Ok(())
}

/// Run the full token-store conformance suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_token_store_conformance(store: &dyn TokenStore) -> Result<(), StateError> {
    assert!(store.get("conf-default").await?.is_none());

    store
        .put(TokenRecord::new("conf-default", "1//refresh", now_ms()))
        .await?;
    let read = store
        .get("conf-default")
        .await?
        .expect("token should exist");
    assert_eq!(read.refresh_token, "1//refresh");
    assert!(read.last_used_ms.is_none());

    let used_at = now_ms();
    store.touch_last_used("conf-default", used_at).await?;
    let read = store
        .get("conf-default")
        .await?
        .expect("token should exist");
    assert_eq!(read.last_used_ms, Some(used_at));

    // Touching a missing record is a no-op, not an error.
    store.touch_last_used("conf-absent", used_at).await?;
    Ok(())
}
