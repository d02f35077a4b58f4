// tests/fingerprint_store.rs
//
// Fingerprint equivalence and store semantics for both backends.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use news_relay::clock::{Clock, ManualClock};
use news_relay::dedup::memory::MemoryFingerprintStore;
use news_relay::dedup::sqlite::SqliteFingerprintStore;
use news_relay::dedup::{digest_text, fingerprint, FingerprintStore};
use news_relay::error::StoreError;
use news_relay::ingest::types::{FileRef, MediaRef};
use news_relay::PublishPayload;

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
}

#[test]
fn same_text_on_different_channels_shares_a_fingerprint() {
    let a = PublishPayload::news("BBCPersian", "Markets rally after the announcement", None);
    let b = PublishPayload::news(
        "RadioFarda",
        "markets  RALLY after the\nannouncement",
        Some(MediaRef("photo-1".into())),
    );
    assert_eq!(fingerprint(&a), fingerprint(&b));

    let c = PublishPayload::news("BBCPersian", "Markets fall after the announcement", None);
    assert_ne!(fingerprint(&a), fingerprint(&c));
}

#[test]
fn proxy_file_fingerprint_uses_name_and_size() {
    let f = |size| FileRef {
        id: format!("id-{size}"),
        file_name: "fast.npvt".into(),
        size: Some(size),
    };
    let a = PublishPayload::proxy_file("iProxyem", f(10));
    let b = PublishPayload::proxy_file("famoushaji", f(10));
    let c = PublishPayload::proxy_file("iProxyem", f(11));
    assert_eq!(fingerprint(&a), fingerprint(&b));
    assert_ne!(fingerprint(&a), fingerprint(&c));
}

async fn exercise_ttl(store: &dyn FingerprintStore, clock: &ManualClock) {
    let d = digest_text("some headline that expires");

    assert!(!store.is_duplicate(&d).await.unwrap());
    store.record(&d, "BBCPersian").await.unwrap();
    assert!(store.is_duplicate(&d).await.unwrap());

    let err = store.record(&d, "RadioFarda").await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }), "got {err:?}");

    clock.advance(Duration::hours(1) + Duration::seconds(1));
    assert!(
        !store.is_duplicate(&d).await.unwrap(),
        "expired fingerprint must not count as duplicate"
    );

    // Expired entries do not block a fresh record.
    store.record(&d, "RadioFarda").await.unwrap();
    assert!(store.is_duplicate(&d).await.unwrap());
}

#[tokio::test]
async fn memory_store_honours_ttl() {
    let clock = manual_clock();
    let store = MemoryFingerprintStore::with_clock(Duration::hours(1), clock.clone());
    exercise_ttl(&store, &clock).await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn sqlite_store_honours_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let store = SqliteFingerprintStore::open_with_clock(
        dir.path().join("state/fp.db"),
        Duration::hours(1),
        clock.clone(),
    )
    .unwrap();
    exercise_ttl(&store, &clock).await;
}

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fp.db");
    let clock = manual_clock();
    let d = digest_text("persisted across restarts");

    {
        let store =
            SqliteFingerprintStore::open_with_clock(&path, Duration::days(3), clock.clone()).unwrap();
        store.record(&d, "Tasnimnews").await.unwrap();
    }

    let store = SqliteFingerprintStore::open_with_clock(&path, Duration::days(3), clock).unwrap();
    assert!(store.is_duplicate(&d).await.unwrap());
}

#[tokio::test]
async fn purge_removes_only_expired_entries() {
    let clock = manual_clock();
    let store =
        SqliteFingerprintStore::open_in_memory(Duration::minutes(10), clock.clone()).unwrap();

    store.record(&digest_text("old one"), "a").await.unwrap();
    store.record(&digest_text("old two"), "a").await.unwrap();
    clock.advance(Duration::minutes(9));
    store.record(&digest_text("fresh"), "b").await.unwrap();
    clock.advance(Duration::minutes(2));

    assert_eq!(store.purge_expired().await.unwrap(), 2);
    assert_eq!(store.purge_expired().await.unwrap(), 0);
    assert!(store.is_duplicate(&digest_text("fresh")).await.unwrap());
}

async fn race_records(store: Arc<dyn FingerprintStore>) -> usize {
    let d = digest_text("everyone posts this at once");
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let d = d.clone();
        handles.push(tokio::spawn(async move {
            store.record(&d, &format!("chan{i}")).await
        }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StoreError::AlreadyExists { .. }) => {}
            Err(e) => panic!("unexpected store error: {e}"),
        }
    }
    ok
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_record_has_one_winner_memory() {
    let store = Arc::new(MemoryFingerprintStore::new(Duration::days(3)));
    assert_eq!(race_records(store).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_record_has_one_winner_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store =
        Arc::new(SqliteFingerprintStore::open(dir.path().join("fp.db"), Duration::days(3)).unwrap());
    assert_eq!(race_records(store).await, 1);
}

#[test]
fn manual_clock_only_moves_when_advanced() {
    let clock = manual_clock();
    let t0 = clock.now();
    assert_eq!(clock.now(), t0);
    clock.advance(Duration::seconds(5));
    assert_eq!(clock.now() - t0, Duration::seconds(5));
}
