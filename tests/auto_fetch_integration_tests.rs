//! Integration Tests for the Auto-Fetch Cache
//!
//! Exercises fetch-on-miss, single-flight, preloading, listeners and
//! persistence through the public API only.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autofetch_cache::cache::{BoundedCache, CacheEntry};
use autofetch_cache::fetch::{fetch_fn, AutoFetchCache, Direction, FetchListener, FileFetcher};
use autofetch_cache::{FailureKind, FetchError, JsonFileStore};

// == Helper Functions ==

/// Fetcher that records every key it is asked for and echoes it upper-cased.
fn recording_fetcher(
    log: Arc<Mutex<Vec<String>>>,
) -> impl Fn(&String) -> Result<Option<String>, FetchError> + Send + Sync + 'static {
    move |key: &String| {
        log.lock().unwrap().push(key.clone());
        Ok(Some(key.to_uppercase()))
    }
}

fn ordered_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("k{}", i)).collect()
}

async fn settle<V: Send + Sync + 'static>(cache: &AutoFetchCache<String, V>) {
    while cache.in_flight_count() > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default, Clone)]
struct RecordingListener {
    events: Arc<Mutex<Vec<String>>>,
}

impl FetchListener<String, String> for RecordingListener {
    fn on_success(&self, key: &String, entry: &Arc<CacheEntry<String>>, was_cached: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok:{}:{}:{}", key, entry.data(), was_cached));
    }

    fn on_failure(&self, key: &String, kind: FailureKind, _cause: &FetchError) {
        self.events
            .lock()
            .unwrap()
            .push(format!("err:{}:{:?}", key, kind));
    }
}

// == Single-Flight Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache = Arc::new(
        AutoFetchCache::builder(fetch_fn(move |key: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Some(format!("value-of-{}", key)))
        }))
        .build()
        .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.get_or_fetch(&"shared".to_string()).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        let entry = handle.await.unwrap().expect("every caller sees the value");
        results.push(entry);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|entry| Arc::ptr_eq(entry, &results[0])));
    assert_eq!(results[0].data(), "value-of-shared");

    // Only the caller that started the fetch keeps its miss
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_failed_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache = Arc::new(
        AutoFetchCache::builder(fetch_fn(
            move |_key: &String| -> Result<Option<String>, FetchError> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out").into())
            },
        ))
        .build()
        .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.get_or_fetch(&"flaky".to_string()).await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_none());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.in_flight_count(), 0);

    // A wait that ends empty keeps its miss
    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 8);
}

#[tokio::test]
async fn test_failing_fetch_never_leaves_key_in_flight() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache = AutoFetchCache::builder(fetch_fn(
        move |_key: &String| -> Result<Option<String>, FetchError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "offline").into())
        },
    ))
    .build()
    .unwrap();
    let key = "broken".to_string();

    assert!(cache.get_or_fetch(&key).await.is_none());
    assert!(!cache.is_fetching(&key));
    assert_eq!(cache.in_flight_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A fresh attempt is made rather than joining a stale handle
    assert!(cache.get_or_fetch(&key).await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hit_rate_after_fetch_then_hit() {
    let cache = AutoFetchCache::builder(fetch_fn(|key: &String| Ok(Some(key.clone()))))
        .build()
        .unwrap();
    let key = "page".to_string();

    cache.get_or_fetch(&key).await.unwrap();
    cache.get_or_fetch(&key).await.unwrap();

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
    assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
}

// == Prefetch Tests ==

#[tokio::test]
async fn test_prefetch_boundary_fetches_immediate_neighbors_only() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cache = AutoFetchCache::builder(recording_fetcher(Arc::clone(&log)))
        .build()
        .unwrap();
    let ordered = ordered_keys(5);

    assert_eq!(cache.preload(&ordered[2], &ordered, Direction::Forward, 1), 1);
    assert_eq!(cache.preload(&ordered[2], &ordered, Direction::Backward, 1), 1);
    settle(&cache).await;

    let fetched: BTreeSet<String> = log.lock().unwrap().iter().cloned().collect();
    assert_eq!(fetched, BTreeSet::from(["k1".to_string(), "k3".to_string()]));
    // Preloading never touches the requested key itself
    assert!(cache.get(&ordered[2]).is_none());
}

#[tokio::test]
async fn test_prefetch_skips_cached_and_in_flight_keys() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cache = AutoFetchCache::builder(recording_fetcher(Arc::clone(&log)))
        .build()
        .unwrap();
    let ordered = ordered_keys(5);
    cache.cache().put("k3".to_string(), "already".to_string());

    assert_eq!(cache.preload(&ordered[2], &ordered, Direction::Forward, 1), 0);
    assert_eq!(cache.preload(&ordered[2], &ordered, Direction::Forward, 2), 1);
    settle(&cache).await;

    assert_eq!(*log.lock().unwrap(), vec!["k4".to_string()]);
    assert_eq!(cache.get(&"k3".to_string()).unwrap().data(), "already");
}

#[tokio::test]
async fn test_prefetch_with_unknown_key_or_empty_list_is_noop() {
    let cache = AutoFetchCache::builder(fetch_fn(|key: &String| Ok(Some(key.clone()))))
        .build()
        .unwrap();
    let ordered = ordered_keys(3);

    assert_eq!(cache.preload(&"zz".to_string(), &ordered, Direction::Forward, 2), 0);
    assert_eq!(cache.preload(&"k0".to_string(), &[], Direction::Forward, 2), 0);
    assert_eq!(cache.in_flight_count(), 0);
}

#[tokio::test]
async fn test_get_with_neighbors_uses_configured_counts() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cache = AutoFetchCache::builder(recording_fetcher(Arc::clone(&log)))
        .with_forward_count(1)
        .with_backward_count(1)
        .build()
        .unwrap();
    let ordered = ordered_keys(5);

    let entry = cache.get_with_neighbors(&ordered[2], &ordered).await.unwrap();
    assert_eq!(entry.data(), "K2");
    settle(&cache).await;

    let fetched: BTreeSet<String> = log.lock().unwrap().iter().cloned().collect();
    let expected: BTreeSet<String> = ["k1", "k2", "k3"].iter().map(|k| k.to_string()).collect();
    assert_eq!(fetched, expected);
}

// == Listener Tests ==

#[tokio::test]
async fn test_listener_sees_fetch_hit_and_failure() {
    let listener = RecordingListener::default();
    let cache = AutoFetchCache::builder(fetch_fn(|key: &String| match key.as_str() {
        "big" => Err(FetchError::ResourceExhausted("out of memory".to_string())),
        "gone" => Ok(None),
        _ => Ok(Some(key.to_uppercase())),
    }))
    .with_listener(listener.clone())
    .build()
    .unwrap();

    cache.get_or_fetch(&"a".to_string()).await;
    cache.get_or_fetch(&"a".to_string()).await;
    cache.get_or_fetch(&"big".to_string()).await;
    cache.get_or_fetch(&"gone".to_string()).await;
    settle(&cache).await;

    let events = listener.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "ok:a:A:false".to_string(),
            "ok:a:A:true".to_string(),
            "err:big:ResourceExhausted".to_string(),
            "err:gone:Io".to_string(),
        ]
    );
}

// == Gate and Shutdown Tests ==

#[tokio::test]
async fn test_gate_blocks_new_fetches() {
    let online = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&online);
    let cache = AutoFetchCache::builder(fetch_fn(|key: &String| Ok(Some(key.clone()))))
        .with_gate(move || gate.load(Ordering::SeqCst))
        .build()
        .unwrap();
    let key = "remote".to_string();

    assert!(cache.get_or_fetch(&key).await.is_none());
    assert_eq!(cache.in_flight_count(), 0);

    online.store(true, Ordering::SeqCst);
    assert!(cache.get_or_fetch(&key).await.is_some());
}

#[tokio::test]
async fn test_shutdown_keeps_serving_cached_entries() {
    let cache = AutoFetchCache::builder(fetch_fn(|key: &String| Ok(Some(key.clone()))))
        .build()
        .unwrap();
    let warm = "warm".to_string();
    cache.get_or_fetch(&warm).await.unwrap();

    cache.shutdown();

    assert!(cache.get_or_fetch(&warm).await.is_some());
    assert!(cache.get_or_fetch(&"cold".to_string()).await.is_none());
    let ordered = [warm.clone(), "cold".to_string()];
    assert_eq!(cache.preload(&warm, &ordered, Direction::Forward, 1), 0);
}

// == File and Persistence Tests ==

#[tokio::test]
async fn test_file_fetcher_backed_cache() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.bin"), vec![1u8; 10]).unwrap();
    std::fs::write(dir.path().join("b.bin"), vec![2u8; 20]).unwrap();

    let cache = AutoFetchCache::builder(FileFetcher::new(dir.path()))
        .with_max_size(1)
        .build()
        .unwrap();

    let a = cache.get_or_fetch(&"a.bin".to_string()).await.unwrap();
    assert_eq!(a.data().len(), 10);
    let b = cache.get_or_fetch(&"b.bin".to_string()).await.unwrap();
    assert_eq!(b.data().len(), 20);
    assert!(cache.get_or_fetch(&"missing.bin".to_string()).await.is_none());

    // Capacity one: loading b evicted a
    assert_eq!(cache.cache().keys(), vec!["b.bin".to_string()]);
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_snapshot_round_trip_avoids_refetch() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    let keys = ordered_keys(3);

    let first_log = Arc::new(Mutex::new(Vec::new()));
    let first = AutoFetchCache::builder(recording_fetcher(Arc::clone(&first_log)))
        .build()
        .unwrap();
    for key in &keys {
        first.get_or_fetch(key).await.unwrap();
    }
    assert_eq!(first.cache().save_to(&store, "pages").unwrap(), 3);

    let restored: Arc<BoundedCache<String, String>> = Arc::new(BoundedCache::new(8).unwrap());
    assert_eq!(restored.load_from(&store, "pages").unwrap(), 3);

    let second_log = Arc::new(Mutex::new(Vec::new()));
    let second = AutoFetchCache::builder(recording_fetcher(Arc::clone(&second_log)))
        .with_cache(restored)
        .build()
        .unwrap();
    for key in &keys {
        let entry = second.get_or_fetch(key).await.unwrap();
        assert_eq!(*entry.data(), key.to_uppercase());
    }
    assert!(second_log.lock().unwrap().is_empty());
}
