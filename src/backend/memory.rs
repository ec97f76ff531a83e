use crate::backend::CounterStore;
use actix_web::rt::task::JoinHandle;
use actix_web::rt::time::Instant;
use dashmap::DashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GC_INTERVAL_SECONDS: u64 = 60 * 10;

// Longer windows are clamped, an Instant cannot represent arbitrarily distant times
const MAX_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A [CounterStore] that uses [Dashmap](dashmap::DashMap) to store counters in memory.
///
/// Counters are only shared by clones of the same store, i.e. within a single process.
#[derive(Clone)]
pub struct InMemoryStore {
    map: Arc<DashMap<String, Value>>,
    gc_handle: Option<Arc<GcGuard>>,
}

// Stops the collector once the last clone of the store is gone
struct GcGuard(JoinHandle<()>);

impl Drop for GcGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Value {
    expires_at: Instant,
    count: u64,
}

impl InMemoryStore {
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder {
            gc_interval: Some(Duration::from_secs(DEFAULT_GC_INTERVAL_SECONDS)),
        }
    }

    /// Number of counters held, including expired counters not yet collected.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn garbage_collector(map: Arc<DashMap<String, Value>>, interval: Duration) -> JoinHandle<()> {
        assert!(
            interval.as_secs_f64() > 0f64,
            "GC interval must be non-zero"
        );
        actix_web::rt::spawn(async move {
            loop {
                let now = Instant::now();
                map.retain(|_k, v| v.expires_at > now);
                actix_web::rt::time::sleep_until(now + interval).await;
            }
        })
    }
}

impl CounterStore for InMemoryStore {
    type Error = Infallible;

    async fn increment(&self, key: &str, expiry: Duration) -> Result<u64, Self::Error> {
        let now = Instant::now();
        let expires_at = now.checked_add(expiry).unwrap_or(now + MAX_EXPIRY);
        // The entry holds the shard lock, so the read, increment and expiry reset are one step
        let mut value = self.map.entry(key.to_owned()).or_insert(Value {
            expires_at,
            count: 0,
        });
        if value.expires_at <= now {
            // Idle for a whole window, start counting again
            value.count = 0;
        }
        value.count = value.count.saturating_add(1);
        value.expires_at = expires_at;
        Ok(value.count)
    }
}

pub struct InMemoryStoreBuilder {
    gc_interval: Option<Duration>,
}

impl InMemoryStoreBuilder {
    /// Override the default garbage collector interval.
    ///
    /// The garbage collector periodically scans the internal map, removing expired counters.
    /// Set to [None] to disable the garbage collector entirely.
    pub fn with_gc_interval(mut self, interval: Option<Duration>) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Must be called from within an actix (tokio) runtime, unless the garbage collector has been
    /// disabled.
    pub fn build(self) -> InMemoryStore {
        let map = Arc::new(DashMap::<String, Value>::new());
        let gc_handle = self.gc_interval.map(|gc_interval| {
            Arc::new(GcGuard(InMemoryStore::garbage_collector(
                map.clone(),
                gc_interval,
            )))
        });
        InMemoryStore { map, gc_handle }
    }
}
