use super::error::RateError;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry<V> {
    value: V,
    populated_at: Instant,
}

struct SlotState<V> {
    entry: Option<CacheEntry<V>>,
    /// Error of the most recent flight, cleared by the next success.
    last_failure: Option<Arc<dyn Error + Send + Sync>>,
}

impl<V> Default for SlotState<V> {
    fn default() -> Self {
        SlotState {
            entry: None,
            last_failure: None,
        }
    }
}

struct Slot<V> {
    /// Bumped when a producer run finishes, before the state lock is released.
    flights: AtomicU64,
    state: Mutex<SlotState<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Slot {
            flights: AtomicU64::new(0),
            state: Mutex::new(SlotState::default()),
        }
    }
}

/// Keyed memo with a freshness window and single-flight refresh.
///
/// Every key owns a slot guarded by its own async mutex. The caller that finds a slot
/// empty or stale keeps the slot locked while its producer runs, so concurrent callers
/// for the same key queue behind it and take that run's outcome instead of calling the
/// producer again. A failed run is handed to its waiters but never stored as a value.
/// Keys never block each other.
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Display + Send + Sync,
    V: Clone + Send + Sync,
{
    slots: Arc<Mutex<HashMap<K, Arc<Slot<V>>>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Display + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `key`, running `producer` on a miss or expiry.
    pub async fn get_cached<F, Fut, E>(&self, key: K, producer: F) -> Result<V, RateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.get_cached_with_ttl(key, self.ttl, producer).await
    }

    /// Like [`get_cached`](Self::get_cached) with an explicit freshness window.
    ///
    /// A failed producer leaves the stored value untouched and surfaces as
    /// [`RateError::Producer`] to the caller that ran it and to every caller that was
    /// waiting on that run.
    pub async fn get_cached_with_ttl<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        producer: F,
    ) -> Result<V, RateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let seen = slot.flights.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;
        match state.entry.as_ref() {
            Some(cached) if cached.populated_at.elapsed() < ttl => {
                debug!("Cache HIT for key: {:?}", key);
                return Ok(cached.value.clone());
            }
            Some(_) => debug!("Cache entry expired for key: {:?}", key),
            None => debug!("Cache MISS for key: {:?}", key),
        }

        if slot.flights.load(Ordering::Acquire) != seen {
            if let Some(source) = &state.last_failure {
                debug!("Sharing failed refresh for key: {:?}", key);
                return Err(RateError::Producer {
                    key: key.to_string(),
                    source: Arc::clone(source),
                });
            }
        }

        let outcome = producer().await;
        let result = match outcome {
            Ok(value) => {
                debug!("Cache PUT for key: {:?}", key);
                state.entry = Some(CacheEntry {
                    value: value.clone(),
                    populated_at: Instant::now(),
                });
                state.last_failure = None;
                Ok(value)
            }
            Err(e) => {
                let boxed: Box<dyn Error + Send + Sync> = e.into();
                let source: Arc<dyn Error + Send + Sync> = Arc::from(boxed);
                warn!(key = %key, error = %source, "Cache producer failed");
                state.last_failure = Some(Arc::clone(&source));
                Err(RateError::Producer {
                    key: key.to_string(),
                    source,
                })
            }
        };
        slot.flights.fetch_add(1, Ordering::AcqRel);
        result
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Display + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
