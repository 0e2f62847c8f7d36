//! Time-windowed deduplication of incidents.
//!
//! The cache remembers which (namespace, group, reason) triples recently
//! produced an incident. Every hit slides the window forward: a hot event
//! keeps suppressing its duplicates, and only after one quiet window does
//! the next sighting open a new incident.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// Hard cap on cached entries. Insertion evicts oldest-inserted entries
/// first once the cap is reached; the time window bounds useful lifetime
/// anyway.
pub const MAX_ENTRIES: usize = 10_000;

/// Cadence of the background expiry sweep.
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Debug)]
struct Entry {
    expires_at: DateTime<Utc>,
    count: u64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Insertion order, oldest first. Drives capacity eviction.
    order: VecDeque<String>,
}

/// Outcome of a dedup check.
#[derive(Debug, Clone, Copy)]
pub struct DedupCheck {
    /// True when this sighting opened a fresh incident.
    pub is_new: bool,
    /// Sightings within the current window, including this one.
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Read-only view of a live entry.
#[derive(Debug, Clone, Copy)]
pub struct DedupStats {
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Bounded, concurrent, time-windowed incident memory.
///
/// All access is serialized by a single mutex. The fan-in is one producer
/// per watch connection, so contention stays negligible. Clones share the
/// same cache.
#[derive(Clone)]
pub struct Deduplicator {
    window: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Record a sighting of `(namespace, group, reason)`.
    ///
    /// A live entry is incremented and its window slides to `now + window`.
    /// A missing or expired entry is (re)created with `count = 1`.
    pub async fn check(&self, namespace: &str, group: &str, reason: &str) -> DedupCheck {
        let key = format!("{namespace}/{group}/{reason}");
        let now = Utc::now();

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(entry) = inner.entries.get_mut(&key) {
            if now < entry.expires_at {
                entry.count += 1;
                entry.last_seen = now;
                entry.expires_at = now + self.window;
                return DedupCheck {
                    is_new: false,
                    count: entry.count,
                    first_seen: entry.first_seen,
                    last_seen: entry.last_seen,
                };
            }
            // Expired entry found on access; treat as new.
            inner.entries.remove(&key);
        }

        add_entry(inner, key, now, self.window);
        DedupCheck {
            is_new: true,
            count: 1,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Current stats for a key without recording a sighting.
    ///
    /// Expired entries read as absent; deleting them is the writer's and
    /// the sweeper's job.
    pub async fn stats(&self, namespace: &str, group: &str, reason: &str) -> Option<DedupStats> {
        let key = format!("{namespace}/{group}/{reason}");
        let inner = self.inner.lock().await;

        inner
            .entries
            .get(&key)
            .filter(|entry| Utc::now() < entry.expires_at)
            .map(|entry| DedupStats {
                count: entry.count,
                first_seen: entry.first_seen,
                last_seen: entry.last_seen,
            })
    }

    /// Number of cached entries, including not-yet-swept expired ones.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Drop expired entries and rebuild the insertion order around the
    /// survivors. Normally driven by [`spawn_sweeper`](Self::spawn_sweeper).
    pub async fn sweep(&self) {
        let now = Utc::now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let before = inner.entries.len();
        let mut survivors = VecDeque::with_capacity(inner.order.len());
        for key in std::mem::take(&mut inner.order) {
            match inner.entries.get(&key) {
                Some(entry) if now < entry.expires_at => survivors.push_back(key),
                Some(_) => {
                    inner.entries.remove(&key);
                }
                None => {}
            }
        }
        inner.order = survivors;

        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "swept expired dedup entries");
        }
    }

    /// Start the detached background sweep task. It shares the process
    /// lifetime; there is no cancellation contract.
    pub fn spawn_sweeper(&self) {
        let dedup = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                dedup.sweep().await;
            }
        });
    }
}

fn add_entry(inner: &mut Inner, key: String, now: DateTime<Utc>, window: Duration) {
    // Evict oldest-inserted entries while at capacity. Stale order slots
    // (keys already removed on access) pop harmlessly.
    while inner.entries.len() >= MAX_ENTRIES {
        let Some(oldest) = inner.order.pop_front() else {
            break;
        };
        inner.entries.remove(&oldest);
    }

    inner.entries.insert(
        key.clone(),
        Entry {
            expires_at: now + window,
            count: 1,
            first_seen: now,
            last_seen: now,
        },
    );
    inner.order.push_back(key);
}
