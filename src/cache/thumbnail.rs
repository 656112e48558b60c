/// Thumbnail memory cache
/// Bounded LRU store with singleflight generation: concurrent requests for the same key
/// share one computation

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ThumbnailError;
use crate::types::thumbnail::{ThumbnailEntry, ThumbnailKey};

pub type ThumbnailResult = Result<Arc<ThumbnailEntry>, ThumbnailError>;

type Outcome = watch::Receiver<Option<ThumbnailResult>>;

struct Inner {
    entries: LruCache<ThumbnailKey, Arc<ThumbnailEntry>>,
    in_flight: HashMap<ThumbnailKey, Outcome>,
}

/// Strict LRU: hits promote, inserting at capacity drops the least recently used entry.
///
/// All bookkeeping happens under one mutex that is never held across an await;
/// generation itself runs on a spawned task outside the lock.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Mutex<Inner>>,
    capacity: NonZeroUsize,
}

enum Role {
    Leader(watch::Sender<Option<ThumbnailResult>>, Outcome),
    Follower(Outcome),
}

/// Clears the in-flight marker even if the generating task panics.
struct InFlightGuard {
    inner: Arc<Mutex<Inner>>,
    key: Option<ThumbnailKey>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inner.lock().in_flight.remove(&key);
        }
    }
}

impl ThumbnailCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
            })),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Residency check that does not touch recency.
    pub fn contains(&self, key: &ThumbnailKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Lookup that counts as a use.
    pub fn get(&self, key: &ThumbnailKey) -> Option<Arc<ThumbnailEntry>> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn invalidate(&self, key: &ThumbnailKey) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    /// Drop every resident thumbnail of `path`, whatever its change detector.
    pub fn invalidate_path(&self, path: &Path) -> usize {
        let mut inner = self.inner.lock();
        drop_path(&mut inner.entries, path, None)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Return the cached entry for `key`, or run `compute` exactly once across all concurrent callers.
    ///
    /// The computation runs on its own task: it finishes and populates the cache even if every
    /// caller goes away. Failures reach every waiter and are not cached.
    pub async fn get_or_create<F, Fut>(&self, key: ThumbnailKey, compute: F) -> ThumbnailResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ThumbnailEntry, ThumbnailError>> + Send + 'static,
    {
        let role = {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(&key) {
                debug!("[CACHE] hit: {}", key.path().display());
                return Ok(entry.clone());
            }
            match inner.in_flight.get(&key) {
                Some(outcome) => Role::Follower(outcome.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.in_flight.insert(key.clone(), rx.clone());
                    Role::Leader(tx, rx)
                }
            }
        };

        let rx = match role {
            Role::Follower(rx) => {
                debug!("[CACHE] joining in-flight generation: {}", key.path().display());
                rx
            }
            Role::Leader(tx, rx) => {
                debug!("[CACHE] miss, generating: {}", key.path().display());
                let work = compute();
                let cache = self.clone();
                tokio::spawn(async move {
                    let mut guard = InFlightGuard {
                        inner: cache.inner.clone(),
                        key: Some(key.clone()),
                    };
                    let result = work.await.map(Arc::new);
                    cache.complete(&key, &result);
                    guard.key = None;
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        wait_for(rx).await
    }

    /// Publish a finished generation: store on success and clear the in-flight marker in one step.
    fn complete(&self, key: &ThumbnailKey, result: &ThumbnailResult) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(key);
        match result {
            Ok(entry) => {
                // a slow generation for an older version must not displace the current one
                if inner.entries.iter().any(|(resident, _)| resident.supersedes(key)) {
                    debug!(
                        "[CACHE] newer thumbnail already resident, not storing: {}",
                        key.path().display()
                    );
                    return;
                }
                let superseded = drop_path(&mut inner.entries, key.path(), Some(key));
                if superseded > 0 {
                    debug!(
                        "[CACHE] dropped {} stale thumbnail(s) for {}",
                        superseded,
                        key.path().display()
                    );
                }
                if let Some((evicted, _)) = inner.entries.push(key.clone(), entry.clone()) {
                    if evicted != *key {
                        debug!("[CACHE] evicted: {}", evicted.path().display());
                    }
                }
            }
            Err(e) => {
                warn!("[CACHE] generation failed for {}: {}", key.path().display(), e);
            }
        }
    }
}

fn drop_path(
    entries: &mut LruCache<ThumbnailKey, Arc<ThumbnailEntry>>,
    path: &Path,
    keep: Option<&ThumbnailKey>,
) -> usize {
    let stale: Vec<ThumbnailKey> = entries
        .iter()
        .map(|(k, _)| k)
        .filter(|k| k.path() == path && Some(*k) != keep)
        .cloned()
        .collect();
    for k in &stale {
        entries.pop(k);
    }
    stale.len()
}

async fn wait_for(mut rx: Outcome) -> ThumbnailResult {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or_else(|| {
            Err(ThumbnailError::Internal("generation finished without a result".into()))
        }),
        Err(_) => Err(ThumbnailError::Internal("generation task aborted".into())),
    }
}
