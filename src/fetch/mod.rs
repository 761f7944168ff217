use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::error::Result;
use crate::core::models::Issue;
use crate::store::IssueStore;

/// The fetch seam of the tree builder: given a key, produce a normalized
/// issue record. Implementations may scrape, call a REST API, or just read
/// the local store.
#[async_trait]
pub trait IssueFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Issue>;

    fn name(&self) -> &str {
        "fetcher"
    }
}

/// Offline fetcher reading only from the issue store. Used when analyses
/// run against previously scraped data.
pub struct StoreFetcher {
    store: IssueStore,
}

impl StoreFetcher {
    pub fn new(store: IssueStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IssueFetcher for StoreFetcher {
    async fn fetch(&self, key: &str) -> Result<Issue> {
        self.store.load(key)
    }

    fn name(&self) -> &str {
        "store"
    }
}

/// Wraps a live fetcher with the cache policy: a per-run memo, the store
/// freshness check, persistence of fresh fetches, and a stale-copy
/// fallback when the live fetch fails.
///
/// Failed keys are collected per run so the caller can drive the retry
/// pass and the remediation log.
pub struct CachingFetcher<F: IssueFetcher> {
    inner: F,
    store: IssueStore,
    check_days: i64,
    memo: Mutex<LruCache<String, Issue>>,
    failures: Mutex<Vec<String>>,
}

impl<F: IssueFetcher> CachingFetcher<F> {
    pub fn new(inner: F, store: IssueStore, check_days: i64, memo_size: usize) -> Self {
        let capacity = NonZeroUsize::new(memo_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            store,
            check_days,
            memo: Mutex::new(LruCache::new(capacity)),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Drains the keys that failed to fetch during this run.
    pub fn take_failures(&self) -> Vec<String> {
        let mut failures = self.failures.lock();
        let mut drained: Vec<String> = Vec::new();
        for key in failures.drain(..) {
            if !drained.contains(&key) {
                drained.push(key);
            }
        }
        drained
    }

    fn remember(&self, issue: &Issue) {
        self.memo.lock().put(issue.key.clone(), issue.clone());
    }
}

#[async_trait]
impl<F: IssueFetcher> IssueFetcher for CachingFetcher<F> {
    async fn fetch(&self, key: &str) -> Result<Issue> {
        if let Some(issue) = self.memo.lock().get(key) {
            debug!("Memo hit for issue {key}");
            return Ok(issue.clone());
        }

        if self.store.is_fresh(key, self.check_days) {
            match self.store.load(key) {
                Ok(issue) => {
                    debug!("Issue {key} is fresh in the store, skipping fetch");
                    self.remember(&issue);
                    return Ok(issue);
                }
                Err(e) => {
                    info!("Issue {key} looked fresh but could not be read ({e}), fetching");
                }
            }
        }

        match self.inner.fetch(key).await {
            Ok(issue) => {
                if let Err(e) = self.store.save(&issue) {
                    warn!("Could not persist issue {key}: {e}");
                }
                self.remember(&issue);
                Ok(issue)
            }
            Err(fetch_error) => {
                warn!(
                    "Fetcher '{}' failed for issue {key}: {fetch_error}",
                    self.inner.name()
                );
                // A stale local copy still beats a hole in the tree.
                match self.store.load(key) {
                    Ok(issue) => {
                        info!("Using stale local record for issue {key}");
                        self.remember(&issue);
                        Ok(issue)
                    }
                    Err(_) => {
                        self.failures.lock().push(key.to_string());
                        Err(fetch_error)
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        "caching"
    }
}
