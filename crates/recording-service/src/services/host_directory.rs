//! Host identity cache.
//!
//! Maps a platform user id to a display name and email. The cache is owned
//! by `AppState` and shared across requests, so repeated hosts are looked up
//! once per TTL window rather than once per meeting.
//!
//! Lookups never fail from the caller's point of view: an upstream error is
//! cached as [`HostIdentity::unknown`] so a missing host is not retried on
//! every request.

use crate::models::HostIdentity;
use crate::observability::metrics;
use crate::services::platform_client::PlatformApi;
use common::secret::SecretString;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    identity: HostIdentity,
    resolved_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(true, |ttl| self.resolved_at.elapsed() < ttl)
    }
}

/// Process-wide cache of resolved host identities.
pub struct HostDirectoryCache {
    api: Arc<dyn PlatformApi>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// `None` keeps entries forever.
    ttl: Option<Duration>,
    lookup_concurrency: usize,
}

impl HostDirectoryCache {
    /// Create an empty cache. `lookup_concurrency` of zero is treated as one.
    pub fn new(
        api: Arc<dyn PlatformApi>,
        ttl: Option<Duration>,
        lookup_concurrency: usize,
    ) -> Self {
        Self {
            api,
            entries: RwLock::new(HashMap::new()),
            ttl,
            lookup_concurrency: lookup_concurrency.max(1),
        }
    }

    /// Cached identity for `host_id`, if present and not expired.
    pub async fn get(&self, host_id: &str) -> Option<HostIdentity> {
        let entries = self.entries.read().await;
        entries
            .get(host_id)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.identity.clone())
    }

    /// Number of entries held, including expired ones not yet replaced.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fresh identities for every id in `host_ids` that is cached.
    pub async fn lookup_many<'a, I>(&self, host_ids: I) -> HashMap<String, HostIdentity>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let entries = self.entries.read().await;
        host_ids
            .into_iter()
            .filter_map(|id| {
                entries
                    .get(id)
                    .filter(|entry| entry.is_fresh(self.ttl))
                    .map(|entry| (id.to_string(), entry.identity.clone()))
            })
            .collect()
    }

    /// Resolve one host, consulting the cache first.
    ///
    /// An empty id resolves to `Unknown` and is not cached.
    pub async fn resolve(&self, token: &SecretString, host_id: &str) -> HostIdentity {
        if host_id.is_empty() {
            return HostIdentity::unknown();
        }

        if let Some(identity) = self.get(host_id).await {
            metrics::record_host_cache_lookups(true, 1);
            return identity;
        }
        metrics::record_host_cache_lookups(false, 1);

        let identity = self.fetch(token, host_id).await;
        self.store(host_id, identity.clone()).await;
        identity
    }

    /// Resolve every distinct, not-yet-cached id in `host_ids` with at most
    /// `lookup_concurrency` lookups in flight.
    #[instrument(skip_all, name = "rs.services.host_prewarm")]
    pub async fn prewarm<'a, I>(&self, token: &SecretString, host_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: HashSet<&str> = host_ids.into_iter().filter(|id| !id.is_empty()).collect();

        let missing: Vec<String> = {
            let entries = self.entries.read().await;
            distinct
                .iter()
                .filter(|id| {
                    !entries
                        .get(**id)
                        .is_some_and(|entry| entry.is_fresh(self.ttl))
                })
                .map(|id| (*id).to_string())
                .collect()
        };

        metrics::record_host_cache_lookups(true, distinct.len().saturating_sub(missing.len()));
        metrics::record_host_cache_lookups(false, missing.len());
        if missing.is_empty() {
            return;
        }

        debug!(
            target: "rs.services.host_directory",
            distinct = distinct.len(),
            missing = missing.len(),
            "Resolving uncached hosts"
        );

        // Owned ids keep the buffered futures `Send` for any caller lifetime.
        let resolved: Vec<(String, HostIdentity)> = stream::iter(missing)
            .map(|id: String| async move {
                let identity = self.fetch(token, &id).await;
                (id, identity)
            })
            .buffer_unordered(self.lookup_concurrency)
            .collect()
            .await;

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        for (id, identity) in resolved {
            entries.insert(
                id,
                CacheEntry {
                    identity,
                    resolved_at: now,
                },
            );
        }
    }

    async fn fetch(&self, token: &SecretString, host_id: &str) -> HostIdentity {
        match self.api.get_user(token, host_id).await {
            Ok(profile) => HostIdentity::from(profile),
            Err(e) => {
                warn!(
                    target: "rs.services.host_directory",
                    host_id = %host_id,
                    error = %e,
                    "Host lookup failed, caching as unknown"
                );
                HostIdentity::unknown()
            }
        }
    }

    async fn store(&self, host_id: &str, identity: HostIdentity) {
        self.entries.write().await.insert(
            host_id.to_string(),
            CacheEntry {
                identity,
                resolved_at: Instant::now(),
            },
        );
    }
}
