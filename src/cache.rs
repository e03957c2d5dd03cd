use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::CacheSettings;

/// Content-addressed filesystem cache for distribution query results, keyed
/// by the SHA-256 of the canonical `{query, modifiers}` JSON (serde_json's
/// default `Map` orders keys, matching the source's `sort_keys=True`).
pub struct DistributionCache {
    cache_dir: PathBuf,
    enabled: bool,
    ttl_hours: u64,
}

impl DistributionCache {
    pub fn new(settings: &CacheSettings) -> std::io::Result<Self> {
        if settings.enabled {
            std::fs::create_dir_all(&settings.cache_dir)?;
        }
        Ok(Self {
            cache_dir: PathBuf::from(&settings.cache_dir),
            enabled: settings.enabled,
            ttl_hours: settings.ttl_hours,
        })
    }

    fn cache_key(query: &serde_json::Value, modifiers: &serde_json::Value) -> String {
        let cache_data = serde_json::json!({ "query": query, "modifiers": modifiers });
        let canonical = serde_json::to_string(&cache_data).expect("value is serializable");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    fn is_valid(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        if self.ttl_hours == 0 {
            return true;
        }
        let Ok(metadata) = path.metadata() else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        let expiry = modified + Duration::from_secs(self.ttl_hours * 3600);
        SystemTime::now() < expiry
    }

    /// Returns the cached result if present and still within its TTL. Read
    /// errors are logged and treated as a cache miss, never propagated.
    pub fn get(
        &self,
        query: &serde_json::Value,
        modifiers: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        let key = Self::cache_key(query, modifiers);
        let path = self.cache_path(&key);
        if !self.is_valid(&path) {
            return None;
        }
        match std::fs::read_to_string(&path).and_then(|raw| {
            serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }) {
            Ok(value) => {
                tracing::info!(cache_key = %key, "cache hit for distribution query");
                Some(value)
            }
            Err(e) => {
                tracing::error!(cache_key = %key, error = %e, "error reading cache");
                None
            }
        }
    }

    /// Stores `result`. Write errors are logged and swallowed — a cache
    /// write failure must never fail the query it is caching.
    pub fn set(
        &self,
        query: &serde_json::Value,
        modifiers: &serde_json::Value,
        result: &serde_json::Value,
    ) {
        if !self.enabled {
            return;
        }
        let key = Self::cache_key(query, modifiers);
        let path = self.cache_path(&key);
        let write_result = match serde_json::to_string(result) {
            Ok(s) => std::fs::write(&path, s).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match write_result {
            Ok(()) => tracing::info!(cache_key = %key, "cached distribution query result"),
            Err(e) => tracing::error!(cache_key = %key, error = %e, "error writing cache"),
        }
    }

    pub fn clear(&self) {
        if !self.enabled {
            return;
        }
        let Ok(entries) = std::fs::read_dir(&self.cache_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::error!(path = %path.display(), error = %e, "error deleting cache file");
                }
            }
        }
        tracing::info!("cache cleared");
    }
}

/// Background refresher that periodically re-warms the cache once its TTL
/// elapses. The actual refresh body is a no-op placeholder, mirroring the
/// upstream's own unfinished `_refresh_cache`.
pub struct CacheRefresher {
    handle: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
}

impl CacheRefresher {
    /// Starts the refresh loop, or returns `None` if caching is disabled or
    /// has no expiration (`CACHE_TTL_HOURS == 0`), matching the source's
    /// `start()` early-returns.
    pub fn start(ttl_hours: u64, enabled: bool) -> Option<Self> {
        if !enabled {
            tracing::info!("cache disabled, not starting refresh service");
            return None;
        }
        if ttl_hours == 0 {
            tracing::info!("cache TTL is 0 (no expiration), not starting refresh service");
            return None;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tracing::info!(ttl_hours, "cache refresh service started");
            let refresh_period = Duration::from_secs(ttl_hours * 3600);
            let mut last_refresh = tokio::time::Instant::now();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }

                if last_refresh.elapsed() >= refresh_period {
                    tracing::info!("starting scheduled cache refresh");
                    last_refresh = tokio::time::Instant::now();
                    tracing::info!("cache refresh completed");
                }
            }
        });

        Some(Self { handle, stop_tx })
    }

    /// Signals the loop to stop and waits up to 5 seconds for it to exit,
    /// matching the source's `thread.join(timeout=5)`.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, enabled: bool, ttl_hours: u64) -> CacheSettings {
        CacheSettings {
            enabled,
            cache_dir: dir.to_string_lossy().into_owned(),
            ttl_hours,
        }
    }

    #[test]
    fn disabled_cache_never_hits() {
        let dir = std::env::temp_dir().join("bunny-cache-test-disabled");
        let cache = DistributionCache::new(&settings(&dir, false, 24)).unwrap();
        let query = serde_json::json!({"a": 1});
        let modifiers = serde_json::json!([]);
        cache.set(&query, &modifiers, &serde_json::json!({"x": 1}));
        assert!(cache.get(&query, &modifiers).is_none());
    }

    #[test]
    fn round_trips_through_set_and_get() {
        let dir = std::env::temp_dir().join(format!("bunny-cache-test-{}", std::process::id()));
        let cache = DistributionCache::new(&settings(&dir, true, 24)).unwrap();
        let query = serde_json::json!({"cohort": {"groups": []}});
        let modifiers = serde_json::json!([{"id": "Rounding", "nearest": 10}]);
        let result = serde_json::json!({"count": 42});
        cache.set(&query, &modifiers, &result);
        assert_eq!(cache.get(&query, &modifiers), Some(result));
        cache.clear();
        assert!(cache.get(&query, &modifiers).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = std::env::temp_dir().join(format!("bunny-cache-test-ttl-{}", std::process::id()));
        let cache = DistributionCache::new(&settings(&dir, true, 0)).unwrap();
        let query = serde_json::json!({"a": 1});
        let modifiers = serde_json::json!([]);
        cache.set(&query, &modifiers, &serde_json::json!(1));
        // ttl_hours == 0 means no expiration, so this should still hit.
        assert!(cache.get(&query, &modifiers).is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
