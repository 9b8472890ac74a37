//! HTTP client factory
//!
//! Builds one reqwest client per backend and caches it keyed by the base
//! URL it was built for. A settings change needs no invalidation hook: the
//! next lookup sees a different URL and rebuilds the client on the spot.
//! Building a client performs no network I/O.

use crate::config::Config;
use crate::error::Result;
use crate::settings::Backend;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

struct CachedClient {
    base_url: String,
    client: reqwest::Client,
}

/// Per-backend cache of configured HTTP clients
pub struct ClientFactory {
    connect_timeout: Duration,
    request_timeout: Duration,
    cache: Mutex<HashMap<Backend, CachedClient>>,
    builds: AtomicUsize,
}

impl ClientFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            cache: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Client for the given backend and its current base URL. Returns the
    /// cached client while the URL is unchanged, otherwise builds a
    /// replacement with the configured timeouts.
    pub fn client_for(&self, backend: Backend, base_url: &str) -> Result<reqwest::Client> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(cached) = cache.get(&backend) {
            if cached.base_url == base_url {
                return Ok(cached.client.clone());
            }
        }

        debug!(backend = %backend, url = %base_url, "building HTTP client");
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()?;
        self.builds.fetch_add(1, Ordering::Relaxed);
        cache.insert(
            backend,
            CachedClient {
                base_url: base_url.to_string(),
                client: client.clone(),
            },
        );
        Ok(client)
    }

    /// Number of clients built so far. Useful for debugging and testing.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}
