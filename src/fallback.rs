//! Backend selection and fallback execution
//!
//! `BackendManager` owns the settings store and the client factory and is
//! shared (via `Arc`) by everything that talks to a backend. An operation
//! run through [`BackendManager::execute_with_fallback`] is attempted
//! against the active backend first and the other one second; the first
//! success wins and per-endpoint failures are logged, not raised. The
//! active selection is read fresh on every call, so a settings change
//! applies to the very next operation.

use crate::api::BackendApi;
use crate::client::ClientFactory;
use crate::config::Config;
use crate::error::Result;
use crate::settings::{Backend, SettingsStore};
use std::future::Future;
use tracing::{debug, error, warn};

/// Shared connectivity context: settings plus cached HTTP clients
pub struct BackendManager {
    store: SettingsStore,
    factory: ClientFactory,
}

impl BackendManager {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            store: SettingsStore::open(config)?,
            factory: ClientFactory::new(config),
        })
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// Gateway bound to the given backend's current base URL.
    pub fn api_for(&self, backend: Backend) -> Result<BackendApi> {
        let url = self.store.endpoint_url(backend)?;
        let client = self.factory.client_for(backend, &url)?;
        Ok(BackendApi::new(backend, url, client))
    }

    /// The order in which backends are attempted: active first, then the
    /// other one. Looked up from the store at call time.
    pub fn try_order(&self) -> Result<[Backend; 2]> {
        let active = self.store.active_backend()?;
        Ok([active, active.other()])
    }

    /// Run one gateway operation with automatic fallback. Returns the first
    /// successful result, or `None` when both backends fail. Failures are
    /// logged and swallowed; callers see only the optional value.
    pub async fn execute_with_fallback<T, F, Fut>(&self, operation: &str, op: F) -> Option<T>
    where
        F: Fn(BackendApi) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let order = match self.try_order() {
            Ok(order) => order,
            Err(e) => {
                error!(operation, error = %e, "cannot read backend settings");
                return None;
            }
        };

        for backend in order {
            let api = match self.api_for(backend) {
                Ok(api) => api,
                Err(e) => {
                    warn!(backend = %backend, operation, error = %e, "cannot build gateway");
                    continue;
                }
            };
            debug!(backend = %backend, url = %api.base_url(), operation, "attempting");
            match op(api).await {
                Ok(value) => {
                    debug!(backend = %backend, operation, "succeeded");
                    return Some(value);
                }
                Err(e) => {
                    warn!(
                        backend = %backend,
                        operation,
                        status = e.status_code(),
                        error = %e,
                        "backend call failed"
                    );
                }
            }
        }

        error!(operation, "all backends failed");
        None
    }
}
