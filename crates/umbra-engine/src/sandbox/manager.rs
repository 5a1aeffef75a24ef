//! Process-scoped sandbox cache
//!
//! Sandboxes are expensive to build and every test with the same
//! configuration, SDK and modes can share one. Concurrent requests for one
//! key race on a shared `OnceCell`, so exactly one sandbox is built per key.
//! The cache is bounded; the oldest entry is evicted first.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;
use umbra_sdk::{LooperMode, ResourcesMode};

use super::{Sandbox, SandboxKey, SandboxState};
use crate::error::ConfigError;
use crate::instrument::{InstrumentationConfiguration, SystemClassLoader};
use crate::interceptors::Interceptors;
use crate::sdk::{Sdk, LEGACY_RESOURCES_MAX_SDK};

/// Default number of sandboxes kept alive
pub const DEFAULT_CACHE_SIZE: usize = 8;

type Slot = Arc<OnceCell<Arc<Sandbox>>>;

/// Hands out shared sandboxes keyed by [`SandboxKey`]
pub struct SandboxManager {
    sandboxes: DashMap<SandboxKey, Slot>,
    order: Mutex<VecDeque<SandboxKey>>,
    capacity: usize,
    system: Arc<SystemClassLoader>,
    interceptors: Arc<Interceptors>,
}

impl SandboxManager {
    /// Manager over `system` holding at most `capacity` sandboxes (at least one)
    pub fn new(system: Arc<SystemClassLoader>, interceptors: Arc<Interceptors>, capacity: usize) -> Self {
        Self {
            sandboxes: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            system,
            interceptors,
        }
    }

    /// Shared system class loader
    pub fn system_class_loader(&self) -> &Arc<SystemClassLoader> {
        &self.system
    }

    /// The sandbox for this combination, created on first request.
    ///
    /// Legacy resources above SDK 28 and known-but-unsupported SDKs are
    /// rejected before anything is built.
    pub fn get_sandbox(
        &self,
        config: Arc<InstrumentationConfiguration>,
        sdk: &dyn Sdk,
        resources_mode: ResourcesMode,
        looper_mode: LooperMode,
    ) -> Result<Arc<Sandbox>, ConfigError> {
        let api_level = sdk.api_level();
        if resources_mode == ResourcesMode::Legacy && api_level > LEGACY_RESOURCES_MAX_SDK {
            return Err(ConfigError::LegacyResourcesUnsupported {
                api_level,
                max: LEGACY_RESOURCES_MAX_SDK,
            });
        }
        sdk.verify_supported_sdk(&format!("SDK {}", sdk.android_version()))?;

        let key = SandboxKey::new(config, api_level, resources_mode, looper_mode);
        loop {
            let slot: Slot = Arc::clone(self.sandboxes.entry(key.clone()).or_default().value());

            let mut created = false;
            let sandbox = slot.get_or_init(|| {
                created = true;
                Arc::new(Sandbox::new(
                    Arc::clone(&key.configuration),
                    Arc::clone(&self.system),
                    api_level,
                    resources_mode,
                    looper_mode,
                    Arc::clone(&self.interceptors),
                ))
            });

            if created {
                debug!(api_level, %resources_mode, %looper_mode, "Created sandbox");
                self.record(key.clone());
            } else {
                debug!(api_level, %resources_mode, %looper_mode, "Reusing sandbox");
            }

            // another request may have evicted it since it was built
            if sandbox.state() != SandboxState::Evicted {
                return Ok(Arc::clone(sandbox));
            }
            self.sandboxes.remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
            debug!(api_level, "Sandbox evicted before use, building another");
        }
    }

    fn record(&self, key: SandboxKey) {
        let mut order = self.order.lock();
        order.retain(|queued| queued != &key);
        order.push_back(key);
        while order.len() > self.capacity {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            if let Some((_, slot)) = self.sandboxes.remove(&oldest) {
                if let Some(sandbox) = slot.get() {
                    sandbox.evict();
                }
            }
            debug!(api_level = oldest.api_level, "Evicted sandbox");
        }
    }

    /// Number of cached sandboxes
    pub fn len(&self) -> usize {
        self.sandboxes.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.sandboxes.is_empty()
    }

    /// Maximum number of cached sandboxes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Evict every cached sandbox
    pub fn clear(&self) {
        let mut order = self.order.lock();
        order.clear();
        for entry in self.sandboxes.iter() {
            if let Some(sandbox) = entry.value().get() {
                sandbox.evict();
            }
        }
        self.sandboxes.clear();
    }
}

impl fmt::Debug for SandboxManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxManager")
            .field("cached", &self.sandboxes.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
