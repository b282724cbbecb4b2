//! Device-type to backend dispatch

use crate::KernelProvider;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tensorop_common::{BackendEntry, DeviceType, KernelCapabilities, OpError, Result, RuntimeConfig};

/// Registry of backends keyed by the device family they serve.
pub struct KernelRegistry {
    backends: RwLock<HashMap<DeviceType, Arc<dyn KernelProvider>>>,
    config: RuntimeConfig,
}

impl KernelRegistry {
    /// An empty registry.
    pub fn new(config: RuntimeConfig) -> Self {
        Self { backends: RwLock::new(HashMap::new()), config }
    }

    /// A registry holding every backend linked into this build.
    pub fn with_default_backends(config: RuntimeConfig) -> Self {
        let registry = Self::new(config);

        #[cfg(feature = "cpu")]
        {
            let cpu = crate::cpu::CpuReferenceKernel::new(&registry.config);
            registry.register(Arc::new(cpu));
        }

        registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register `provider` for its device family, returning the backend it
    /// replaces.
    pub fn register(&self, provider: Arc<dyn KernelProvider>) -> Option<Arc<dyn KernelProvider>> {
        let device = provider.device();
        log::info!("registering {} backend for device type {}", provider.name(), device);
        let mut backends = self.backends.write().unwrap_or_else(|e| e.into_inner());
        backends.insert(device, provider)
    }

    /// Backend for `device`, if one is registered and available.
    pub fn lookup(&self, device: DeviceType) -> Result<Arc<dyn KernelProvider>> {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        match backends.get(&device) {
            Some(provider) if provider.is_available() => {
                log::debug!("selected {} backend for device type {}", provider.name(), device);
                Ok(Arc::clone(provider))
            }
            Some(provider) => {
                log::debug!("{} backend for device type {} is unavailable", provider.name(), device);
                Err(OpError::DeviceTypeNotSupported { device })
            }
            None => Err(OpError::DeviceTypeNotSupported { device }),
        }
    }

    pub fn is_supported(&self, device: DeviceType) -> bool {
        self.lookup(device).is_ok()
    }

    /// Device families with an available backend, in discriminant order.
    pub fn supported_devices(&self) -> Vec<DeviceType> {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        DeviceType::ALL
            .into_iter()
            .filter(|d| backends.get(d).is_some_and(|p| p.is_available()))
            .collect()
    }

    /// Snapshot of compiled and registered backends.
    pub fn capabilities(&self) -> KernelCapabilities {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        let registered = DeviceType::ALL
            .into_iter()
            .filter_map(|device| {
                backends.get(&device).map(|p| BackendEntry { device, name: p.name(), available: p.is_available() })
            })
            .collect();
        KernelCapabilities::from_compile_time().with_registered(registered)
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::with_default_backends(RuntimeConfig::default())
    }
}

static DEFAULT_REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();

/// Process-wide registry, configured from the environment on first use.
pub fn default_registry() -> &'static KernelRegistry {
    DEFAULT_REGISTRY.get_or_init(|| {
        let config = RuntimeConfig::from_env().unwrap_or_else(|e| {
            log::warn!("ignoring invalid runtime configuration: {e}");
            RuntimeConfig::default()
        });
        let registry = KernelRegistry::with_default_backends(config);
        log::debug!("default kernel registry: {}", registry.capabilities().summary());
        registry
    })
}
