//! Engine management for the compiler module.
//!
//! Provides Wasmtime engine configuration and a content-addressed cache
//! of compiled modules so repeated loads of the same binary reuse the
//! compilation.

use dashmap::DashMap;
use tplhost_core::error::{HostError, Result};
use wasmtime::{Config, Engine, Module};

/// Configuration for the host runtime.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HostRuntimeConfig {
    /// Whether to cache compiled modules by content hash.
    pub cache_modules: bool,
    /// Enable debug info in compiled modules.
    pub debug_info: bool,
}

impl Default for HostRuntimeConfig {
    fn default() -> Self {
        Self {
            cache_modules: true,
            debug_info: false,
        }
    }
}

impl HostRuntimeConfig {
    /// Create a configuration for testing: no cache, debug info on.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            cache_modules: false,
            debug_info: true,
        }
    }

    /// Enable or disable module caching.
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_modules = enabled;
        self
    }

    /// Enable or disable debug info.
    #[must_use]
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    /// Create a Wasmtime Config from this configuration.
    fn to_wasmtime_config(&self) -> Config {
        let mut config = Config::new();
        config.debug_info(self.debug_info);
        config.strategy(wasmtime::Strategy::Cranelift);
        config
    }
}

/// Host runtime owning the Wasmtime engine and the module cache.
pub struct HostRuntime {
    /// The Wasmtime engine (thread-safe, cheap to share).
    engine: Engine,
    /// Configuration for this runtime.
    config: HostRuntimeConfig,
    /// Cache of compiled modules by content hash.
    module_cache: DashMap<u64, Module>,
}

impl HostRuntime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: HostRuntimeConfig) -> Result<Self> {
        let engine = Engine::new(&config.to_wasmtime_config()).map_err(|e| HostError::Load {
            cause: format!("engine creation failed: {e}"),
        })?;

        Ok(Self {
            engine,
            config,
            module_cache: DashMap::new(),
        })
    }

    /// Create a new runtime with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(HostRuntimeConfig::default())
    }

    /// Get the Wasmtime engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &HostRuntimeConfig {
        &self.config
    }

    /// Compile module bytes, reusing a cached compilation when available.
    pub fn compile(&self, name: &str, bytes: &[u8]) -> Result<Module> {
        let hash = hash_bytes(bytes);

        if self.config.cache_modules {
            if let Some(cached) = self.module_cache.get(&hash) {
                return Ok(cached.value().clone());
            }
        }

        let module = Module::new(&self.engine, bytes).map_err(|e| HostError::Load {
            cause: format!("compilation of '{name}' failed: {e}"),
        })?;

        if self.config.cache_modules {
            self.module_cache.insert(hash, module.clone());
        }

        Ok(module)
    }

    /// Validate module bytes without keeping the compilation.
    pub fn validate(&self, bytes: &[u8]) -> Result<()> {
        self.engine
            .precompile_module(bytes)
            .map_err(|e| HostError::Load {
                cause: format!("validation failed: {e}"),
            })?;
        Ok(())
    }

    /// Clear the module cache.
    pub fn clear_cache(&self) {
        self.module_cache.clear();
    }

    /// Get the number of cached modules.
    pub fn cache_size(&self) -> usize {
        self.module_cache.len()
    }
}

/// Compute a content hash for the cache key. Not cryptographic.
fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
