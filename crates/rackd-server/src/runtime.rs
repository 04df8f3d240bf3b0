//! Process-wide host runtime.
//!
//! Everything sessions share lives here: the plugin registry, the control thread,
//! the loader lock used when parallel loading is disabled, the loaded plugin
//! counter and the recents lists.

use crate::config::ServerConfig;
use crate::executor::ControlExecutor;
use crate::recents::RecentsRegistry;
use parking_lot::{Mutex, MutexGuard};
use rackd_plugin::{
    HostError, LoadStage, PluginDescriptor, PluginInstance, PluginRegistry, Result,
    SharedInstance,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub struct HostRuntime {
    config: ServerConfig,
    registry: Arc<dyn PluginRegistry>,
    executor: Option<ControlExecutor>,
    loader_lock: Option<Mutex<()>>,
    loaded: AtomicUsize,
    next_session: AtomicU64,
    recents: RecentsRegistry,
}

impl HostRuntime {
    pub fn new(config: ServerConfig, registry: Arc<dyn PluginRegistry>) -> Result<Arc<Self>> {
        config.validate()?;

        let executor = if config.instantiate_on_control_thread {
            Some(ControlExecutor::new("rackd-control")?)
        } else {
            None
        };
        let loader_lock = if config.parallel_plugin_load {
            None
        } else {
            Some(Mutex::new(()))
        };

        tracing::info!(
            "host runtime started (parallel load: {}, control thread: {})",
            config.parallel_plugin_load,
            config.instantiate_on_control_thread
        );

        Ok(Arc::new(Self {
            recents: RecentsRegistry::new(config.max_recents),
            config,
            registry,
            executor,
            loader_lock,
            loaded: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn PluginRegistry> {
        &self.registry
    }

    pub fn recents(&self) -> &RecentsRegistry {
        &self.recents
    }

    /// Plugins currently loaded across all sessions.
    pub fn loaded_count(&self) -> usize {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn plugin_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn plugin_unloaded(&self) {
        let _ = self
            .loaded
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Held while creating or destroying an instance. `None` when parallel loading
    /// is allowed.
    pub(crate) fn lock_loader(&self) -> Option<MutexGuard<'_, ()>> {
        self.loader_lock.as_ref().map(|lock| lock.lock())
    }

    pub fn resolve(&self, id: &str) -> Result<PluginDescriptor> {
        self.registry
            .resolve_descriptor(id)
            .ok_or_else(|| {
                HostError::load_failed(id, LoadStage::Resolving, "failed to find plugin descriptor")
            })
    }

    /// Create an instance, on the control thread when one is configured.
    pub fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Box<dyn PluginInstance>> {
        let result = match &self.executor {
            Some(executor) => {
                let registry = Arc::clone(&self.registry);
                let descriptor = descriptor.clone();
                executor
                    .run_sync(move || registry.instantiate(&descriptor, sample_rate, block_size))
                    .and_then(|r| r)
            }
            None => self.registry.instantiate(descriptor, sample_rate, block_size),
        };

        result.map_err(|e| match e {
            HostError::LoadFailed { .. } => e,
            other => HostError::load_failed(
                descriptor.plugin_id(),
                LoadStage::Instantiation,
                other.to_string(),
            ),
        })
    }

    /// Hand the last reference of an instance to the control thread for teardown.
    pub(crate) fn destroy(&self, instance: SharedInstance) {
        match &self.executor {
            Some(executor) => executor.run_async(move || drop(instance)),
            None => drop(instance),
        }
    }

    pub fn shutdown(&self) {
        if let Some(executor) = &self.executor {
            executor.shutdown();
        }
        tracing::info!("host runtime stopped ({} plugins still loaded)", self.loaded_count());
    }
}
