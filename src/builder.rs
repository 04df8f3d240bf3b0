//! Builder for configuring and constructing a `RackServer`.

use crate::{RackServer, Result};
use crate::error::Error;
use rackd_plugin::PluginRegistry;
use rackd_server::{HostRuntime, ServerConfig};
use std::sync::Arc;

/// A plugin registry is required; everything else has defaults.
///
/// # Example
///
/// ```ignore
/// use rackd::prelude::*;
///
/// let server = RackServer::builder()
///     .registry(registry)
///     .max_recents(20)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RackServerBuilder {
    config: ServerConfig,
    registry: Option<Arc<dyn PluginRegistry>>,
}

impl RackServerBuilder {
    /// Replace the whole configuration, e.g. one read from a file.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: Arc<dyn PluginRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Default: true
    pub fn parallel_plugin_load(mut self, enabled: bool) -> Self {
        self.config.parallel_plugin_load = enabled;
        self
    }

    /// Default: true
    pub fn instantiate_on_control_thread(mut self, enabled: bool) -> Self {
        self.config.instantiate_on_control_thread = enabled;
        self
    }

    /// Default: 10
    pub fn max_recents(mut self, max: usize) -> Self {
        self.config.max_recents = max;
        self
    }

    /// Default: 50
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Default: 16384
    pub fn warmup_samples(mut self, samples: usize) -> Self {
        self.config.warmup_samples = samples;
        self
    }

    pub fn build(self) -> Result<RackServer> {
        let registry = self.registry.ok_or(Error::MissingRegistry)?;
        let runtime = HostRuntime::new(self.config, registry)?;
        Ok(RackServer::from_runtime(runtime))
    }
}
