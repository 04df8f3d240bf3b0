//! Plugin registry collaborator.
//!
//! The server never scans for plugins itself. It asks a [`PluginRegistry`] to
//! resolve client-supplied ids and to create instances. [`FactoryRegistry`] is an
//! in-memory implementation backed by factory closures.

use crate::error::{HostError, LoadStage, Result};
use crate::id::convert_legacy_id;
use crate::instance::PluginInstance;
use crate::metadata::PluginDescriptor;
use parking_lot::RwLock;
use std::sync::Arc;

pub trait PluginRegistry: Send + Sync {
    fn resolve_descriptor(&self, id: &str) -> Option<PluginDescriptor>;

    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Box<dyn PluginInstance>>;
}

pub type PluginFactory =
    Arc<dyn Fn(&PluginDescriptor, f64, usize) -> Result<Box<dyn PluginInstance>> + Send + Sync>;

/// Registry of descriptors with one factory each.
///
/// # Example
/// ```ignore
/// let registry = FactoryRegistry::new();
/// registry.register(
///     PluginDescriptor::new("VST3", "Gain", 0x10),
///     |_desc, sample_rate, block_size| Ok(Box::new(Gain::new(sample_rate, block_size))),
/// );
/// let desc = registry.resolve_descriptor("VST3-Gain-10").unwrap();
/// ```
#[derive(Default)]
pub struct FactoryRegistry {
    entries: RwLock<Vec<(PluginDescriptor, PluginFactory)>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering an id twice replaces the earlier entry.
    pub fn register<F>(&self, descriptor: PluginDescriptor, factory: F)
    where
        F: Fn(&PluginDescriptor, f64, usize) -> Result<Box<dyn PluginInstance>>
            + Send
            + Sync
            + 'static,
    {
        let id = descriptor.plugin_id();
        let mut entries = self.entries.write();
        entries.retain(|(d, _)| d.plugin_id() != id);
        tracing::debug!("registered plugin {}", id);
        entries.push((descriptor, Arc::new(factory)));
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(d, _)| d.plugin_id() != id);
        entries.len() != before
    }

    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.entries.read().iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PluginRegistry for FactoryRegistry {
    fn resolve_descriptor(&self, id: &str) -> Option<PluginDescriptor> {
        let converted = convert_legacy_id(id);
        let entries = self.entries.read();

        let by_id = entries.iter().rev().find(|(d, _)| {
            let plugin_id = d.plugin_id();
            plugin_id == id || converted.as_deref() == Some(plugin_id.as_str())
        });

        by_id
            .or_else(|| {
                entries
                    .iter()
                    .find(|(d, _)| !d.file_or_identifier.is_empty() && d.file_or_identifier == id)
            })
            .map(|(d, _)| d.clone())
    }

    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Box<dyn PluginInstance>> {
        let id = descriptor.plugin_id();
        let factory = self
            .entries
            .read()
            .iter()
            .find(|(d, _)| d.plugin_id() == id)
            .map(|(_, f)| Arc::clone(f));

        match factory {
            Some(factory) => factory(descriptor, sample_rate, block_size),
            None => Err(HostError::load_failed(
                id,
                LoadStage::Instantiation,
                "no factory registered",
            )),
        }
    }
}
