//! Plugin descriptors and runtime metadata.

use serde::{Deserialize, Serialize};

/// Catalog entry for an installable plugin, as produced by the external scanner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Plugin format name ("VST3", "VST", "AudioUnit", ...)
    pub format: String,

    pub name: String,

    pub vendor: String,

    /// Format-specific unique id
    pub uid: u32,

    /// Bundle path or format identifier
    pub file_or_identifier: String,
}

impl PluginDescriptor {
    pub fn new(format: impl Into<String>, name: impl Into<String>, uid: u32) -> Self {
        Self {
            format: format.into(),
            name: name.into(),
            vendor: String::new(),
            uid,
            file_or_identifier: String::new(),
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn file(mut self, file_or_identifier: impl Into<String>) -> Self {
        self.file_or_identifier = file_or_identifier.into();
        self
    }

    /// Canonical id: `<format>-<name>-<uid hex>`.
    pub fn plugin_id(&self) -> String {
        crate::id::create_plugin_id(&self.format, &self.name, self.uid)
    }
}

/// What a loaded instance reports about itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Canonical plugin id
    pub id: String,

    /// Shown in chain descriptions and logs
    pub name: String,
}

impl PluginMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
