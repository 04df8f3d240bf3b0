//! Plugin-facing types for rackd
//!
//! This crate defines what a hosted plugin looks like to the server: the
//! [`PluginInstance`] trait, bus layouts and channel topologies, sample buffers in
//! both precisions, and the [`PluginRegistry`] the server resolves plugin ids with.
//! The streaming side lives in `rackd-server`.
//!
//! ## Usage
//!
//! ```ignore
//! use rackd_plugin::{FactoryRegistry, PluginDescriptor, PluginRegistry};
//!
//! let registry = FactoryRegistry::new();
//! registry.register(PluginDescriptor::new("VST3", "Gain", 0x10), |_, rate, block| {
//!     Ok(Box::new(Gain::new(rate, block)))
//! });
//!
//! let descriptor = registry.resolve_descriptor("VST3-Gain-10").unwrap();
//! let instance = registry.instantiate(&descriptor, 48000.0, 512)?;
//! ```

pub mod error;
pub use error::{HostError, LoadStage, Result};

mod buffer;
pub use buffer::{AudioBuffer, AudioBuffer32, AudioBuffer64, Sample};

pub mod id;

mod instance;
pub use instance::{
    ObserverId, ParameterChange, ParameterObserver, ParameterObservers, PluginInstance,
    SharedInstance,
};

mod layout;
pub use layout::{BusesLayout, ChannelSet, ChannelTopology, MAX_CHANNELS, SIDECHAIN_BUS};

mod metadata;
pub use metadata::{PluginDescriptor, PluginMetadata};

pub mod protocol;
pub use protocol::{MidiEvent, MidiEventVec, PlayHead, SampleFormat, TransportInfo};

mod registry;
pub use registry::{FactoryRegistry, PluginFactory, PluginRegistry};
