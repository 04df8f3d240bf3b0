//! # rackd - Remote plugin rack server
//!
//! Streams client audio through chains of hosted plugins and sends it back.
//!
//! ## Architecture
//!
//! rackd is an umbrella crate over:
//! - **rackd-plugin** - What a hosted plugin looks like (instances, bus layouts,
//!   buffers, plugin ids, registry)
//! - **rackd-server** - Channel mapping, plugin slots, processor chains and the
//!   streaming worker
//!
//! ## Quick Start
//!
//! ```ignore
//! use rackd::prelude::*;
//!
//! let server = RackServer::builder().registry(registry).build()?;
//!
//! let (transport, client) = loopback(4);
//! let config = SessionConfig::new(ChannelTopology::stereo(), 48000.0, 512);
//! let worker = server.open_session(Box::new(transport), config)?;
//! worker.add_plugin("VST3-Reverb-1a2b")?;
//! worker.start()?;
//!
//! let processed = client.process(block, Duration::from_millis(100))?;
//! ```

/// Re-export of rackd-plugin for direct access
pub use rackd_plugin as plugin;

/// Re-export of rackd-server for direct access
pub use rackd_server as server;

pub use rackd_plugin::{
    AudioBuffer, AudioBuffer32, AudioBuffer64, BusesLayout, ChannelSet, ChannelTopology,
    FactoryRegistry, HostError, LoadStage, MidiEvent, MidiEventVec, ParameterChange, PlayHead,
    PluginDescriptor, PluginInstance, PluginMetadata, PluginRegistry, Sample, SampleFormat,
    TransportInfo,
};

pub use rackd_server::{
    loopback, ActiveChannels, AudioBlock, ChannelMapper, ChannelTransport, LoopbackClient,
    ProcessedBlock, ProcessorChain, ServerConfig, SessionConfig, StreamingWorker, Transport,
    WorkerState,
};

mod builder;
mod error;
mod rack;

pub use builder::RackServerBuilder;
pub use error::{Error, Result};
pub use rack::RackServer;

/// Everything needed to run a server and implement plugins or transports.
pub mod prelude {
    pub use crate::{
        loopback, AudioBlock, AudioBuffer, AudioBuffer32, AudioBuffer64, BusesLayout,
        ChannelSet, ChannelTopology, FactoryRegistry, MidiEventVec, PluginDescriptor,
        PluginInstance, PluginMetadata, PluginRegistry, RackServer, RackServerBuilder, Sample,
        SampleFormat, ServerConfig, SessionConfig, StreamingWorker, Transport, TransportInfo,
    };
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
