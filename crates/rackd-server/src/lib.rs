//! Streaming plugin chain server for rackd
//!
//! A [`StreamingWorker`] serves one client session. It reads audio blocks from a
//! [`Transport`], runs them through a [`ProcessorChain`] of hosted plugins and
//! sends them back together with the chain latency. [`ChannelMapper`] places the
//! client's active wire channels at their fixed processing positions.
//!
//! ## Usage
//!
//! ```ignore
//! use rackd_server::{loopback, HostRuntime, ServerConfig, SessionConfig, StreamingWorker};
//! use rackd_plugin::ChannelTopology;
//!
//! let runtime = HostRuntime::new(ServerConfig::default(), registry)?;
//! let (transport, client) = loopback(4);
//!
//! let worker = StreamingWorker::new(runtime);
//! worker.init(Box::new(transport), SessionConfig::new(ChannelTopology::stereo(), 48000.0, 512))?;
//! worker.add_plugin("VST3-Reverb-1a2b")?;
//! worker.start()?;
//! ```

mod channels;
pub use channels::{ActiveChannels, ChannelMapper};

mod config;
pub use config::{ServerConfig, SessionConfig};

mod executor;
pub use executor::ControlExecutor;

mod recents;
pub use recents::RecentsRegistry;

mod runtime;
pub use runtime::HostRuntime;

mod slot;
pub use slot::PluginSlot;

mod chain;
pub use chain::ProcessorChain;

mod transport;
pub use transport::{
    loopback, AudioBlock, ChannelTransport, LoopbackClient, ProcessedBlock, Transport,
};

mod worker;
pub use worker::{StreamingWorker, WorkerState};

#[cfg(test)]
mod testing;

pub use rackd_plugin::{HostError, LoadStage, Result};
