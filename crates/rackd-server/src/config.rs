//! Server and session configuration.

use crate::channels::ActiveChannels;
use rackd_plugin::{ChannelTopology, HostError, Result, SampleFormat};
use serde::{Deserialize, Serialize};

/// Process-wide settings shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allow several plugins to be created or destroyed at the same time
    pub parallel_plugin_load: bool,

    /// Create instances on the shared control thread
    pub instantiate_on_control_thread: bool,

    /// Recents kept per host
    pub max_recents: usize,

    /// How long the streaming loop waits for data before checking for shutdown
    pub poll_interval_ms: u64,

    /// Blocks taking longer than this are logged as slow
    pub slow_block_threshold_ms: u64,

    /// Samples of silence fed through a plugin right after it is loaded
    pub warmup_samples: usize,

    /// Capacity of the parameter change queue of a session
    pub parameter_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            parallel_plugin_load: true,
            instantiate_on_control_thread: true,
            max_recents: 10,
            poll_interval_ms: 50,
            slow_block_threshold_ms: 20,
            warmup_samples: 16384,
            parameter_queue_size: 1024,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(HostError::InvalidConfig(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.parameter_queue_size == 0 {
            return Err(HostError::InvalidConfig(
                "parameter_queue_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings a client sends when it opens a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub topology: ChannelTopology,

    /// Channels carried on the wire: input bits 0..32, output bits 32..64
    pub active_channels: u64,

    pub sample_rate: f64,

    pub block_size: usize,

    /// Client prefers 64-bit processing
    pub double_precision: bool,
}

impl SessionConfig {
    /// All declared channels active, 32-bit processing.
    pub fn new(topology: ChannelTopology, sample_rate: f64, block_size: usize) -> Self {
        let active = ActiveChannels::all(topology.total_inputs(), topology.outputs);
        Self {
            topology,
            active_channels: active.mask(),
            sample_rate,
            block_size,
            double_precision: false,
        }
    }

    pub fn active_channels(mut self, mask: u64) -> Self {
        self.active_channels = mask;
        self
    }

    pub fn double_precision(mut self, double_precision: bool) -> Self {
        self.double_precision = double_precision;
        self
    }

    pub fn preferred_format(&self) -> SampleFormat {
        if self.double_precision {
            SampleFormat::Float64
        } else {
            SampleFormat::Float32
        }
    }

    /// Active channel set for this session. Inputs only count when the session
    /// declares main inputs.
    pub fn active(&self) -> ActiveChannels {
        ActiveChannels::new(
            self.active_channels,
            self.topology.inputs > 0,
            self.topology.total_inputs(),
            self.topology.outputs,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(HostError::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(HostError::InvalidConfig(
                "block_size must be greater than 0".to_string(),
            ));
        }
        self.topology.validate()
    }
}
