//! Bus layouts and channel topologies.
//!
//! A session declares a fixed topology (main inputs, side-chain inputs, main
//! outputs). The chain turns it into a [`BusesLayout`] and negotiates that layout
//! with every hosted plugin.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound for channels per direction carried by a session.
pub const MAX_CHANNELS: usize = 32;

/// Index of the side-chain bus among the input buses of a standard layout.
pub const SIDECHAIN_BUS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSet {
    Disabled,
    Mono,
    Stereo,
    Discrete(usize),
}

impl ChannelSet {
    pub fn with_channels(channels: usize) -> Self {
        match channels {
            0 => ChannelSet::Disabled,
            1 => ChannelSet::Mono,
            2 => ChannelSet::Stereo,
            n => ChannelSet::Discrete(n),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ChannelSet::Disabled => 0,
            ChannelSet::Mono => 1,
            ChannelSet::Stereo => 2,
            ChannelSet::Discrete(n) => *n,
        }
    }
}

impl std::fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSet::Disabled => write!(f, "disabled"),
            ChannelSet::Mono => write!(f, "mono"),
            ChannelSet::Stereo => write!(f, "stereo"),
            ChannelSet::Discrete(n) => write!(f, "discrete({})", n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusesLayout {
    pub inputs: Vec<ChannelSet>,
    pub outputs: Vec<ChannelSet>,
}

impl BusesLayout {
    /// Main input, optional side-chain input, main output.
    pub fn standard(topology: &ChannelTopology) -> Self {
        let mut layout = BusesLayout::default();
        if topology.inputs > 0 || topology.sidechain > 0 {
            layout.inputs.push(ChannelSet::with_channels(topology.inputs));
        }
        if topology.sidechain > 0 {
            layout.inputs.push(ChannelSet::with_channels(topology.sidechain));
        }
        if topology.outputs > 0 {
            layout
                .outputs
                .push(ChannelSet::with_channels(topology.outputs));
        }
        layout
    }

    pub fn main_input_channels(&self) -> usize {
        self.inputs.first().map(ChannelSet::size).unwrap_or(0)
    }

    pub fn main_output_channels(&self) -> usize {
        self.outputs.first().map(ChannelSet::size).unwrap_or(0)
    }

    pub fn total_input_channels(&self) -> usize {
        self.inputs.iter().map(ChannelSet::size).sum()
    }

    pub fn total_output_channels(&self) -> usize {
        self.outputs.iter().map(ChannelSet::size).sum()
    }

    /// Channels on input buses after the main one.
    pub fn aux_input_channels(&self) -> usize {
        self.inputs.iter().skip(1).map(ChannelSet::size).sum()
    }

    /// Channels on output buses after the main one.
    pub fn aux_output_channels(&self) -> usize {
        self.outputs.iter().skip(1).map(ChannelSet::size).sum()
    }

    pub fn sidechain(&self) -> Option<ChannelSet> {
        self.inputs.get(SIDECHAIN_BUS).copied()
    }

    pub fn with_mono_sidechain(&self) -> Self {
        let mut layout = self.clone();
        if layout.inputs.len() > SIDECHAIN_BUS {
            layout.inputs[SIDECHAIN_BUS] = ChannelSet::Mono;
        }
        layout
    }

    pub fn without_sidechain(&self) -> Self {
        let mut layout = self.clone();
        if layout.inputs.len() > SIDECHAIN_BUS {
            layout.inputs.remove(SIDECHAIN_BUS);
        }
        layout
    }
}

impl std::fmt::Display for BusesLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "in: [")?;
        for (i, bus) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", bus)?;
        }
        write!(f, "] out: [")?;
        for (i, bus) in self.outputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", bus)?;
        }
        write!(f, "]")
    }
}

/// Channel counts a session declares at setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTopology {
    pub inputs: usize,
    pub outputs: usize,
    pub sidechain: usize,
}

impl ChannelTopology {
    pub fn new(inputs: usize, outputs: usize, sidechain: usize) -> Self {
        Self {
            inputs,
            outputs,
            sidechain,
        }
    }

    pub fn stereo() -> Self {
        Self::new(2, 2, 0)
    }

    /// Main inputs plus side-chain.
    pub fn total_inputs(&self) -> usize {
        self.inputs + self.sidechain
    }

    pub fn has_sidechain(&self) -> bool {
        self.sidechain > 0
    }

    /// Channels a processing buffer needs for this topology, before extra channels.
    pub fn processing_channels(&self) -> usize {
        self.total_inputs().max(self.outputs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_inputs() > MAX_CHANNELS {
            return Err(HostError::InvalidConfig(format!(
                "{} input + {} side-chain channels exceed the maximum of {}",
                self.inputs, self.sidechain, MAX_CHANNELS
            )));
        }
        if self.outputs > MAX_CHANNELS {
            return Err(HostError::InvalidConfig(format!(
                "{} output channels exceed the maximum of {}",
                self.outputs, MAX_CHANNELS
            )));
        }
        if self.total_inputs() == 0 && self.outputs == 0 {
            return Err(HostError::InvalidConfig(
                "topology declares no channels".to_string(),
            ));
        }
        Ok(())
    }
}
