//! Active wire channels and the mapping between wire and processing buffers.
//!
//! Clients only send the channels they actually use. The wire buffer therefore holds
//! the active channels packed in order, while plugins expect every declared channel
//! at its fixed position. [`ChannelMapper`] translates between the two.

use rackd_plugin::{AudioBuffer, HostError, Result, Sample, MAX_CHANNELS};
use serde::{Deserialize, Serialize};

const OUTPUT_SHIFT: usize = 32;

/// Which declared channels are carried on the wire.
///
/// Bit `i` marks input channel `i` (main inputs followed by side-chain), bit `32 + i`
/// marks output channel `i`. Bits beyond the declared counts are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChannels {
    mask: u64,
    with_input: bool,
    num_inputs: usize,
    num_outputs: usize,
}

impl ActiveChannels {
    pub fn new(mask: u64, with_input: bool, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            mask,
            with_input,
            num_inputs,
            num_outputs,
        }
    }

    /// Every declared channel active.
    pub fn all(num_inputs: usize, num_outputs: usize) -> Self {
        let mut active = Self::new(0, num_inputs > 0, num_inputs, num_outputs);
        for ch in 0..num_inputs.min(MAX_CHANNELS) {
            active.set_input_active(ch, true);
        }
        for ch in 0..num_outputs.min(MAX_CHANNELS) {
            active.set_output_active(ch, true);
        }
        active
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn with_input(&self) -> bool {
        self.with_input
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn set_input_active(&mut self, channel: usize, active: bool) {
        if channel < MAX_CHANNELS {
            self.set_bit(channel, active);
        }
    }

    pub fn set_output_active(&mut self, channel: usize, active: bool) {
        if channel < MAX_CHANNELS {
            self.set_bit(OUTPUT_SHIFT + channel, active);
        }
    }

    fn set_bit(&mut self, bit: usize, active: bool) {
        if active {
            self.mask |= 1 << bit;
        } else {
            self.mask &= !(1 << bit);
        }
    }

    pub fn is_input_active(&self, channel: usize) -> bool {
        self.with_input
            && channel < self.num_inputs
            && channel < MAX_CHANNELS
            && self.mask & (1 << channel) != 0
    }

    pub fn is_output_active(&self, channel: usize) -> bool {
        channel < self.num_outputs
            && channel < MAX_CHANNELS
            && self.mask & (1 << (OUTPUT_SHIFT + channel)) != 0
    }

    pub fn num_active_inputs(&self) -> usize {
        (0..self.num_inputs)
            .filter(|&ch| self.is_input_active(ch))
            .count()
    }

    pub fn num_active_outputs(&self) -> usize {
        (0..self.num_outputs)
            .filter(|&ch| self.is_output_active(ch))
            .count()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_inputs > MAX_CHANNELS || self.num_outputs > MAX_CHANNELS {
            return Err(HostError::InvalidConfig(format!(
                "active channel set declares {} inputs and {} outputs, maximum is {}",
                self.num_inputs, self.num_outputs, MAX_CHANNELS
            )));
        }
        Ok(())
    }
}

/// Fixed wire <-> processing channel table, built once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMapper {
    /// (processing channel, wire channel)
    input: Vec<(usize, usize)>,
    output: Vec<(usize, usize)>,
}

impl ChannelMapper {
    pub fn create_mapping(active: &ActiveChannels) -> Result<Self> {
        active.validate()?;

        let input: Vec<_> = (0..active.num_inputs())
            .filter(|&ch| active.is_input_active(ch))
            .enumerate()
            .map(|(wire, ch)| (ch, wire))
            .collect();
        let output: Vec<_> = (0..active.num_outputs())
            .filter(|&ch| active.is_output_active(ch))
            .enumerate()
            .map(|(wire, ch)| (ch, wire))
            .collect();

        let mapper = Self { input, output };
        mapper.log_mapping();
        Ok(mapper)
    }

    fn log_mapping(&self) {
        for (proc_ch, wire_ch) in &self.input {
            tracing::debug!("input: wire {} -> channel {}", wire_ch, proc_ch);
        }
        for (proc_ch, wire_ch) in &self.output {
            tracing::debug!("output: channel {} -> wire {}", proc_ch, wire_ch);
        }
    }

    pub fn input_map(&self) -> &[(usize, usize)] {
        &self.input
    }

    pub fn output_map(&self) -> &[(usize, usize)] {
        &self.output
    }

    /// Copy active wire inputs to their processing positions. Every other
    /// processing channel is silenced.
    pub fn map<T: Sample>(&self, wire: &AudioBuffer<T>, proc: &mut AudioBuffer<T>) {
        proc.clear();
        for &(proc_ch, wire_ch) in &self.input {
            proc.copy_channel_from(proc_ch, wire, wire_ch);
        }
    }

    /// Copy active processing outputs back to their wire positions.
    pub fn map_reverse<T: Sample>(&self, proc: &AudioBuffer<T>, wire: &mut AudioBuffer<T>) {
        for &(proc_ch, wire_ch) in &self.output {
            wire.copy_channel_from(wire_ch, proc, proc_ch);
        }
    }
}
