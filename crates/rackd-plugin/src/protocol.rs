//! Types exchanged between the transport, the chain and hosted plugins.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

const MIDI_STACK_CAPACITY: usize = 256;

/// Raw MIDI event (up to three bytes) with its sample offset within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub frame_offset: usize,
    pub data: [u8; 3],
    pub len: u8,
}

impl MidiEvent {
    pub fn from_bytes(frame_offset: usize, bytes: &[u8]) -> Self {
        let mut data = [0u8; 3];
        let len = bytes.len().min(3);
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            frame_offset,
            data,
            len: len as u8,
        }
    }

    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self::from_bytes(frame_offset, &[0x90 | (channel & 0x0f), note, velocity])
    }

    pub fn note_off(frame_offset: usize, channel: u8, note: u8) -> Self {
        Self::from_bytes(frame_offset, &[0x80 | (channel & 0x0f), note, 0])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn status(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }
}

pub type MidiEventVec = SmallVec<[MidiEvent; MIDI_STACK_CAPACITY]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    Float32,
    Float64,
}

#[allow(clippy::derivable_impls)]
impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::Float32
    }
}

impl SampleFormat {
    pub fn is_double(self) -> bool {
        self == SampleFormat::Float64
    }
}

/// Host transport position delivered with every block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub playing: bool,
    pub recording: bool,
    pub cycle_active: bool,
    pub tempo: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    pub position_samples: i64,
    pub position_quarters: f64,
    pub bar_position_quarters: f64,
    pub cycle_start_quarters: f64,
    pub cycle_end_quarters: f64,
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            cycle_active: false,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            position_samples: 0,
            position_quarters: 0.0,
            bar_position_quarters: 0.0,
            cycle_start_quarters: 0.0,
            cycle_end_quarters: 0.0,
        }
    }
}

/// Shared view of the current transport position.
///
/// The streaming worker writes the position of every received block; plugins read
/// it during processing. Clone is cheap (Arc).
#[derive(Clone, Default)]
pub struct PlayHead {
    position: Arc<Mutex<TransportInfo>>,
}

impl PlayHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, info: TransportInfo) {
        *self.position.lock() = info;
    }

    pub fn position(&self) -> TransportInfo {
        *self.position.lock()
    }

    pub fn same_as(&self, other: &PlayHead) -> bool {
        Arc::ptr_eq(&self.position, &other.position)
    }
}

impl std::fmt::Debug for PlayHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayHead")
            .field("position", &self.position())
            .finish()
    }
}
