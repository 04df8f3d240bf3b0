//! Session transport.
//!
//! The worker only needs to wait for, read and write whole blocks. Framing and
//! sockets live behind the [`Transport`] trait. [`loopback`] provides an in-process
//! implementation over crossbeam channels.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use rackd_plugin::{
    AudioBuffer32, AudioBuffer64, HostError, MidiEventVec, Result, SampleFormat, TransportInfo,
};
use std::time::Duration;

/// One block of audio as exchanged with the client. Only the buffer matching
/// `format` carries data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBlock {
    pub format: SampleFormat,
    pub audio_f32: AudioBuffer32,
    pub audio_f64: AudioBuffer64,
    pub midi: MidiEventVec,
    pub transport: TransportInfo,
}

impl AudioBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_f32(audio: AudioBuffer32) -> Self {
        Self {
            format: SampleFormat::Float32,
            audio_f32: audio,
            ..Default::default()
        }
    }

    pub fn from_f64(audio: AudioBuffer64) -> Self {
        Self {
            format: SampleFormat::Float64,
            audio_f64: audio,
            ..Default::default()
        }
    }

    pub fn midi(mut self, midi: MidiEventVec) -> Self {
        self.midi = midi;
        self
    }

    pub fn transport(mut self, transport: TransportInfo) -> Self {
        self.transport = transport;
        self
    }

    pub fn is_double(&self) -> bool {
        self.format.is_double()
    }

    pub fn num_channels(&self) -> usize {
        match self.format {
            SampleFormat::Float32 => self.audio_f32.num_channels(),
            SampleFormat::Float64 => self.audio_f64.num_channels(),
        }
    }

    pub fn num_samples(&self) -> usize {
        match self.format {
            SampleFormat::Float32 => self.audio_f32.num_samples(),
            SampleFormat::Float64 => self.audio_f64.num_samples(),
        }
    }
}

/// Connection a streaming session reads blocks from and writes results to.
pub trait Transport: Send {
    /// Wait up to `timeout` for the next block. `Ok(false)` on timeout.
    fn wait_ready(&mut self, timeout: Duration) -> Result<bool>;

    /// Read the next block into `block`, reusing its buffers.
    fn read_block(&mut self, block: &mut AudioBlock) -> Result<()>;

    /// Send a processed block together with the chain latency.
    fn write_block(&mut self, block: &AudioBlock, latency_samples: usize) -> Result<()>;

    fn close(&mut self);

    fn is_connected(&self) -> bool;
}

/// A processed block as received by a loopback client.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedBlock {
    pub block: AudioBlock,
    pub latency_samples: usize,
}

/// Server half of a loopback connection.
pub struct ChannelTransport {
    incoming: Option<Receiver<AudioBlock>>,
    outgoing: Option<Sender<ProcessedBlock>>,
    pending: Option<AudioBlock>,
}

/// Client half of a loopback connection. Dropping it disconnects the server half.
pub struct LoopbackClient {
    outgoing: Sender<AudioBlock>,
    incoming: Receiver<ProcessedBlock>,
}

/// Create a connected transport pair holding up to `capacity` blocks per direction.
pub fn loopback(capacity: usize) -> (ChannelTransport, LoopbackClient) {
    let (to_server, from_client) = bounded(capacity);
    let (to_client, from_server) = bounded(capacity);
    (
        ChannelTransport {
            incoming: Some(from_client),
            outgoing: Some(to_client),
            pending: None,
        },
        LoopbackClient {
            outgoing: to_server,
            incoming: from_server,
        },
    )
}

impl Transport for ChannelTransport {
    fn wait_ready(&mut self, timeout: Duration) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        let incoming = self.incoming.as_ref().ok_or(HostError::ConnectionClosed)?;
        match incoming.recv_timeout(timeout) {
            Ok(block) => {
                self.pending = Some(block);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(HostError::ConnectionClosed),
        }
    }

    fn read_block(&mut self, block: &mut AudioBlock) -> Result<()> {
        let next = match self.pending.take() {
            Some(next) => next,
            None => {
                let incoming = self.incoming.as_ref().ok_or(HostError::ConnectionClosed)?;
                match incoming.try_recv() {
                    Ok(next) => next,
                    Err(TryRecvError::Empty) => {
                        return Err(HostError::Transport("no block available".to_string()))
                    }
                    Err(TryRecvError::Disconnected) => return Err(HostError::ConnectionClosed),
                }
            }
        };
        *block = next;
        Ok(())
    }

    fn write_block(&mut self, block: &AudioBlock, latency_samples: usize) -> Result<()> {
        let outgoing = self.outgoing.as_ref().ok_or(HostError::ConnectionClosed)?;
        outgoing
            .send(ProcessedBlock {
                block: block.clone(),
                latency_samples,
            })
            .map_err(|_| HostError::ConnectionClosed)
    }

    fn close(&mut self) {
        if self.incoming.take().is_some() {
            tracing::debug!("loopback transport closed");
        }
        self.outgoing = None;
        self.pending = None;
    }

    fn is_connected(&self) -> bool {
        self.incoming.is_some() && self.outgoing.is_some()
    }
}

impl LoopbackClient {
    pub fn send(&self, block: AudioBlock) -> Result<()> {
        self.outgoing
            .send(block)
            .map_err(|_| HostError::ConnectionClosed)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ProcessedBlock> {
        self.incoming.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                HostError::Transport("timed out waiting for processed block".to_string())
            }
            RecvTimeoutError::Disconnected => HostError::ConnectionClosed,
        })
    }

    /// Send `block` and wait for its processed counterpart.
    pub fn process(&self, block: AudioBlock, timeout: Duration) -> Result<ProcessedBlock> {
        self.send(block)?;
        self.recv_timeout(timeout)
    }
}
