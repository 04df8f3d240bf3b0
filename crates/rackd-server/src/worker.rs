//! Streaming worker.
//!
//! A worker owns one client session: the transport, the processor chain and the
//! channel mapping. Once started it runs the real-time loop on its own thread:
//! wait for a block, process it through the chain, send it back with the current
//! latency. Control calls (adding or removing plugins, bypass, parameter reads) can
//! arrive from other threads at any time.

use crate::channels::{ActiveChannels, ChannelMapper};
use crate::chain::ProcessorChain;
use crate::config::SessionConfig;
use crate::runtime::HostRuntime;
use crate::transport::{AudioBlock, Transport};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rackd_plugin::{
    AudioBuffer, AudioBuffer32, AudioBuffer64, HostError, MidiEventVec, ParameterChange,
    PlayHead, Result, Sample,
};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Configured = 1,
    Running = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Configured,
            2 => WorkerState::Running,
            _ => WorkerState::Terminated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Configured => "configured",
            WorkerState::Running => "running",
            WorkerState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SessionIo {
    transport: Box<dyn Transport>,
    block: AudioBlock,
    proc_f32: AudioBuffer32,
    proc_f64: AudioBuffer64,
    convert: AudioBuffer32,
    play_head: PlayHead,
}

struct Session {
    config: SessionConfig,
    active: ActiveChannels,
    mapper: ChannelMapper,
    chain: ProcessorChain,
    io: Mutex<SessionIo>,
}

impl Session {
    fn process(&self, io: &mut SessionIo) -> Result<()> {
        let SessionIo {
            transport,
            block,
            proc_f32,
            proc_f64,
            convert,
            ..
        } = io;

        let received = block.num_channels();
        let needed = self.active.num_active_inputs();
        if needed > received {
            return Err(HostError::InsufficientChannels { needed, received });
        }

        if block.is_double() {
            if self.chain.is_using_double_precision() {
                self.process_adaptive(&mut block.audio_f64, &mut block.midi, proc_f64);
            } else {
                convert.make_copy_of(&block.audio_f64);
                self.process_adaptive(convert, &mut block.midi, proc_f32);
                block.audio_f64.make_copy_of(convert);
            }
        } else {
            self.process_adaptive(&mut block.audio_f32, &mut block.midi, proc_f32);
        }

        transport.write_block(block, self.chain.latency_samples())
    }

    /// Process in place when the wire buffer is wide enough, otherwise through the
    /// scratch buffer with channel mapping.
    fn process_adaptive<T: Sample>(
        &self,
        buffer: &mut AudioBuffer<T>,
        midi: &mut MidiEventVec,
        scratch: &mut AudioBuffer<T>,
    ) {
        let num_channels =
            self.config.topology.processing_channels() + self.chain.extra_channels();

        if num_channels <= buffer.num_channels() {
            self.chain.process_block(buffer, midi);
            return;
        }

        scratch.set_size(num_channels, buffer.num_samples());
        if self.active.num_active_inputs() > 0 {
            self.mapper.map(buffer, scratch);
        } else {
            scratch.clear();
        }
        self.chain.process_block(scratch, midi);
        self.mapper.map_reverse(scratch, buffer);
    }
}

struct WorkerShared {
    session_id: u64,
    runtime: Arc<HostRuntime>,
    state: AtomicU8,
    exit: AtomicBool,
    session: OnceLock<Session>,
    parameter_tx: Sender<ParameterChange>,
    parameter_rx: Receiver<ParameterChange>,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn run(&self) {
        let span = tracing::info_span!("audio_worker", session = self.session_id);
        let _enter = span.enter();

        let Some(session) = self.session.get() else {
            tracing::error!("audio worker started without a session");
            self.set_state(WorkerState::Terminated);
            return;
        };

        tracing::info!("audio processor started");
        session
            .chain
            .prepare(session.config.sample_rate, session.config.block_size);
        let poll = Duration::from_millis(self.runtime.config().poll_interval_ms);
        let mut play_head_set = false;

        while !self.exit.load(Ordering::Acquire) {
            let mut guard = session.io.lock();
            let io = &mut *guard;

            match io.transport.wait_ready(poll) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!("connection lost: {}", e);
                    io.transport.close();
                    break;
                }
            }

            if let Err(e) = io.transport.read_block(&mut io.block) {
                tracing::error!("failed to read audio block: {}", e);
                io.transport.close();
                break;
            }

            io.play_head.update(io.block.transport);
            // Only hand out the play head once it carries a real position
            if !play_head_set {
                session.chain.set_play_head(Some(io.play_head.clone()));
                play_head_set = true;
            }

            match session.process(io) {
                Ok(()) => {}
                Err(e @ HostError::InsufficientChannels { .. }) => {
                    tracing::error!("error processing audio block: {}", e);
                    session.chain.release_resources();
                    io.transport.close();
                    break;
                }
                Err(e) => {
                    tracing::error!("failed to send audio block: {}", e);
                    io.transport.close();
                    break;
                }
            }
        }

        session.io.lock().transport.close();
        session.chain.set_play_head(None);
        session.chain.clear();
        self.set_state(WorkerState::Terminated);
        tracing::info!("audio processor terminated");
    }
}

/// One streaming session and its real-time thread.
///
/// # Example
/// ```ignore
/// let worker = StreamingWorker::new(runtime);
/// worker.init(Box::new(transport), SessionConfig::new(ChannelTopology::stereo(), 48000.0, 256))?;
/// worker.add_plugin("VST3-Reverb-1a2b")?;
/// worker.start()?;
/// ```
pub struct StreamingWorker {
    shared: Arc<WorkerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingWorker {
    pub fn new(runtime: Arc<HostRuntime>) -> Self {
        let (parameter_tx, parameter_rx) = bounded(runtime.config().parameter_queue_size);
        Self {
            shared: Arc::new(WorkerShared {
                session_id: runtime.next_session_id(),
                runtime,
                state: AtomicU8::new(WorkerState::Idle as u8),
                exit: AtomicBool::new(false),
                session: OnceLock::new(),
                parameter_tx,
                parameter_rx,
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.shared.session_id
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    fn invalid_state(&self, expected: &'static str) -> HostError {
        HostError::InvalidState {
            expected,
            actual: self.state().as_str(),
        }
    }

    /// Set up the session. The worker must be idle.
    pub fn init(&self, transport: Box<dyn Transport>, config: SessionConfig) -> Result<()> {
        if self.state() != WorkerState::Idle {
            return Err(self.invalid_state("idle"));
        }
        config.validate()?;

        let active = config.active();
        let mapper = ChannelMapper::create_mapping(&active)?;

        let topology = config.topology;
        let chain = ProcessorChain::new(
            Arc::clone(&self.shared.runtime),
            topology,
            config.sample_rate,
            config.block_size,
            config.double_precision,
        )
        .with_parameter_sender(self.shared.parameter_tx.clone());
        chain.update_channels(topology.inputs, topology.outputs, topology.sidechain)?;

        tracing::info!(
            "session {}: {} in, {} out, {} side-chain, {} active inputs, {} Hz, {} samples, {:?}",
            self.shared.session_id,
            topology.inputs,
            topology.outputs,
            topology.sidechain,
            active.num_active_inputs(),
            config.sample_rate,
            config.block_size,
            config.preferred_format()
        );

        let session = Session {
            config,
            active,
            mapper,
            chain,
            io: Mutex::new(SessionIo {
                transport,
                block: AudioBlock::new(),
                proc_f32: AudioBuffer32::default(),
                proc_f64: AudioBuffer64::default(),
                convert: AudioBuffer32::default(),
                play_head: PlayHead::new(),
            }),
        };
        if self.shared.session.set(session).is_err() {
            return Err(self.invalid_state("idle"));
        }
        self.shared.set_state(WorkerState::Configured);
        Ok(())
    }

    /// Spawn the real-time thread. The worker must be configured.
    pub fn start(&self) -> Result<()> {
        self.shared
            .state
            .compare_exchange(
                WorkerState::Configured as u8,
                WorkerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|actual| HostError::InvalidState {
                expected: "configured",
                actual: WorkerState::from_u8(actual).as_str(),
            })?;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("audio-worker".to_string())
            .spawn(move || shared.run());

        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(WorkerState::Configured);
                Err(e.into())
            }
        }
    }

    fn session(&self) -> Result<&Session> {
        if self.state() == WorkerState::Terminated {
            return Err(self.invalid_state("configured"));
        }
        self.shared
            .session
            .get()
            .ok_or_else(|| self.invalid_state("configured"))
    }

    pub fn chain(&self) -> Option<&ProcessorChain> {
        self.shared.session.get().map(|s| &s.chain)
    }

    /// Load a plugin and append it to the chain. Returns its position.
    pub fn add_plugin(&self, id: &str) -> Result<usize> {
        self.session()?.chain.add_plugin_processor(id)
    }

    pub fn del_plugin(&self, index: usize) -> bool {
        tracing::info!("deleting plugin {}", index);
        self.session()
            .map(|s| s.chain.del_processor(index))
            .unwrap_or(false)
    }

    pub fn exchange_plugins(&self, a: usize, b: usize) -> bool {
        tracing::info!("exchanging plugins {} and {}", a, b);
        self.session()
            .map(|s| s.chain.exchange_processors(a, b))
            .unwrap_or(false)
    }

    pub fn set_bypass(&self, index: usize, bypass: bool) -> bool {
        self.session()
            .map(|s| s.chain.set_bypass(index, bypass))
            .unwrap_or(false)
    }

    /// 0.0 when the slot or parameter does not exist.
    pub fn get_parameter_value(&self, index: usize, param_index: usize) -> f32 {
        self.session()
            .map(|s| s.chain.get_parameter_value(index, param_index))
            .unwrap_or(0.0)
    }

    pub fn num_plugins(&self) -> usize {
        self.chain().map(ProcessorChain::num_processors).unwrap_or(0)
    }

    pub fn latency_samples(&self) -> usize {
        self.chain()
            .map(ProcessorChain::latency_samples)
            .unwrap_or(0)
    }

    pub fn describe_chain(&self) -> String {
        self.chain().map(ProcessorChain::describe).unwrap_or_default()
    }

    /// Parameter changes reported by plugins of this session.
    pub fn parameter_changes(&self) -> Receiver<ParameterChange> {
        self.shared.parameter_rx.clone()
    }

    pub fn recents_list(&self, host: &str) -> Vec<String> {
        self.shared.runtime.recents().list(host)
    }

    /// Record `id` for `host` under its canonical id. Ids that do not resolve are
    /// ignored.
    pub fn add_to_recents(&self, id: &str, host: &str) -> bool {
        match self.shared.runtime.registry().resolve_descriptor(id) {
            Some(descriptor) => {
                self.shared
                    .runtime
                    .recents()
                    .touch(host, &descriptor.plugin_id());
                true
            }
            None => false,
        }
    }

    /// Ask the loop to stop and wait for it. Observed between blocks.
    pub fn shutdown(&self) {
        self.shared.exit.store(true, Ordering::Release);

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        match self.state() {
            WorkerState::Idle => self.shared.set_state(WorkerState::Terminated),
            WorkerState::Configured => {
                if let Some(session) = self.shared.session.get() {
                    session.chain.clear();
                }
                self.shared.set_state(WorkerState::Terminated);
            }
            WorkerState::Running | WorkerState::Terminated => {}
        }
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
