//! Test helpers and fixtures for rackd integration tests
//!
//! [`TestPlugin`] is a gain stage with an optional real delay line, so the latency a
//! session reports can be checked against where an impulse actually lands.

pub mod tolerances;

use parking_lot::Mutex;
use rackd::plugin::{ObserverId, ParameterObserver, ParameterObservers, PlayHead};
use rackd::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

pub const TEST_SAMPLE_RATE: f64 = 48000.0;

pub const TEST_BLOCK_SIZE: usize = 64;

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Route logs to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// What the server did to a [`TestPlugin`], readable from the test.
#[derive(Default)]
pub struct PluginStats {
    pub live: AtomicUsize,
    pub blocks: AtomicUsize,
    pub f64_blocks: AtomicUsize,
    pub last_channels: AtomicUsize,
    pub midi_events: AtomicUsize,
    pub last_position: Mutex<Option<i64>>,
}

#[derive(Clone)]
pub struct TestPluginSpec {
    pub name: String,
    pub gain: f64,
    pub delay: usize,
    pub supports_f64: bool,
    /// `None` accepts every layout.
    pub accepted: Option<Vec<BusesLayout>>,
    pub default_layout: BusesLayout,
    pub stats: Arc<PluginStats>,
}

impl TestPluginSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            gain: 1.0,
            delay: 0,
            supports_f64: true,
            accepted: None,
            default_layout: BusesLayout {
                inputs: vec![ChannelSet::Stereo],
                outputs: vec![ChannelSet::Stereo],
            },
            stats: Arc::new(PluginStats::default()),
        }
    }

    pub fn gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn delay(mut self, samples: usize) -> Self {
        self.delay = samples;
        self
    }

    pub fn single_precision(mut self) -> Self {
        self.supports_f64 = false;
        self
    }

    /// Reject every layout the host proposes and keep `layout`.
    pub fn fixed_layout(mut self, layout: BusesLayout) -> Self {
        self.accepted = Some(Vec::new());
        self.default_layout = layout;
        self
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("VST3", self.name.clone(), 0x2a)
            .vendor("rackd tests")
            .file(format!("/plugins/{}.vst3", self.name))
    }

    pub fn id(&self) -> String {
        self.descriptor().plugin_id()
    }
}

pub struct TestPlugin {
    spec: TestPluginSpec,
    metadata: PluginMetadata,
    layout: BusesLayout,
    delay_lines: Vec<VecDeque<f64>>,
    play_head: Option<PlayHead>,
    params: Vec<f32>,
    observers: ParameterObservers,
}

impl TestPlugin {
    pub fn new(spec: TestPluginSpec) -> Self {
        spec.stats.live.fetch_add(1, Ordering::SeqCst);
        let metadata = PluginMetadata::new(spec.id(), spec.name.clone());
        Self {
            layout: spec.default_layout.clone(),
            metadata,
            delay_lines: Vec::new(),
            play_head: None,
            params: vec![0.5; 2],
            observers: ParameterObservers::new(),
            spec,
        }
    }

    fn run<T: Sample>(&mut self, buffer: &mut AudioBuffer<T>, midi: &MidiEventVec) {
        let stats = &self.spec.stats;
        stats.blocks.fetch_add(1, Ordering::SeqCst);
        stats.last_channels.store(buffer.num_channels(), Ordering::SeqCst);
        stats.midi_events.fetch_add(midi.len(), Ordering::SeqCst);
        if let Some(play_head) = &self.play_head {
            *stats.last_position.lock() = Some(play_head.position().position_samples);
        }

        let delay = self.spec.delay;
        if self.delay_lines.len() < buffer.num_channels() {
            self.delay_lines
                .resize_with(buffer.num_channels(), || VecDeque::from(vec![0.0; delay]));
        }
        for (ch, line) in buffer.channels_mut().zip(self.delay_lines.iter_mut()) {
            for s in ch.iter_mut() {
                line.push_back(s.to_f64() * self.spec.gain);
                *s = T::from_f64(line.pop_front().unwrap_or(0.0));
            }
        }
    }
}

impl Drop for TestPlugin {
    fn drop(&mut self) {
        self.spec.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PluginInstance for TestPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn supports_f64(&self) -> bool {
        self.spec.supports_f64
    }

    fn check_buses_layout_supported(&self, layout: &BusesLayout) -> bool {
        match &self.spec.accepted {
            None => true,
            Some(accepted) => accepted.contains(layout),
        }
    }

    fn set_buses_layout(&mut self, layout: &BusesLayout) -> bool {
        if !self.check_buses_layout_supported(layout) {
            return false;
        }
        self.layout = layout.clone();
        true
    }

    fn buses_layout(&self) -> BusesLayout {
        self.layout.clone()
    }

    fn set_processing_precision(&mut self, _format: SampleFormat) {}

    fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {
        self.delay_lines.clear();
    }

    fn release_resources(&mut self) {}

    fn set_suspended(&mut self, _suspended: bool) {}

    fn latency_samples(&self) -> usize {
        self.spec.delay
    }

    fn tail_seconds(&self) -> f64 {
        0.0
    }

    fn set_play_head(&mut self, play_head: Option<PlayHead>) {
        self.play_head = play_head;
    }

    fn process_f32(&mut self, buffer: &mut AudioBuffer<f32>, midi: &mut MidiEventVec) {
        self.run(buffer, midi);
    }

    fn process_f64(&mut self, buffer: &mut AudioBuffer<f64>, midi: &mut MidiEventVec) {
        self.spec.stats.f64_blocks.fetch_add(1, Ordering::SeqCst);
        self.run(buffer, midi);
    }

    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn parameter(&self, index: usize) -> Option<f32> {
        self.params.get(index).copied()
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if let Some(p) = self.params.get_mut(index) {
            *p = value;
            self.observers.notify(index, value);
        }
    }

    fn add_parameter_observer(&mut self, observer: Arc<dyn ParameterObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    fn remove_parameter_observer(&mut self, id: ObserverId) {
        self.observers.remove(id);
    }
}

pub fn test_registry(specs: &[TestPluginSpec]) -> Arc<dyn PluginRegistry> {
    let registry = FactoryRegistry::new();
    for spec in specs {
        let spec = spec.clone();
        registry.register(spec.descriptor(), move |_desc, _rate, _block| {
            Ok(Box::new(TestPlugin::new(spec.clone())))
        });
    }
    Arc::new(registry)
}

/// Server with a short poll interval and warm-up so tests stay fast.
pub fn test_server(specs: &[TestPluginSpec]) -> RackServer {
    init_logging();
    RackServer::builder()
        .registry(test_registry(specs))
        .poll_interval_ms(5)
        .warmup_samples(TEST_BLOCK_SIZE)
        .build()
        .expect("Failed to create test server")
}

pub fn stereo_session() -> SessionConfig {
    SessionConfig::new(ChannelTopology::stereo(), TEST_SAMPLE_RATE, TEST_BLOCK_SIZE)
}

/// Open and start a session over a loopback transport, loading `ids` in order.
pub fn start_session(
    server: &RackServer,
    config: SessionConfig,
    ids: &[String],
) -> (StreamingWorker, rackd::LoopbackClient) {
    let (transport, client) = loopback(4);
    let worker = server
        .open_session(Box::new(transport), config)
        .expect("Failed to open session");
    for id in ids {
        worker.add_plugin(id).expect("Failed to load plugin");
    }
    worker.start().expect("Failed to start worker");
    (worker, client)
}

pub fn impulse(channels: usize, samples: usize) -> AudioBuffer32 {
    let mut buffer = AudioBuffer32::new(channels, samples);
    for ch in 0..channels {
        buffer.channel_mut(ch)[0] = 1.0;
    }
    buffer
}

pub fn constant(channels: usize, samples: usize, value: f32) -> AudioBuffer32 {
    AudioBuffer32::from_channels(vec![vec![value; samples]; channels])
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
