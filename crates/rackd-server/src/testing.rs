//! Mock plugins for unit tests.

use parking_lot::Mutex;
use rackd_plugin::{
    AudioBuffer, BusesLayout, ChannelSet, FactoryRegistry, HostError, LoadStage, MidiEventVec,
    ObserverId, ParameterObserver, ParameterObservers, PlayHead, PluginDescriptor,
    PluginInstance, PluginMetadata, PluginRegistry, Sample, SampleFormat,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared view into what the chain did to a mock instance.
#[derive(Default)]
pub struct MockProbe {
    pub created_on: Mutex<Option<String>>,
    pub dropped_on: Mutex<Option<String>>,
    pub live: AtomicUsize,
    pub prepare_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub processed_samples: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub last_channels: AtomicUsize,
    pub f64_blocks: AtomicUsize,
    pub precision: Mutex<Option<SampleFormat>>,
    pub suspended: AtomicBool,
    pub has_play_head: AtomicBool,
    pub latency: AtomicUsize,
    /// Applied (and reported to observers) by the next processed block
    pub pending_param: Mutex<Option<(usize, f32)>>,
}

#[derive(Clone)]
pub enum LayoutPolicy {
    Any,
    Only(Vec<BusesLayout>),
    Nothing,
}

#[derive(Clone)]
pub struct MockSpec {
    pub name: String,
    pub uid: u32,
    pub tail: f64,
    pub supports_f64: bool,
    pub policy: LayoutPolicy,
    pub default_layout: BusesLayout,
    pub gain: f64,
    pub params: usize,
    pub process_delay: Option<Duration>,
    pub fail_instantiation: bool,
    pub probe: Arc<MockProbe>,
}

impl MockSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: 1,
            tail: 0.0,
            supports_f64: true,
            policy: LayoutPolicy::Any,
            default_layout: BusesLayout {
                inputs: vec![ChannelSet::Stereo],
                outputs: vec![ChannelSet::Stereo],
            },
            gain: 1.0,
            params: 4,
            process_delay: None,
            fail_instantiation: false,
            probe: Arc::new(MockProbe::default()),
        }
    }

    pub fn id(&self) -> String {
        self.descriptor().plugin_id()
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("Mock", self.name.clone(), self.uid)
            .vendor("Test")
            .file(format!("/mock/{}.plugin", self.name))
    }

    pub fn latency(self, samples: usize) -> Self {
        self.probe.latency.store(samples, Ordering::SeqCst);
        self
    }

    pub fn tail(mut self, seconds: f64) -> Self {
        self.tail = seconds;
        self
    }

    pub fn gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn no_f64(mut self) -> Self {
        self.supports_f64 = false;
        self
    }

    pub fn policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn default_layout(mut self, layout: BusesLayout) -> Self {
        self.default_layout = layout;
        self
    }

    pub fn process_delay(mut self, delay: Duration) -> Self {
        self.process_delay = Some(delay);
        self
    }

    pub fn fail_instantiation(mut self) -> Self {
        self.fail_instantiation = true;
        self
    }
}

pub struct MockPlugin {
    spec: MockSpec,
    metadata: PluginMetadata,
    layout: BusesLayout,
    values: Vec<f32>,
    observers: ParameterObservers,
}

impl MockPlugin {
    pub fn new(spec: MockSpec) -> Self {
        *spec.probe.created_on.lock() = std::thread::current().name().map(str::to_string);
        spec.probe.live.fetch_add(1, Ordering::SeqCst);
        let metadata = PluginMetadata::new(spec.id(), spec.name.clone());
        Self {
            layout: spec.default_layout.clone(),
            values: vec![0.5; spec.params],
            metadata,
            observers: ParameterObservers::new(),
            spec,
        }
    }

    fn run<T: Sample>(&mut self, buffer: &mut AudioBuffer<T>) {
        let probe = Arc::clone(&self.spec.probe);
        if let Some(delay) = self.spec.process_delay {
            std::thread::sleep(delay);
        }
        if let Some((index, value)) = probe.pending_param.lock().take() {
            self.set_parameter(index, value);
        }
        for ch in buffer.channels_mut() {
            for s in ch.iter_mut() {
                *s = T::from_f64(s.to_f64() * self.spec.gain);
            }
        }
        probe.process_calls.fetch_add(1, Ordering::SeqCst);
        probe
            .processed_samples
            .fetch_add(buffer.num_samples(), Ordering::SeqCst);
        probe
            .last_channels
            .store(buffer.num_channels(), Ordering::SeqCst);
    }
}

impl Drop for MockPlugin {
    fn drop(&mut self) {
        *self.spec.probe.dropped_on.lock() = std::thread::current().name().map(str::to_string);
        self.spec.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PluginInstance for MockPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn supports_f64(&self) -> bool {
        self.spec.supports_f64
    }

    fn check_buses_layout_supported(&self, layout: &BusesLayout) -> bool {
        match &self.spec.policy {
            LayoutPolicy::Any => true,
            LayoutPolicy::Only(layouts) => layouts.contains(layout),
            LayoutPolicy::Nothing => false,
        }
    }

    fn set_buses_layout(&mut self, layout: &BusesLayout) -> bool {
        if self.check_buses_layout_supported(layout) {
            self.layout = layout.clone();
            true
        } else {
            false
        }
    }

    fn buses_layout(&self) -> BusesLayout {
        self.layout.clone()
    }

    fn set_processing_precision(&mut self, format: SampleFormat) {
        *self.spec.probe.precision.lock() = Some(format);
    }

    fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {
        self.spec.probe.prepare_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn release_resources(&mut self) {
        self.spec.probe.release_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_suspended(&mut self, suspended: bool) {
        self.spec.probe.suspended.store(suspended, Ordering::SeqCst);
    }

    fn latency_samples(&self) -> usize {
        self.spec.probe.latency.load(Ordering::SeqCst)
    }

    fn tail_seconds(&self) -> f64 {
        self.spec.tail
    }

    fn set_play_head(&mut self, play_head: Option<PlayHead>) {
        self.spec
            .probe
            .has_play_head
            .store(play_head.is_some(), Ordering::SeqCst);
    }

    fn process_f32(&mut self, buffer: &mut AudioBuffer<f32>, _midi: &mut MidiEventVec) {
        self.run(buffer);
    }

    fn process_f64(&mut self, buffer: &mut AudioBuffer<f64>, _midi: &mut MidiEventVec) {
        self.spec.probe.f64_blocks.fetch_add(1, Ordering::SeqCst);
        self.run(buffer);
    }

    fn parameter_count(&self) -> usize {
        self.values.len()
    }

    fn parameter(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if let Some(v) = self.values.get_mut(index) {
            *v = value;
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

pub fn mock_registry(specs: Vec<MockSpec>) -> Arc<dyn PluginRegistry> {
    let registry = FactoryRegistry::new();
    for spec in specs {
        let descriptor = spec.descriptor();
        registry.register(descriptor, move |desc, _rate, _block| {
            if spec.fail_instantiation {
                return Err(HostError::load_failed(
                    desc.plugin_id(),
                    LoadStage::Instantiation,
                    "mock refused to load",
                ));
            }
            Ok(Box::new(MockPlugin::new(spec.clone())))
        });
    }
    Arc::new(registry)
}
