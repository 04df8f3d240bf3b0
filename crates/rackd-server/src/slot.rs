//! A single hosted plugin inside a processor chain.

use crate::chain::ProcessorChain;
use crate::runtime::HostRuntime;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rackd_plugin::{
    AudioBuffer, MidiEventVec, ObserverId, ParameterChange, ParameterObserver, PlayHead, Result,
    Sample, SampleFormat, SharedInstance,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Chain channel counts a slot works against while processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SlotIo {
    pub main_inputs: usize,
    pub sidechain: usize,
    pub outputs: usize,
}

impl SlotIo {
    pub fn total_inputs(&self) -> usize {
        self.main_inputs + self.sidechain
    }
}

/// Forwards parameter notifications of one slot into the session queue.
struct ParameterForwarder {
    slot: Arc<AtomicUsize>,
    sender: Sender<ParameterChange>,
}

impl ParameterObserver for ParameterForwarder {
    fn parameter_changed(&self, param_index: usize, value: f32) {
        let change = ParameterChange {
            slot: self.slot.load(Ordering::Relaxed),
            param_index,
            value,
        };
        // Dropped when the queue is full
        let _ = self.sender.try_send(change);
    }
}

/// Owns one loaded plugin instance.
///
/// Slots are created unloaded and only enter a chain once [`PluginSlot::load`]
/// succeeded. The instance is released on [`PluginSlot::unload`] or drop; the last
/// reference is destroyed on the control thread.
pub struct PluginSlot {
    id: String,
    name: String,
    index: Arc<AtomicUsize>,
    runtime: Arc<HostRuntime>,
    plugin: Option<SharedInstance>,
    observer: Option<ObserverId>,
    precision: SampleFormat,
    suspended: bool,
    prepared: bool,
    extra_in: usize,
    extra_out: usize,
    needs_disabled_sidechain: bool,
    last_known_latency: usize,
    /// One FIFO per output channel, `last_known_latency` samples each
    bypass_buffers: Vec<VecDeque<f64>>,
}

impl PluginSlot {
    pub fn new(id: impl Into<String>, runtime: Arc<HostRuntime>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            index: Arc::new(AtomicUsize::new(0)),
            runtime,
            plugin: None,
            observer: None,
            precision: SampleFormat::Float32,
            suspended: false,
            prepared: false,
            extra_in: 0,
            extra_out: 0,
            needs_disabled_sidechain: false,
            last_known_latency: 0,
            bypass_buffers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Instance name once loaded, the requested id before that.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Relaxed);
    }

    pub fn is_loaded(&self) -> bool {
        self.plugin.is_some()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn precision(&self) -> SampleFormat {
        self.precision
    }

    pub fn extra_in_channels(&self) -> usize {
        self.extra_in
    }

    pub fn extra_out_channels(&self) -> usize {
        self.extra_out
    }

    pub fn needs_disabled_sidechain(&self) -> bool {
        self.needs_disabled_sidechain
    }

    pub fn last_known_latency(&self) -> usize {
        self.last_known_latency
    }

    pub fn bypass_buffer_lengths(&self) -> Vec<usize> {
        self.bypass_buffers.iter().map(VecDeque::len).collect()
    }

    pub(crate) fn instance(&self) -> Option<&SharedInstance> {
        self.plugin.as_ref()
    }

    pub(crate) fn set_extra_channels(&mut self, extra_in: usize, extra_out: usize) {
        self.extra_in = extra_in;
        self.extra_out = extra_out;
    }

    pub(crate) fn set_needs_disabled_sidechain(&mut self, needs: bool) {
        self.needs_disabled_sidechain = needs;
    }

    pub(crate) fn set_precision(&mut self, precision: SampleFormat) {
        self.precision = precision;
    }

    /// Resolve, instantiate and negotiate. Does nothing if already loaded.
    pub fn load(&mut self, chain: &ProcessorChain) -> Result<()> {
        if self.plugin.is_some() {
            return Ok(());
        }

        let runtime = Arc::clone(&self.runtime);
        let _loader = runtime.lock_loader();

        let descriptor = runtime.resolve(&self.id)?;
        let instance =
            runtime.instantiate(&descriptor, chain.sample_rate(), chain.block_size())?;
        let shared: SharedInstance = Arc::new(Mutex::new(instance));
        self.plugin = Some(Arc::clone(&shared));

        if let Err(e) = chain.init_plugin_instance(self) {
            tracing::warn!("failed to initialize {}: {}", self.id, e);
            self.plugin = None;
            self.prepared = false;
            runtime.destroy(shared);
            return Err(e);
        }
        self.prepared = true;

        let (latency, outputs) = {
            let mut inst = shared.lock();
            if let Some(sender) = chain.parameter_sender() {
                let forwarder = ParameterForwarder {
                    slot: Arc::clone(&self.index),
                    sender,
                };
                self.observer = Some(inst.add_parameter_observer(Arc::new(forwarder)));
            }
            self.name = inst.name().to_string();
            (
                inst.latency_samples(),
                inst.buses_layout().total_output_channels(),
            )
        };

        self.last_known_latency = latency;
        self.update_latency_buffers(outputs.max(chain.topology().outputs));

        runtime.plugin_loaded();
        tracing::info!(
            "loaded plugin {} ({} loaded in total)",
            descriptor.plugin_id(),
            runtime.loaded_count()
        );
        Ok(())
    }

    /// Release the instance. Safe to call on an unloaded slot.
    pub fn unload(&mut self) {
        let Some(plugin) = self.plugin.take() else {
            return;
        };

        {
            let mut inst = plugin.lock();
            if self.prepared {
                inst.release_resources();
            }
            if let Some(id) = self.observer.take() {
                inst.remove_parameter_observer(id);
            }
        }
        self.prepared = false;
        self.runtime.plugin_unloaded();
        tracing::info!("unloaded plugin {}", self.id);

        let _loader = self.runtime.lock_loader();
        self.runtime.destroy(plugin);
    }

    /// Suspending releases processing resources right away. Resuming prepares again
    /// with the given settings before the plugin processes.
    pub fn suspend_processing(&mut self, suspend: bool, sample_rate: f64, block_size: usize) {
        self.suspended = suspend;
        if let Some(plugin) = &self.plugin {
            let mut inst = plugin.lock();
            if suspend {
                inst.set_suspended(true);
                if self.prepared {
                    inst.release_resources();
                }
                self.prepared = false;
            } else {
                inst.prepare(sample_rate, block_size);
                self.prepared = true;
                inst.set_suspended(false);
            }
        }
    }

    pub(crate) fn prepare(&mut self, sample_rate: f64, block_size: usize) {
        if let Some(plugin) = &self.plugin {
            plugin.lock().prepare(sample_rate, block_size);
            self.prepared = true;
        }
    }

    pub(crate) fn release_resources(&mut self) {
        if let Some(plugin) = &self.plugin {
            if self.prepared {
                plugin.lock().release_resources();
            }
        }
        self.prepared = false;
    }

    /// Switch precision when it differs from the current one. A prepared instance
    /// is prepared again.
    pub(crate) fn apply_precision(&mut self, use_double: bool, sample_rate: f64, block_size: usize) {
        let Some(plugin) = &self.plugin else {
            return;
        };
        let mut inst = plugin.lock();
        let precision = if use_double && inst.supports_f64() {
            SampleFormat::Float64
        } else {
            SampleFormat::Float32
        };
        if precision == self.precision {
            return;
        }
        tracing::debug!("switching {} to {:?}", self.name, precision);
        inst.set_processing_precision(precision);
        if self.prepared {
            inst.prepare(sample_rate, block_size);
        }
        self.precision = precision;
    }

    pub fn latency_samples(&self) -> usize {
        self.plugin
            .as_ref()
            .map(|p| p.lock().latency_samples())
            .unwrap_or(0)
    }

    pub fn tail_seconds(&self) -> f64 {
        self.plugin
            .as_ref()
            .map(|p| p.lock().tail_seconds())
            .unwrap_or(0.0)
    }

    pub fn supports_f64(&self) -> bool {
        self.plugin
            .as_ref()
            .map(|p| p.lock().supports_f64())
            .unwrap_or(true)
    }

    pub fn parameter_value(&self, param_index: usize) -> Option<f32> {
        self.plugin
            .as_ref()
            .and_then(|p| p.lock().parameter(param_index))
    }

    pub(crate) fn set_play_head(&self, play_head: Option<PlayHead>) {
        if let Some(plugin) = &self.plugin {
            plugin.lock().set_play_head(play_head);
        }
    }

    /// Re-read the output channel count and resize the bypass FIFOs.
    pub(crate) fn refresh_latency_buffers(&mut self, chain_outputs: usize) {
        let outputs = match &self.plugin {
            Some(plugin) => plugin.lock().buses_layout().total_output_channels(),
            None => return,
        };
        self.update_latency_buffers(outputs.max(chain_outputs));
    }

    /// Returns true when the plugin reported a new latency.
    pub(crate) fn process_block<T: Sample>(
        &mut self,
        buffer: &mut AudioBuffer<T>,
        midi: &mut MidiEventVec,
        io: SlotIo,
    ) -> bool {
        if self.suspended {
            self.process_block_bypassed(buffer, io);
            return false;
        }
        let Some(plugin) = self.plugin.clone() else {
            return false;
        };

        if self.needs_disabled_sidechain && io.sidechain > 0 {
            buffer.clear_channels(io.main_inputs..io.total_inputs());
        }

        let latency = {
            let mut inst = plugin.lock();
            T::process(&mut **inst, buffer, midi);
            inst.latency_samples()
        };

        if latency != self.last_known_latency {
            let outputs = plugin.lock().buses_layout().total_output_channels();
            self.last_known_latency = latency;
            self.update_latency_buffers(outputs.max(io.outputs));
            return true;
        }
        false
    }

    /// Delayed passthrough while suspended. Output channels without a matching
    /// input are silenced.
    pub(crate) fn process_block_bypassed<T: Sample>(
        &mut self,
        buffer: &mut AudioBuffer<T>,
        io: SlotIo,
    ) {
        let inputs = io.total_inputs().min(buffer.num_channels());
        let outputs = io.outputs.min(buffer.num_channels());

        buffer.clear_channels(inputs..outputs);

        let latency = self.last_known_latency;
        let undersized = self.bypass_buffers.len() < outputs
            || self
                .bypass_buffers
                .iter()
                .take(outputs)
                .any(|b| b.len() != latency);
        if undersized {
            tracing::warn!(
                "bypass buffer of {} has {} channels, needed {} with {} samples",
                self.name,
                self.bypass_buffers.len(),
                outputs,
                latency
            );
            buffer.clear_channels(0..outputs);
            return;
        }

        for (c, fifo) in self.bypass_buffers.iter_mut().take(outputs).enumerate() {
            for sample in buffer.channel_mut(c) {
                fifo.push_back(sample.to_f64());
                if let Some(delayed) = fifo.pop_front() {
                    *sample = T::from_f64(delayed);
                }
            }
        }
    }

    /// Resize the FIFOs to the last known latency. Shrinking drops the oldest
    /// samples, growing inserts silence in front.
    pub(crate) fn update_latency_buffers(&mut self, channels: usize) {
        let latency = self.last_known_latency;
        tracing::debug!(
            "updating latency buffers of {} for {} samples",
            self.name,
            latency
        );
        while self.bypass_buffers.len() < channels {
            self.bypass_buffers
                .push(std::iter::repeat(0.0).take(latency).collect());
        }
        for fifo in self.bypass_buffers.iter_mut().take(channels) {
            while fifo.len() > latency {
                fifo.pop_front();
            }
            while fifo.len() < latency {
                fifo.push_front(0.0);
            }
        }
    }
}

impl Drop for PluginSlot {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for PluginSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSlot")
            .field("id", &self.id)
            .field("index", &self.index())
            .field("loaded", &self.is_loaded())
            .field("suspended", &self.suspended)
            .field("latency", &self.last_known_latency)
            .finish()
    }
}
