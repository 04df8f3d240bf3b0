//! Ordered chain of plugin slots.
//!
//! The chain owns its slots and the state derived from them (aggregate latency and
//! tail, precision capability, extra channels, side-chain state). Derived state is
//! recomputed after every structural change before the next block is processed.
//!
//! Lock order: processors, then topology, then an individual instance.

use crate::runtime::HostRuntime;
use crate::slot::{PluginSlot, SlotIo};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rackd_plugin::{
    AudioBuffer, BusesLayout, ChannelTopology, HostError, LoadStage, MidiEventVec,
    ParameterChange, PlayHead, PluginInstance, Result, Sample, SampleFormat,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct ChainTopology {
    channels: ChannelTopology,
    layout: BusesLayout,
    sidechain_disabled: bool,
}

impl ChainTopology {
    fn new(channels: ChannelTopology) -> Self {
        Self {
            layout: BusesLayout::standard(&channels),
            channels,
            sidechain_disabled: false,
        }
    }
}

pub struct ProcessorChain {
    runtime: Arc<HostRuntime>,
    processors: Mutex<Vec<PluginSlot>>,
    topology: Mutex<ChainTopology>,
    extra_channels: AtomicUsize,
    latency: AtomicUsize,
    tail_bits: AtomicU64,
    supports_f64: AtomicBool,
    prefer_f64: bool,
    sample_rate_bits: AtomicU64,
    block_size: AtomicUsize,
    play_head: Mutex<Option<PlayHead>>,
    parameter_sender: Option<Sender<ParameterChange>>,
}

impl ProcessorChain {
    pub fn new(
        runtime: Arc<HostRuntime>,
        channels: ChannelTopology,
        sample_rate: f64,
        block_size: usize,
        prefer_f64: bool,
    ) -> Self {
        Self {
            runtime,
            processors: Mutex::new(Vec::new()),
            topology: Mutex::new(ChainTopology::new(channels)),
            extra_channels: AtomicUsize::new(0),
            latency: AtomicUsize::new(0),
            tail_bits: AtomicU64::new(0f64.to_bits()),
            supports_f64: AtomicBool::new(true),
            prefer_f64,
            sample_rate_bits: AtomicU64::new(sample_rate.to_bits()),
            block_size: AtomicUsize::new(block_size),
            play_head: Mutex::new(None),
            parameter_sender: None,
        }
    }

    /// Parameter changes of every slot loaded from now on go to `sender`.
    pub fn with_parameter_sender(mut self, sender: Sender<ParameterChange>) -> Self {
        self.parameter_sender = Some(sender);
        self
    }

    pub(crate) fn parameter_sender(&self) -> Option<Sender<ParameterChange>> {
        self.parameter_sender.clone()
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate_bits.load(Ordering::Acquire))
    }

    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Acquire)
    }

    pub fn topology(&self) -> ChannelTopology {
        self.topology.lock().channels
    }

    pub fn buses_layout(&self) -> BusesLayout {
        self.topology.lock().layout.clone()
    }

    pub fn is_sidechain_disabled(&self) -> bool {
        self.topology.lock().sidechain_disabled
    }

    /// Channels some slot needs beyond the declared topology.
    pub fn extra_channels(&self) -> usize {
        self.extra_channels.load(Ordering::Acquire)
    }

    pub fn latency_samples(&self) -> usize {
        self.latency.load(Ordering::Acquire)
    }

    pub fn tail_seconds(&self) -> f64 {
        f64::from_bits(self.tail_bits.load(Ordering::Acquire))
    }

    /// True when every loaded slot can process 64-bit audio.
    pub fn supports_double_precision(&self) -> bool {
        self.supports_f64.load(Ordering::Acquire)
    }

    /// 64-bit is preferred by the session and supported by every slot.
    pub fn is_using_double_precision(&self) -> bool {
        self.prefer_f64 && self.supports_double_precision()
    }

    pub fn num_processors(&self) -> usize {
        self.processors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.lock().is_empty()
    }

    fn slot_io(&self) -> SlotIo {
        let topology = self.topology.lock();
        SlotIo {
            main_inputs: topology.channels.inputs,
            sidechain: topology.channels.sidechain,
            outputs: topology.channels.outputs,
        }
    }

    /// Load `id` into a new slot and append it. The slot list is only locked once
    /// the plugin is ready; on failure the chain is unchanged.
    pub fn add_plugin_processor(&self, id: &str) -> Result<usize> {
        let mut slot = PluginSlot::new(id, Arc::clone(&self.runtime));
        slot.load(self)?;

        let mut processors = self.processors.lock();
        let index = processors.len();
        slot.set_index(index);
        processors.push(slot);
        self.update_no_lock(&mut processors);
        tracing::info!("added {} at position {}", id, index);
        Ok(index)
    }

    /// Out of range indices are ignored.
    pub fn del_processor(&self, index: usize) -> bool {
        let removed = {
            let mut processors = self.processors.lock();
            if index >= processors.len() {
                return false;
            }
            let slot = processors.remove(index);
            for (i, s) in processors.iter().enumerate().skip(index) {
                s.set_index(i);
            }
            self.update_no_lock(&mut processors);
            slot
        };
        tracing::info!("removed {} from position {}", removed.id(), index);
        true
    }

    pub fn exchange_processors(&self, a: usize, b: usize) -> bool {
        let mut processors = self.processors.lock();
        if a >= processors.len() || b >= processors.len() {
            return false;
        }
        processors.swap(a, b);
        processors[a].set_index(a);
        processors[b].set_index(b);
        self.update_no_lock(&mut processors);
        true
    }

    /// Suspend or resume a slot. Returns false for unknown indices.
    pub fn set_bypass(&self, index: usize, bypass: bool) -> bool {
        let mut processors = self.processors.lock();
        let (sample_rate, block_size) = (self.sample_rate(), self.block_size());
        let Some(slot) = processors.get_mut(index) else {
            return false;
        };
        slot.suspend_processing(bypass, sample_rate, block_size);
        tracing::info!(
            "{} {}",
            if bypass { "bypassed" } else { "resumed" },
            slot.name()
        );
        self.update_no_lock(&mut processors);
        true
    }

    pub fn is_bypassed(&self, index: usize) -> Option<bool> {
        self.processors.lock().get(index).map(PluginSlot::is_suspended)
    }

    /// 0.0 for unknown slots or parameters.
    pub fn get_parameter_value(&self, index: usize, param_index: usize) -> f32 {
        self.processors
            .lock()
            .get(index)
            .and_then(|slot| slot.parameter_value(param_index))
            .unwrap_or(0.0)
    }

    pub fn update(&self) {
        let mut processors = self.processors.lock();
        self.update_no_lock(&mut processors);
    }

    fn update_no_lock(&self, processors: &mut [PluginSlot]) {
        let has_sidechain = self.topology.lock().channels.has_sidechain();

        let mut latency = 0;
        let mut supports_double = true;
        let mut extra_channels = 0;
        let mut sidechain_disabled = false;
        for slot in processors.iter().filter(|s| s.is_loaded()) {
            latency += slot.latency_samples();
            supports_double &= slot.supports_f64();
            extra_channels = extra_channels
                .max(slot.extra_in_channels())
                .max(slot.extra_out_channels());
            sidechain_disabled =
                has_sidechain && (sidechain_disabled || slot.needs_disabled_sidechain());
        }

        self.extra_channels.store(extra_channels, Ordering::Release);
        self.topology.lock().sidechain_disabled = sidechain_disabled;

        if self.latency.swap(latency, Ordering::AcqRel) != latency {
            tracing::info!("updating latency samples to {}", latency);
        }

        let previous = self.supports_f64.swap(supports_double, Ordering::AcqRel);
        if previous != supports_double && self.prefer_f64 {
            tracing::info!(
                "chain {} double precision",
                if supports_double { "now supports" } else { "no longer supports" }
            );
            let (sample_rate, block_size) = (self.sample_rate(), self.block_size());
            for slot in processors.iter_mut() {
                slot.apply_precision(supports_double, sample_rate, block_size);
            }
        }

        let tail = processors
            .iter()
            .rev()
            .find(|s| !s.is_suspended())
            .map(PluginSlot::tail_seconds)
            .unwrap_or(0.0);
        self.tail_bits.store(tail.to_bits(), Ordering::Release);
    }

    /// Negotiate a bus layout for `slot`: the standard layout, then a mono
    /// side-chain, then no side-chain, then the plugin's own layout with extra
    /// channels. Fails only for plugins without any channels.
    pub(crate) fn set_processor_buses_layout(&self, slot: &mut PluginSlot) -> bool {
        let Some(plugin) = slot.instance().cloned() else {
            return false;
        };
        slot.set_extra_channels(0, 0);
        slot.set_needs_disabled_sidechain(false);

        let mut topology = self.topology.lock();
        let mut layout = topology.layout.clone();
        let chain_has_sidechain = topology.channels.has_sidechain();

        if chain_has_sidechain && topology.sidechain_disabled {
            tracing::debug!("the side-chain has been disabled, removing it from the standard layout");
            layout = layout.without_sidechain();
        }
        let has_sidechain = chain_has_sidechain && !topology.sidechain_disabled;

        let mut inst = plugin.lock();
        let mut supported = try_layout(&mut **inst, &layout);

        if !supported {
            tracing::debug!("standard layout not supported by {}", slot.id());

            if has_sidechain {
                if layout.sidechain().map(|sc| sc.size()).unwrap_or(0) > 1 {
                    tracing::debug!("trying with mono side-chain bus");
                    layout = layout.with_mono_sidechain();
                    supported = try_layout(&mut **inst, &layout);
                }
                if !supported {
                    tracing::debug!("trying without side-chain bus");
                    layout = layout.without_sidechain();
                    supported = try_layout(&mut **inst, &layout);
                    if supported {
                        slot.set_needs_disabled_sidechain(true);
                        topology.sidechain_disabled = true;
                    }
                }
            }

            if !supported {
                tracing::debug!("falling back to the default layout of {}", slot.id());
                let own = inst.buses_layout();
                if own.total_input_channels() == 0 && own.total_output_channels() == 0 {
                    tracing::warn!("no working I/O layout found for {}", slot.id());
                    slot.set_needs_disabled_sidechain(false);
                    return false;
                }

                if has_sidechain {
                    tracing::debug!("disabling side-chain input to use the plugin's layout");
                    topology.sidechain_disabled = true;
                }
                slot.set_needs_disabled_sidechain(true);

                let extra_in = own
                    .main_input_channels()
                    .saturating_sub(layout.main_input_channels())
                    + own.aux_input_channels();
                let extra_out = own
                    .main_output_channels()
                    .saturating_sub(layout.main_output_channels())
                    + own.aux_output_channels();
                slot.set_extra_channels(extra_in, extra_out);

                let previous = self
                    .extra_channels
                    .fetch_max(extra_in.max(extra_out), Ordering::AcqRel);
                tracing::info!(
                    "{} extra input(s), {} extra output(s) -> {} extra channel(s) in total",
                    extra_in,
                    extra_out,
                    previous.max(extra_in).max(extra_out)
                );

                layout = own;
                supported = true;
            }
        }

        if supported {
            tracing::info!("using I/O layout {} for {}", layout, slot.id());
        }
        supported
    }

    /// Negotiate, set precision, prepare and warm up a freshly created instance.
    pub(crate) fn init_plugin_instance(&self, slot: &mut PluginSlot) -> Result<()> {
        if !self.set_processor_buses_layout(slot) {
            return Err(HostError::load_failed(
                slot.id(),
                LoadStage::Negotiation,
                "failed to find working I/O configuration",
            ));
        }
        let Some(plugin) = slot.instance().cloned() else {
            return Err(HostError::load_failed(
                slot.id(),
                LoadStage::Preparation,
                "instance is gone",
            ));
        };

        let (sample_rate, block_size) = (self.sample_rate(), self.block_size());
        let channels = self.topology().processing_channels() + self.extra_channels();
        let samples = self.runtime.config().warmup_samples;
        let play_head = self.play_head.lock().clone();

        let mut inst = plugin.lock();
        let mut precision = SampleFormat::Float32;
        if self.is_using_double_precision() {
            if inst.supports_f64() {
                precision = SampleFormat::Float64;
            } else {
                tracing::warn!(
                    "host wants double precision but {} does not support it",
                    inst.name()
                );
            }
        }
        inst.set_processing_precision(precision);
        slot.set_precision(precision);

        inst.prepare(sample_rate, block_size);
        inst.set_play_head(play_head);
        inst.enable_all_buses();

        match precision {
            SampleFormat::Float64 => warm_up::<f64>(&mut **inst, channels, block_size, samples),
            SampleFormat::Float32 => warm_up::<f32>(&mut **inst, channels, block_size, samples),
        }
        Ok(())
    }

    /// Rebuild the standard layout for new channel counts and renegotiate every slot.
    pub fn update_channels(&self, inputs: usize, outputs: usize, sidechain: usize) -> Result<()> {
        let channels = ChannelTopology::new(inputs, outputs, sidechain);
        channels.validate()?;

        let topology = ChainTopology::new(channels);
        tracing::info!("setting chain layout {}", topology.layout);
        *self.topology.lock() = topology;
        self.extra_channels.store(0, Ordering::Release);

        let (sample_rate, block_size) = (self.sample_rate(), self.block_size());
        let mut processors = self.processors.lock();
        for slot in processors.iter_mut() {
            let was_prepared = slot.is_prepared();
            slot.release_resources();
            if !self.set_processor_buses_layout(slot) {
                tracing::warn!("no working I/O layout for {} after channel change", slot.name());
            }
            slot.refresh_latency_buffers(outputs);
            if was_prepared {
                slot.prepare(sample_rate, block_size);
            }
        }
        self.update_no_lock(&mut processors);
        Ok(())
    }

    pub fn prepare(&self, sample_rate: f64, block_size: usize) {
        self.sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::Release);
        self.block_size.store(block_size, Ordering::Release);
        for slot in self.processors.lock().iter_mut() {
            if !slot.is_suspended() {
                slot.prepare(sample_rate, block_size);
            }
        }
    }

    pub fn release_resources(&self) {
        for slot in self.processors.lock().iter_mut() {
            slot.release_resources();
        }
    }

    /// Release and drop every slot.
    pub fn clear(&self) {
        self.release_resources();
        let slots = {
            let mut processors = self.processors.lock();
            let slots = std::mem::take(&mut *processors);
            self.update_no_lock(&mut processors);
            slots
        };
        drop(slots);
    }

    pub fn set_play_head(&self, play_head: Option<PlayHead>) {
        *self.play_head.lock() = play_head.clone();
        for slot in self.processors.lock().iter() {
            slot.set_play_head(play_head.clone());
        }
    }

    /// Run every slot in order over `buffer`. Slow blocks are logged.
    pub fn process_block<T: Sample>(&self, buffer: &mut AudioBuffer<T>, midi: &mut MidiEventVec) {
        let start = Instant::now();
        {
            let io = self.slot_io();
            let mut processors = self.processors.lock();
            let mut latency_changed = false;
            for slot in processors.iter_mut() {
                latency_changed |= slot.process_block(buffer, midi, io);
            }
            if latency_changed {
                self.update_no_lock(&mut processors);
            }
        }

        let elapsed = start.elapsed();
        let threshold = Duration::from_millis(self.runtime.config().slow_block_threshold_ms);
        if elapsed > threshold {
            tracing::warn!(
                "chain ({}): high audio processing time: {:.4}s",
                self.describe(),
                elapsed.as_secs_f64()
            );
        }
    }

    /// Slot names in order, suspended slots shown as `<bypassed>`.
    pub fn describe(&self) -> String {
        self.processors
            .lock()
            .iter()
            .map(|slot| {
                if slot.is_suspended() {
                    "<bypassed>"
                } else {
                    slot.name()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

fn try_layout(instance: &mut dyn PluginInstance, layout: &BusesLayout) -> bool {
    instance.check_buses_layout_supported(layout) && instance.set_buses_layout(layout)
}

fn warm_up<T: Sample>(
    instance: &mut dyn PluginInstance,
    channels: usize,
    block_size: usize,
    samples: usize,
) {
    if block_size == 0 || channels == 0 {
        return;
    }
    let mut buffer = AudioBuffer::<T>::new(channels, block_size);
    let mut midi = MidiEventVec::new();
    let mut processed = 0;
    while processed < samples {
        buffer.clear();
        midi.clear();
        T::process(instance, &mut buffer, &mut midi);
        processed += block_size;
    }
}
