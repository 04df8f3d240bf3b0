//! Plugin instance trait and parameter observation.
//!
//! This module defines the interface every hosted processing unit exposes to the
//! chain, independent of the native plugin format behind it.

use crate::buffer::AudioBuffer;
use crate::layout::BusesLayout;
use crate::metadata::PluginMetadata;
use crate::protocol::{MidiEventVec, PlayHead, SampleFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Instance handle shared between its slot and deferred teardown.
pub type SharedInstance = Arc<Mutex<Box<dyn PluginInstance>>>;

/// A parameter value change reported by a hosted plugin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    /// Chain position of the reporting slot at the time of the change
    pub slot: usize,
    pub param_index: usize,
    pub value: f32,
}

/// Receiver of parameter change notifications. May be called from any thread,
/// including the audio thread, so implementations must not block.
pub trait ParameterObserver: Send + Sync {
    fn parameter_changed(&self, param_index: usize, value: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Observer bookkeeping for [`PluginInstance`] implementations.
#[derive(Default)]
pub struct ParameterObservers {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Arc<dyn ParameterObserver>)>>,
}

impl ParameterObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn ParameterObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn notify(&self, param_index: usize, value: f32) {
        for (_, observer) in self.observers.lock().iter() {
            observer.parameter_changed(param_index, value);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unified interface for hosted processing units.
///
/// Processing is in place: the buffer holds the inputs on entry and the outputs on
/// return. Channel `i` of the buffer maps to the `i`-th channel of the negotiated
/// layout, input buses first.
pub trait PluginInstance: Send {
    fn metadata(&self) -> &PluginMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn supports_f64(&self) -> bool;

    fn check_buses_layout_supported(&self, layout: &BusesLayout) -> bool;

    /// Returns false if the layout was rejected. The current layout is kept then.
    fn set_buses_layout(&mut self, layout: &BusesLayout) -> bool;

    /// Layout currently in use; the plugin's default until one is accepted.
    fn buses_layout(&self) -> BusesLayout;

    fn enable_all_buses(&mut self) {}

    fn set_processing_precision(&mut self, format: SampleFormat);

    fn prepare(&mut self, sample_rate: f64, max_block_size: usize);

    fn release_resources(&mut self);

    fn set_suspended(&mut self, suspended: bool);

    fn latency_samples(&self) -> usize;

    fn tail_seconds(&self) -> f64;

    fn set_play_head(&mut self, play_head: Option<PlayHead>);

    fn process_f32(&mut self, buffer: &mut AudioBuffer<f32>, midi: &mut MidiEventVec);

    fn process_f64(&mut self, buffer: &mut AudioBuffer<f64>, midi: &mut MidiEventVec);

    fn parameter_count(&self) -> usize;

    /// Normalized 0..1, `None` for unknown indices.
    fn parameter(&self, index: usize) -> Option<f32>;

    /// Normalized 0..1.
    fn set_parameter(&mut self, index: usize, value: f32);

    fn add_parameter_observer(&mut self, observer: Arc<dyn ParameterObserver>) -> ObserverId;

    fn remove_parameter_observer(&mut self, id: ObserverId);
}
