//! Multi-channel sample buffers shared by the chain, the slots and the plugins.
//!
//! Buffers keep their allocation across `set_size` calls so the streaming loop can
//! reuse one scratch buffer for the whole session.

use crate::instance::PluginInstance;
use crate::protocol::{MidiEventVec, SampleFormat};

/// Sample type a chain can run at. Implemented for `f32` and `f64`.
pub trait Sample: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    const FORMAT: SampleFormat;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;

    /// Dispatch to the instance entry point matching this precision.
    fn process(
        instance: &mut dyn PluginInstance,
        buffer: &mut AudioBuffer<Self>,
        midi: &mut MidiEventVec,
    );
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::Float32;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn process(
        instance: &mut dyn PluginInstance,
        buffer: &mut AudioBuffer<Self>,
        midi: &mut MidiEventVec,
    ) {
        instance.process_f32(buffer, midi);
    }
}

impl Sample for f64 {
    const FORMAT: SampleFormat = SampleFormat::Float64;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    fn process(
        instance: &mut dyn PluginInstance,
        buffer: &mut AudioBuffer<Self>,
        midi: &mut MidiEventVec,
    ) {
        instance.process_f64(buffer, midi);
    }
}

/// Non-interleaved audio buffer. Channel storage beyond `num_channels` is kept
/// around so shrinking and regrowing does not reallocate.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer<T> {
    storage: Vec<Vec<T>>,
    num_channels: usize,
    num_samples: usize,
}

pub type AudioBuffer32 = AudioBuffer<f32>;
pub type AudioBuffer64 = AudioBuffer<f64>;

impl<T: Sample> AudioBuffer<T> {
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            storage: (0..num_channels)
                .map(|_| vec![T::default(); num_samples])
                .collect(),
            num_channels,
            num_samples,
        }
    }

    /// Channels shorter than the longest one are padded with silence.
    pub fn from_channels(channels: Vec<Vec<T>>) -> Self {
        let num_samples = channels.iter().map(Vec::len).max().unwrap_or(0);
        let num_channels = channels.len();
        let mut storage = channels;
        for ch in &mut storage {
            ch.resize(num_samples, T::default());
        }
        Self {
            storage,
            num_channels,
            num_samples,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Resize the buffer. Existing samples are kept, new space is silent.
    pub fn set_size(&mut self, num_channels: usize, num_samples: usize) {
        while self.storage.len() < num_channels {
            self.storage.push(Vec::with_capacity(num_samples));
        }
        for (i, ch) in self.storage.iter_mut().take(num_channels).enumerate() {
            if i >= self.num_channels {
                ch.clear();
            }
            ch.resize(num_samples, T::default());
        }
        self.num_channels = num_channels;
        self.num_samples = num_samples;
    }

    pub fn clear(&mut self) {
        for ch in self.storage.iter_mut().take(self.num_channels) {
            ch.fill(T::default());
        }
    }

    /// Out-of-range channels are ignored.
    pub fn clear_channel(&mut self, channel: usize) {
        if channel < self.num_channels {
            self.storage[channel].fill(T::default());
        }
    }

    pub fn clear_channels(&mut self, range: std::ops::Range<usize>) {
        for ch in range {
            self.clear_channel(ch);
        }
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[T] {
        &self.storage[..self.num_channels][channel]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.storage[..self.num_channels][channel]
    }

    pub fn get(&self, channel: usize) -> Option<&[T]> {
        self.storage[..self.num_channels]
            .get(channel)
            .map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, channel: usize) -> Option<&mut [T]> {
        self.storage[..self.num_channels]
            .get_mut(channel)
            .map(Vec::as_mut_slice)
    }

    pub fn channels(&self) -> impl Iterator<Item = &[T]> {
        self.storage[..self.num_channels].iter().map(Vec::as_slice)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        self.storage[..self.num_channels]
            .iter_mut()
            .map(Vec::as_mut_slice)
    }

    /// Copy one channel of `src` into `dst_channel`. Copies the overlapping sample
    /// range only; returns false if either channel does not exist.
    pub fn copy_channel_from(
        &mut self,
        dst_channel: usize,
        src: &AudioBuffer<T>,
        src_channel: usize,
    ) -> bool {
        let Some(src_data) = src.get(src_channel) else {
            return false;
        };
        let Some(dst_data) = self.get_mut(dst_channel) else {
            return false;
        };
        let n = src_data.len().min(dst_data.len());
        dst_data[..n].copy_from_slice(&src_data[..n]);
        true
    }

    /// Resize to match `other` and copy its content, converting the sample type.
    pub fn make_copy_of<U: Sample>(&mut self, other: &AudioBuffer<U>) {
        self.set_size(other.num_channels(), other.num_samples());
        for (dst, src) in self.channels_mut().zip(other.channels()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = T::from_f64(s.to_f64());
            }
        }
    }

    pub fn is_silent(&self) -> bool {
        self.channels()
            .all(|ch| ch.iter().all(|s| *s == T::default()))
    }
}

impl<T: Sample> PartialEq for AudioBuffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.num_samples == other.num_samples
            && self.num_channels == other.num_channels
            && self.channels().zip(other.channels()).all(|(a, b)| a == b)
    }
}
