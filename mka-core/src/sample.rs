//! Decoded audio chunks.
//!
//! Samples are interleaved `f32` in `[-1.0, 1.0]`; a chunk always carries
//! whole sample frames (one value per channel).

use std::fmt;

/// A run of interleaved PCM produced by a decoder.
#[derive(Clone, PartialEq, Default)]
pub struct AudioChunk {
    data: Vec<f32>,
    channels: u32,
    sample_rate: u32,
}

impl AudioChunk {
    /// Create a chunk from interleaved samples.
    ///
    /// Trailing values that do not form a complete sample frame are dropped.
    pub fn new(mut data: Vec<f32>, channels: u32, sample_rate: u32) -> Self {
        if channels > 0 {
            let whole = data.len() - data.len() % channels as usize;
            data.truncate(whole);
        } else {
            data.clear();
        }
        Self {
            data,
            channels,
            sample_rate,
        }
    }

    /// Create a chunk of silence covering `duration_ns` nanoseconds.
    pub fn silence(duration_ns: u64, channels: u32, sample_rate: u32) -> Self {
        let samples = (duration_ns as u128 * sample_rate as u128 / 1_000_000_000) as usize;
        Self {
            data: vec![0.0; samples * channels as usize],
            channels,
            sample_rate,
        }
    }

    /// Interleaved sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of channels.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames (samples per channel).
    pub fn sample_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels as usize
        }
    }

    /// Check if the chunk holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration of the chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }

    /// Drop `samples` sample frames from the front, returning how many were dropped.
    pub fn skip_front(&mut self, samples: usize) -> usize {
        let n = samples.min(self.sample_count());
        self.data.drain(..n * self.channels as usize);
        n
    }

    /// Keep at most `samples` sample frames.
    pub fn truncate(&mut self, samples: usize) {
        if samples < self.sample_count() {
            self.data.truncate(samples * self.channels as usize);
        }
    }

    /// Append another chunk with the same layout.
    pub fn append(&mut self, other: &AudioChunk) {
        if self.is_empty() {
            self.channels = other.channels;
            self.sample_rate = other.sample_rate;
        }
        if other.channels == self.channels {
            self.data.extend_from_slice(&other.data);
        }
    }
}

impl fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioChunk")
            .field("samples", &self.sample_count())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
