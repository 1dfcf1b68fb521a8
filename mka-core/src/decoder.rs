//! Audio decoder boundary.
//!
//! The demuxer hands out compressed frames; turning them into PCM is the job
//! of an [`AudioDecoder`] looked up by codec identifier in a
//! [`DecoderRegistry`].
//!
//! ```ignore
//! let mut registry = DecoderRegistry::new();
//! registry.register("A_PCM/INT/LIT", |setup| Ok(Box::new(PcmDecoder::new(setup)?)));
//!
//! let mut decoder = registry.select(&setup)?;
//! let chunk = decoder.decode(&frame_bytes)?;
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::error::{CodecError, Result};
use crate::sample::AudioChunk;

/// Information about a decoder implementation.
#[derive(Debug, Clone)]
pub struct CodecInfo {
    /// Short name.
    pub name: &'static str,
    /// Long name/description.
    pub long_name: &'static str,
}

/// Everything a decoder needs to know before the first frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoderSetup {
    /// Container codec identifier (e.g. `A_VORBIS`).
    pub codec_id: String,
    /// Codec private data, if the track carried any.
    pub codec_private: Vec<u8>,
    /// Sampling frequency declared by the track.
    pub sample_rate: u32,
    /// Output sampling frequency (SBR-style doubling), 0 if not declared.
    pub output_sample_rate: u32,
    /// Channel count.
    pub channels: u32,
    /// Bits per sample, 0 if not declared.
    pub bits_per_sample: u32,
}

impl DecoderSetup {
    /// Sample rate the decoder is expected to produce.
    pub fn expected_sample_rate(&self) -> u32 {
        if self.output_sample_rate != 0 {
            self.output_sample_rate
        } else {
            self.sample_rate
        }
    }
}

/// Common trait for audio decoders.
pub trait AudioDecoder: Send {
    /// Get codec information.
    fn codec_info(&self) -> CodecInfo;

    /// Decode one compressed frame.
    ///
    /// An empty chunk means the frame produced no output (e.g. codec priming).
    fn decode(&mut self, data: &[u8]) -> Result<AudioChunk>;

    /// Reset internal state after a seek.
    fn reset(&mut self);

    /// Longest span, in seconds, a frame can depend on earlier frames.
    ///
    /// Seeking backs off by this amount and discards the decoded overlap.
    fn max_frame_dependency(&self) -> f64 {
        0.0
    }
}

type Factory = Box<dyn Fn(&DecoderSetup) -> Result<Box<dyn AudioDecoder>> + Send + Sync>;

/// Codec identifier to decoder factory map.
#[derive(Default)]
pub struct DecoderRegistry {
    factories: HashMap<String, Factory>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `codec_id`, replacing any previous one.
    pub fn register<F>(&mut self, codec_id: &str, factory: F)
    where
        F: Fn(&DecoderSetup) -> Result<Box<dyn AudioDecoder>> + Send + Sync + 'static,
    {
        self.factories
            .insert(codec_id.to_string(), Box::new(factory));
    }

    /// Whether a decoder is registered for `codec_id`.
    pub fn supports(&self, codec_id: &str) -> bool {
        self.factories.contains_key(codec_id)
    }

    /// Build a decoder for `setup`, or fail with [`CodecError::NotFound`].
    pub fn select(&self, setup: &DecoderSetup) -> Result<Box<dyn AudioDecoder>> {
        let factory = self
            .factories
            .get(&setup.codec_id)
            .ok_or_else(|| CodecError::NotFound(setup.codec_id.clone()))?;
        let decoder = factory(setup)?;
        tracing::debug!(
            codec = %setup.codec_id,
            decoder = decoder.codec_info().name,
            "selected audio decoder"
        );
        Ok(decoder)
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("DecoderRegistry").field("codecs", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Silence {
        channels: u32,
        rate: u32,
    }

    impl AudioDecoder for Silence {
        fn codec_info(&self) -> CodecInfo {
            CodecInfo {
                name: "silence",
                long_name: "Test silence decoder",
            }
        }

        fn decode(&mut self, data: &[u8]) -> Result<AudioChunk> {
            Ok(AudioChunk::new(
                vec![0.0; data.len() * self.channels as usize],
                self.channels,
                self.rate,
            ))
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn test_expected_sample_rate() {
        let mut setup = DecoderSetup {
            sample_rate: 24_000,
            ..Default::default()
        };
        assert_eq!(setup.expected_sample_rate(), 24_000);
        setup.output_sample_rate = 48_000;
        assert_eq!(setup.expected_sample_rate(), 48_000);
    }

    #[test]
    fn test_registry_select() {
        let mut registry = DecoderRegistry::new();
        registry.register("A_TEST", |s| {
            Ok(Box::new(Silence {
                channels: s.channels,
                rate: s.expected_sample_rate(),
            }))
        });
        assert!(registry.supports("A_TEST"));

        let setup = DecoderSetup {
            codec_id: "A_TEST".into(),
            sample_rate: 8_000,
            channels: 2,
            ..Default::default()
        };
        let mut decoder = registry.select(&setup).unwrap();
        let chunk = decoder.decode(&[0; 4]).unwrap();
        assert_eq!(chunk.sample_count(), 4);
        assert_eq!(decoder.max_frame_dependency(), 0.0);
    }

    #[test]
    fn test_registry_not_found() {
        let registry = DecoderRegistry::new();
        let setup = DecoderSetup {
            codec_id: "A_NOPE".into(),
            ..Default::default()
        };
        match registry.select(&setup) {
            Err(Error::Codec(CodecError::NotFound(id))) => assert_eq!(id, "A_NOPE"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
