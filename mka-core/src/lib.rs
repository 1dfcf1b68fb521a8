//! # mka-core
//!
//! Host-side types shared by the Matroska audio demuxer.
//!
//! This crate provides the boundary between the container logic and whatever
//! plays the audio:
//! - Error taxonomy reported to the host
//! - Cooperative abort signalling
//! - Audio decoder trait and codec registry
//! - Decoded PCM chunks
//! - The flat generic metadata model

pub mod error;
pub mod abort;
pub mod decoder;
pub mod sample;
pub mod metadata;

pub use error::{CodecError, Error, Result};
pub use abort::AbortSignal;
pub use decoder::{AudioDecoder, CodecInfo, DecoderRegistry, DecoderSetup};
pub use sample::AudioChunk;
pub use metadata::{FileInfo, MetaField, ReplayGain};
