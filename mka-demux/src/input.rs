//! Host input layer.
//!
//! [`MkaInput`] is what a player talks to: it maps subsong indices onto
//! track/chapter selections, feeds frames through an [`AudioDecoder`] picked
//! from a [`DecoderRegistry`], and turns the demuxer's frame-level seek into
//! sample-accurate output. Errors cross this boundary as [`mka_core::Error`].

use std::fs::File;
use std::path::Path;

use mka_core::{
    AbortSignal, AudioChunk, AudioDecoder, DecoderRegistry, DecoderSetup, Error, FileInfo, Result,
};

use crate::config::{DemuxerConfig, InputConfig};
use crate::demuxer::MkaDemuxer;
use crate::error::MkaError;
use crate::frame_queue::AudioFrame;
use crate::io::{Abortable, ByteStream};

/// Why an input is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Playback: clusters are indexed.
    Decode,
    /// Metadata only.
    Info,
    /// Metadata rewrite; the file is opened for writing.
    Retag,
}

/// Playback state of one opened file.
pub struct MkaInput<S> {
    demuxer: MkaDemuxer<S>,
    decoder: Option<Box<dyn AudioDecoder>>,
    channels: u32,
    sample_rate: u32,
    /// Selection length in samples.
    length: u64,
    /// Samples handed out so far.
    position: u64,
    skip_frames: usize,
    skip_samples: u64,
    frame: Option<AudioFrame>,
    next_subframe: usize,
}

impl MkaInput<Abortable<File>> {
    /// Open a file by path after checking it against `input`.
    pub fn open_path(
        path: impl AsRef<Path>,
        mode: OpenMode,
        input: &InputConfig,
        signal: &AbortSignal,
    ) -> Result<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy();
        if !input.accepts_path(&display, None) {
            return Err(Error::UnsupportedFormat(format!(
                "not a Matroska path: {}",
                display
            )));
        }
        let file = File::options()
            .read(true)
            .write(mode == OpenMode::Retag)
            .open(path)?;
        Self::open(Abortable::new(file, signal.clone()), mode)
    }
}

impl<S: ByteStream> MkaInput<S> {
    /// Open a stream.
    pub fn open(stream: S, mode: OpenMode) -> Result<Self> {
        let config = DemuxerConfig::default().with_info_only(mode != OpenMode::Decode);
        Self::with_config(stream, config)
    }

    /// Open a stream with explicit demuxer settings.
    pub fn with_config(stream: S, config: DemuxerConfig) -> Result<Self> {
        let demuxer = MkaDemuxer::open(stream, config).map_err(|e| {
            if e.kind() == crate::error::ErrorKind::UnsupportedFormat {
                tracing::error!("no decodable streams found");
            } else if !e.is_aborted() {
                tracing::error!(error = %e, "invalid Matroska file");
            }
            Error::from(e)
        })?;
        Ok(Self {
            demuxer,
            decoder: None,
            channels: 0,
            sample_rate: 0,
            length: 0,
            position: 0,
            skip_frames: 0,
            skip_samples: 0,
            frame: None,
            next_subframe: 0,
        })
    }

    /// The demuxer session.
    pub fn demuxer(&self) -> &MkaDemuxer<S> {
        &self.demuxer
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.demuxer.into_inner()
    }

    /// Number of subsongs: chapters if any, else audio tracks.
    pub fn subsong_count(&self) -> usize {
        self.demuxer.catalog().subsong_count()
    }

    /// Whether seeking is possible.
    pub fn can_seek(&self) -> bool {
        self.demuxer.is_seekable()
    }

    /// Channel count the decoder is expected to produce.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Sample rate the decoder is expected to produce.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the selection in samples.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Samples handed out since the last seek target.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn select_subsong(&mut self, index: usize) -> Result<()> {
        let catalog = self.demuxer.catalog();
        let (ordinal, chapter) = catalog.split_subsong(index);
        let track = catalog
            .audio_track_index(ordinal)
            .ok_or(MkaError::TrackNotFound { index })?;
        self.demuxer.set_current_track(track)?;
        self.demuxer.set_subsong(chapter);
        tracing::debug!(subsong = index, track, chapter, "subsong selected");
        Ok(())
    }

    fn decoder_setup(&self) -> DecoderSetup {
        let track = self.demuxer.current_track();
        DecoderSetup {
            codec_id: track.codec_id.clone(),
            codec_private: track.codec_private.clone(),
            sample_rate: track.sample_rate as u32,
            output_sample_rate: track.output_sample_rate as u32,
            channels: track.channels,
            bits_per_sample: track.bits_per_sample,
        }
    }

    /// Prepare subsong `index` for decoding.
    pub fn select(&mut self, index: usize, registry: &DecoderRegistry) -> Result<()> {
        self.select_subsong(index)?;
        let setup = self.decoder_setup();
        let decoder = registry.select(&setup).map_err(|e| {
            tracing::error!(codec = %setup.codec_id, "unable to find a packet decoder");
            e
        })?;
        tracing::info!(
            codec = %setup.codec_id,
            decoder = decoder.codec_info().name,
            "decoder ready"
        );

        self.decoder = Some(decoder);
        self.channels = setup.channels;
        self.sample_rate = setup.expected_sample_rate();
        self.length = self.seconds_to_samples(self.demuxer.duration_secs());
        self.position = 0;
        self.skip_frames = 0;
        self.skip_samples = 0;
        self.frame = None;
        self.next_subframe = 0;

        if self.can_seek() && !self.decode_seek(0.0)? {
            tracing::debug!("selection start not reached, decoding from the current cluster");
        }
        Ok(())
    }

    /// Metadata of subsong `index`.
    pub fn file_info(&mut self, index: usize) -> Result<FileInfo> {
        self.select_subsong(index)?;
        let mut info = self.demuxer.file_info();
        let setup = self.decoder_setup();
        info.info_set("channels", &setup.channels.to_string());
        info.info_set("samplerate", &setup.expected_sample_rate().to_string());
        Ok(info)
    }

    /// Stage new metadata for subsong `index`.
    pub fn set_info(&mut self, index: usize, info: &FileInfo) -> Result<()> {
        self.select_subsong(index)?;
        self.demuxer.set_tags(info);
        Ok(())
    }

    /// Write staged metadata to the file.
    pub fn commit(&mut self) -> Result<()> {
        self.demuxer.write_tags()?;
        tracing::info!("tags committed");
        Ok(())
    }

    fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.sample_rate) + 0.5).max(0.0) as u64
    }

    fn teardown(&mut self) {
        self.decoder = None;
        self.frame = None;
        self.next_subframe = 0;
    }

    /// Decode the next run of samples, or `None` at the end.
    ///
    /// A read or decode error ends the session: the error is returned once
    /// and every later call yields `None`.
    pub fn decode_run(&mut self) -> Result<Option<AudioChunk>> {
        if self.decoder.is_none() {
            tracing::warn!("decode without a loaded decoder");
            return Ok(None);
        }
        if self.position >= self.length {
            return Ok(None);
        }

        loop {
            let exhausted = self
                .frame
                .as_ref()
                .map_or(true, |f| self.next_subframe >= f.subframe_count());
            if exhausted {
                let frame = match self.demuxer.read_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => return Ok(None),
                    Err(e) => {
                        tracing::error!(error = %e, "frame read failed");
                        self.teardown();
                        return Err(e.into());
                    }
                };
                if frame.subframe_count() == 0 {
                    self.teardown();
                    return Ok(None);
                }
                self.frame = Some(frame);
                self.next_subframe = 0;
            }

            let index = self.next_subframe;
            self.next_subframe += 1;
            let (decoded, span) = match (self.decoder.as_mut(), self.frame.as_ref()) {
                (Some(decoder), Some(frame)) => (
                    decode_subframe(decoder.as_mut(), frame, index),
                    frame.duration / frame.subframe_count() as u64,
                ),
                _ => return Ok(None),
            };
            let mut chunk = match decoded {
                Ok(chunk) => chunk,
                Err(e) => {
                    let codec = self.demuxer.current_track().codec_id.clone();
                    tracing::error!(codec = %codec, error = %e, "decode error");
                    self.teardown();
                    return Err(Error::DataCorrupt(format!("'{}' decode error: {}", codec, e)));
                }
            };

            if self.skip_frames > 0 {
                self.skip_frames -= 1;
                continue;
            }

            if chunk.is_empty() && span > 0 {
                tracing::debug!("decoder returned an empty chunk, padding with silence");
                chunk = AudioChunk::silence(span, self.channels, self.sample_rate);
            }

            let mut samples = chunk.sample_count() as u64;
            if self.skip_samples > 0 {
                let dropped = chunk.skip_front(self.skip_samples.min(samples) as usize) as u64;
                samples -= dropped;
                self.skip_samples -= dropped;
            }

            let remaining = self.length - self.position;
            if samples > remaining {
                chunk.truncate(remaining as usize);
                samples = remaining;
            }
            self.position += samples;
            if samples > 0 {
                return Ok(Some(chunk));
            }
            if self.position == self.length {
                return Ok(None);
            }
        }
    }

    /// Seek to `seconds` within the selection.
    ///
    /// Returns `false`, leaving the position unchanged, when the target
    /// cannot be reached.
    pub fn decode_seek(&mut self, seconds: f64) -> Result<bool> {
        let Some(decoder) = self.decoder.as_ref() else {
            tracing::error!("seek while no decoder is loaded");
            return Err(Error::NotSeekable);
        };
        let rate = f64::from(self.sample_rate);
        let seconds = if rate > 0.0 {
            (seconds * rate + 0.5).floor() / rate
        } else {
            seconds
        };
        let dependency = decoder.max_frame_dependency().min(seconds).max(0.0);
        let dependency_samples = self.seconds_to_samples(dependency);

        let plan = match self.demuxer.seek(seconds - dependency) {
            Ok(plan) => plan,
            Err(MkaError::SeekFailed(reason)) => {
                tracing::debug!(seconds, reason = %reason, "seek not reached");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        self.position = self.seconds_to_samples(seconds);
        self.skip_frames = plan.frames;
        self.skip_samples =
            self.seconds_to_samples(plan.residual_secs.max(0.0)) + dependency_samples;
        self.frame = None;
        self.next_subframe = 0;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        tracing::trace!(
            seconds,
            skip_frames = self.skip_frames,
            skip_samples = self.skip_samples,
            "decoder repositioned"
        );
        Ok(true)
    }
}

/// Decode one sub-frame, falling back to the block-addition payload when
/// the sub-frame alone produces nothing.
fn decode_subframe(
    decoder: &mut dyn AudioDecoder,
    frame: &AudioFrame,
    index: usize,
) -> Result<AudioChunk> {
    let chunk = decoder.decode(&frame.data[index])?;
    if chunk.is_empty() && frame.has_additional() {
        return decoder.decode(&frame.additional);
    }
    Ok(chunk)
}

impl<S> std::fmt::Debug for MkaInput<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MkaInput")
            .field("demuxer", &self.demuxer)
            .field("decoder", &self.decoder.as_ref().map(|d| d.codec_info().name))
            .field("length", &self.length)
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demuxer::tests::file;
    use mka_core::{CodecError, CodecInfo};
    use std::io::Cursor;

    /// Produces 100 ms of a constant level per frame at 8 kHz mono.
    struct Level {
        dependency: f64,
        mode: Mode,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Normal,
        Empty,
        Fail,
    }

    impl AudioDecoder for Level {
        fn codec_info(&self) -> CodecInfo {
            CodecInfo {
                name: "level",
                long_name: "Constant level test decoder",
            }
        }

        fn decode(&mut self, data: &[u8]) -> Result<AudioChunk> {
            match self.mode {
                Mode::Normal => Ok(AudioChunk::new(
                    vec![f32::from(data[1]) / 10.0; 800],
                    1,
                    8_000,
                )),
                Mode::Empty => Ok(AudioChunk::default()),
                Mode::Fail => Err(CodecError::DecodeFailed("bad frame".into()).into()),
            }
        }

        fn reset(&mut self) {}

        fn max_frame_dependency(&self) -> f64 {
            self.dependency
        }
    }

    fn registry(dependency: f64, mode: Mode) -> DecoderRegistry {
        let mut registry = DecoderRegistry::new();
        registry.register("A_TEST", move |_| Ok(Box::new(Level { dependency, mode })));
        registry
    }

    fn input(chapters: bool) -> MkaInput<Cursor<Vec<u8>>> {
        MkaInput::open(Cursor::new(file("A_TEST", chapters)), OpenMode::Decode).unwrap()
    }

    fn drain(input: &mut MkaInput<Cursor<Vec<u8>>>) -> Vec<AudioChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = input.decode_run().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_open_path_rejected() {
        let err = MkaInput::open_path(
            "/music/song.flac",
            OpenMode::Info,
            &InputConfig::default(),
            &AbortSignal::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_open_without_audio() {
        let err = MkaInput::open(Cursor::new(file("V_VP8", false)), OpenMode::Decode).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_decode_whole_file() {
        let mut input = input(false);
        assert_eq!(input.subsong_count(), 1);
        input.select(0, &registry(0.0, Mode::Normal)).unwrap();
        assert_eq!(input.sample_rate(), 8_000);
        assert_eq!(input.length(), 16_000);

        let chunks = drain(&mut input);
        assert_eq!(chunks.len(), 20);
        assert_eq!(chunks.iter().map(AudioChunk::sample_count).sum::<usize>(), 16_000);
        assert_eq!(input.position(), 16_000);
    }

    #[test]
    fn test_decode_chapter_clamped() {
        let mut input = input(true);
        assert_eq!(input.subsong_count(), 2);
        input.select(1, &registry(0.0, Mode::Normal)).unwrap();
        assert_eq!(input.length(), 4_000);

        let chunks = drain(&mut input);
        assert_eq!(chunks.iter().map(AudioChunk::sample_count).sum::<usize>(), 4_000);
        // first frame of the second chapter is frame 0 of cluster 3
        assert_eq!(chunks[0].data()[0], 0.0);
    }

    #[test]
    fn test_decode_seek_skips_samples() {
        let mut input = input(false);
        input.select(0, &registry(0.0, Mode::Normal)).unwrap();
        assert!(input.decode_seek(0.75).unwrap());
        assert_eq!(input.position(), 6_000);

        let chunk = input.decode_run().unwrap().unwrap();
        assert_eq!(chunk.sample_count(), 400);
        assert!((chunk.data()[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_decode_seek_with_dependency() {
        let mut input = input(false);
        input.select(0, &registry(0.1, Mode::Normal)).unwrap();
        assert!(input.decode_seek(0.75).unwrap());

        let chunk = input.decode_run().unwrap().unwrap();
        assert_eq!(chunk.sample_count(), 400);
        assert!((chunk.data()[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_decode_seek_out_of_range() {
        let mut input = input(false);
        input.select(0, &registry(0.0, Mode::Normal)).unwrap();
        assert!(!input.decode_seek(30.0).unwrap());
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_empty_chunk_padded() {
        let mut input = input(false);
        input.select(0, &registry(0.0, Mode::Empty)).unwrap();
        let chunk = input.decode_run().unwrap().unwrap();
        assert_eq!(chunk.sample_count(), 800);
        assert!(chunk.data().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_decode_error_tears_down() {
        let mut input = input(false);
        input.select(0, &registry(0.0, Mode::Fail)).unwrap();
        let err = input.decode_run().unwrap_err();
        assert!(matches!(err, Error::DataCorrupt(_)));
        assert!(input.decode_run().unwrap().is_none());
    }

    #[test]
    fn test_unknown_codec() {
        let mut input = input(false);
        let err = input.select(0, &DecoderRegistry::new()).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::NotFound(_))));
    }

    #[test]
    fn test_file_info_and_retag() {
        let mut input = input(true);
        let info = input.file_info(0).unwrap();
        assert_eq!(info.meta_get("TITLE", 0), Some("First"));
        assert_eq!(info.info_get("samplerate"), Some("8000"));

        let mut edited = FileInfo::new();
        edited.meta_set("TITLE", "Opening");
        edited.meta_set("ARTIST", "Quartet");
        edited.meta_set("ALBUM", "Live");
        input.set_info(0, &edited).unwrap();
        input.commit().unwrap();

        let bytes = input.into_inner().into_inner();
        let mut reopened = MkaInput::open(Cursor::new(bytes), OpenMode::Info).unwrap();
        let info = reopened.file_info(0).unwrap();
        assert_eq!(info.meta_get("TITLE", 0), Some("Opening"));
        assert_eq!(info.meta_get("ARTIST", 0), Some("Quartet"));
        assert_eq!(info.meta_get("ALBUM", 0), Some("Live"));

        let info = reopened.file_info(1).unwrap();
        assert_eq!(info.meta_get("TITLE", 0), Some("Second"));
        assert_eq!(info.meta_get("ALBUM", 0), Some("Live"));
    }
}
