//! Matroska audio demuxer session.
//!
//! [`MkaDemuxer`] owns the element reader and everything the structural
//! parse produced. It hands out [`AudioFrame`]s of one selected track,
//! cluster by cluster, and seeks through the lazily resolved cluster index.
//!
//! ```no_run
//! use std::fs::File;
//! use mka_demux::{DemuxerConfig, MkaDemuxer};
//!
//! let file = File::open("album.mka").unwrap();
//! let mut demuxer = MkaDemuxer::open(file, DemuxerConfig::default()).unwrap();
//!
//! demuxer.set_subsong(1);
//! demuxer.seek(0.0).unwrap();
//! while let Some(frame) = demuxer.read_frame().unwrap() {
//!     println!("frame at {} ns, {} sub-frames", frame.timecode, frame.subframe_count());
//! }
//! ```

use mka_core::FileInfo;

use crate::attachments::{self, Attachment};
use crate::catalog::{seconds_to_timecode, timecode_to_seconds, Catalog, Chapter, Track};
use crate::cluster_index::ClusterIndex;
use crate::config::DemuxerConfig;
use crate::cursor::{PlaybackCursor, END};
use crate::elements::CLUSTER;
use crate::error::{MkaError, Result};
use crate::frame_queue::{self, AudioFrame, BlockFilter, FrameQueue};
use crate::inheritance::{self, InfoTarget, WriteTarget};
use crate::io::ByteStream;
use crate::reader::ElementReader;
use crate::retag;
use crate::tags::TagStore;
use crate::walker::{self, ParsedSegment};

/// Where decoding resumes after a seek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkipPlan {
    /// Whole sub-frames to drop before the target.
    pub frames: usize,
    /// Time between the last dropped frame and the target, in seconds.
    pub residual_secs: f64,
}

/// Matroska audio demuxer.
pub struct MkaDemuxer<S> {
    reader: ElementReader<S>,
    parsed: ParsedSegment,
    config: DemuxerConfig,
    cursor: PlaybackCursor,
    queue: FrameQueue,
    /// Index entry read by the last seekable fill.
    last_cluster: Option<usize>,
}

impl<S: ByteStream> MkaDemuxer<S> {
    /// Parse the stream and select the first audio track.
    pub fn open(stream: S, config: DemuxerConfig) -> Result<Self> {
        let mut reader = ElementReader::new(stream, config.max_recursion_depth)?;
        let parsed = walker::parse_segment(&mut reader, &config)?;
        let track = parsed
            .catalog
            .first_audio_track()
            .ok_or(MkaError::NoAudioTrack)?;

        tracing::debug!(
            track,
            codec = %parsed.catalog.tracks[track].codec_id,
            seekable = reader.is_seekable(),
            "demuxer opened"
        );
        Ok(Self {
            reader,
            parsed,
            config,
            cursor: PlaybackCursor::new(track),
            queue: FrameQueue::new(),
            last_cluster: None,
        })
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Configuration the session was opened with.
    pub fn config(&self) -> &DemuxerConfig {
        &self.config
    }

    /// Doc type from the EBML head.
    pub fn doc_type(&self) -> &str {
        &self.parsed.doc_type
    }

    /// Tracks, editions, chapters and segment information.
    pub fn catalog(&self) -> &Catalog {
        &self.parsed.catalog
    }

    /// Parsed tag records.
    pub fn tags(&self) -> &TagStore {
        &self.parsed.tags
    }

    /// Cluster positions known so far.
    pub fn cluster_index(&self) -> &ClusterIndex {
        &self.parsed.cluster_index
    }

    /// Current selection and decode position.
    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    /// Stream size in bytes.
    pub fn file_size(&self) -> u64 {
        self.reader.file_size()
    }

    /// Whether the stream can seek backwards.
    pub fn is_seekable(&self) -> bool {
        self.reader.is_seekable()
    }

    /// The selected track.
    pub fn current_track(&self) -> &Track {
        &self.parsed.catalog.tracks[self.cursor.track()]
    }

    /// The selected chapter, if any.
    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.cursor
            .chapter()
            .and_then(|i| self.parsed.catalog.chapters.get(i))
    }

    /// Select a track by catalog index. Queued frames are dropped.
    pub fn set_current_track(&mut self, index: usize) -> Result<()> {
        if index >= self.parsed.catalog.tracks.len() {
            return Err(MkaError::TrackNotFound { index });
        }
        self.cursor.select_track(index);
        self.queue.flush();
        self.last_cluster = None;
        Ok(())
    }

    /// Select the first edition and the `n`-th chapter, when present.
    pub fn set_subsong(&mut self, n: usize) {
        let edition = (!self.parsed.catalog.editions.is_empty()).then_some(0);
        let chapter = (n < self.parsed.catalog.chapters.len()).then_some(n);
        self.cursor.select_subsong(edition, chapter);
    }

    /// Duration of the selection in nanoseconds: the chapter span, else the
    /// whole segment.
    pub fn duration(&self) -> u64 {
        match self.current_chapter() {
            Some(chapter) => chapter.duration(),
            None => self.parsed.catalog.info.duration,
        }
    }

    /// Duration of the selection in seconds.
    pub fn duration_secs(&self) -> f64 {
        timecode_to_seconds(self.duration())
    }

    /// Average bitrate of the file in kbit/s.
    pub fn avg_bitrate(&self) -> u32 {
        self.parsed.catalog.avg_bitrate(self.reader.file_size())
    }

    /// Generic metadata of the current selection.
    pub fn file_info(&mut self) -> FileInfo {
        let catalog = &self.parsed.catalog;
        let track = &catalog.tracks[self.cursor.track()];
        let chapter = self.cursor.chapter().and_then(|i| catalog.chapters.get(i));
        let target = InfoTarget {
            track_uid: track.uid,
            edition_uid: self
                .cursor
                .edition()
                .and_then(|i| catalog.editions.get(i))
                .map(|e| e.uid),
            chapter,
            chapter_number: self.cursor.chapter().map_or(0, |i| i + 1),
        };

        let mut info = FileInfo::new();
        info.info_set("codec", &track.codec_id);
        info.info_set("channels", &track.channels.to_string());
        info.info_set("samplerate", &(track.sample_rate as u32).to_string());
        if track.bits_per_sample > 0 {
            info.info_set("bitspersample", &track.bits_per_sample.to_string());
        }
        inheritance::resolve_info(&catalog.info, &mut self.parsed.tags, &target, &mut info);

        info.set_length(self.duration_secs());
        let bitrate = self.avg_bitrate();
        if bitrate > 0 {
            info.info_set("bitrate", &bitrate.to_string());
        }
        info
    }

    /// Replace the tags of the current selection with `info`.
    ///
    /// Nothing is written until [`write_tags`](Self::write_tags).
    pub fn set_tags(&mut self, info: &FileInfo) {
        let track_uid = self.current_track().uid;
        let target = match self.current_chapter() {
            Some(chapter) => WriteTarget::Chapter {
                track_uid,
                chapter_uid: chapter.uid,
            },
            None => WriteTarget::Track { track_uid },
        };
        tracing::debug!(?target, fields = info.meta_count(), "tags updated");
        inheritance::write_info(&mut self.parsed.tags, target, info);
    }

    /// Write the tag store back into the stream.
    pub fn write_tags(&mut self) -> Result<()> {
        if !self.reader.is_seekable() {
            return Err(MkaError::WriteRefused("stream is not seekable".into()));
        }
        let outcome = retag::write_tags(
            &mut self.reader,
            &self.parsed.segment,
            self.parsed.tag_block.as_ref(),
            &self.parsed.tags,
        )?;
        self.parsed.tag_block = Some(outcome.tag_block);
        self.parsed.segment = outcome.segment;
        self.queue.flush();
        self.last_cluster = None;
        Ok(())
    }

    /// Attachments found in the segment.
    pub fn attachments(&self) -> &[Attachment] {
        &self.parsed.attachments
    }

    /// Find an attachment by name, ignoring case.
    pub fn find_attachment(&self, name: &str) -> Option<&Attachment> {
        attachments::find_attachment(&self.parsed.attachments, name)
    }

    /// Read the payload of the attachment at `index`.
    pub fn read_attachment(&mut self, index: usize) -> Result<Vec<u8>> {
        if !self.reader.is_seekable() {
            return Err(MkaError::NotSeekable);
        }
        let attachment = self
            .parsed
            .attachments
            .get(index)
            .cloned()
            .ok_or_else(|| MkaError::MissingElement(format!("attachment {}", index)))?;
        attachments::read_attachment(&mut self.reader, &attachment)
    }

    /// Read the payload of the attachment called `name`.
    pub fn read_attachment_named(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let index = self
            .parsed
            .attachments
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name));
        index.map(|i| self.read_attachment(i)).transpose()
    }

    /// Next frame of the selected track, or `None` at the end.
    pub fn read_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            if let Some(frame) = self.queue.pop() {
                return Ok(Some(frame));
            }
            if !self.fill_queue()? {
                return Ok(None);
            }
        }
    }

    /// Timecode of the next frame, filling the queue if needed.
    pub fn current_frame_timecode(&mut self) -> Result<Option<u64>> {
        if self.queue.is_empty() && !self.fill_queue()? {
            return Ok(None);
        }
        Ok(self.queue.front().map(|f| f.timecode))
    }

    /// Replace the queue with the frames of the next cluster.
    ///
    /// Returns `false` once no cluster is left to read. A cluster without
    /// frames of the selected track still counts as read.
    pub fn fill_queue(&mut self) -> Result<bool> {
        self.queue.flush();
        if self.cursor.is_at_end() {
            return Ok(false);
        }

        let track = self.current_track();
        let filter = BlockFilter {
            track_number: u64::from(track.number),
            default_duration: track.default_duration,
            timecode_scale: self.parsed.catalog.info.timecode_scale,
        };
        let frames = if self.reader.is_seekable() {
            self.fill_from_index(&filter)?
        } else {
            self.fill_sequential(&filter)?
        };

        match frames {
            Some(frames) => {
                tracing::trace!(
                    frames = frames.len(),
                    next = self.cursor.decode_timecode(),
                    "queue filled"
                );
                self.queue.extend(frames);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn fill_from_index(&mut self, filter: &BlockFilter) -> Result<Option<Vec<AudioFrame>>> {
        let scale = filter.timecode_scale;
        let duration = self.parsed.catalog.info.duration;
        let target = self.cursor.decode_timecode();

        let found = {
            let reader = &mut self.reader;
            let mut probe =
                |position: u64| frame_queue::probe_cluster_timecode(reader, position, scale);
            self.parsed.cluster_index.find(target, duration, &mut probe)
        };
        let Some(mut index) = found else {
            tracing::debug!(timecode = target, "no cluster holds the decode position");
            self.cursor.jump_to(END);
            return Ok(None);
        };
        if self.last_cluster == Some(index) {
            index += 1;
        }
        let Some(entry) = self.parsed.cluster_index.get(index).copied() else {
            self.cursor.jump_to(END);
            return Ok(None);
        };

        self.reader.reset_to(1);
        let cluster = self
            .reader
            .read_element_at(entry.position)?
            .filter(|e| e.id == CLUSTER)
            .ok_or_else(|| {
                MkaError::MissingElement(format!("cluster at offset {}", entry.position))
            })?;
        let read = frame_queue::read_cluster(&mut self.reader, &cluster, filter)?;
        if let Some(timecode) = read.timecode {
            self.parsed.cluster_index.set_timecode(index, timecode);
        }
        self.last_cluster = Some(index);
        for frame in &read.frames {
            self.cursor.advance_past(frame, filter.default_duration);
        }

        let next = {
            let reader = &mut self.reader;
            let mut probe =
                |position: u64| frame_queue::probe_cluster_timecode(reader, position, scale);
            self.parsed.cluster_index.resolve(index + 1, &mut probe)
        };
        self.cursor.jump_to(next.unwrap_or(END));
        tracing::trace!(
            cluster = entry.cluster_no,
            position = entry.position,
            timecode = target,
            "cluster located"
        );
        Ok(Some(read.frames))
    }

    fn fill_sequential(&mut self, filter: &BlockFilter) -> Result<Option<Vec<AudioFrame>>> {
        while let Some(element) = self.reader.next_child(1)? {
            if element.id != CLUSTER {
                self.reader.skip(&element)?;
                continue;
            }
            let read = frame_queue::read_cluster(&mut self.reader, &element, filter)?;
            for frame in &read.frames {
                self.cursor.advance_past(frame, filter.default_duration);
            }
            return Ok(Some(read.frames));
        }
        self.cursor.jump_to(END);
        Ok(None)
    }

    /// Consume frames up to `dest_secs`.
    ///
    /// Returns `None` when the first queued frame is already past the target
    /// or the track ends first.
    pub fn skip_frames_until(&mut self, dest_secs: f64) -> Result<Option<SkipPlan>> {
        let Some(first) = self.current_frame_timecode()? else {
            return Ok(None);
        };
        let mut last_time = timecode_to_seconds(first);
        let mut done = 0usize;
        let mut last_laced = 0usize;

        loop {
            while let Some(frame) = self.queue.front() {
                let frame_time = timecode_to_seconds(frame.timecode);
                if frame_time > dest_secs {
                    if done == 0 {
                        return Ok(None);
                    }
                    return Ok(Some(SkipPlan {
                        frames: done - last_laced,
                        residual_secs: dest_secs - last_time,
                    }));
                }
                last_time = frame_time;
                last_laced = frame.subframe_count();
                done += last_laced;
                self.queue.pop();
            }
            if !self.fill_queue()? {
                return Ok(None);
            }
        }
    }

    /// Seek to `secs`, relative to the selected chapter.
    ///
    /// On success the queue holds the cluster containing the target and the
    /// plan says how much of it to discard. On failure the playback position
    /// is left as it was.
    pub fn seek(&mut self, secs: f64) -> Result<SkipPlan> {
        if !self.reader.is_seekable() {
            return Err(MkaError::NotSeekable);
        }
        let dest = match self.current_chapter() {
            Some(chapter) => secs + timecode_to_seconds(chapter.time_start),
            None => secs,
        };
        let target = seconds_to_timecode(dest);

        let saved = (self.cursor, self.queue.clone(), self.last_cluster);
        let result = self.seek_to(dest, target);
        match result {
            Ok(Some(plan)) => {
                tracing::debug!(
                    seconds = dest,
                    frames = plan.frames,
                    residual = plan.residual_secs,
                    "seek done"
                );
                Ok(plan)
            }
            Ok(None) => {
                (self.cursor, self.queue, self.last_cluster) = saved;
                tracing::warn!(seconds = dest, "seek target not reached");
                Err(MkaError::SeekFailed(format!("no frame at {:.3}s", dest)))
            }
            Err(e) => {
                (self.cursor, self.queue, self.last_cluster) = saved;
                Err(e)
            }
        }
    }

    fn seek_to(&mut self, dest: f64, target: u64) -> Result<Option<SkipPlan>> {
        self.queue.flush();
        self.last_cluster = None;
        self.cursor.jump_to(target);
        let Some(plan) = self.skip_frames_until(dest)? else {
            return Ok(None);
        };

        self.queue.flush();
        self.last_cluster = None;
        self.cursor.jump_to(target);
        if !self.fill_queue()? {
            return Ok(None);
        }
        Ok(Some(plan))
    }
}

impl<S> std::fmt::Debug for MkaDemuxer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MkaDemuxer")
            .field("doc_type", &self.parsed.doc_type)
            .field("tracks", &self.parsed.catalog.tracks.len())
            .field("chapters", &self.parsed.catalog.chapters.len())
            .field("cursor", &self.cursor)
            .field("queued", &self.queue.len())
            .finish()
    }
}
