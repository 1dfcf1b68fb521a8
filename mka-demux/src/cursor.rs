//! Playback position and selection.

use crate::frame_queue::AudioFrame;

/// Decode timecode meaning "past the last cluster".
pub const END: u64 = u64::MAX;

/// How far past a queued frame the decode timecode is pushed, in multiples
/// of the frame duration.
///
/// Landing well inside the following cluster keeps the next lookup from
/// resolving the cluster that was just read.
pub const OVER_ADVANCE_FACTOR: u64 = 2;

/// Which track, edition and chapter are playing, and where the next cluster
/// lookup starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    track: usize,
    edition: Option<usize>,
    chapter: Option<usize>,
    decode_timecode: u64,
}

impl PlaybackCursor {
    /// Cursor on the given catalog track, no chapter selected.
    pub fn new(track: usize) -> Self {
        Self {
            track,
            ..Self::default()
        }
    }

    /// Selected catalog track index.
    pub fn track(&self) -> usize {
        self.track
    }

    /// Selected edition index.
    pub fn edition(&self) -> Option<usize> {
        self.edition
    }

    /// Selected chapter index.
    pub fn chapter(&self) -> Option<usize> {
        self.chapter
    }

    /// Timecode the next cluster lookup targets, in nanoseconds.
    pub fn decode_timecode(&self) -> u64 {
        self.decode_timecode
    }

    /// Whether the last cluster has been read.
    pub fn is_at_end(&self) -> bool {
        self.decode_timecode == END
    }

    /// Switch track. The decode position is kept.
    pub fn select_track(&mut self, track: usize) {
        self.track = track;
    }

    /// Select an edition and chapter.
    pub fn select_subsong(&mut self, edition: Option<usize>, chapter: Option<usize>) {
        self.edition = edition;
        self.chapter = chapter;
    }

    /// Move the decode position to an explicit timecode.
    pub fn jump_to(&mut self, timecode: u64) {
        self.decode_timecode = timecode;
    }

    /// Push the decode position past a queued frame.
    ///
    /// The position moves to `timecode + 2 × duration`, using the track's
    /// default duration when the frame has none. It never moves backwards.
    pub fn advance_past(&mut self, frame: &AudioFrame, default_duration: u64) -> u64 {
        let step = if frame.duration > 0 {
            frame.duration
        } else {
            default_duration
        };
        let next = frame
            .timecode
            .saturating_add(step.saturating_mul(OVER_ADVANCE_FACTOR));
        if self.decode_timecode != END {
            self.decode_timecode = self.decode_timecode.max(next);
        }
        self.decode_timecode
    }
}
