//! Track, edition and chapter catalog.
//!
//! Populated once by the segment walker and read-only afterwards, apart from
//! the chapter end-time back-fill that runs at the end of the parse.

use crate::elements;

/// Default timecode scale (1 millisecond in nanoseconds).
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Track number given to tracks that are not audio.
pub const EXCLUDED_TRACK_NUMBER: u16 = 0xFFFF;

/// Convert seconds to a nanosecond timecode.
pub fn seconds_to_timecode(seconds: f64) -> u64 {
    (seconds * 1_000_000_000.0).floor().max(0.0) as u64
}

/// Convert a nanosecond timecode to seconds.
pub fn timecode_to_seconds(timecode: u64) -> f64 {
    timecode as f64 / 1_000_000_000.0
}

/// One `TrackEntry`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    /// Track number as used by blocks, or [`EXCLUDED_TRACK_NUMBER`].
    pub number: u16,
    /// Track UID.
    pub uid: u64,
    /// Codec identifier.
    pub codec_id: String,
    /// Codec private data.
    pub codec_private: Vec<u8>,
    /// Language code.
    pub language: String,
    /// Track name.
    pub name: String,
    /// Channel count.
    pub channels: u32,
    /// Sampling frequency in Hz.
    pub sample_rate: f64,
    /// Output sampling frequency in Hz, 0 when not declared.
    pub output_sample_rate: f64,
    /// Bit depth, 0 when not declared.
    pub bits_per_sample: u32,
    /// Default frame duration in nanoseconds.
    pub default_duration: u64,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            number: 0,
            uid: 0,
            codec_id: String::new(),
            codec_private: Vec::new(),
            language: String::new(),
            name: String::new(),
            channels: 1,
            sample_rate: 0.0,
            output_sample_rate: 0.0,
            bits_per_sample: 0,
            default_duration: 0,
        }
    }
}

impl Track {
    /// Check if the codec identifier denotes audio.
    pub fn is_audio(&self) -> bool {
        elements::is_audio_codec(&self.codec_id)
    }

    /// Check if the track was excluded for not being audio.
    pub fn is_excluded(&self) -> bool {
        self.number == EXCLUDED_TRACK_NUMBER
    }
}

/// One `EditionEntry`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edition {
    /// Edition UID.
    pub uid: u64,
    /// Track UIDs the edition applies to; empty means all.
    pub tracks: Vec<u64>,
}

/// Localized chapter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChapterDisplay {
    /// Chapter title.
    pub text: String,
    /// Language code.
    pub language: String,
    /// Country code.
    pub country: String,
}

/// One `ChapterAtom`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chapter {
    /// Chapter UID.
    pub uid: u64,
    /// Start time in nanoseconds.
    pub time_start: u64,
    /// End time in nanoseconds, 0 when not declared.
    pub time_end: u64,
    /// Track UIDs the chapter applies to.
    pub tracks: Vec<u64>,
    /// Non-empty display strings.
    pub displays: Vec<ChapterDisplay>,
    /// Nested chapters.
    pub sub_chapters: Vec<Chapter>,
}

impl Chapter {
    /// First display string, if any.
    pub fn title(&self) -> Option<&str> {
        self.displays.first().map(|d| d.text.as_str())
    }

    /// Span in nanoseconds.
    pub fn duration(&self) -> u64 {
        self.time_end.saturating_sub(self.time_start)
    }

    /// Gap between the first two sub-chapters, in nanoseconds.
    pub fn pregap(&self) -> Option<u64> {
        match self.sub_chapters.as_slice() {
            [first, second, ..] => Some(second.time_start.saturating_sub(first.time_start)),
            _ => None,
        }
    }
}

/// Segment information.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentInfo {
    /// Timecode scale (nanoseconds per timecode unit).
    pub timecode_scale: u64,
    /// Duration in nanoseconds.
    pub duration: u64,
    /// Date in nanoseconds since 2001-01-01.
    pub date_utc: Option<i64>,
    /// Segment filename.
    pub filename: String,
    /// Muxing application.
    pub muxing_app: String,
    /// Writing application.
    pub writing_app: String,
    /// Title.
    pub title: String,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: 0,
            date_utc: None,
            filename: String::new(),
            muxing_app: String::new(),
            writing_app: String::new(),
            title: String::new(),
        }
    }
}

/// Everything the structural parse learned about the segment.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Catalog {
    /// Segment information.
    pub info: SegmentInfo,
    /// Tracks in file order.
    pub tracks: Vec<Track>,
    /// Editions with unique non-zero UIDs.
    pub editions: Vec<Edition>,
    /// Top-level chapters of all editions, unique non-zero UIDs.
    pub chapters: Vec<Chapter>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edition unless its UID is zero or already known.
    pub fn add_edition(&mut self, edition: Edition) -> bool {
        if edition.uid == 0 || self.has_edition(edition.uid) {
            return false;
        }
        self.editions.push(edition);
        true
    }

    /// Add a top-level chapter unless its UID is zero or already known.
    pub fn add_chapter(&mut self, chapter: Chapter) -> bool {
        if chapter.uid == 0 || self.has_chapter(chapter.uid) {
            return false;
        }
        self.chapters.push(chapter);
        true
    }

    /// Check if an edition UID is known.
    pub fn has_edition(&self, uid: u64) -> bool {
        self.editions.iter().any(|e| e.uid == uid)
    }

    /// Check if a top-level chapter UID is known.
    pub fn has_chapter(&self, uid: u64) -> bool {
        self.chapters.iter().any(|c| c.uid == uid)
    }

    /// Back-fill missing chapter end times.
    ///
    /// Every chapter without an end takes the next chapter's start; the last
    /// one takes the segment duration, also when its end equals its start.
    pub fn fix_chapter_end_times(&mut self) {
        let duration = self.info.duration;
        let count = self.chapters.len();
        if count == 0 {
            return;
        }
        for i in 0..count - 1 {
            if self.chapters[i].time_end == 0 {
                self.chapters[i].time_end = self.chapters[i + 1].time_start;
            }
        }
        let last = &mut self.chapters[count - 1];
        if last.time_end == 0 || last.time_end == last.time_start {
            last.time_end = duration;
        }
    }

    /// Index of the first audio track.
    pub fn first_audio_track(&self) -> Option<usize> {
        self.tracks.iter().position(Track::is_audio)
    }

    /// Number of audio tracks.
    pub fn audio_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_audio()).count()
    }

    /// Catalog index of the `n`-th audio track.
    pub fn audio_track_index(&self, n: usize) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_audio())
            .nth(n)
            .map(|(i, _)| i)
    }

    /// Number of playable items: chapters if any, else audio tracks.
    pub fn subsong_count(&self) -> usize {
        if self.chapters.is_empty() {
            self.audio_track_count()
        } else {
            self.chapters.len()
        }
    }

    /// Split a subsong index into `(audio track ordinal, chapter subsong)`.
    pub fn split_subsong(&self, index: usize) -> (usize, usize) {
        match self.chapters.len() {
            0 => (index, 0),
            n => (index / n, index % n),
        }
    }

    /// Segment duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        timecode_to_seconds(self.info.duration)
    }

    /// Average bitrate in kbit/s over the whole file.
    pub fn avg_bitrate(&self, file_size: u64) -> u32 {
        let seconds = self.duration_secs();
        if seconds <= 0.0 {
            return 0;
        }
        (file_size as f64 / 1024.0 / seconds * 8.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(number: u16, codec: &str) -> Track {
        Track {
            number,
            uid: number as u64 * 100,
            codec_id: codec.to_string(),
            ..Default::default()
        }
    }

    fn chapter(uid: u64, start: u64, end: u64) -> Chapter {
        Chapter {
            uid,
            time_start: start,
            time_end: end,
            ..Default::default()
        }
    }

    #[test]
    fn test_track_defaults() {
        let track = Track::default();
        assert_eq!(track.channels, 1);
        assert!(!track.is_audio());
        assert!(!track.is_excluded());
    }

    #[test]
    fn test_audio_track_queries() {
        let mut catalog = Catalog::new();
        catalog.tracks.push(Track {
            number: EXCLUDED_TRACK_NUMBER,
            codec_id: "V_VP9".into(),
            ..Default::default()
        });
        catalog.tracks.push(audio(2, "A_VORBIS"));
        catalog.tracks.push(audio(3, "S_TEXT/UTF8"));
        catalog.tracks.push(audio(4, "A_FLAC"));

        assert_eq!(catalog.first_audio_track(), Some(1));
        assert_eq!(catalog.audio_track_count(), 2);
        assert_eq!(catalog.audio_track_index(0), Some(1));
        assert_eq!(catalog.audio_track_index(1), Some(3));
        assert_eq!(catalog.audio_track_index(2), None);
        assert_eq!(catalog.subsong_count(), 2);
    }

    #[test]
    fn test_no_audio_track() {
        let mut catalog = Catalog::new();
        catalog.tracks.push(audio(1, "V_MPEG4/ISO/AVC"));
        assert_eq!(catalog.first_audio_track(), None);
        assert_eq!(catalog.subsong_count(), 0);
    }

    #[test]
    fn test_split_subsong() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.split_subsong(3), (3, 0));
        catalog.add_chapter(chapter(1, 0, 0));
        catalog.add_chapter(chapter(2, 10, 0));
        assert_eq!(catalog.split_subsong(3), (1, 1));
        assert_eq!(catalog.subsong_count(), 2);
    }

    #[test]
    fn test_duplicate_uids_dropped() {
        let mut catalog = Catalog::new();
        assert!(catalog.add_chapter(chapter(7, 0, 0)));
        assert!(!catalog.add_chapter(chapter(7, 5, 0)));
        assert!(!catalog.add_chapter(chapter(0, 5, 0)));
        assert!(catalog.add_edition(Edition { uid: 3, tracks: vec![] }));
        assert!(!catalog.add_edition(Edition { uid: 3, tracks: vec![] }));
        assert!(!catalog.add_edition(Edition::default()));
        assert_eq!(catalog.chapters.len(), 1);
        assert_eq!(catalog.editions.len(), 1);
    }

    #[test]
    fn test_fix_chapter_end_times() {
        let mut catalog = Catalog::new();
        catalog.info.duration = 90;
        catalog.add_chapter(chapter(1, 0, 0));
        catalog.add_chapter(chapter(2, 30, 0));
        catalog.add_chapter(chapter(3, 60, 60));
        catalog.fix_chapter_end_times();

        let ends: Vec<u64> = catalog.chapters.iter().map(|c| c.time_end).collect();
        assert_eq!(ends, vec![30, 60, 90]);
    }

    #[test]
    fn test_fix_keeps_declared_ends() {
        let mut catalog = Catalog::new();
        catalog.info.duration = 90;
        catalog.add_chapter(chapter(1, 0, 20));
        catalog.add_chapter(chapter(2, 30, 80));
        catalog.fix_chapter_end_times();
        assert_eq!(catalog.chapters[0].time_end, 20);
        assert_eq!(catalog.chapters[1].time_end, 80);
    }

    #[test]
    fn test_pregap() {
        let mut parent = chapter(1, 0, 0);
        assert_eq!(parent.pregap(), None);
        parent.sub_chapters.push(chapter(2, 0, 0));
        parent.sub_chapters.push(chapter(3, 2_000_000_000, 0));
        assert_eq!(parent.pregap(), Some(2_000_000_000));
    }

    #[test]
    fn test_avg_bitrate() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.avg_bitrate(1024 * 1024), 0);
        catalog.info.duration = 8_000_000_000;
        // 1024 KiB over 8 s = 1024 kbit/s
        assert_eq!(catalog.avg_bitrate(1024 * 1024), 1024);
    }

    #[test]
    fn test_timecode_conversion() {
        assert_eq!(seconds_to_timecode(1.5), 1_500_000_000);
        assert_eq!(seconds_to_timecode(-1.0), 0);
        assert_eq!(timecode_to_seconds(250_000_000), 0.25);
    }
}
