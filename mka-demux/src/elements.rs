//! Matroska element definitions.
//!
//! Element IDs used by the audio demuxer, their value types, and the
//! audio codec identifiers it recognizes.

// =============================================================================
// EBML Header Elements
// =============================================================================

/// EBML Header element.
pub const EBML: u32 = 0x1A45DFA3;
/// EBML Version.
pub const EBML_VERSION: u32 = 0x4286;
/// EBML Read Version.
pub const EBML_READ_VERSION: u32 = 0x42F7;
/// EBML Doc Type.
pub const DOC_TYPE: u32 = 0x4282;
/// EBML Doc Type Version.
pub const DOC_TYPE_VERSION: u32 = 0x4287;

// =============================================================================
// Segment Elements
// =============================================================================

/// Segment (the root container for all Matroska data).
pub const SEGMENT: u32 = 0x18538067;

// =============================================================================
// Meta Seek Information
// =============================================================================

/// SeekHead (index of top-level elements).
pub const SEEK_HEAD: u32 = 0x114D9B74;
/// Seek entry.
pub const SEEK: u32 = 0x4DBB;
/// Seek ID.
pub const SEEK_ID: u32 = 0x53AB;
/// Seek Position.
pub const SEEK_POSITION: u32 = 0x53AC;

// =============================================================================
// Segment Information
// =============================================================================

/// Segment Info.
pub const INFO: u32 = 0x1549A966;
/// Segment UID.
pub const SEGMENT_UID: u32 = 0x73A4;
/// Segment Filename.
pub const SEGMENT_FILENAME: u32 = 0x7384;
/// Timecode Scale (nanoseconds per timecode unit, default 1000000 = 1ms).
pub const TIMECODE_SCALE: u32 = 0x2AD7B1;
/// Duration (in timecode units).
pub const DURATION: u32 = 0x4489;
/// Date UTC (nanoseconds since 2001-01-01).
pub const DATE_UTC: u32 = 0x4461;
/// Title.
pub const TITLE: u32 = 0x7BA9;
/// Muxing App.
pub const MUXING_APP: u32 = 0x4D80;
/// Writing App.
pub const WRITING_APP: u32 = 0x5741;

// =============================================================================
// Cluster Elements
// =============================================================================

/// Cluster (contains blocks of media data).
pub const CLUSTER: u32 = 0x1F43B675;
/// Cluster Timestamp.
pub const TIMESTAMP: u32 = 0xE7;
/// Position (cluster position in segment).
pub const POSITION: u32 = 0xA7;
/// Previous Size (size of previous cluster).
pub const PREV_SIZE: u32 = 0xAB;
/// SimpleBlock.
pub const SIMPLE_BLOCK: u32 = 0xA3;
/// BlockGroup (block with additional info).
pub const BLOCK_GROUP: u32 = 0xA0;
/// Block.
pub const BLOCK: u32 = 0xA1;
/// Block Additions.
pub const BLOCK_ADDITIONS: u32 = 0x75A1;
/// Block More.
pub const BLOCK_MORE: u32 = 0xA6;
/// Block Add ID.
pub const BLOCK_ADD_ID: u32 = 0xEE;
/// Block Additional.
pub const BLOCK_ADDITIONAL: u32 = 0xA5;
/// Block Duration.
pub const BLOCK_DURATION: u32 = 0x9B;
/// Reference Block (timestamp offset to reference frame).
pub const REFERENCE_BLOCK: u32 = 0xFB;

// =============================================================================
// Track Elements
// =============================================================================

/// Tracks.
pub const TRACKS: u32 = 0x1654AE6B;
/// Track Entry.
pub const TRACK_ENTRY: u32 = 0xAE;
/// Track Number.
pub const TRACK_NUMBER: u32 = 0xD7;
/// Track UID.
pub const TRACK_UID: u32 = 0x73C5;
/// Track Type.
pub const TRACK_TYPE: u32 = 0x83;
/// Default Duration.
pub const DEFAULT_DURATION: u32 = 0x23E383;
/// Name.
pub const NAME: u32 = 0x536E;
/// Language.
pub const LANGUAGE: u32 = 0x22B59C;
/// Codec ID.
pub const CODEC_ID: u32 = 0x86;
/// Codec Private.
pub const CODEC_PRIVATE: u32 = 0x63A2;
/// Codec Name.
pub const CODEC_NAME: u32 = 0x258688;

// =============================================================================
// Audio Elements
// =============================================================================

/// Audio settings.
pub const AUDIO: u32 = 0xE1;
/// Sampling Frequency.
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
/// Output Sampling Frequency.
pub const OUTPUT_SAMPLING_FREQUENCY: u32 = 0x78B5;
/// Channels.
pub const CHANNELS: u32 = 0x9F;
/// Bit Depth.
pub const BIT_DEPTH: u32 = 0x6264;

// =============================================================================
// Cueing Data
// =============================================================================

/// Cues.
pub const CUES: u32 = 0x1C53BB6B;

// =============================================================================
// Attachment Elements
// =============================================================================

/// Attachments.
pub const ATTACHMENTS: u32 = 0x1941A469;
/// Attached File.
pub const ATTACHED_FILE: u32 = 0x61A7;
/// File Description.
pub const FILE_DESCRIPTION: u32 = 0x467E;
/// File Name.
pub const FILE_NAME: u32 = 0x466E;
/// File Media Type.
pub const FILE_MEDIA_TYPE: u32 = 0x4660;
/// File Data.
pub const FILE_DATA: u32 = 0x465C;
/// File UID.
pub const FILE_UID: u32 = 0x46AE;

// =============================================================================
// Chapters
// =============================================================================

/// Chapters.
pub const CHAPTERS: u32 = 0x1043A770;
/// Edition Entry.
pub const EDITION_ENTRY: u32 = 0x45B9;
/// Edition UID.
pub const EDITION_UID: u32 = 0x45BC;
/// Chapter Atom.
pub const CHAPTER_ATOM: u32 = 0xB6;
/// Chapter UID.
pub const CHAPTER_UID: u32 = 0x73C4;
/// Chapter Time Start.
pub const CHAPTER_TIME_START: u32 = 0x91;
/// Chapter Time End.
pub const CHAPTER_TIME_END: u32 = 0x92;
/// Chapter Tracks.
pub const CHAPTER_TRACK: u32 = 0x8F;
/// Chapter Track Number (a track UID).
pub const CHAPTER_TRACK_NUMBER: u32 = 0x89;
/// Chapter Display.
pub const CHAPTER_DISPLAY: u32 = 0x80;
/// Chap String.
pub const CHAP_STRING: u32 = 0x85;
/// Chap Language.
pub const CHAP_LANGUAGE: u32 = 0x437C;
/// Chap Country.
pub const CHAP_COUNTRY: u32 = 0x437E;

// =============================================================================
// Tagging
// =============================================================================

/// Tags.
pub const TAGS: u32 = 0x1254C367;
/// Tag.
pub const TAG: u32 = 0x7373;
/// Targets.
pub const TARGETS: u32 = 0x63C0;
/// Target Type Value.
pub const TARGET_TYPE_VALUE: u32 = 0x68CA;
/// Target Type.
pub const TARGET_TYPE: u32 = 0x63CA;
/// Tag Track UID.
pub const TAG_TRACK_UID: u32 = 0x63C5;
/// Tag Edition UID.
pub const TAG_EDITION_UID: u32 = 0x63C9;
/// Tag Chapter UID.
pub const TAG_CHAPTER_UID: u32 = 0x63C4;
/// Tag Attachment UID.
pub const TAG_ATTACHMENT_UID: u32 = 0x63C6;
/// Simple Tag.
pub const SIMPLE_TAG: u32 = 0x67C8;
/// Tag Name.
pub const TAG_NAME: u32 = 0x45A3;
/// Tag Language.
pub const TAG_LANGUAGE: u32 = 0x447A;
/// Tag Default.
pub const TAG_DEFAULT: u32 = 0x4484;
/// Tag String.
pub const TAG_STRING: u32 = 0x4487;
/// Tag Binary.
pub const TAG_BINARY: u32 = 0x4485;

// =============================================================================
// Void and CRC
// =============================================================================

/// Void (padding).
pub const VOID: u32 = 0xEC;
/// CRC-32.
pub const CRC32: u32 = 0xBF;

// =============================================================================
// Track Types
// =============================================================================

/// Track type: Video.
pub const TRACK_TYPE_VIDEO: u8 = 1;
/// Track type: Audio.
pub const TRACK_TYPE_AUDIO: u8 = 2;
/// Track type: Subtitle.
pub const TRACK_TYPE_SUBTITLE: u8 = 17;

// =============================================================================
// Codec IDs
// =============================================================================

/// Prefix shared by every audio codec identifier.
pub const AUDIO_CODEC_PREFIX: &str = "A_";

/// Matroska audio codec ID definitions.
pub mod codec_ids {
    /// Opus audio codec.
    pub const A_OPUS: &str = "A_OPUS";
    /// Vorbis audio codec.
    pub const A_VORBIS: &str = "A_VORBIS";
    /// FLAC audio codec.
    pub const A_FLAC: &str = "A_FLAC";
    /// AAC audio codec (generic).
    pub const A_AAC: &str = "A_AAC";
    /// MPEG Layer 3 (MP3).
    pub const A_MPEG_L3: &str = "A_MPEG/L3";
    /// AC-3 (Dolby Digital).
    pub const A_AC3: &str = "A_AC3";
    /// WavPack.
    pub const A_WAVPACK4: &str = "A_WAVPACK4";
    /// PCM little-endian integer.
    pub const A_PCM_INT_LIT: &str = "A_PCM/INT/LIT";
    /// PCM IEEE float.
    pub const A_PCM_FLOAT_IEEE: &str = "A_PCM/FLOAT/IEEE";
}

/// Check whether a codec identifier denotes audio.
pub fn is_audio_codec(codec_id: &str) -> bool {
    codec_id.starts_with(AUDIO_CODEC_PREFIX)
}

/// Check whether an ID is a direct child of the segment.
///
/// Inside unknown-size elements the only way to tell that a parent has ended
/// is to meet one of these.
pub fn is_top_level(id: u32) -> bool {
    matches!(
        id,
        SEEK_HEAD | INFO | TRACKS | CLUSTER | CUES | CHAPTERS | TAGS | ATTACHMENTS
    )
}

/// Element value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Master element (contains other elements).
    Master,
    /// Unsigned integer.
    UnsignedInt,
    /// Signed integer.
    SignedInt,
    /// Floating point.
    Float,
    /// String (ASCII or UTF-8).
    String,
    /// Binary data.
    Binary,
    /// Date (nanoseconds since 2001-01-01).
    Date,
}

/// Get the type of a known element.
pub fn element_type(id: u32) -> Option<ElementType> {
    match id {
        EBML | SEGMENT | SEEK_HEAD | SEEK | INFO | TRACKS | TRACK_ENTRY | AUDIO | CLUSTER
        | BLOCK_GROUP | BLOCK_ADDITIONS | BLOCK_MORE | CUES | CHAPTERS | EDITION_ENTRY
        | CHAPTER_ATOM | CHAPTER_TRACK | CHAPTER_DISPLAY | TAGS | TAG | TARGETS | SIMPLE_TAG
        | ATTACHMENTS | ATTACHED_FILE => Some(ElementType::Master),

        EBML_VERSION | EBML_READ_VERSION | DOC_TYPE_VERSION | TIMECODE_SCALE | TIMESTAMP
        | POSITION | PREV_SIZE | BLOCK_ADD_ID | BLOCK_DURATION | TRACK_NUMBER | TRACK_UID
        | TRACK_TYPE | DEFAULT_DURATION | CHANNELS | BIT_DEPTH | FILE_UID | EDITION_UID
        | CHAPTER_UID | CHAPTER_TIME_START | CHAPTER_TIME_END | CHAPTER_TRACK_NUMBER
        | TARGET_TYPE_VALUE | TAG_TRACK_UID | TAG_EDITION_UID | TAG_CHAPTER_UID
        | TAG_ATTACHMENT_UID | TAG_DEFAULT | SEEK_POSITION => Some(ElementType::UnsignedInt),

        REFERENCE_BLOCK => Some(ElementType::SignedInt),

        DURATION | SAMPLING_FREQUENCY | OUTPUT_SAMPLING_FREQUENCY => Some(ElementType::Float),

        DOC_TYPE | CODEC_ID | CODEC_NAME | NAME | LANGUAGE | TITLE | MUXING_APP | WRITING_APP
        | SEGMENT_FILENAME | FILE_NAME | FILE_MEDIA_TYPE | FILE_DESCRIPTION | CHAP_STRING
        | CHAP_LANGUAGE | CHAP_COUNTRY | TARGET_TYPE | TAG_NAME | TAG_LANGUAGE | TAG_STRING => {
            Some(ElementType::String)
        }

        SEGMENT_UID | SEEK_ID | CODEC_PRIVATE | SIMPLE_BLOCK | BLOCK | BLOCK_ADDITIONAL
        | FILE_DATA | TAG_BINARY | CRC32 | VOID => Some(ElementType::Binary),

        DATE_UTC => Some(ElementType::Date),

        _ => None,
    }
}

/// Check if an element is a master element (container).
pub fn is_master_element(id: u32) -> bool {
    element_type(id) == Some(ElementType::Master)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_codec() {
        assert!(is_audio_codec(codec_ids::A_VORBIS));
        assert!(is_audio_codec(codec_ids::A_PCM_INT_LIT));
        assert!(!is_audio_codec("V_VP9"));
        assert!(!is_audio_codec("S_TEXT/UTF8"));
        assert!(!is_audio_codec(""));
    }

    #[test]
    fn test_is_top_level() {
        assert!(is_top_level(CLUSTER));
        assert!(is_top_level(TAGS));
        assert!(!is_top_level(SEGMENT));
        assert!(!is_top_level(SIMPLE_BLOCK));
    }

    #[test]
    fn test_element_types() {
        assert_eq!(element_type(EBML), Some(ElementType::Master));
        assert_eq!(element_type(BLOCK_MORE), Some(ElementType::Master));
        assert_eq!(element_type(CHAPTER_TRACK_NUMBER), Some(ElementType::UnsignedInt));
        assert_eq!(element_type(DURATION), Some(ElementType::Float));
        assert_eq!(element_type(TAG_STRING), Some(ElementType::String));
        assert_eq!(element_type(BLOCK_ADDITIONAL), Some(ElementType::Binary));
        assert_eq!(element_type(DATE_UTC), Some(ElementType::Date));
        assert_eq!(element_type(0x7FFF), None);
    }

    #[test]
    fn test_is_master_element() {
        assert!(is_master_element(SEGMENT));
        assert!(is_master_element(CHAPTER_DISPLAY));
        assert!(!is_master_element(TRACK_NUMBER));
        assert!(!is_master_element(CODEC_ID));
    }

    #[test]
    fn test_element_ids() {
        assert_eq!(EBML, 0x1A45DFA3);
        assert_eq!(SEGMENT, 0x18538067);
        assert_eq!(CLUSTER, 0x1F43B675);
        assert_eq!(TAGS, 0x1254C367);
        assert_eq!(BLOCK_ADDITIONS, 0x75A1);
    }
}
