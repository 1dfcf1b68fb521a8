//! # mka-demux
//!
//! Matroska/WebM audio demuxer with chapter, tag and in-place retagging
//! support.
//!
//! This crate reads the structure of a Matroska segment once, then hands out
//! the compressed frames of one audio track:
//! - **Catalog** - tracks, editions and chapters, with chapter end times
//!   back-filled
//! - **Tags** - tag records folded into flat generic metadata, and written
//!   back in place
//! - **Seeking** - a sparse cluster index refined lazily around the target
//! - **Sequential streams** - clusters read in file order when the stream
//!   cannot seek
//! - **Attachments** - listed at parse time, payloads read on demand
//!
//! ## Example: Decoding a chapter
//!
//! ```no_run
//! use std::io::Cursor;
//! use mka_core::DecoderRegistry;
//! use mka_demux::{MkaInput, OpenMode};
//!
//! let bytes = std::fs::read("live.mka").unwrap();
//! let mut input = MkaInput::open(Cursor::new(bytes), OpenMode::Decode).unwrap();
//!
//! let registry = DecoderRegistry::new();
//! // registry.register("A_VORBIS", |setup| ...);
//! for subsong in 0..input.subsong_count() {
//!     input.select(subsong, &registry).unwrap();
//!     while let Some(chunk) = input.decode_run().unwrap() {
//!         println!("{} samples", chunk.sample_count());
//!     }
//! }
//! ```
//!
//! ## Example: Reading metadata
//!
//! ```no_run
//! use std::fs::File;
//! use mka_demux::{DemuxerConfig, MkaDemuxer};
//!
//! let file = File::open("live.mka").unwrap();
//! let config = DemuxerConfig::default().with_info_only(true);
//! let mut demuxer = MkaDemuxer::open(file, config).unwrap();
//!
//! for n in 0..demuxer.catalog().subsong_count() {
//!     demuxer.set_subsong(n);
//!     let info = demuxer.file_info();
//!     println!("{:?} ({:.1}s)", info.meta_get("TITLE", 0), info.length());
//! }
//! ```
//!
//! ## Segment Structure
//!
//! ```text
//! EBML Header
//! Segment
//! ├── SeekHead (positions of the other elements, possibly nested)
//! ├── Info (timecode scale, duration, title)
//! ├── Tracks
//! │   └── TrackEntry
//! │       └── Audio
//! ├── Chapters
//! │   └── EditionEntry
//! │       └── ChapterAtom (nested atoms are sub-chapters)
//! ├── Attachments
//! ├── Cluster (media data)
//! │   ├── Timestamp
//! │   └── SimpleBlock / BlockGroup
//! └── Tags (often last in the file)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod ebml;
pub mod elements;
pub mod error;
pub mod io;
pub mod reader;
pub mod catalog;
pub mod tags;
pub mod inheritance;
pub mod walker;
pub mod tag_locator;
pub mod cluster_index;
pub mod lacing;
pub mod frame_queue;
pub mod cursor;
pub mod demuxer;
pub mod retag;
pub mod attachments;
pub mod config;
pub mod input;

// Re-export main types
pub use attachments::{Attachment, AttachmentPath};
pub use catalog::{Catalog, Chapter, ChapterDisplay, Edition, SegmentInfo, Track};
pub use cluster_index::{ClusterEntry, ClusterIndex};
pub use config::{DemuxerConfig, InputConfig};
pub use cursor::PlaybackCursor;
pub use demuxer::{MkaDemuxer, SkipPlan};
pub use error::{ErrorKind, MkaError, Result};
pub use frame_queue::AudioFrame;
pub use input::{MkaInput, OpenMode};
pub use io::{Abortable, ByteStream, Sequential};
pub use reader::{Element, ElementReader, Step};
pub use tags::{SimpleTag, TagRecord, TagScope, TagStore};
pub use walker::{parse_segment, ParsedSegment};
