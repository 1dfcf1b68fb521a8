//! Structural parse of a Matroska segment.
//!
//! The walker reads the EBML head, enters the segment and visits its
//! children one at a time: `SeekHead`, `Info`, `Tracks`, `Chapters`, `Tags`
//! and `Attachments` are decoded, everything else is skipped. The walk stops
//! at the first cluster unless the cluster index has to be built by scanning,
//! which happens when the seek head lists no clusters.

use crate::attachments::{self, Attachment};
use crate::catalog::{
    Catalog, Chapter, ChapterDisplay, Edition, SegmentInfo, Track, DEFAULT_TIMECODE_SCALE,
    EXCLUDED_TRACK_NUMBER,
};
use crate::cluster_index::ClusterIndex;
use crate::config::DemuxerConfig;
use crate::ebml;
use crate::elements::*;
use crate::error::{MkaError, Result};
use crate::io::ByteStream;
use crate::reader::{Element, ElementReader};
use crate::tag_locator;
use crate::tags::{SimpleTag, TagRecord, TagStore, TARGET_TYPE_ALBUM};

/// Doc types accepted in the EBML head.
const DOC_TYPES: &[&str] = &["matroska", "webm"];

/// Everything learned from the structural parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSegment {
    /// Doc type from the EBML head.
    pub doc_type: String,
    /// The segment element.
    pub segment: Element,
    /// Tracks, editions, chapters and segment info.
    pub catalog: Catalog,
    /// Tag records.
    pub tags: TagStore,
    /// Located attachments.
    pub attachments: Vec<Attachment>,
    /// Cluster positions, timecodes unresolved.
    pub cluster_index: ClusterIndex,
    /// The `Tags` element the records were read from.
    pub tag_block: Option<Element>,
    /// Position of the first cluster met by the walk.
    pub first_cluster: Option<u64>,
}

/// Seek head targets other than clusters.
#[derive(Debug, Default)]
struct SeekTargets {
    tags: Option<u64>,
    visited: Vec<u64>,
}

/// Parse the head and segment structure.
///
/// On return the reader has the segment entered. A seekable stream is
/// positioned at the first cluster; on a sequential one the first cluster is
/// held back and returned by the next read at segment level.
pub fn parse_segment<S: ByteStream>(
    reader: &mut ElementReader<S>,
    config: &DemuxerConfig,
) -> Result<ParsedSegment> {
    let doc_type = parse_ebml_head(reader)?;

    let segment = match reader.read_header() {
        Ok(Some(element)) if element.id == SEGMENT => element,
        Ok(_) => return Err(MkaError::MissingSegment),
        Err(e) if e.is_aborted() => return Err(e),
        Err(_) => return Err(MkaError::MissingSegment),
    };
    tracing::debug!(
        position = segment.position,
        size = ?segment.size,
        doc_type = %doc_type,
        "segment found"
    );

    let seekable = reader.is_seekable();
    let mut out = ParsedSegment {
        doc_type,
        segment,
        catalog: Catalog::new(),
        tags: TagStore::new(),
        attachments: Vec::new(),
        cluster_index: ClusterIndex::new(),
        tag_block: None,
        first_cluster: None,
    };
    let mut targets = SeekTargets::default();
    let mut scanning_clusters = false;

    let segment_depth = reader.enter(&segment)?;
    while let Some(child) = reader.next_child(segment_depth)? {
        match child.id {
            SEEK_HEAD if seekable && !targets.visited.contains(&child.position) => {
                parse_seek_head(
                    reader,
                    &child,
                    segment.data_start(),
                    config.info_only,
                    &mut out.cluster_index,
                    &mut targets,
                )?;
            }
            INFO => {
                let depth = reader.enter(&child)?;
                out.catalog.info = parse_info(reader, depth)?;
            }
            TRACKS => {
                let depth = reader.enter(&child)?;
                out.catalog.tracks = parse_tracks(reader, depth)?;
            }
            CHAPTERS => {
                let depth = reader.enter(&child)?;
                parse_chapters(reader, depth, &mut out.catalog)?;
            }
            TAGS => {
                let depth = reader.enter(&child)?;
                for record in parse_tags(reader, depth)? {
                    out.tags.push(record);
                }
                out.tag_block = Some(child);
            }
            ATTACHMENTS => {
                let depth = reader.enter(&child)?;
                out.attachments
                    .extend(attachments::parse_attachments(reader, depth)?);
            }
            CLUSTER => {
                if out.first_cluster.is_none() {
                    out.first_cluster = Some(child.position);
                    scanning_clusters =
                        seekable && !config.info_only && out.cluster_index.is_empty();
                    if scanning_clusters {
                        tracing::debug!("seek head lists no clusters, indexing by scan");
                    }
                }
                if scanning_clusters {
                    out.cluster_index.push(child.position);
                } else if config.break_at_clusters {
                    if !seekable {
                        reader.push_back(child);
                    }
                    break;
                }
                reader.skip(&child)?;
            }
            _ => reader.skip(&child)?,
        }
    }

    if out.tag_block.is_none() {
        if let Some(position) = targets.tags {
            load_tags_at(reader, position, &mut out)?;
        }
    }
    if out.tag_block.is_none() && seekable && config.tag_scan_window > 0 {
        match tag_locator::locate_tags(reader, config.tag_scan_window) {
            Ok(Some(element)) => load_tags_at(reader, element.position, &mut out)?,
            Ok(None) => {}
            Err(e) if e.is_aborted() => return Err(e),
            Err(e) => tracing::warn!(error = %e, "tag scan failed"),
        }
    }

    out.catalog.fix_chapter_end_times();
    out.cluster_index.finalize();

    // Sequential streams stay where the walk stopped, with the first cluster
    // held back for the frame queue.
    if seekable {
        if reader.depth() == 0 {
            reader.enter(&segment)?;
        }
        if let Some(position) = out.first_cluster {
            reader.reset_to(1);
            reader.seek(position)?;
        }
    }

    tracing::info!(
        tracks = out.catalog.tracks.len(),
        editions = out.catalog.editions.len(),
        chapters = out.catalog.chapters.len(),
        tags = out.tags.len(),
        attachments = out.attachments.len(),
        clusters = out.cluster_index.len(),
        "segment parsed"
    );
    Ok(out)
}

/// Read the EBML head and return its doc type.
fn parse_ebml_head<S: ByteStream>(reader: &mut ElementReader<S>) -> Result<String> {
    let head = match reader.read_header() {
        Ok(Some(element)) if element.id == EBML => element,
        Ok(_) => {
            return Err(MkaError::InvalidEbmlHeader(
                "Missing EBML header element".to_string(),
            ))
        }
        Err(e) if e.is_aborted() => return Err(e),
        Err(e) => return Err(MkaError::InvalidEbmlHeader(e.to_string())),
    };
    let end = head.end().ok_or_else(|| {
        MkaError::InvalidEbmlHeader("EBML header with unknown size".to_string())
    })?;

    let mut doc_type = DOC_TYPES[0].to_string();
    let result = (|| -> Result<()> {
        let depth = reader.enter(&head)?;
        while let Some(child) = reader.next_child(depth)? {
            match child.id {
                DOC_TYPE => doc_type = reader.read_string(&child)?,
                _ => reader.skip(&child)?,
            }
        }
        reader.seek(end)
    })();
    match result {
        Ok(()) => {}
        Err(e) if e.is_aborted() => return Err(e),
        Err(e) => return Err(MkaError::InvalidEbmlHeader(e.to_string())),
    }

    if !DOC_TYPES.contains(&doc_type.as_str()) {
        return Err(MkaError::InvalidEbmlHeader(format!(
            "Unknown doc type: {}",
            doc_type
        )));
    }
    Ok(doc_type)
}

/// Collect cluster positions and the tags pointer from a seek head.
///
/// Nested seek heads are followed right away; each one is visited once.
fn parse_seek_head<S: ByteStream>(
    reader: &mut ElementReader<S>,
    head: &Element,
    segment_start: u64,
    info_only: bool,
    clusters: &mut ClusterIndex,
    targets: &mut SeekTargets,
) -> Result<()> {
    if !targets.visited.contains(&head.position) {
        targets.visited.push(head.position);
    }
    let depth = reader.enter(head)?;

    while let Some(child) = reader.next_child(depth)? {
        if info_only && !clusters.is_empty() {
            break;
        }
        if child.id != SEEK {
            reader.skip(&child)?;
            continue;
        }

        let inner = reader.enter(&child)?;
        let mut id = None;
        let mut position = None;
        while let Some(entry) = reader.next_child(inner)? {
            match entry.id {
                SEEK_ID => id = ebml::element_id_from_bytes(&reader.read_bytes(&entry)?),
                SEEK_POSITION => position = Some(reader.read_uint(&entry)?),
                _ => reader.skip(&entry)?,
            }
        }
        let (Some(id), Some(position)) = (id, position) else {
            continue;
        };
        let absolute = segment_start.saturating_add(position);

        match id {
            CLUSTER => {
                clusters.push(absolute);
            }
            TAGS => {
                targets.tags.get_or_insert(absolute);
            }
            SEEK_HEAD if !targets.visited.contains(&absolute) => {
                targets.visited.push(absolute);
                tracing::debug!(position = absolute, "following nested seek head");
                let nested = reader.detached(absolute, |r, element| {
                    if element.id == SEEK_HEAD {
                        parse_seek_head(r, &element, segment_start, info_only, clusters, targets)
                    } else {
                        Ok(())
                    }
                });
                match nested {
                    Ok(_) => {}
                    Err(e) if e.is_aborted() => return Err(e),
                    Err(e) => tracing::warn!(position = absolute, error = %e, "bad nested seek head"),
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_info<S: ByteStream>(reader: &mut ElementReader<S>, depth: usize) -> Result<SegmentInfo> {
    let mut info = SegmentInfo::default();
    let mut raw_duration = None;

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            TIMECODE_SCALE => {
                info.timecode_scale = match reader.read_uint(&child)? {
                    0 => DEFAULT_TIMECODE_SCALE,
                    scale => scale,
                };
            }
            DURATION => raw_duration = Some(reader.read_float(&child)?),
            DATE_UTC => info.date_utc = Some(reader.read_int(&child)?),
            SEGMENT_FILENAME => info.filename = reader.read_string(&child)?,
            MUXING_APP => info.muxing_app = reader.read_string(&child)?,
            WRITING_APP => info.writing_app = reader.read_string(&child)?,
            TITLE => info.title = reader.read_string(&child)?,
            _ => reader.skip(&child)?,
        }
    }

    if let Some(duration) = raw_duration.filter(|d| d.is_finite()) {
        info.duration = (duration * info.timecode_scale as f64).max(0.0) as u64;
    }
    Ok(info)
}

fn parse_tracks<S: ByteStream>(reader: &mut ElementReader<S>, depth: usize) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();
    while let Some(child) = reader.next_child(depth)? {
        if child.id != TRACK_ENTRY {
            reader.skip(&child)?;
            continue;
        }
        let inner = reader.enter(&child)?;
        let track = parse_track_entry(reader, inner)?;
        if track.is_excluded() {
            tracing::debug!(uid = track.uid, codec = %track.codec_id, "non-audio track excluded");
            continue;
        }
        tracks.push(track);
    }
    Ok(tracks)
}

fn parse_track_entry<S: ByteStream>(reader: &mut ElementReader<S>, depth: usize) -> Result<Track> {
    let mut track = Track::default();
    let mut is_audio = true;

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            TRACK_NUMBER => {
                track.number =
                    u16::try_from(reader.read_uint(&child)?).unwrap_or(EXCLUDED_TRACK_NUMBER);
            }
            TRACK_UID => track.uid = reader.read_uint(&child)?,
            TRACK_TYPE => is_audio = reader.read_uint(&child)? == TRACK_TYPE_AUDIO as u64,
            DEFAULT_DURATION => track.default_duration = reader.read_uint(&child)?,
            CODEC_ID => track.codec_id = reader.read_string(&child)?,
            CODEC_PRIVATE => track.codec_private = reader.read_bytes(&child)?,
            LANGUAGE => track.language = reader.read_string(&child)?,
            NAME => track.name = reader.read_string(&child)?,
            AUDIO => {
                let inner = reader.enter(&child)?;
                parse_audio_settings(reader, inner, &mut track)?;
            }
            _ => reader.skip(&child)?,
        }
    }

    if !is_audio {
        track.number = EXCLUDED_TRACK_NUMBER;
    }
    Ok(track)
}

fn parse_audio_settings<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
    track: &mut Track,
) -> Result<()> {
    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            SAMPLING_FREQUENCY => track.sample_rate = reader.read_float(&child)?,
            OUTPUT_SAMPLING_FREQUENCY => track.output_sample_rate = reader.read_float(&child)?,
            CHANNELS => track.channels = reader.read_uint(&child)? as u32,
            BIT_DEPTH => track.bits_per_sample = reader.read_uint(&child)? as u32,
            _ => reader.skip(&child)?,
        }
    }
    Ok(())
}

fn parse_chapters<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
    catalog: &mut Catalog,
) -> Result<()> {
    while let Some(child) = reader.next_child(depth)? {
        if child.id != EDITION_ENTRY {
            reader.skip(&child)?;
            continue;
        }

        let inner = reader.enter(&child)?;
        let mut edition = Edition::default();
        while let Some(entry) = reader.next_child(inner)? {
            match entry.id {
                EDITION_UID => edition.uid = reader.read_uint(&entry)?,
                CHAPTER_ATOM => {
                    let atom = reader.enter(&entry)?;
                    let chapter = parse_chapter_atom(reader, atom, catalog)?;
                    let uid = chapter.uid;
                    if !catalog.add_chapter(chapter) {
                        tracing::debug!(uid, "chapter dropped");
                    }
                }
                _ => reader.skip(&entry)?,
            }
        }
        let uid = edition.uid;
        if !catalog.add_edition(edition) {
            tracing::debug!(uid, "edition dropped");
        }
    }
    Ok(())
}

fn parse_chapter_atom<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
    catalog: &Catalog,
) -> Result<Chapter> {
    let mut chapter = Chapter::default();

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            CHAPTER_UID => chapter.uid = reader.read_uint(&child)?,
            CHAPTER_TIME_START => chapter.time_start = reader.read_uint(&child)?,
            CHAPTER_TIME_END => chapter.time_end = reader.read_uint(&child)?,
            CHAPTER_TRACK => {
                let inner = reader.enter(&child)?;
                while let Some(track) = reader.next_child(inner)? {
                    match track.id {
                        CHAPTER_TRACK_NUMBER => chapter.tracks.push(reader.read_uint(&track)?),
                        _ => reader.skip(&track)?,
                    }
                }
            }
            CHAPTER_DISPLAY => {
                let inner = reader.enter(&child)?;
                let display = parse_chapter_display(reader, inner)?;
                if !display.text.is_empty() {
                    chapter.displays.push(display);
                }
            }
            CHAPTER_ATOM => {
                let inner = reader.enter(&child)?;
                let sub = parse_chapter_atom(reader, inner, catalog)?;
                let duplicate = catalog.has_chapter(sub.uid)
                    || chapter.sub_chapters.iter().any(|c| c.uid == sub.uid);
                if sub.uid != 0 && !duplicate {
                    chapter.sub_chapters.push(sub);
                }
            }
            _ => reader.skip(&child)?,
        }
    }
    Ok(chapter)
}

fn parse_chapter_display<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
) -> Result<ChapterDisplay> {
    let mut display = ChapterDisplay::default();
    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            CHAP_STRING => display.text = reader.read_string(&child)?,
            CHAP_LANGUAGE => display.language = reader.read_string(&child)?,
            CHAP_COUNTRY => display.country = reader.read_string(&child)?,
            _ => reader.skip(&child)?,
        }
    }
    Ok(display)
}

/// Parse the children of a `Tags` element the reader has entered.
pub(crate) fn parse_tags<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
) -> Result<Vec<TagRecord>> {
    let mut records = Vec::new();
    while let Some(child) = reader.next_child(depth)? {
        if child.id != TAG {
            reader.skip(&child)?;
            continue;
        }
        let inner = reader.enter(&child)?;
        records.push(parse_tag(reader, inner)?);
    }
    Ok(records)
}

fn parse_tag<S: ByteStream>(reader: &mut ElementReader<S>, depth: usize) -> Result<TagRecord> {
    let mut record = TagRecord {
        target_type_value: TARGET_TYPE_ALBUM,
        ..TagRecord::new()
    };

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            TARGETS => {
                let inner = reader.enter(&child)?;
                while let Some(target) = reader.next_child(inner)? {
                    match target.id {
                        TAG_TRACK_UID => record.track_uid = reader.read_uint(&target)?,
                        TAG_EDITION_UID => record.edition_uid = reader.read_uint(&target)?,
                        TAG_CHAPTER_UID => record.chapter_uid = reader.read_uint(&target)?,
                        TAG_ATTACHMENT_UID => record.attachment_uid = reader.read_uint(&target)?,
                        TARGET_TYPE_VALUE => {
                            record.target_type_value = reader.read_uint(&target)? as u32
                        }
                        TARGET_TYPE => record.target_type = reader.read_string(&target)?,
                        _ => reader.skip(&target)?,
                    }
                }
            }
            SIMPLE_TAG => {
                let inner = reader.enter(&child)?;
                record.simple_tags.push(parse_simple_tag(reader, inner)?);
            }
            _ => reader.skip(&child)?,
        }
    }
    Ok(record)
}

fn parse_simple_tag<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
) -> Result<SimpleTag> {
    let mut tag = SimpleTag::default();
    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            TAG_NAME => tag.name = reader.read_string(&child)?.to_uppercase(),
            TAG_STRING => tag.value = reader.read_string(&child)?,
            TAG_LANGUAGE => tag.language = reader.read_string(&child)?,
            TAG_DEFAULT => tag.default_flag = reader.read_uint(&child)? != 0,
            // nested simple tags are not supported
            _ => reader.skip(&child)?,
        }
    }
    Ok(tag)
}

/// Parse the `Tags` element at `position` into `out`.
///
/// Failures are logged and leave `out` untouched; only an abort propagates.
fn load_tags_at<S: ByteStream>(
    reader: &mut ElementReader<S>,
    position: u64,
    out: &mut ParsedSegment,
) -> Result<()> {
    let loaded = reader.detached(position, |r, element| {
        if element.id != TAGS {
            return Ok(None);
        }
        let depth = r.enter(&element)?;
        Ok(Some((element, parse_tags(r, depth)?)))
    });

    match loaded {
        Ok(Some(Some((element, records)))) => {
            tracing::debug!(position, records = records.len(), "tags loaded");
            for record in records {
                out.tags.push(record);
            }
            out.tag_block = Some(element);
        }
        Ok(_) => tracing::debug!(position, "no tags element at position"),
        Err(e) if e.is_aborted() => return Err(e),
        Err(e) => tracing::warn!(position, error = %e, "failed to read tags"),
    }
    Ok(())
}
