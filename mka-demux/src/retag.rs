//! Tag rendering and in-place rewrite.
//!
//! The whole tag store is rendered into one `Tags` element. Where it lands
//! depends on the block it replaces:
//!
//! - it fits in the old block plus any `Void` right behind it: written in
//!   place, the slack filled with a `Void`;
//! - the old block is the last thing in the file: written over it and the
//!   file cut or grown to match;
//! - otherwise the old block becomes a `Void` and the new one is appended.
//!
//! Whenever the end of the file moves, the segment size is rewritten with the
//! width of the original size field. Nothing is ever written at offset 0.

use std::io::SeekFrom;

use crate::ebml;
use crate::elements::{
    SIMPLE_TAG, TAG, TAGS, TAG_ATTACHMENT_UID, TAG_CHAPTER_UID, TAG_DEFAULT,
    TAG_EDITION_UID, TAG_LANGUAGE, TAG_NAME, TAG_STRING, TAG_TRACK_UID, TARGETS, TARGET_TYPE,
    TARGET_TYPE_VALUE, VOID,
};
use crate::error::{MkaError, Result};
use crate::io::ByteStream;
use crate::reader::{Element, ElementReader};
use crate::tags::{SimpleTag, TagRecord, TagStore};

/// Smallest `Void` element: ID plus a one-byte size.
const MIN_VOID_SIZE: u64 = 2;

fn write_element(out: &mut Vec<u8>, id: u32, payload: &[u8]) -> Result<()> {
    ebml::write_element_id(out, id)?;
    ebml::write_vint(out, payload.len() as u64)?;
    out.extend_from_slice(payload);
    Ok(())
}

fn write_uint_element(out: &mut Vec<u8>, id: u32, value: u64) -> Result<()> {
    let mut payload = Vec::with_capacity(8);
    ebml::write_unsigned_int(&mut payload, value)?;
    write_element(out, id, &payload)
}

fn render_targets(record: &TagRecord) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    let uids = [
        (TAG_TRACK_UID, record.track_uid),
        (TAG_EDITION_UID, record.edition_uid),
        (TAG_CHAPTER_UID, record.chapter_uid),
        (TAG_ATTACHMENT_UID, record.attachment_uid),
    ];
    for (id, uid) in uids {
        if uid != 0 {
            write_uint_element(&mut payload, id, uid)?;
        }
    }
    if record.target_type_value != 0 {
        write_uint_element(&mut payload, TARGET_TYPE_VALUE, record.target_type_value as u64)?;
        if !record.target_type.is_empty() {
            write_element(&mut payload, TARGET_TYPE, record.target_type.as_bytes())?;
        }
    }
    Ok(payload)
}

fn render_simple_tag(tag: &SimpleTag) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    write_element(&mut payload, TAG_NAME, tag.name.as_bytes())?;
    write_element(&mut payload, TAG_STRING, tag.value.as_bytes())?;
    write_element(&mut payload, TAG_LANGUAGE, tag.language.as_bytes())?;
    write_uint_element(&mut payload, TAG_DEFAULT, tag.default_flag as u64)?;
    Ok(payload)
}

/// Render every record of `store` into one `Tags` element.
pub fn render_tags(store: &TagStore) -> Result<Vec<u8>> {
    let mut tags = Vec::new();
    for record in store.records() {
        let mut tag = Vec::new();
        write_element(&mut tag, TARGETS, &render_targets(record)?)?;
        for simple in &record.simple_tags {
            write_element(&mut tag, SIMPLE_TAG, &render_simple_tag(simple)?)?;
        }
        write_element(&mut tags, TAG, &tag)?;
    }

    let mut out = Vec::with_capacity(tags.len() + 12);
    write_element(&mut out, TAGS, &tags)?;
    Ok(out)
}

/// A `Void` element exactly `total` bytes long.
pub fn render_void(total: u64) -> Result<Vec<u8>> {
    for width in 1..=8usize {
        let Some(payload) = total.checked_sub(1 + width as u64) else {
            break;
        };
        if let Ok((size, len)) = ebml::encode_vint_width(payload, width) {
            let mut out = Vec::with_capacity(total as usize);
            ebml::write_element_id(&mut out, VOID)?;
            out.extend_from_slice(&size[..len]);
            out.resize(total as usize, 0);
            return Ok(out);
        }
    }
    Err(MkaError::Other(format!("no void element is {} bytes long", total)))
}

/// Where the new tag block goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Over the old block, padded with a `Void`.
    InPlace,
    /// Over the old block, which ends the file.
    AtEnd,
    /// Appended; the old block, if any, becomes a `Void`.
    Appended,
}

/// Byte-level plan of a tag rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    /// Where the tag block goes.
    pub placement: Placement,
    /// Offset the tag block is written at.
    pub tags_at: u64,
    /// `Void` written as `(offset, total length)`.
    pub void: Option<(u64, u64)>,
    /// File length after the write.
    pub file_size: u64,
    /// New segment payload size, when its header must be rewritten.
    pub segment_size: Option<u64>,
}

/// Work out where a rendered tag block of `tags_len` bytes goes.
///
/// `padding` is the length of a `Void` directly following the old block; it
/// is reclaimed together with the block.
pub fn plan_write(
    segment: &Element,
    tag_block: Option<&Element>,
    padding: u64,
    file_size: u64,
    tags_len: u64,
) -> Result<WritePlan> {
    let old = tag_block
        .and_then(|b| b.end().map(|end| (b.position, end - b.position + padding)));

    let (placement, tags_at, void, new_size) = match old {
        Some((pos, len)) if tags_len == len || tags_len + MIN_VOID_SIZE <= len => {
            let slack = len - tags_len;
            let void = (slack > 0).then_some((pos + tags_len, slack));
            (Placement::InPlace, pos, void, file_size)
        }
        Some((pos, len)) if pos + len == file_size => {
            (Placement::AtEnd, pos, None, pos + tags_len)
        }
        Some((pos, len)) => (
            Placement::Appended,
            file_size,
            Some((pos, len)),
            file_size + tags_len,
        ),
        None => (Placement::Appended, file_size, None, file_size + tags_len),
    };

    if tags_at == 0 || void.is_some_and(|(at, _)| at == 0) {
        return Err(MkaError::WriteRefused(
            "tag block would overwrite the file header".into(),
        ));
    }
    if tags_at < segment.data_start() {
        return Err(MkaError::WriteRefused(format!(
            "tag block at {} lies before the segment payload",
            tags_at
        )));
    }

    let segment_size = match segment.size {
        Some(_) if new_size != file_size || placement != Placement::InPlace => {
            let size = new_size - segment.data_start();
            ebml::encode_vint_width(size, segment.size_width()).map_err(|_| {
                MkaError::WriteRefused(format!(
                    "segment size {} does not fit in {} bytes",
                    size,
                    segment.size_width()
                ))
            })?;
            Some(size)
        }
        _ => None,
    };

    Ok(WritePlan {
        placement,
        tags_at,
        void,
        file_size: new_size,
        segment_size,
    })
}

/// Result of a committed rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The new tag block.
    pub tag_block: Element,
    /// The segment with its possibly updated size.
    pub segment: Element,
}

/// Length of the `Void` that starts where `block` ends, or 0 when there is
/// none inside the segment.
fn trailing_void<S: ByteStream>(
    reader: &mut ElementReader<S>,
    segment: &Element,
    block: &Element,
    file_size: u64,
) -> Result<u64> {
    let Some(end) = block.end() else {
        return Ok(0);
    };
    let limit = segment.end().map_or(file_size, |e| e.min(file_size));
    if end >= limit {
        return Ok(0);
    }
    match reader.read_element_at(end) {
        Ok(Some(void)) if void.id == VOID => Ok(void
            .end()
            .filter(|&void_end| void_end <= limit)
            .map_or(0, |void_end| void_end - end)),
        Ok(_) => Ok(0),
        Err(e @ (MkaError::Io(_) | MkaError::Aborted)) => Err(e),
        Err(_) => Ok(0),
    }
}

/// Render `store` and write it into the stream.
pub fn write_tags<S: ByteStream>(
    reader: &mut ElementReader<S>,
    segment: &Element,
    tag_block: Option<&Element>,
    store: &TagStore,
) -> Result<WriteOutcome> {
    let rendered = render_tags(store)?;
    let file_size = reader.refresh_size()?;
    let padding = match tag_block {
        Some(block) => trailing_void(reader, segment, block, file_size)?,
        None => 0,
    };
    let plan = plan_write(segment, tag_block, padding, file_size, rendered.len() as u64)?;
    tracing::info!(
        placement = ?plan.placement,
        tags_at = plan.tags_at,
        tags_len = rendered.len(),
        padding,
        void = ?plan.void,
        segment_size = ?plan.segment_size,
        "writing tags"
    );

    let refused = |e: MkaError| match e {
        MkaError::Io(io) if io.kind() != std::io::ErrorKind::Interrupted => {
            MkaError::WriteRefused(io.to_string())
        }
        other => other,
    };

    let stream = reader.stream_mut();
    (|| -> Result<()> {
        if let Some((at, len)) = plan.void {
            stream.seek(SeekFrom::Start(at))?;
            stream.write_all(&render_void(len)?)?;
        }
        stream.seek(SeekFrom::Start(plan.tags_at))?;
        stream.write_all(&rendered)?;
        if plan.placement == Placement::AtEnd && plan.file_size < file_size {
            stream.truncate(plan.file_size)?;
        }
        if let Some(size) = plan.segment_size {
            let width = segment.size_width();
            let (bytes, len) = ebml::encode_vint_width(size, width)?;
            stream.seek(SeekFrom::Start(segment.data_start() - width as u64))?;
            stream.write_all(&bytes[..len])?;
        }
        stream.flush()?;
        Ok(())
    })()
    .map_err(refused)?;

    reader.refresh_size()?;
    let tag_block = reader
        .read_element_at(plan.tags_at)?
        .filter(|e| e.id == TAGS)
        .ok_or_else(|| MkaError::WriteRefused("tag block did not read back".into()))?;
    let segment = Element {
        size: plan.segment_size.or(segment.size),
        ..*segment
    };
    Ok(WriteOutcome { tag_block, segment })
}
