//! Frame reassembly.
//!
//! A cluster is read in one go: its timestamp, then every `SimpleBlock` and
//! `BlockGroup`. Blocks of the selected track become [`AudioFrame`]s, laced
//! sub-frames kept apart. The frames of one cluster are queued together and
//! handed out one by one.

use std::collections::VecDeque;

use crate::elements::{
    BLOCK, BLOCK_ADDITIONAL, BLOCK_ADDITIONS, BLOCK_ADD_ID, BLOCK_DURATION, BLOCK_GROUP,
    BLOCK_MORE, CLUSTER, SIMPLE_BLOCK, TIMESTAMP,
};
use crate::error::{MkaError, Result};
use crate::io::ByteStream;
use crate::lacing;
use crate::reader::{Element, ElementReader};

/// One block of the selected track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFrame {
    /// Presentation time in nanoseconds.
    pub timecode: u64,
    /// Duration in nanoseconds, 0 when unknown.
    pub duration: u64,
    /// Sub-frame payloads, one per laced frame.
    pub data: Vec<Vec<u8>>,
    /// `BlockAddID`, 0 without block additions.
    pub add_id: u64,
    /// `BlockAdditional` payload.
    pub additional: Vec<u8>,
}

impl AudioFrame {
    /// Number of sub-frames.
    pub fn subframe_count(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries block-addition data.
    pub fn has_additional(&self) -> bool {
        self.add_id > 0 && !self.additional.is_empty()
    }
}

/// What a block needs to become a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFilter {
    /// Track number blocks must carry.
    pub track_number: u64,
    /// Default frame duration of the track, in nanoseconds.
    pub default_duration: u64,
    /// Nanoseconds per timecode unit.
    pub timecode_scale: u64,
}

impl BlockFilter {
    fn frame_duration(&self, subframes: usize) -> u64 {
        if subframes > 1 {
            self.default_duration.saturating_mul(subframes as u64)
        } else {
            self.default_duration
        }
    }
}

/// Frames read from one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterFrames {
    /// Cluster timestamp in nanoseconds, if the cluster declared one.
    pub timecode: Option<u64>,
    /// Frames of the selected track in file order.
    pub frames: Vec<AudioFrame>,
}

/// Read a cluster the reader has just returned.
///
/// On return the cluster level has been left. For an unknown-size cluster the
/// element that closed it is held back by the reader.
pub fn read_cluster<S: ByteStream>(
    reader: &mut ElementReader<S>,
    cluster: &Element,
    filter: &BlockFilter,
) -> Result<ClusterFrames> {
    if cluster.id != CLUSTER {
        return Err(MkaError::MissingElement(format!(
            "cluster at offset {}",
            cluster.position
        )));
    }

    let depth = reader.enter(cluster)?;
    let mut raw_timecode = 0u64;
    let mut out = ClusterFrames::default();

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            TIMESTAMP => {
                raw_timecode = reader.read_uint(&child)?;
                out.timecode = Some(raw_timecode.saturating_mul(filter.timecode_scale));
            }
            SIMPLE_BLOCK => {
                let data = reader.read_bytes(&child)?;
                if let Some(frame) = frame_from_block(&data, filter, raw_timecode)? {
                    push_frame(&mut out.frames, frame);
                }
            }
            BLOCK_GROUP => {
                let inner = reader.enter(&child)?;
                if let Some(frame) = read_block_group(reader, inner, filter, raw_timecode)? {
                    push_frame(&mut out.frames, frame);
                }
            }
            _ => reader.skip(&child)?,
        }
    }

    tracing::trace!(
        position = cluster.position,
        timecode = ?out.timecode,
        frames = out.frames.len(),
        "cluster read"
    );
    Ok(out)
}

/// Read the timestamp of the cluster at `position`, in nanoseconds.
///
/// Only the header and the `Timestamp` child are decoded; the cursor is
/// restored afterwards.
pub fn probe_cluster_timecode<S: ByteStream>(
    reader: &mut ElementReader<S>,
    position: u64,
    timecode_scale: u64,
) -> Result<u64> {
    let probed = reader.detached(position, |r, cluster| {
        if cluster.id != CLUSTER {
            return Ok(None);
        }
        let depth = r.enter(&cluster)?;
        while let Some(child) = r.next_child(depth)? {
            match child.id {
                TIMESTAMP => return Ok(Some(r.read_uint(&child)?)),
                SIMPLE_BLOCK | BLOCK_GROUP => break,
                _ => r.skip(&child)?,
            }
        }
        Ok(None)
    })?;

    probed
        .flatten()
        .map(|raw| raw.saturating_mul(timecode_scale))
        .ok_or_else(|| {
            MkaError::MissingElement(format!("cluster timestamp at offset {}", position))
        })
}

fn read_block_group<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
    filter: &BlockFilter,
    cluster_timecode: u64,
) -> Result<Option<AudioFrame>> {
    let mut frame = None;
    let mut block_duration = None;
    let mut add_id = None;
    let mut additional = None;

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            BLOCK => {
                let data = reader.read_bytes(&child)?;
                frame = frame_from_block(&data, filter, cluster_timecode)?;
            }
            BLOCK_DURATION => {
                block_duration =
                    Some(reader.read_uint(&child)?.saturating_mul(filter.timecode_scale));
            }
            BLOCK_ADDITIONS => {
                let additions = reader.enter(&child)?;
                while let Some(more) = reader.next_child(additions)? {
                    if more.id != BLOCK_MORE {
                        reader.skip(&more)?;
                        continue;
                    }
                    let inner = reader.enter(&more)?;
                    while let Some(field) = reader.next_child(inner)? {
                        match field.id {
                            BLOCK_ADD_ID => add_id = Some(reader.read_uint(&field)?),
                            BLOCK_ADDITIONAL => additional = Some(reader.read_bytes(&field)?),
                            _ => reader.skip(&field)?,
                        }
                    }
                }
            }
            _ => reader.skip(&child)?,
        }
    }

    let Some(mut frame) = frame else {
        return Ok(None);
    };
    if let Some(duration) = block_duration {
        frame.duration = duration;
    }
    if let Some(data) = additional {
        frame.add_id = add_id.filter(|&id| id != 0).unwrap_or(1);
        frame.additional = data;
    } else if let Some(id) = add_id {
        frame.add_id = id;
    }
    Ok(Some(frame))
}

/// Build a frame from a block payload, or `None` when the block belongs to
/// another track or carries no frames.
pub fn frame_from_block(
    data: &[u8],
    filter: &BlockFilter,
    cluster_timecode: u64,
) -> Result<Option<AudioFrame>> {
    if lacing::block_track_number(data)? != filter.track_number {
        return Ok(None);
    }
    let block = lacing::parse_block(data)?;
    if block.frames.is_empty() {
        return Ok(None);
    }

    let raw = (cluster_timecode as i64).saturating_add(block.relative_timecode as i64).max(0) as u64;
    Ok(Some(AudioFrame {
        timecode: raw.saturating_mul(filter.timecode_scale),
        duration: filter.frame_duration(block.frames.len()),
        data: block.frames,
        add_id: 0,
        additional: Vec::new(),
    }))
}

/// Append a frame, giving the previous one a duration if it has none.
fn push_frame(frames: &mut Vec<AudioFrame>, frame: AudioFrame) {
    if let Some(prev) = frames.last_mut() {
        if prev.duration == 0 {
            prev.duration = frame.timecode.saturating_sub(prev.timecode);
        }
    }
    frames.push(frame);
}

/// Frames waiting to be handed out.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    frames: VecDeque<AudioFrame>,
}

impl FrameQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the frames of one cluster.
    pub fn extend(&mut self, frames: Vec<AudioFrame>) {
        self.frames.extend(frames);
    }

    /// Take the oldest frame.
    pub fn pop(&mut self) -> Option<AudioFrame> {
        self.frames.pop_front()
    }

    /// The oldest frame.
    pub fn front(&self) -> Option<&AudioFrame> {
        self.frames.front()
    }

    /// Drop every queued frame.
    pub fn flush(&mut self) {
        self.frames.clear();
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
