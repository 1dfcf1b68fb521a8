//! Synthetic Matroska files for the integration tests.

#![allow(dead_code)]

use mka_demux::ebml;
use mka_demux::elements::*;

/// Encode one element with a minimal-width size.
pub fn el(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ebml::write_element_id(&mut out, id).unwrap();
    ebml::write_vint(&mut out, payload.len() as u64).unwrap();
    out.extend_from_slice(payload);
    out
}

/// Encode one element with its size written as an 8-byte VINT.
pub fn el_wide(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ebml::write_element_id(&mut out, id).unwrap();
    let (bytes, len) = ebml::encode_vint_width(payload.len() as u64, 8).unwrap();
    out.extend_from_slice(&bytes[..len]);
    out.extend_from_slice(payload);
    out
}

/// Encode an unsigned integer element.
pub fn uint(id: u32, value: u64) -> Vec<u8> {
    let mut payload = Vec::new();
    ebml::write_unsigned_int(&mut payload, value).unwrap();
    el(id, &payload)
}

/// Encode a float element.
pub fn float(id: u32, value: f64) -> Vec<u8> {
    el(id, &value.to_be_bytes())
}

/// Encode a `Tags` element with one `Tag` per record.
pub fn tags(records: &[TagSpec]) -> Vec<u8> {
    let mut payload = Vec::new();
    for record in records {
        let mut targets = Vec::new();
        if record.type_value > 0 {
            targets.extend(uint(TARGET_TYPE_VALUE, record.type_value));
        }
        if record.track_uid > 0 {
            targets.extend(uint(TAG_TRACK_UID, record.track_uid));
        }
        if record.chapter_uid > 0 {
            targets.extend(uint(TAG_CHAPTER_UID, record.chapter_uid));
        }
        let mut tag = el(TARGETS, &targets);
        for (name, value) in &record.fields {
            let mut simple = el(TAG_NAME, name.as_bytes());
            simple.extend(el(TAG_STRING, value.as_bytes()));
            tag.extend(el(SIMPLE_TAG, &simple));
        }
        payload.extend(el(TAG, &tag));
    }
    el(TAGS, &payload)
}

/// One tag record to encode.
#[derive(Debug, Clone, Default)]
pub struct TagSpec {
    pub type_value: u64,
    pub track_uid: u64,
    pub chapter_uid: u64,
    pub fields: Vec<(&'static str, &'static str)>,
}

/// UID of the audio track in every synthetic file.
pub const AUDIO_UID: u64 = 0xA1;

/// A single-audio-track file laid out as clusters of evenly spaced blocks.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub codec: &'static str,
    pub title: &'static str,
    pub clusters: u64,
    pub blocks_per_cluster: u64,
    /// Default duration of one sub-frame, in milliseconds.
    pub frame_ms: u64,
    /// Sub-frames per block; 1 writes `SimpleBlock`s, more writes fixed-laced
    /// `BlockGroup`s.
    pub lacing: u64,
    /// `(uid, start ms, title)`.
    pub chapters: Vec<(u64, u64, &'static str)>,
    /// `(name, MIME type, payload)`.
    pub attachments: Vec<(&'static str, &'static str, Vec<u8>)>,
    /// Raw `Tags` element placed after the clusters.
    pub tags: Vec<u8>,
    pub seek_head: bool,
    /// Add a video track ahead of the audio one.
    pub with_video: bool,
    /// Write the Segment and Cluster sizes as 8-byte VINTs.
    pub wide_sizes: bool,
}

impl Default for AudioFile {
    fn default() -> Self {
        Self {
            codec: "A_TEST",
            title: "Session",
            clusters: 4,
            blocks_per_cluster: 5,
            frame_ms: 100,
            lacing: 1,
            chapters: Vec::new(),
            attachments: Vec::new(),
            tags: Vec::new(),
            seek_head: false,
            with_video: false,
            wide_sizes: false,
        }
    }
}

impl AudioFile {
    /// Length of one cluster in milliseconds.
    pub fn cluster_ms(&self) -> u64 {
        self.blocks_per_cluster * self.lacing * self.frame_ms
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.clusters * self.cluster_ms()
    }

    /// Sub-frames in the whole file.
    pub fn subframe_total(&self) -> u64 {
        self.clusters * self.blocks_per_cluster * self.lacing
    }

    fn info(&self) -> Vec<u8> {
        let mut payload = uint(TIMECODE_SCALE, 1_000_000);
        payload.extend(float(DURATION, self.duration_ms() as f64));
        payload.extend(el(TITLE, self.title.as_bytes()));
        payload.extend(el(MUXING_APP, b"synth"));
        el(INFO, &payload)
    }

    fn tracks(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        if self.with_video {
            let mut video = uint(TRACK_NUMBER, 2);
            video.extend(uint(TRACK_UID, 0xB2));
            video.extend(uint(TRACK_TYPE, TRACK_TYPE_VIDEO as u64));
            video.extend(el(CODEC_ID, b"V_VP8"));
            payload.extend(el(TRACK_ENTRY, &video));
        }
        let mut audio = uint(TRACK_NUMBER, 1);
        audio.extend(uint(TRACK_UID, AUDIO_UID));
        audio.extend(uint(TRACK_TYPE, TRACK_TYPE_AUDIO as u64));
        audio.extend(el(CODEC_ID, self.codec.as_bytes()));
        audio.extend(uint(DEFAULT_DURATION, self.frame_ms * 1_000_000));
        let mut settings = float(SAMPLING_FREQUENCY, 8_000.0);
        settings.extend(uint(CHANNELS, 1));
        audio.extend(el(AUDIO, &settings));
        payload.extend(el(TRACK_ENTRY, &audio));
        el(TRACKS, &payload)
    }

    fn chapters(&self) -> Vec<u8> {
        if self.chapters.is_empty() {
            return Vec::new();
        }
        let mut edition = uint(EDITION_UID, 0xED);
        for &(uid, start_ms, title) in &self.chapters {
            let mut atom = uint(CHAPTER_UID, uid);
            atom.extend(uint(CHAPTER_TIME_START, start_ms * 1_000_000));
            atom.extend(el(CHAPTER_DISPLAY, &el(CHAP_STRING, title.as_bytes())));
            edition.extend(el(CHAPTER_ATOM, &atom));
        }
        el(CHAPTERS, &el(EDITION_ENTRY, &edition))
    }

    fn attachments(&self) -> Vec<u8> {
        if self.attachments.is_empty() {
            return Vec::new();
        }
        let mut payload = Vec::new();
        for (i, (name, mime, data)) in self.attachments.iter().enumerate() {
            let mut file = el(FILE_NAME, name.as_bytes());
            file.extend(el(FILE_MEDIA_TYPE, mime.as_bytes()));
            file.extend(uint(FILE_UID, i as u64 + 1));
            file.extend(el(FILE_DATA, data));
            payload.extend(el(ATTACHED_FILE, &file));
        }
        el(ATTACHMENTS, &payload)
    }

    fn master(&self, id: u32, payload: &[u8]) -> Vec<u8> {
        if self.wide_sizes {
            el_wide(id, payload)
        } else {
            el(id, payload)
        }
    }

    fn block(&self, cluster: u64, block: u64) -> Vec<u8> {
        let relative = (block * self.lacing * self.frame_ms) as i16;
        let mut data = vec![0x81];
        data.extend_from_slice(&relative.to_be_bytes());
        if self.lacing == 1 {
            data.push(0x80);
            data.extend_from_slice(&[cluster as u8, block as u8]);
            return el(SIMPLE_BLOCK, &data);
        }
        data.push(0x04);
        data.push((self.lacing - 1) as u8);
        for sub in 0..self.lacing {
            data.extend_from_slice(&[cluster as u8, block as u8, sub as u8]);
        }
        el(BLOCK_GROUP, &el(BLOCK, &data))
    }

    fn clusters(&self) -> Vec<Vec<u8>> {
        (0..self.clusters)
            .map(|c| {
                let mut payload = uint(TIMESTAMP, c * self.cluster_ms());
                for b in 0..self.blocks_per_cluster {
                    payload.extend(self.block(c, b));
                }
                self.master(CLUSTER, &payload)
            })
            .collect()
    }

    fn seek_head(&self, cluster_offsets: &[u64], tags_offset: Option<u64>) -> Vec<u8> {
        let entry = |id: u32, position: u64| {
            let mut payload = el(SEEK_ID, &id.to_be_bytes());
            payload.extend(el(SEEK_POSITION, &position.to_be_bytes()));
            el(SEEK, &payload)
        };
        let mut payload = Vec::new();
        for &offset in cluster_offsets {
            payload.extend(entry(CLUSTER, offset));
        }
        if let Some(offset) = tags_offset {
            payload.extend(entry(TAGS, offset));
        }
        el(SEEK_HEAD, &payload)
    }

    /// Encode the whole file.
    pub fn build(&self) -> Vec<u8> {
        let mut front = self.info();
        front.extend(self.tracks());
        front.extend(self.chapters());
        front.extend(self.attachments());
        let clusters = self.clusters();

        let body = |head: &[u8]| {
            let mut body = head.to_vec();
            body.extend_from_slice(&front);
            for cluster in &clusters {
                body.extend_from_slice(cluster);
            }
            body.extend_from_slice(&self.tags);
            body
        };

        let segment_body = if self.seek_head {
            // positions are fixed-width, so the head's size does not depend on them
            let has_tags = !self.tags.is_empty();
            let placeholder = self.seek_head(&vec![0; clusters.len()], has_tags.then_some(0));
            let mut offset = (placeholder.len() + front.len()) as u64;
            let mut offsets = Vec::new();
            for cluster in &clusters {
                offsets.push(offset);
                offset += cluster.len() as u64;
            }
            let head = self.seek_head(&offsets, has_tags.then_some(offset));
            body(&head)
        } else {
            body(&[])
        };

        let mut out = el(EBML, &el(DOC_TYPE, b"matroska"));
        out.extend(self.master(SEGMENT, &segment_body));
        out
    }
}
