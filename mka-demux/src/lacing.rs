//! Block header and lacing.
//!
//! A `Block` or `SimpleBlock` payload starts with the track number (a VINT),
//! a signed 16-bit timecode relative to the cluster, and a flags byte whose
//! bits 1-2 select the lacing scheme. Laced blocks then carry a frame count
//! and, for Xiph and EBML lacing, the sizes of all frames but the last.

use std::io::Cursor;

use crate::ebml;
use crate::error::{MkaError, Result};

/// No lacing.
pub const NO_LACING: u8 = 0;
/// Xiph lacing (255-continued sizes).
pub const XIPH: u8 = 1;
/// Fixed-size lacing.
pub const FIXED: u8 = 2;
/// EBML lacing (first size as VINT, then signed deltas).
pub const EBML: u8 = 3;

const KEYFRAME_FLAG: u8 = 0x80;

/// A decoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Track number the block belongs to.
    pub track_number: u64,
    /// Timecode relative to the cluster, in timecode-scale units.
    pub relative_timecode: i16,
    /// Raw flags byte.
    pub flags: u8,
    /// Frame payloads; more than one when laced.
    pub frames: Vec<Vec<u8>>,
}

impl Block {
    /// Lacing scheme from the flags.
    pub fn lacing(&self) -> u8 {
        (self.flags >> 1) & 0x03
    }

    /// Keyframe flag (meaningful for `SimpleBlock` only).
    pub fn is_keyframe(&self) -> bool {
        self.flags & KEYFRAME_FLAG != 0
    }

    /// Whether the block carries laced frames.
    pub fn is_laced(&self) -> bool {
        self.lacing() != NO_LACING
    }
}

/// Read only the track number of a block payload.
pub fn block_track_number(data: &[u8]) -> Result<u64> {
    ebml::decode_vint(data)
        .map(|(number, _)| number)
        .ok_or_else(|| MkaError::InvalidBlock("truncated track number".to_string()))
}

/// Parse a `Block` or `SimpleBlock` payload.
pub fn parse_block(data: &[u8]) -> Result<Block> {
    let (track_number, pos) = ebml::decode_vint(data)
        .ok_or_else(|| MkaError::InvalidBlock("truncated track number".to_string()))?;
    if data.len() < pos + 3 {
        return Err(MkaError::InvalidBlock(format!(
            "block header needs {} bytes, got {}",
            pos + 3,
            data.len()
        )));
    }
    let relative_timecode = i16::from_be_bytes([data[pos], data[pos + 1]]);
    let flags = data[pos + 2];
    let header_size = pos + 3;
    let lacing = (flags >> 1) & 0x03;

    let frames = if lacing == NO_LACING {
        vec![data[header_size..].to_vec()]
    } else {
        parse_laced_frames(data, header_size, lacing)?
    };

    Ok(Block {
        track_number,
        relative_timecode,
        flags,
        frames,
    })
}

/// Parse frame sizes from Xiph-style lacing.
///
/// Each size but the last is a run of 255 bytes closed by a byte below 255.
/// Returns the sizes and the number of bytes they occupied.
pub fn parse_xiph_lacing(data: &[u8], num_frames: usize) -> Result<(Vec<usize>, usize)> {
    let mut frame_sizes = Vec::with_capacity(num_frames);
    let mut offset = 0;

    for _ in 0..num_frames.saturating_sub(1) {
        let mut size = 0usize;
        loop {
            let Some(&byte) = data.get(offset) else {
                return Err(MkaError::InvalidLacing(
                    "Xiph lacing: unexpected end of data".to_string(),
                ));
            };
            offset += 1;
            size += byte as usize;
            if byte < 255 {
                break;
            }
        }
        frame_sizes.push(size);
    }

    Ok((frame_sizes, offset))
}

/// Parse frame sizes from EBML-style lacing.
///
/// The first size is an unsigned VINT; the following ones are signed deltas
/// from the previous size. The last frame's size is implied.
pub fn parse_ebml_lacing(data: &[u8], num_frames: usize) -> Result<(Vec<usize>, usize)> {
    let mut frame_sizes = Vec::with_capacity(num_frames);
    if num_frames < 2 {
        return Ok((frame_sizes, 0));
    }
    let mut cursor = Cursor::new(data);

    let (first_size, _) = ebml::read_vint(&mut cursor)
        .map_err(|_| MkaError::InvalidLacing("EBML lacing: bad first size".to_string()))?;
    frame_sizes.push(first_size as usize);

    let mut prev_size = first_size as i64;
    for _ in 1..num_frames - 1 {
        let (raw_delta, vint_len) = ebml::read_vint(&mut cursor)
            .map_err(|_| MkaError::InvalidLacing("EBML lacing: bad size delta".to_string()))?;
        prev_size = prev_size
            .checked_add(vint_to_signed_delta(raw_delta, vint_len))
            .ok_or_else(|| MkaError::InvalidLacing("EBML lacing: frame size overflow".to_string()))?;
        if prev_size < 0 {
            return Err(MkaError::InvalidLacing(
                "EBML lacing: negative frame size".to_string(),
            ));
        }
        frame_sizes.push(prev_size as usize);
    }

    Ok((frame_sizes, cursor.position() as usize))
}

/// Convert a biased VINT value to a signed delta.
///
/// The bias is `2^(7*length - 1) - 1`.
pub fn vint_to_signed_delta(value: u64, vint_length: usize) -> i64 {
    let bits = 7 * vint_length - 1;
    let bias = (1_i64 << bits) - 1;
    (value as i64) - bias
}

/// Frame sizes for fixed-size lacing.
pub fn parse_fixed_lacing(total_data_size: usize, num_frames: usize) -> Result<Vec<usize>> {
    if num_frames == 0 || total_data_size % num_frames != 0 {
        return Err(MkaError::InvalidLacing(format!(
            "Fixed lacing: data size {} not evenly divisible by {} frames",
            total_data_size, num_frames
        )));
    }
    Ok(vec![total_data_size / num_frames; num_frames])
}

/// Split the laced payload following the block header.
pub fn parse_laced_frames(data: &[u8], header_size: usize, lacing: u8) -> Result<Vec<Vec<u8>>> {
    let Some(&count) = data.get(header_size) else {
        return Err(MkaError::InvalidLacing(
            "No data after block header".to_string(),
        ));
    };
    let num_frames = count as usize + 1;
    let lacing_data_start = header_size + 1;
    let frame_data = &data[lacing_data_start..];

    let (mut sizes, sizes_len) = match lacing {
        XIPH => parse_xiph_lacing(frame_data, num_frames)?,
        EBML => parse_ebml_lacing(frame_data, num_frames)?,
        FIXED => {
            let sizes = parse_fixed_lacing(frame_data.len(), num_frames)?;
            return extract_frames(frame_data, &sizes);
        }
        other => {
            return Err(MkaError::InvalidLacing(format!(
                "Unknown lacing type: {}",
                other
            )))
        }
    };

    let consumed = sizes
        .iter()
        .try_fold(sizes_len, |total, &size| total.checked_add(size))
        .ok_or_else(|| MkaError::InvalidLacing("laced frame sizes overflow".to_string()))?;
    if consumed > frame_data.len() {
        return Err(MkaError::InvalidLacing(format!(
            "laced sizes cover {} bytes but only {} are present",
            consumed,
            frame_data.len()
        )));
    }
    sizes.push(frame_data.len() - consumed);
    extract_frames(&frame_data[sizes_len..], &sizes)
}

/// Cut `data` into consecutive frames of the given sizes.
pub fn extract_frames(data: &[u8], sizes: &[usize]) -> Result<Vec<Vec<u8>>> {
    let mut frames = Vec::with_capacity(sizes.len());
    let mut offset = 0;

    for &size in sizes {
        if offset + size > data.len() {
            return Err(MkaError::InvalidLacing(format!(
                "Frame size {} exceeds remaining data {} at offset {}",
                size,
                data.len() - offset,
                offset
            )));
        }
        frames.push(data[offset..offset + size].to_vec());
        offset += size;
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlaced_block() {
        // track 1, timecode -2, keyframe
        let data = [0x81, 0xFF, 0xFE, 0x80, 0xAA, 0xBB];
        let block = parse_block(&data).unwrap();
        assert_eq!(block.track_number, 1);
        assert_eq!(block.relative_timecode, -2);
        assert!(block.is_keyframe());
        assert!(!block.is_laced());
        assert_eq!(block.frames, vec![vec![0xAA, 0xBB]]);
    }

    #[test]
    fn test_xiph_laced_block() {
        // 3 frames: sizes 2, 1, and the remaining 3
        let data = [0x82, 0x00, 0x05, 0x02, 0x02, 0x02, 0x01, 1, 2, 3, 4, 5, 6];
        let block = parse_block(&data).unwrap();
        assert_eq!(block.track_number, 2);
        assert_eq!(block.lacing(), XIPH);
        assert_eq!(block.frames, vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
    }

    #[test]
    fn test_ebml_laced_block() {
        // 3 frames: first 2, delta +1 (64 biased), remaining
        let data = [0x81, 0x00, 0x00, 0x06, 0x02, 0x82, 0xC0, 1, 2, 3, 4, 5, 6, 7];
        let block = parse_block(&data).unwrap();
        assert_eq!(block.lacing(), EBML);
        assert_eq!(
            block.frames,
            vec![vec![1, 2], vec![3, 4, 5], vec![6, 7]]
        );
    }

    #[test]
    fn test_fixed_laced_block() {
        let data = [0x81, 0x00, 0x00, 0x04, 0x01, 1, 2, 3, 4];
        let block = parse_block(&data).unwrap();
        assert_eq!(block.frames, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_block_header_too_short() {
        assert!(matches!(
            parse_block(&[0x81, 0x00]),
            Err(MkaError::InvalidBlock(_))
        ));
        assert!(parse_block(&[]).is_err());
    }

    #[test]
    fn test_laced_sizes_past_end() {
        // Xiph says the first frame is 200 bytes but only 3 follow
        let data = [0x81, 0x00, 0x00, 0x02, 0x01, 200, 1, 2, 3];
        assert!(matches!(
            parse_block(&data),
            Err(MkaError::InvalidLacing(_))
        ));
    }

    #[test]
    fn test_ebml_lacing_size_overflow() {
        // 256 frames; every size field is the largest 8-byte VINT
        let widest = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut data = vec![0x81, 0x00, 0x00, 0x06, 0xFF];
        for _ in 0..255 {
            data.extend_from_slice(&widest);
        }
        data.extend_from_slice(&[1, 2, 3]);

        let (sizes, sizes_len) = parse_ebml_lacing(&data[5..], 256).unwrap();
        assert_eq!(sizes_len, 255 * 8);
        assert_eq!(sizes[0], (1 << 56) - 1);
        assert_eq!(sizes[254], i64::MAX as usize);

        assert!(matches!(
            parse_block(&data),
            Err(MkaError::InvalidLacing(_))
        ));
    }

    #[test]
    fn test_block_track_number() {
        assert_eq!(block_track_number(&[0x40, 0x81, 0, 0, 0]).unwrap(), 129);
        assert!(block_track_number(&[]).is_err());
    }

    #[test]
    fn test_xiph_lacing_parsing() {
        // 100, then 255 + 50
        let data = vec![100, 255, 50];
        let (sizes, offset) = parse_xiph_lacing(&data, 3).unwrap();
        assert_eq!(sizes, vec![100, 305]);
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_fixed_lacing_uneven_error() {
        assert_eq!(parse_fixed_lacing(300, 3).unwrap(), vec![100, 100, 100]);
        assert!(parse_fixed_lacing(301, 3).is_err());
    }

    #[test]
    fn test_vint_to_signed_delta() {
        assert_eq!(vint_to_signed_delta(63, 1), 0);
        assert_eq!(vint_to_signed_delta(64, 1), 1);
        assert_eq!(vint_to_signed_delta(62, 1), -1);
        assert_eq!(vint_to_signed_delta(8191, 2), 0);
        assert_eq!(vint_to_signed_delta(8190, 2), -1);
    }

    #[test]
    fn test_extract_frames_size_error() {
        let data = vec![1, 2, 3, 4, 5];
        assert!(extract_frames(&data, &[3, 10]).is_err());
    }
}
