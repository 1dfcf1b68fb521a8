//! EBML (Extensible Binary Meta Language) primitives.
//!
//! EBML is the binary format underlying Matroska. It uses variable-length
//! integers (VINTs) for both element IDs and sizes.

use crate::error::{MkaError, Result};
use std::io::{Read, Write};

/// Maximum recursion depth for nested elements.
pub const MAX_RECURSION_DEPTH: u32 = 64;

/// Maximum VINT length in bytes.
pub const MAX_VINT_LENGTH: usize = 8;

/// Maximum element ID length in bytes.
pub const MAX_ID_LENGTH: usize = 4;

/// Data bits of an all-ones (unknown) size for each VINT width.
const UNKNOWN_MARKERS: [u64; 8] = [
    0x7F,
    0x3FFF,
    0x1FFFFF,
    0x0FFFFFFF,
    0x07FFFFFFFF,
    0x03FFFFFFFFFF,
    0x01FFFFFFFFFFFF,
    0x00FFFFFFFFFFFFFF,
];

/// Read a variable-length integer (VINT) from a reader.
///
/// EBML VINTs use a leading bit pattern to indicate the length:
/// - 1xxxxxxx: 1 byte (7 bits of data)
/// - 01xxxxxx xxxxxxxx: 2 bytes (14 bits)
/// - 001xxxxx xxxxxxxx xxxxxxxx: 3 bytes (21 bits)
/// - etc.
///
/// Returns the decoded value and the number of bytes read.
pub fn read_vint<R: Read>(reader: &mut R) -> Result<(u64, usize)> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    if first_byte[0] == 0 {
        return Err(MkaError::InvalidVint { offset: 0 });
    }

    let length = first_byte[0].leading_zeros() as usize + 1;
    let mask = (0xFFu16 >> length) as u8;
    let mut value = (first_byte[0] & mask) as u64;

    if length > 1 {
        let mut remaining = [0u8; MAX_VINT_LENGTH - 1];
        reader.read_exact(&mut remaining[..length - 1])?;
        for &byte in &remaining[..length - 1] {
            value = (value << 8) | byte as u64;
        }
    }

    Ok((value, length))
}

/// Decode a VINT from the start of a byte slice.
///
/// Returns `None` if the slice is too short or starts with a zero byte.
pub fn decode_vint(data: &[u8]) -> Option<(u64, usize)> {
    let first = *data.first()?;
    if first == 0 {
        return None;
    }
    let length = first.leading_zeros() as usize + 1;
    if data.len() < length {
        return None;
    }
    let mut value = (first & (0xFFu16 >> length) as u8) as u64;
    for &byte in &data[1..length] {
        value = (value << 8) | byte as u64;
    }
    Some((value, length))
}

/// Read a VINT as an element ID.
///
/// Element IDs include the VINT marker bits as part of the ID.
pub fn read_element_id<R: Read>(reader: &mut R) -> Result<(u32, usize)> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    if first_byte[0] == 0 {
        return Err(MkaError::InvalidVint { offset: 0 });
    }

    let length = first_byte[0].leading_zeros() as usize + 1;
    if length > MAX_ID_LENGTH {
        return Err(MkaError::InvalidElementId { offset: 0 });
    }

    let mut value = first_byte[0] as u32;
    if length > 1 {
        let mut remaining = [0u8; MAX_ID_LENGTH - 1];
        reader.read_exact(&mut remaining[..length - 1])?;
        for &byte in &remaining[..length - 1] {
            value = (value << 8) | byte as u32;
        }
    }

    Ok((value, length))
}

/// Read an element size (VINT with possible unknown size).
///
/// Returns `None` if the size is unknown (live/streaming files).
pub fn read_element_size<R: Read>(reader: &mut R) -> Result<(Option<u64>, usize)> {
    let (value, length) = read_vint(reader)?;
    if value == UNKNOWN_MARKERS[length - 1] {
        Ok((None, length))
    } else {
        Ok((Some(value), length))
    }
}

/// Decode an element ID from raw bytes as stored in a `SeekID`.
pub fn element_id_from_bytes(data: &[u8]) -> Option<u32> {
    if data.is_empty() || data.len() > MAX_ID_LENGTH {
        return None;
    }
    Some(data.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// Write a variable-length integer.
pub fn write_vint<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let (bytes, length) = encode_vint(value)?;
    writer.write_all(&bytes[..length])?;
    Ok(length)
}

/// Encode a value as a VINT in the minimum width.
///
/// Returns the encoded bytes and the length.
pub fn encode_vint(value: u64) -> Result<([u8; 8], usize)> {
    encode_vint_width(value, vint_length(value))
}

/// Encode a value as a VINT of exactly `width` bytes.
///
/// Used when a size field is rewritten in place and must keep its width.
pub fn encode_vint_width(value: u64, width: usize) -> Result<([u8; 8], usize)> {
    if width == 0 || width > MAX_VINT_LENGTH {
        return Err(MkaError::VintOverflow);
    }
    // The all-ones pattern is reserved for unknown sizes.
    if value >= UNKNOWN_MARKERS[width - 1] {
        return Err(MkaError::VintOverflow);
    }

    let mut bytes = [0u8; 8];
    let mut v = value;
    for i in (0..width).rev() {
        bytes[i] = (v & 0xFF) as u8;
        v >>= 8;
    }
    bytes[0] |= 0x80 >> (width - 1);

    Ok((bytes, width))
}

/// Calculate the minimum number of bytes needed to encode a value as a VINT.
pub fn vint_length(value: u64) -> usize {
    UNKNOWN_MARKERS
        .iter()
        .position(|&marker| value < marker)
        .map(|i| i + 1)
        .unwrap_or(MAX_VINT_LENGTH)
}

/// Write an element ID.
pub fn write_element_id<W: Write>(writer: &mut W, id: u32) -> Result<usize> {
    let bytes = id.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    writer.write_all(&bytes[start..])?;
    Ok(4 - start)
}

/// An EBML element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// The element ID.
    pub id: u32,
    /// The element size (None for unknown size).
    pub size: Option<u64>,
    /// Total header size in bytes.
    pub header_size: usize,
}

impl ElementHeader {
    /// Read an element header from a reader.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let (id, id_len) = read_element_id(reader)?;
        let (size, size_len) = read_element_size(reader)?;

        Ok(Self {
            id,
            size,
            header_size: id_len + size_len,
        })
    }

    /// Width in bytes of the size field.
    pub fn size_width(&self) -> usize {
        let id_len = 4 - (self.id.leading_zeros() / 8) as usize;
        self.header_size.saturating_sub(id_len)
    }

    /// Write an element header with a known size.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let size = self
            .size
            .ok_or_else(|| MkaError::Other("cannot write an unknown-size header".into()))?;
        let id_len = write_element_id(writer, self.id)?;
        let size_len = write_vint(writer, size)?;
        Ok(id_len + size_len)
    }

    /// Get the total size of this element (header + content).
    pub fn total_size(&self) -> Option<u64> {
        self.size.map(|s| s + self.header_size as u64)
    }
}

/// Read a signed integer from EBML data.
pub fn read_signed_int(data: &[u8]) -> i64 {
    if data.is_empty() {
        return 0;
    }

    let mut value = if data[0] & 0x80 != 0 { -1i64 } else { 0i64 };
    for &byte in data {
        value = (value << 8) | byte as i64;
    }
    value
}

/// Read an unsigned integer from EBML data.
pub fn read_unsigned_int(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Read a float from EBML data (4 or 8 bytes).
pub fn read_float(data: &[u8]) -> f64 {
    match *data {
        [a, b, c, d] => f32::from_be_bytes([a, b, c, d]) as f64,
        [a, b, c, d, e, f, g, h] => f64::from_be_bytes([a, b, c, d, e, f, g, h]),
        [] => 0.0,
        _ => f64::NAN,
    }
}

/// Read a string from EBML data, stopping at the first NUL.
///
/// Invalid UTF-8 sequences are replaced rather than rejected; tag values in
/// the wild are not always clean.
pub fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Write an unsigned integer in minimal bytes.
pub fn write_unsigned_int<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    if value == 0 {
        writer.write_all(&[0])?;
        return Ok(1);
    }

    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    writer.write_all(&bytes[start..])?;
    Ok(8 - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_vint_1byte() {
        let data = [0x81];
        let mut cursor = Cursor::new(&data);
        let (value, len) = read_vint(&mut cursor).unwrap();
        assert_eq!(value, 1);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_read_vint_2byte() {
        let data = [0x40, 0x81];
        let mut cursor = Cursor::new(&data);
        let (value, len) = read_vint(&mut cursor).unwrap();
        assert_eq!(value, 129);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_read_vint_zero_byte() {
        let mut cursor = Cursor::new([0x00, 0x81]);
        assert!(matches!(
            read_vint(&mut cursor),
            Err(MkaError::InvalidVint { .. })
        ));
    }

    #[test]
    fn test_decode_vint_slice() {
        assert_eq!(decode_vint(&[0x40, 0x81, 0xFF]), Some((129, 2)));
        assert_eq!(decode_vint(&[0x40]), None);
        assert_eq!(decode_vint(&[]), None);
    }

    #[test]
    fn test_read_element_id_4byte() {
        let data = [0x18, 0x53, 0x80, 0x67];
        let mut cursor = Cursor::new(&data);
        let (id, len) = read_element_id(&mut cursor).unwrap();
        assert_eq!(id, 0x18538067);
        assert_eq!(len, 4);
    }

    #[test]
    fn test_read_element_id_too_long() {
        let mut cursor = Cursor::new([0x08, 0, 0, 0, 0]);
        assert!(matches!(
            read_element_id(&mut cursor),
            Err(MkaError::InvalidElementId { .. })
        ));
    }

    #[test]
    fn test_read_unknown_size() {
        let mut cursor = Cursor::new([0xFF]);
        assert_eq!(read_element_size(&mut cursor).unwrap(), (None, 1));

        let mut cursor = Cursor::new([0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_element_size(&mut cursor).unwrap(), (None, 8));
    }

    #[test]
    fn test_eight_byte_known_size() {
        let (bytes, len) = encode_vint_width(300, 8).unwrap();
        assert_eq!(len, 8);
        assert_eq!(bytes[0], 0x01);

        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_element_size(&mut cursor).unwrap(), (Some(300), 8));
        assert_eq!(decode_vint(&bytes), Some((300, 8)));

        let largest = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE];
        assert_eq!(decode_vint(&largest), Some(((1 << 56) - 2, 8)));
    }

    #[test]
    fn test_element_id_from_bytes() {
        assert_eq!(element_id_from_bytes(&[0x12, 0x54, 0xC3, 0x67]), Some(0x1254C367));
        assert_eq!(element_id_from_bytes(&[]), None);
        assert_eq!(element_id_from_bytes(&[1, 2, 3, 4, 5]), None);
    }

    #[test]
    fn test_encode_vint() {
        let (bytes, len) = encode_vint(1).unwrap();
        assert_eq!(len, 1);
        assert_eq!(bytes[0], 0x81);

        // 0x7F would collide with the unknown-size marker
        let (bytes, len) = encode_vint(0x7F).unwrap();
        assert_eq!(len, 2);
        assert_eq!(&bytes[..2], &[0x40, 0x7F]);
    }

    #[test]
    fn test_encode_vint_width() {
        let (bytes, len) = encode_vint_width(5, 8).unwrap();
        assert_eq!(len, 8);
        assert_eq!(&bytes[..8], &[0x01, 0, 0, 0, 0, 0, 0, 5]);

        assert!(encode_vint_width(300, 1).is_err());
        assert!(encode_vint_width(1, 9).is_err());
    }

    #[test]
    fn test_vint_width_matches_reader() {
        for value in [0, 1, 126, 127, 16382, 16383, 1_000_000] {
            let (encoded, len) = encode_vint(value).unwrap();
            let mut cursor = Cursor::new(&encoded[..len]);
            assert_eq!(read_vint(&mut cursor).unwrap(), (value, len));
        }
    }

    #[test]
    fn test_read_signed_int() {
        assert_eq!(read_signed_int(&[0x00]), 0);
        assert_eq!(read_signed_int(&[0xFF]), -1);
        assert_eq!(read_signed_int(&[0x00, 0x80]), 128);
        assert_eq!(read_signed_int(&[0xFF, 0x7F]), -129);
    }

    #[test]
    fn test_read_unsigned_int() {
        assert_eq!(read_unsigned_int(&[]), 0);
        assert_eq!(read_unsigned_int(&[0xFF]), 255);
        assert_eq!(read_unsigned_int(&[0x01, 0x00]), 256);
    }

    #[test]
    fn test_read_float() {
        let data = 44100.0f32.to_be_bytes();
        assert_eq!(read_float(&data), 44100.0);

        let data = 1.5f64.to_be_bytes();
        assert_eq!(read_float(&data), 1.5);

        assert!(read_float(&[1, 2, 3]).is_nan());
    }

    #[test]
    fn test_read_string() {
        assert_eq!(read_string(b"und\x00\x00"), "und");
        assert_eq!(read_string(b"A_VORBIS"), "A_VORBIS");
        assert_eq!(read_string(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_element_header_write() {
        let header = ElementHeader {
            id: 0x1254C367,
            size: Some(100),
            header_size: 0,
        };

        let mut buffer = Vec::new();
        let written = header.write(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0x12, 0x54, 0xC3, 0x67, 0xE4]);

        let read_header = ElementHeader::read(&mut Cursor::new(&buffer)).unwrap();
        assert_eq!(read_header.id, header.id);
        assert_eq!(read_header.size, header.size);
        assert_eq!(read_header.header_size, written);
        assert_eq!(read_header.size_width(), 1);
    }
}
