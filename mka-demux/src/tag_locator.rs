//! Fallback search for the `Tags` element near the end of the file.
//!
//! Files without a seek head entry for their tags usually still carry them
//! at the very end. The last `window` bytes are searched for the trailing
//! three bytes of the `Tags` ID; each hit is checked by decoding the element
//! header one byte earlier.

use crate::elements::TAGS;
use crate::error::Result;
use crate::io::ByteStream;
use crate::reader::{Element, ElementReader};

/// Default size of the scanned tail, in bytes.
pub const DEFAULT_SCAN_WINDOW: u64 = 64 * 1024;

/// Last three bytes of the `Tags` element ID.
pub const TAGS_SIGNATURE: [u8; 3] = [0x54, 0xC3, 0x67];

/// Chunk size of the linear fallback scan.
const LINEAR_CHUNK: usize = 4096;

/// Boyer-Moore substring search with bad-character and good-suffix tables.
#[derive(Debug, Clone)]
pub struct BoyerMoore {
    pattern: Vec<u8>,
    bad_char: [usize; 256],
    good_suffix: Vec<usize>,
}

impl BoyerMoore {
    /// Build the shift tables for a non-empty pattern.
    pub fn new(pattern: &[u8]) -> Self {
        let m = pattern.len();
        let mut bad_char = [m; 256];
        for (i, &b) in pattern.iter().enumerate().take(m.saturating_sub(1)) {
            bad_char[b as usize] = m - 1 - i;
        }
        Self {
            pattern: pattern.to_vec(),
            bad_char,
            good_suffix: good_suffix_table(pattern),
        }
    }

    /// Offset of the first match at or after `start`.
    pub fn find_from(&self, haystack: &[u8], start: usize) -> Option<usize> {
        let m = self.pattern.len();
        let n = haystack.len();
        if m == 0 || n < m {
            return None;
        }
        let mut j = start;
        while j <= n - m {
            let mut i = m;
            while i > 0 && self.pattern[i - 1] == haystack[i - 1 + j] {
                i -= 1;
            }
            if i == 0 {
                return Some(j);
            }
            let i = i - 1;
            let bad = self.bad_char[haystack[i + j] as usize] as isize - (m - 1 - i) as isize;
            j += self.good_suffix[i].max(bad.max(1) as usize);
        }
        None
    }

    /// All match offsets, in order.
    pub fn find_all<'a>(&'a self, haystack: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        let mut next = Some(0);
        std::iter::from_fn(move || {
            let found = self.find_from(haystack, next?)?;
            next = Some(found + 1);
            Some(found)
        })
    }
}

/// `suff[i]` = length of the longest suffix of `pattern[..=i]` that is also a
/// suffix of the whole pattern.
fn suffixes(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len() as isize;
    let mut suff = vec![0isize; m as usize];
    if m == 0 {
        return Vec::new();
    }
    suff[(m - 1) as usize] = m;
    let mut g = m - 1;
    let mut f = m - 1;
    for i in (0..m - 1).rev() {
        if i > g && suff[(i + m - 1 - f) as usize] < i - g {
            suff[i as usize] = suff[(i + m - 1 - f) as usize];
        } else {
            if i < g {
                g = i;
            }
            f = i;
            while g >= 0 && pattern[g as usize] == pattern[(g + m - 1 - f) as usize] {
                g -= 1;
            }
            suff[i as usize] = f - g;
        }
    }
    suff.into_iter().map(|s| s as usize).collect()
}

fn good_suffix_table(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len();
    let suff = suffixes(pattern);
    let mut table = vec![m; m];
    let mut j = 0;
    for i in (0..m).rev() {
        if suff[i] == i + 1 {
            while j < m - 1 - i {
                if table[j] == m {
                    table[j] = m - 1 - i;
                }
                j += 1;
            }
        }
    }
    for i in 0..m.saturating_sub(1) {
        table[m - 1 - suff[i]] = m - 1 - i;
    }
    table
}

/// Check whether a candidate header position holds a usable `Tags` element.
fn probe_candidate<S: ByteStream>(
    reader: &mut ElementReader<S>,
    position: u64,
) -> Result<Option<Element>> {
    let element = match reader.read_element_at(position) {
        Ok(Some(element)) => element,
        Ok(None) => return Ok(None),
        Err(e) if e.is_aborted() => return Err(e),
        Err(_) => return Ok(None),
    };
    let fits = element
        .end()
        .is_some_and(|end| end <= reader.file_size());
    Ok((element.id == TAGS && fits).then_some(element))
}

/// Search the last `window` bytes of the stream for a `Tags` element.
///
/// Returns the first candidate that decodes as `Tags` and ends inside the
/// file. The stream position is left undefined.
pub fn locate_tags<S: ByteStream>(
    reader: &mut ElementReader<S>,
    window: u64,
) -> Result<Option<Element>> {
    let file_size = reader.file_size();
    let window = window.min(file_size);
    if window == 0 {
        return Ok(None);
    }
    let start = file_size - window;

    let buffer = {
        let element = Element {
            id: 0,
            position: start,
            header_size: 0,
            size: Some(window),
        };
        reader.read_bytes(&element)?
    };

    let search = BoyerMoore::new(&TAGS_SIGNATURE);
    let mut matched = false;
    for offset in search.find_all(&buffer) {
        matched = true;
        let Some(candidate) = (start + offset as u64).checked_sub(1) else {
            continue;
        };
        if let Some(element) = probe_candidate(reader, candidate)? {
            tracing::debug!(position = element.position, "tags found by tail scan");
            return Ok(Some(element));
        }
    }

    if !matched {
        if let Some(element) = scan_linear(reader, start)? {
            tracing::debug!(position = element.position, "tags found by linear scan");
            return Ok(Some(element));
        }
    }

    tracing::debug!(window, "no tags found in the file tail");
    Ok(None)
}

/// Byte-by-byte scan from `start` to the end of the stream.
fn scan_linear<S: ByteStream>(
    reader: &mut ElementReader<S>,
    start: u64,
) -> Result<Option<Element>> {
    let file_size = reader.refresh_size()?;
    let mut chunk_start = start;
    while chunk_start < file_size {
        let len = (file_size - chunk_start).min(LINEAR_CHUNK as u64);
        let chunk = reader.read_bytes(&Element {
            id: 0,
            position: chunk_start,
            header_size: 0,
            size: Some(len),
        })?;
        for (offset, bytes) in chunk.windows(TAGS_SIGNATURE.len()).enumerate() {
            if bytes != TAGS_SIGNATURE {
                continue;
            }
            let Some(candidate) = (chunk_start + offset as u64).checked_sub(1) else {
                continue;
            };
            if let Some(element) = probe_candidate(reader, candidate)? {
                return Ok(Some(element));
            }
        }
        if len < TAGS_SIGNATURE.len() as u64 {
            break;
        }
        // overlap so a signature split across chunks is still seen
        chunk_start += len - (TAGS_SIGNATURE.len() as u64 - 1);
        if chunk_start + TAGS_SIGNATURE.len() as u64 > file_size {
            break;
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml;
    use crate::elements::{SEGMENT, TAG};
    use std::io::Cursor;

    fn el(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ebml::write_element_id(&mut out, id).unwrap();
        ebml::write_vint(&mut out, payload.len() as u64).unwrap();
        out.extend_from_slice(payload);
        out
    }

    fn reader(data: Vec<u8>) -> ElementReader<Cursor<Vec<u8>>> {
        ElementReader::new(Cursor::new(data), ebml::MAX_RECURSION_DEPTH).unwrap()
    }

    #[test]
    fn test_boyer_moore_basic() {
        let bm = BoyerMoore::new(&TAGS_SIGNATURE);
        let hay = [0u8, 0x54, 0xC3, 0x67, 9, 0x54, 0xC3, 0x67];
        assert_eq!(bm.find_from(&hay, 0), Some(1));
        assert_eq!(bm.find_from(&hay, 2), Some(5));
        assert_eq!(bm.find_all(&hay).collect::<Vec<_>>(), vec![1, 5]);
        assert_eq!(bm.find_from(&hay[..3], 0), None);
    }

    #[test]
    fn test_boyer_moore_repetitive_pattern() {
        let bm = BoyerMoore::new(b"abab");
        let hay = b"aabababab";
        assert_eq!(bm.find_all(hay).collect::<Vec<_>>(), vec![1, 3, 5]);
        let bm = BoyerMoore::new(b"aaa");
        assert_eq!(bm.find_all(b"aaaa").collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_good_suffix_table() {
        // classic example from the literature
        assert_eq!(good_suffix_table(b"GCAGAGAG"), vec![7, 7, 7, 2, 7, 4, 7, 1]);
    }

    #[test]
    fn test_locate_tags_in_tail() {
        let mut data = el(SEGMENT, &[0u8; 40]);
        let tags_pos = data.len() as u64;
        data.extend(el(TAGS, &el(TAG, &[])));
        let mut r = reader(data);
        let found = locate_tags(&mut r, DEFAULT_SCAN_WINDOW).unwrap().unwrap();
        assert_eq!(found.id, TAGS);
        assert_eq!(found.position, tags_pos);
    }

    #[test]
    fn test_locate_rejects_truncated_candidate() {
        // Signature bytes inside a payload, claiming more data than exists.
        let mut data = vec![0u8; 10];
        data.extend_from_slice(&[0x12, 0x54, 0xC3, 0x67, 0x88, 1, 2]);
        let mut r = reader(data);
        assert_eq!(locate_tags(&mut r, 1024).unwrap(), None);
    }

    #[test]
    fn test_locate_window_limits_search() {
        let mut data = el(TAGS, &[]);
        data.extend(vec![0u8; 200]);
        let mut r = reader(data.clone());
        assert_eq!(locate_tags(&mut r, 100).unwrap(), None);
        let mut r = reader(data);
        assert!(locate_tags(&mut r, 1000).unwrap().is_some());
        let mut r = reader(el(TAGS, &[]));
        assert_eq!(locate_tags(&mut r, 0).unwrap(), None);
    }

    #[test]
    fn test_linear_scan_across_chunks() {
        let mut data = vec![0u8; LINEAR_CHUNK - 2];
        let tags_pos = data.len() as u64;
        data.extend(el(TAGS, &[]));
        data.extend(vec![0u8; 10]);
        let mut r = reader(data);
        let found = scan_linear(&mut r, 0).unwrap().unwrap();
        assert_eq!(found.position, tags_pos);
    }
}
