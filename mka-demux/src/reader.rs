//! Element cursor over a byte stream.
//!
//! [`ElementReader`] walks the EBML tree one level at a time. Every call to
//! [`ElementReader::next`] reports exactly what happened at the current level:
//! a child was found, the level ran out, or an unknown-size parent was closed
//! implicitly because a segment-level element showed up inside it. In the
//! last case the element that closed the parent is held back and handed out
//! by the following call, so nothing is ever read twice or dropped.
//!
//! Callers follow a skip-or-descend discipline: each child returned is either
//! read with one of the `read_*` helpers, entered with [`ElementReader::enter`],
//! or skipped with [`ElementReader::skip`]. Children with a known size are
//! skipped automatically if the caller ignores them.

use std::io::SeekFrom;

use crate::ebml::{self, ElementHeader};
use crate::elements::{self, SEGMENT};
use crate::error::{MkaError, Result};
use crate::io::ByteStream;

/// A located element: header decoded, payload untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    /// Element ID.
    pub id: u32,
    /// File offset of the first header byte.
    pub position: u64,
    /// Header length (ID + size field).
    pub header_size: usize,
    /// Declared payload size, `None` when unknown.
    pub size: Option<u64>,
}

impl Element {
    /// File offset of the first payload byte.
    pub fn data_start(&self) -> u64 {
        self.position + self.header_size as u64
    }

    /// File offset just past the payload, if the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|s| self.data_start() + s)
    }

    /// Width in bytes of the size field.
    pub fn size_width(&self) -> usize {
        ElementHeader {
            id: self.id,
            size: self.size,
            header_size: self.header_size,
        }
        .size_width()
    }
}

/// Outcome of advancing the cursor at the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The next child of the current level.
    Child(Element),
    /// The current level has no more children; it has been left.
    SiblingExhausted,
    /// `n` unknown-size levels were closed by a segment-level element.
    ///
    /// That element is returned by the next call.
    AscendedLevels(usize),
}

#[derive(Debug, Clone, Copy)]
struct Level {
    id: u32,
    end: Option<u64>,
    /// Where the next sibling starts, once known.
    next: Option<u64>,
}

/// Level-tracking EBML element reader.
#[derive(Debug)]
pub struct ElementReader<S> {
    stream: S,
    file_size: u64,
    levels: Vec<Level>,
    pending: Option<Element>,
    max_depth: u32,
}

impl<S: ByteStream> ElementReader<S> {
    /// Create a reader positioned at the start of the stream.
    pub fn new(mut stream: S, max_depth: u32) -> Result<Self> {
        let file_size = stream.size()?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Self {
            stream,
            file_size,
            levels: Vec::new(),
            pending: None,
            max_depth,
        })
    }

    /// Mutable access to the underlying stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Size of the stream when it was last measured.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Re-measure the stream after it has been written to.
    pub fn refresh_size(&mut self) -> Result<u64> {
        self.file_size = self.stream.size()?;
        Ok(self.file_size)
    }

    /// Whether the stream supports backward seeks.
    pub fn is_seekable(&self) -> bool {
        self.stream.is_seekable()
    }

    /// Number of levels currently entered.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Current stream position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream.stream_position()?)
    }

    /// Move the stream to an absolute position.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if self.position()? != pos {
            self.stream.seek(SeekFrom::Start(pos))?;
        }
        Ok(())
    }

    /// Read an element header at the current position.
    ///
    /// Returns `None` at end of stream.
    pub fn read_header(&mut self) -> Result<Option<Element>> {
        let position = self.position()?;
        if position >= self.file_size {
            return Ok(None);
        }
        match ElementHeader::read(&mut self.stream) {
            Ok(header) => Ok(Some(Element {
                id: header.id,
                position,
                header_size: header.header_size,
                size: header.size,
            })),
            Err(MkaError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(MkaError::InvalidVint { .. }) => Err(MkaError::InvalidVint { offset: position }),
            Err(MkaError::InvalidElementId { .. }) => {
                Err(MkaError::InvalidElementId { offset: position })
            }
            Err(e) => Err(e),
        }
    }

    /// Read the element header found at `pos`.
    pub fn read_element_at(&mut self, pos: u64) -> Result<Option<Element>> {
        self.seek(pos)?;
        self.read_header()
    }

    /// Descend into a master element. Returns the new depth.
    ///
    /// A segment's end is clamped to the stream size; an unknown-size segment
    /// runs to the end of the stream.
    pub fn enter(&mut self, element: &Element) -> Result<usize> {
        if self.levels.len() as u32 >= self.max_depth {
            return Err(MkaError::RecursionLimit {
                depth: self.levels.len() as u32,
            });
        }
        let end = if element.id == SEGMENT {
            Some(element.end().map_or(self.file_size, |e| e.min(self.file_size)))
        } else {
            element.end()
        };
        self.seek(element.data_start())?;
        self.levels.push(Level {
            id: element.id,
            end,
            next: None,
        });
        Ok(self.levels.len())
    }

    /// Advance to the next child of the current level.
    pub fn next(&mut self) -> Result<Step> {
        if let Some(element) = self.pending.take() {
            self.seek(element.data_start())?;
            self.mark_child(&element);
            return Ok(Step::Child(element));
        }

        let Some(level) = self.levels.last().copied() else {
            return Ok(Step::SiblingExhausted);
        };
        if let Some(next) = level.next {
            self.seek(next)?;
        }

        let pos = self.position()?;
        if level.end.is_some_and(|end| pos >= end) {
            self.levels.pop();
            return Ok(Step::SiblingExhausted);
        }
        let Some(element) = self.read_header()? else {
            self.levels.pop();
            return Ok(Step::SiblingExhausted);
        };

        if level.end.is_none() && level.id != SEGMENT && elements::is_top_level(element.id) {
            let ascended = self
                .levels
                .iter()
                .rev()
                .take_while(|l| l.id != SEGMENT)
                .count();
            self.levels.truncate(self.levels.len() - ascended);
            tracing::trace!(
                id = format_args!("0x{:X}", element.id),
                position = element.position,
                ascended,
                "unknown-size parent closed by segment-level element"
            );
            self.pending = Some(element);
            return Ok(Step::AscendedLevels(ascended));
        }

        if let (Some(parent_end), Some(child_end)) = (level.end, element.end()) {
            if level.id != SEGMENT && child_end > parent_end {
                return Err(MkaError::InvalidElementSize {
                    offset: element.position,
                    message: format!(
                        "element 0x{:X} ends at {} past its parent end {}",
                        element.id, child_end, parent_end
                    ),
                });
            }
        }

        self.mark_child(&element);
        Ok(Step::Child(element))
    }

    /// Next child at `depth`, or `None` once that level is done.
    ///
    /// Levels deeper than `depth` that a caller left unfinished are dropped
    /// first.
    pub fn next_child(&mut self, depth: usize) -> Result<Option<Element>> {
        if self.levels.len() < depth {
            return Ok(None);
        }
        self.levels.truncate(depth);
        match self.next()? {
            Step::Child(element) => Ok(Some(element)),
            Step::SiblingExhausted | Step::AscendedLevels(_) => Ok(None),
        }
    }

    /// Drop every level deeper than `depth` along with any held-back element.
    ///
    /// Used before jumping to an absolute position.
    pub fn reset_to(&mut self, depth: usize) {
        self.levels.truncate(depth);
        self.pending = None;
        if let Some(level) = self.levels.last_mut() {
            level.next = None;
        }
    }

    /// Hand `element` out again on the next call at the current level.
    pub fn push_back(&mut self, element: Element) {
        if let Some(level) = self.levels.last_mut() {
            level.next = None;
        }
        self.pending = Some(element);
    }

    fn mark_child(&mut self, element: &Element) {
        if let Some(level) = self.levels.last_mut() {
            level.next = element.end();
        }
    }

    /// Skip an element's payload.
    ///
    /// Unknown-size elements are walked until their end is implied.
    pub fn skip(&mut self, element: &Element) -> Result<()> {
        match element.end() {
            Some(end) => self.seek(end),
            None => {
                if !elements::is_master_element(element.id) {
                    return Err(MkaError::InvalidElementSize {
                        offset: element.position,
                        message: format!("unknown size on value element 0x{:X}", element.id),
                    });
                }
                let depth = self.enter(element)?;
                while let Some(child) = self.next_child(depth)? {
                    self.skip(&child)?;
                }
                Ok(())
            }
        }
    }

    /// Run `f` on the element at `pos`, then restore the cursor.
    ///
    /// The segment level is kept while `f` runs so unknown-size elements still
    /// end at the next segment-level element.
    pub fn detached<T, F>(&mut self, pos: u64, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self, Element) -> Result<T>,
    {
        let saved_levels = std::mem::take(&mut self.levels);
        let saved_pending = self.pending.take();
        let saved_pos = self.position()?;

        if let Some(segment) = saved_levels.first().filter(|l| l.id == SEGMENT) {
            self.levels.push(Level {
                next: None,
                ..*segment
            });
        }

        let result = match self.read_element_at(pos) {
            Ok(Some(element)) => f(self, element).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        self.levels = saved_levels;
        self.pending = saved_pending;
        let restored = self.seek(saved_pos);
        let value = result?;
        restored?;
        Ok(value)
    }

    // Helper methods for reading EBML data types

    /// Read an element's payload.
    pub fn read_bytes(&mut self, element: &Element) -> Result<Vec<u8>> {
        let size = element.size.ok_or_else(|| MkaError::InvalidElementSize {
            offset: element.position,
            message: "unknown size on value element".to_string(),
        })?;
        let available = self.file_size.saturating_sub(element.data_start());
        if size > available {
            return Err(MkaError::InvalidElementSize {
                offset: element.position,
                message: format!("size {} exceeds the {} bytes left", size, available),
            });
        }
        self.seek(element.data_start())?;
        let mut data = vec![0u8; size as usize];
        self.stream.read_exact(&mut data)?;
        Ok(data)
    }

    /// Read an unsigned integer element.
    pub fn read_uint(&mut self, element: &Element) -> Result<u64> {
        let data = self.read_bytes(element)?;
        Ok(ebml::read_unsigned_int(&data))
    }

    /// Read a signed integer element.
    pub fn read_int(&mut self, element: &Element) -> Result<i64> {
        let data = self.read_bytes(element)?;
        Ok(ebml::read_signed_int(&data))
    }

    /// Read a float element.
    pub fn read_float(&mut self, element: &Element) -> Result<f64> {
        let data = self.read_bytes(element)?;
        Ok(ebml::read_float(&data))
    }

    /// Read a string element.
    pub fn read_string(&mut self, element: &Element) -> Result<String> {
        let data = self.read_bytes(element)?;
        Ok(ebml::read_string(&data))
    }
}
