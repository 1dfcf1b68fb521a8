//! Byte stream abstraction.
//!
//! The demuxer works on anything that can read, write and seek, plus report
//! its size. Two wrappers adjust behaviour: [`Sequential`] turns a stream into
//! a forward-only one, and [`Abortable`] makes every access honour an
//! [`AbortSignal`].

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use mka_core::AbortSignal;

/// A random-access byte stream.
pub trait ByteStream: Read + Write + Seek {
    /// Total size in bytes.
    fn size(&mut self) -> io::Result<u64>;

    /// Cut the stream to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Whether backward seeks are supported.
    fn is_seekable(&self) -> bool {
        true
    }
}

impl ByteStream for File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl ByteStream for Cursor<Vec<u8>> {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length too large"))?;
        self.get_mut().truncate(len);
        if self.position() > len as u64 {
            self.set_position(len as u64);
        }
        Ok(())
    }
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate(len)
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}

/// Forward-only view of a stream.
///
/// Seeks that would move backwards fail with `Unsupported`; the demuxer
/// falls back to reading clusters in file order.
#[derive(Debug)]
pub struct Sequential<S> {
    inner: S,
}

impl<S: ByteStream> Sequential<S> {
    /// Wrap a stream.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Unwrap the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ByteStream> Read for Sequential<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: ByteStream> Write for Sequential<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: ByteStream> Seek for Sequential<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let current = self.inner.stream_position()?;
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => current.checked_add_signed(d),
            SeekFrom::End(d) => self.inner.size()?.checked_add_signed(d),
        };
        match target {
            Some(t) if t >= current => self.inner.seek(SeekFrom::Start(t)),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "backward seek on a sequential stream",
            )),
        }
    }
}

impl<S: ByteStream> ByteStream for Sequential<S> {
    fn size(&mut self) -> io::Result<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.inner.truncate(len)
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// Stream wrapper that fails with `Interrupted` once the signal is raised.
#[derive(Debug)]
pub struct Abortable<S> {
    inner: S,
    signal: AbortSignal,
}

impl<S: ByteStream> Abortable<S> {
    /// Wrap a stream.
    pub fn new(inner: S, signal: AbortSignal) -> Self {
        Self { inner, signal }
    }

    /// The signal checked on every access.
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Unwrap the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ByteStream> Read for Abortable<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.signal.check()?;
        self.inner.read(buf)
    }
}

impl<S: ByteStream> Write for Abortable<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.signal.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: ByteStream> Seek for Abortable<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.signal.check()?;
        self.inner.seek(pos)
    }
}

impl<S: ByteStream> ByteStream for Abortable<S> {
    fn size(&mut self) -> io::Result<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.signal.check()?;
        self.inner.truncate(len)
    }

    fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }
}
