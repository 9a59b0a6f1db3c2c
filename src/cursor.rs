//! Bounds-checked, zero-copy cursor over an immutable firmware buffer.
//!
//! Every structural parser reads headers through a [`ByteCursor`] using the
//! primitives in [`crate::utils`]. Sub-ranges are handed out as [`Bytes`]
//! views that share the underlying allocation, so only decompression ever
//! produces a new buffer.

use std::io::{self, Read};

use bytes::Bytes;

use crate::{Error, Result};

/// Read cursor over a shared byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Bytes,
    pos: usize,
}

impl ByteCursor {
    /// Wrap `data`, positioned at offset 0.
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Wrap `data`, positioned at `pos`.
    ///
    /// Returns [`Error::InvalidRange`] if `pos` lies past the end.
    pub fn at(data: Bytes, pos: usize) -> Result<Self> {
        if pos > data.len() {
            return Err(Error::InvalidRange);
        }
        Ok(Self { data, pos })
    }

    /// The whole underlying buffer.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the read position and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move the read position to `pos`.
    pub fn seek_to(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::InvalidRange);
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the read position by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        let pos = self.pos.checked_add(n).ok_or(Error::InvalidRange)?;
        self.seek_to(pos)
    }

    /// Zero-copy view of `len` bytes at `offset`.
    ///
    /// Returns [`Error::Truncated`] if the range runs past the end.
    pub fn view(&self, offset: usize, len: usize) -> Result<Bytes> {
        let end = offset.checked_add(len).ok_or(Error::InvalidRange)?;
        if end > self.data.len() {
            return Err(Error::Truncated {
                needed: end as u64,
                available: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(offset..end))
    }

    /// Zero-copy view of at most `len` bytes at `offset`.
    ///
    /// The second element is `true` when the range had to be shortened.
    pub fn view_clamped(&self, offset: usize, len: usize) -> (Bytes, bool) {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(len).min(self.data.len());
        let truncated = end - start < len;
        (self.data.slice(start..end), truncated)
    }

    /// Zero-copy view of everything from `offset` to the end.
    pub fn tail(&self, offset: usize) -> Bytes {
        self.data.slice(offset.min(self.data.len())..)
    }
}

impl Read for ByteCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let avail = &self.data[self.pos..];
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.pos += n;
        Ok(n)
    }
}
