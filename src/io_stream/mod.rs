//! Byte-level stream plumbing underneath the ARC extractor.
//!
//! # Counting
//! [`CountingReader`] counts every byte it hands out.  The archive reader
//! wraps the raw file in one to know how far into the (possibly compressed)
//! stream it is; the record parser wraps the payload in a *limited* one so a
//! record can never consume more than its declared length.
//!
//! The counter is an `Arc<AtomicU64>` so a [`ReadProgress`] handle can poll
//! it from another thread.  It is a snapshot only; nothing in the read path
//! synchronises on it.
//!
//! # Cursor
//! [`ByteCursor`] is a buffered reader that can *peek* an arbitrary number of
//! bytes ahead without consuming them.  `std::io::BufReader` cannot guarantee
//! that (its `fill_buf` may return fewer bytes at a buffer boundary), and the
//! resynchronizer needs a reliable 4-byte look at every candidate position.
//!
//! # Lending
//! [`CursorSlot`] lets the gzip decoder own the cursor for as long as it
//! needs it, without the archive reader losing its handle on the stream.

use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default cursor capacity: 4 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

// ── Counting ─────────────────────────────────────────────────────────────────

/// Read-only view of a [`CountingReader`]'s byte counter.
#[derive(Debug, Clone)]
pub struct ReadProgress {
    counter: Arc<AtomicU64>,
}

impl ReadProgress {
    pub fn bytes_read(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Counts bytes delivered from `inner`, optionally capping the total.
///
/// With a cap, `read` truncates each request to the remaining allowance and
/// returns `Ok(0)` once it is used up, even if `inner` has more to give.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner:     R,
    counter:   Arc<AtomicU64>,
    max_bytes: Option<u64>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, counter: Arc::new(AtomicU64::new(0)), max_bytes: None }
    }

    /// A reader that signals end-of-stream after `max_bytes` bytes.
    pub fn limited(inner: R, max_bytes: u64) -> Self {
        Self { inner, counter: Arc::new(AtomicU64::new(0)), max_bytes: Some(max_bytes) }
    }

    pub fn bytes_read(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn progress(&self) -> ReadProgress {
        ReadProgress { counter: Arc::clone(&self.counter) }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let allowed = match self.max_bytes {
            Some(max) => {
                let remaining = max.saturating_sub(self.bytes_read());
                if remaining == 0 {
                    return Ok(0);
                }
                buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))
            }
            None => buf.len(),
        };
        let n = self.inner.read(&mut buf[..allowed])?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

// ── Cursor ───────────────────────────────────────────────────────────────────

/// Buffered reader with unbounded peek.
///
/// The buffer normally holds `capacity` bytes; a `peek` longer than that
/// grows it for as long as needed.
pub struct ByteCursor<R> {
    inner:    R,
    buf:      Vec<u8>,
    pos:      usize,
    filled:   usize,
    capacity: usize,
}

impl<R: Read> ByteCursor<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        let capacity = capacity.max(16);
        Self { inner, buf: vec![0u8; capacity], pos: 0, filled: 0, capacity }
    }

    /// Bytes read from `inner` but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.filled - self.pos
    }

    /// Return up to `n` bytes without consuming them.
    ///
    /// Fewer than `n` bytes are returned only at end of input.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.buffered() < n {
            // Slide the unread tail to the front, then top up.
            self.buf.copy_within(self.pos..self.filled, 0);
            self.filled -= self.pos;
            self.pos = 0;
            if self.buf.len() < n {
                self.buf.resize(n, 0);
            }
            while self.filled < n {
                match self.inner.read(&mut self.buf[self.filled..]) {
                    Ok(0) => break,
                    Ok(read) => self.filled += read,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        let end = (self.pos + n).min(self.filled);
        Ok(&self.buf[self.pos..end])
    }

    /// Consume up to `n` bytes; returns how many were actually skipped.
    pub fn discard(&mut self, n: usize) -> io::Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            let available = self.fill_buf()?.len();
            if available == 0 {
                break;
            }
            let step = available.min(n - skipped);
            self.consume(step);
            skipped += step;
        }
        Ok(skipped)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ByteCursor<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buffered() == 0 && out.len() >= self.capacity {
            return self.inner.read(out);
        }
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for ByteCursor<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.pos = 0;
            self.filled = 0;
            let cap = self.capacity.min(self.buf.len());
            loop {
                match self.inner.read(&mut self.buf[..cap]) {
                    Ok(n) => {
                        self.filled = n;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(&self.buf[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

// ── Lending ──────────────────────────────────────────────────────────────────

/// Holds a [`ByteCursor`] so it can be handed to a decoder that owns its
/// input, and taken back afterwards.
///
/// While the cursor is out the slot reads as empty input.
pub struct CursorSlot<R> {
    cursor: Option<ByteCursor<R>>,
}

impl<R> Default for CursorSlot<R> {
    fn default() -> Self {
        Self { cursor: None }
    }
}

impl<R: Read> CursorSlot<R> {
    pub fn new(cursor: ByteCursor<R>) -> Self {
        Self { cursor: Some(cursor) }
    }

    pub fn buffered(&self) -> usize {
        self.cursor.as_ref().map_or(0, |cursor| cursor.buffered())
    }

    /// See [`ByteCursor::peek`].
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        match &mut self.cursor {
            Some(cursor) => cursor.peek(n),
            None => Ok(&[]),
        }
    }

    /// See [`ByteCursor::discard`].
    pub fn discard(&mut self, n: usize) -> io::Result<usize> {
        match &mut self.cursor {
            Some(cursor) => cursor.discard(n),
            None => Ok(0),
        }
    }

    pub fn into_cursor(self) -> Option<ByteCursor<R>> {
        self.cursor
    }
}

impl<R: Read> Read for CursorSlot<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match &mut self.cursor {
            Some(cursor) => cursor.read(out),
            None => Ok(0),
        }
    }
}

impl<R: Read> BufRead for CursorSlot<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match &mut self.cursor {
            Some(cursor) => cursor.fill_buf(),
            None => Ok(&[]),
        }
    }

    fn consume(&mut self, amt: usize) {
        if let Some(cursor) = &mut self.cursor {
            cursor.consume(amt);
        }
    }
}
