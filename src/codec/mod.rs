//! gzip member decoding, one member per ARC record.
//!
//! # Framing
//! A compressed ARC file is a plain concatenation of gzip members, each
//! wrapping exactly one record.  Members are decoded one at a time with
//! `flate2`'s single-member [`GzDecoder`] (multistream decoding is never
//! used).  It pulls its input through `BufRead` and stops at the end of its
//! member, so the next member's offset stays exact.  The 8-byte trailer
//! (CRC-32 and ISIZE) is only checked once the member is read to its end,
//! which is why [`finish_member`] drains it before the next one is searched
//! for.
//!
//! # Reuse
//! The decoder is allocated on the first member and reset for every later
//! one.  From then on it owns the reader's cursor; between members the
//! cursor is reached through [`FrameState::input_mut`].
//!
//! # Sniffing
//! [`sniff_member`] decides whether a member header starts at the cursor
//! without consuming anything: the peeked bytes go through a throwaway
//! header parse.  Reserved flag bits, another compression method or a wrong
//! header CRC all mean "no frame here"; the resynchronizer then moves on by
//! one byte.

use std::io::{self, Read};
use std::mem;

use flate2::bufread::GzDecoder;

use crate::error::ArcError;
use crate::io_stream::{ByteCursor, CursorSlot};

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fixed part of a member header.
pub const GZIP_HEADER_MIN: usize = 10;
/// Default cap on the bytes peeked for one member header.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

/// The decoder, reading straight from the archive cursor.
pub type MemberDecoder<R> = GzDecoder<CursorSlot<R>>;

// ── Sniffing ─────────────────────────────────────────────────────────────────

/// Whether a valid member header starts at the cursor.  Nothing is consumed.
///
/// Headers with a file name, comment or extra field can be long, so the peek
/// window doubles until the header parses or `max_header` is reached.
pub fn sniff_member<R: Read>(input: &mut CursorSlot<R>, max_header: usize) -> io::Result<bool> {
    let mut want = GZIP_HEADER_MIN;
    loop {
        let peeked = input.peek(want)?;
        let mut trial = GzDecoder::new(peeked);
        if trial.header().is_some() {
            return Ok(true);
        }
        // The parse error only comes out on read; a header cut off by the
        // window fails with UnexpectedEof.
        let cut_short = matches!(
            trial.read(&mut []),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof
        );
        if !cut_short || peeked.len() < want || want >= max_header {
            return Ok(false);
        }
        want = (want * 2).min(max_header);
    }
}

// ── Decoder state ────────────────────────────────────────────────────────────

/// The archive cursor, plus the one decoder a reader ever allocates.
pub enum FrameState<R> {
    /// No gzip member seen yet; the cursor is held directly.
    Uninitialized(CursorSlot<R>),
    /// The decoder holds the cursor, between members too.
    Ready(MemberDecoder<R>),
}

impl<R: Read> FrameState<R> {
    pub fn new(cursor: ByteCursor<R>) -> Self {
        FrameState::Uninitialized(CursorSlot::new(cursor))
    }

    /// The cursor, wherever it currently lives.
    pub fn input(&self) -> &CursorSlot<R> {
        match self {
            FrameState::Uninitialized(input) => input,
            FrameState::Ready(decoder) => decoder.get_ref(),
        }
    }

    pub fn input_mut(&mut self) -> &mut CursorSlot<R> {
        match self {
            FrameState::Uninitialized(input) => input,
            FrameState::Ready(decoder) => decoder.get_mut(),
        }
    }

    /// Start a member at the cursor position, allocating the decoder on
    /// first use and resetting it afterwards.  The member header is parsed
    /// by the decoder itself.
    pub fn open(&mut self) {
        match self {
            FrameState::Ready(decoder) => {
                let input = mem::take(decoder.get_mut());
                decoder.reset(input);
            }
            FrameState::Uninitialized(input) => {
                let decoder = GzDecoder::new(mem::take(input));
                *self = FrameState::Ready(decoder);
            }
        }
    }

    pub fn decoder_mut(&mut self) -> Option<&mut MemberDecoder<R>> {
        match self {
            FrameState::Ready(decoder) => Some(decoder),
            FrameState::Uninitialized(_) => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, FrameState::Ready(_))
    }
}

/// Read the open member to its end, which makes the decoder verify the
/// trailer.
///
/// Returns the number of decompressed bytes that were drained unread.
pub fn finish_member<R: Read>(decoder: &mut MemberDecoder<R>) -> Result<u64, ArcError> {
    let mut scratch = [0u8; 512];
    let mut drained = 0u64;
    loop {
        match decoder.read(&mut scratch) {
            Ok(0) => return Ok(drained),
            Ok(n) => drained += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArcError::GzipFrame(e.to_string())),
        }
    }
}
