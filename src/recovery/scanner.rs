//! Record-boundary resynchronization.
//!
//! # How it works
//!
//! The scanner looks at the next four bytes of the cursor:
//!
//! | Bytes                               | Verdict                               |
//! |-------------------------------------|---------------------------------------|
//! | `1F 8B` and a valid member header   | gzip-framed record                    |
//! | prefix `http`, `file`, `dns`, `ftp` | bare ARC record line                  |
//! | anything else                       | skip one byte, look again             |
//!
//! A `1F 8B` that does not start a valid gzip member header (bad flags, bad
//! header CRC, cut short) is not an error; it is skipped like any other byte.
//! Nothing at a boundary is consumed, so the caller's decoder sees the
//! member header itself.
//! Every failed attempt consumes exactly one byte, so the scan always
//! terminates, either on a boundary or at end of input.
//!
//! The scanner does not know where a record *should* have started.  It
//! reports how many bytes it skipped and the caller turns a non-zero count
//! into a positional error.

use std::io::{self, Read};

use tracing::debug;

use crate::codec::{sniff_member, GZIP_MAGIC};
use crate::io_stream::CursorSlot;

/// Line prefixes that open a bare (uncompressed) ARC record.
pub const RECORD_PREFIXES: [&[u8]; 4] = [b"http", b"file", b"dns", b"ftp"];

/// Bytes inspected at each candidate position.
const LOOKAHEAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A record starts `skipped` bytes after the scan began.
    Found { gzip: bool, skipped: u64 },
    /// Input ran out (fewer than four bytes left) before any boundary.
    EndOfStream { skipped: u64 },
}

impl ScanOutcome {
    pub fn skipped(&self) -> u64 {
        match *self {
            ScanOutcome::Found { skipped, .. } | ScanOutcome::EndOfStream { skipped } => skipped,
        }
    }
}

/// Advance `input` to the next plausible record start.
///
/// Only genuine I/O errors are returned as `Err`.
pub fn find_record_start<R: Read>(
    input:      &mut CursorSlot<R>,
    max_header: usize,
) -> io::Result<ScanOutcome> {
    let mut skipped = 0u64;
    loop {
        let (gzip_magic, line_start) = {
            let window = input.peek(LOOKAHEAD)?;
            if window.len() < LOOKAHEAD {
                if skipped > 0 {
                    debug!(skipped, "input ended while resynchronizing");
                }
                return Ok(ScanOutcome::EndOfStream { skipped });
            }
            (
                window[..2] == GZIP_MAGIC,
                RECORD_PREFIXES.iter().any(|prefix| window.starts_with(prefix)),
            )
        };

        if gzip_magic && sniff_member(input, max_header)? {
            return Ok(ScanOutcome::Found { gzip: true, skipped });
        }
        if line_start {
            return Ok(ScanOutcome::Found { gzip: false, skipped });
        }

        // Nothing recognisable here: skip one byte and retry.
        input.discard(1)?;
        skipped += 1;
    }
}
