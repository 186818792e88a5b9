use crate::codec::DEFAULT_MAX_HEADER_BYTES;
use crate::io_stream::DEFAULT_BUFFER_SIZE;

/// Configuration for [`ArcFileReader`](crate::arc::ArcFileReader).
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Absolute byte offset the reader starts at.
    pub start_offset:      u64,
    pub buffer_size:       usize,
    /// Yield `TruncatedPayload` instead of ending quietly when the last
    /// record is shorter than declared.
    pub report_truncation: bool,
    /// Cap on the bytes examined for one gzip member header.
    pub max_header_bytes:  usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            start_offset:      0,
            buffer_size:       DEFAULT_BUFFER_SIZE,
            report_truncation: false,
            max_header_bytes:  DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

/// Record selection for [`RecordIterator`](crate::iterator::RecordIterator).
///
/// Both counts apply to records that passed the filter; `0` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorOptions {
    /// Yield only the nth record (1-based).
    pub nth:   usize,
    /// Yield at most this many records.
    pub limit: usize,
}

impl IteratorOptions {
    pub fn new(nth: usize, limit: usize) -> Self {
        Self { nth, limit }
    }

    /// `limit` as it applies: ignored whenever `nth` is set.
    pub fn effective_limit(&self) -> usize {
        if self.nth > 0 { 0 } else { self.limit }
    }
}
