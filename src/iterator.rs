//! [`RecordIterator`]: a lazy, filtered sequence over any [`RecordSource`].
//!
//! # Sizes
//! A record's size is the distance from its offset to the offset of the
//! *next source item*, whatever that item is and whether or not the filter
//! wants it.  So every item is held back until its successor has been
//! pulled:
//!
//! | Phase       | Holds                  | On `next()`                                   |
//! |-------------|------------------------|-----------------------------------------------|
//! | `Priming`   | nothing                | pull until an item is admitted                |
//! | `Streaming` | one admitted item      | pull its successor, emit it sized             |
//! | `Draining`  | last item, end offset  | emit it sized up to the end of input          |
//! | `Done`      | nothing                | `None`, without touching the source           |
//!
//! # Selection
//! The filter sees records only; errors always pass and never count towards
//! `nth` or `limit`.  With `nth = n` only the nth accepted record is
//! yielded; otherwise at most `limit` are (0 = unbounded).  Once the
//! selection is satisfied the source is pulled exactly once more, to size
//! the last record, and never again.

use std::mem;

use thiserror::Error;

use crate::config::IteratorOptions;
use crate::error::ArcError;
use crate::record::{ArchiveRecord, Validation};
use crate::source::{RecordSource, SourceItem};

/// A record together with where it sits in the input.
#[derive(Debug)]
pub struct RecordEnvelope {
    pub record:     ArchiveRecord,
    pub offset:     i64,
    pub size:       i64,
    pub validation: Validation,
}

/// An error from the source, placed in the input.
#[derive(Debug, Error)]
#[error("offset: {offset}: {error}")]
pub struct RecordError {
    pub offset: i64,
    pub size:   i64,
    #[source]
    pub error:  ArcError,
}

pub type RecordResult = Result<RecordEnvelope, RecordError>;

/// An admitted item waiting for its successor's offset.
#[derive(Debug)]
enum Held {
    Record { record: ArchiveRecord, offset: i64, validation: Validation },
    Error { error: ArcError, offset: i64 },
}

impl Held {
    fn offset(&self) -> i64 {
        match *self {
            Held::Record { offset, .. } | Held::Error { offset, .. } => offset,
        }
    }

    fn into_result(self, next_offset: i64) -> RecordResult {
        let size = next_offset - self.offset();
        match self {
            Held::Record { record, offset, validation } => {
                Ok(RecordEnvelope { record, offset, size, validation })
            }
            Held::Error { error, offset } => Err(RecordError { offset, size, error }),
        }
    }
}

#[derive(Debug)]
enum Phase {
    Priming,
    Streaming(Held),
    Draining { last: Held, end: i64 },
    Done,
}

/// What selection makes of one source item.
enum Admission {
    Keep(Held),
    Skip,
    End,
}

pub type AcceptAll = fn(&ArchiveRecord) -> bool;

fn accept_all(_: &ArchiveRecord) -> bool {
    true
}

pub struct RecordIterator<S, F = AcceptAll> {
    source:   S,
    filter:   F,
    nth:      usize,
    limit:    usize,
    accepted: usize,
    phase:    Phase,
}

impl<S: RecordSource> RecordIterator<S, AcceptAll> {
    /// Every record, subject to `options`.
    pub fn new(source: S, options: IteratorOptions) -> Self {
        Self::with_filter(source, accept_all, options)
    }
}

impl<S, F> RecordIterator<S, F>
where
    S: RecordSource,
    F: FnMut(&ArchiveRecord) -> bool,
{
    pub fn with_filter(source: S, filter: F, options: IteratorOptions) -> Self {
        Self {
            source,
            filter,
            nth:      options.nth,
            limit:    options.effective_limit(),
            accepted: 0,
            phase:    Phase::Priming,
        }
    }

    /// Records the filter accepted so far, including those skipped on the
    /// way to `nth`.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    fn selection_done(&self) -> bool {
        (self.nth > 0 && self.accepted >= self.nth)
            || (self.limit > 0 && self.accepted >= self.limit)
    }

    fn admit(&mut self, item: SourceItem) -> Admission {
        match item {
            SourceItem::EndOfStream { .. } => Admission::End,
            SourceItem::Error { error, offset } => Admission::Keep(Held::Error { error, offset }),
            SourceItem::Record { record, offset, validation } => {
                if !(self.filter)(&record) {
                    return Admission::Skip;
                }
                self.accepted += 1;
                if self.nth > 0 && self.accepted != self.nth {
                    return Admission::Skip;
                }
                Admission::Keep(Held::Record { record, offset, validation })
            }
        }
    }
}

impl<S, F> Iterator for RecordIterator<S, F>
where
    S: RecordSource,
    F: FnMut(&ArchiveRecord) -> bool,
{
    type Item = RecordResult;

    fn next(&mut self) -> Option<RecordResult> {
        loop {
            match mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,

                Phase::Priming => {
                    let item = self.source.next_record();
                    match self.admit(item) {
                        Admission::Keep(held) => self.phase = Phase::Streaming(held),
                        Admission::Skip => self.phase = Phase::Priming,
                        Admission::End => return None,
                    }
                }

                Phase::Streaming(held) => {
                    let next = self.source.next_record();
                    if let SourceItem::EndOfStream { offset } = next {
                        self.phase = Phase::Draining { last: held, end: offset };
                        continue;
                    }
                    let result = held.into_result(next.offset());
                    if !self.selection_done() {
                        self.phase = match self.admit(next) {
                            Admission::Keep(held) => Phase::Streaming(held),
                            Admission::Skip => Phase::Priming,
                            Admission::End => Phase::Done,
                        };
                    }
                    return Some(result);
                }

                Phase::Draining { last, end } => return Some(last.into_result(end)),
            }
        }
    }
}

// ── Error policy ─────────────────────────────────────────────────────────────

/// What a consumer does when the sequence yields an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the first error.
    #[default]
    Abort,
    /// Keep going while errors keep moving forward through the input.
    Force,
}

/// Applies an [`ErrorPolicy`] to a stream of errors.
///
/// Under `Force` an error at or before the previous error's offset stops
/// the walk; a source stuck on one position would otherwise never end.
#[derive(Debug, Clone)]
pub struct ErrorGuard {
    policy:      ErrorPolicy,
    last_offset: Option<i64>,
}

impl ErrorGuard {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self { policy, last_offset: None }
    }

    /// Whether to keep consuming after `error`.
    pub fn proceed(&mut self, error: &RecordError) -> bool {
        let advanced = self.last_offset.map_or(true, |last| error.offset > last);
        self.last_offset = Some(error.offset);
        self.policy == ErrorPolicy::Force && advanced
    }
}
