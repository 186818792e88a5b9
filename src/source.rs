//! The pull contract every archive reader implements.
//!
//! A source yields one [`SourceItem`] per call: a record, the end of the
//! stream, or an error.  All three carry an absolute byte offset so the
//! consumer can compute record sizes and report where things went wrong.
//! After `EndOfStream` a well-behaved source keeps returning `EndOfStream`.

use crate::error::ArcError;
use crate::record::{ArchiveRecord, Validation};

#[derive(Debug)]
pub enum SourceItem {
    Record {
        record:     ArchiveRecord,
        offset:     i64,
        validation: Validation,
    },
    /// No more records; `offset` is where the input ended.
    EndOfStream { offset: i64 },
    Error { error: ArcError, offset: i64 },
}

impl SourceItem {
    pub fn offset(&self) -> i64 {
        match *self {
            SourceItem::Record { offset, .. }
            | SourceItem::EndOfStream { offset }
            | SourceItem::Error { offset, .. } => offset,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, SourceItem::EndOfStream { .. })
    }
}

pub trait RecordSource {
    fn next_record(&mut self) -> SourceItem;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn next_record(&mut self) -> SourceItem {
        (**self).next_record()
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_record(&mut self) -> SourceItem {
        (**self).next_record()
    }
}
