//! Error model shared by the ARC extractor, the snapshot reader and the
//! record sequence.
//!
//! Errors never carry their own byte offset; the [`RecordSource`] reports
//! the offset next to the error and the sequence folds both into a
//! [`RecordError`](crate::iterator::RecordError).
//!
//! [`RecordSource`]: crate::source::RecordSource

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArcError {
    #[error("unsupported ARC version: {version}")]
    UnsupportedVersion { version: u32 },

    #[error("could not parse ARC record from: {line:?}")]
    MalformedMetadataLine { line: String },

    #[error("record {url:?} precedes the filedesc:// file header")]
    MissingFileHeader { url: String },

    #[error("malformed 14-digit date: {value:?}")]
    MalformedDate { value: String },

    #[error("expected start of record at offset: {expected}, but record was found at offset: {found}")]
    MisalignedRecordStart { expected: i64, found: i64 },

    #[error("truncated payload: {declared} bytes declared, {available} available")]
    TruncatedPayload { declared: u64, available: u64 },

    #[error("gzip frame error: {0}")]
    GzipFrame(String),

    #[error("snapshot error: {0}")]
    Nedlib(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fieldless discriminant of [`ArcError`], for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedVersion,
    MalformedMetadataLine,
    MissingFileHeader,
    MalformedDate,
    MisalignedRecordStart,
    TruncatedPayload,
    GzipFrame,
    Nedlib,
    Io,
}

impl ArcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArcError::UnsupportedVersion { .. }    => ErrorKind::UnsupportedVersion,
            ArcError::MalformedMetadataLine { .. } => ErrorKind::MalformedMetadataLine,
            ArcError::MissingFileHeader { .. }     => ErrorKind::MissingFileHeader,
            ArcError::MalformedDate { .. }         => ErrorKind::MalformedDate,
            ArcError::MisalignedRecordStart { .. } => ErrorKind::MisalignedRecordStart,
            ArcError::TruncatedPayload { .. }      => ErrorKind::TruncatedPayload,
            ArcError::GzipFrame(_)                 => ErrorKind::GzipFrame,
            ArcError::Nedlib(_)                    => ErrorKind::Nedlib,
            ArcError::Io(_)                        => ErrorKind::Io,
        }
    }

    /// Whether the source that produced this error has nothing more to give.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArcError::UnsupportedVersion { .. } | ArcError::TruncatedPayload { .. } | ArcError::Io(_)
        )
    }

    pub(crate) fn malformed_line(line: &str) -> Self {
        ArcError::MalformedMetadataLine {
            line: line.trim_end_matches(['\r', '\n']).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArcError>;
