//! [`ArcFileReader`]: the ARC [`RecordSource`].
//!
//! ```no_run
//! use arcwalk::arc::ArcFileReader;
//! use arcwalk::config::ReaderOptions;
//! use arcwalk::source::{RecordSource, SourceItem};
//!
//! let mut reader = ArcFileReader::open("crawl.arc.gz", ReaderOptions::default())?;
//! loop {
//!     match reader.next_record() {
//!         SourceItem::Record { record, offset, .. } => {
//!             println!("{offset} {}", record.target_uri().unwrap_or("-"));
//!         }
//!         SourceItem::Error { error, offset } => eprintln!("{offset}: {error}"),
//!         SourceItem::EndOfStream { .. } => break,
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Offsets
//! Every offset is absolute: `start_offset` plus the bytes consumed from
//! the underlying reader.  For gzip-framed files that is a position in the
//! *compressed* stream, which is what makes a later seek to it work.

use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use crate::arc::parser::ArcRecordParser;
use crate::codec::{finish_member, FrameState};
use crate::config::ReaderOptions;
use crate::error::ArcError;
use crate::io_stream::{ByteCursor, CountingReader, ReadProgress};
use crate::record::{ArchiveRecord, Validation};
use crate::recovery::{find_record_start, ScanOutcome};
use crate::source::{RecordSource, SourceItem};

/// A located record start that has not been parsed yet.
#[derive(Debug, Clone, Copy)]
struct Boundary {
    gzip:   bool,
    offset: i64,
}

pub struct ArcFileReader<R> {
    /// The input cursor, lent to the gzip decoder once one exists.
    frame:    FrameState<CountingReader<R>>,
    progress: ReadProgress,
    parser:   ArcRecordParser,
    options:  ReaderOptions,
    /// Boundary found after a misalignment, parsed on the next call.
    pending:  Option<Boundary>,
    /// Set once the reader is exhausted or hit a fatal error.
    end:      Option<i64>,
}

impl ArcFileReader<File> {
    /// Open `path` and seek to `options.start_offset`.
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self, ArcError> {
        let mut file = File::open(path)?;
        if options.start_offset > 0 {
            file.seek(SeekFrom::Start(options.start_offset))?;
        }
        Ok(Self::with_options(file, options))
    }
}

impl<R: Read> ArcFileReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, ReaderOptions::default())
    }

    /// Wrap `inner`, which must already be positioned at
    /// `options.start_offset`.
    pub fn with_options(inner: R, options: ReaderOptions) -> Self {
        let counting = CountingReader::new(inner);
        let progress = counting.progress();
        Self {
            frame: FrameState::new(ByteCursor::with_capacity(options.buffer_size, counting)),
            progress,
            parser: ArcRecordParser::new(options.start_offset == 0),
            options,
            pending: None,
            end: None,
        }
    }

    /// Absolute offset of the next unconsumed byte.
    pub fn position(&self) -> i64 {
        let consumed = self.progress.bytes_read() - self.frame.input().buffered() as u64;
        (self.options.start_offset + consumed) as i64
    }

    /// Handle on the raw byte counter, for polling from another thread.
    ///
    /// It counts bytes pulled from the underlying reader, including
    /// read-ahead, relative to `start_offset`.
    pub fn progress(&self) -> ReadProgress {
        self.progress.clone()
    }

    /// ARC version from the file header, once it has been read.
    pub fn version(&self) -> Option<u32> {
        self.parser.version()
    }

    /// Find the next record start, or produce the item that replaces it.
    fn locate(&mut self) -> Result<Boundary, SourceItem> {
        if let Some(boundary) = self.pending.take() {
            return Ok(boundary);
        }

        let expected = self.position();
        let outcome = find_record_start(self.frame.input_mut(), self.options.max_header_bytes);
        match outcome {
            Err(e) => {
                self.end = Some(expected);
                Err(SourceItem::Error { error: e.into(), offset: expected })
            }
            Ok(ScanOutcome::EndOfStream { .. }) => {
                let offset = self.position();
                debug!(offset, "end of ARC input");
                self.end = Some(offset);
                Err(SourceItem::EndOfStream { offset })
            }
            Ok(ScanOutcome::Found { gzip, skipped }) => {
                let boundary = Boundary { gzip, offset: expected + skipped as i64 };
                if skipped == 0 {
                    return Ok(boundary);
                }
                warn!(expected, found = boundary.offset, skipped, "record start misaligned");
                self.pending = Some(boundary);
                Err(SourceItem::Error {
                    error:  ArcError::MisalignedRecordStart { expected, found: boundary.offset },
                    offset: boundary.offset,
                })
            }
        }
    }

    fn parse_bare(&mut self) -> Result<(ArchiveRecord, Validation), ArcError> {
        let input = self.frame.input_mut();
        let (record, mut validation) = self.parser.parse_record(input)?;
        check_separator(input, &mut validation)?;
        Ok((record, validation))
    }

    /// Parse the record inside the gzip member at the cursor, then drain the
    /// member and check its trailer.
    fn parse_framed(&mut self) -> Result<(ArchiveRecord, Validation), ArcError> {
        self.frame.open();
        let Some(decoder) = self.frame.decoder_mut() else {
            return Err(ArcError::GzipFrame("no gzip frame is open".to_string()));
        };

        let parsed = {
            let mut body = ByteCursor::with_capacity(self.options.buffer_size, &mut *decoder);
            match self.parser.parse_record(&mut body) {
                Ok((record, mut validation)) => check_separator(&mut body, &mut validation)
                    .map(|()| (record, validation, body.buffered() as u64))
                    .map_err(ArcError::from),
                Err(e) => Err(e),
            }
        };
        let parsed = parsed.map_err(frame_error);

        let drained = finish_member(decoder);
        let (record, mut validation, leftover) = parsed?;
        let extra = leftover + drained?;
        if extra > 0 {
            validation.push(format!("{extra} bytes of unread data after the record in its gzip frame"));
        }
        Ok((record, validation))
    }
}

impl<R: Read> RecordSource for ArcFileReader<R> {
    fn next_record(&mut self) -> SourceItem {
        if let Some(offset) = self.end {
            return SourceItem::EndOfStream { offset };
        }

        let boundary = match self.locate() {
            Ok(boundary) => boundary,
            Err(item) => return item,
        };
        let offset = boundary.offset;
        debug!(offset, gzip = boundary.gzip, "record boundary");

        let parsed = if boundary.gzip { self.parse_framed() } else { self.parse_bare() };
        match parsed {
            Ok((record, _)) if self.parser.awaits_header() => {
                let url = record.target_uri().unwrap_or_default().to_string();
                warn!(offset, %url, "record precedes the file header");
                SourceItem::Error { error: ArcError::MissingFileHeader { url }, offset }
            }
            Ok((record, validation)) => {
                if !validation.is_empty() {
                    warn!(offset, %validation, "record has validation findings");
                }
                SourceItem::Record { record, offset, validation }
            }
            Err(ArcError::TruncatedPayload { declared, available }) if !self.options.report_truncation => {
                warn!(offset, declared, available, "truncated payload taken as end of input");
                self.end = Some(offset);
                SourceItem::EndOfStream { offset }
            }
            Err(error) => {
                if error.is_fatal() {
                    self.end = Some(offset);
                }
                SourceItem::Error { error, offset }
            }
        }
    }
}

/// Consume the LF that ends a record, or note its absence.
fn check_separator<B: BufRead>(input: &mut B, validation: &mut Validation) -> io::Result<()> {
    let next = input.fill_buf()?.first().copied();
    match next {
        Some(b'\n') => input.consume(1),
        Some(b) => validation.push(format!("missing record separator, found byte 0x{b:02x}")),
        None => validation.push("missing record separator at end of input"),
    }
    Ok(())
}

/// Corrupt or cut-off deflate data inside a member is a frame error, not a
/// failure of the file as a whole.
fn frame_error(e: ArcError) -> ArcError {
    match e {
        ArcError::Io(io)
            if matches!(
                io.kind(),
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof
            ) =>
        {
            ArcError::GzipFrame(io.to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::RecordType;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const HEADER: &str = "filedesc://t.arc 0.0.0.0 20060928223931 text/plain 11\n1 0 Test\nA\n\n";
    const HTTP: &str = "http://example.com 1.2.3.4 20060928223931 text/html 5\nhello\n";
    const DNS: &str = "dns:example.com 1.2.3.4 20060928223931 text/dns 3\nabc\n";

    fn gz(member: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(member.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    fn drain<S: RecordSource>(source: &mut S) -> Vec<SourceItem> {
        let mut items = Vec::new();
        loop {
            let item = source.next_record();
            let end = item.is_end();
            items.push(item);
            if end {
                return items;
            }
        }
    }

    fn offsets(items: &[SourceItem]) -> Vec<i64> {
        items.iter().map(SourceItem::offset).collect()
    }

    #[test]
    fn bare_file() {
        let text = format!("{HEADER}{HTTP}{DNS}");
        let mut reader = ArcFileReader::new(Cursor::new(text.clone().into_bytes()));
        let items = drain(&mut reader);

        let h = HEADER.len() as i64;
        let d = h + HTTP.len() as i64;
        assert_eq!(offsets(&items), vec![0, h, d, text.len() as i64]);
        assert_eq!(reader.version(), Some(1));
        match &items[1] {
            SourceItem::Record { record, validation, .. } => {
                assert!(validation.is_empty(), "{validation}");
                assert_eq!(record.record_type(), RecordType::Response);
                assert_eq!(record.content(), b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gzip_file_offsets_are_compressed_positions() {
        let members = [gz(HEADER), gz(HTTP), gz(DNS)];
        let bytes: Vec<u8> = members.concat();
        let mut reader = ArcFileReader::new(Cursor::new(bytes.clone()));
        let items = drain(&mut reader);

        let a = members[0].len() as i64;
        let b = a + members[1].len() as i64;
        assert_eq!(offsets(&items), vec![0, a, b, bytes.len() as i64]);
        for item in &items[..3] {
            match item {
                SourceItem::Record { validation, .. } => assert!(validation.is_empty(), "{validation}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn misaligned_start_is_reported_then_parsed() {
        let text = format!("{HEADER}xx{HTTP}");
        let mut reader = ArcFileReader::new(Cursor::new(text.into_bytes()));
        let items = drain(&mut reader);

        let h = HEADER.len() as i64;
        assert_eq!(offsets(&items), vec![0, h + 2, h + 2, h + 2 + HTTP.len() as i64]);
        match &items[1] {
            SourceItem::Error { error: ArcError::MisalignedRecordStart { expected, found }, .. } => {
                assert_eq!((*expected, *found), (h, h + 2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(items[2], SourceItem::Record { .. }));
    }

    #[test]
    fn unsupported_version_latches() {
        let text = "filedesc://t.arc 0.0.0.0 20060928223931 text/plain 11\n2 0 Test\nA\n\n";
        let mut reader = ArcFileReader::new(Cursor::new(text.as_bytes().to_vec()));
        match reader.next_record() {
            SourceItem::Error { error, offset } => {
                assert_eq!(error.kind(), ErrorKind::UnsupportedVersion);
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(reader.next_record(), SourceItem::EndOfStream { offset: 0 }));
        assert!(matches!(reader.next_record(), SourceItem::EndOfStream { offset: 0 }));
    }

    #[test]
    fn truncation_ends_quietly_by_default() {
        let text = format!("{HEADER}http://a 1.2.3.4 20060928223931 text/html 50\nshort");
        let mut reader = ArcFileReader::new(Cursor::new(text.into_bytes()));
        let items = drain(&mut reader);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], SourceItem::EndOfStream { offset } if offset == HEADER.len() as i64));
    }

    #[test]
    fn truncation_reported_on_request() {
        let text = format!("{HEADER}http://a 1.2.3.4 20060928223931 text/html 50\nshort");
        let options = ReaderOptions { report_truncation: true, ..ReaderOptions::default() };
        let mut reader = ArcFileReader::with_options(Cursor::new(text.into_bytes()), options);
        let items = drain(&mut reader);
        assert_eq!(items.len(), 3);
        match &items[1] {
            SourceItem::Error { error, .. } => {
                assert!(matches!(error, ArcError::TruncatedPayload { declared: 50, available: 5 }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_gzip_member() {
        let mut bytes = gz(HEADER);
        let first = bytes.len() as i64;
        let second = gz(HTTP);
        bytes.extend_from_slice(&second[..second.len() - 12]);
        let mut reader = ArcFileReader::new(Cursor::new(bytes));
        let items = drain(&mut reader);
        assert!(matches!(items[0], SourceItem::Record { .. }));
        assert_eq!(items[1].offset(), first);
        assert!(!items.iter().any(|i| matches!(i, SourceItem::Record { offset, .. } if *offset == first)));
    }

    #[test]
    fn missing_separator_is_a_finding() {
        let text = format!("{HEADER}dns:a 1.2.3.4 20060928223931 text/dns 3\nabc");
        let mut reader = ArcFileReader::new(Cursor::new(text.into_bytes()));
        reader.next_record();
        match reader.next_record() {
            SourceItem::Record { validation, .. } => assert_eq!(validation.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extra_bytes_in_gzip_frame_are_drained() {
        let mut bytes = gz(HEADER);
        let second = bytes.len() as i64;
        bytes.extend(gz(&format!("{DNS}trailing junk")));
        let total = bytes.len() as i64;
        let mut reader = ArcFileReader::new(Cursor::new(bytes));
        let items = drain(&mut reader);
        assert_eq!(offsets(&items), vec![0, second, total]);
        match &items[1] {
            SourceItem::Record { validation, record, .. } => {
                assert_eq!(record.content(), b"abc");
                assert_eq!(validation.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_trailer_is_a_frame_error() {
        let mut bytes = gz(HEADER);
        let h = bytes.len() as i64;
        let mut second = gz(HTTP);
        let n = second.len();
        second[n - 8] ^= 0xff;
        bytes.extend(second);
        bytes.extend(gz(DNS));
        let mut reader = ArcFileReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_record(), SourceItem::Record { offset: 0, .. }));
        match reader.next_record() {
            SourceItem::Error { error, offset } => {
                assert_eq!(error.kind(), ErrorKind::GzipFrame);
                assert_eq!(offset, h);
            }
            other => panic!("unexpected {other:?}"),
        }
        let third = h + n as i64;
        assert!(matches!(reader.next_record(), SourceItem::Record { offset, .. } if offset == third));
    }

    #[test]
    fn headerless_file_is_an_error_at_offset_zero() {
        let text = format!("{HTTP}{DNS}");
        let mut reader = ArcFileReader::new(Cursor::new(text.into_bytes()));
        let items = drain(&mut reader);
        match &items[0] {
            SourceItem::Error { error, offset } => {
                assert_eq!(error.kind(), ErrorKind::MissingFileHeader);
                assert!(!error.is_fatal());
                assert_eq!(*offset, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        // The record was consumed whole, so the next one stays aligned.
        assert!(matches!(items[1], SourceItem::Error { offset, .. } if offset == HTTP.len() as i64));
    }

    #[test]
    fn headerless_gzip_file_is_an_error_too() {
        let bytes = gz(DNS);
        let mut reader = ArcFileReader::new(Cursor::new(bytes));
        match reader.next_record() {
            SourceItem::Error { error, offset: 0 } => assert_eq!(error.kind(), ErrorKind::MissingFileHeader),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reading_from_mid_file_needs_no_header() {
        let text = format!("{HTTP}{DNS}");
        let options = ReaderOptions { start_offset: 500, ..ReaderOptions::default() };
        let mut reader = ArcFileReader::with_options(Cursor::new(text.into_bytes()), options);
        let items = drain(&mut reader);
        assert_eq!(offsets(&items), vec![500, 500 + HTTP.len() as i64, 500 + (HTTP.len() + DNS.len()) as i64]);
        match &items[0] {
            SourceItem::Record { validation, .. } => assert!(validation.is_empty(), "{validation}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(items[1], SourceItem::Record { .. }));
    }

    #[test]
    fn progress_tracks_bytes_read() {
        let text = format!("{HEADER}{HTTP}");
        let mut reader = ArcFileReader::new(Cursor::new(text.clone().into_bytes()));
        let progress = reader.progress();
        assert_eq!(progress.bytes_read(), 0);
        drain(&mut reader);
        assert_eq!(progress.bytes_read(), text.len() as u64);
    }
}
