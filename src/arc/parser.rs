//! Parses the bytes of one ARC record into an [`ArchiveRecord`].
//!
//! The parser sees a plain [`BufRead`] positioned at a metadata line; it
//! does not know whether the bytes come straight from the file or out of a
//! gzip member.  Payload reads are bounded by the declared length, so a
//! record can never swallow bytes of the next one.

use std::io::{self, BufRead, Read, Write};

use crate::arc::meta::{
    decode_line, parse_version_line, ArcRecordMeta, ARC_VERSION_1, FILEDESC_PREFIX,
};
use crate::error::ArcError;
use crate::io_stream::CountingReader;
use crate::record::{
    ArchiveRecord, RecordBuilder, RecordType, Validation, CONTENT_LENGTH, CONTENT_TYPE,
    WARC_DATE, WARC_IP_ADDRESS, WARC_TARGET_URI,
};

/// Longest metadata, version or field line accepted.
const MAX_LINE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ArcRecordParser {
    version:       Option<u32>,
    expect_header: bool,
}

impl Default for ArcRecordParser {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ArcRecordParser {
    /// `expect_header` is false when reading starts mid-file, where no
    /// `filedesc://` header will ever be seen.
    pub fn new(expect_header: bool) -> Self {
        Self { version: None, expect_header }
    }

    /// Version from the file header, once one has been parsed.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Whether the next data record would come before a required
    /// `filedesc://` header.
    pub fn awaits_header(&self) -> bool {
        self.expect_header && self.version.is_none()
    }

    /// Parse one record.  `input` must be positioned at its metadata line;
    /// on success it is left right after the declared payload.
    pub fn parse_record<B: BufRead>(
        &mut self,
        input: &mut B,
    ) -> Result<(ArchiveRecord, Validation), ArcError> {
        let raw = read_line(input)?;
        let line = decode_line(&raw);
        if line.starts_with(FILEDESC_PREFIX) {
            self.parse_file_header(input, &raw, &line)
        } else {
            self.parse_data_record(input, &line)
        }
    }

    fn parse_file_header<B: BufRead>(
        &mut self,
        input: &mut B,
        raw:   &[u8],
        line:  &str,
    ) -> Result<(ArchiveRecord, Validation), ArcError> {
        let version_line = read_line(input)?;
        let version = parse_version_line(&decode_line(&version_line))?;
        if version != ARC_VERSION_1 {
            return Err(ArcError::UnsupportedVersion { version });
        }

        let meta = ArcRecordMeta::parse(line)?;
        let date = meta.date()?;
        let fields_line = read_line(input)?;

        let consumed = (version_line.len() + fields_line.len()) as u64;
        let remaining = meta
            .length
            .checked_sub(consumed)
            .ok_or_else(|| ArcError::malformed_line(line))?;
        self.version = Some(version);

        let mut rb = RecordBuilder::new(RecordType::WarcInfo);
        rb.add_header(WARC_TARGET_URI, meta.url.as_str());
        rb.add_header(CONTENT_TYPE, meta.declared_content_type.as_str());
        rb.add_header_time(WARC_DATE, date);
        rb.write_all(raw)?;
        rb.write_all(&version_line)?;
        rb.write_all(&fields_line)?;
        copy_payload(input, &mut rb, remaining, meta.length, consumed)?;

        Ok(rb.build())
    }

    fn parse_data_record<B: BufRead>(
        &mut self,
        input: &mut B,
        line:  &str,
    ) -> Result<(ArchiveRecord, Validation), ArcError> {
        let meta = ArcRecordMeta::parse(line)?;
        let date = meta.date()?;

        let mut rb = RecordBuilder::new(meta.record_kind());
        rb.add_header(WARC_TARGET_URI, meta.url.as_str());
        rb.add_header(CONTENT_TYPE, meta.effective_content_type());
        rb.add_header_time(WARC_DATE, date);
        rb.add_header_u64(CONTENT_LENGTH, meta.length);
        rb.add_header(WARC_IP_ADDRESS, meta.ip_address.as_str());
        copy_payload(input, &mut rb, meta.length, meta.length, 0)?;

        Ok(rb.build())
    }
}

fn read_line<B: BufRead>(input: &mut B) -> Result<Vec<u8>, ArcError> {
    let mut raw = Vec::new();
    input.by_ref().take(MAX_LINE_BYTES).read_until(b'\n', &mut raw)?;
    if raw.last() != Some(&b'\n') {
        if raw.len() as u64 >= MAX_LINE_BYTES {
            let head = String::from_utf8_lossy(&raw[..80]);
            return Err(ArcError::malformed_line(&format!("{head}...")));
        }
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "ARC header line ended without a line feed",
        )
        .into());
    }
    Ok(raw)
}

/// Copy exactly `want` bytes into the builder.  `declared` and `already`
/// only feed the truncation error.
fn copy_payload<B: BufRead>(
    input:    &mut B,
    rb:       &mut RecordBuilder,
    want:     u64,
    declared: u64,
    already:  u64,
) -> Result<(), ArcError> {
    let mut limited = CountingReader::limited(input, want);
    let copied = match rb.read_from(&mut limited) {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => limited.bytes_read(),
        Err(e) => return Err(e.into()),
    };
    if copied < want {
        return Err(ArcError::TruncatedPayload { declared, available: already + copied });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::meta::{DNS_CONTENT_TYPE, HTTP_RESPONSE_CONTENT_TYPE};
    use crate::error::ErrorKind;
    use std::io::{Cursor, Read};

    const VERSION: &str = "1 0 Test\n";
    const FIELDS: &str = "URL IP-address Archive-date Content-type Archive-length\n";

    fn file_header(extra: &str) -> String {
        let length = VERSION.len() + FIELDS.len() + extra.len();
        format!(
            "filedesc://test.arc 0.0.0.0 20060928223931 text/plain {length}\n{VERSION}{FIELDS}{extra}"
        )
    }

    #[test]
    fn file_header_record() {
        let text = file_header("<arcmetadata/>");
        let mut input = Cursor::new(format!("{text}\n").into_bytes());
        let mut parser = ArcRecordParser::default();

        let (record, validation) = parser.parse_record(&mut input).unwrap();
        assert!(validation.is_empty(), "{validation}");
        assert_eq!(parser.version(), Some(1));
        assert_eq!(record.record_type(), RecordType::WarcInfo);
        assert_eq!(record.target_uri(), Some("filedesc://test.arc"));
        assert_eq!(record.content_type(), Some("text/plain"));
        assert_eq!(record.content(), text.as_bytes());

        let mut rest = Vec::new();
        input.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"\n");
    }

    #[test]
    fn unsupported_version() {
        let text = "filedesc://x.arc 0.0.0.0 20060928223931 text/plain 9\n2 0 Test\n";
        let err = ArcRecordParser::default()
            .parse_record(&mut Cursor::new(text.as_bytes()))
            .unwrap_err();
        assert!(matches!(err, ArcError::UnsupportedVersion { version: 2 }));
    }

    #[test]
    fn header_length_shorter_than_its_lines() {
        let text = format!("filedesc://x.arc 0.0.0.0 20060928223931 text/plain 3\n{VERSION}{FIELDS}");
        let err = ArcRecordParser::default()
            .parse_record(&mut Cursor::new(text.into_bytes()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMetadataLine);
    }

    #[test]
    fn data_records() {
        let text = format!(
            "{}\nhttp://example.com 1.2.3.4 20060928223931 text/html 5\nhello\ndns:example.com 1.2.3.4 20060928223931 text/dns 3\nabc\n",
            file_header("")
        );
        let mut input = Cursor::new(text.into_bytes());
        let mut parser = ArcRecordParser::default();
        parser.parse_record(&mut input).unwrap();
        input.consume(1);

        let (http, validation) = parser.parse_record(&mut input).unwrap();
        assert!(validation.is_empty(), "{validation}");
        assert_eq!(http.record_type(), RecordType::Response);
        assert_eq!(http.content_type(), Some(HTTP_RESPONSE_CONTENT_TYPE));
        assert_eq!(http.ip_address(), Some("1.2.3.4"));
        assert_eq!(http.headers().get(CONTENT_LENGTH), Some("5"));
        assert_eq!(http.content(), b"hello");
        input.consume(1);

        let (dns, _) = parser.parse_record(&mut input).unwrap();
        assert_eq!(dns.record_type(), RecordType::Resource);
        assert_eq!(dns.content_type(), Some(DNS_CONTENT_TYPE));
        assert_eq!(dns.content(), b"abc");
    }

    #[test]
    fn awaits_header_until_one_is_parsed() {
        assert!(!ArcRecordParser::new(false).awaits_header());

        let mut parser = ArcRecordParser::new(true);
        assert!(parser.awaits_header());
        let text = format!("{}\n", file_header(""));
        parser.parse_record(&mut Cursor::new(text.into_bytes())).unwrap();
        assert!(!parser.awaits_header());
    }

    #[test]
    fn headerless_record_still_parses() {
        let text = "ftp://host/f 1.2.3.4 20060928223931 text/plain 2\nok\n";
        let (record, validation) = ArcRecordParser::new(true)
            .parse_record(&mut Cursor::new(text.as_bytes()))
            .unwrap();
        assert!(validation.is_empty(), "{validation}");
        assert_eq!(record.content(), b"ok");
    }

    #[test]
    fn overlong_line_is_malformed() {
        let mut text = b"http://a/".to_vec();
        text.resize(MAX_LINE_BYTES as usize + 10, b'x');
        text.extend_from_slice(b" 1.2.3.4 20060928223931 text/html 0\n");
        let err = ArcRecordParser::new(false)
            .parse_record(&mut Cursor::new(text))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMetadataLine);
        assert!(err.to_string().len() < 200);
    }

    #[test]
    fn short_payload_is_truncation() {
        let text = "http://a 1.2.3.4 20060928223931 text/html 10\nabc";
        let err = ArcRecordParser::new(false)
            .parse_record(&mut Cursor::new(text.as_bytes()))
            .unwrap_err();
        assert!(matches!(err, ArcError::TruncatedPayload { declared: 10, available: 3 }));
    }

    #[test]
    fn bad_date_and_missing_line_feed() {
        let err = ArcRecordParser::new(false)
            .parse_record(&mut Cursor::new(&b"http://a 1.2.3.4 20061399000000 text/html 0\n"[..]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDate);

        let err = ArcRecordParser::new(false)
            .parse_record(&mut Cursor::new(&b"http://a 1.2.3.4"[..]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
