//! The ARC v1 metadata line and the file-header version line.
//!
//! ```text
//! <url> <ip-address> <archive-date> <content-type> <length>
//! http://example.com/ 93.184.216.34 20060928223931 text/html 1270
//! ```

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};

use crate::error::ArcError;
use crate::record::RecordType;
use crate::timestamp::parse_date14;

pub const FILEDESC_PREFIX: &str = "filedesc://";

pub const HTTP_RESPONSE_CONTENT_TYPE: &str = "application/http;msgtype=response";
pub const DNS_CONTENT_TYPE: &str = "text/dns";

/// The only ARC version this crate reads.
pub const ARC_VERSION_1: u32 = 1;

/// One parsed metadata line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcRecordMeta {
    pub url:                   String,
    pub ip_address:            String,
    pub date14:                String,
    pub declared_content_type: String,
    pub length:                u64,
}

impl ArcRecordMeta {
    /// Parse a v1 metadata line.  Trailing CR/LF is ignored.
    ///
    /// The line must hold exactly five space-separated, non-empty fields,
    /// the date and length fields all digits.  The date's calendar
    /// validity is checked separately by [`ArcRecordMeta::date`].
    pub fn parse(line: &str) -> Result<Self, ArcError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = trimmed.split(' ').collect();
        let &[url, ip, date, content_type, length] = fields.as_slice() else {
            return Err(ArcError::malformed_line(line));
        };
        if fields.iter().any(|f| f.is_empty()) || !is_digits(date) || !is_digits(length) {
            return Err(ArcError::malformed_line(line));
        }
        let length = length
            .parse::<u64>()
            .map_err(|_| ArcError::malformed_line(line))?;

        Ok(Self {
            url:                   url.to_string(),
            ip_address:            ip.to_string(),
            date14:                date.to_string(),
            declared_content_type: content_type.to_string(),
            length,
        })
    }

    pub fn date(&self) -> Result<DateTime<Utc>, ArcError> {
        parse_date14(&self.date14)
    }

    pub fn is_file_header(&self) -> bool {
        self.url.starts_with(FILEDESC_PREFIX)
    }

    /// Record type implied by the URL scheme.
    pub fn record_kind(&self) -> RecordType {
        if self.is_file_header() {
            RecordType::WarcInfo
        } else if self.url.starts_with("http") {
            RecordType::Response
        } else {
            RecordType::Resource
        }
    }

    /// Content type the emitted record carries.
    ///
    /// HTTP captures hold the full response, so they become
    /// `application/http`; DNS lookups get `text/dns`; everything else
    /// keeps what the line declared.
    pub fn effective_content_type(&self) -> &str {
        if self.url.starts_with("http") {
            HTTP_RESPONSE_CONTENT_TYPE
        } else if self.url.starts_with("dns:") {
            DNS_CONTENT_TYPE
        } else {
            &self.declared_content_type
        }
    }

    /// Render back to wire form, without the line feed.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.url, self.ip_address, self.date14, self.declared_content_type, self.length
        )
    }
}

/// Parse the version from the second file-header line (`1 0 Archive`).
pub fn parse_version_line(line: &str) -> Result<u32, ArcError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let first = trimmed.split(' ').next().unwrap_or_default();
    first.parse::<u32>().map_err(|_| ArcError::malformed_line(line))
}

/// Decode a raw metadata line.  Bytes that are not UTF-8 are taken as
/// Windows-1252, which is what old crawlers wrote.
pub fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => match WINDOWS_1252.decode(raw, DecoderTrap::Replace) {
            Ok(s) => Cow::Owned(s),
            Err(_) => String::from_utf8_lossy(raw),
        },
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_http_line() {
        let meta = ArcRecordMeta::parse(
            "http://www.nb.no/ 158.39.129.54 20060928223931 text/html 1270\n",
        )
        .unwrap();
        assert_eq!(meta.url, "http://www.nb.no/");
        assert_eq!(meta.ip_address, "158.39.129.54");
        assert_eq!(meta.date14, "20060928223931");
        assert_eq!(meta.declared_content_type, "text/html");
        assert_eq!(meta.length, 1270);
        assert_eq!(meta.record_kind(), RecordType::Response);
        assert_eq!(meta.effective_content_type(), HTTP_RESPONSE_CONTENT_TYPE);
        assert_eq!(meta.date().unwrap().timestamp(), 1159483171);
    }

    #[test]
    fn classification_by_scheme() {
        let line = |url: &str| format!("{url} 0.0.0.0 20000101000000 text/plain 0");
        let dns = ArcRecordMeta::parse(&line("dns:example.com")).unwrap();
        assert_eq!(dns.record_kind(), RecordType::Resource);
        assert_eq!(dns.effective_content_type(), DNS_CONTENT_TYPE);

        let ftp = ArcRecordMeta::parse(&line("ftp://host/file")).unwrap();
        assert_eq!(ftp.record_kind(), RecordType::Resource);
        assert_eq!(ftp.effective_content_type(), "text/plain");

        let header = ArcRecordMeta::parse(&line("filedesc://x.arc")).unwrap();
        assert_eq!(header.record_kind(), RecordType::WarcInfo);
        assert_eq!(header.effective_content_type(), "text/plain");
    }

    #[test]
    fn grammar_mismatches_are_malformed() {
        for bad in [
            "",
            "http://a 0.0.0.0 20000101000000 text/plain",
            "http://a 0.0.0.0 20000101000000 text/plain 5 extra",
            "http://a  20000101000000 text/plain 5",
            "http://a 0.0.0.0 2000-01-01 text/plain 5",
            "http://a 0.0.0.0 20000101000000 text/plain five",
            "http://a 0.0.0.0 20000101000000 text/plain 99999999999999999999999",
        ] {
            let err = ArcRecordMeta::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedMetadataLine, "{bad:?}");
        }
    }

    #[test]
    fn short_date_is_a_date_error() {
        let meta = ArcRecordMeta::parse("http://a 0.0.0.0 200001010000 text/plain 0").unwrap();
        assert_eq!(meta.date().unwrap_err().kind(), ErrorKind::MalformedDate);
    }

    #[test]
    fn crlf_is_stripped() {
        let meta = ArcRecordMeta::parse("dns:a 1.1.1.1 20000101000000 text/dns 3\r\n").unwrap();
        assert_eq!(meta.length, 3);
        assert_eq!(meta.to_line(), "dns:a 1.1.1.1 20000101000000 text/dns 3");
    }

    #[test]
    fn version_line() {
        assert_eq!(parse_version_line("1 0 The Archive\n").unwrap(), 1);
        assert_eq!(parse_version_line("2 0 Other\n").unwrap(), 2);
        assert_eq!(
            parse_version_line("one 0\n").unwrap_err().kind(),
            ErrorKind::MalformedMetadataLine
        );
    }

    #[test]
    fn latin1_lines_are_decoded() {
        let raw = b"http://example.com/caf\xe9 0.0.0.0 20000101000000 text/html 0\n";
        let line = decode_line(raw);
        let meta = ArcRecordMeta::parse(&line).unwrap();
        assert_eq!(meta.url, "http://example.com/café");
    }
}
