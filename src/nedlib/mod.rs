//! Reader for legacy site-crawl snapshots.
//!
//! A snapshot is a pair of files: `<name>.meta` holds the HTTP response
//! head the crawler received (status line and headers, plus a few
//! crawler-added `Arc-*` headers), `<name>` holds the response body.
//! [`NedlibReader`] turns one pair into a single `response` record.
//!
//! | `.meta` header | In the record                              |
//! |----------------|--------------------------------------------|
//! | `Arc-Url`      | `WARC-Target-URI`                          |
//! | `Arc-Length`   | replaces the HTTP `Content-Length`         |
//! | other `Arc-*`  | dropped                                    |
//! | `Date`         | `WARC-Date` (else the caller's default)    |

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::arc::meta::HTTP_RESPONSE_CONTENT_TYPE;
use crate::error::ArcError;
use crate::record::{
    ArchiveRecord, HeaderMap, RecordBuilder, RecordType, Validation, CONTENT_LENGTH, CONTENT_TYPE,
    WARC_DATE, WARC_TARGET_URI,
};
use crate::source::{RecordSource, SourceItem};
use crate::timestamp::parse_http_date;

pub const META_EXTENSION: &str = "meta";

const ARC_HEADER_PREFIX: &str = "arc-";
const ARC_URL: &str = "Arc-Url";
const ARC_LENGTH: &str = "Arc-Length";

pub struct NedlibReader {
    meta_path:    PathBuf,
    default_time: DateTime<Utc>,
    end:          Option<i64>,
}

impl NedlibReader {
    /// `default_time` dates the record when the response has no `Date`.
    pub fn new<P: AsRef<Path>>(meta_path: P, default_time: DateTime<Utc>) -> Self {
        Self { meta_path: meta_path.as_ref().to_path_buf(), default_time, end: None }
    }

    pub fn is_snapshot_meta<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().extension().is_some_and(|ext| ext == META_EXTENSION)
    }

    /// Path of the body file that belongs to the `.meta` file.
    pub fn payload_path(&self) -> Result<PathBuf, ArcError> {
        if !Self::is_snapshot_meta(&self.meta_path) {
            return Err(ArcError::Nedlib(format!(
                "{} is not a .{META_EXTENSION} file",
                self.meta_path.display()
            )));
        }
        Ok(self.meta_path.with_extension(""))
    }

    /// Build the record; the `i64` is the number of bytes read from disk.
    fn read_snapshot(&self) -> Result<(ArchiveRecord, Validation, i64), ArcError> {
        let meta = fs::read(&self.meta_path)?;
        let mut http = parse_response_head(&String::from_utf8_lossy(&meta))?;

        let date = match http.get("Date") {
            Some(value) => parse_http_date(value)
                .ok_or_else(|| ArcError::Nedlib(format!("unparsable Date header {value:?}")))?,
            None => self.default_time,
        };

        let mut rb = RecordBuilder::new(RecordType::Response);
        rb.add_header(CONTENT_TYPE, HTTP_RESPONSE_CONTENT_TYPE);
        rb.add_header_time(WARC_DATE, date);
        if let Some(url) = http.get(ARC_URL) {
            rb.add_header(WARC_TARGET_URI, url);
        }
        if let Some(length) = http.get(ARC_LENGTH).map(str::to_string) {
            http.set(CONTENT_LENGTH, length);
        }
        let arc_headers: Vec<String> = http
            .iter()
            .filter(|(k, _)| k.to_ascii_lowercase().starts_with(ARC_HEADER_PREFIX))
            .map(|(k, _)| k.to_string())
            .collect();
        for key in &arc_headers {
            http.remove(key);
        }

        http.write(&mut rb)?;
        rb.write_all(b"\r\n")?;

        let payload_path = self.payload_path()?;
        let mut payload = fs::File::open(&payload_path)?;
        let payload_len = rb.read_from(&mut payload)?;
        debug!(meta = %self.meta_path.display(), payload_len, "read snapshot");

        let (record, validation) = rb.build();
        Ok((record, validation, (meta.len() as u64 + payload_len) as i64))
    }
}

impl RecordSource for NedlibReader {
    fn next_record(&mut self) -> SourceItem {
        if let Some(offset) = self.end {
            return SourceItem::EndOfStream { offset };
        }
        match self.read_snapshot() {
            Ok((record, validation, size)) => {
                self.end = Some(size);
                SourceItem::Record { record, offset: 0, validation }
            }
            Err(error) => {
                self.end = Some(0);
                SourceItem::Error { error, offset: 0 }
            }
        }
    }
}

/// Parse an HTTP response head: a status line, then `Name: value` lines up
/// to the first blank line or the end of the text.
fn parse_response_head(text: &str) -> Result<HeaderMap, ArcError> {
    let mut lines = text.split('\n').map(|l| l.trim_end_matches('\r'));
    let status = lines.next().unwrap_or_default();
    check_status_line(status)?;

    let mut head = HeaderMap::new();
    head.set_status_line(status);
    let mut current: Option<(String, String)> = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            // Folded continuation of the previous header.
            let Some((_, value)) = current.as_mut() else {
                return Err(ArcError::Nedlib(format!("malformed header line {line:?}")));
            };
            value.push(' ');
            value.push_str(line.trim());
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ArcError::Nedlib(format!("malformed header line {line:?}")))?;
        if let Some((k, v)) = current.take() {
            head.append(k, v);
        }
        current = Some((name.trim().to_string(), value.trim().to_string()));
    }
    if let Some((k, v)) = current {
        head.append(k, v);
    }

    if let Some(length) = head.get(CONTENT_LENGTH) {
        if length.parse::<u64>().is_err() {
            return Err(ArcError::Nedlib(format!("bad Content-Length {length:?}")));
        }
    }
    Ok(head)
}

fn check_status_line(status: &str) -> Result<(), ArcError> {
    let mut parts = status.splitn(3, ' ');
    let proto = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    let well_formed = proto.starts_with("HTTP/")
        && code.len() == 3
        && code.bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(ArcError::Nedlib(format!("malformed HTTP status line {status:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const META: &str = "HTTP/1.1 200 OK\r\n\
        Date: Sat, 11 Jan 2003 14:37:37 GMT\r\n\
        Server: Apache\r\n\
        Content-Type: image/jpeg\r\n\
        Content-Length: 7\r\n\
        Arc-Url: http://www.nb.no:80/assets/images/Collett9.jpeg\r\n\
        Arc-Length: 10\r\n\
        Arc-Retrieved: yes\r\n";

    fn snapshot(dir: &TempDir, meta: &str, body: &[u8]) -> PathBuf {
        let meta_path = dir.path().join("b863a630.meta");
        fs::write(&meta_path, meta).unwrap();
        fs::write(dir.path().join("b863a630"), body).unwrap();
        meta_path
    }

    fn default_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn one_response_record_then_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot(&dir, META, b"\xff\xd8jpegdata");
        let mut reader = NedlibReader::new(&path, default_time());

        let record = match reader.next_record() {
            SourceItem::Record { record, offset, .. } => {
                assert_eq!(offset, 0);
                record
            }
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(record.record_type(), RecordType::Response);
        assert_eq!(record.content_type(), Some(HTTP_RESPONSE_CONTENT_TYPE));
        assert_eq!(record.target_uri(), Some("http://www.nb.no:80/assets/images/Collett9.jpeg"));
        assert_eq!(record.date().unwrap().timestamp(), 1042295857);

        let block = String::from_utf8_lossy(record.content()).into_owned();
        assert!(block.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(block.contains("Content-Length: 10\r\n"));
        assert!(block.contains("Content-Type: image/jpeg\r\n"));
        assert!(!block.contains("Arc-"));
        assert!(record.content().ends_with(b"\r\n\r\n\xff\xd8jpegdata"));

        let total = (META.len() + 10) as i64;
        assert!(matches!(reader.next_record(), SourceItem::EndOfStream { offset } if offset == total));
        assert!(matches!(reader.next_record(), SourceItem::EndOfStream { .. }));
    }

    #[test]
    fn missing_date_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot(&dir, "HTTP/1.0 404 Not Found\nArc-Url: http://a/\n", b"");
        let mut reader = NedlibReader::new(&path, default_time());
        match reader.next_record() {
            SourceItem::Record { record, .. } => assert_eq!(record.date(), Some(default_time())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_content_length() {
        let dir = tempfile::tempdir().unwrap();
        let meta = "HTTP/1.0 200 OK\nContent-Length: 9726Fri, 04 Apr 2003 08:36:47 GMT\n";
        let path = snapshot(&dir, meta, b"");
        let mut reader = NedlibReader::new(&path, default_time());
        match reader.next_record() {
            SourceItem::Error { error, offset } => {
                assert_eq!(offset, 0);
                assert_eq!(error.to_string(), "snapshot error: bad Content-Length \"9726Fri, 04 Apr 2003 08:36:47 GMT\"");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(reader.next_record().is_end());
    }

    #[test]
    fn malformed_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for meta in ["garbage\n", "HTTP/1.0 2000 OK\n", "HTTP/1.0 200 OK\nno colon here\n", "HTTP/1.0 200 OK\nDate: someday\n"] {
            let path = snapshot(&dir, meta, b"");
            match NedlibReader::new(&path, default_time()).next_record() {
                SourceItem::Error { error, .. } => assert_eq!(error.kind(), ErrorKind::Nedlib, "{meta:?}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn missing_payload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lonely.meta");
        fs::write(&path, "HTTP/1.0 200 OK\n").unwrap();
        match NedlibReader::new(&path, default_time()).next_record() {
            SourceItem::Error { error, .. } => assert_eq!(error.kind(), ErrorKind::Io),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn folded_headers() {
        let head = parse_response_head("HTTP/1.0 200 OK\r\nX-Long: one\r\n two\r\n\r\nbody").unwrap();
        assert_eq!(head.get("x-long"), Some("one two"));
        assert_eq!(head.status_line(), "HTTP/1.0 200 OK");
    }
}
