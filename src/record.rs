//! Normalised archive-record model and the builder that produces it.
//!
//! Every reader in this crate, whatever the on-disk format, turns its input
//! into an [`ArchiveRecord`]: a WARC-style header block plus the raw record
//! block bytes.  Readers only ever set a handful of headers (see the field
//! name constants) and stream the payload in; [`RecordBuilder::build`] fills
//! in the rest and reports inconsistencies as a [`Validation`].

use std::fmt;
use std::io::{self, Read, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

// ── Header field names ───────────────────────────────────────────────────────

pub const WARC_TYPE:       &str = "WARC-Type";
pub const WARC_RECORD_ID:  &str = "WARC-Record-ID";
pub const WARC_DATE:       &str = "WARC-Date";
pub const WARC_TARGET_URI: &str = "WARC-Target-URI";
pub const WARC_IP_ADDRESS: &str = "WARC-IP-Address";
pub const CONTENT_TYPE:    &str = "Content-Type";
pub const CONTENT_LENGTH:  &str = "Content-Length";

/// Status line written at the top of every built header block.
pub const WARC_VERSION: &str = "WARC/1.1";

// ── Record type ──────────────────────────────────────────────────────────────

/// WARC record type.  Discriminants are bit flags so a set of types can be
/// passed around as a `u16` mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    WarcInfo     = 2,
    Response     = 4,
    Resource     = 8,
    Request      = 16,
    Metadata     = 32,
    Revisit      = 64,
    Conversion   = 128,
    Continuation = 256,
    Unknown      = 512,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::WarcInfo     => "warcinfo",
            RecordType::Response     => "response",
            RecordType::Resource     => "resource",
            RecordType::Request      => "request",
            RecordType::Metadata     => "metadata",
            RecordType::Revisit      => "revisit",
            RecordType::Conversion   => "conversion",
            RecordType::Continuation => "continuation",
            RecordType::Unknown      => "unknown",
        }
    }

    pub fn matches_bitmask(&self, bitmask: u16) -> bool {
        (*self as u16) & bitmask != 0
    }
}

impl TryFrom<&str> for RecordType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "warcinfo"     => Ok(RecordType::WarcInfo),
            "response"     => Ok(RecordType::Response),
            "resource"     => Ok(RecordType::Resource),
            "request"      => Ok(RecordType::Request),
            "metadata"     => Ok(RecordType::Metadata),
            "revisit"      => Ok(RecordType::Revisit),
            "conversion"   => Ok(RecordType::Conversion),
            "continuation" => Ok(RecordType::Continuation),
            "unknown"      => Ok(RecordType::Unknown),
            other          => Err(format!("unknown record type: {other}")),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Headers ──────────────────────────────────────────────────────────────────

/// Ordered header block with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    status_line: String,
    headers:     Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn set_status_line(&mut self, status_line: impl Into<String>) {
        self.status_line = status_line.into();
    }

    /// Value of the first header named `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace the first `key` header and drop any duplicates, or append.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().trim();
        let value = value.into().trim().to_string();
        let mut found = false;
        self.headers.retain_mut(|h| {
            if !h.0.eq_ignore_ascii_case(key) {
                true
            } else if !found {
                h.1 = value.clone();
                found = true;
                true
            } else {
                false
            }
        });
        if !found {
            self.headers.push((key.to_string(), value));
        }
    }

    /// Append without checking for an existing header of the same name.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.headers
            .push((key.as_ref().trim().to_string(), value.as_ref().trim().to_string()));
    }

    pub fn remove(&mut self, key: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Write the header block, CRLF-terminated lines, without the blank line.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = 0usize;
        if !self.status_line.is_empty() {
            writer.write_all(self.status_line.as_bytes())?;
            writer.write_all(b"\r\n")?;
            written += self.status_line.len() + 2;
        }
        for (key, value) in &self.headers {
            writer.write_all(key.as_bytes())?;
            writer.write_all(b": ")?;
            writer.write_all(value.as_bytes())?;
            writer.write_all(b"\r\n")?;
            written += key.len() + value.len() + 4;
        }
        Ok(written)
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Non-fatal findings collected while a record was read and built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    findings: Vec<String>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: impl Into<String>) {
        self.findings.push(finding.into());
    }

    pub fn extend(&mut self, other: Validation) {
        self.findings.extend(other.findings);
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.findings.iter().map(String::as_str)
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.findings.join("; "))
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    record_type: RecordType,
    headers:     HeaderMap,
    content:     Vec<u8>,
}

impl ArchiveRecord {
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `WARC-Record-ID` without the surrounding angle brackets.
    pub fn record_id(&self) -> Option<&str> {
        self.headers
            .get(WARC_RECORD_ID)
            .map(|id| id.trim_start_matches('<').trim_end_matches('>'))
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.headers.get(WARC_TARGET_URI)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.headers.get(WARC_IP_ADDRESS)
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        let raw = self.headers.get(WARC_DATE)?;
        DateTime::parse_from_rfc3339(raw).ok().map(|d| d.with_timezone(&Utc))
    }

    /// Record block bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Accumulates headers and block bytes for one [`ArchiveRecord`].
///
/// Payload bytes arrive through [`Write`] or [`RecordBuilder::read_from`].
#[derive(Debug)]
pub struct RecordBuilder {
    record_type: RecordType,
    headers:     HeaderMap,
    content:     Vec<u8>,
}

impl RecordBuilder {
    pub fn new(record_type: RecordType) -> Self {
        Self { record_type, headers: HeaderMap::new(), content: Vec::new() }
    }

    pub fn set_record_type(&mut self, record_type: RecordType) {
        self.record_type = record_type;
    }

    pub fn add_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.set(key, value);
    }

    pub fn add_header_time(&mut self, key: &str, time: DateTime<Utc>) {
        self.headers.set(key, time.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    pub fn add_header_u64(&mut self, key: &str, value: u64) {
        self.headers.set(key, value.to_string());
    }

    /// Copy everything `reader` yields into the block; returns the byte count.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<u64> {
        io::copy(reader, &mut self.content)
    }

    /// Block bytes received so far.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Finish the record.
    ///
    /// Adds `WARC-Type`, a fresh `urn:uuid:` record id and, if absent,
    /// `Content-Length`.  A declared `Content-Length` that disagrees with
    /// the received block is reported and repaired.
    pub fn build(self) -> (ArchiveRecord, Validation) {
        let RecordBuilder { record_type, headers: given, content } = self;
        let mut validation = Validation::new();

        let mut headers = HeaderMap::new();
        headers.set_status_line(WARC_VERSION);
        headers.append(WARC_TYPE, record_type.as_str());
        headers.append(WARC_RECORD_ID, format!("<urn:uuid:{}>", Uuid::new_v4()));
        for (k, v) in given.iter() {
            headers.set(k, v);
        }

        let actual = content.len() as u64;
        match headers.get(CONTENT_LENGTH).map(|v| v.parse::<u64>()) {
            Some(Ok(declared)) if declared == actual => {}
            Some(Ok(declared)) => {
                validation.push(format!(
                    "Content-Length {declared} does not match block length {actual}"
                ));
                headers.set(CONTENT_LENGTH, actual.to_string());
            }
            Some(Err(_)) => {
                validation.push("Content-Length is not a number".to_string());
                headers.set(CONTENT_LENGTH, actual.to_string());
            }
            None => headers.set(CONTENT_LENGTH, actual.to_string()),
        }

        (ArchiveRecord { record_type, headers, content }, validation)
    }
}

impl Write for RecordBuilder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.content.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
