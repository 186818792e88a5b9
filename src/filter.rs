//! Record selection by id, type, payload content type and HTTP status.

use std::ops::Range;

use crate::record::{ArchiveRecord, RecordType};

/// Conjunction of optional criteria; an empty filter accepts everything.
///
/// * ids: the record's `WARC-Record-ID` must be one of them.  Angle
///   brackets are ignored on both sides.
/// * types: the record type must be in the bitmask.
/// * content types: for HTTP responses the `Content-Type` of the captured
///   response is checked, for other records the record's own.  Any listed
///   substring matches.
/// * status: an HTTP response must have a status code in the range.
///   Records that carry no HTTP response pass.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    ids:           Vec<String>,
    type_mask:     u16,
    content_types: Vec<String>,
    status:        Option<Range<u16>>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.ids.extend(ids.into_iter().map(|id| trim_brackets(id.as_ref()).to_string()));
        self
    }

    pub fn with_record_types(mut self, types: &[RecordType]) -> Self {
        self.type_mask |= types.iter().fold(0, |mask, t| mask | *t as u16);
        self
    }

    pub fn with_content_types<I, T>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.content_types
            .extend(content_types.into_iter().map(|ct| ct.as_ref().to_ascii_lowercase()));
        self
    }

    /// Keep HTTP responses whose status code is in `range` (end exclusive).
    pub fn with_status_range(mut self, range: Range<u16>) -> Self {
        self.status = Some(range);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.type_mask == 0
            && self.content_types.is_empty()
            && self.status.is_none()
    }

    pub fn accept(&self, record: &ArchiveRecord) -> bool {
        if !self.ids.is_empty() {
            let Some(id) = record.record_id() else {
                return false;
            };
            if !self.ids.iter().any(|want| want == id) {
                return false;
            }
        }

        if self.type_mask != 0 && !record.record_type().matches_bitmask(self.type_mask) {
            return false;
        }

        if !self.content_types.is_empty() {
            let Some(content_type) = payload_content_type(record) else {
                return false;
            };
            let content_type = content_type.to_ascii_lowercase();
            if !self.content_types.iter().any(|want| content_type.contains(want.as_str())) {
                return false;
            }
        }

        if let Some(range) = &self.status {
            if let Some(code) = http_status(record) {
                if !range.contains(&code) {
                    return false;
                }
            }
        }

        true
    }

    /// The filter as a closure for [`RecordIterator::with_filter`].
    ///
    /// [`RecordIterator::with_filter`]: crate::iterator::RecordIterator::with_filter
    pub fn predicate(&self) -> impl FnMut(&ArchiveRecord) -> bool + '_ {
        move |record: &ArchiveRecord| self.accept(record)
    }
}

fn trim_brackets(id: &str) -> &str {
    id.trim().trim_start_matches('<').trim_end_matches('>')
}

/// Parse a status range: `200`, `200-300`, `500-` or `-400`.
///
/// The lower bound is inclusive, the upper bound exclusive; an omitted bound
/// is open.  A single code selects just that code; an empty string selects
/// everything.
pub fn parse_status_range(text: &str) -> Result<Range<u16>, String> {
    let text = text.trim();
    let bound = |part: &str, open: u16| -> Result<u16, String> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(open);
        }
        part.parse().map_err(|_| format!("illegal response code {text:?}"))
    };

    match text.split_once('-') {
        None if text.is_empty() => Ok(0..u16::MAX),
        None => {
            let code = bound(text, 0)?;
            Ok(code..code.saturating_add(1))
        }
        Some((_, to)) if to.contains('-') => Err(format!("illegal response code {text:?}")),
        Some((from, to)) => Ok(bound(from, 0)?..bound(to, u16::MAX)?),
    }
}

fn is_http_block(record: &ArchiveRecord) -> bool {
    record
        .content_type()
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/http"))
}

/// Head of the HTTP message in an `application/http` block, up to the
/// blank line.
fn http_head(record: &ArchiveRecord) -> std::borrow::Cow<'_, str> {
    let content = record.content();
    let head_end = find_subslice(content, b"\r\n\r\n")
        .or_else(|| find_subslice(content, b"\n\n"))
        .unwrap_or(content.len());
    String::from_utf8_lossy(&content[..head_end])
}

/// Status code of the HTTP response a record carries, if it carries one.
pub fn http_status(record: &ArchiveRecord) -> Option<u16> {
    if !is_http_block(record) {
        return None;
    }
    let declared = record.content_type()?.to_ascii_lowercase();
    let response = match declared.split_once("msgtype=") {
        Some((_, msgtype)) => msgtype.trim_start_matches('"').starts_with("response"),
        None => record.record_type() == RecordType::Response,
    };
    if !response {
        return None;
    }

    let head = http_head(record);
    let mut status_line = head.lines().next()?.split_whitespace();
    if !status_line.next()?.starts_with("HTTP/") {
        return None;
    }
    status_line.next()?.parse().ok()
}

/// Content type of what the record carries.
///
/// An `application/http` block holds a whole HTTP message; its own
/// `Content-Type` header is found in the message head.
pub fn payload_content_type(record: &ArchiveRecord) -> Option<String> {
    let declared = record.content_type()?;
    if !is_http_block(record) {
        return Some(declared.to_string());
    }

    http_head(record).lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-type")
            .then(|| value.trim().to_string())
    })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
