//! Header block parsing.
//!
//! Field order is preserved, names compare case-insensitively, and malformed
//! lines are reported to the ledger instead of aborting the parse.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use encoding_rs::Encoding;

use crate::charset::decode_header_bytes;
use crate::encoding::decode_encoded_words;
use crate::ledger::{FindingKind, Ledger};

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderField {
    /// Field name as it appeared (trimmed).
    pub name: String,
    /// Unfolded raw value bytes.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: Vec<u8>,
    /// Value with encoded words decoded and outer whitespace trimmed.
    pub value: String,
}

impl HeaderField {
    /// Checks the field name, case-insensitively.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered collection of header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Headers {
    fields: Vec<HeaderField>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field whose raw and decoded values are the same text.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        self.fields.push(HeaderField {
            name: name.into(),
            raw: value.as_bytes().to_vec(),
            value,
        });
    }

    /// Gets the decoded value of the first field named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.is(name))
            .map(|f| f.value.as_str())
    }

    /// Gets the raw value of the first field named `name`.
    #[must_use]
    pub fn get_raw(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|f| f.is(name))
            .map(|f| f.raw.as_slice())
    }

    /// Gets all decoded values for `name`, in order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is(name))
            .map(|f| f.value.as_str())
            .collect()
    }

    /// Returns an iterator over all fields in original order.
    pub fn iter(&self) -> std::slice::Iter<'_, HeaderField> {
        self.fields.iter()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a raw header block.
    ///
    /// Folded lines are joined with a single space. Lines that are not
    /// fields are recorded as [`FindingKind::MalformedHeader`] warnings and
    /// either joined to the previous field or skipped.
    pub fn parse(block: &[u8], fallback: &'static Encoding, ledger: &mut Ledger) -> Self {
        let mut pending: Vec<(String, Vec<u8>)> = Vec::new();

        for (index, line) in lines(block).enumerate() {
            let number = index + 1;
            if line.is_empty() {
                continue;
            }
            // Leading mbox separator.
            if index == 0 && is_mbox_separator(line) {
                tracing::trace!("skipping mbox From_ line");
                continue;
            }

            if matches!(line[0], b' ' | b'\t') {
                if let Some((_, raw)) = pending.last_mut() {
                    raw.push(b' ');
                    raw.extend_from_slice(line.trim_ascii());
                } else {
                    ledger.add_warning(
                        FindingKind::MalformedHeader,
                        format_args!("line {number}: continuation with no preceding field"),
                    );
                }
                continue;
            }

            let Some(colon) = line.iter().position(|&b| b == b':') else {
                if let Some((name, raw)) = pending.last_mut() {
                    ledger.add_warning(
                        FindingKind::MalformedHeader,
                        format_args!("line {number}: missing colon, joined to {name:?}"),
                    );
                    raw.push(b' ');
                    raw.extend_from_slice(line.trim_ascii());
                } else {
                    ledger.add_warning(
                        FindingKind::MalformedHeader,
                        format_args!(
                            "line {number}: missing colon in {:?}",
                            decode_header_bytes(line)
                        ),
                    );
                }
                continue;
            };

            let name = decode_header_bytes(&line[..colon]).trim().to_string();
            if name.is_empty() {
                ledger.add_warning(
                    FindingKind::MalformedHeader,
                    format_args!("line {number}: empty field name"),
                );
                continue;
            }
            if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
                ledger.add_warning(
                    FindingKind::MalformedHeader,
                    format_args!("line {number}: invalid field name {name:?}"),
                );
            }

            pending.push((name, line[colon + 1..].trim_ascii().to_vec()));
        }

        let fields = pending
            .into_iter()
            .map(|(name, raw)| {
                let text = decode_header_bytes(&raw);
                // Owned only when the bytes were not UTF-8.
                if matches!(text, Cow::Owned(_)) {
                    ledger.add_warning(
                        FindingKind::CharsetConversionFailure,
                        format_args!("raw 8-bit bytes in {name:?} field decoded as windows-1252"),
                    );
                }
                let value = decode_encoded_words(text.trim(), fallback, ledger);
                HeaderField { name, raw, value }
            })
            .collect();

        Self { fields }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}: {}", field.name, field.value)?;
        }
        Ok(())
    }
}

fn is_mbox_separator(line: &[u8]) -> bool {
    line.strip_prefix(b"From ")
        .is_some_and(|rest| !rest.trim_ascii_start().starts_with(b":"))
}

/// Iterates LF-terminated lines with any trailing CR removed.
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

/// Location of the header block and body within a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Layout {
    /// Header block, excluding the blank separator line.
    pub header: Range<usize>,
    /// Start of the body.
    pub body_start: usize,
    /// The input did not start with a header field.
    pub headerless: bool,
}

/// Locates the header/body split: the first empty line.
///
/// Input whose first line cannot be a header field is treated as all body.
pub(crate) fn layout(data: &[u8]) -> Layout {
    let first_end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
    let first = data[..first_end].strip_suffix(b"\r").unwrap_or(&data[..first_end]);
    let looks_like_field = first.is_empty()
        || matches!(first[0], b' ' | b'\t')
        || first.contains(&b':')
        || is_mbox_separator(first);
    if !looks_like_field {
        return Layout {
            header: 0..0,
            body_start: 0,
            headerless: true,
        };
    }

    let mut pos = 0;
    while pos < data.len() {
        let end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |i| pos + i + 1);
        let line = &data[pos..end];
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Layout {
                header: 0..pos,
                body_start: end,
                headerless: false,
            };
        }
        pos = end;
    }

    Layout {
        header: 0..data.len(),
        body_start: data.len(),
        headerless: false,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn parse(text: &str) -> (Headers, Ledger) {
        let mut ledger = Ledger::new();
        let headers = Headers::parse(text.as_bytes(), WINDOWS_1252, &mut ledger);
        (headers, ledger)
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
        );

        let (headers, ledger) = parse(text);
        assert!(ledger.is_empty());
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        let (headers, _) = parse("Received: a\nX-One: 1\nReceived: b\n");
        let names: Vec<_> = headers.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Received", "X-One", "Received"]);
        assert_eq!(headers.get_all("received"), ["a", "b"]);
    }

    #[test]
    fn test_internal_whitespace_preserved() {
        let (headers, _) = parse("Subject:   two   spaces  \n");
        assert_eq!(headers.get("subject"), Some("two   spaces"));
    }

    #[test]
    fn test_encoded_words_decoded() {
        let (headers, _) = parse("Subject: =?UTF-8?Q?Caf=C3=A9?=\n");
        assert_eq!(headers.get("Subject"), Some("Café"));
        assert_eq!(headers.get_raw("Subject"), Some(b"=?UTF-8?Q?Caf=C3=A9?=".as_slice()));
    }

    #[test]
    fn test_missing_colon_joins_previous() {
        let (headers, ledger) = parse("Subject: part one\npart two\nTo: a@b\n");
        assert_eq!(headers.get("subject"), Some("part one part two"));
        assert_eq!(headers.get("to"), Some("a@b"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.findings()[0].kind, FindingKind::MalformedHeader);
        assert!(!ledger.findings()[0].is_severe());
    }

    #[test]
    fn test_leading_continuation() {
        let (headers, ledger) = parse(" stray\nSubject: ok\n");
        assert_eq!(headers.len(), 1);
        assert!(ledger.contains(FindingKind::MalformedHeader));
    }

    #[test]
    fn test_empty_name_skipped() {
        let (headers, ledger) = parse(": nothing\nSubject: ok\n");
        assert_eq!(headers.len(), 1);
        assert!(ledger.contains(FindingKind::MalformedHeader));
    }

    #[test]
    fn test_name_with_space_kept() {
        let (headers, ledger) = parse("Bad Name: value\n");
        assert_eq!(headers.get("bad name"), Some("value"));
        assert!(ledger.contains(FindingKind::MalformedHeader));
    }

    #[test]
    fn test_latin1_header_bytes() {
        let mut ledger = Ledger::new();
        let headers = Headers::parse(b"Subject: caf\xE9\n", WINDOWS_1252, &mut ledger);
        assert_eq!(headers.get("subject"), Some("café"));

        assert_eq!(ledger.len(), 1);
        let finding = &ledger.findings()[0];
        assert_eq!(finding.kind, FindingKind::CharsetConversionFailure);
        assert!(!finding.is_severe());
        assert!(finding.detail.contains("Subject"));
    }

    #[test]
    fn test_utf8_header_bytes_not_reported() {
        let (headers, ledger) = parse("Subject: café\n");
        assert_eq!(headers.get("subject"), Some("café"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_mbox_from_line_skipped() {
        let (headers, ledger) = parse("From someone@example.com Mon Jan  1 00:00:00 2024\nSubject: x\n");
        assert_eq!(headers.len(), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_headers_display() {
        let (headers, _) = parse("from: sender@example.com\nTo: recipient@example.com\n");
        assert_eq!(
            headers.to_string(),
            "from: sender@example.com\nTo: recipient@example.com\n"
        );
    }

    #[test]
    fn test_layout_crlf() {
        let data = b"Subject: x\r\n\r\nbody";
        let layout = layout(data);
        assert_eq!(layout.header, 0..12);
        assert_eq!(&data[layout.body_start..], b"body");
        assert!(!layout.headerless);
    }

    #[test]
    fn test_layout_no_blank_line() {
        let data = b"Subject: x\n";
        let layout = layout(data);
        assert_eq!(layout.header, 0..data.len());
        assert_eq!(layout.body_start, data.len());
    }

    #[test]
    fn test_layout_empty_header() {
        let data = b"\nbody text";
        let layout = layout(data);
        assert_eq!(layout.header, 0..0);
        assert_eq!(&data[layout.body_start..], b"body text");
    }

    #[test]
    fn test_layout_headerless() {
        let data = b"just some text\nmore text\n";
        let layout = layout(data);
        assert!(layout.headerless);
        assert_eq!(layout.body_start, 0);
    }
}
