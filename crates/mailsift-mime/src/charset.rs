//! Charset transcoding.
//!
//! Decoding walks an ordered list of strict attempts and ends with a lossy
//! UTF-8 pass, so it always produces text.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::ledger::{FindingKind, Ledger};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Number of leading bytes searched for an HTML `<meta>` charset.
const META_SNIFF_LIMIT: usize = 1024;

/// Text produced by [`transcode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    /// Decoded text.
    pub text: String,
    /// Encoding that produced the text.
    pub encoding: &'static Encoding,
}

/// Resolves a charset label (case-insensitive, quotes and whitespace ignored).
#[must_use]
pub fn lookup(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().trim_matches(|c| c == '"' || c == '\'');
    Encoding::for_label(label.as_bytes())
}

fn is_ascii_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "us-ascii" | "ascii" | "ansi_x3.4-1968" | "iso646-us" | "us"
    )
}

/// Decodes `bytes` from the `declared` charset (`us-ascii` when absent).
///
/// Attempts, in order: the declared charset, UTF-8, `fallback`, and finally
/// lossy UTF-8. Records a [`FindingKind::CharsetConversionFailure`] warning
/// when the declared label is unknown or its strict decode fails.
pub fn transcode(
    bytes: &[u8],
    declared: Option<&str>,
    fallback: &'static Encoding,
    ledger: &mut Ledger,
) -> Transcoded {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let label = declared
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("us-ascii");

    // ASCII is a strict subset of UTF-8; ASCII-labelled 8-bit text is
    // usually mislabelled UTF-8.
    let resolved = if is_ascii_label(label) {
        Some(UTF_8)
    } else {
        lookup(label)
    };

    let mut attempts: Vec<&'static Encoding> = Vec::with_capacity(3);
    if let Some(encoding) = resolved {
        attempts.push(encoding);
    }
    let declared_attempts = attempts.len();
    for encoding in [UTF_8, fallback] {
        if !attempts.contains(&encoding) {
            attempts.push(encoding);
        }
    }

    for (index, encoding) in attempts.iter().copied().enumerate() {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            if index >= declared_attempts {
                report_failure(ledger, label, resolved, encoding.name());
            }
            tracing::trace!(charset = encoding.name(), "transcoded");
            return Transcoded {
                text: text.into_owned(),
                encoding,
            };
        }
    }

    report_failure(ledger, label, resolved, "lossy utf-8");
    Transcoded {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: UTF_8,
    }
}

fn report_failure(
    ledger: &mut Ledger,
    label: &str,
    resolved: Option<&'static Encoding>,
    used: &str,
) {
    if resolved.is_some() {
        ledger.add_warning(
            FindingKind::CharsetConversionFailure,
            format_args!("invalid bytes for charset {label:?}, decoded as {used}"),
        );
    } else {
        ledger.add_warning(
            FindingKind::CharsetConversionFailure,
            format_args!("unsupported charset {label:?}, decoded as {used}"),
        );
    }
}

/// Decodes raw header bytes: UTF-8, or Windows-1252 when not valid UTF-8.
///
/// The result is borrowed exactly when the bytes were UTF-8.
#[must_use]
pub fn decode_header_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(bytes);
            decoded
        }
    }
}

/// Finds a charset declared by an HTML `<meta>` tag near the top of a document.
///
/// Handles both `<meta charset="...">` and
/// `<meta http-equiv="Content-Type" content="text/html; charset=...">`.
#[must_use]
pub fn sniff_html_charset(html: &[u8]) -> Option<String> {
    let head = &html[..html.len().min(META_SNIFF_LIMIT)];
    let lower = head.to_ascii_lowercase();

    let mut pos = 0;
    while let Some(found) = find(&lower[pos..], b"<meta") {
        let start = pos + found + 5;
        let end = lower[start..]
            .iter()
            .position(|&b| b == b'>')
            .map_or(lower.len(), |e| start + e);
        let tag = &lower[start..end];

        if let Some(at) = find(tag, b"charset=") {
            let value = &tag[at + 8..];
            let value = value
                .strip_prefix(b"\"")
                .or_else(|| value.strip_prefix(b"'"))
                .unwrap_or(value);
            let len = value
                .iter()
                .position(|&b| matches!(b, b'"' | b'\'' | b';' | b'/' | b'>') || b.is_ascii_whitespace())
                .unwrap_or(value.len());
            if len > 0 {
                return Some(String::from_utf8_lossy(&value[..len]).into_owned());
            }
        }
        pos = end;
    }

    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
