//! Transfer decoding and RFC 2047 encoded-word decoding.
//!
//! Every decoder here is lenient: malformed input degrades the output
//! instead of producing an error.

use std::borrow::Cow;
use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::Encoding;

use crate::charset;
use crate::ledger::Ledger;

/// Base64 engine that accepts missing padding and non-zero trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Content-Transfer-Encoding of a part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit data.
    EightBit,
    /// Binary data.
    Binary,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Base64 encoding.
    Base64,
    /// Unrecognized token; the body is passed through as 8-bit.
    Unknown(String),
}

impl TransferEncoding {
    /// Parses a Content-Transfer-Encoding header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let token = s.trim().trim_matches('"').trim();
        match token.to_ascii_lowercase().as_str() {
            "7bit" | "" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            _ => Self::Unknown(token.to_string()),
        }
    }

    /// Reverses this encoding on `body`.
    #[must_use]
    pub fn decode<'a>(&self, body: &'a [u8]) -> Cow<'a, [u8]> {
        match self {
            Self::Base64 => Cow::Owned(decode_base64(body)),
            Self::QuotedPrintable => Cow::Owned(decode_quoted_printable(body)),
            Self::SevenBit | Self::EightBit | Self::Binary | Self::Unknown(_) => {
                Cow::Borrowed(body)
            }
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Binary => write!(f, "binary"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Base64 => write!(f, "base64"),
            Self::Unknown(token) => write!(f, "{token}"),
        }
    }
}

const fn is_base64_symbol(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// Decodes Base64, skipping bytes outside the alphabet.
///
/// Padding marks the end of a run, so concatenated padded blocks decode
/// independently. A dangling single symbol at the end of a run is dropped.
#[must_use]
pub fn decode_base64(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 3);
    let mut run = Vec::with_capacity(data.len());

    for &b in data {
        if is_base64_symbol(b) {
            run.push(b);
        } else if b == b'=' {
            flush_base64_run(&mut run, &mut out);
        }
    }
    flush_base64_run(&mut run, &mut out);

    out
}

fn flush_base64_run(run: &mut Vec<u8>, out: &mut Vec<u8>) {
    if run.len() % 4 == 1 {
        run.pop();
    }
    if !run.is_empty() {
        // The run is alphabet-only with a valid length, so this cannot fail.
        let _ = LENIENT_BASE64.decode_vec(&run[..], out);
    }
    run.clear();
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes Quoted-Printable (RFC 2045).
///
/// Soft line breaks may carry trailing whitespace; `=` sequences that are
/// neither an escape nor a soft break are kept literally.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }

        if let (Some(hi), Some(lo)) = (
            data.get(i + 1).copied().and_then(hex_value),
            data.get(i + 2).copied().and_then(hex_value),
        ) {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }

        // Soft line break, possibly with transport padding before it.
        let mut j = i + 1;
        while j < data.len() && matches!(data[j], b' ' | b'\t') {
            j += 1;
        }
        match data.get(j) {
            Some(b'\n') => i = j + 1,
            Some(b'\r') if data.get(j + 1) == Some(&b'\n') => i = j + 2,
            None => i = j,
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    out
}

/// Decodes the `Q` encoding of RFC 2047 (`_` is a space).
#[must_use]
pub fn decode_q(payload: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = payload
        .iter()
        .map(|&b| if b == b'_' { b' ' } else { b })
        .collect();
    decode_quoted_printable(&spaced)
}

/// One parsed `=?charset?enc?payload?=` word.
struct EncodedWord<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    /// Length of the whole word in the source, including delimiters.
    len: usize,
}

/// Parses an encoded word at the start of `s`, which begins with `=?`.
///
/// `closes` holds the offsets of every `?=` in the whole value and `offset`
/// is where `s` starts within it, so the terminator is found by binary
/// search rather than by rescanning the rest of the value.
fn parse_encoded_word<'a>(s: &'a str, offset: usize, closes: &[usize]) -> Option<EncodedWord<'a>> {
    let rest = s.strip_prefix("=?")?;
    let charset_end = rest.find('?')?;
    let charset = &rest[..charset_end];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &rest[charset_end + 1..];
    let (encoding, rest) = rest.split_at_checked(1)?;
    if !matches!(encoding, "B" | "b" | "Q" | "q") {
        return None;
    }
    rest.strip_prefix('?')?;

    let payload_start = 2 + charset_end + 1 + 1 + 1;
    let at = closes.partition_point(|&close| close < offset + payload_start);
    let payload_end = closes.get(at)? - offset;
    let payload = &s[payload_start..payload_end];

    let bytes = if matches!(encoding, "B" | "b") {
        decode_base64(payload.as_bytes())
    } else {
        decode_q(payload.as_bytes())
    };

    // RFC 2231 allows a language suffix: charset*lang.
    let charset = charset.split('*').next().unwrap_or(charset);

    Some(EncodedWord {
        charset,
        bytes,
        len: payload_end + 2,
    })
}

/// Decodes RFC 2047 encoded words embedded in a header value.
///
/// Whitespace between adjacent encoded words is dropped, and adjacent
/// words in the same charset are transcoded together so multi-byte
/// characters split across words survive. Words that do not parse are
/// left verbatim.
pub fn decode_encoded_words(input: &str, fallback: &'static Encoding, ledger: &mut Ledger) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }

    let closes: Vec<usize> = input.match_indices("?=").map(|(at, _)| at).collect();
    let mut out = String::with_capacity(input.len());
    let mut pending: Option<(String, Vec<u8>)> = None;
    let mut remaining = input;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        let offset = input.len() - remaining.len() + start;
        let Some(word) = parse_encoded_word(&remaining[start..], offset, &closes) else {
            flush_pending(&mut pending, &mut out, fallback, ledger);
            out.push_str(before);
            out.push_str("=?");
            remaining = &remaining[start + 2..];
            continue;
        };

        let adjacent = pending.is_some() && before.trim().is_empty();
        if !adjacent {
            flush_pending(&mut pending, &mut out, fallback, ledger);
            out.push_str(before);
        }

        let same_charset = pending
            .as_ref()
            .is_some_and(|(charset, _)| charset.eq_ignore_ascii_case(word.charset));
        if same_charset {
            if let Some((_, bytes)) = &mut pending {
                bytes.extend_from_slice(&word.bytes);
            }
        } else {
            flush_pending(&mut pending, &mut out, fallback, ledger);
            pending = Some((word.charset.to_string(), word.bytes));
        }

        remaining = &remaining[start + word.len..];
    }

    flush_pending(&mut pending, &mut out, fallback, ledger);
    out.push_str(remaining);
    out
}

fn flush_pending(
    pending: &mut Option<(String, Vec<u8>)>,
    out: &mut String,
    fallback: &'static Encoding,
    ledger: &mut Ledger,
) {
    if let Some((charset, bytes)) = pending.take() {
        let decoded = charset::transcode(&bytes, Some(&charset), fallback, ledger);
        out.push_str(&decoded.text);
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
    use crate::ledger::FindingKind;
    use encoding_rs::WINDOWS_1252;

    fn words(input: &str) -> (String, Ledger) {
        let mut ledger = Ledger::new();
        let out = decode_encoded_words(input, WINDOWS_1252, &mut ledger);
        (out, ledger)
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("\"8bit\""), TransferEncoding::EightBit);
        assert_eq!(
            TransferEncoding::parse("x-uuencode"),
            TransferEncoding::Unknown("x-uuencode".to_string())
        );
    }

    #[test]
    fn test_unknown_passes_through() {
        let encoding = TransferEncoding::parse("rot13");
        assert_eq!(encoding.decode(b"body"), Cow::Borrowed(b"body".as_slice()));
    }

    #[test]
    fn test_base64_decode() {
        assert_eq!(decode_base64(b"SGVsbG8sIFdvcmxkIQ=="), b"Hello, World!");
    }

    #[test]
    fn test_base64_skips_noise() {
        assert_eq!(decode_base64(b"SGVs\r\nbG8s*IFdv\tcmxk IQ"), b"Hello, World!");
    }

    #[test]
    fn test_base64_bad_padding() {
        assert_eq!(decode_base64(b"SGk"), b"Hi");
        assert_eq!(decode_base64(b"SGk==="), b"Hi");
        // Dangling single symbol is dropped.
        assert_eq!(decode_base64(b"SGkhS"), b"Hi!");
    }

    #[test]
    fn test_base64_concatenated_blocks() {
        assert_eq!(decode_base64(b"SGk=SGk="), b"HiHi");
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"h=c3=a9llo"), "héllo".as_bytes());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello= \t\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"trailing="), b"trailing");
    }

    #[test]
    fn test_quoted_printable_invalid_escape_kept() {
        assert_eq!(decode_quoted_printable(b"a=ZZb"), b"a=ZZb");
        assert_eq!(decode_quoted_printable(b"x = y"), b"x = y");
    }

    #[test]
    fn test_q_decode() {
        assert_eq!(decode_q(b"Caf=C3=A9_con_le=C3=B1a"), "Café con leña".as_bytes());
    }

    #[test]
    fn test_words_plain_passthrough() {
        let (out, ledger) = words("Hello there");
        assert_eq!(out, "Hello there");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_words_base64() {
        let (out, _) = words("=?utf-8?B?SMOpbGxv?=");
        assert_eq!(out, "Héllo");
    }

    #[test]
    fn test_words_quoted() {
        let (out, _) = words("Re: =?ISO-8859-1?Q?Caf=E9?= today");
        assert_eq!(out, "Re: Café today");
    }

    #[test]
    fn test_adjacent_words_join() {
        let (out, _) = words("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=");
        assert_eq!(out, "Hola mundo");
    }

    #[test]
    fn test_split_multibyte_across_words() {
        // "é" is C3 A9; each half sits in its own word.
        let (out, ledger) = words("=?utf-8?Q?caf=C3?= =?utf-8?Q?=A9?=");
        assert_eq!(out, "café");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_words_separated_by_text_keep_spacing() {
        let (out, _) = words("=?utf-8?Q?a?= and =?utf-8?Q?b?=");
        assert_eq!(out, "a and b");
    }

    #[test]
    fn test_language_suffix() {
        let (out, ledger) = words("=?US-ASCII*EN?Q?Keith_Moore?=");
        assert_eq!(out, "Keith Moore");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_unknown_charset_word() {
        let (out, ledger) = words("=?x-unknown?Q?Hello_World?=");
        assert_eq!(out, "Hello World");
        assert!(ledger.contains(FindingKind::CharsetConversionFailure));
    }

    #[test]
    fn test_malformed_word_verbatim() {
        let (out, ledger) = words("=?utf-8?X?abc?= and =?broken");
        assert_eq!(out, "=?utf-8?X?abc?= and =?broken");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_many_unterminated_words_stay_linear() {
        let input = "=?a?Q?x ".repeat(40_000);
        let started = std::time::Instant::now();
        let (out, ledger) = words(&input);
        assert_eq!(out, input);
        assert!(ledger.is_empty());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_terminator_after_rejected_words() {
        let input = format!("{}=?utf-8?Q?caf=C3=A9?=", "=?a?X?x ".repeat(1_000));
        let (out, ledger) = words(&input);
        assert!(out.ends_with("café"));
        assert!(out.starts_with("=?a?X?x =?a?X?x "));
        assert!(ledger.is_empty());
    }
}
