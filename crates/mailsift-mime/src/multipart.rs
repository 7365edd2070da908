//! Multipart body splitting.

use bytes::Bytes;

use crate::ledger::{FindingKind, Ledger};

/// Splits a multipart body into its raw child segments.
///
/// A delimiter is a line consisting of `--boundary` (or `--boundary--` for
/// the terminal delimiter) followed only by linear whitespace. The line break
/// before a delimiter belongs to the delimiter. Preamble and epilogue are
/// discarded, and so are empty segments.
///
/// Records [`FindingKind::MissingBoundary`] (severe) when `boundary` is
/// absent, when it never matches, or when the terminal delimiter is missing.
/// In the last case every segment found before end-of-body is still returned.
pub fn split(body: &Bytes, boundary: Option<&str>, ledger: &mut Ledger) -> Vec<Bytes> {
    let Some(boundary) = boundary.filter(|b| !b.is_empty()) else {
        ledger.add_error(
            FindingKind::MissingBoundary,
            "multipart content type has no boundary parameter",
        );
        return Vec::new();
    };

    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let data = body.as_ref();

    let mut segments = Vec::new();
    let mut segment_start: Option<usize> = None;
    let mut found = false;
    let mut terminated = false;
    let mut pos = 0;

    while pos < data.len() {
        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |i| pos + i + 1);
        let line = trim_line_break(&data[pos..line_end]);

        if let Some(closing) = delimiter_kind(line, delimiter) {
            if let Some(start) = segment_start {
                let end = strip_preceding_break(data, start, pos);
                if end > start {
                    segments.push(body.slice(start..end));
                }
            }
            found = true;
            if closing {
                terminated = true;
                segment_start = None;
                break;
            }
            segment_start = Some(line_end);
        }

        pos = line_end;
    }

    if !found {
        ledger.add_error(
            FindingKind::MissingBoundary,
            format_args!("boundary {boundary:?} not found in body"),
        );
        return Vec::new();
    }

    if !terminated {
        ledger.add_error(
            FindingKind::MissingBoundary,
            format_args!("closing boundary {boundary:?} not found before end of body"),
        );
        if let Some(start) = segment_start {
            if start < data.len() {
                segments.push(body.slice(start..));
            }
        }
    }

    tracing::trace!(boundary, segments = segments.len(), terminated, "split multipart");
    segments
}

/// Returns `Some(closing)` when `line` is a delimiter for `delimiter`.
fn delimiter_kind(line: &[u8], delimiter: &[u8]) -> Option<bool> {
    let rest = line.strip_prefix(delimiter)?;
    let (closing, rest) = rest
        .strip_prefix(b"--")
        .map_or((false, rest), |rest| (true, rest));
    rest.iter()
        .all(|&b| b == b' ' || b == b'\t')
        .then_some(closing)
}

fn trim_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Moves `end` back over the CRLF or LF that precedes a delimiter line.
fn strip_preceding_break(data: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}
