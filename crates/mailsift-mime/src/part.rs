//! Part tree and its recursive builder.
//!
//! Parts live in an arena owned by the [`Envelope`](crate::Envelope) and are
//! addressed by [`PartId`]. Ids are assigned in depth-first pre-order, so a
//! parent always precedes its children and sibling order is segment order.

use std::fmt;

use bytes::Bytes;

use crate::charset;
use crate::content_type::{ContentDisposition, ContentType, Disposition};
use crate::encoding::{TransferEncoding, decode_encoded_words};
use crate::header::{self, Headers};
use crate::ledger::{FindingKind, Ledger};
use crate::multipart;
use crate::options::ParserOptions;

/// Index of a part within an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PartId(usize);

impl PartId {
    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decoded content of a leaf part.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Content {
    /// Transcoded text of a `text/*` part.
    Text(String),
    /// Transfer-decoded bytes of any other part.
    Binary(Vec<u8>),
}

impl Content {
    /// Returns the text for text content.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the content as bytes (UTF-8 for text).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Returns the content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if there is no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Role assigned to a part once the whole tree is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PartRole {
    /// Multipart container.
    Container,
    /// Message body or one of its alternatives.
    Body,
    /// Inline content such as an embedded image.
    Inline,
    /// Attachment.
    #[default]
    Attachment,
}

/// A node in the content tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Part {
    /// This part's id.
    pub id: PartId,
    /// Containing multipart, `None` for the root.
    pub parent: Option<PartId>,
    /// Nesting depth, 0 for the root.
    pub depth: usize,
    /// Part headers.
    pub headers: Headers,
    /// Effective content type.
    pub content_type: ContentType,
    /// Content-Disposition kind.
    pub disposition: Disposition,
    /// Content-Transfer-Encoding.
    pub transfer_encoding: TransferEncoding,
    /// Decoded filename from the disposition or content type.
    pub file_name: Option<String>,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// Charset used to transcode a text leaf.
    pub charset: Option<&'static str>,
    /// Raw body, a view into the source message.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub body: Bytes,
    /// Decoded content; present only for leaves.
    pub content: Option<Content>,
    /// Child parts; non-empty only for containers.
    pub children: Vec<PartId>,
    /// Role assigned by classification.
    pub role: PartRole,
    /// Findings scoped to this part.
    pub findings: Ledger,
}

impl Part {
    /// Returns true if this part has decoded content.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.content.is_some()
    }

    /// Returns true if this part has children.
    #[must_use]
    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }

    /// Returns the decoded text of a text leaf.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Content::as_text)
    }

    /// Returns the decoded content bytes, empty for containers.
    #[must_use]
    pub fn content_bytes(&self) -> &[u8] {
        self.content.as_ref().map_or(&[], Content::as_bytes)
    }
}

/// Builds the part arena by recursive descent.
pub(crate) struct TreeBuilder<'a> {
    options: &'a ParserOptions,
    parts: Vec<Part>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) const fn new(options: &'a ParserOptions) -> Self {
        Self {
            options,
            parts: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> Vec<Part> {
        self.parts
    }

    /// Parses `entity` (header block plus body) and appends it and all of
    /// its descendants to the arena.
    pub(crate) fn build(&mut self, entity: Bytes, parent: Option<PartId>, depth: usize) -> PartId {
        let fallback = self.options.fallback_charset;
        let mut findings = Ledger::new();

        let layout = header::layout(&entity);
        if layout.headerless {
            findings.add_warning(
                FindingKind::MalformedHeader,
                "no header block found, treating all input as body",
            );
        }
        let headers = Headers::parse(&entity[layout.header.clone()], fallback, &mut findings);
        let body = entity.slice(layout.body_start..);

        let content_type = effective_content_type(&headers, &mut findings);
        tracing::debug!(depth, content_type = %content_type.mime_type(), size = body.len(), "parsing part");

        let transfer_encoding = headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        if let TransferEncoding::Unknown(token) = &transfer_encoding {
            findings.add_error(
                FindingKind::ContentEncodingUnknown,
                format_args!("unrecognized Content-Transfer-Encoding {token:?}, treating as 8bit"),
            );
        }

        let disposition = headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
            .unwrap_or_default();
        let file_name = disposition
            .filename()
            .or_else(|| content_type.name())
            .map(|name| decode_encoded_words(name.trim(), fallback, &mut findings))
            .filter(|name| !name.is_empty());
        let content_id = headers
            .get("content-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
            .filter(|id| !id.is_empty());

        let id = PartId(self.parts.len());
        self.parts.push(Part {
            id,
            parent,
            depth,
            headers,
            content_type: content_type.clone(),
            disposition: disposition.kind,
            transfer_encoding: transfer_encoding.clone(),
            file_name,
            content_id,
            charset: None,
            body: body.clone(),
            content: None,
            children: Vec::new(),
            role: PartRole::default(),
            findings: Ledger::new(),
        });

        let mut children = Vec::new();
        let mut content = None;
        let mut used_charset = None;

        if content_type.is_multipart() {
            if depth >= self.options.max_depth {
                findings.add_error(
                    FindingKind::MaxDepthExceeded,
                    format_args!(
                        "nesting depth {depth} reached limit {}, not descending",
                        self.options.max_depth
                    ),
                );
            } else {
                let segments = multipart::split(&body, content_type.boundary(), &mut findings);
                if segments.is_empty() && !findings.contains(FindingKind::MissingBoundary) {
                    findings.add_error(
                        FindingKind::MissingBoundary,
                        "multipart body contains no non-empty parts",
                    );
                }
                for segment in segments {
                    children.push(self.build(segment, Some(id), depth + 1));
                }
            }
            if children.is_empty() {
                content = Some(Content::Binary(body.to_vec()));
            }
        } else {
            let decoded = transfer_encoding.decode(&body);
            if content_type.is_text() {
                let sniffed = if content_type.charset().is_none()
                    && self.options.sniff_html_charset
                    && content_type.is("text", "html")
                {
                    charset::sniff_html_charset(&decoded)
                } else {
                    None
                };
                let declared = content_type.charset().or(sniffed.as_deref());
                let transcoded = charset::transcode(&decoded, declared, fallback, &mut findings);
                used_charset = Some(transcoded.encoding.name());
                content = Some(Content::Text(transcoded.text));
            } else {
                content = Some(Content::Binary(decoded.into_owned()));
            }
        }

        let part = &mut self.parts[id.0];
        part.role = if children.is_empty() {
            PartRole::Attachment
        } else {
            PartRole::Container
        };
        part.children = children;
        part.content = content;
        part.charset = used_charset;
        part.findings = findings;

        id
    }
}

fn effective_content_type(headers: &Headers, findings: &mut Ledger) -> ContentType {
    let fallback = ContentType::default();
    match headers.get("content-type") {
        None => {
            findings.add_error(
                FindingKind::MissingContentType,
                format_args!("no Content-Type header, assuming {fallback}"),
            );
            fallback
        }
        Some(value) => ContentType::parse(value).unwrap_or_else(|| {
            findings.add_error(
                FindingKind::MissingContentType,
                format_args!("unparseable Content-Type {value:?}, assuming {fallback}"),
            );
            fallback.clone()
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::similar_names)]
mod tests {
    use super::*;

    fn build(raw: &str) -> Vec<Part> {
        build_with(raw, &ParserOptions::default())
    }

    fn build_with(raw: &str, options: &ParserOptions) -> Vec<Part> {
        let mut builder = TreeBuilder::new(options);
        builder.build(Bytes::from(raw.to_string()), None, 0);
        builder.into_parts()
    }

    #[test]
    fn test_single_text_part() {
        let parts = build("Content-Type: text/plain; charset=utf-8\r\n\r\nHello");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text(), Some("Hello"));
        assert_eq!(parts[0].charset, Some("UTF-8"));
        assert!(parts[0].findings.is_empty());
    }

    #[test]
    fn test_missing_content_type_default() {
        let parts = build("Subject: hi\n\nbody");
        assert_eq!(parts[0].content_type, ContentType::default());
        assert!(parts[0].findings.contains(FindingKind::MissingContentType));
        assert_eq!(parts[0].text(), Some("body"));
    }

    #[test]
    fn test_unparseable_content_type() {
        let parts = build("Content-Type: garbage\n\nbody");
        assert!(parts[0].content_type.is("text", "plain"));
        assert!(parts[0].findings.findings()[0].is_severe());
    }

    #[test]
    fn test_base64_binary_leaf() {
        let raw = concat!(
            "Content-Type: application/octet-stream; name=\"data.bin\"\n",
            "Content-Transfer-Encoding: base64\n",
            "Content-ID: <abc@example>\n",
            "\n",
            "AAEC\n",
        );
        let parts = build(raw);
        assert_eq!(parts[0].content, Some(Content::Binary(vec![0, 1, 2])));
        assert_eq!(parts[0].file_name.as_deref(), Some("data.bin"));
        assert_eq!(parts[0].content_id.as_deref(), Some("abc@example"));
    }

    #[test]
    fn test_unknown_transfer_encoding() {
        let raw = "Content-Type: text/plain\nContent-Transfer-Encoding: x-rot13\n\nuryyb";
        let parts = build(raw);
        assert_eq!(parts[0].text(), Some("uryyb"));
        let finding = &parts[0].findings.findings()[0];
        assert_eq!(finding.kind, FindingKind::ContentEncodingUnknown);
        assert!(finding.is_severe());
    }

    #[test]
    fn test_multipart_children_in_order() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\n",
            "\n",
            "--b\n",
            "Content-Type: text/plain\n",
            "\n",
            "one\n",
            "--b\n",
            "Content-Type: text/plain\n",
            "\n",
            "two\n",
            "--b--\n",
        );
        let parts = build(raw);
        assert_eq!(parts.len(), 3);
        assert!(parts[0].is_container());
        assert!(!parts[0].is_leaf());
        assert_eq!(parts[0].children, [PartId(1), PartId(2)]);
        assert_eq!(parts[1].parent, Some(PartId(0)));
        assert_eq!(parts[1].depth, 1);
        assert_eq!(parts[1].text(), Some("one"));
        assert_eq!(parts[2].text(), Some("two"));
    }

    #[test]
    fn test_missing_boundary_is_opaque_leaf() {
        let parts = build("Content-Type: multipart/mixed\n\nstuff");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].is_leaf());
        assert_eq!(parts[0].content_bytes(), b"stuff");
        assert!(parts[0].findings.contains(FindingKind::MissingBoundary));
    }

    #[test]
    fn test_depth_limit() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\n",
            "\n",
            "--outer\n",
            "Content-Type: multipart/mixed; boundary=inner\n",
            "\n",
            "--inner\n",
            "\n",
            "deep\n",
            "--inner--\n",
            "--outer--\n",
        );
        let options = ParserOptions::builder().max_depth(1).build();
        let parts = build_with(raw, &options);
        assert_eq!(parts.len(), 2);
        assert!(parts[1].is_leaf());
        assert!(parts[1].findings.contains(FindingKind::MaxDepthExceeded));
    }

    #[test]
    fn test_html_meta_charset_sniffed() {
        let raw = b"Content-Type: text/html\n\n<meta charset=\"iso-8859-1\"><p>caf\xE9</p>";
        let options = ParserOptions::default();
        let mut builder = TreeBuilder::new(&options);
        builder.build(Bytes::from_static(raw), None, 0);
        let parts = builder.into_parts();
        assert!(parts[0].text().unwrap().contains("café"));
        assert_eq!(parts[0].charset, Some("windows-1252"));
        assert!(!parts[0].findings.contains(FindingKind::CharsetConversionFailure));
    }

    #[test]
    fn test_encoded_filename() {
        let raw = concat!(
            "Content-Type: application/pdf\n",
            "Content-Disposition: attachment; filename=\"=?utf-8?Q?r=C3=A9sum=C3=A9.pdf?=\"\n",
            "\n",
            "%PDF",
        );
        let parts = build(raw);
        assert_eq!(parts[0].disposition, Disposition::Attachment);
        assert_eq!(parts[0].file_name.as_deref(), Some("résumé.pdf"));
    }
}
