//! Content-Type and Content-Disposition parsing.
//!
//! Parameter lists accept quoted strings with backslash escapes and the
//! RFC 2231 continuation/charset forms (`name*0=`, `name*=utf-8''...`).

use std::collections::BTreeMap;
use std::fmt;

use encoding_rs::UTF_8;

use crate::charset;

/// Ordered parameter map with lowercased keys.
pub type Parameters = BTreeMap<String, String>;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Parameters,
}

impl Default for ContentType {
    /// `text/plain; charset=us-ascii`, the RFC 2045 default.
    fn default() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Parameters::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the name parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks type and subtype, case-insensitively.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2=value2`. A missing `;`
    /// before the first parameter is tolerated. Returns `None` when no
    /// `type/subtype` pair can be extracted.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let media_end = s
            .find(|c: char| c == ';' || c.is_whitespace())
            .unwrap_or(s.len());
        let (media, params) = s.split_at(media_end);

        let (main_type, sub_type) = media.split_once('/')?;
        let main_type = main_type.trim();
        let sub_type = sub_type.trim();
        if !is_token(main_type) || !is_token(sub_type) {
            return None;
        }

        Some(Self {
            main_type: main_type.to_ascii_lowercase(),
            sub_type: sub_type.to_ascii_lowercase(),
            parameters: parse_parameters(params),
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
            {
                write!(f, "; {key}=\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Content-Disposition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Disposition {
    /// `inline`.
    Inline,
    /// `attachment`.
    Attachment,
    /// Absent or unrecognized.
    #[default]
    Unspecified,
}

/// Parsed Content-Disposition header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContentDisposition {
    /// Disposition kind.
    pub kind: Disposition,
    /// Parameters (e.g., filename).
    pub parameters: Parameters,
}

impl ContentDisposition {
    /// Parses a Content-Disposition value. Never fails.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let token_end = s
            .find(|c: char| c == ';' || c.is_whitespace())
            .unwrap_or(s.len());
        let (token, params) = s.split_at(token_end);

        let kind = match token.to_ascii_lowercase().as_str() {
            "inline" => Disposition::Inline,
            "attachment" => Disposition::Attachment,
            _ => Disposition::Unspecified,
        };

        Self {
            kind,
            parameters: parse_parameters(params),
        }
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

/// Splits `s` on `;` outside quoted strings.
fn split_parameters(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\\' if in_quotes => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ';' if !in_quotes => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);

    items
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let Some(inner) = value.strip_prefix('"') else {
        return value.to_string();
    };
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decodes an RFC 2231 extended value: `charset'language'percent-encoded`.
fn decode_extended(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    let (charset_label, encoded) = match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(charset), Some(_language), Some(encoded)) => (Some(charset), encoded),
        _ => (None, value),
    };
    let bytes: Vec<u8> = percent_encoding::percent_decode_str(encoded).collect();
    let encoding = charset_label.and_then(charset::lookup).unwrap_or(UTF_8);
    let (decoded, _, _) = encoding.decode(&bytes);
    decoded.into_owned()
}

/// Parses a `; key=value; ...` list into a map with lowercased keys.
fn parse_parameters(s: &str) -> Parameters {
    let mut simple = Parameters::new();
    // key -> (section, extended, raw value)
    let mut sections: BTreeMap<String, Vec<(u32, bool, String)>> = BTreeMap::new();

    for item in split_parameters(s) {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }

        let (name, extended) = key
            .strip_suffix('*')
            .map_or((key.as_str(), false), |name| (name, true));

        if let Some((base, index)) = name.split_once('*') {
            if let Ok(index) = index.parse::<u32>() {
                sections
                    .entry(base.to_string())
                    .or_default()
                    .push((index, extended, value.trim().to_string()));
                continue;
            }
        }

        let value = if extended {
            decode_extended(value.trim())
        } else {
            unquote(value)
        };
        simple.insert(name.to_string(), value);
    }

    for (name, mut parts) in sections {
        parts.sort_by_key(|(index, _, _)| *index);
        // Only the first section carries the charset'language' prefix.
        let mut encoded = String::new();
        let mut plain = String::new();
        let any_extended = parts.iter().any(|(_, extended, _)| *extended);
        for (_, extended, value) in &parts {
            if *extended {
                encoded.push_str(value);
            } else if any_extended {
                encoded.push_str(&percent_encoding::utf8_percent_encode(
                    &unquote(value),
                    percent_encoding::NON_ALPHANUMERIC,
                )
                .to_string());
            } else {
                plain.push_str(&unquote(value));
            }
        }
        let value = if any_extended {
            decode_extended(&encoded)
        } else {
            plain
        };
        simple.entry(name).or_insert(value);
    }

    simple
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::non_ascii_literal)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_default() {
        let ct = ContentType::default();
        assert!(ct.is("text", "plain"));
        assert_eq!(ct.charset(), Some("us-ascii"));
        assert_eq!(ct.to_string(), "text/plain; charset=us-ascii");
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; Charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_quoted_semicolon_and_escape() {
        let ct = ContentType::parse(r#"application/pdf; name="a;b \"c\".pdf"; x=1"#).unwrap();
        assert_eq!(ct.name(), Some(r#"a;b "c".pdf"#));
        assert_eq!(ct.parameters.get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_missing_semicolon() {
        let ct = ContentType::parse("text/html charset=iso-8859-1").unwrap();
        assert!(ct.is("text", "html"));
        assert_eq!(ct.charset(), Some("iso-8859-1"));
    }

    #[test]
    fn test_unparseable() {
        assert!(ContentType::parse("").is_none());
        assert!(ContentType::parse("text").is_none());
        assert!(ContentType::parse("/plain").is_none());
        assert!(ContentType::parse("text/").is_none());
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("multipart", "mixed").with_parameter("boundary", "a b");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"a b\"");
    }

    #[test]
    fn test_rfc2231_extended() {
        let cd = ContentDisposition::parse("attachment; filename*=utf-8''na%C3%AFve%20file.txt");
        assert_eq!(cd.kind, Disposition::Attachment);
        assert_eq!(cd.filename(), Some("naïve file.txt"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let cd = ContentDisposition::parse(
            "attachment; filename*0=\"long_\"; filename*1=\"name.pdf\"",
        );
        assert_eq!(cd.filename(), Some("long_name.pdf"));
    }

    #[test]
    fn test_rfc2231_mixed_continuations() {
        let ct = ContentType::parse(
            "application/x-stuff; title*0*=us-ascii'en'This%20is; title*1=\" fun\"",
        )
        .unwrap();
        assert_eq!(ct.parameters.get("title").map(String::as_str), Some("This is fun"));
    }

    #[test]
    fn test_disposition_kinds() {
        assert_eq!(ContentDisposition::parse("INLINE").kind, Disposition::Inline);
        assert_eq!(
            ContentDisposition::parse("weird; filename=x").kind,
            Disposition::Unspecified
        );
        assert_eq!(ContentDisposition::parse("").kind, Disposition::Unspecified);
    }
}
