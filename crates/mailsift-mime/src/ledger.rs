//! Diagnostic ledger.
//!
//! Every stage of the parser reports defects here instead of failing. A
//! [`Ledger`] is append-only; findings are never removed or reordered.

use std::fmt::{self, Write as _};

/// Catalog of diagnostic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FindingKind {
    /// A header line could not be parsed as a field.
    MalformedHeader,
    /// A multipart boundary was absent, never matched, or not terminated.
    MissingBoundary,
    /// No usable Content-Type; the default was applied.
    MissingContentType,
    /// Content-Transfer-Encoding token was not recognized.
    ContentEncodingUnknown,
    /// Text could not be decoded with its declared charset.
    CharsetConversionFailure,
    /// Plain text was synthesized from the HTML body.
    PlainTextFromHTMLFallback,
    /// Nesting exceeded the configured depth limit.
    MaxDepthExceeded,
}

impl FindingKind {
    /// Returns the catalog name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MalformedHeader => "MalformedHeader",
            Self::MissingBoundary => "MissingBoundary",
            Self::MissingContentType => "MissingContentType",
            Self::ContentEncodingUnknown => "ContentEncodingUnknown",
            Self::CharsetConversionFailure => "CharsetConversionFailure",
            Self::PlainTextFromHTMLFallback => "PlainTextFromHTMLFallback",
            Self::MaxDepthExceeded => "MaxDepthExceeded",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How serious a finding is. Purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    /// Output is correct but the input was unusual.
    Warning,
    /// A non-default fallback was forced.
    Severe,
}

/// A single recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Finding {
    /// Kind from the catalog.
    pub kind: FindingKind,
    /// Severity.
    pub severity: Severity,
    /// Formatted detail text.
    pub detail: String,
}

impl Finding {
    /// Returns the catalog name of this finding's kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Returns true if this finding is severe.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        self.severity == Severity::Severe
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Severe => 'E',
            Severity::Warning => 'W',
        };
        write!(f, "[{tag}] {}: {}", self.kind, self.detail)
    }
}

/// Append-only sequence of findings owned by a part or an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Ledger {
    findings: Vec<Finding>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            findings: Vec::new(),
        }
    }

    /// Records a severe finding.
    pub fn add_error(&mut self, kind: FindingKind, detail: impl fmt::Display) {
        self.record(kind, Severity::Severe, detail);
    }

    /// Records a warning.
    pub fn add_warning(&mut self, kind: FindingKind, detail: impl fmt::Display) {
        self.record(kind, Severity::Warning, detail);
    }

    fn record(&mut self, kind: FindingKind, severity: Severity, detail: impl fmt::Display) {
        let mut text = String::new();
        // A Display impl returning Err must not abort recording.
        let _ = write!(text, "{detail}");
        tracing::debug!(%kind, ?severity, detail = %text, "finding");
        self.findings.push(Finding {
            kind,
            severity,
            detail: text,
        });
    }

    /// Appends all findings of `other`, preserving their order.
    pub fn extend_from(&mut self, other: &Self) {
        self.findings.extend(other.findings.iter().cloned());
    }

    /// Returns the recorded findings in discovery order.
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Returns true if any finding of `kind` was recorded.
    #[must_use]
    pub fn contains(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    /// Returns the number of findings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Returns an iterator over the findings.
    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.findings.iter()
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_display_warning() {
        let finding = Finding {
            kind: FindingKind::MalformedHeader,
            severity: Severity::Warning,
            detail: "Warn Details".to_string(),
        };
        assert_eq!(finding.to_string(), "[W] MalformedHeader: Warn Details");
    }

    #[test]
    fn test_finding_display_severe() {
        let finding = Finding {
            kind: FindingKind::MissingBoundary,
            severity: Severity::Severe,
            detail: "Error Details".to_string(),
        };
        assert_eq!(finding.to_string(), "[E] MissingBoundary: Error Details");
    }

    #[test]
    fn test_finding_display_keeps_format_characters() {
        let finding = Finding {
            kind: FindingKind::CharsetConversionFailure,
            severity: Severity::Warning,
            detail: "{} %v %q {{".to_string(),
        };
        assert_eq!(
            finding.to_string(),
            "[W] CharsetConversionFailure: {} %v %q {{"
        );
    }

    #[test]
    fn test_add_error() {
        let mut ledger = Ledger::new();
        ledger.add_error(
            FindingKind::MalformedHeader,
            format_args!("1 {} {:?}", 2, "three"),
        );

        assert_eq!(ledger.len(), 1);
        let finding = &ledger.findings()[0];
        assert_eq!(finding.name(), "MalformedHeader");
        assert!(finding.is_severe());
        assert_eq!(finding.detail, "1 2 \"three\"");
    }

    #[test]
    fn test_add_warning() {
        let mut ledger = Ledger::new();
        ledger.add_warning(
            FindingKind::MalformedHeader,
            format_args!("1 {} {:?}", 2, "three"),
        );

        assert_eq!(ledger.len(), 1);
        let finding = &ledger.findings()[0];
        assert_eq!(finding.kind, FindingKind::MalformedHeader);
        assert!(!finding.is_severe());
        assert_eq!(finding.detail, "1 2 \"three\"");
    }

    #[test]
    fn test_failing_display_still_records() {
        struct Broken;
        impl fmt::Display for Broken {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("partial")?;
                Err(fmt::Error)
            }
        }

        let mut ledger = Ledger::new();
        ledger.add_warning(FindingKind::MissingContentType, Broken);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.findings()[0].detail, "partial");
    }

    #[test]
    fn test_extend_preserves_order() {
        let mut first = Ledger::new();
        first.add_warning(FindingKind::MalformedHeader, "a");
        let mut second = Ledger::new();
        second.add_error(FindingKind::MissingBoundary, "b");
        second.add_warning(FindingKind::MalformedHeader, "c");

        first.extend_from(&second);
        let details: Vec<_> = first.iter().map(|f| f.detail.as_str()).collect();
        assert_eq!(details, ["a", "b", "c"]);
        assert!(first.contains(FindingKind::MissingBoundary));
        assert!(!first.contains(FindingKind::MaxDepthExceeded));
    }
}
