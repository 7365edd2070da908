//! Top-level message assembly.

use std::collections::HashSet;
use std::io::Read;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

use crate::content_type::Disposition;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::html;
use crate::ledger::{Finding, FindingKind, Ledger};
use crate::options::ParserOptions;
use crate::part::{Part, PartId, PartRole, TreeBuilder};

/// A parsed message: the part tree, the reconciled bodies, the classified
/// attachments and inlines, and every finding recorded along the way.
///
/// Construction fails only on empty, oversized, or unreadable input. Any
/// malformation inside the message is recorded in [`Envelope::diagnostics`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Envelope {
    root: PartId,
    parts: Vec<Part>,
    text: Option<String>,
    html: Option<String>,
    text_part: Option<PartId>,
    html_part: Option<PartId>,
    attachments: Vec<PartId>,
    inlines: Vec<PartId>,
    findings: Ledger,
    diagnostics: Vec<Finding>,
}

impl Envelope {
    /// Parses a message with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for empty input.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        Self::parse_with(data, &ParserOptions::default())
    }

    /// Parses a message with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for empty input and
    /// [`Error::MessageTooLarge`] when the input exceeds
    /// `options.max_message_size`.
    pub fn parse_with(data: impl Into<Bytes>, options: &ParserOptions) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        if let Some(limit) = options.max_message_size {
            if data.len() > limit {
                return Err(Error::MessageTooLarge {
                    size: data.len(),
                    limit,
                });
            }
        }

        tracing::debug!(size = data.len(), "parsing envelope");
        let mut builder = TreeBuilder::new(options);
        let root = builder.build(data, None, 0);

        let mut envelope = Self {
            root,
            parts: builder.into_parts(),
            text: None,
            html: None,
            text_part: None,
            html_part: None,
            attachments: Vec::new(),
            inlines: Vec::new(),
            findings: Ledger::new(),
            diagnostics: Vec::new(),
        };
        envelope.reconcile(options);
        envelope.classify();
        envelope.collect_diagnostics();

        tracing::debug!(
            parts = envelope.parts.len(),
            attachments = envelope.attachments.len(),
            inlines = envelope.inlines.len(),
            findings = envelope.diagnostics.len(),
            "envelope parsed"
        );
        Ok(envelope)
    }

    /// Reads a whole message from `reader` and parses it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading fails, plus the errors of
    /// [`Envelope::parse_with`].
    pub fn read_from(reader: impl Read, options: &ParserOptions) -> Result<Self> {
        let mut data = Vec::new();
        match options.max_message_size {
            // One byte past the limit is enough to reject.
            Some(limit) => {
                let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
                reader.take(cap).read_to_end(&mut data)?;
            }
            None => {
                let mut reader = reader;
                reader.read_to_end(&mut data)?;
            }
        }
        Self::parse_with(data, options)
    }

    /// Returns the top-level headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.root().headers
    }

    /// Returns the plain-text body, possibly synthesized from HTML.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns the HTML body.
    #[must_use]
    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    /// Returns the part the plain-text body came from.
    #[must_use]
    pub const fn text_part(&self) -> Option<PartId> {
        self.text_part
    }

    /// Returns the part the HTML body came from.
    #[must_use]
    pub const fn html_part(&self) -> Option<PartId> {
        self.html_part
    }

    /// Returns the attachments in depth-first order.
    pub fn attachments(&self) -> impl Iterator<Item = &Part> {
        self.attachments.iter().map(|&id| self.get(id))
    }

    /// Returns the inline parts in depth-first order.
    pub fn inlines(&self) -> impl Iterator<Item = &Part> {
        self.inlines.iter().map(|&id| self.get(id))
    }

    /// Returns the ids of the attachments.
    #[must_use]
    pub fn attachment_ids(&self) -> &[PartId] {
        &self.attachments
    }

    /// Returns the ids of the inline parts.
    #[must_use]
    pub fn inline_ids(&self) -> &[PartId] {
        &self.inlines
    }

    /// Returns every finding: part findings depth-first, then envelope
    /// findings.
    #[must_use]
    pub fn diagnostics(&self) -> &[Finding] {
        &self.diagnostics
    }

    /// Returns true if any finding is severe.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Finding::is_severe)
    }

    /// Returns the findings recorded at envelope level only.
    #[must_use]
    pub const fn envelope_findings(&self) -> &Ledger {
        &self.findings
    }

    /// Returns a part by id.
    #[must_use]
    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id.index())
    }

    /// Returns the root part.
    #[must_use]
    pub fn root(&self) -> &Part {
        self.get(self.root)
    }

    /// Returns all parts in depth-first pre-order.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns the decoded `Subject` header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers().get("subject")
    }

    /// Returns the decoded `From` header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers().get("from")
    }

    /// Returns the decoded `To` header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.headers().get("to")
    }

    /// Returns the decoded `Cc` header.
    #[must_use]
    pub fn cc(&self) -> Option<&str> {
        self.headers().get("cc")
    }

    /// Returns the `Message-ID` without angle brackets.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers()
            .get("message-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
            .filter(|id| !id.is_empty())
    }

    /// Returns the `Date` header parsed as RFC 2822.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        let value = self.headers().get("date")?;
        parse_date(value)
    }

    // Ids come from the builder, so they always index into `parts`.
    fn get(&self, id: PartId) -> &Part {
        &self.parts[id.index()]
    }

    fn is_body_candidate(&self, id: PartId) -> bool {
        let mut current = self.get(id);
        loop {
            if current.disposition == Disposition::Attachment {
                return false;
            }
            let Some(parent_id) = current.parent else {
                return true;
            };
            let parent = self.get(parent_id);
            let eligible = parent.content_type.is("multipart", "alternative")
                || parent.children.first() == Some(&current.id);
            if !eligible {
                return false;
            }
            current = parent;
        }
    }

    fn reconcile(&mut self, options: &ParserOptions) {
        for part in &self.parts {
            if !part.is_leaf() || (self.text_part.is_some() && self.html_part.is_some()) {
                continue;
            }
            let is_plain = part.content_type.is("text", "plain");
            let is_html = part.content_type.is("text", "html");
            if !is_plain && !is_html {
                continue;
            }
            if !self.is_body_candidate(part.id) {
                continue;
            }
            if is_plain && self.text_part.is_none() {
                self.text_part = Some(part.id);
            } else if is_html && self.html_part.is_none() {
                self.html_part = Some(part.id);
            }
        }

        self.text = self
            .text_part
            .and_then(|id| self.get(id).text())
            .map(str::to_string);
        self.html = self
            .html_part
            .and_then(|id| self.get(id).text())
            .map(str::to_string);

        if self.text.is_none() && options.html_to_text {
            if let (Some(id), Some(html)) = (self.html_part, self.html.as_deref()) {
                let text = html::html_to_text(html);
                self.findings.add_warning(
                    FindingKind::PlainTextFromHTMLFallback,
                    format_args!("no text/plain body, converted HTML part {id} to plain text"),
                );
                self.text = Some(text);
            }
        }
    }

    fn classify(&mut self) {
        let chosen: Vec<PartId> = self.text_part.into_iter().chain(self.html_part).collect();

        // Alternatives that directly or indirectly hold a chosen body.
        let mut body_alternatives = HashSet::new();
        for &id in &chosen {
            let mut ancestor = self.get(id).parent;
            while let Some(parent_id) = ancestor {
                let parent = self.get(parent_id);
                if parent.content_type.is("multipart", "alternative") {
                    body_alternatives.insert(parent_id);
                }
                ancestor = parent.parent;
            }
        }

        let mut roles = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let role = if part.is_container() {
                PartRole::Container
            } else if part.disposition == Disposition::Attachment {
                PartRole::Attachment
            } else if chosen.contains(&part.id) {
                PartRole::Body
            } else if part.disposition == Disposition::Inline {
                PartRole::Inline
            } else if part.file_name.is_some()
                && !part.content_type.is_text()
                && !part.content_type.is_multipart()
            {
                PartRole::Attachment
            } else if part.content_type.is_text()
                && part.parent.is_some_and(|p| body_alternatives.contains(&p))
            {
                PartRole::Body
            } else {
                PartRole::Attachment
            };
            roles.push(role);
        }

        for (part, role) in self.parts.iter_mut().zip(roles) {
            part.role = role;
            match role {
                PartRole::Attachment => self.attachments.push(part.id),
                PartRole::Inline => self.inlines.push(part.id),
                PartRole::Container | PartRole::Body => {}
            }
        }
    }

    fn collect_diagnostics(&mut self) {
        self.diagnostics = self
            .parts
            .iter()
            .flat_map(|part| part.findings.iter())
            .chain(self.findings.iter())
            .cloned()
            .collect();
    }
}

fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value).ok().or_else(|| {
        // Trailing zone comments such as "(UTC)" trip the strict parser.
        let stripped = value.split('(').next()?.trim();
        DateTime::parse_from_rfc2822(stripped).ok()
    })
}
