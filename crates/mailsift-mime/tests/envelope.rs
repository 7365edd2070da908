//! Integration tests over the raw message fixtures.
//!
//! `fixtures/good/` holds well-formed messages that must parse without
//! findings. `fixtures/low-quality/` holds damaged messages; each must still
//! produce an envelope, with the defect recorded in the diagnostics.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};

use mailsift_mime::{
    Disposition, Envelope, Finding, FindingKind, ParserOptions, PartRole, Severity,
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn parse(name: &str) -> Envelope {
    let data = fs::read(fixture(name)).unwrap();
    Envelope::parse(data).unwrap()
}

fn kinds(envelope: &Envelope) -> Vec<FindingKind> {
    envelope.diagnostics().iter().map(|f| f.kind).collect()
}

fn finding(envelope: &Envelope, kind: FindingKind) -> &Finding {
    envelope
        .diagnostics()
        .iter()
        .find(|f| f.kind == kind)
        .unwrap()
}

// ─── Well-formed messages ───────────────────────────────────────────

#[test]
fn test_good_alternative() {
    let envelope = parse("good/alternative.raw");

    assert!(envelope.diagnostics().is_empty(), "{:?}", envelope.diagnostics());
    assert_eq!(envelope.subject(), Some("Quarterly résumé"));
    assert_eq!(envelope.from(), Some("Alice Example <alice@example.com>"));
    assert_eq!(envelope.cc(), Some("carol@example.com"));
    assert_eq!(
        envelope.message_id(),
        Some("20251006091500.4411@example.com")
    );
    assert_eq!(
        envelope.date().unwrap().to_rfc3339(),
        "2025-10-06T09:15:00-04:00"
    );

    let text = envelope.text().unwrap();
    assert!(text.starts_with("Hi Bob,"));
    assert!(text.contains("résumé is attached"));
    let html = envelope.html().unwrap();
    assert!(html.contains("the shared folder.</p>"));

    assert_eq!(envelope.attachments().count(), 0);
    assert_eq!(envelope.inlines().count(), 0);
}

#[test]
fn test_good_nested_attachments() {
    let envelope = parse("good/attachments.raw");

    assert!(envelope.diagnostics().is_empty(), "{:?}", envelope.diagnostics());
    assert_eq!(envelope.parts().len(), 7);
    assert_eq!(envelope.text(), Some("Report attached. Chart below."));
    assert!(envelope.html().unwrap().contains("cid:chart@example.com"));

    let roles: Vec<_> = envelope.parts().iter().map(|p| p.role).collect();
    assert_eq!(
        roles,
        [
            PartRole::Container,
            PartRole::Container,
            PartRole::Container,
            PartRole::Body,
            PartRole::Body,
            PartRole::Inline,
            PartRole::Attachment,
        ]
    );

    let inline = envelope.inlines().next().unwrap();
    assert_eq!(inline.content_id.as_deref(), Some("chart@example.com"));
    assert_eq!(inline.file_name.as_deref(), Some("chart.png"));
    assert!(inline.content_bytes().starts_with(b"\x89PNG\r\n"));

    let attachment = envelope.attachments().next().unwrap();
    assert_eq!(attachment.disposition, Disposition::Attachment);
    assert_eq!(
        attachment.file_name.as_deref(),
        Some("weekly report – final.pdf")
    );
    assert_eq!(
        attachment.content_bytes(),
        b"%PDF-1.4\n%fake pdf payload for tests\n"
    );

    let date = envelope.date().unwrap();
    assert_eq!(date.to_rfc3339(), "2025-10-10T17:00:00+00:00");
}

#[test]
fn test_tree_links() {
    let envelope = parse("good/attachments.raw");
    for part in envelope.parts() {
        for &child in &part.children {
            let child = envelope.part(child).unwrap();
            assert_eq!(child.parent, Some(part.id));
            assert_eq!(child.depth, part.depth + 1);
        }
        assert!(part.is_leaf() != part.is_container());
    }
    assert_eq!(envelope.root().parent, None);
}

// ─── Low-quality messages ───────────────────────────────────────────

#[test]
fn test_low_quality_corpus_never_fails() {
    let dir = fixture("low-quality");
    let mut count = 0;
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let data = fs::read(&path).unwrap();
        let envelope = match Envelope::parse(data) {
            Ok(envelope) => envelope,
            Err(e) => panic!("{} failed: {e}", path.display()),
        };
        assert!(
            !envelope.diagnostics().is_empty(),
            "{} recorded no findings",
            path.display()
        );
        count += 1;
    }
    assert!(count >= 10);
}

#[test]
fn test_bad_final_boundary() {
    let envelope = parse("low-quality/bad-final-boundary.raw");

    let missing = finding(&envelope, FindingKind::MissingBoundary);
    assert_eq!(missing.severity, Severity::Severe);
    assert!(missing.to_string().starts_with("[E] MissingBoundary: "));

    // Both sections before the damaged delimiter survive.
    assert_eq!(envelope.text(), Some("A text section"));
    assert!(envelope.html().unwrap().contains("An HTML section"));
}

#[test]
fn test_bad_header_wrap() {
    let envelope = parse("low-quality/bad-header-wrap.raw");

    assert_eq!(kinds(&envelope), [FindingKind::MalformedHeader]);
    let malformed = &envelope.diagnostics()[0];
    assert_eq!(malformed.severity, Severity::Warning);
    assert!(malformed.to_string().starts_with("[W] MalformedHeader: "));

    assert_eq!(
        envelope.subject(),
        Some("A subject that wraps onto a line with no leading whitespace")
    );
    assert_eq!(envelope.text().map(str::trim), Some("Body text survives."));
}

#[test]
fn test_html_only_inline() {
    let envelope = parse("low-quality/html-only-inline.raw");

    assert_eq!(kinds(&envelope), [FindingKind::PlainTextFromHTMLFallback]);
    assert!(!envelope.diagnostics()[0].is_severe());

    let text = envelope.text().unwrap();
    assert!(text.contains("Welcome"));
    assert!(text.contains("See the logo below."));
    assert!(!text.contains("<h1>"));
    assert!(!text.contains('#'));
    assert!(!text.contains("**"));
    assert!(envelope.text_part().is_none());

    let inline = envelope.inlines().next().unwrap();
    assert!(inline.content_bytes().starts_with(b"GIF89a"));
    assert_eq!(envelope.attachments().count(), 0);
}

#[test]
fn test_missing_content_type_on_part() {
    let envelope = parse("low-quality/missing-content-type.raw");

    let missing = finding(&envelope, FindingKind::MissingContentType);
    assert!(missing.is_severe());

    let first = &envelope.parts()[1];
    assert!(first.content_type.is("text", "plain"));
    assert_eq!(first.content_type.charset(), Some("us-ascii"));
    assert_eq!(
        envelope.text().map(str::trim),
        Some("A part with no Content-Type header.")
    );
}

#[test]
fn test_missing_content_type_everywhere() {
    let envelope = parse("low-quality/missing-content-type2.raw");

    assert_eq!(kinds(&envelope), [FindingKind::MissingContentType]);
    let root = envelope.root();
    assert!(root.content_type.is("text", "plain"));
    assert_eq!(root.content_type.charset(), Some("us-ascii"));
    assert_eq!(envelope.text().map(str::trim), Some("Just a plain body."));
}

#[test]
fn test_empty_part_header() {
    let envelope = parse("low-quality/empty-header.raw");

    assert_eq!(kinds(&envelope), [FindingKind::MissingContentType]);
    assert!(envelope.parts()[1].headers.is_empty());
    assert_eq!(
        envelope.text(),
        Some("Body of a part with no headers at all.")
    );
}

#[test]
fn test_unknown_encoding_part() {
    let envelope = parse("low-quality/unk-encoding-part.raw");

    let unknown = finding(&envelope, FindingKind::ContentEncodingUnknown);
    assert!(unknown.is_severe());
    assert!(unknown.detail.contains("x-uuencode-ish"));

    assert_eq!(envelope.text(), Some("Text that was never really encoded."));
    assert_eq!(envelope.html(), Some("<p>HTML that is fine</p>"));
}

#[test]
fn test_unknown_charset_html_only() {
    let envelope = parse("low-quality/unk-charset-html-only.raw");

    assert_eq!(
        kinds(&envelope),
        [
            FindingKind::CharsetConversionFailure,
            FindingKind::PlainTextFromHTMLFallback,
        ]
    );
    assert!(envelope.diagnostics()[0].detail.contains("irish-gaelic"));
    assert!(envelope.html().unwrap().contains("a chara é"));
    assert!(envelope.text().unwrap().contains("Dia dhuit"));
}

#[test]
fn test_unknown_charset_part() {
    let envelope = parse("low-quality/unk-charset-part.raw");

    assert_eq!(kinds(&envelope), [FindingKind::CharsetConversionFailure]);
    assert!(!envelope.diagnostics()[0].is_severe());
    assert_eq!(envelope.text(), Some("Plain text in café style."));
    assert_eq!(envelope.html(), Some("<p>HTML in café style.</p>"));
}

#[test]
fn test_bad_header_charset() {
    let envelope = parse("low-quality/bad-header-charset.raw");

    assert_eq!(kinds(&envelope), [FindingKind::CharsetConversionFailure]);
    assert_eq!(envelope.from(), Some("Mystery Sender <mystery@example.com>"));
    assert_eq!(envelope.subject(), Some("Broken charset header"));
}

#[test]
fn test_missing_boundary_parameter() {
    let envelope = parse("low-quality/missing-boundary.raw");

    assert_eq!(kinds(&envelope), [FindingKind::MissingBoundary]);
    let root = envelope.root();
    assert!(root.is_leaf());
    assert!(root.content_bytes().starts_with(b"--abc"));
    assert_eq!(envelope.attachment_ids(), [root.id]);
    assert_eq!(envelope.text(), None);
}

#[test]
fn test_headerless_input() {
    let envelope = parse("low-quality/headerless.raw");

    assert_eq!(
        kinds(&envelope),
        [FindingKind::MalformedHeader, FindingKind::MissingContentType]
    );
    assert!(envelope.headers().is_empty());
    assert!(envelope.text().unwrap().starts_with("This message has no headers"));
}

#[test]
fn test_mbox_from_line() {
    let envelope = parse("good/mbox-from-line.raw");

    assert!(envelope.diagnostics().is_empty(), "{:?}", envelope.diagnostics());
    assert_eq!(envelope.from(), Some("sender@example.com"));
    assert_eq!(envelope.headers().len(), 3);
}

#[test]
fn test_latin1_without_charset() {
    let envelope = parse("low-quality/latin1-no-charset.raw");

    assert_eq!(
        kinds(&envelope),
        [
            FindingKind::CharsetConversionFailure,
            FindingKind::CharsetConversionFailure,
        ]
    );
    assert!(envelope.diagnostics()[0].detail.contains("Subject"));
    assert_eq!(envelope.subject(), Some("Café menu"));
    assert_eq!(envelope.text().map(str::trim), Some("Café au lait"));
    assert_eq!(envelope.root().charset, Some("windows-1252"));
}

// ─── Options and repeat parses ──────────────────────────────────────

#[test]
fn test_parse_is_idempotent() {
    for name in [
        "good/attachments.raw",
        "low-quality/bad-final-boundary.raw",
        "low-quality/unk-charset-html-only.raw",
    ] {
        let data = fs::read(fixture(name)).unwrap();
        let first = Envelope::parse(data.clone()).unwrap();
        let second = Envelope::parse(data).unwrap();

        assert_eq!(first.diagnostics(), second.diagnostics());
        assert_eq!(first.text(), second.text());
        assert_eq!(first.html(), second.html());
        assert_eq!(first.attachment_ids(), second.attachment_ids());
        assert_eq!(first.inline_ids(), second.inline_ids());
        let structure = |e: &Envelope| {
            e.parts()
                .iter()
                .map(|p| (p.parent, p.children.clone(), p.role, p.content.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(structure(&first), structure(&second));
    }
}

#[test]
fn test_depth_limit_on_fixture() {
    let data = fs::read(fixture("good/attachments.raw")).unwrap();
    let options = ParserOptions::builder().max_depth(1).build();
    let envelope = Envelope::parse_with(data, &options).unwrap();

    let exceeded = finding(&envelope, FindingKind::MaxDepthExceeded);
    assert!(exceeded.is_severe());
    // The related container at depth 1 becomes an opaque leaf.
    assert!(envelope.parts()[1].is_leaf());
    assert_eq!(envelope.text(), None);
}

#[test]
fn test_read_from_file() {
    let file = fs::File::open(fixture("good/alternative.raw")).unwrap();
    let envelope = Envelope::read_from(file, &ParserOptions::default()).unwrap();
    assert_eq!(envelope.subject(), Some("Quarterly résumé"));
}
