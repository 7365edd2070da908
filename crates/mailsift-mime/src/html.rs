//! HTML to plain text conversion for messages without a text alternative.

use html2text::render::text_renderer::TrivialDecorator;

/// Column width the renderer wraps paragraphs at.
const WRAP_WIDTH: usize = 80;

/// Converts an HTML body to readable plain text.
///
/// Renders with `html2text` and a decorator that adds no markup of its own,
/// so headings, emphasis and links come out as their bare words. Falls back
/// to [`strip_tags`] when rendering yields nothing for non-empty markup.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let rendered =
        html2text::from_read_with_decorator(html.as_bytes(), WRAP_WIDTH, TrivialDecorator::new());
    let text = tidy_lines(&rendered);
    if text.is_empty() {
        tracing::debug!("html2text produced no text, stripping tags");
        return strip_tags(html);
    }
    text
}

/// Removes markup, dropping `<script>`/`<style>` content and decoding the
/// common entities. Block-level tags become line breaks.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            // Unterminated tag: keep the remainder as text.
            text.push_str(&rest[open..]);
            rest = "";
            break;
        };

        let tag = &after[..close];
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        rest = &after[close + 1..];

        if !tag.starts_with('/') && (name == "script" || name == "style") {
            let end_tag = format!("</{name}");
            rest = find_ignore_case(rest, &end_tag).map_or("", |at| {
                let tail = &rest[at..];
                tail.find('>').map_or("", |gt| &tail[gt + 1..])
            });
            continue;
        }

        if matches!(
            name.as_str(),
            "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        ) && !text.is_empty()
            && !text.ends_with('\n')
        {
            text.push('\n');
        }
    }
    text.push_str(rest);

    tidy_lines(&decode_entities(&text))
}

/// Trims every line and collapses runs of blank lines into one.
fn tidy_lines(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut prev_blank = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !prev_blank && !cleaned.is_empty() {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(line);
            cleaned.push('\n');
            prev_blank = false;
        }
    }

    cleaned.trim().to_string()
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
